use pipeline_engine::cli::{Cli, Command};
use pipeline_engine::cli::commands::{
    invalid_inputs, load_context, InspectCommand, ResolveCommand, ValidateCommand,
};
use pipeline_engine::cli::output::*;
use pipeline_engine::core::config::{EngineConfig, PipelineDefinition};
use pipeline_engine::core::{VariableSpec, VariableType};

use anyhow::{Context, Result};
use tracing::{debug, error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load engine config")?;
    debug!("Running {} with {:?}", config.app.name, config);

    match &cli.command {
        Command::Resolve(cmd) => resolve_variable(cmd)?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Inspect(cmd) => inspect_step(cmd)?,
    }

    Ok(())
}

fn resolve_variable(cmd: &ResolveCommand) -> Result<()> {
    let ctx = load_context(&cmd.context)?;
    let var_type = VariableType::from(cmd.var_type);
    let spec = VariableSpec {
        value: cmd.value.clone(),
        var_type,
        required: cmd.required,
        default: cmd.default.clone(),
    };

    match spec.resolve(&cmd.step, &ctx) {
        Ok(value) => {
            if cmd.json {
                let json = serde_json::json!({
                    "step": cmd.step,
                    "type": var_type,
                    "value": value,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                println!("{}", format_resolution(&cmd.step, &cmd.value, var_type, &value));
            }
            Ok(())
        }
        Err(e) => {
            println!("{}Resolution failed:", CROSS);
            println!("  {}", style(&e).red());
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{}Validating pipeline...", INFO);

    let definition = match PipelineDefinition::from_file(&cmd.file) {
        Ok(definition) => definition,
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    let invalid = invalid_inputs(&definition);
    if cmd.json {
        let json = serde_json::json!({
            "name": definition.name,
            "steps": definition.steps.len(),
            "invalid_inputs": invalid,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    if invalid.is_empty() {
        let inputs: usize = definition.steps.iter().map(|s| s.inputs.len()).sum();
        println!("{}Pipeline definition is valid!", CHECK);
        println!("  Name: {}", style(&definition.name).bold());
        println!("  Steps: {}", style(definition.steps.len()).cyan());
        println!("  Inputs: {}", style(inputs).cyan());
        Ok(())
    } else {
        println!("{}{} invalid input expression(s):", WARN, invalid.len());
        for entry in &invalid {
            println!("  {}", format_invalid_input(entry));
        }
        std::process::exit(1);
    }
}

fn inspect_step(cmd: &InspectCommand) -> Result<()> {
    let ctx = load_context(&cmd.context)?;
    let step = ctx.get_step(&cmd.step);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&step)?);
    } else {
        if !ctx.step_ids().contains(&cmd.step) {
            println!("{}Step {} has not published anything", WARN, style(&cmd.step).bold());
        }
        println!("{}", format_step(&cmd.step, &step));
    }

    Ok(())
}
