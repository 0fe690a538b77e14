//! Template parsing
//!
//! A template is literal text interleaved with `{{ ... }}` actions. Actions
//! hold a narrow path language: dotted field chains rooted at `.`, grouping
//! with parentheses and the `index` function.

use thiserror::Error;

/// Errors produced while parsing a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("unclosed action starting at offset {0}")]
    UnclosedAction(usize),

    #[error("unterminated string literal at offset {0}")]
    UnterminatedString(usize),

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function 'index' needs a target and at least one key")]
    MissingIndexKey,

    #[error("empty action at offset {0}")]
    EmptyAction(usize),

    #[error("integer literal out of range at offset {0}")]
    IntegerOutOfRange(usize),

    #[error("parentheses nested too deeply at offset {0}")]
    TooDeep(usize),
}

/// Deepest parenthesis nesting an action may use
pub const MAX_DEPTH: usize = 64;

/// A parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Action(Expr),
}

/// An action expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Field chain rooted at the view; empty means `.` itself
    Path(Vec<String>),

    /// `index <target> <key>...`
    Index { target: Box<Expr>, keys: Vec<Arg> },

    /// `(<expr>).field.field`
    Chain { target: Box<Expr>, fields: Vec<String> },
}

/// Argument to `index`
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Str(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Dot,
    LParen,
    RParen,
    Ident(String),
    Int(i64),
    Str(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Field(name) => format!("field '.{}'", name),
            Token::Dot => "'.'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Int(i) => format!("number {}", i),
            Token::Str(s) => format!("string {:?}", s),
        }
    }
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl Template {
    /// Parse a template string
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let mut segments = Vec::new();
        let mut rest_start = 0;
        let mut trim_next_text = false;

        while let Some(found) = source[rest_start..].find(OPEN) {
            let open = rest_start + found;
            let mut text = &source[rest_start..open];
            if trim_next_text {
                text = text.trim_start();
            }

            let mut body_start = open + OPEN.len();
            // `{{- ` trims whitespace before the action
            let rest = &source[body_start..];
            if rest.starts_with('-') && rest[1..].starts_with(char::is_whitespace) {
                text = text.trim_end();
                body_start += 1;
            }
            if !text.is_empty() {
                segments.push(Segment::Text(text.to_string()));
            }

            let (tokens, end, trim_after) = lex_action(source, body_start, open)?;
            if tokens.is_empty() {
                return Err(ExpressionError::EmptyAction(open));
            }
            let mut parser = Parser {
                tokens: &tokens,
                pos: 0,
                offset: open,
                depth: 0,
            };
            let expr = parser.parse_pipeline()?;
            parser.expect_end()?;
            segments.push(Segment::Action(expr));

            rest_start = end;
            trim_next_text = trim_after;
        }

        let mut tail = &source[rest_start..];
        if trim_next_text {
            tail = tail.trim_start();
        }
        if !tail.is_empty() {
            segments.push(Segment::Text(tail.to_string()));
        }

        Ok(Template { segments })
    }

    /// The single action of a template with no surrounding text, if any
    pub fn sole_action(&self) -> Option<&Expr> {
        let mut actions = self.segments.iter().filter_map(|segment| match segment {
            Segment::Action(expr) => Some(expr),
            Segment::Text(_) => None,
        });
        let first = actions.next()?;
        if actions.next().is_some() {
            return None;
        }
        let only_blank_text = self.segments.iter().all(|segment| match segment {
            Segment::Text(text) => text.trim().is_empty(),
            Segment::Action(_) => true,
        });
        only_blank_text.then_some(first)
    }
}

/// Lex one action body starting at `start`
///
/// Returns the tokens, the offset just past the closing braces, and whether
/// the action ended with a ` -}}` trim marker.
fn lex_action(
    source: &str,
    start: usize,
    open: usize,
) -> Result<(Vec<Token>, usize, bool), ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source[start..].char_indices().peekable();
    let mut last_was_space = true;

    while let Some((rel, c)) = chars.next() {
        let offset = start + rel;
        let rest = &source[offset..];

        if rest.starts_with(CLOSE) {
            return Ok((tokens, offset + CLOSE.len(), false));
        }
        if c == '-' && last_was_space && rest[1..].starts_with(CLOSE) {
            return Ok((tokens, offset + 1 + CLOSE.len(), true));
        }

        last_was_space = c.is_whitespace();
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '.' => {
                let mut name = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                if name.is_empty() {
                    tokens.push(Token::Dot);
                } else {
                    tokens.push(Token::Field(name));
                }
            }
            '"' => {
                let mut literal = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => literal.push('\n'),
                            Some((_, 't')) => literal.push('\t'),
                            Some((_, escaped)) => literal.push(escaped),
                            None => break,
                        },
                        other => literal.push(other),
                    }
                }
                if !closed {
                    return Err(ExpressionError::UnterminatedString(offset));
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut digits = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if !next.is_ascii_digit() {
                        break;
                    }
                    digits.push(next);
                    chars.next();
                }
                if digits == "-" {
                    return Err(ExpressionError::UnexpectedChar { ch: c, offset });
                }
                let value = digits
                    .parse::<i64>()
                    .map_err(|_| ExpressionError::IntegerOutOfRange(offset))?;
                tokens.push(Token::Int(value));
            }
            c if is_ident_char(c) => {
                let mut name = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(ExpressionError::UnexpectedChar { ch: other, offset });
            }
        }
    }

    Err(ExpressionError::UnclosedAction(open))
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    offset: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn unexpected(&self, token: Option<&Token>) -> ExpressionError {
        ExpressionError::UnexpectedToken {
            found: token
                .map(Token::describe)
                .unwrap_or_else(|| "end of action".to_string()),
            offset: self.offset,
        }
    }

    fn expect_end(&self) -> Result<(), ExpressionError> {
        match self.peek() {
            None => Ok(()),
            token => Err(self.unexpected(token)),
        }
    }

    fn parse_pipeline(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Token::Ident(name)) if name == "index" => {
                self.next();
                let target = self.parse_operand()?;
                let mut keys = Vec::new();
                while !matches!(self.peek(), None | Some(Token::RParen)) {
                    keys.push(self.parse_arg()?);
                }
                if keys.is_empty() {
                    return Err(ExpressionError::MissingIndexKey);
                }
                Ok(Expr::Index {
                    target: Box::new(target),
                    keys,
                })
            }
            Some(Token::Ident(name)) => Err(ExpressionError::UnknownFunction(name.clone())),
            _ => self.parse_operand(),
        }
    }

    fn parse_fields(&mut self) -> Vec<String> {
        let mut fields = Vec::new();
        while let Some(Token::Field(name)) = self.peek() {
            fields.push(name.clone());
            self.next();
        }
        fields
    }

    fn parse_operand(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Token::Field(_)) => Ok(Expr::Path(self.parse_fields())),
            Some(Token::Dot) => {
                self.next();
                Ok(Expr::Path(Vec::new()))
            }
            Some(Token::LParen) => {
                self.next();
                if self.depth == MAX_DEPTH {
                    return Err(ExpressionError::TooDeep(self.offset));
                }
                self.depth += 1;
                let inner = self.parse_pipeline()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => {}
                    token => return Err(self.unexpected(token)),
                }
                let fields = self.parse_fields();
                if fields.is_empty() {
                    Ok(inner)
                } else {
                    Ok(Expr::Chain {
                        target: Box::new(inner),
                        fields,
                    })
                }
            }
            token => Err(self.unexpected(token)),
        }
    }

    fn parse_arg(&mut self) -> Result<Arg, ExpressionError> {
        match self.peek() {
            Some(Token::Int(i)) => {
                self.next();
                Ok(Arg::Int(*i))
            }
            Some(Token::Str(s)) => {
                self.next();
                Ok(Arg::Str(s.clone()))
            }
            _ => self.parse_operand().map(Arg::Expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(fields: &[&str]) -> Expr {
        Expr::Path(fields.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn test_parse_simple_path() {
        let template = Template::parse("{{.Req.Header.header_1}}").unwrap();
        assert_eq!(
            template.segments,
            vec![Segment::Action(path(&["Req", "Header", "header_1"]))]
        );
        assert!(template.sole_action().is_some());
    }

    #[test]
    fn test_parse_index_with_chain() {
        let template =
            Template::parse("{{ (index .Step.other.Data.Query.query_1 0).col_a }}").unwrap();
        let expected = Expr::Chain {
            target: Box::new(Expr::Index {
                target: Box::new(path(&["Step", "other", "Data", "Query", "query_1"])),
                keys: vec![Arg::Int(0)],
            }),
            fields: vec!["col_a".to_string()],
        };
        assert_eq!(template.sole_action(), Some(&expected));
    }

    #[test]
    fn test_parse_index_with_string_key_and_nested_index() {
        let template = Template::parse(r#"{{index .Req.Json "a-b" 2}}"#).unwrap();
        let expected = Expr::Index {
            target: Box::new(path(&["Req", "Json"])),
            keys: vec![Arg::Str("a-b".to_string()), Arg::Int(2)],
        };
        assert_eq!(template.sole_action(), Some(&expected));
    }

    #[test]
    fn test_parse_mixed_text() {
        let template = Template::parse("Bearer {{.Req.Header.token}}!").unwrap();
        assert_eq!(template.segments.len(), 3);
        assert!(template.sole_action().is_none());
    }

    #[test]
    fn test_parse_literal_only() {
        let template = Template::parse("plain text").unwrap();
        assert_eq!(template.segments, vec![Segment::Text("plain text".to_string())]);
    }

    #[test]
    fn test_trim_markers() {
        let template = Template::parse("a   {{- .Var.x -}}   b").unwrap();
        assert_eq!(
            template.segments,
            vec![
                Segment::Text("a".to_string()),
                Segment::Action(path(&["Var", "x"])),
                Segment::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_negative_index_parses() {
        let template = Template::parse("{{index .Var.list -1}}").unwrap();
        let expected = Expr::Index {
            target: Box::new(path(&["Var", "list"])),
            keys: vec![Arg::Int(-1)],
        };
        assert_eq!(template.sole_action(), Some(&expected));
    }

    #[test]
    fn test_malformed_templates() {
        assert_eq!(
            Template::parse("{{.Req.Header"),
            Err(ExpressionError::UnclosedAction(0))
        );
        assert_eq!(Template::parse("{{}}"), Err(ExpressionError::EmptyAction(0)));
        assert_eq!(
            Template::parse("{{ if .Var.x }}"),
            Err(ExpressionError::UnknownFunction("if".to_string()))
        );
        assert_eq!(
            Template::parse("{{index .Var.x}}"),
            Err(ExpressionError::MissingIndexKey)
        );
        assert!(matches!(
            Template::parse("{{ (index .Var.x 0 }}"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            Template::parse("{{ .Var.x | printf }}"),
            Err(ExpressionError::UnexpectedChar { ch: '|', .. })
        ));
        assert!(matches!(
            Template::parse(r#"{{ index .Var "abc }}"#),
            Err(ExpressionError::UnterminatedString(_))
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |n: usize| format!("{{{{{}.Req{}}}}}", "(".repeat(n), ")".repeat(n));

        assert!(Template::parse(&nested(MAX_DEPTH)).is_ok());
        assert_eq!(
            Template::parse(&nested(MAX_DEPTH + 1)),
            Err(ExpressionError::TooDeep(0))
        );
        assert_eq!(
            Template::parse(&nested(20_000)),
            Err(ExpressionError::TooDeep(0))
        );
    }
}
