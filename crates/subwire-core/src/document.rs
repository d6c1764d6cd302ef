//! Lexical inspection of GraphQL documents.
//!
//! This is not a parser. It tokenizes just enough of a document to answer
//! the questions the transport needs before handing a request to the
//! executor: which operation kind was selected, what its root fields are, and
//! whether a given field name is selected anywhere.

use serde::{Deserialize, Serialize};

/// Kind of a GraphQL operation definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// `query` or the `{ ... }` shorthand.
    Query,
    /// `mutation`.
    Mutation,
    /// `subscription`.
    Subscription,
}

impl OperationKind {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }
}

/// What a scan learned about one operation definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationSummary {
    /// Operation kind.
    pub kind: OperationKind,
    /// Declared name, if any.
    pub name: Option<String>,
    /// Root field names in selection order (aliases resolved to the field).
    pub root_fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Name(String),
    Punct(char),
    Str,
}

fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() || c == ',' || c == '\u{feff}' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' => {
                if chars[i..].starts_with(&['"', '"', '"']) {
                    i += 3;
                    while i < chars.len() && !chars[i..].starts_with(&['"', '"', '"']) {
                        i += if chars[i] == '\\' { 2 } else { 1 };
                    }
                    i += 3;
                } else {
                    i += 1;
                    while i < chars.len() && chars[i] != '"' && chars[i] != '\n' {
                        i += if chars[i] == '\\' { 2 } else { 1 };
                    }
                    i += 1;
                }
                tokens.push(Token::Str);
            }
            c if c.is_alphanumeric() || c == '_' || c == '-' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '-' | '.'))
                {
                    // `.` only continues numbers like 1.5, never names.
                    if chars[i] == '.' && !chars[start].is_ascii_digit() && chars[start] != '-' {
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                tokens.push(Token::Punct(other));
                i += 1;
            }
        }
    }
    tokens
}

/// Index just past the group that opens at `start` (`{`/`(`/`[`).
fn skip_group(tokens: &[Token], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < tokens.len() {
        match tokens[i] {
            Token::Punct('{' | '(' | '[') => depth += 1,
            Token::Punct('}' | ')' | ']') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    tokens.len()
}

/// Root field names of the selection set opening at `start`.
fn root_fields(tokens: &[Token], start: usize) -> (Vec<String>, usize) {
    let mut fields = Vec::new();
    let mut i = start + 1;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Punct('}') => return (fields, i + 1),
            Token::Punct('{' | '(') => i = skip_group(tokens, i),
            Token::Punct('.') => {
                // Spread: `...Frag` or `... on T { }`; fields inside are not roots.
                while matches!(tokens.get(i), Some(Token::Punct('.'))) {
                    i += 1;
                }
                match tokens.get(i) {
                    Some(Token::Name(n)) if n == "on" => i += 2,
                    Some(Token::Name(_)) => i += 1,
                    _ => {}
                }
            }
            Token::Punct('@') => i += 2,
            Token::Name(name) => {
                if matches!(tokens.get(i + 1), Some(Token::Punct(':'))) {
                    if let Some(Token::Name(field)) = tokens.get(i + 2) {
                        fields.push(field.clone());
                    }
                    i += 3;
                } else {
                    fields.push(name.clone());
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (fields, tokens.len())
}

fn operations(tokens: &[Token]) -> Vec<OperationSummary> {
    let mut ops = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Punct('{') => {
                let (root_fields, next) = root_fields(tokens, i);
                ops.push(OperationSummary {
                    kind: OperationKind::Query,
                    name: None,
                    root_fields,
                });
                i = next;
            }
            Token::Name(word) if OperationKind::from_keyword(word).is_some() => {
                let kind = OperationKind::from_keyword(word).unwrap_or(OperationKind::Query);
                i += 1;
                let name = match tokens.get(i) {
                    Some(Token::Name(n)) => {
                        i += 1;
                        Some(n.clone())
                    }
                    _ => None,
                };
                while i < tokens.len() && tokens[i] != Token::Punct('{') {
                    i = if tokens[i] == Token::Punct('(') {
                        skip_group(tokens, i)
                    } else {
                        i + 1
                    };
                }
                let (root_fields, next) = root_fields(tokens, i);
                ops.push(OperationSummary {
                    kind,
                    name,
                    root_fields,
                });
                i = next;
            }
            Token::Name(word) if word == "fragment" => {
                while i < tokens.len() && tokens[i] != Token::Punct('{') {
                    i += 1;
                }
                i = skip_group(tokens, i);
            }
            _ => i += 1,
        }
    }
    ops
}

/// Summarize the operation selected by `operation_name`.
///
/// Without a name the first operation in the document is selected. Returns
/// `None` when no matching operation exists.
pub fn summarize(source: &str, operation_name: Option<&str>) -> Option<OperationSummary> {
    let mut ops = operations(&tokenize(source)).into_iter();
    match operation_name {
        Some(wanted) => ops.find(|op| op.name.as_deref() == Some(wanted)),
        None => ops.next(),
    }
}

/// Whether any selection in the document names one of `fields`.
pub fn selects_any(source: &str, fields: &[&str]) -> bool {
    tokenize(source)
        .iter()
        .any(|t| matches!(t, Token::Name(n) if fields.contains(&n.as_str())))
}
