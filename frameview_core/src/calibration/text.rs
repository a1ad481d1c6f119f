//! Reader for the block-structured key/value text used by camera config files.
//!
//! ```text
//! config {
//!   camera_dev: "cam_front"
//!   img_width: 1920
//!   position { x: 1.2 y: 0.0 z: -0.3 }
//! }
//! ```
//!
//! The reader only builds a tree of [`Field`]s; it knows nothing about
//! cameras. Lookups are document-ordered and depth-first so a key may live
//! at any nesting level inside a block.

use thiserror::Error;

/// Fatal problems with the text as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A quoted string runs to the end of the input
    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },

    /// A token that does not fit the grammar at this position
    #[error("line {line}: unexpected {found}")]
    Unexpected { line: usize, found: String },

    /// A block opened with `{` is never closed
    #[error("line {line}: block '{key}' is never closed")]
    UnclosedBlock { line: usize, key: String },

    /// A `key:` with nothing after it
    #[error("line {line}: missing value for '{key}'")]
    MissingValue { line: usize, key: String },
}

/// The value side of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An unquoted word such as `1920`, `-0.25` or `PINHOLE`
    Scalar(String),
    /// A double-quoted string with escapes resolved
    Text(String),
    /// A nested `{ ... }` block
    Block(Vec<Field>),
}

/// A single `key: value` or `key { ... }` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: Value,
    pub line: usize,
}

impl Field {
    /// Scalar or string content, `None` for blocks.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Scalar(s) | Value::Text(s) => Some(s),
            Value::Block(_) => None,
        }
    }

    /// Children of a block field, `None` for scalars.
    pub fn children(&self) -> Option<&[Field]> {
        match &self.value {
            Value::Block(fields) => Some(fields),
            _ => None,
        }
    }
}

/// Depth-first search for the first non-block field named `key`.
pub fn find_value<'a>(fields: &'a [Field], key: &str) -> Option<&'a Field> {
    for field in fields {
        match &field.value {
            Value::Block(children) => {
                if let Some(found) = find_value(children, key) {
                    return Some(found);
                }
            }
            _ if field.key == key => return Some(field),
            _ => {}
        }
    }
    None
}

/// Depth-first search for the first block named `key`.
pub fn find_block<'a>(fields: &'a [Field], key: &str) -> Option<&'a [Field]> {
    for field in fields {
        if let Value::Block(children) = &field.value {
            if field.key == key {
                return Some(children);
            }
            if let Some(found) = find_block(children, key) {
                return Some(found);
            }
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Text(String),
    Colon,
    Open,
    Close,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("'{}'", w),
            Token::Text(t) => format!("string \"{}\"", t),
            Token::Colon => "':'".to_string(),
            Token::Open => "'{'".to_string(),
            Token::Close => "'}'".to_string(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() || c == ',' || c == ';' => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ':' => {
                tokens.push((Token::Colon, line));
                chars.next();
            }
            '{' => {
                tokens.push((Token::Open, line));
                chars.next();
            }
            '}' => {
                tokens.push((Token::Close, line));
                chars.next();
            }
            '"' => {
                let start = line;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(ParseError::UnterminatedString { line: start }),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => return Err(ParseError::UnterminatedString { line: start }),
                        },
                        Some('\n') => {
                            line += 1;
                            s.push('\n');
                        }
                        Some(other) => s.push(other),
                    }
                }
                tokens.push((Token::Text(s), start));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, ':' | '{' | '}' | '"' | '#' | ',' | ';') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push((Token::Word(word), line));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    /// Parses fields until `}` (when nested) or end of input (top level).
    fn fields(&mut self, enclosing: Option<(&str, usize)>) -> Result<Vec<Field>, ParseError> {
        let mut fields = Vec::new();

        loop {
            let Some((token, line)) = self.next() else {
                return match enclosing {
                    Some((key, line)) => Err(ParseError::UnclosedBlock {
                        line,
                        key: key.to_string(),
                    }),
                    None => Ok(fields),
                };
            };

            let key = match token {
                Token::Close if enclosing.is_some() => return Ok(fields),
                Token::Word(key) => key,
                other => {
                    return Err(ParseError::Unexpected {
                        line,
                        found: other.describe(),
                    })
                }
            };

            if matches!(self.peek(), Some((Token::Colon, _))) {
                self.pos += 1;
            }

            let value = match self.next() {
                Some((Token::Open, _)) => Value::Block(self.fields(Some((&key, line)))?),
                Some((Token::Word(w), _)) => Value::Scalar(w),
                Some((Token::Text(t), _)) => Value::Text(t),
                Some((Token::Close, _)) | None => {
                    return Err(ParseError::MissingValue { line, key });
                }
                Some((Token::Colon, l)) => {
                    return Err(ParseError::Unexpected {
                        line: l,
                        found: Token::Colon.describe(),
                    })
                }
            };

            fields.push(Field { key, value, line });
        }
    }
}

/// A top-level stretch of a document: any loose entries followed by one
/// complete `{ ... }` block, or the trailing entries after the last block.
///
/// Each section is parsed on its own, so a grammar error stays inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Key of the section's block, or of its first entry when it has none
    pub key: String,
    /// Line of that key
    pub line: usize,
    pub fields: Result<Vec<Field>, ParseError>,
    tokens: Vec<(Token, usize)>,
}

impl Section {
    fn parse(key: String, line: usize, tokens: Vec<(Token, usize)>) -> Self {
        let mut parser = Parser {
            tokens: tokens.clone(),
            pos: 0,
        };
        let fields = parser.fields(None);
        Self {
            key,
            line,
            fields,
            tokens,
        }
    }

    /// First `key: value` pair in the raw tokens, found even when the
    /// section failed to parse.
    pub fn scan_value(&self, key: &str) -> Option<&str> {
        self.tokens.windows(3).find_map(|window| match window {
            [(Token::Word(k), _), (Token::Colon, _), (Token::Text(v) | Token::Word(v), _)] if k == key => {
                Some(v.as_str())
            }
            _ => None,
        })
    }
}

/// Word before the top-level `{` at the end of `tokens`, skipping one `:`.
fn block_key(tokens: &[(Token, usize)], open_line: usize) -> (String, usize) {
    let before = match tokens {
        [.., key, (Token::Colon, _)] => Some(key),
        [.., key] => Some(key),
        [] => None,
    };
    match before {
        Some((Token::Word(key), line)) => (key.clone(), *line),
        _ => (String::new(), open_line),
    }
}

/// Splits a document into [`Section`]s by brace matching.
///
/// Fails only when the text cannot be tokenized or its braces do not
/// balance. Grammar errors inside a section are kept on that section.
pub fn parse_sections(text: &str) -> Result<Vec<Section>, ParseError> {
    let tokens = tokenize(text)?;
    let mut sections = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut opened: Option<(String, usize)> = None;

    for (i, (token, line)) in tokens.iter().enumerate() {
        match token {
            Token::Open => {
                if depth == 0 {
                    opened = Some(block_key(&tokens[start..i], *line));
                }
                depth += 1;
            }
            Token::Close => {
                if depth == 0 {
                    return Err(ParseError::Unexpected {
                        line: *line,
                        found: token.describe(),
                    });
                }
                depth -= 1;
                if depth == 0 {
                    let (key, key_line) = opened.take().unwrap_or_default();
                    sections.push(Section::parse(key, key_line, tokens[start..=i].to_vec()));
                    start = i + 1;
                }
            }
            _ => {}
        }
    }

    if let Some((key, line)) = opened {
        return Err(ParseError::UnclosedBlock { line, key });
    }

    if let Some((first, line)) = tokens.get(start) {
        let key = match first {
            Token::Word(word) => word.clone(),
            _ => String::new(),
        };
        sections.push(Section::parse(key, *line, tokens[start..].to_vec()));
    }

    Ok(sections)
}

/// Parses a whole document into its top-level fields, failing on the
/// first error in any section.
pub fn parse_document(text: &str) -> Result<Vec<Field>, ParseError> {
    let mut fields = Vec::new();
    for section in parse_sections(text)? {
        fields.extend(section.fields?);
    }
    Ok(fields)
}
