//! Tokenizing command lines and walking their arguments.

use std::str::FromStr;

use super::{ScriptError, ScriptResult};

/// One whitespace-separated word of a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Written inside `"..."`; quoted tokens are never read as flags or keywords
    pub quoted: bool,
}

impl Token {
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    /// True for an unquoted token equal to `word`, ignoring ASCII case
    pub fn is_word(&self, word: &str) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case(word)
    }
}

/// Split `line` into tokens.
///
/// Whitespace separates tokens, `"..."` groups a token (with `\"` and `\\`
/// escapes) and `#` outside quotes starts a comment.
pub fn tokenize(line: &str) -> ScriptResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            break;
        }

        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.peek() {
                        Some(&(_, next @ ('"' | '\\'))) => {
                            text.push(next);
                            chars.next();
                        }
                        _ => text.push('\\'),
                    },
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(ScriptError::UnterminatedQuote { column: start + 1 });
            }
            tokens.push(Token::quoted(text));
            continue;
        }

        let mut text = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() || c == '"' || c == '#' {
                break;
            }
            text.push(c);
            chars.next();
        }
        tokens.push(Token::bare(text));
    }

    Ok(tokens)
}

/// Always render `text` as a quoted token
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render `text` as a token, quoting only when it would not survive bare
pub fn quote_if_needed(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\\' | '#'));
    if needs_quotes {
        quote(text)
    } else {
        text.to_string()
    }
}

/// Cursor over a command's argument tokens
#[derive(Debug)]
pub struct Args<'t> {
    command: &'static str,
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Args<'t> {
    pub fn new(command: &'static str, tokens: &'t [Token]) -> Self {
        Self {
            command,
            tokens,
            pos: 0,
        }
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    pub fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Tokens not consumed yet
    pub fn rest(&mut self) -> &'t [Token] {
        let rest = &self.tokens[self.pos.min(self.tokens.len())..];
        self.pos = self.tokens.len();
        rest
    }

    pub fn missing(&self, what: &'static str) -> ScriptError {
        ScriptError::Missing {
            command: self.command,
            what,
        }
    }

    pub fn invalid(&self, what: &'static str, value: impl Into<String>) -> ScriptError {
        ScriptError::Invalid {
            command: self.command,
            what,
            value: value.into(),
        }
    }

    /// Next token, which must exist
    pub fn required(&mut self, what: &'static str) -> ScriptResult<&'t Token> {
        self.next().ok_or_else(|| self.missing(what))
    }

    /// Next token parsed as `T`
    pub fn value<T: FromStr>(&mut self, what: &'static str) -> ScriptResult<T> {
        let token = self.required(what)?;
        token
            .text
            .parse()
            .map_err(|_| self.invalid(what, token.text.clone()))
    }

    /// Next token as a number of seconds in `0..=MAX_SECONDS`
    pub fn seconds(&mut self, what: &'static str) -> ScriptResult<f64> {
        let token = self.required(what)?;
        parse_seconds(&token.text).ok_or_else(|| self.invalid(what, token.text.clone()))
    }

    /// Consume the next token if it parses as `T`
    pub fn optional<T: FromStr>(&mut self) -> Option<T> {
        let value = self.peek()?.text.parse().ok()?;
        self.pos += 1;
        Some(value)
    }

    /// Consume the next token if it is unquoted and `keyword` accepts it
    pub fn keyword<T>(&mut self, keyword: impl Fn(&str) -> Option<T>) -> Option<T> {
        let token = self.peek().filter(|t| !t.quoted)?;
        let value = keyword(&token.text)?;
        self.pos += 1;
        Some(value)
    }

    /// Consume the next token if it is the unquoted word `word`
    pub fn eat(&mut self, word: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_word(word)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Fail if any token is left over
    pub fn finish(self) -> ScriptResult<()> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(extra) => Err(ScriptError::Unexpected {
                command: self.command,
                value: extra.text.clone(),
            }),
        }
    }
}

/// Longest wait, hold or retry interval a script may ask for: one day
pub const MAX_SECONDS: f64 = 86_400.0;

/// Parse a number of seconds in `0..=MAX_SECONDS`
pub fn parse_seconds(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|v| (0.0..=MAX_SECONDS).contains(v))
}
