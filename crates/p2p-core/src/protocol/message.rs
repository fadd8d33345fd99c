//! Parsing and rendering of single supplicant control-protocol lines.
//!
//! Wire format:
//! ```text
//! event:     <LEVEL>NAME token token key=value key='quoted value'
//! response:  OK | FAIL[-REASON] | value [value ...]
//! request:   COMMAND arg arg ...
//! ```
//!
//! Tokens are separated by ASCII whitespace.  A token of the form
//! `key=value` is a *named* token; anything else is *positional*.  Values may
//! be wrapped in single or double quotes to carry embedded whitespace; the
//! quotes are stripped on parse.
//!
//! Parsing never fails: an event line that cannot be tokenized degrades to an
//! [`MessageKind::Event`] whose name is the raw text, so the caller always has
//! something to log or ignore.  A non-empty response line that cannot be
//! tokenized stays a [`MessageKind::Response`] so it still completes the
//! request in flight.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Leading token of a failed response.
pub const FAIL_MARKER: &str = "FAIL";

/// Leading token of a successful response.
pub const OK_MARKER: &str = "OK";

/// Errors produced while splitting a line into tokens.
#[derive(Debug, Error, PartialEq)]
pub enum MessageError {
    /// A quote was opened but never closed.
    #[error("unterminated {quote} quote in {line:?}")]
    UnterminatedQuote { quote: char, line: String },
}

/// What a line represents on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Unsolicited notification from the supplicant.
    Event,
    /// Reply to the request that is currently in flight.
    Response,
    /// Outgoing command built by the manager.
    Request,
}

/// One whitespace-separated token of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Positional(String),
    Named { key: String, value: String },
}

impl Token {
    /// Returns the value of the token (the part after `=` for named tokens).
    pub fn value(&self) -> &str {
        match self {
            Token::Positional(v) => v.as_str(),
            Token::Named { value, .. } => value.as_str(),
        }
    }

    /// Returns the key for named tokens.
    pub fn key(&self) -> Option<&str> {
        match self {
            Token::Positional(_) => None,
            Token::Named { key, .. } => Some(key.as_str()),
        }
    }

    fn to_wire(&self) -> String {
        match self {
            Token::Positional(v) => v.clone(),
            Token::Named { key, value } => format!("{key}={value}"),
        }
    }
}

/// A typed argument appended to an outgoing request.
///
/// Text is emitted as-is unless it is empty or contains whitespace or quote
/// characters, in which case it is quoted.  For `key=value` text only the
/// value is quoted.  [`Argument::Quoted`] always quotes.  Integers are
/// rendered in decimal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Text(String),
    Quoted(String),
    Integer(i64),
}

impl Argument {
    /// Renders the argument the way it appears on the wire.
    pub fn render(&self) -> String {
        match self {
            Argument::Text(s) => match split_named(s, s.find('=')) {
                Some(Token::Named { key, value }) if needs_quotes(&value) => {
                    format!("{key}={}", quote(&value))
                }
                Some(_) => s.clone(),
                None if s.is_empty() || needs_quotes(s) => quote(s),
                None => s.clone(),
            },
            Argument::Quoted(s) => quote(s),
            Argument::Integer(n) => n.to_string(),
        }
    }

    fn into_token(self) -> Token {
        match self {
            Argument::Integer(n) => Token::Positional(n.to_string()),
            Argument::Quoted(s) => Token::Positional(s),
            Argument::Text(s) => match split_named(&s, s.find('=')) {
                Some(token) => token,
                None => Token::Positional(s),
            },
        }
    }
}

fn needs_quotes(s: &str) -> bool {
    s.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'')
}

/// Wraps `s` in quotes the tokenizer reads back verbatim.
///
/// There is no escape syntax, so runs of `"` go inside single quotes and
/// everything else inside double quotes.  Adjacent quoted segments join into
/// one word on parse.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    let mut open: Option<char> = None;
    for c in s.chars() {
        let q = if c == '"' { '\'' } else { '"' };
        if open != Some(q) {
            if let Some(o) = open {
                out.push(o);
            }
            out.push(q);
            open = Some(q);
        }
        out.push(c);
    }
    match open {
        Some(o) => out.push(o),
        None => out.push_str("\"\""),
    }
    out
}

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Argument::Text(s.to_string())
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Argument::Text(s)
    }
}

impl From<&String> for Argument {
    fn from(s: &String) -> Self {
        Argument::Text(s.clone())
    }
}

impl From<i32> for Argument {
    fn from(n: i32) -> Self {
        Argument::Integer(n.into())
    }
}

impl From<u32> for Argument {
    fn from(n: u32) -> Self {
        Argument::Integer(n.into())
    }
}

impl From<i64> for Argument {
    fn from(n: i64) -> Self {
        Argument::Integer(n)
    }
}

impl From<usize> for Argument {
    fn from(n: usize) -> Self {
        Argument::Integer(n as i64)
    }
}

/// One parsed (or programmatically built) control-protocol line.
///
/// # Examples
///
/// ```rust
/// use p2p_core::{MessageKind, SupplicantMessage};
///
/// let msg = SupplicantMessage::parse("<3>P2P-DEVICE-LOST p2p_dev_addr=4e:74:03:70:e2:c1");
/// assert_eq!(msg.kind(), MessageKind::Event);
/// assert_eq!(msg.name(), "P2P-DEVICE-LOST");
/// assert_eq!(msg.named("p2p_dev_addr"), Some("4e:74:03:70:e2:c1"));
///
/// let req = SupplicantMessage::request("P2P_FIND").arg(30u32);
/// assert_eq!(req.to_line(), "P2P_FIND 30");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplicantMessage {
    kind: MessageKind,
    name: String,
    tokens: Vec<Token>,
    named: HashMap<String, String>,
    /// Rendered arguments, kept for requests so quoting survives rendering.
    arguments: Vec<Argument>,
    raw: String,
}

impl SupplicantMessage {
    /// Parses one inbound line.  Never fails; see the module docs.
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim_end_matches(['\r', '\n', '\0']);

        if line.starts_with('<') {
            return match strip_level(line) {
                Some(body) => Self::from_body(MessageKind::Event, line, body),
                None => Self::degraded(line),
            };
        }

        Self::from_body(MessageKind::Response, line, line)
    }

    /// Parses a rendered request line back into a [`MessageKind::Request`].
    pub fn parse_request(raw: &str) -> Self {
        let line = raw.trim_end_matches(['\r', '\n', '\0']);
        let mut msg = Self::from_body(MessageKind::Request, line, line);
        if msg.kind == MessageKind::Request {
            msg.arguments = msg
                .tokens
                .iter()
                .map(|t| match t {
                    // Keep `'a=b'` positional when rendered again.
                    Token::Positional(v) if split_named(v, v.find('=')).is_some() => {
                        Argument::Quoted(v.clone())
                    }
                    _ => Argument::Text(t.to_wire()),
                })
                .collect();
        }
        msg
    }

    /// Starts building an outgoing request named `name`.
    pub fn request(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: MessageKind::Request,
            raw: name.clone(),
            name,
            tokens: Vec::new(),
            named: HashMap::new(),
            arguments: Vec::new(),
        }
    }

    /// Appends an argument to a request.
    pub fn arg(mut self, argument: impl Into<Argument>) -> Self {
        let argument = argument.into();
        let token = argument.clone().into_token();
        if let Token::Named { key, value } = &token {
            self.named.insert(key.clone(), value.clone());
        }
        self.tokens.push(token);
        self.arguments.push(argument);
        self.raw = self.render_request();
        self
    }

    /// Builds a failure-shaped response, used when a request never reached
    /// the supplicant.
    pub fn failure(reason: &str) -> Self {
        let mut tokens = Vec::new();
        if !reason.is_empty() {
            tokens.push(Token::Positional(reason.to_string()));
        }
        let raw = if reason.is_empty() {
            FAIL_MARKER.to_string()
        } else {
            format!("{FAIL_MARKER} {reason}")
        };
        Self {
            kind: MessageKind::Response,
            name: FAIL_MARKER.to_string(),
            tokens,
            named: HashMap::new(),
            arguments: Vec::new(),
            raw,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Event or command name; for responses, the leading token.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The line exactly as it was received (or as it will be sent).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Returns the n-th positional token, ignoring named tokens.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Positional(v) => Some(v.as_str()),
                Token::Named { .. } => None,
            })
            .nth(index)
    }

    /// Looks up a named token by key.
    pub fn named(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }

    /// Every token rendered back to its `value` / `key=value` text.
    pub fn token_strings(&self) -> Vec<String> {
        self.tokens.iter().map(Token::to_wire).collect()
    }

    /// Returns a cursor that consumes tokens in order.
    pub fn reader(&self) -> TokenReader<'_> {
        TokenReader {
            tokens: &self.tokens,
            pos: 0,
        }
    }

    /// `true` only for a response whose leading token is the failure marker
    /// (`FAIL` or `FAIL-<reason>`).
    pub fn is_fail(&self) -> bool {
        self.kind == MessageKind::Response
            && (self.name == FAIL_MARKER || self.name.starts_with("FAIL-"))
    }

    /// `true` for a response whose leading token is `OK`.
    pub fn is_ok(&self) -> bool {
        self.kind == MessageKind::Response && self.name == OK_MARKER
    }

    /// The text written to the control socket.
    pub fn to_line(&self) -> String {
        match self.kind {
            MessageKind::Request => self.render_request(),
            _ => self.raw.clone(),
        }
    }

    fn render_request(&self) -> String {
        let mut line = self.name.clone();
        for argument in &self.arguments {
            line.push(' ');
            line.push_str(&argument.render());
        }
        line
    }

    fn from_body(kind: MessageKind, line: &str, body: &str) -> Self {
        let words = match tokenize(body) {
            Ok(words) => words,
            Err(e) => {
                tracing::trace!("degrading unparseable line: {e}");
                if kind == MessageKind::Response {
                    return Self::degraded_response(line);
                }
                return Self::degraded(line);
            }
        };

        let mut words = words.into_iter();
        let Some(first) = words.next() else {
            return Self::degraded(line);
        };

        let mut tokens = Vec::new();
        let mut named = HashMap::new();
        for word in words {
            let token = match split_named(&word.text, word.eq_pos) {
                Some(token) => token,
                None => Token::Positional(word.text),
            };
            if let Token::Named { key, value } = &token {
                named.insert(key.clone(), value.clone());
            }
            tokens.push(token);
        }

        Self {
            kind,
            name: first.text,
            tokens,
            named,
            arguments: Vec::new(),
            raw: line.to_string(),
        }
    }

    /// Keeps the leading word as the name so `FAIL ...` is still a failure.
    fn degraded_response(line: &str) -> Self {
        Self {
            kind: MessageKind::Response,
            name: line.split_whitespace().next().unwrap_or_default().to_string(),
            tokens: Vec::new(),
            named: HashMap::new(),
            arguments: Vec::new(),
            raw: line.to_string(),
        }
    }

    fn degraded(line: &str) -> Self {
        Self {
            kind: MessageKind::Event,
            name: line.to_string(),
            tokens: Vec::new(),
            named: HashMap::new(),
            arguments: Vec::new(),
            raw: line.to_string(),
        }
    }
}

impl fmt::Display for SupplicantMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Sequential reader over a message's tokens.
///
/// Reading past the end never panics: every accessor returns `None` once the
/// tokens are exhausted, and callers decide whether a missing token matters.
#[derive(Debug, Clone)]
pub struct TokenReader<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenReader<'a> {
    /// Skips the next token, if any.
    pub fn skip(&mut self) -> &mut Self {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        self
    }

    /// Consumes the next token and returns its value.
    pub fn text(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token.value())
    }

    /// Consumes the next token and parses it as a decimal integer.
    pub fn integer(&mut self) -> Option<i64> {
        self.text()?.parse().ok()
    }

    /// Advances to the next named token with `key` and returns its value.
    ///
    /// Tokens in between are consumed.  If no such token follows, the cursor
    /// is left where it was and `None` is returned.
    pub fn named(&mut self, key: &str) -> Option<&'a str> {
        let offset = self.tokens[self.pos..]
            .iter()
            .position(|t| t.key() == Some(key))?;
        let token = &self.tokens[self.pos + offset];
        self.pos += offset + 1;
        Some(token.value())
    }

    /// Number of tokens not consumed yet.
    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }
}

// ── Tokenizer ────────────────────────────────────────────────────────────────

struct Word {
    text: String,
    /// Byte offset of the first `=` seen outside quotes.
    eq_pos: Option<usize>,
}

/// Strips a leading `<digits>` level marker.
fn strip_level(line: &str) -> Option<&str> {
    let end = line.find('>')?;
    let level = &line[1..end];
    if level.is_empty() || !level.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(&line[end + 1..])
}

fn tokenize(body: &str) -> Result<Vec<Word>, MessageError> {
    let mut words = Vec::new();
    let mut current: Option<Word> = None;
    let mut quote: Option<char> = None;

    for c in body.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current
                    .get_or_insert_with(empty_word)
                    .text
                    .push(c);
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                current.get_or_insert_with(empty_word);
                quote = Some(c);
            }
            c if c.is_whitespace() => {
                if let Some(word) = current.take() {
                    words.push(word);
                }
            }
            '=' => {
                let word = current.get_or_insert_with(empty_word);
                if word.eq_pos.is_none() {
                    word.eq_pos = Some(word.text.len());
                }
                word.text.push(c);
            }
            c => current.get_or_insert_with(empty_word).text.push(c),
        }
    }

    if let Some(q) = quote {
        return Err(MessageError::UnterminatedQuote {
            quote: q,
            line: body.to_string(),
        });
    }
    if let Some(word) = current.take() {
        words.push(word);
    }
    Ok(words)
}

fn empty_word() -> Word {
    Word {
        text: String::new(),
        eq_pos: None,
    }
}

fn split_named(text: &str, eq_pos: Option<usize>) -> Option<Token> {
    let eq = eq_pos?;
    let key = &text[..eq];
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }
    Some(Token::Named {
        key: key.to_string(),
        value: text[eq + 1..].to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
