//! SQL statement validation for read-only enforcement.
//!
//! The SQL tools accept exactly one statement, and that statement must be a
//! `SELECT` (optionally preceded by a `WITH` clause). This module decides that
//! without parsing SQL: a single left-to-right scan tracks whether the cursor
//! is in code, a string, a quoted identifier, a comment or a dollar-quoted
//! body, so that a `;` hidden in any of those is never mistaken for a
//! statement separator, and a real separator is always found.
//!
//! A `;` in code is only allowed when nothing but whitespace and comments
//! follows it. Anything else after it is a second statement.
//!
//! Block comments do not nest: the first `*/` closes the comment.
//!
//! MySQL only reads `--` as a comment opener when whitespace, a control
//! character or the end of input follows it; `--1` is two minus signs.

use crate::error::{RuntimeResult, StatementRejection};
use crate::models::SqlEngine;
use regex::Regex;
use std::sync::LazyLock;

static SELECT_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(with\b.*?\bselect\b|select\b)").expect("valid regex"));

/// Outcome of validating one SQL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementValidity {
    /// The single statement, trimmed and without its terminating `;`.
    Valid(String),
    Rejected(StatementRejection),
}

impl StatementValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Convert into a result so callers can use `?`.
    pub fn into_result(self) -> RuntimeResult<String> {
        match self {
            Self::Valid(statement) => Ok(statement),
            Self::Rejected(reason) => Err(reason.into()),
        }
    }
}

/// Validate `sql` using PostgreSQL lexical rules.
pub fn validate(sql: &str) -> StatementValidity {
    SqlValidator::postgres().validate(sql)
}

/// Lexical rules that differ between engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlValidator {
    engine: SqlEngine,
}

/// One scanner state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState<'a> {
    Code,
    SingleQuoted { backslash_escapes: bool },
    DoubleQuoted { backslash_escapes: bool },
    Backtick,
    LineComment,
    BlockComment,
    DollarQuoted { tag: &'a [u8] },
}

impl SqlValidator {
    pub const fn postgres() -> Self {
        Self {
            engine: SqlEngine::PostgreSql,
        }
    }

    pub const fn for_engine(engine: SqlEngine) -> Self {
        Self { engine }
    }

    fn is_mysql(&self) -> bool {
        self.engine == SqlEngine::MySql
    }

    /// Validate one SQL input. Pure: the same input always gives the same
    /// answer.
    pub fn validate(&self, sql: &str) -> StatementValidity {
        let bytes = sql.as_bytes();
        let mut state = ScanState::Code;
        // Everything outside comments, used for the SELECT check.
        let mut code: Vec<u8> = Vec::with_capacity(bytes.len());
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();

            match state {
                ScanState::Code => match b {
                    b'-' if self.opens_line_comment(bytes, i) => {
                        state = ScanState::LineComment;
                        code.push(b' ');
                        i += 2;
                        continue;
                    }
                    b'#' if self.is_mysql() => {
                        state = ScanState::LineComment;
                        code.push(b' ');
                    }
                    // MySQL executes the body of /*! ... */, so it stays code.
                    b'/' if next == Some(b'*') && self.is_mysql() && bytes.get(i + 2) == Some(&b'!') => {
                        code.push(b' ');
                        i += 3;
                        continue;
                    }
                    b'/' if next == Some(b'*') => {
                        state = ScanState::BlockComment;
                        code.push(b' ');
                        i += 2;
                        continue;
                    }
                    b'\'' => {
                        state = ScanState::SingleQuoted {
                            backslash_escapes: self.is_mysql() || has_escape_prefix(bytes, i),
                        };
                        code.push(b);
                    }
                    b'"' => {
                        state = ScanState::DoubleQuoted {
                            backslash_escapes: self.is_mysql(),
                        };
                        code.push(b);
                    }
                    b'`' if self.is_mysql() => {
                        state = ScanState::Backtick;
                        code.push(b);
                    }
                    b'$' if !self.is_mysql() && !follows_identifier(bytes, i) => {
                        match dollar_tag_len(bytes, i) {
                            Some(len) => {
                                state = ScanState::DollarQuoted {
                                    tag: &bytes[i..i + len],
                                };
                                code.extend_from_slice(&bytes[i..i + len]);
                                i += len;
                                continue;
                            }
                            None => code.push(b),
                        }
                    }
                    b';' => {
                        if !self.only_trivia_after(bytes, i + 1) {
                            return StatementValidity::Rejected(
                                StatementRejection::MultipleStatements,
                            );
                        }
                        return classify(&sql[..i], code);
                    }
                    _ => code.push(b),
                },
                ScanState::SingleQuoted { backslash_escapes }
                | ScanState::DoubleQuoted { backslash_escapes } => {
                    let quote = if matches!(state, ScanState::SingleQuoted { .. }) {
                        b'\''
                    } else {
                        b'"'
                    };
                    if backslash_escapes && b == b'\\' {
                        code.push(b);
                        if let Some(escaped) = next {
                            code.push(escaped);
                        }
                        i += 2;
                        continue;
                    }
                    code.push(b);
                    if b == quote {
                        if next == Some(quote) {
                            code.push(quote);
                            i += 2;
                            continue;
                        }
                        state = ScanState::Code;
                    }
                }
                ScanState::Backtick => {
                    code.push(b);
                    if b == b'`' {
                        if next == Some(b'`') {
                            code.push(b'`');
                            i += 2;
                            continue;
                        }
                        state = ScanState::Code;
                    }
                }
                ScanState::LineComment => {
                    if b == b'\n' || b == b'\r' {
                        state = ScanState::Code;
                        code.push(b);
                    }
                }
                ScanState::BlockComment => {
                    if b == b'*' && next == Some(b'/') {
                        state = ScanState::Code;
                        i += 2;
                        continue;
                    }
                }
                ScanState::DollarQuoted { tag } => {
                    if bytes[i..].starts_with(tag) {
                        code.extend_from_slice(tag);
                        state = ScanState::Code;
                        i += tag.len();
                        continue;
                    }
                    code.push(b);
                }
            }
            i += 1;
        }

        classify(sql, code)
    }

    /// True when a `--` line comment starts at `i`.
    fn opens_line_comment(&self, bytes: &[u8], i: usize) -> bool {
        if bytes.get(i) != Some(&b'-') || bytes.get(i + 1) != Some(&b'-') {
            return false;
        }
        if !self.is_mysql() {
            return true;
        }
        match bytes.get(i + 2) {
            None => true,
            Some(&b) => b.is_ascii_whitespace() || b.is_ascii_control(),
        }
    }

    /// True when only whitespace and complete comments remain from `start`.
    /// An unterminated trailing block comment runs to the end of input.
    fn only_trivia_after(&self, bytes: &[u8], start: usize) -> bool {
        let mut i = start;
        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            if b.is_ascii_whitespace() {
                i += 1;
            } else if self.opens_line_comment(bytes, i) || (b == b'#' && self.is_mysql()) {
                while i < bytes.len() && bytes[i] != b'\n' && bytes[i] != b'\r' {
                    i += 1;
                }
            } else if b == b'/' && next == Some(b'*') {
                if self.is_mysql() && bytes.get(i + 2) == Some(&b'!') {
                    return false;
                }
                match find(bytes, i + 2, b"*/") {
                    Some(end) => i = end + 2,
                    None => return true,
                }
            } else {
                return false;
            }
        }
        true
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::postgres()
    }
}

/// Apply the SELECT-only rule to the comment-free text of the statement.
fn classify(statement: &str, code: Vec<u8>) -> StatementValidity {
    let code = String::from_utf8(code)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    let code = code.trim();

    if code.is_empty() {
        return StatementValidity::Rejected(StatementRejection::EmptyQuery);
    }
    if !SELECT_ONLY.is_match(code) {
        return StatementValidity::Rejected(StatementRejection::NotSelect);
    }
    StatementValidity::Valid(statement.trim().to_string())
}

/// A quote at `quote_at` opens an escape string when it is directly preceded
/// by a standalone `E`/`e` (not the tail of a longer identifier).
fn has_escape_prefix(bytes: &[u8], quote_at: usize) -> bool {
    quote_at > 0
        && matches!(bytes[quote_at - 1], b'E' | b'e')
        && !follows_identifier(bytes, quote_at - 1)
}

/// True when the byte before `at` continues an identifier, so `at` is not
/// the start of a new token. `$` counts: PostgreSQL identifiers may contain it.
fn follows_identifier(bytes: &[u8], at: usize) -> bool {
    at > 0 && is_identifier_byte(bytes[at - 1])
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Length of a `$tag$` opener starting at `start`, if there is one. A tag
/// follows identifier rules: it may be empty but must not start with a digit.
fn dollar_tag_len(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let mut end = start + 1;
    while end < bytes.len() && bytes[end] != b'$' && is_identifier_byte(bytes[end]) {
        end += 1;
    }
    (bytes.get(end) == Some(&b'$')).then_some(end + 1 - start)
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos)
}
