//! Placeholder scanning and literal substitution.
//!
//! The native parameter array is positional and text-only, so some bindings
//! have to be written into the SQL itself. Everything here works in one pass
//! over the template: quoted strings, quoted identifiers and comments are
//! skipped, and a substituted value is never scanned again.

use std::ffi::CString;
use std::ops::Range;

use crate::params::{Params, QueryParams};
use crate::{Error, Result, Value};

/// Escapes `text` for use inside a single-quoted SQL string literal.
///
/// Backslash, NUL, newline, carriage return and ctrl-Z are written as
/// backslash sequences, double quotes are backslash-escaped and single quotes
/// are doubled.
///
/// SQLite reads backslashes inside a string literal verbatim, so text holding
/// any of those characters is stored in its escaped form: `a\b` is stored as
/// `a\\b`. Only single quotes round-trip unchanged.
pub fn escape_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\x1a' => escaped.push_str("\\Z"),
            '\'' => escaped.push_str("''"),
            '"' => escaped.push_str("\\\""),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Renders a value as an SQL literal, text escaped with [`escape_string`].
pub(crate) fn literal(value: &Value) -> String {
    render_literal(value, escape_string)
}

/// Renders a value as an SQL literal that SQLite reads back unchanged: text
/// only has its single quotes doubled.
pub(crate) fn plain_literal(value: &Value) -> String {
    render_literal(value, |text| text.replace('\'', "''"))
}

fn render_literal(value: &Value, escape: impl Fn(&str) -> String) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_nan() => "NULL".to_string(),
        Value::Real(f) if f.is_infinite() => {
            let literal = if f.is_sign_positive() { "9e999" } else { "-9e999" };
            literal.to_string()
        }
        Value::Real(f) => f.to_string(),
        Value::Text(_) | Value::Blob(_) => format!("'{}'", escape(&value.to_text())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder<'a> {
    /// `?`
    Anonymous,
    /// `?NNN`
    Numbered(usize),
    /// `:name`, `@name` or `$name`, marker included.
    Named(&'a str),
}

/// The placeholder style of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// No placeholders at all.
    None,
    /// `?` or `?NNN` only.
    Positional,
    /// `:name`, `@name` or `$name` only.
    Named,
}

impl PlaceholderStyle {
    /// Fails with [`Error::MixedParameterStyle`] when `sql` uses both styles.
    pub fn detect(sql: &str) -> Result<PlaceholderStyle> {
        let mut positional = false;
        let mut named = false;
        scan(sql, |placeholder, _| match placeholder {
            Placeholder::Named(_) => named = true,
            _ => positional = true,
        });

        match (positional, named) {
            (false, false) => Ok(PlaceholderStyle::None),
            (true, false) => Ok(PlaceholderStyle::Positional),
            (false, true) => Ok(PlaceholderStyle::Named),
            (true, true) => Err(Error::MixedParameterStyle(sql.to_string())),
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn skip_past(bytes: &[u8], from: usize, close: u8) -> usize {
    match bytes[from..].iter().position(|&b| b == close) {
        Some(offset) => from + offset + 1,
        None => bytes.len(),
    }
}

/// Calls `visit` with every placeholder of `sql` and its byte range.
pub(crate) fn scan<'s, F>(sql: &'s str, mut visit: F)
where
    F: FnMut(Placeholder<'s>, Range<usize>),
{
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_past(bytes, i + 1, quote),
            b'[' => i = skip_past(bytes, i + 1, b']'),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_past(bytes, i + 2, b'\n'),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match sql[i + 2..].find("*/") {
                    Some(offset) => i + 2 + offset + 2,
                    None => bytes.len(),
                }
            }
            b'?' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let placeholder = if i > start + 1 {
                    sql[start + 1..i]
                        .parse()
                        .map_or(Placeholder::Anonymous, Placeholder::Numbered)
                } else {
                    Placeholder::Anonymous
                };
                visit(placeholder, start..i);
            }
            b':' | b'@' | b'$' => {
                let start = i;
                i += 1;
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                if i > start + 1 {
                    visit(Placeholder::Named(&sql[start..i]), start..i);
                }
            }
            _ => i += 1,
        }
    }
}

/// Replaces placeholders of `sql` for which `replace` returns a value. Other
/// placeholders are kept as written.
pub(crate) fn rewrite<'s, F>(sql: &'s str, mut replace: F) -> String
where
    F: FnMut(Placeholder<'s>) -> Option<String>,
{
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;
    scan(sql, |placeholder, range| {
        if let Some(replacement) = replace(placeholder) {
            out.push_str(&sql[copied..range.start]);
            out.push_str(&replacement);
            copied = range.end;
        }
    });
    out.push_str(&sql[copied..]);
    out
}

fn bare_name(name: &str) -> &str {
    name.strip_prefix([':', '@', '$']).unwrap_or(name)
}

/// Inlines named values as [`plain_literal`]s. A name matches its
/// placeholder whatever marker either side uses, so `id`, `:id` and `@id`
/// all replace `:id`, `@id` and `$id`.
pub(crate) fn inline_named(sql: &str, values: &[(String, Value)]) -> String {
    rewrite(sql, |placeholder| match placeholder {
        Placeholder::Named(marker) => values
            .iter()
            .find(|(name, _)| bare_name(name) == bare_name(marker))
            .map(|(_, value)| plain_literal(value)),
        _ => None,
    })
}

/// Prepares the SQL text and parameter array of one native call.
///
/// Positional values travel in the native array; named values are inlined
/// and the empty array is sent.
pub(crate) fn bind_call(sql: &str, params: Params) -> Result<(CString, QueryParams)> {
    match params {
        Params::None => Ok((CString::new(sql)?, QueryParams::empty())),
        Params::Positional(values) => Ok((CString::new(sql)?, QueryParams::encode(&values)?)),
        Params::Named(values) => Ok((
            CString::new(inline_named(sql, &values))?,
            QueryParams::empty(),
        )),
    }
}
