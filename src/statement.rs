//! Prepared statements.
//!
//! A statement keeps its template and a set of typed bindings. Nothing is
//! sent to the native layer until [`Statement::execute`], where the bindings
//! are read, converted to their declared type and either passed in the native
//! parameter array or written into the SQL text.

use std::collections::BTreeMap;
use std::ffi::CString;

use hashlink::LinkedHashMap;

use crate::params::QueryParams;
use crate::sql::{self, Placeholder, PlaceholderStyle};
use crate::{Connection, Error, Result, Value, ValueType};

/// Statement keywords that make a template a write.
const WRITE_KEYWORDS: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "REPLACE", "CREATE", "DROP", "ALTER",
];

/// The key a value is bound under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKey {
    /// A marker such as `:id` or `@id`, prefix included.
    Named(String),
    /// A 1-based position.
    Positional(usize),
}

/// Types that can name a statement parameter.
///
/// Strings starting with `:`, `@` or `$` are named parameters; strings that
/// parse as an integer and integers are 1-based positions.
pub trait BindKey {
    fn bind_key(self) -> Result<ParamKey>;
}

impl BindKey for ParamKey {
    fn bind_key(self) -> Result<ParamKey> {
        match self {
            ParamKey::Positional(0) => Err(Error::InvalidParameterName("0".to_string())),
            key => Ok(key),
        }
    }
}

impl BindKey for usize {
    fn bind_key(self) -> Result<ParamKey> {
        ParamKey::Positional(self).bind_key()
    }
}

impl BindKey for i32 {
    fn bind_key(self) -> Result<ParamKey> {
        match usize::try_from(self) {
            Ok(index) => index.bind_key(),
            Err(_) => Err(Error::InvalidParameterName(self.to_string())),
        }
    }
}

impl BindKey for &str {
    fn bind_key(self) -> Result<ParamKey> {
        if self.len() > 1 && self.starts_with([':', '@', '$']) {
            return Ok(ParamKey::Named(self.to_string()));
        }
        match self.trim().parse::<usize>() {
            Ok(index) => index.bind_key(),
            Err(_) => Err(Error::InvalidParameterName(self.to_string())),
        }
    }
}

impl BindKey for &String {
    fn bind_key(self) -> Result<ParamKey> {
        self.as_str().bind_key()
    }
}

enum Source<'a> {
    Snapshot(Value),
    Deferred(Box<dyn Fn() -> Value + 'a>),
}

struct Binding<'a> {
    source: Source<'a>,
    ty: ValueType,
}

impl Binding<'_> {
    fn resolve(&self) -> Value {
        let value = match &self.source {
            Source::Snapshot(value) => value.clone(),
            Source::Deferred(read) => read(),
        };
        value.coerce(self.ty)
    }
}

/// A prepared statement, created by [`Connection::prepare`].
///
/// A template uses positional (`?`, `?NNN`) or named (`:x`, `@x`, `$x`)
/// placeholders, never both, and every binding has to use the same style.
pub struct Statement<'a> {
    conn: &'a Connection,
    template: String,
    style: PlaceholderStyle,
    named: LinkedHashMap<String, Binding<'a>>,
    positional: BTreeMap<usize, Binding<'a>>,
    closed: bool,
}

impl<'a> Statement<'a> {
    pub(crate) fn new(conn: &'a Connection, sql: &str) -> Result<Statement<'a>> {
        let style = PlaceholderStyle::detect(sql)?;
        Ok(Statement {
            conn,
            template: sql.to_string(),
            style,
            named: LinkedHashMap::new(),
            positional: BTreeMap::new(),
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::UseAfterClose("statement"));
        }
        Ok(())
    }

    fn bind(&mut self, key: impl BindKey, binding: Binding<'a>) -> Result<()> {
        self.check_open()?;
        match key.bind_key()? {
            ParamKey::Named(name) if self.style == PlaceholderStyle::Named => {
                self.named.insert(name, binding);
            }
            ParamKey::Positional(index) if self.style == PlaceholderStyle::Positional => {
                self.positional.insert(index, binding);
            }
            ParamKey::Named(name) => return Err(Error::MixedParameterStyle(name)),
            ParamKey::Positional(index) => {
                return Err(Error::MixedParameterStyle(index.to_string()))
            }
        }
        Ok(())
    }

    /// Binds `read` to a parameter. It is called on every execution, so
    /// changes made between binding and executing are picked up.
    pub fn bind_param<F, V>(&mut self, key: impl BindKey, read: F, ty: ValueType) -> Result<()>
    where
        F: Fn() -> V + 'a,
        V: Into<Value>,
    {
        let source = Source::Deferred(Box::new(move || read().into()));
        self.bind(key, Binding { source, ty })
    }

    /// Binds a copy of `value` to a parameter.
    pub fn bind_value(&mut self, key: impl BindKey, value: impl Into<Value>, ty: ValueType) -> Result<()> {
        let source = Source::Snapshot(value.into());
        self.bind(key, Binding { source, ty })
    }

    /// Dense positional bindings whose values survive the native text array
    /// unchanged. The array binds every entry as text, so only non-empty
    /// text qualifies; numbers keep their declared type as inlined literals.
    fn native_values(&self) -> Option<Vec<Value>> {
        let mut values = Vec::with_capacity(self.positional.len());
        for (expected, (index, binding)) in (1..).zip(&self.positional) {
            if *index != expected {
                return None;
            }
            match binding.resolve() {
                Value::Text(text) if !text.is_empty() => values.push(Value::Text(text)),
                _ => return None,
            }
        }
        Some(values)
    }

    /// Writes every binding into the template. Placeholders without a value
    /// render as `NULL`.
    fn substitute(&self) -> String {
        let mut anonymous = self.positional.values();

        sql::rewrite(&self.template, |placeholder| {
            let binding = match placeholder {
                Placeholder::Named(marker) => self.named.get(marker),
                Placeholder::Anonymous => anonymous.next(),
                Placeholder::Numbered(index) => self.positional.get(&index),
            };
            Some(binding.map_or_else(|| "NULL".to_string(), |b| sql::literal(&b.resolve())))
        })
    }

    /// Executes the statement. Returns `Ok(false)` when the native layer
    /// reports a failure.
    ///
    /// Named bindings, and positional bindings the native text array cannot
    /// carry faithfully (numbers, NULL, blobs, empty text, gaps in the
    /// positions), are written into the SQL; dense text bindings go in the
    /// parameter array. Bindings are kept, so the statement can be executed again.
    pub fn execute(&self) -> Result<bool> {
        self.check_open()?;

        let native = if self.named.is_empty() {
            self.native_values()
        } else {
            None
        };
        let (sql, params) = match native {
            Some(values) => (CString::new(self.template.as_str())?, QueryParams::encode(&values)?),
            None => (CString::new(self.substitute())?, QueryParams::empty()),
        };
        self.conn.exec_native(&sql, &params)
    }

    /// The template, or with `expand` set, the template with every binding
    /// written in as [`execute`](Statement::execute) would, unbound
    /// placeholders rendering as `NULL`.
    pub fn sql(&self, expand: bool) -> Result<String> {
        self.check_open()?;
        if expand {
            Ok(self.substitute())
        } else {
            Ok(self.template.clone())
        }
    }

    /// Number of bound parameters.
    pub fn param_count(&self) -> usize {
        self.named.len() + self.positional.len()
    }

    /// `false` if the template contains a write keyword anywhere (even inside
    /// a string or identifier) or if a binding is declared as `Null`.
    pub fn read_only(&self) -> bool {
        let upper = self.template.to_ascii_uppercase();
        if WRITE_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
            return false;
        }
        !self
            .named
            .values()
            .chain(self.positional.values())
            .any(|b| b.ty == ValueType::Null)
    }

    /// Removes every binding.
    pub fn reset(&mut self) -> Result<()> {
        self.check_open()?;
        self.named.clear();
        self.positional.clear();
        Ok(())
    }

    /// Sets every bound value to `NULL`, keeping keys and declared types.
    pub fn clear(&mut self) -> Result<()> {
        self.check_open()?;
        for binding in self.named.values_mut().chain(self.positional.values_mut()) {
            binding.source = Source::Snapshot(Value::Null);
        }
        Ok(())
    }

    /// Drops the bindings. Any later use fails with
    /// [`Error::UseAfterClose`].
    pub fn close(&mut self) {
        self.named.clear();
        self.positional.clear();
        self.closed = true;
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("template", &self.template)
            .field("style", &self.style)
            .field("param_count", &self.param_count())
            .field("closed", &self.closed)
            .finish()
    }
}
