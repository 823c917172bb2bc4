//! Decoding of native result sets.
//!
//! The native query call answers with a JSON array of row objects. Each row
//! maps a column name to a type-tagged value, a one-entry object such as
//! `{"Integer": 1}` or `{"text": "a"}`; a null may also arrive as the bare
//! string `"Null"` or as JSON `null`.

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use hashlink::LinkedHashMap;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value as JsonValue;

use crate::{Connection, Error, Result, Value, ValueType};

/// How rows are projected by [`QueryResult::fetch_array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Column name to value.
    Assoc = 1,
    /// Values in column order.
    Num = 2,
    /// Every value under both its column name and its position.
    Both = 3,
}

impl TryFrom<i32> for FetchMode {
    type Error = Error;

    fn try_from(mode: i32) -> Result<FetchMode> {
        match mode {
            1 => Ok(FetchMode::Assoc),
            2 => Ok(FetchMode::Num),
            3 => Ok(FetchMode::Both),
            other => Err(Error::InvalidFetchMode(other)),
        }
    }
}

/// Addresses a column by name or by 0-based position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    Name(String),
    Index(usize),
}

impl From<&str> for ColumnKey {
    fn from(name: &str) -> ColumnKey {
        ColumnKey::Name(name.to_string())
    }
}

impl From<String> for ColumnKey {
    fn from(name: String) -> ColumnKey {
        ColumnKey::Name(name)
    }
}

impl From<usize> for ColumnKey {
    fn from(index: usize) -> ColumnKey {
        ColumnKey::Index(index)
    }
}

/// Negative positions never name a column.
impl From<i32> for ColumnKey {
    fn from(index: i32) -> ColumnKey {
        ColumnKey::Index(usize::try_from(index).unwrap_or(usize::MAX))
    }
}

/// A row of the BOTH projection: every value is reachable under its column
/// name and under its position, so `row["id"] == row[0]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BothRow(LinkedHashMap<ColumnKey, Value>);

impl BothRow {
    pub fn get(&self, key: impl Into<ColumnKey>) -> Option<&Value> {
        self.0.get(&key.into())
    }

    /// Number of entries, twice the number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnKey, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<ColumnKey>> Index<K> for BothRow {
    type Output = Value;

    fn index(&self, key: K) -> &Value {
        let key = key.into();
        match self.0.get(&key) {
            Some(value) => value,
            None => panic!("no column {key:?} in row"),
        }
    }
}

/// Rows projected by [`QueryResult::fetch_array`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedRows {
    Assoc(Vec<LinkedHashMap<String, Value>>),
    Num(Vec<Vec<Value>>),
    Both(Vec<BothRow>),
}

impl FetchedRows {
    pub fn len(&self) -> usize {
        match self {
            FetchedRows::Assoc(rows) => rows.len(),
            FetchedRows::Num(rows) => rows.len(),
            FetchedRows::Both(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Column {
    index: usize,
    ty: ValueType,
}

#[derive(Debug, Default)]
struct Table {
    columns: LinkedHashMap<String, Column>,
    rows: Vec<Vec<Value>>,
}

/// One row object of the payload, entries in payload order.
struct RawRow(Vec<(String, JsonValue)>);

impl<'de> Deserialize<'de> for RawRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = RawRow;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a row object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<RawRow, A::Error> {
                let mut cells = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(cell) = map.next_entry()? {
                    cells.push(cell);
                }
                Ok(RawRow(cells))
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

fn invalid(tag: &str, literal: &JsonValue) -> Error {
    Error::InvalidResponse(format!("{tag}: {literal}"))
}

fn parse_literal<T: FromStr>(tag: &str, literal: &str) -> Result<T> {
    literal
        .trim()
        .parse()
        .map_err(|_| Error::InvalidResponse(format!("{tag}: {literal:?}")))
}

/// Decodes one type-tagged cell. Unknown tags decode as text.
fn decode_cell(cell: JsonValue) -> Result<(ValueType, Value)> {
    let (tag, literal) = match cell {
        JsonValue::Null => return Ok((ValueType::Null, Value::Null)),
        JsonValue::String(tag) if tag.parse::<ValueType>() == Ok(ValueType::Null) => {
            return Ok((ValueType::Null, Value::Null))
        }
        JsonValue::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some(entry) => entry,
            None => return Ok((ValueType::Null, Value::Null)),
        },
        other => return Err(Error::InvalidResponse(other.to_string())),
    };

    let ty = tag.parse().unwrap_or(ValueType::Text);
    let value = match (ty, literal) {
        (ValueType::Null, _) | (_, JsonValue::Null) => Value::Null,
        (ValueType::Integer, JsonValue::Number(n)) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Integer(n.as_f64().unwrap_or_default() as i64),
        },
        (ValueType::Integer, JsonValue::String(s)) => Value::Integer(parse_literal(&tag, &s)?),
        (ValueType::Integer, JsonValue::Bool(b)) => Value::Integer(b as i64),
        (ValueType::Float, JsonValue::Number(n)) => Value::Real(n.as_f64().unwrap_or_default()),
        (ValueType::Float, JsonValue::String(s)) => Value::Real(parse_literal(&tag, &s)?),
        (ValueType::Text, JsonValue::String(s)) => Value::Text(s),
        (ValueType::Text, other) => Value::Text(other.to_string()),
        (ValueType::Blob, JsonValue::String(s)) => Value::Blob(s.into_bytes()),
        (ValueType::Blob, JsonValue::Array(items)) => Value::Blob(
            items
                .iter()
                .map(|b| {
                    b.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| invalid(&tag, b))
                })
                .collect::<Result<Vec<u8>>>()?,
        ),
        (_, other) => return Err(invalid(&tag, &other)),
    };
    Ok((ty, value))
}

impl Table {
    fn decode(json: &str) -> Result<Table> {
        let raw_rows: Vec<RawRow> = serde_json::from_str(json)?;

        let mut decoded = Vec::with_capacity(raw_rows.len());
        let mut columns = LinkedHashMap::new();
        for RawRow(cells) in raw_rows {
            let mut row = Vec::with_capacity(cells.len());
            for (name, cell) in cells {
                let (ty, value) = decode_cell(cell)?;
                let index = columns.len();
                columns
                    .entry(name.clone())
                    .or_insert(Column { index, ty });
                row.push((name, value));
            }
            decoded.push(row);
        }

        let rows = decoded
            .into_iter()
            .map(|cells| {
                let mut row = vec![Value::Null; columns.len()];
                for (name, value) in cells {
                    if let Some(column) = columns.get(&name) {
                        row[column.index] = value;
                    }
                }
                row
            })
            .collect();

        Ok(Table { columns, rows })
    }

    fn column(&self, key: &ColumnKey) -> Option<&Column> {
        match key {
            ColumnKey::Name(name) => self.columns.get(name),
            ColumnKey::Index(index) => self.columns.values().nth(*index),
        }
    }
}

/// A decoded result set.
///
/// Columns are ordered by first appearance across the rows, and every row
/// holds exactly [`num_columns`](QueryResult::num_columns) values in that
/// order; a column missing from a row reads as `NULL`. The set is immutable
/// until [`reset`](QueryResult::reset) or
/// [`finalize`](QueryResult::finalize), after which every accessor fails with
/// [`Error::UseAfterClose`].
#[derive(Debug)]
pub struct QueryResult<'conn> {
    table: Option<Table>,
    conn: Option<&'conn Connection>,
}

impl QueryResult<'static> {
    /// Decodes a native payload that is not tied to a connection.
    pub fn from_json(json: &str) -> Result<QueryResult<'static>> {
        Ok(QueryResult {
            table: Some(Table::decode(json)?),
            conn: None,
        })
    }
}

impl<'conn> QueryResult<'conn> {
    pub(crate) fn with_connection(json: &str, conn: &'conn Connection) -> Result<QueryResult<'conn>> {
        Ok(QueryResult {
            table: Some(Table::decode(json)?),
            conn: Some(conn),
        })
    }

    fn table(&self) -> Result<&Table> {
        self.table
            .as_ref()
            .ok_or(Error::UseAfterClose("query result"))
    }

    pub fn fetch_array(&self, mode: FetchMode) -> Result<FetchedRows> {
        Ok(match mode {
            FetchMode::Assoc => FetchedRows::Assoc(self.fetch_assoc()?),
            FetchMode::Num => FetchedRows::Num(self.fetch_num()?),
            FetchMode::Both => FetchedRows::Both(self.fetch_both()?),
        })
    }

    pub fn fetch_assoc(&self) -> Result<Vec<LinkedHashMap<String, Value>>> {
        let table = self.table()?;
        Ok(table
            .rows
            .iter()
            .map(|row| {
                table
                    .columns
                    .keys()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect())
    }

    pub fn fetch_num(&self) -> Result<Vec<Vec<Value>>> {
        Ok(self.table()?.rows.clone())
    }

    pub fn fetch_both(&self) -> Result<Vec<BothRow>> {
        let table = self.table()?;
        Ok(table
            .rows
            .iter()
            .map(|row| {
                let mut both = LinkedHashMap::with_capacity(row.len() * 2);
                for ((name, column), value) in table.columns.iter().zip(row) {
                    both.insert(ColumnKey::Name(name.clone()), value.clone());
                    both.insert(ColumnKey::Index(column.index), value.clone());
                }
                BothRow(both)
            })
            .collect())
    }

    pub fn num_columns(&self) -> Result<usize> {
        Ok(self.table()?.columns.len())
    }

    pub fn num_rows(&self) -> Result<usize> {
        Ok(self.table()?.rows.len())
    }

    /// The name of the column at `index`, `None` if out of range.
    pub fn column_name(&self, index: usize) -> Result<Option<&str>> {
        Ok(self
            .table()?
            .columns
            .keys()
            .nth(index)
            .map(String::as_str))
    }

    pub fn column_names(&self) -> Result<Vec<&str>> {
        Ok(self.table()?.columns.keys().map(String::as_str).collect())
    }

    /// The type of a column, looked up by name or position. An unknown name
    /// or an out of range position gives `None`.
    pub fn column_type(&self, key: impl Into<ColumnKey>) -> Result<Option<ValueType>> {
        Ok(self.table()?.column(&key.into()).map(|c| c.ty))
    }

    pub fn column_types(&self) -> Result<Vec<ValueType>> {
        Ok(self.table()?.columns.values().map(|c| c.ty).collect())
    }

    /// Column names paired with their types, in column order.
    pub fn columns(&self) -> Result<Vec<(&str, ValueType)>> {
        Ok(self
            .table()?
            .columns
            .iter()
            .map(|(name, c)| (name.as_str(), c.ty))
            .collect())
    }

    /// The decoded rows, aligned to [`columns`](QueryResult::columns).
    pub fn rows(&self) -> Result<&[Vec<Value>]> {
        Ok(&self.table()?.rows)
    }

    /// Invalidates the result set and resets the owning connection, if any.
    pub fn reset(&mut self) -> Result<()> {
        self.table = None;
        match self.conn {
            Some(conn) => conn.reset(),
            None => Ok(()),
        }
    }

    /// Invalidates the result set.
    pub fn finalize(&mut self) {
        self.table = None;
    }
}
