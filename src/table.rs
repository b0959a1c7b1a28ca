use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::util::{output_path, write_file};

/// Column names holding timestamp components, parsed as integers.
pub const INTEGER_COLUMNS: [&str; 5] = ["Year", "Month", "Day", "Hour", "Minute"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
}

impl ColumnKind {
    pub fn for_name(name: &str) -> Self {
        if INTEGER_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            ColumnKind::Integer
        } else {
            ColumnKind::Float
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(_) => None,
        }
    }

    /// Integers widen to `f64`.
    fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Integer(v) => *v as f64,
            Value::Float(v) => *v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Tabular NSRDB data: typed columns, rows in the order the API sent them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Site metadata from the leading key/value rows (Source, Location ID,
    /// Latitude, Longitude, Time Zone, Elevation, ...).
    pub metadata: Vec<(String, String)>,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    /// Archive entry the data came from, if any.
    pub source: Option<String>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn values(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Values of an integer column.
    pub fn integers(&self, name: &str) -> Option<Vec<i64>> {
        let idx = self.column_index(name)?;
        if self.columns[idx].kind != ColumnKind::Integer {
            return None;
        }
        self.rows.iter().map(|row| row[idx].as_i64()).collect()
    }

    /// Values of any column as `f64`.
    pub fn floats(&self, name: &str) -> Option<Vec<f64>> {
        Some(self.values(name)?.map(Value::as_f64).collect())
    }

    /// Same metadata, columns and cells as `other`. Unlike `==` this ignores
    /// `source` and treats two `NaN` cells as equal.
    pub fn same_data(&self, other: &Table) -> bool {
        self.metadata == other.metadata
            && self.columns == other.columns
            && self.rows.len() == other.rows.len()
            && self.rows.iter().zip(&other.rows).all(|(a, b)| {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            })
    }

    /// Serializes back to the API layout: metadata key row, metadata value
    /// row, header, data.
    ///
    /// `source` is not part of the output, so a table read from an archive
    /// only compares equal to its re-parsed self through [`Table::same_data`].
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        if self.metadata.is_empty() {
            writer.write_record([""])?;
            writer.write_record([""])?;
        } else {
            writer.write_record(self.metadata.iter().map(|(k, _)| k.as_str()))?;
            writer.write_record(self.metadata.iter().map(|(_, v)| v.as_str()))?;
        }
        writer.write_record(self.column_names())?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes [`Table::to_csv`] to `target` and returns the path written.
    ///
    /// An existing directory gets a file named after the archive entry the
    /// table came from, or `nsrdb_data.csv`.
    pub fn write_csv(&self, target: &Path) -> Result<PathBuf> {
        let default_name = self
            .source
            .as_deref()
            .and_then(|s| Path::new(s).file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("nsrdb_data.csv");
        let path = output_path(target, default_name)?;
        write_file(&path, self.to_csv()?.as_bytes())?;
        Ok(path)
    }
}
