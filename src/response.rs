//! Turns NSRDB payloads into [`Table`]s.
//!
//! Data files start with two metadata rows (column names, then values for the
//! site: Source, Location ID, Latitude, ...), followed by the real header and
//! the data rows. Multi-site or multi-year requests arrive as a zip archive of
//! such files.

use std::io::{Cursor, Read};

use log::debug;

use crate::error::{NsrdbError, Result};
use crate::table::{Column, ColumnKind, Table, Value};
use crate::util::looks_like_zip;

/// Leading records before the column header.
pub const METADATA_LINES: usize = 2;

/// Archive entries considered data files.
pub const CSV_ENTRY_SUFFIX: &str = ".csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Csv,
    Zip,
}

impl PayloadKind {
    /// Picks the kind from the `Content-Type`, falling back to the zip signature.
    pub fn detect(content_type: Option<&str>, bytes: &[u8]) -> Self {
        let ct = content_type.unwrap_or("").to_ascii_lowercase();
        if ct.contains("zip") || looks_like_zip(bytes) {
            PayloadKind::Zip
        } else {
            PayloadKind::Csv
        }
    }
}

/// Conventions of the current API version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOptions {
    pub skip_lines: usize,
    pub entry_suffix: String,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            skip_lines: METADATA_LINES,
            entry_suffix: CSV_ENTRY_SUFFIX.to_string(),
        }
    }
}

/// Parses a payload of the given kind.
pub fn materialize(bytes: &[u8], kind: PayloadKind, options: &MaterializeOptions) -> Result<Table> {
    match kind {
        PayloadKind::Csv => parse_csv(bytes, options),
        PayloadKind::Zip => {
            let (name, data) = single_entry(bytes, options)?;
            let mut table = parse_csv(&data, options)?;
            table.source = Some(name);
            Ok(table)
        }
    }
}

/// Parses every data file in an archive, in archive order.
pub fn materialize_archive_entries(bytes: &[u8], options: &MaterializeOptions) -> Result<Vec<Table>> {
    let mut archive = open_archive(bytes)?;
    let names = candidate_entries(&mut archive, options)?;

    let mut tables = Vec::with_capacity(names.len());
    for (index, name) in names {
        let data = read_entry(&mut archive, index, &name)?;
        let mut table = parse_csv(&data, options)?;
        table.source = Some(name);
        tables.push(table);
    }
    Ok(tables)
}

/// The one data file of an archive.
pub fn single_entry(bytes: &[u8], options: &MaterializeOptions) -> Result<(String, Vec<u8>)> {
    let mut archive = open_archive(bytes)?;
    let mut names = candidate_entries(&mut archive, options)?;

    match names.len() {
        1 => {
            let (index, name) = names.remove(0);
            let data = read_entry(&mut archive, index, &name)?;
            debug!("unpacked {} ({} bytes)", name, data.len());
            Ok((name, data))
        }
        0 => Err(NsrdbError::MalformedArchive(format!(
            "no `*{}` entry in archive",
            options.entry_suffix
        ))),
        n => Err(NsrdbError::MalformedArchive(format!(
            "expected one `*{}` entry, found {}: {}",
            options.entry_suffix,
            n,
            names
                .iter()
                .map(|(_, name)| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| NsrdbError::MalformedArchive(format!("cannot open archive: {e}")))
}

fn candidate_entries(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    options: &MaterializeOptions,
) -> Result<Vec<(usize, String)>> {
    let suffix = options.entry_suffix.to_ascii_lowercase();
    let mut out = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| NsrdbError::MalformedArchive(format!("entry {index}: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.to_ascii_lowercase().ends_with(&suffix) {
            out.push((index, name));
        }
    }
    Ok(out)
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    index: usize,
    name: &str,
) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_index(index)
        .map_err(|e| NsrdbError::MalformedArchive(format!("{name}: {e}")))?;
    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(|e| NsrdbError::MalformedArchive(format!("{name}: {e}")))?;
    Ok(data)
}

/// Parses one NSRDB CSV file.
pub fn parse_csv(bytes: &[u8], options: &MaterializeOptions) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut records = reader.records();

    let mut preamble = Vec::with_capacity(options.skip_lines);
    for _ in 0..options.skip_lines {
        match records.next() {
            Some(record) => preamble.push(record?),
            None => {
                return Err(NsrdbError::MalformedData {
                    row: 0,
                    column: String::new(),
                    reason: format!(
                        "expected {} metadata lines before the header",
                        options.skip_lines
                    ),
                });
            }
        }
    }

    let metadata = match preamble.as_slice() {
        [keys, values, ..] => keys
            .iter()
            .zip(values.iter())
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        _ => Vec::new(),
    };

    let header = match records.next() {
        Some(record) => record?,
        None => {
            return Err(NsrdbError::MalformedData {
                row: 0,
                column: String::new(),
                reason: "missing column header".to_string(),
            });
        }
    };
    let columns: Vec<Column> = header
        .iter()
        .map(|name| Column {
            name: name.to_string(),
            kind: ColumnKind::for_name(name),
        })
        .collect();

    let mut rows = Vec::new();
    for (row, record) in records.enumerate() {
        let record = record?;
        if record.len() != columns.len() {
            let column = columns
                .get(record.len())
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("#{}", columns.len()));
            return Err(NsrdbError::MalformedData {
                row,
                column,
                reason: format!(
                    "row has {} fields, header has {}",
                    record.len(),
                    columns.len()
                ),
            });
        }

        let mut values = Vec::with_capacity(columns.len());
        for (field, column) in record.iter().zip(&columns) {
            values.push(coerce(field, column, row)?);
        }
        rows.push(values);
    }

    debug!(
        "parsed {} rows x {} columns ({} metadata fields)",
        rows.len(),
        columns.len(),
        metadata.len()
    );

    Ok(Table {
        metadata,
        columns,
        rows,
        source: None,
    })
}

fn coerce(field: &str, column: &Column, row: usize) -> Result<Value> {
    let parsed = match column.kind {
        ColumnKind::Integer => field.parse::<i64>().map(Value::Integer).ok(),
        ColumnKind::Float => field.parse::<f64>().map(Value::Float).ok(),
    };
    parsed.ok_or_else(|| NsrdbError::MalformedData {
        row,
        column: column.name.clone(),
        reason: format!(
            "`{field}` is not {}",
            match column.kind {
                ColumnKind::Integer => "an integer",
                ColumnKind::Float => "a number",
            }
        ),
    })
}
