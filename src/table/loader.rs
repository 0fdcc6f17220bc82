//! Load and export tables as CSV

use super::{column_key, parse_date, parse_number, Table, Value};
use crate::error::EclResult;
use csv::{Reader, Writer};
use std::io::{Read, Write};
use std::path::Path;

/// Load a CSV file into a table
///
/// Columns listed in `text_columns` are kept as text (identifiers); the rest
/// are typed per column: numeric if every non-empty cell parses as a number,
/// else date if every non-empty cell parses as a date, else text.
pub fn load_table<P: AsRef<Path>>(path: P, text_columns: &[String]) -> EclResult<Table> {
    let reader = Reader::from_path(path)?;
    read_records(reader, text_columns)
}

/// Load a table from any reader (e.g., string buffer)
pub fn load_table_from_reader<R: Read>(reader: R, text_columns: &[String]) -> EclResult<Table> {
    read_records(Reader::from_reader(reader), text_columns)
}

fn read_records<R: Read>(mut reader: Reader<R>, text_columns: &[String]) -> EclResult<Table> {
    let headers: Vec<String> = reader.headers()?.iter().map(column_key).collect();
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for result in reader.records() {
        let record = result?;
        for (col, cells) in raw.iter_mut().enumerate() {
            cells.push(record.get(col).unwrap_or("").to_string());
        }
    }

    let forced: Vec<String> = text_columns.iter().map(|c| column_key(c)).collect();
    let mut table = Table::new();
    for (name, cells) in headers.iter().zip(raw) {
        let values = if forced.contains(name) {
            cells.iter().map(|c| Value::from_raw(c.trim())).collect()
        } else {
            infer_column(cells)
        };
        table.set_column(name, values)?;
    }
    Ok(table)
}

fn infer_column(cells: Vec<String>) -> Vec<Value> {
    let filled = || cells.iter().filter(|c| !c.trim().is_empty());

    if filled().all(|c| parse_number(c).is_some()) {
        return cells
            .iter()
            .map(|c| parse_number(c).map(Value::Number).unwrap_or(Value::Null))
            .collect();
    }
    if filled().all(|c| parse_date(c).is_some()) {
        return cells
            .iter()
            .map(|c| parse_date(c).map(Value::Date).unwrap_or(Value::Null))
            .collect();
    }
    cells.iter().map(|c| Value::from_raw(c.trim())).collect()
}

/// Export a table to a CSV file
pub fn write_table<P: AsRef<Path>>(path: P, table: &Table) -> EclResult<()> {
    let writer = Writer::from_path(path)?;
    write_records(writer, table)
}

/// Export a table to any writer
pub fn write_table_to_writer<W: Write>(writer: W, table: &Table) -> EclResult<()> {
    write_records(Writer::from_writer(writer), table)
}

fn write_records<W: Write>(mut writer: Writer<W>, table: &Table) -> EclResult<()> {
    writer.write_record(table.column_names())?;
    let columns: Vec<&[Value]> = table
        .column_names()
        .iter()
        .filter_map(|name| table.column(name))
        .collect();
    for row in 0..table.n_rows() {
        writer.write_record(columns.iter().map(|c| c[row].to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
