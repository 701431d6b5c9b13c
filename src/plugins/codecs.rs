//! One codec per payload format.
//!
//! Tabular payloads go to a small SQLite database (labels keep their int/text type, floats
//! keep all 64 bits, NaN is stored as NULL). Arrays and generic objects are `bincode`
//! encoded behind a magic/version envelope.

use crate::core::error::{Result, StoreError};
use crate::core::schemas;
use crate::plugins::payload::{
    Column, ColumnData, Format, Generic, Label, NdArray, Payload, Table, TableKind,
};
use bincode::Options;
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub trait PayloadCodec {
    fn format(&self) -> Format;

    fn file_name(&self) -> &'static str {
        self.format().file_name()
    }

    /// Write `payload` to a fresh file at `path`.
    fn encode(&self, payload: &Payload, path: &Path) -> Result<()>;

    /// Read the file at `path`; `handle` labels errors.
    fn decode(&self, path: &Path, handle: &str) -> Result<Payload>;
}

pub struct TabularCodec;
pub struct ArrayCodec;
pub struct GenericCodec;

pub fn codec_for(format: Format) -> &'static dyn PayloadCodec {
    match format {
        Format::Tabular => &TabularCodec,
        Format::Array => &ArrayCodec,
        Format::Generic => &GenericCodec,
    }
}

fn corrupt(handle: &str, reason: impl ToString) -> StoreError {
    StoreError::CorruptData {
        handle: handle.to_string(),
        reason: reason.to_string(),
    }
}

fn wrong_variant(codec: Format, payload: &Payload) -> StoreError {
    StoreError::UnsupportedPayload(format!(
        "{} codec cannot store a {} payload",
        codec,
        payload.format()
    ))
}

// --- Tabular ---

fn label_to_value(label: &Label) -> Value {
    match label {
        Label::Int(i) => Value::Integer(*i),
        Label::Text(s) => Value::Text(s.clone()),
    }
}

fn value_to_label(value: Value, handle: &str) -> Result<Label> {
    match value {
        Value::Integer(i) => Ok(Label::Int(i)),
        Value::Text(s) => Ok(Label::Text(s)),
        other => Err(corrupt(handle, format!("unexpected label {:?}", other))),
    }
}

impl PayloadCodec for TabularCodec {
    fn format(&self) -> Format {
        Format::Tabular
    }

    fn encode(&self, payload: &Payload, path: &Path) -> Result<()> {
        let Payload::Tabular(table) = payload else {
            return Err(wrong_variant(self.format(), payload));
        };
        if path.exists() {
            fs::remove_file(path).map_err(StoreError::IoError)?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute(schemas::TABULAR_DB_SCHEMA_META, [])?;
        conn.execute(schemas::TABULAR_DB_SCHEMA_COLUMNS, [])?;
        conn.execute(schemas::TABULAR_DB_SCHEMA_ROW_INDEX, [])?;
        conn.execute(schemas::TABULAR_DB_SCHEMA_CELLS, [])?;

        let tx = conn.transaction()?;
        {
            tx.execute(
                "INSERT INTO meta(key, value) VALUES('kind', ?1), ('version', ?2)",
                params![table.kind().as_str(), schemas::PAYLOAD_FILE_VERSION.to_string()],
            )?;

            let mut insert_row = tx.prepare("INSERT INTO row_index(position, label) VALUES(?1, ?2)")?;
            for (pos, label) in table.index().iter().enumerate() {
                insert_row.execute(params![pos as i64, label_to_value(label)])?;
            }

            let mut insert_col =
                tx.prepare("INSERT INTO columns(position, label, dtype) VALUES(?1, ?2, ?3)")?;
            let mut insert_cell = tx.prepare("INSERT INTO cells(col, row, value) VALUES(?1, ?2, ?3)")?;
            for (c, column) in table.columns().iter().enumerate() {
                let c = c as i64;
                insert_col.execute(params![c, label_to_value(&column.label), column.data.dtype()])?;
                match &column.data {
                    ColumnData::Float(values) => {
                        for (r, v) in values.iter().enumerate() {
                            let v = if v.is_nan() { Value::Null } else { Value::Real(*v) };
                            insert_cell.execute(params![c, r as i64, v])?;
                        }
                    }
                    ColumnData::Int(values) => {
                        for (r, v) in values.iter().enumerate() {
                            insert_cell.execute(params![c, r as i64, v])?;
                        }
                    }
                    ColumnData::Text(values) => {
                        for (r, v) in values.iter().enumerate() {
                            insert_cell.execute(params![c, r as i64, v])?;
                        }
                    }
                }
            }
        }
        tx.commit()?;
        conn.close().map_err(|(_, e)| StoreError::RusqliteError(e))?;
        Ok(())
    }

    fn decode(&self, path: &Path, handle: &str) -> Result<Payload> {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| corrupt(handle, e))?;
        read_table(&conn, handle).map(Payload::Tabular).map_err(|e| match e {
            StoreError::RusqliteError(e) => corrupt(handle, e),
            other => other,
        })
    }
}

fn read_table(conn: &Connection, handle: &str) -> Result<Table> {
    let kind: String = conn.query_row("SELECT value FROM meta WHERE key = 'kind'", [], |r| r.get(0))?;
    let kind = TableKind::parse(&kind).ok_or_else(|| corrupt(handle, format!("unknown table kind '{}'", kind)))?;

    let mut stmt = conn.prepare("SELECT label FROM row_index ORDER BY position")?;
    let index = stmt
        .query_map([], |r| r.get::<_, Value>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|v| value_to_label(v, handle))
        .collect::<Result<Vec<_>>>()?;
    let nrows = index.len();

    let mut stmt = conn.prepare("SELECT position, label, dtype FROM columns ORDER BY position")?;
    let specs = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Value>(1)?, r.get::<_, String>(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut cells = conn.prepare("SELECT row, value FROM cells WHERE col = ?1 ORDER BY row")?;
    let mut columns = Vec::with_capacity(specs.len());
    for (position, label, dtype) in specs {
        let label = value_to_label(label, handle)?;
        let values = cells
            .query_map([position], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Value>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if values.len() != nrows || values.iter().enumerate().any(|(i, (row, _))| *row != i as i64) {
            return Err(corrupt(handle, format!("column {} does not cover every row", position)));
        }
        let values = values.into_iter().map(|(_, v)| v);
        let data = match dtype.as_str() {
            "float64" => ColumnData::Float(
                values
                    .map(|v| match v {
                        Value::Real(f) => Ok(f),
                        Value::Integer(i) => Ok(i as f64),
                        Value::Null => Ok(f64::NAN),
                        other => Err(corrupt(handle, format!("non-float cell {:?}", other))),
                    })
                    .collect::<Result<_>>()?,
            ),
            "int64" => ColumnData::Int(
                values
                    .map(|v| match v {
                        Value::Integer(i) => Ok(i),
                        other => Err(corrupt(handle, format!("non-int cell {:?}", other))),
                    })
                    .collect::<Result<_>>()?,
            ),
            "text" => ColumnData::Text(
                values
                    .map(|v| match v {
                        Value::Text(s) => Ok(s),
                        other => Err(corrupt(handle, format!("non-text cell {:?}", other))),
                    })
                    .collect::<Result<_>>()?,
            ),
            other => return Err(corrupt(handle, format!("unknown dtype '{}'", other))),
        };
        columns.push(Column { label, data });
    }

    Table::from_parts(kind, index, columns).map_err(|e| corrupt(handle, e))
}

// --- Array / generic ---

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    magic: String,
    version: u16,
    body: T,
}

fn write_envelope<T: Serialize>(path: &Path, magic: &str, body: &T) -> Result<()> {
    let file = File::create(path).map_err(StoreError::IoError)?;
    let mut writer = BufWriter::new(file);
    let envelope = Envelope {
        magic: magic.to_string(),
        version: schemas::PAYLOAD_FILE_VERSION,
        body,
    };
    bincode::serialize_into(&mut writer, &envelope)
        .map_err(|e| StoreError::UnsupportedPayload(format!("encode failed: {}", e)))?;
    writer.flush().map_err(StoreError::IoError)?;
    writer
        .into_inner()
        .map_err(|e| StoreError::IoError(e.into_error()))?
        .sync_all()
        .map_err(StoreError::IoError)
}

fn read_envelope<T: DeserializeOwned>(path: &Path, magic: &str, handle: &str) -> Result<T> {
    let file = File::open(path).map_err(|e| corrupt(handle, e))?;
    let len = file.metadata().map_err(|e| corrupt(handle, e))?.len();
    // Length prefixes are only trusted up to the size of the file itself.
    let envelope: Envelope<T> = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(len)
        .deserialize_from(BufReader::new(file))
        .map_err(|e| corrupt(handle, e))?;
    if envelope.magic != magic {
        return Err(corrupt(handle, format!("expected {} file, found {}", magic, envelope.magic)));
    }
    if envelope.version > schemas::PAYLOAD_FILE_VERSION {
        return Err(corrupt(handle, format!("unsupported file version {}", envelope.version)));
    }
    Ok(envelope.body)
}

impl PayloadCodec for ArrayCodec {
    fn format(&self) -> Format {
        Format::Array
    }

    fn encode(&self, payload: &Payload, path: &Path) -> Result<()> {
        let array = payload.as_array().ok_or_else(|| wrong_variant(self.format(), payload))?;
        write_envelope(path, schemas::ARRAY_FILE_MAGIC, array)
    }

    fn decode(&self, path: &Path, handle: &str) -> Result<Payload> {
        let array: NdArray = read_envelope(path, schemas::ARRAY_FILE_MAGIC, handle)?;
        array.validate().map_err(|e| corrupt(handle, e))?;
        Ok(Payload::Array(array))
    }
}

impl PayloadCodec for GenericCodec {
    fn format(&self) -> Format {
        Format::Generic
    }

    fn encode(&self, payload: &Payload, path: &Path) -> Result<()> {
        let value = payload.as_generic().ok_or_else(|| wrong_variant(self.format(), payload))?;
        write_envelope(path, schemas::GENERIC_FILE_MAGIC, value)
    }

    fn decode(&self, path: &Path, handle: &str) -> Result<Payload> {
        let value: Generic = read_envelope(path, schemas::GENERIC_FILE_MAGIC, handle)?;
        value.validate().map_err(|e| corrupt(handle, e))?;
        Ok(Payload::from(value))
    }
}
