//! Payload model for the data store.
//!
//! Three shapes are distinguished, each with its own on-disk format:
//! tables (series and frames with labelled rows and columns), homogeneous numeric
//! n-dimensional arrays, and generic nested objects.

use crate::core::error::{Result, StoreError};
use crate::core::schemas;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Tabular,
    Array,
    Generic,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Tabular, Format::Array, Format::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Tabular => "tabular",
            Format::Array => "array",
            Format::Generic => "generic",
        }
    }

    /// Canonical file name inside a handle directory. Part of the on-disk contract.
    pub fn file_name(&self) -> &'static str {
        match self {
            Format::Tabular => schemas::TABULAR_FILE_NAME,
            Format::Array => schemas::ARRAY_FILE_NAME,
            Format::Generic => schemas::GENERIC_FILE_NAME,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Format> {
        Format::ALL.into_iter().find(|f| f.file_name() == name)
    }

    pub fn classify(payload: &Payload) -> Format {
        match payload {
            Payload::Tabular(_) => Format::Tabular,
            Payload::Array(_) => Format::Array,
            Payload::Generic(Generic::Array(_)) => Format::Array,
            Payload::Generic(_) => Format::Generic,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Arrays ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    F64(Vec<f64>),
    I64(Vec<i64>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::F64(v) => v.len(),
            ArrayData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major n-dimensional array. Rank 0 is a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let array = Self { shape, data };
        array.validate()?;
        Ok(array)
    }

    pub fn from_f64(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        Self::new(shape, ArrayData::F64(data))
    }

    pub fn from_i64(shape: Vec<usize>, data: Vec<i64>) -> Result<Self> {
        Self::new(shape, ArrayData::I64(data))
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: ArrayData::F64(vec![value]),
        }
    }

    pub fn scalar_i64(value: i64) -> Self {
        Self {
            shape: Vec::new(),
            data: ArrayData::I64(vec![value]),
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let n = shape.iter().product();
        Self {
            shape,
            data: ArrayData::F64(vec![0.0; n]),
        }
    }

    /// Fill element `i` (row-major) with `f(i)`.
    pub fn from_fn(shape: Vec<usize>, f: impl FnMut(usize) -> f64) -> Self {
        let n = shape.iter().product();
        Self {
            shape,
            data: ArrayData::F64((0..n).map(f).collect()),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::F64(v) => Some(v),
            ArrayData::I64(_) => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let expected = self
            .shape
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(*d))
            .ok_or_else(|| StoreError::UnsupportedPayload("array shape overflows".to_string()))?;
        if expected != self.data.len() {
            return Err(StoreError::UnsupportedPayload(format!(
                "array of shape {:?} needs {} elements, got {}",
                self.shape,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }
}

// --- Tables ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Int(v)
    }
}

impl From<i32> for Label {
    fn from(v: i32) -> Self {
        Label::Int(v.into())
    }
}

impl From<&str> for Label {
    fn from(v: &str) -> Self {
        Label::Text(v.to_string())
    }
}

impl From<String> for Label {
    fn from(v: String) -> Self {
        Label::Text(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            ColumnData::Float(_) => "float64",
            ColumnData::Int(_) => "int64",
            ColumnData::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub label: Label,
    pub data: ColumnData,
}

impl Column {
    pub fn new(label: impl Into<Label>, data: ColumnData) -> Self {
        Self {
            label: label.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// One unnamed-or-named column of values.
    Series,
    Frame,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Series => "series",
            TableKind::Frame => "frame",
        }
    }

    pub fn parse(s: &str) -> Option<TableKind> {
        match s {
            "series" => Some(TableKind::Series),
            "frame" => Some(TableKind::Frame),
            _ => None,
        }
    }
}

/// Column-oriented table with labelled rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    kind: TableKind,
    index: Vec<Label>,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table from parts, checking every column matches the index length.
    pub fn from_parts(kind: TableKind, index: Vec<Label>, columns: Vec<Column>) -> Result<Self> {
        let table = Self {
            kind,
            index,
            columns,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn series(data: ColumnData) -> Self {
        let index = default_index(data.len());
        Self {
            kind: TableKind::Series,
            index,
            columns: vec![Column::new(0, data)],
        }
    }

    pub fn frame(columns: Vec<Column>) -> Result<Self> {
        let nrows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        Self::from_parts(TableKind::Frame, default_index(nrows), columns)
    }

    /// Frame of `f64` from row-major values, with integer row and column labels.
    pub fn from_rows(nrows: usize, ncols: usize, values: &[f64]) -> Result<Self> {
        if values.len() != nrows * ncols {
            return Err(StoreError::UnsupportedPayload(format!(
                "{}x{} table needs {} values, got {}",
                nrows,
                ncols,
                nrows * ncols,
                values.len()
            )));
        }
        let columns = (0..ncols)
            .map(|c| {
                let col: Vec<f64> = (0..nrows).map(|r| values[r * ncols + c]).collect();
                Column::new(c as i64, ColumnData::Float(col))
            })
            .collect();
        Ok(Self {
            kind: TableKind::Frame,
            index: default_index(nrows),
            columns,
        })
    }

    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        let columns = (0..ncols)
            .map(|c| Column::new(c as i64, ColumnData::Float(vec![0.0; nrows])))
            .collect();
        Self {
            kind: TableKind::Frame,
            index: default_index(nrows),
            columns,
        }
    }

    pub fn with_name(mut self, name: impl Into<Label>) -> Self {
        if self.kind == TableKind::Series {
            if let Some(col) = self.columns.first_mut() {
                col.label = name.into();
            }
        }
        self
    }

    pub fn with_index(mut self, index: Vec<Label>) -> Result<Self> {
        self.index = index;
        self.validate()?;
        Ok(self)
    }

    pub fn with_column_labels(mut self, labels: Vec<Label>) -> Result<Self> {
        if labels.len() != self.columns.len() {
            return Err(StoreError::UnsupportedPayload(format!(
                "{} labels for {} columns",
                labels.len(),
                self.columns.len()
            )));
        }
        for (col, label) in self.columns.iter_mut().zip(labels) {
            col.label = label;
        }
        Ok(self)
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn index(&self) -> &[Label] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, label: &Label) -> Option<&Column> {
        self.columns.iter().find(|c| &c.label == label)
    }

    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind == TableKind::Series && self.columns.len() != 1 {
            return Err(StoreError::UnsupportedPayload(format!(
                "a series has exactly one column, got {}",
                self.columns.len()
            )));
        }
        for col in &self.columns {
            if col.data.len() != self.index.len() {
                return Err(StoreError::UnsupportedPayload(format!(
                    "column {:?} has {} rows, index has {}",
                    col.label,
                    col.data.len(),
                    self.index.len()
                )));
            }
        }
        Ok(())
    }
}

fn default_index(n: usize) -> Vec<Label> {
    (0..n as i64).map(Label::Int).collect()
}

// --- Generic objects ---

/// Arbitrary nested value. Sets and dicts compare without regard to order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Generic {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Generic>),
    Tuple(Vec<Generic>),
    Set(Vec<Generic>),
    Dict(Vec<(Generic, Generic)>),
    Array(NdArray),
}

impl Generic {
    /// Set with duplicates dropped (first occurrence kept).
    pub fn set<I: IntoIterator<Item = Generic>>(items: I) -> Self {
        let mut out: Vec<Generic> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Generic::Set(out)
    }

    /// Dict with later duplicate keys replacing earlier ones.
    pub fn dict<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Generic>,
        V: Into<Generic>,
    {
        let mut out: Vec<(Generic, Generic)> = Vec::new();
        for (k, v) in pairs {
            let (k, v) = (k.into(), v.into());
            match out.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => out.push((k, v)),
            }
        }
        Generic::Dict(out)
    }

    pub fn get(&self, key: &Generic) -> Option<&Generic> {
        match self {
            Generic::Dict(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Validate every embedded array, walking the value without recursion.
    pub fn validate(&self) -> Result<()> {
        let mut stack = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Generic::Array(a) => a.validate()?,
                Generic::List(items) | Generic::Tuple(items) | Generic::Set(items) => {
                    stack.extend(items.iter())
                }
                Generic::Dict(pairs) => {
                    for (k, v) in pairs {
                        stack.push(k);
                        stack.push(v);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl PartialEq for Generic {
    fn eq(&self, other: &Self) -> bool {
        use Generic::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (List(a), List(b)) | (Tuple(a), Tuple(b)) => a == b,
            (Set(a), Set(b)) => a.len() == b.len() && a.iter().all(|x| b.contains(x)),
            (Dict(a), Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Array(a), Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Generic {
    fn from(v: bool) -> Self {
        Generic::Bool(v)
    }
}

impl From<i64> for Generic {
    fn from(v: i64) -> Self {
        Generic::Int(v)
    }
}

impl From<i32> for Generic {
    fn from(v: i32) -> Self {
        Generic::Int(v as i64)
    }
}

impl From<f64> for Generic {
    fn from(v: f64) -> Self {
        Generic::Float(v)
    }
}

impl From<&str> for Generic {
    fn from(v: &str) -> Self {
        Generic::Str(v.to_string())
    }
}

impl From<String> for Generic {
    fn from(v: String) -> Self {
        Generic::Str(v)
    }
}

impl From<NdArray> for Generic {
    fn from(v: NdArray) -> Self {
        Generic::Array(v)
    }
}

impl From<Vec<Generic>> for Generic {
    fn from(v: Vec<Generic>) -> Self {
        Generic::List(v)
    }
}

// --- Payload ---

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Tabular(Table),
    Array(NdArray),
    Generic(Generic),
}

impl Payload {
    pub fn format(&self) -> Format {
        Format::classify(self)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Payload::Tabular(t) => t.validate(),
            Payload::Array(a) => a.validate(),
            Payload::Generic(g) => g.validate(),
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Payload::Tabular(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Payload::Array(a) | Payload::Generic(Generic::Array(a)) => Some(a),
            _ => None,
        }
    }

    pub fn as_generic(&self) -> Option<&Generic> {
        match self {
            Payload::Generic(g) => Some(g),
            _ => None,
        }
    }
}

impl From<Table> for Payload {
    fn from(v: Table) -> Self {
        Payload::Tabular(v)
    }
}

impl From<NdArray> for Payload {
    fn from(v: NdArray) -> Self {
        Payload::Array(v)
    }
}

/// A bare array wrapped as a generic value is stored, and read back, as an array.
impl From<Generic> for Payload {
    fn from(v: Generic) -> Self {
        match v {
            Generic::Array(a) => Payload::Array(a),
            other => Payload::Generic(other),
        }
    }
}

macro_rules! payload_from_generic {
    ($($t:ty),*) => {
        $(impl From<$t> for Payload {
            fn from(v: $t) -> Self {
                Payload::from(Generic::from(v))
            }
        })*
    };
}

payload_from_generic!(bool, i64, i32, f64, &str, String, Vec<Generic>);
