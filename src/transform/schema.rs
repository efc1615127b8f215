//! Arrow schema inference and JSON to Arrow conversion
//!
//! Column types are either inferred for the whole archive before anything is
//! written (then fixed), or inferred per chunk and reconciled with the types
//! already written. Either way every output object of one archive agrees on
//! the type of each column it carries.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, Record};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, LargeStringArray, ListArray,
    NullArray, StringArray, StructArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{DataType, Field, FieldRef, Fields, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::collections::HashMap;
use std::sync::Arc;

/// Which type combinations are acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    /// Records of one chunk: ints and floats widen to float either way
    WithinChunk,
    /// A chunk against columns already written: an int column cannot become
    /// float and a null column cannot become concrete
    AcrossChunks,
}

/// Irreconcilable types at a column path
#[derive(Debug)]
struct Conflict {
    path: String,
    existing: DataType,
    incoming: DataType,
}

impl From<Conflict> for Error {
    fn from(conflict: Conflict) -> Self {
        Error::encoding(format!(
            "column '{}' cannot hold both {} and {}",
            conflict.path, conflict.existing, conflict.incoming
        ))
    }
}

type Unified = std::result::Result<DataType, Conflict>;

/// Column types seen so far for one archive, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ArchiveSchema {
    fields: Vec<Field>,
    positions: HashMap<String, usize>,
    fixed: bool,
}

impl ArchiveSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no column has been seen yet
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a column
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.positions.get(name).map(|&i| &self.fields[i])
    }

    /// Whether the schema was inferred from the whole archive
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Arrow schema for the columns seen so far
    pub fn to_schema(&self) -> Schema {
        Schema::new(self.fields.clone())
    }

    /// Fold `records` into the schema as if the archive were a single chunk
    ///
    /// Used ahead of any write; ints and floats widen to float wherever they
    /// meet in the archive.
    pub fn observe(&mut self, records: &[Record]) -> Result<()> {
        self.merge(infer_columns(records)?, Reconcile::WithinChunk)
    }

    /// Stop growing: every later chunk is encoded with exactly these columns
    pub fn fix(&mut self) {
        self.fixed = true;
    }

    /// Infer the types of `records` and fold them into the archive schema
    ///
    /// Returns the schema to encode this chunk with. Leaves the archive
    /// schema untouched on conflict. A fixed schema only accepts chunks
    /// whose types it already covers.
    pub fn absorb(&mut self, records: &[Record]) -> Result<SchemaRef> {
        let observed = infer_columns(records)?;
        if self.fixed {
            self.check_covered(&observed)?;
        } else {
            self.merge(observed, Reconcile::AcrossChunks)?;
        }
        Ok(Arc::new(self.to_schema()))
    }

    fn check_covered(&self, observed: &[Field]) -> Result<()> {
        for field in observed {
            let Some(existing) = self.field(field.name()) else {
                return Err(Error::encoding(format!(
                    "column '{}' is not in the archive schema",
                    field.name()
                )));
            };
            let merged = unify(
                existing.data_type(),
                field.data_type(),
                Reconcile::AcrossChunks,
                field.name(),
            )?;
            if &merged != existing.data_type() {
                return Err(Conflict {
                    path: field.name().clone(),
                    existing: existing.data_type().clone(),
                    incoming: field.data_type().clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn merge(&mut self, observed: Vec<Field>, mode: Reconcile) -> Result<()> {
        let mut fields = self.fields.clone();
        let mut positions = self.positions.clone();
        for field in observed {
            match positions.get(field.name()) {
                Some(&i) => {
                    let unified =
                        unify(fields[i].data_type(), field.data_type(), mode, field.name())?;
                    fields[i] = Field::new(field.name(), unified, true);
                }
                None => {
                    positions.insert(field.name().clone(), fields.len());
                    fields.push(field);
                }
            }
        }

        self.fields = fields;
        self.positions = positions;
        Ok(())
    }
}

/// Infer one chunk's columns, in first-seen order
fn infer_columns(records: &[Record]) -> Result<Vec<Field>> {
    let mut order: Vec<String> = Vec::new();
    let mut types: HashMap<String, DataType> = HashMap::new();

    for record in records {
        for (key, value) in record {
            let inferred = infer_type(value, key)?;
            match types.get_mut(key) {
                Some(existing) => {
                    *existing = unify(existing, &inferred, Reconcile::WithinChunk, key)?;
                }
                None => {
                    order.push(key.clone());
                    types.insert(key.clone(), inferred);
                }
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|name| {
            let data_type = types.remove(&name).unwrap_or(DataType::Null);
            Field::new(name, data_type, true) // All fields nullable
        })
        .collect())
}

/// Infer Arrow DataType from a JSON value
///
/// Empty objects have no columns to carry and infer as `Null`. Integers
/// beyond the signed 64-bit range are rejected rather than rounded.
fn infer_type(value: &JsonValue, path: &str) -> Result<DataType> {
    match value {
        JsonValue::Null => Ok(DataType::Null),
        JsonValue::Bool(_) => Ok(DataType::Boolean),
        JsonValue::Number(n) if n.is_i64() => Ok(DataType::Int64),
        JsonValue::Number(n) if n.is_u64() => Err(Error::encoding(format!(
            "column '{path}' holds {n}, which does not fit a signed 64-bit integer"
        ))),
        JsonValue::Number(_) => Ok(DataType::Float64),
        JsonValue::String(_) => Ok(DataType::Utf8),
        JsonValue::Array(items) => {
            let item_path = format!("{path}[]");
            let mut item_type = DataType::Null;
            for item in items {
                let inferred = infer_type(item, &item_path)?;
                item_type = unify(&item_type, &inferred, Reconcile::WithinChunk, &item_path)?;
            }
            Ok(list_of(item_type))
        }
        JsonValue::Object(obj) if obj.is_empty() => Ok(DataType::Null),
        JsonValue::Object(obj) => {
            let mut fields = Vec::with_capacity(obj.len());
            for (k, v) in obj {
                fields.push(Field::new(k, infer_type(v, &format!("{path}.{k}"))?, true));
            }
            Ok(DataType::Struct(Fields::from(fields)))
        }
    }
}

fn list_of(item: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", item, true)))
}

/// Combine two observed types into one column type
fn unify(existing: &DataType, incoming: &DataType, mode: Reconcile, path: &str) -> Unified {
    match (existing, incoming) {
        (a, b) if a == b => Ok(a.clone()),

        // Null can merge with anything, but a written null column stays null
        (other, DataType::Null) => Ok(other.clone()),
        (DataType::Null, other) if mode == Reconcile::WithinChunk => Ok(other.clone()),

        (DataType::Float64, DataType::Int64) => Ok(DataType::Float64),
        (DataType::Int64, DataType::Float64) if mode == Reconcile::WithinChunk => {
            Ok(DataType::Float64)
        }

        (DataType::List(a), DataType::List(b)) => {
            let item = unify(a.data_type(), b.data_type(), mode, &format!("{path}[]"))?;
            Ok(list_of(item))
        }

        (DataType::Struct(a), DataType::Struct(b)) => {
            let mut fields: Vec<Field> = a.iter().map(|f| f.as_ref().clone()).collect();
            for field in b {
                match fields.iter().position(|f| f.name() == field.name()) {
                    Some(i) => {
                        let child_path = format!("{path}.{}", field.name());
                        let merged =
                            unify(fields[i].data_type(), field.data_type(), mode, &child_path)?;
                        fields[i] = Field::new(field.name(), merged, true);
                    }
                    None => fields.push(field.as_ref().clone()),
                }
            }
            Ok(DataType::Struct(Fields::from(fields)))
        }

        _ => Err(Conflict {
            path: path.to_string(),
            existing: existing.clone(),
            incoming: incoming.clone(),
        }),
    }
}

/// Convert records to an Arrow RecordBatch with the given schema
///
/// Records missing a column contribute a null.
pub fn records_to_batch(records: &[Record], schema: SchemaRef) -> Result<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let values: Vec<Option<&JsonValue>> =
                records.iter().map(|record| record.get(field.name())).collect();
            build_array(&values, field.data_type())
        })
        .collect::<Result<Vec<_>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
    RecordBatch::try_new_with_options(schema, columns, &options)
        .map_err(|e| Error::encoding(format!("Failed to create RecordBatch: {e}")))
}

/// Build an Arrow array from JSON values
fn build_array(values: &[Option<&JsonValue>], data_type: &DataType) -> Result<ArrayRef> {
    match data_type {
        DataType::Null => Ok(Arc::new(NullArray::new(values.len()))),

        DataType::Boolean => {
            let arr: BooleanArray = values
                .iter()
                .map(|v| v.and_then(JsonValue::as_bool))
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Int64 => {
            let arr: Int64Array = values
                .iter()
                .map(|v| v.and_then(JsonValue::as_i64))
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Float64 => {
            let arr: Float64Array = values
                .iter()
                .map(|v| v.and_then(JsonValue::as_f64))
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Utf8 => {
            let arr: StringArray = values
                .iter()
                .map(|v| v.and_then(JsonValue::as_str))
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::List(field) => build_list_array(values, field),

        DataType::Struct(fields) => build_struct_array(values, fields),

        other => Err(Error::encoding(format!("unsupported column type {other}"))),
    }
}

fn validity(valid: Vec<bool>) -> Option<NullBuffer> {
    if valid.iter().all(|v| *v) {
        None
    } else {
        Some(NullBuffer::from(valid))
    }
}

/// Build a list array from JSON arrays
fn build_list_array(values: &[Option<&JsonValue>], field: &FieldRef) -> Result<ArrayRef> {
    let mut items: Vec<Option<&JsonValue>> = Vec::new();
    let mut offsets: Vec<i32> = vec![0];
    let mut valid = Vec::with_capacity(values.len());

    for value in values {
        if let Some(JsonValue::Array(arr)) = value {
            items.extend(arr.iter().map(Some));
            valid.push(true);
        } else {
            valid.push(false);
        }
        // Both array and non-array cases need an offset
        let offset = i32::try_from(items.len())
            .map_err(|_| Error::encoding("Array too large for i32 offset"))?;
        offsets.push(offset);
    }

    let items_array = build_array(&items, field.data_type())?;
    let list = ListArray::try_new(
        Arc::clone(field),
        OffsetBuffer::new(offsets.into()),
        items_array,
        validity(valid),
    )?;
    Ok(Arc::new(list))
}

/// Build a struct array from JSON objects
fn build_struct_array(values: &[Option<&JsonValue>], fields: &Fields) -> Result<ArrayRef> {
    let valid: Vec<bool> = values
        .iter()
        .map(|v| matches!(v, Some(JsonValue::Object(_))))
        .collect();

    let children = fields
        .iter()
        .map(|field| {
            let child_values: Vec<Option<&JsonValue>> = values
                .iter()
                .map(|v| match v {
                    Some(JsonValue::Object(obj)) => obj.get(field.name()),
                    _ => None,
                })
                .collect();
            build_array(&child_values, field.data_type())
        })
        .collect::<Result<Vec<_>>>()?;

    let array = StructArray::try_new(fields.clone(), children, validity(valid))?;
    Ok(Arc::new(array))
}

/// Convert an Arrow RecordBatch to JSON records
///
/// Returns one JSON object per row; null columns appear as `null`.
pub fn arrow_to_json(batch: &RecordBatch) -> Result<Vec<JsonObject>> {
    let schema = batch.schema();
    let mut records = Vec::with_capacity(batch.num_rows());

    for row in 0..batch.num_rows() {
        let mut record = JsonObject::new();
        for (col_idx, field) in schema.fields().iter().enumerate() {
            let value = array_value_to_json(batch.column(col_idx).as_ref(), row)?;
            record.insert(field.name().clone(), value);
        }
        records.push(record);
    }

    Ok(records)
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, name: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::encoding(format!("Failed to downcast to {name}")))
}

/// Convert a single array element to JSON
fn array_value_to_json(array: &dyn Array, row: usize) -> Result<JsonValue> {
    if array.is_null(row) {
        return Ok(JsonValue::Null);
    }

    match array.data_type() {
        DataType::Null => Ok(JsonValue::Null),

        DataType::Boolean => Ok(JsonValue::Bool(
            downcast::<BooleanArray>(array, "BooleanArray")?.value(row),
        )),

        DataType::Int64 => Ok(JsonValue::Number(
            downcast::<Int64Array>(array, "Int64Array")?.value(row).into(),
        )),

        DataType::Float64 => {
            let val = downcast::<Float64Array>(array, "Float64Array")?.value(row);
            Ok(serde_json::Number::from_f64(val).map_or(JsonValue::Null, JsonValue::Number))
        }

        DataType::Utf8 => Ok(JsonValue::String(
            downcast::<StringArray>(array, "StringArray")?
                .value(row)
                .to_string(),
        )),

        DataType::LargeUtf8 => Ok(JsonValue::String(
            downcast::<LargeStringArray>(array, "LargeStringArray")?
                .value(row)
                .to_string(),
        )),

        DataType::List(_) => {
            let values = downcast::<ListArray>(array, "ListArray")?.value(row);
            let items = (0..values.len())
                .map(|i| array_value_to_json(values.as_ref(), i))
                .collect::<Result<Vec<_>>>()?;
            Ok(JsonValue::Array(items))
        }

        DataType::Struct(_) => {
            let arr = downcast::<StructArray>(array, "StructArray")?;
            let mut obj = JsonObject::new();
            for (i, field) in arr.fields().iter().enumerate() {
                let val = array_value_to_json(arr.column(i).as_ref(), row)?;
                obj.insert(field.name().clone(), val);
            }
            Ok(JsonValue::Object(obj))
        }

        other => Err(Error::encoding(format!(
            "cannot convert column of type {other} to JSON"
        ))),
    }
}
