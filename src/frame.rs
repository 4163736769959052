//! Conversion of query results into Arrow record batches.

use std::{collections::HashSet, sync::Arc};

use arrow::{
    array::RecordBatch,
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    json::reader::{ReaderBuilder, infer_json_schema_from_iterator},
};
use serde_json::{Map, Value};

use crate::api::dataset::QueryResults;

/// Convert a result set into a single [RecordBatch].
///
/// Column names come from the column metadata when the server sends it.
/// Otherwise they come from the rows themselves: the keys of object rows, in
/// order of first appearance, or the positions of list rows (`"0"`, `"1"`,
/// ...). Repeated names get a numeric suffix (`count`, `count_2`).
///
/// Column types are inferred from the values. Columns that mix numbers and
/// strings become strings, and columns with only nulls have type
/// [DataType::Null]. Integers above `i64::MAX` make the column
/// [DataType::Float64], so they lose precision.
pub fn to_record_batch(results: &QueryResults) -> Result<RecordBatch, ArrowError> {
    let rows = &results.data.rows;

    let raw_names = if results.data.cols.is_empty() {
        names_from_rows(rows)?
    } else {
        results.data.cols.iter().map(|c| c.name.clone()).collect()
    };

    let names = dedup_names(&raw_names);
    let objects = rows
        .iter()
        .enumerate()
        .map(|(i, row)| to_object(i, row, &raw_names, &names))
        .collect::<Result<Vec<_>, _>>()?;

    let inferred = infer_json_schema_from_iterator(objects.iter().map(Ok))?;
    let fields: Vec<Field> = names
        .iter()
        .map(|name| match inferred.field_with_name(name) {
            Ok(f) => f.clone().with_nullable(true),
            Err(_) => Field::new(name, DataType::Null, true),
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    if objects.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut decoder = ReaderBuilder::new(schema.clone())
        .with_batch_size(objects.len())
        .with_coerce_primitive(true)
        .build_decoder()?;

    decoder.serialize(&objects)?;
    match decoder.flush()? {
        Some(batch) => Ok(batch),
        None => Ok(RecordBatch::new_empty(schema)),
    }
}

fn names_from_rows(rows: &[Value]) -> Result<Vec<String>, ArrowError> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut width = 0;

    for (i, row) in rows.iter().enumerate() {
        match row {
            Value::Array(values) => width = width.max(values.len()),
            Value::Object(map) => {
                for key in map.keys() {
                    if seen.insert(key.as_str()) {
                        names.push(key.clone());
                    }
                }
            }
            _ => return Err(bad_row(i, "not a list or an object")),
        }
    }

    if width > 0 && !names.is_empty() {
        return Err(ArrowError::JsonError(
            "rows mix lists and objects".to_string(),
        ));
    }

    if width > 0 {
        names = (0..width).map(|i| i.to_string()).collect();
    }

    Ok(names)
}

fn dedup_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{name}_{n}");
                n += 1;
            }

            candidate
        })
        .collect()
}

// List rows are matched to columns by position, and object rows by the
// original (pre-dedup) column name.
fn to_object(
    i: usize,
    row: &Value,
    raw_names: &[String],
    names: &[String],
) -> Result<Value, ArrowError> {
    let mut object = Map::with_capacity(names.len());

    match row {
        Value::Array(values) => {
            if values.len() > names.len() {
                return Err(bad_row(
                    i,
                    &format!("{} values for {} columns", values.len(), names.len()),
                ));
            }

            let padded = values.iter().chain(std::iter::repeat(&Value::Null));
            for (name, value) in names.iter().zip(padded) {
                object.insert(name.clone(), value.clone());
            }
        }
        Value::Object(map) => {
            for (raw, name) in raw_names.iter().zip(names) {
                let value = map.get(raw).cloned().unwrap_or(Value::Null);
                object.insert(name.clone(), value);
            }
        }
        _ => return Err(bad_row(i, "not a list or an object")),
    }

    Ok(Value::Object(object))
}

fn bad_row(i: usize, reason: &str) -> ArrowError {
    ArrowError::JsonError(format!("invalid result row {i}: {reason}"))
}
