use anyhow::{Context, Result};
use arrow_array::{
    Array, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray,
    LargeStringArray, ListArray, RecordBatch, StringArray,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;

/// Read a parquet artifact into record batches.
///
/// Missing files and schema errors propagate to the caller; artifact
/// loading is fail-fast and runs once at startup.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open parquet file {}", path.display()))?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read parquet metadata from {}", path.display()))?
        .build()
        .with_context(|| format!("Failed to open parquet reader for {}", path.display()))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(
            batch.with_context(|| format!("Failed to decode batch from {}", path.display()))?,
        );
    }
    Ok(batches)
}

/// Total row count across batches.
pub fn row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}

// Column helpers below tolerate the value shapes different indexing
// pipelines emit (pandas/pyarrow vs. native arrow writers). An absent
// optional column reads as None/empty; a missing required column is an
// error naming the column.

pub fn string_value(batch: &RecordBatch, name: &str, row: usize) -> Option<String> {
    let col = batch.column_by_name(name)?;
    if col.is_null(row) {
        return None;
    }
    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
        return Some(arr.value(row).to_string());
    }
    if let Some(arr) = col.as_any().downcast_ref::<LargeStringArray>() {
        return Some(arr.value(row).to_string());
    }
    // Some pipelines write ids as integers.
    numeric_from(col.as_ref(), row).map(|v| {
        if v.fract() == 0.0 {
            format!("{}", v as i64)
        } else {
            format!("{v}")
        }
    })
}

pub fn required_string(batch: &RecordBatch, name: &str, row: usize) -> Result<String> {
    string_value(batch, name, row)
        .with_context(|| format!("Missing required column '{name}'"))
}

pub fn numeric_value(batch: &RecordBatch, name: &str, row: usize) -> Option<f64> {
    let col = batch.column_by_name(name)?;
    if col.is_null(row) {
        return None;
    }
    numeric_from(col.as_ref(), row)
}

fn numeric_from(col: &dyn Array, row: usize) -> Option<f64> {
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        return Some(arr.value(row));
    }
    if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        return Some(arr.value(row) as f64);
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        return Some(arr.value(row) as f64);
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
        return Some(arr.value(row) as f64);
    }
    // Community ids sometimes round-trip through strings.
    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
        return arr.value(row).parse::<f64>().ok();
    }
    None
}

pub fn float_list(batch: &RecordBatch, name: &str, row: usize) -> Option<Vec<f32>> {
    let col = batch.column_by_name(name)?;
    if col.is_null(row) {
        return None;
    }
    let values = if let Some(arr) = col.as_any().downcast_ref::<ListArray>() {
        arr.value(row)
    } else if let Some(arr) = col.as_any().downcast_ref::<LargeListArray>() {
        arr.value(row)
    } else {
        return None;
    };

    if let Some(arr) = values.as_any().downcast_ref::<Float32Array>() {
        return Some(arr.iter().map(|v| v.unwrap_or(0.0)).collect());
    }
    if let Some(arr) = values.as_any().downcast_ref::<Float64Array>() {
        return Some(arr.iter().map(|v| v.unwrap_or(0.0) as f32).collect());
    }
    None
}

pub fn string_list(batch: &RecordBatch, name: &str, row: usize) -> Vec<String> {
    let Some(col) = batch.column_by_name(name) else {
        return Vec::new();
    };
    if col.is_null(row) {
        return Vec::new();
    }
    let values = if let Some(arr) = col.as_any().downcast_ref::<ListArray>() {
        arr.value(row)
    } else if let Some(arr) = col.as_any().downcast_ref::<LargeListArray>() {
        arr.value(row)
    } else {
        return Vec::new();
    };

    if let Some(arr) = values.as_any().downcast_ref::<StringArray>() {
        return arr.iter().flatten().map(|s| s.to_string()).collect();
    }
    if let Some(arr) = values.as_any().downcast_ref::<LargeStringArray>() {
        return arr.iter().flatten().map(|s| s.to_string()).collect();
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::types::Float32Type;
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("level", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
                true,
            ),
        ]));
        let embeddings = ListArray::from_iter_primitive::<Float32Type, _, _>(vec![
            Some(vec![Some(0.1), Some(0.2)]),
            Some(vec![Some(0.3), Some(0.4)]),
        ]);
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(Int64Array::from(vec![0, 1])),
                Arc::new(embeddings),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parquet_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sample.parquet");
        let batch = sample_batch();

        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let batches = read_parquet(&path).unwrap();
        assert_eq!(row_count(&batches), 2);
        assert_eq!(string_value(&batches[0], "id", 1), Some("b".to_string()));
        assert_eq!(numeric_value(&batches[0], "level", 1), Some(1.0));
        assert_eq!(
            float_list(&batches[0], "embedding", 0),
            Some(vec![0.1, 0.2])
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = read_parquet(&tmp.path().join("nope.parquet")).unwrap_err();
        assert!(err.to_string().contains("nope.parquet"));
    }

    #[test]
    fn test_missing_required_column() {
        let batch = sample_batch();
        assert!(required_string(&batch, "title", 0).is_err());
        assert!(required_string(&batch, "id", 0).is_ok());
    }

    #[test]
    fn test_absent_optional_columns_read_as_empty() {
        let batch = sample_batch();
        assert_eq!(string_value(&batch, "missing", 0), None);
        assert_eq!(numeric_value(&batch, "missing", 0), None);
        assert!(string_list(&batch, "missing", 0).is_empty());
    }
}
