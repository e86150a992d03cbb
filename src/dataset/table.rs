//! In-memory columnar tables and their parquet persistence.
//!
//! Two shapes exist: [`FeatureTable`], a wide table indexed by product id
//! with one f64 column per feature, and [`StackedTable`], the long-format
//! (id, time, kind, value) representation used for time-series output.
//! Missing values are carried as NaN in memory and written as nulls.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Array, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::DatasetError;
use crate::store::StackedReading;

/// A wide table of f64 columns over a shared product-id index.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    index: Vec<i64>,
    columns: Vec<(String, Vec<f64>)>,
}

impl FeatureTable {
    /// Creates an empty table over the given row index.
    pub fn new(index: Vec<i64>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Appends a column. Panics if the length does not match the index;
    /// callers construct columns from the index so a mismatch is a bug.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        assert_eq!(
            values.len(),
            self.index.len(),
            "column length must match index length"
        );
        self.columns.push((name.into(), values));
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Cell lookup by position; NaN means "no value".
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .find(|(n, _)| n == column)
            .map(|(_, v)| v[row])
    }

    /// Joins two tables sharing an identical index (positional inner join
    /// on product id). Both sides are produced from the same candidate
    /// product set, so diverging indexes indicate a bug upstream.
    pub fn join(mut self, other: FeatureTable) -> Result<FeatureTable, DatasetError> {
        if self.index != other.index {
            return Err(DatasetError::IndexMismatch(format!(
                "left has {} rows, right has {} rows",
                self.index.len(),
                other.index.len()
            )));
        }
        self.columns.extend(other.columns);
        Ok(self)
    }

    /// Converts to an Arrow record batch: `id` column plus one nullable
    /// Float64 column per feature. NaN cells become nulls.
    pub fn to_record_batch(&self) -> Result<RecordBatch, DatasetError> {
        let mut fields = vec![Field::new("id", DataType::Int64, false)];
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(self.index.clone()))];

        for (name, values) in &self.columns {
            fields.push(Field::new(name, DataType::Float64, true));
            let mut builder = Float64Builder::with_capacity(values.len());
            for &v in values {
                if v.is_nan() {
                    builder.append_null();
                } else {
                    builder.append_value(v);
                }
            }
            arrays.push(Arc::new(builder.finish()));
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    /// Writes the table as one parquet file under `dir`.
    pub fn write_parquet(&self, dir: &Path, filename: &str) -> Result<(), DatasetError> {
        write_batch(self.to_record_batch()?, dir, filename)
    }
}

/// Long-format time-series table: one row per reading.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StackedTable {
    rows: Vec<StackedReading>,
}

impl StackedTable {
    pub fn new(rows: Vec<StackedReading>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[StackedReading] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Converts to an Arrow record batch with columns id/time/kind/value.
    pub fn to_record_batch(&self) -> Result<RecordBatch, DatasetError> {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new(
                "time",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("kind", DataType::Int64, false),
            Field::new("value", DataType::Float64, false),
        ]);

        let ids: Vec<i64> = self.rows.iter().map(|r| r.product_id).collect();
        let times: Vec<i64> = self
            .rows
            .iter()
            .map(|r| r.date.timestamp_micros())
            .collect();
        let kinds: Vec<i64> = self.rows.iter().map(|r| r.kind).collect();
        let values: Vec<f64> = self.rows.iter().map(|r| r.value).collect();

        let arrays: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(TimestampMicrosecondArray::from(times).with_timezone("UTC")),
            Arc::new(Int64Array::from(kinds)),
            Arc::new(arrow::array::Float64Array::from(values)),
        ];

        Ok(RecordBatch::try_new(Arc::new(schema), arrays)?)
    }

    pub fn write_parquet(&self, dir: &Path, filename: &str) -> Result<(), DatasetError> {
        write_batch(self.to_record_batch()?, dir, filename)
    }
}

fn write_batch(batch: RecordBatch, dir: &Path, filename: &str) -> Result<(), DatasetError> {
    std::fs::create_dir_all(dir)?;
    let file = File::create(dir.join(filename))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use chrono::{TimeZone, Utc};

    fn sample_table() -> FeatureTable {
        let mut t = FeatureTable::new(vec![3, 2, 1]);
        t.push_column("tempMin", vec![1.0, 2.0, f64::NAN]);
        t.push_column("tempMax", vec![4.0, 5.0, 6.0]);
        t
    }

    #[test]
    fn test_push_column_and_lookup() {
        let t = sample_table();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.num_columns(), 2);
        assert_eq!(t.value(0, "tempMin"), Some(1.0));
        assert!(t.value(2, "tempMin").unwrap().is_nan());
        assert_eq!(t.value(2, "tempMax"), Some(6.0));
    }

    #[test]
    fn test_join_same_index() {
        let left = sample_table();
        let mut right = FeatureTable::new(vec![3, 2, 1]);
        right.push_column("widthAvg", vec![0.1, 0.2, 0.3]);

        let joined = left.join(right).unwrap();
        assert_eq!(joined.num_columns(), 3);
        assert_eq!(
            joined.column_names(),
            vec!["tempMin", "tempMax", "widthAvg"]
        );
    }

    #[test]
    fn test_join_rejects_diverging_index() {
        let left = sample_table();
        let right = FeatureTable::new(vec![1, 2, 3]);
        assert!(matches!(
            left.join(right),
            Err(DatasetError::IndexMismatch(_))
        ));
    }

    #[test]
    fn test_record_batch_encodes_nan_as_null() {
        let batch = sample_table().to_record_batch().unwrap();
        assert_eq!(batch.num_columns(), 3); // id + 2 features
        assert_eq!(batch.num_rows(), 3);
        let min_col = batch
            .column(1)
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .unwrap();
        assert!(min_col.is_null(2));
        assert_eq!(min_col.value(0), 1.0);
    }

    #[test]
    fn test_write_parquet_roundtrip_path() {
        let dir = tempfile::tempdir().unwrap();
        sample_table()
            .write_parquet(dir.path(), "features.parquet")
            .unwrap();
        assert!(dir.path().join("features.parquet").exists());
    }

    #[test]
    fn test_stacked_record_batch() {
        let rows = vec![
            StackedReading {
                product_id: 7,
                date: Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap(),
                kind: 42,
                value: 1.5,
            },
            StackedReading {
                product_id: 7,
                date: Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 1).unwrap(),
                kind: 42,
                value: 1.6,
            },
        ];
        let batch = StackedTable::new(rows).to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);
        assert_eq!(batch.schema().field(2).name(), "kind");
    }
}
