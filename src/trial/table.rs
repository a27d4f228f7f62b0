//! Tidy trial table (Arrow/Parquet)
//!
//! One row per (participant, condition). Rows are appended in bulk by the
//! loader and annotated once by the order joiner; afterwards the table is
//! read-only. The columnar form is an Arrow [`RecordBatch`] so the snapshot
//! written to `results/trials.parquet` can be opened by any Arrow reader.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, RecordBatch, StringArray, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use super::{Condition, Measure, TrialRecord};
use crate::{Error, Result};

/// Arrow schema of the tidy table.
#[must_use]
pub fn trial_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("participant_id", DataType::Utf8, false),
        Field::new("condition", DataType::UInt8, false),
        Field::new("time", DataType::Float64, false),
        Field::new("error", DataType::Float64, false),
        Field::new("trial_id", DataType::UInt8, true),
    ]))
}

/// Within-subject layout of one measure: one row per participant, one
/// column per condition, only participants with a finite value everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    /// Condition levels, in column order
    pub conditions: Vec<Condition>,
    /// Participant ids, in row order
    pub participants: Vec<String>,
    /// `values[i][j]`: participant `i` under condition `j`
    pub values: Vec<Vec<f64>>,
}

impl WideTable {
    /// Number of complete participants.
    #[must_use]
    pub fn n_subjects(&self) -> usize {
        self.values.len()
    }

    /// Values of one condition column.
    #[must_use]
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[j]).collect()
    }
}

/// The tidy trial table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTable {
    records: Vec<TrialRecord>,
}

impl TrialTable {
    /// Create a table from records.
    #[must_use]
    pub fn new(records: Vec<TrialRecord>) -> Self {
        Self { records }
    }

    /// Append one record.
    pub fn push(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All rows.
    #[must_use]
    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    /// Mutable rows (used by the order joiner).
    pub fn records_mut(&mut self) -> &mut [TrialRecord] {
        &mut self.records
    }

    /// Distinct participant ids, sorted.
    #[must_use]
    pub fn participants(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .map(|r| r.participant_id.clone())
            .collect()
    }

    /// Distinct conditions present, sorted.
    #[must_use]
    pub fn conditions(&self) -> BTreeSet<Condition> {
        self.records.iter().map(|r| r.condition).collect()
    }

    /// Finite values of `measure` under `condition`, in row order.
    #[must_use]
    pub fn values(&self, measure: Measure, condition: Condition) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.condition == condition)
            .map(|r| measure.value(r))
            .filter(|v| v.is_finite())
            .collect()
    }

    /// Pivot `measure` to one row per participant over `conditions`.
    ///
    /// Participants missing any condition, or with a non-finite value, are
    /// dropped (listwise deletion). When a participant has more than one row
    /// for a condition the first one wins.
    #[must_use]
    pub fn wide(&self, measure: Measure, conditions: &[Condition]) -> WideTable {
        let mut by_participant: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
        for record in &self.records {
            let Some(j) = conditions.iter().position(|c| *c == record.condition) else {
                continue;
            };
            let row = by_participant
                .entry(record.participant_id.as_str())
                .or_insert_with(|| vec![None; conditions.len()]);
            if row[j].is_none() {
                row[j] = Some(measure.value(record));
            }
        }

        let mut participants = Vec::new();
        let mut values = Vec::new();
        for (pid, row) in by_participant {
            let complete: Option<Vec<f64>> = row
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            if let Some(complete) = complete {
                participants.push(pid.to_string());
                values.push(complete);
            }
        }

        WideTable {
            conditions: conditions.to_vec(),
            participants,
            values,
        }
    }

    /// Convert to an Arrow record batch with [`trial_schema`].
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the columns (should not happen for a
    /// well-formed table).
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let ids: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.participant_id.as_str())
            .collect();
        let conditions: Vec<u8> = self.records.iter().map(|r| r.condition.code()).collect();
        let times: Vec<f64> = self.records.iter().map(|r| r.time).collect();
        let errors: Vec<f64> = self.records.iter().map(|r| r.error).collect();
        let trials: Vec<Option<u8>> = self.records.iter().map(|r| r.trial_index).collect();

        let batch = RecordBatch::try_new(
            trial_schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(UInt8Array::from(conditions)),
                Arc::new(Float64Array::from(times)),
                Arc::new(Float64Array::from(errors)),
                Arc::new(UInt8Array::from(trials)),
            ],
        )?;
        Ok(batch)
    }

    /// Rebuild a table from record batches produced by [`Self::to_record_batch`].
    ///
    /// # Errors
    ///
    /// Returns error if a batch does not carry the expected columns.
    pub fn from_record_batches(batches: &[RecordBatch]) -> Result<Self> {
        let mut records = Vec::new();
        for batch in batches {
            let ids = column::<StringArray>(batch, "participant_id")?;
            let conditions = column::<UInt8Array>(batch, "condition")?;
            let times = column::<Float64Array>(batch, "time")?;
            let errors = column::<Float64Array>(batch, "error")?;
            let trials = column::<UInt8Array>(batch, "trial_id")?;

            for i in 0..batch.num_rows() {
                records.push(TrialRecord {
                    participant_id: ids.value(i).to_string(),
                    condition: Condition::new(conditions.value(i)),
                    time: times.value(i),
                    error: errors.value(i),
                    trial_index: if trials.is_null(i) {
                        None
                    } else {
                        Some(trials.value(i))
                    },
                });
            }
        }
        Ok(Self { records })
    }

    /// Write the table as a single-batch Parquet file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written.
    pub fn save_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;

        let batch = self.to_record_batch()?;
        let file = File::create(path.as_ref()).map_err(|e| {
            Error::StorageError(format!("Failed to create Parquet file: {e}"))
        })?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).map_err(|e| {
            Error::StorageError(format!("Failed to create Parquet writer: {e}"))
        })?;
        writer
            .write(&batch)
            .map_err(|e| Error::StorageError(format!("Failed to write record batch: {e}")))?;
        writer
            .close()
            .map_err(|e| Error::StorageError(format!("Failed to finish Parquet file: {e}")))?;
        Ok(())
    }

    /// Load a table written by [`Self::save_parquet`].
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = File::open(path.as_ref()).map_err(|e| {
            Error::StorageError(format!("Failed to open Parquet file: {e}"))
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            Error::StorageError(format!("Failed to parse Parquet file: {e}"))
        })?;

        let reader = builder.build().map_err(|e| {
            Error::StorageError(format!("Failed to create Parquet reader: {e}"))
        })?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| {
                Error::StorageError(format!("Failed to read record batch: {e}"))
            })?;
            batches.push(batch);
        }

        Self::from_record_batches(&batches)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::StorageError(format!("Column not found: {name}")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::StorageError(format!("Unexpected type for column {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrialTable {
        TrialTable::new(vec![
            TrialRecord::new("01", Condition::new(0), 120.0, 800.0).with_trial_index(1),
            TrialRecord::new("01", Condition::new(1), 110.0, 700.0).with_trial_index(2),
            TrialRecord::new("01", Condition::new(2), 100.0, f64::NAN),
            TrialRecord::new("02", Condition::new(0), 150.0, 900.0),
            TrialRecord::new("02", Condition::new(1), 140.0, 850.0),
        ])
    }

    #[test]
    fn test_wide_drops_incomplete_participants() {
        let wide = sample().wide(Measure::Time, &Condition::ALL);
        assert_eq!(wide.participants, vec!["01".to_string()]);
        assert_eq!(wide.values[0], vec![120.0, 110.0, 100.0]);

        // NaN error for 01/2 removes 01 from the error pivot
        let wide = sample().wide(Measure::Error, &Condition::ALL);
        assert_eq!(wide.n_subjects(), 0);
    }

    #[test]
    fn test_values_skip_nan() {
        let values = sample().values(Measure::Error, Condition::new(2));
        assert!(values.is_empty());
    }

    #[test]
    fn test_record_batch_round_trip_keeps_nulls_and_nan() {
        let table = sample();
        let batch = table.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(batch.schema(), trial_schema());

        let back = TrialTable::from_record_batches(&[batch]).unwrap();
        assert_eq!(back.len(), 5);
        assert_eq!(back.records()[0].trial_index, Some(1));
        assert_eq!(back.records()[3].trial_index, None);
        assert!(back.records()[2].error.is_nan());
    }

    #[test]
    fn test_parquet_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.parquet");
        sample().save_parquet(&path).unwrap();
        let loaded = TrialTable::load_parquet(&path).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.participants().len(), 2);
    }
}
