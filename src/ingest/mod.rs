//! Bulk ingestion of raw sensor readings from JSON files.
//!
//! Input is a JSON array of reading records. Every record is validated
//! before anything is written; a single invalid record aborts the whole
//! import so partial files never land half-applied.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::IngestError;
use crate::store::{NewReading, Store};

/// Readings inserted per transaction.
const BATCH_SIZE: usize = 1000;

/// One reading as it appears in the import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingRecord {
    pub value: f64,
    /// RFC 3339 timestamp.
    pub date: String,
    #[serde(default)]
    pub sensor_id: Option<i64>,
    #[serde(default)]
    pub process_step_id: Option<i64>,
    #[serde(default)]
    pub process_parameter_id: Option<i64>,
    #[serde(default)]
    pub quality_characteristic_id: Option<i64>,
}

/// Parses and validates raw records into insertable readings.
///
/// A record must carry a parseable timestamp, a finite value and at least
/// one association (step, parameter, characteristic or sensor).
pub fn validate_records(records: &[ReadingRecord]) -> Result<Vec<NewReading>, IngestError> {
    let mut readings = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let date = record
            .date
            .parse::<DateTime<Utc>>()
            .map_err(|e| IngestError::InvalidRecord {
                index,
                reason: format!("bad timestamp '{}': {}", record.date, e),
            })?;
        if !record.value.is_finite() {
            return Err(IngestError::InvalidRecord {
                index,
                reason: format!("value {} is not finite", record.value),
            });
        }
        if record.sensor_id.is_none()
            && record.process_step_id.is_none()
            && record.process_parameter_id.is_none()
            && record.quality_characteristic_id.is_none()
        {
            return Err(IngestError::InvalidRecord {
                index,
                reason: "record has no association".to_string(),
            });
        }
        readings.push(NewReading {
            value: record.value,
            date,
            sensor_id: record.sensor_id,
            process_step_id: record.process_step_id,
            process_parameter_id: record.process_parameter_id,
            quality_characteristic_id: record.quality_characteristic_id,
        });
    }
    Ok(readings)
}

/// Imports a JSON reading file into one tenant. Returns the number of
/// readings inserted.
pub async fn import_file(store: &Store, path: &Path) -> Result<u64, IngestError> {
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<ReadingRecord> = serde_json::from_str(&raw)?;
    let readings = validate_records(&records)?;
    let inserted = store.bulk_insert_readings(&readings, BATCH_SIZE).await?;
    info!(
        tenant = %store.tenant(),
        file = %path.display(),
        inserted, "Reading import finished"
    );
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, value: f64) -> ReadingRecord {
        ReadingRecord {
            value,
            date: date.to_string(),
            sensor_id: None,
            process_step_id: Some(1),
            process_parameter_id: Some(2),
            quality_characteristic_id: None,
        }
    }

    #[test]
    fn test_validate_records_ok() {
        let records = vec![
            record("2026-03-01T08:00:00Z", 1.5),
            record("2026-03-01T08:00:01+02:00", -0.25),
        ];
        let readings = validate_records(&records).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].value, 1.5);
        assert_eq!(readings[0].process_step_id, Some(1));
    }

    #[test]
    fn test_validate_rejects_bad_timestamp() {
        let records = vec![record("2026-03-01T08:00:00Z", 1.0), record("yesterday", 2.0)];
        let err = validate_records(&records).unwrap_err();
        let IngestError::InvalidRecord { index, reason } = err else {
            panic!("expected InvalidRecord");
        };
        assert_eq!(index, 1);
        assert!(reason.contains("yesterday"));
    }

    #[test]
    fn test_validate_rejects_non_finite_value() {
        let records = vec![record("2026-03-01T08:00:00Z", f64::NAN)];
        assert!(validate_records(&records).is_err());
    }

    #[test]
    fn test_validate_rejects_orphan_record() {
        let orphan = ReadingRecord {
            value: 1.0,
            date: "2026-03-01T08:00:00Z".to_string(),
            sensor_id: None,
            process_step_id: None,
            process_parameter_id: None,
            quality_characteristic_id: None,
        };
        let err = validate_records(&[orphan]).unwrap_err();
        assert!(err.to_string().contains("no association"));
    }
}
