//! Persisted flow schema: a JSON array of tagged [`FlowRecord`]s.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::errors::FlowStoreError;
use crate::model::FlowRecord;

pub fn to_json_pretty<I, R>(records: I) -> Result<String, FlowStoreError>
where
    I: IntoIterator<Item = R>,
    R: Into<FlowRecord>,
{
    let records: Vec<FlowRecord> = records.into_iter().map(Into::into).collect();
    serde_json::to_string_pretty(&records).map_err(|err| FlowStoreError::Encode(err.to_string()))
}

/// Parse an exported flow. Nothing is returned unless every record is valid.
pub fn from_json(text: &str) -> Result<Vec<FlowRecord>, FlowStoreError> {
    serde_json::from_str(text).map_err(|err| FlowStoreError::MalformedImport(err.to_string()))
}

pub fn write_flow_file<I, R>(path: &Path, records: I) -> Result<(), FlowStoreError>
where
    I: IntoIterator<Item = R>,
    R: Into<FlowRecord>,
{
    let payload = to_json_pretty(records)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(payload.as_bytes())?;
    file.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

pub fn read_flow_file(path: &Path) -> Result<Vec<FlowRecord>, FlowStoreError> {
    let text = fs::read_to_string(path)?;
    from_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_array_payloads() {
        let err = from_json(r#"{"flow": []}"#).unwrap_err();
        assert!(matches!(err, FlowStoreError::MalformedImport(_)));
    }

    #[test]
    fn rejects_unknown_record_type() {
        let err = from_json(r#"[{"type": "VIDEO", "step": 1}]"#).unwrap_err();
        assert!(matches!(err, FlowStoreError::MalformedImport(_)));
    }

    #[test]
    fn empty_array_is_an_empty_flow() {
        assert!(from_json("[]").unwrap().is_empty());
    }
}
