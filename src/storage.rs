use std::path::Path;

use rkyv::ser::{serializers::AllocSerializer, Serializer};
use rkyv::Deserialize;
use tracing::info;

use crate::model::Record;
use crate::store::LoadError;

/// Archives the validated record list. Feature vectors are derived data and
/// are rebuilt on restore.
pub fn snapshot(records: &[Record]) -> Result<Vec<u8>, LoadError> {
    info!("[SNAPSHOT] Serializing {} records (Binary/rkyv)...", records.len());

    let owned: Vec<Record> = records.to_vec();
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(&owned)
        .map_err(|e| LoadError::Snapshot(e.to_string()))?;

    let bytes = serializer.into_serializer().into_inner();
    Ok(bytes.into_vec())
}

/// Validates and deserializes a snapshot produced by [`snapshot`].
pub fn restore(snapshot_data: &[u8]) -> Result<Vec<Record>, LoadError> {
    info!("[RESTORE] Reading binary snapshot ({} bytes)...", snapshot_data.len());

    // Archived roots must be 16-byte aligned.
    let mut aligned = rkyv::AlignedVec::with_capacity(snapshot_data.len());
    aligned.extend_from_slice(snapshot_data);

    let archived = rkyv::check_archived_root::<Vec<Record>>(&aligned)
        .map_err(|e| LoadError::Snapshot(e.to_string()))?;
    let records: Vec<Record> = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_: std::convert::Infallible| LoadError::Snapshot("deserialization failed".into()))?;

    info!("[RESTORE] Hydrated {} records.", records.len());
    Ok(records)
}

pub async fn write_snapshot(path: &Path, records: &[Record]) -> Result<(), LoadError> {
    let bytes = snapshot(records)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
