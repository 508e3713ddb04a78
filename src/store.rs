//! Latest-reading store, one record per device
//!
//! Records are immutable once written; an upsert swaps in a new
//! `Arc<DeviceRecord>` under a short write lock. A [`Snapshot`] only
//! clones the `Arc`s, so exposition never holds the lock while it
//! formats or writes a response.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::frame::{Reading, SerialNumber};

/// Frame bytes exactly as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
    /// Wrap received bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes received
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no bytes were received
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex rendering, two digits per byte
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for RawFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Latest state of one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    /// Most recent decoded reading
    pub reading: Reading,
    /// Collector clock at ingestion
    pub received_at: DateTime<Utc>,
    /// Frame that produced `reading`
    pub raw_frame: RawFrame,
    /// Frames accepted from this device since startup
    pub frame_count: u64,
}

/// Point-in-time copy of the store, ordered by serial number
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: BTreeMap<SerialNumber, Arc<DeviceRecord>>,
}

impl Snapshot {
    /// Number of devices
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no device has reported
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record of one device
    pub fn get(&self, serial_number: &SerialNumber) -> Option<&DeviceRecord> {
        self.records.get(serial_number).map(Arc::as_ref)
    }

    /// Iterate records in serial number order
    pub fn iter(&self) -> impl Iterator<Item = (&SerialNumber, &DeviceRecord)> {
        self.records.iter().map(|(sn, record)| (sn, record.as_ref()))
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter().map(|(sn, record)| (sn.to_string(), record)))
    }
}

/// Shared telemetry store
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    records: RwLock<HashMap<SerialNumber, Arc<DeviceRecord>>>,
}

impl TelemetryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for the reading's device
    ///
    /// Last write wins. Returns the stored record.
    pub fn upsert(
        &self,
        reading: Reading,
        raw_frame: RawFrame,
        received_at: DateTime<Utc>,
    ) -> Arc<DeviceRecord> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let frame_count = records
            .get(&reading.serial_number)
            .map_or(0, |previous| previous.frame_count)
            + 1;
        let record = Arc::new(DeviceRecord {
            reading,
            received_at,
            raw_frame,
            frame_count,
        });
        records.insert(reading.serial_number, Arc::clone(&record));
        record
    }

    /// Copy out every record
    ///
    /// Only the `Arc` clones happen under the read lock; ordering is done
    /// after it is released.
    pub fn snapshot(&self) -> Snapshot {
        let entries: Vec<(SerialNumber, Arc<DeviceRecord>)> = {
            let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
            records
                .iter()
                .map(|(sn, record)| (*sn, Arc::clone(record)))
                .collect()
        };
        Snapshot {
            records: entries.into_iter().collect(),
        }
    }

    /// Latest record of one device
    pub fn get(&self, serial_number: &SerialNumber) -> Option<Arc<DeviceRecord>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(serial_number)
            .cloned()
    }

    /// Number of known devices
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if no device has reported yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
