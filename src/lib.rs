//! # nepserver - local collector for NEP micro-inverter reports
//!
//! Micro-inverters phone home with a fixed 43-byte binary frame carried in
//! an HTTP POST body. This crate decodes those frames and keeps the latest
//! reading per device. The network side (DNS interception, HTTP ingress,
//! metrics, MQTT) lives in `nepserver-gateway`.
//!
//! ## Quick Start
//!
//! ```rust
//! use nepserver::{decode, encode, RawFrame, TelemetryStore};
//!
//! let frame = encode("30c577e1", 230).unwrap();
//! let reading = decode(&frame).unwrap();
//! assert_eq!(reading.serial_number.to_string(), "30c577e1");
//! assert_eq!(reading.power_watts, 230);
//!
//! let store = TelemetryStore::new();
//! store.upsert(reading, RawFrame::new(frame.to_vec()), chrono::Utc::now());
//! assert_eq!(store.snapshot().len(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: Wire format, [`Reading`] and [`SerialNumber`]
//! - [`store`]: Latest record per device and point-in-time snapshots
//! - [`error`]: Codec errors

pub mod error;
pub mod frame;
pub mod store;

// Re-exports for convenient access
pub use error::{FrameError, Result};
pub use frame::{
    decode, encode, Reading, SerialNumber, FRAME_LEN, MIN_FRAME_LEN, WATT_FACTOR,
};
pub use store::{DeviceRecord, RawFrame, Snapshot, TelemetryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_roundtrip() {
        let frame = encode("30c577e1", 230).unwrap();
        assert_eq!(frame.len(), FRAME_LEN);

        let reading = decode(&frame).unwrap();
        assert_eq!(reading.serial_number, SerialNumber::new(0x30c577e1));
        assert_eq!(reading.power_watts, 230);
    }
}
