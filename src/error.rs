//! Error types for nepserver
//!
//! This module defines the errors raised by the frame codec.

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors during frame encoding and decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer does not reach the power byte
    #[error("Frame too short: need at least {needed} bytes, got {available}")]
    FrameTooShort { needed: usize, available: usize },

    /// Serial number is not an 8-digit hexadecimal value
    #[error("Invalid serial number: {0:?}")]
    InvalidSerialNumber(String),
}
