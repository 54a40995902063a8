// src/error.rs
//
// Error type shared by the transport engine and the log-frame decoder.
// Per-frame failures inside the worker loops are handled locally and never
// surface here; IoError covers resource acquisition, codec contract
// violations, and symbol-table loading.

use thiserror::Error;

/// Errors produced by the transport engine and log decoder.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to open or configure a device.
    #[error("Connection error ({device}): {message}")]
    Connection { device: String, message: String },

    /// Device-level protocol violation.
    #[error("Protocol error ({device}): {message}")]
    Protocol { device: String, message: String },

    /// Read-side I/O failure.
    #[error("Read error: {0}")]
    Read(String),

    /// Write-side I/O failure.
    #[error("Write error: {0}")]
    Write(String),

    /// A bounded wait expired.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid caller-supplied configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// COBS frame that cannot be decoded.
    #[error("Malformed COBS frame")]
    MalformedFrame,

    /// Symbol-table file could not be read or parsed.
    #[error("Symbol table error: {0}")]
    SymbolTable(String),
}

impl IoError {
    /// Create a connection error for a named device.
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    /// Create a protocol error for a named device.
    pub fn protocol(device: &str, message: impl Into<String>) -> Self {
        IoError::Protocol {
            device: device.to_string(),
            message: message.into(),
        }
    }

    /// Create a read error.
    pub fn read(message: impl Into<String>) -> Self {
        IoError::Read(message.into())
    }

    /// Create a write error.
    pub fn write(message: impl Into<String>) -> Self {
        IoError::Write(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        IoError::Timeout(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }

    /// Create a symbol-table load error.
    pub fn symbol_table(message: impl Into<String>) -> Self {
        IoError::SymbolTable(message.into())
    }
}
