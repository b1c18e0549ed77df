//! Error types shared by the capture and analysis stages.

use std::path::PathBuf;
use thiserror::Error;

/// Structural failures that abort a run.
///
/// Per-record anomalies never end up here; they are counted in
/// [`DecodeStats`](crate::capture::DecodeStats) instead.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Capture or table could not be opened
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fewer than 24 bytes before EOF
    #[error("global header truncated: got {0} of 24 bytes")]
    TruncatedHeader(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// tshark could not be spawned or its output could not be parsed
    #[error("tshark: {0}")]
    Tshark(String),

    #[error("invalid window parameters: size={window_size}, step={step}")]
    InvalidWindow { window_size: f64, step: f64 },

    /// Packet table lacks one of ts,length,src,dst
    #[error("packet table {path} is missing column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },
}

/// Why a payload yielded no IPv4 addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("payload too short for Ethernet+IPv4: {0} bytes")]
    TooShort(usize),

    #[error("unsupported IP version {0}")]
    NotIpv4(u8),
}
