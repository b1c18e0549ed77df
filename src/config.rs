//! Per-component run configuration.
//!
//! Each stage takes its own config at construction; defaults carry the
//! constants the converter and windowing scripts have always used.

use crate::error::FlowError;
use serde::Serialize;

/// Largest `captured-length` the native decoder accepts.
pub const MAX_CAPTURED_LEN: u32 = 65535;

/// Rows sampled when guessing the device address.
pub const SAMPLE_ROWS_FOR_AUTODETECT: usize = 250_000;

/// Downstream packets longer than this count as a burst.
pub const BURST_THRESHOLD: u32 = 1000;

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub max_captured_len: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_captured_len: MAX_CAPTURED_LEN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Prefix of the row stream used for detection
    pub sample_rows: usize,
    /// Address prefixes considered private-network space
    pub private_prefixes: Vec<String>,
}

impl DeviceConfig {
    pub fn is_private(&self, addr: &str) -> bool {
        self.private_prefixes.iter().any(|p| addr.starts_with(p.as_str()))
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut private_prefixes = vec![String::from("10.")];
        private_prefixes.extend((16..=31).map(|octet| format!("172.{octet}.")));
        private_prefixes.push(String::from("192.168."));

        Self {
            sample_rows: SAMPLE_ROWS_FOR_AUTODETECT,
            private_prefixes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowConfig {
    /// Window length in seconds
    pub window_size: f64,
    /// Cursor advance in seconds, may be smaller than `window_size`
    pub step: f64,
    pub burst_threshold: u32,
}

impl WindowConfig {
    /// Builds a config, rejecting parameters that would stall the cursor.
    pub fn new(window_size: f64, step: f64) -> Result<Self, FlowError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(window_size) || !valid(step) {
            return Err(FlowError::InvalidWindow { window_size, step });
        }

        Ok(Self {
            window_size,
            step,
            burst_threshold: BURST_THRESHOLD,
        })
    }
}
