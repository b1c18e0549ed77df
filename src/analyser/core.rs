//! Packet stream to feature windows: device selection, filtering, windowing.
use super::containers::{PacketRecord, WindowFeatureRow};
use super::device::{Detection, DetectionBasis, DeviceIdentifier};
use super::utils::sort_by_timestamp;
use super::window::WindowAggregator;
use crate::capture::rows::read_packet_table;
use crate::capture::{open_source, DecodeStats, DecoderKind};
use crate::config::DecoderConfig;
use crate::error::FlowError;
use serde::Serialize;
use std::path::Path;

/// Where the packet stream comes from.
#[derive(Clone, Copy, Debug)]
pub enum RowInput<'a> {
    /// A `ts,length,src,dst` table
    Table(&'a Path),
    /// A capture file, decoded on the fly
    Capture {
        path: &'a Path,
        decoder: DecoderKind,
        config: &'a DecoderConfig,
    },
}

/// Result of a windowing run.
#[derive(Clone, Debug, Serialize)]
pub struct WindowReport {
    pub device: Detection,
    pub rows_for_device: usize,
    pub windows: Vec<WindowFeatureRow>,
    /// Present when the rows were decoded from a capture
    pub decode: Option<DecodeStats>,
}

/// How a windowing run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Written,
    /// No row has the device as source or destination
    NoDeviceRows,
    NoWindows,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Written => 0,
            Outcome::NoDeviceRows => 2,
            Outcome::NoWindows => 3,
        }
    }
}

impl WindowReport {
    /// `NoWindows` needs device rows that no window covers, which only
    /// happens when their timestamps are not finite.
    pub fn outcome(&self) -> Outcome {
        if self.rows_for_device == 0 {
            Outcome::NoDeviceRows
        } else if self.windows.is_empty() {
            Outcome::NoWindows
        } else {
            Outcome::Written
        }
    }
}

/// Keeps only rows involving `device`, in stream order.
pub fn collect_device_rows<I>(rows: I, device: &str) -> Result<Vec<PacketRecord>, FlowError>
where
    I: IntoIterator<Item = Result<PacketRecord, FlowError>>,
{
    let mut kept = Vec::new();
    for row in rows {
        let row = row?;
        if row.involves(device) {
            kept.push(row);
        }
    }
    Ok(kept)
}

/// Reads the first `identifier.sample_rows()` rows and picks the device.
fn detect(input: RowInput, identifier: &DeviceIdentifier) -> Result<Detection, FlowError> {
    log::info!("Sampling first {} rows to detect device address", identifier.sample_rows());
    let sample: Vec<PacketRecord> = match input {
        RowInput::Table(path) => read_packet_table(path)?
            .take(identifier.sample_rows())
            .collect::<Result<_, _>>()?,
        RowInput::Capture { path, decoder, config } => open_source(decoder, path, config)?
            .take(identifier.sample_rows())
            .collect::<Result<_, _>>()?,
    };
    Ok(identifier.identify(&sample))
}

/// Runs the whole windowing stage over `input`.
///
/// With no `device` the address is detected from a bounded prefix of the
/// input, which is then re-read from the start for filtering.
pub fn analyse(
    input: RowInput,
    device: Option<String>,
    identifier: &DeviceIdentifier,
    aggregator: &WindowAggregator,
) -> Result<WindowReport, FlowError> {
    log::info!("Starting analysis.");

    let device = match device {
        Some(address) => Detection {
            address,
            basis: DetectionBasis::Supplied,
        },
        None => detect(input, identifier)?,
    };
    log::info!("Using device address {}", device.address);

    let (mut rows, decode) = match input {
        RowInput::Table(path) => (collect_device_rows(read_packet_table(path)?, &device.address)?, None),
        RowInput::Capture { path, decoder, config } => {
            let mut source = open_source(decoder, path, config)?;
            let rows = collect_device_rows(&mut source, &device.address)?;
            (rows, Some(source.stats()))
        }
    };

    if rows.is_empty() {
        log::warn!("No rows found involving {}", device.address);
    } else {
        sort_by_timestamp(&mut rows);
    }

    let config = aggregator.config();
    log::info!(
        "Computing windows (win={}, step={}) on {} rows",
        config.window_size,
        config.step,
        rows.len()
    );
    let windows = aggregator.aggregate(&rows, &device.address);

    Ok(WindowReport {
        device,
        rows_for_device: rows.len(),
        windows,
        decode,
    })
}
