//! Materialising decoded packets as `ts,length,src,dst` rows.
use super::resume::{find_resume_point, ResumePoint};
use super::{open_source, DecoderKind, PacketSource};
use crate::analyser::containers::{PacketRecord, PACKET_COLUMNS};
use crate::config::DecoderConfig;
use crate::error::FlowError;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Rows emitted between two progress lines.
pub const PROGRESS_EVERY: u64 = 10_000;

/// Destination for decoded rows.
pub trait RowSink {
    fn write_row(&mut self, record: &PacketRecord) -> Result<(), FlowError>;

    fn flush(&mut self) -> Result<(), FlowError> {
        Ok(())
    }
}

/// In-memory table.
impl RowSink for Vec<PacketRecord> {
    fn write_row(&mut self, record: &PacketRecord) -> Result<(), FlowError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Delimited-text table.
pub struct CsvRowSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvRowSink<W> {
    /// Starts a new table with its header row.
    pub fn fresh(inner: W) -> Result<Self, FlowError> {
        let mut sink = Self::appending(inner);
        sink.writer.write_record(PACKET_COLUMNS)?;
        Ok(sink)
    }

    /// Continues an existing table; no header is written.
    pub fn appending(inner: W) -> Self {
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        Self { writer }
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn write_row(&mut self, record: &PacketRecord) -> Result<(), FlowError> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FlowError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// What one conversion run did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RowStreamSummary {
    pub rows_written: u64,
    /// Records at or before the resume point
    pub skipped_existing: u64,
    pub malformed_records: u64,
    pub unaddressed_records: u64,
    pub unknown_magic: Option<u32>,
    pub resumed_after: Option<f64>,
    /// Stopped by the row cap rather than end of capture
    pub capped: bool,
}

/// Drives `source` into `sink`.
///
/// With `after` set only records with `timestamp > after` are written, which
/// assumes the capture's timestamps never decrease. Stops early once
/// `max_rows` rows have been written.
pub fn stream_rows<S, K>(
    source: &mut S,
    sink: &mut K,
    after: Option<f64>,
    max_rows: Option<u64>,
) -> Result<RowStreamSummary, FlowError>
where
    S: PacketSource + ?Sized,
    K: RowSink + ?Sized,
{
    let mut summary = RowStreamSummary {
        resumed_after: after,
        capped: max_rows == Some(0),
        ..Default::default()
    };

    while !summary.capped {
        let Some(item) = source.next() else {
            break;
        };
        let record = item?;

        if let Some(last) = after {
            if record.timestamp <= last {
                summary.skipped_existing += 1;
                continue;
            }
        }

        sink.write_row(&record)?;
        summary.rows_written += 1;
        if summary.rows_written % PROGRESS_EVERY == 0 {
            log::info!("Processed {} packets...", summary.rows_written);
        }
        if Some(summary.rows_written) == max_rows {
            log::info!("Row cap of {} reached, stopping", summary.rows_written);
            summary.capped = true;
        }
    }
    sink.flush()?;

    let stats = source.stats();
    summary.malformed_records = stats.malformed;
    summary.unaddressed_records = stats.unaddressed;
    summary.unknown_magic = stats.unknown_magic;
    Ok(summary)
}

/// Inputs of the `convert` command.
#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub capture: PathBuf,
    pub output: PathBuf,
    pub decoder: DecoderKind,
    pub resume: bool,
    pub max_rows: Option<u64>,
}

fn create_output(path: &Path) -> Result<File, FlowError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    File::create(path).map_err(|source| FlowError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Opens `path` for appending after cutting it back to `point.valid_len`.
fn reopen_for_append(path: &Path, point: &ResumePoint) -> Result<File, FlowError> {
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|source| FlowError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    file.set_len(point.valid_len)?;
    Ok(file)
}

/// Capture file to packet table, fresh or resumed.
pub fn convert(options: &ConvertOptions, config: &DecoderConfig) -> Result<RowStreamSummary, FlowError> {
    log::info!("Converting {} to {}", options.capture.display(), options.output.display());
    let mut source = open_source(options.decoder, &options.capture, config)?;

    let resume_point = if options.resume {
        find_resume_point(&options.output)?
    } else {
        None
    };

    match resume_point {
        Some(point) if point.can_append() => {
            log::info!("Appending to {}", options.output.display());
            let file = reopen_for_append(&options.output, &point)?;
            let mut sink = CsvRowSink::appending(BufWriter::new(file));
            stream_rows(&mut *source, &mut sink, point.last_timestamp, options.max_rows)
        }
        other => {
            if other.is_some() {
                log::warn!("Resume requested but no usable row or header found. Starting fresh.");
            }
            let file = create_output(&options.output)?;
            let mut sink = CsvRowSink::fresh(BufWriter::new(file))?;
            stream_rows(&mut *source, &mut sink, None, options.max_rows)
        }
    }
}

/// Opens a packet table, checking its header for the four required columns.
pub fn read_packet_table(
    path: &Path,
) -> Result<impl Iterator<Item = Result<PacketRecord, FlowError>>, FlowError> {
    let file = File::open(path).map_err(|source| FlowError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    for column in PACKET_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(FlowError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    Ok(reader
        .into_deserialize::<PacketRecord>()
        .map(|row| row.map_err(FlowError::from)))
}
