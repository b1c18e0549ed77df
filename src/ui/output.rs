use crate::analyser::containers::{WindowFeatureRow, WINDOW_COLUMNS};
use crate::analyser::core::WindowReport;
use crate::capture::rows::RowStreamSummary;
use crate::capture::DecodeStats;
use crate::error::FlowError;
use ansi_term::Colour;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Renders a capture timestamp as UTC wall-clock time.
pub fn format_timestamp(ts: f64) -> String {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    match chrono::DateTime::from_timestamp(secs as i64, nanos) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string(),
        None => format!("{ts}"),
    }
}

pub fn print_conversion(summary: &RowStreamSummary, output: &Path) {
    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Conversion");
    println!("\u{2503}");
    println!("\u{2503} Output           : {}", Colour::Fixed(226).paint(output.display().to_string()));
    println!("\u{2503} Rows written     : {}", Colour::Green.paint(summary.rows_written.to_string()));
    if let Some(after) = summary.resumed_after {
        println!("\u{2503} Resumed after    : {} ({})", after, format_timestamp(after));
        println!("\u{2503} Already present  : {}", summary.skipped_existing);
    }
    if summary.capped {
        println!("\u{2503} Stopped at       : {}", Colour::Yellow.paint("row cap"));
    }
    print_diagnostics(summary.malformed_records, summary.unaddressed_records, summary.unknown_magic);
    println!("\u{2503} ");
}

pub fn print_windows(report: &WindowReport, output: &Path) {
    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Windows");
    println!("\u{2503}");
    println!(
        "\u{2503} Device           : {} ({:?})",
        Colour::Red.paint(&report.device.address),
        report.device.basis
    );
    println!("\u{2503} Device rows      : {}", report.rows_for_device);
    println!("\u{2503} Windows          : {}", Colour::Green.paint(report.windows.len().to_string()));
    if let (Some(first), Some(last)) = (report.windows.first(), report.windows.last()) {
        println!("\u{2503} First window     : {}", format_timestamp(first.wstart));
        println!("\u{2503} Last window      : {}", format_timestamp(last.wstart));
        println!("\u{2503} Output           : {}", Colour::Fixed(226).paint(output.display().to_string()));
    }
    if let Some(DecodeStats { malformed, unaddressed, unknown_magic, .. }) = &report.decode {
        print_diagnostics(*malformed, *unaddressed, *unknown_magic);
    }
    println!("\u{2503} ");
}

fn print_diagnostics(malformed: u64, unaddressed: u64, unknown_magic: Option<u32>) {
    let colour = |n: u64| if n > 0 { Colour::Yellow } else { Colour::Green };
    println!("\u{2503} Malformed records: {}", colour(malformed).paint(malformed.to_string()));
    println!("\u{2503} No IPv4 addresses: {}", colour(unaddressed).paint(unaddressed.to_string()));
    if let Some(magic) = unknown_magic {
        println!("\u{2503} Unknown magic    : {}", Colour::Yellow.paint(format!("{magic:#010x}")));
    }
}

pub fn data_as_json<T: Serialize>(data: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(data)
}

/// Writes the feature-window table, header first.
pub fn save_windows(windows: &[WindowFeatureRow], path: &Path) -> Result<(), FlowError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).map_err(|source| FlowError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));
    writer.write_record(WINDOW_COLUMNS)?;
    for window in windows {
        writer.serialize(window)?;
    }
    writer.flush()?;

    log::info!("Saved {} windows to {}", windows.len(), path.display());
    Ok(())
}
