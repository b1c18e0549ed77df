//! Finding where a previous conversion stopped.
//!
//! The packet table is scanned backward in fixed blocks, so only its tail is
//! read no matter how large it has grown.
use crate::analyser::containers::PACKET_COLUMNS;
use crate::error::FlowError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

pub const SCAN_BLOCK: usize = 64 * 1024;

/// State of an existing packet table.
#[derive(Clone, Debug, PartialEq)]
pub struct ResumePoint {
    /// Timestamp of the last well-formed data row, if any
    pub last_timestamp: Option<f64>,
    /// Byte length up to and including the last newline
    pub valid_len: u64,
    /// Malformed lines passed over while scanning
    pub skipped_lines: u64,
    /// The scan stopped on the `ts,length,src,dst` header row
    pub header_seen: bool,
}

impl ResumePoint {
    /// Whether rows can be appended after `valid_len`. A table whose kept
    /// part has neither a data row nor the header is rewritten instead.
    pub fn can_append(&self) -> bool {
        self.last_timestamp.is_some() || self.header_seen
    }
}

enum Line {
    Row(f64),
    Header,
    Blank,
    Malformed,
}

fn classify(line: &[u8]) -> Line {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return Line::Blank;
    }
    let Ok(text) = std::str::from_utf8(line) else {
        return Line::Malformed;
    };

    let fields: Vec<&str> = text.split(',').collect();
    if fields.len() != PACKET_COLUMNS.len() {
        return Line::Malformed;
    }
    if fields[0] == PACKET_COLUMNS[0] {
        return Line::Header;
    }
    match (fields[0].parse::<f64>(), fields[1].parse::<u32>()) {
        (Ok(ts), Ok(_)) if ts.is_finite() => Line::Row(ts),
        _ => Line::Malformed,
    }
}

/// Records `line` into `point`; true once the scan can stop.
fn settle(line: &[u8], point: &mut ResumePoint) -> bool {
    match classify(line) {
        Line::Row(ts) => {
            point.last_timestamp = Some(ts);
            true
        }
        Line::Header => {
            point.header_seen = true;
            true
        }
        Line::Blank => false,
        Line::Malformed => {
            log::warn!("Skipping malformed row while scanning for resume point");
            point.skipped_lines += 1;
            false
        }
    }
}

/// Scans `reader` from its end for the last data row.
pub fn scan_last_timestamp<R: Read + Seek>(reader: &mut R) -> Result<ResumePoint, FlowError> {
    scan_with_block(reader, SCAN_BLOCK)
}

fn scan_with_block<R: Read + Seek>(reader: &mut R, block_size: usize) -> Result<ResumePoint, FlowError> {
    let mut pos = reader.seek(SeekFrom::End(0))?;
    let mut point = ResumePoint {
        last_timestamp: None,
        valid_len: 0,
        skipped_lines: 0,
        header_seen: false,
    };
    // Bytes from the start of the current block up to the first unconsumed
    // newline; always the head of a line whose start is not yet known.
    let mut carry: Vec<u8> = Vec::new();
    let mut seen_newline = false;

    while pos > 0 {
        let block = (block_size as u64).min(pos) as usize;
        pos -= block as u64;
        reader.seek(SeekFrom::Start(pos))?;

        let mut buf = vec![0u8; block + carry.len()];
        reader.read_exact(&mut buf[..block])?;
        buf[block..].copy_from_slice(&carry);

        let mut segment_end = buf.len();
        while let Some(nl) = buf[..segment_end].iter().rposition(|&b| b == b'\n') {
            let line = &buf[nl + 1..segment_end];
            if !seen_newline {
                // Whatever follows the final newline was never terminated.
                seen_newline = true;
                point.valid_len = pos + nl as u64 + 1;
                if !line.is_empty() {
                    log::warn!("Discarding unterminated trailing line ({} bytes)", line.len());
                }
            } else if settle(line, &mut point) {
                return Ok(point);
            }
            segment_end = nl;
        }
        carry = buf[..segment_end].to_vec();
    }

    // `carry` is now the first line of the file.
    if seen_newline {
        settle(&carry, &mut point);
    } else if !carry.is_empty() {
        log::warn!("Discarding unterminated trailing line ({} bytes)", carry.len());
    }
    Ok(point)
}

/// `None` when `path` is absent or empty, meaning a fresh conversion.
pub fn find_resume_point(path: &Path) -> Result<Option<ResumePoint>, FlowError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(FlowError::Open {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }

    let point = scan_last_timestamp(&mut file)?;
    log::info!(
        "Resume point for {}: last ts {:?}, {} valid bytes, {} malformed lines passed",
        path.display(),
        point.last_timestamp,
        point.valid_len,
        point.skipped_lines
    );
    Ok(Some(point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn scan(text: &str, block: usize) -> ResumePoint {
        scan_with_block(&mut Cursor::new(text.as_bytes().to_vec()), block).unwrap()
    }

    #[test]
    fn test_last_row_found() {
        let text = "ts,length,src,dst\n0.0,60,10.0.0.1,10.0.0.2\n5.0,60,10.0.0.1,10.0.0.2\n10.5,60,10.0.0.1,10.0.0.2\n";
        for block in [3, 7, 16, SCAN_BLOCK] {
            let point = scan(text, block);
            assert_eq!(point.last_timestamp, Some(10.5));
            assert_eq!(point.valid_len, text.len() as u64);
        }
    }

    #[test]
    fn test_header_only() {
        let point = scan("ts,length,src,dst\n", 4);
        assert_eq!(point.last_timestamp, None);
        assert_eq!(point.valid_len, 18);
        assert!(point.header_seen);
        assert!(point.can_append());
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let text = "ts,length,src,dst\n3.25,60,a,b\ngarbage\n\n4.0,notanumber,a,b\n";
        let point = scan(text, 5);
        assert_eq!(point.last_timestamp, Some(3.25));
        assert_eq!(point.skipped_lines, 2);
    }

    #[test]
    fn test_unterminated_tail() {
        let text = "ts,length,src,dst\n1.0,60,a,b\n2.0,6";
        let point = scan(text, 8);
        assert_eq!(point.last_timestamp, Some(1.0));
        assert_eq!(point.valid_len, (text.len() - 5) as u64);
    }

    #[test]
    fn test_no_newline_at_all() {
        let point = scan("ts,length,s", 4);
        assert_eq!(point.last_timestamp, None);
        assert_eq!(point.valid_len, 0);
    }

    #[test]
    fn test_first_line_is_data() {
        let point = scan("7.5,60,a,b\n", 2);
        assert_eq!(point.last_timestamp, Some(7.5));
        assert!(!point.header_seen);
    }

    #[test]
    fn test_no_header_or_row() {
        let point = scan("garbage line\nmore,garbage\n", 6);
        assert_eq!(point.last_timestamp, None);
        assert!(!point.header_seen);
        assert_eq!(point.skipped_lines, 2);
        assert!(!point.can_append());
    }
}
