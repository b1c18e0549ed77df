//! Capture decoding and packet-table materialisation.
//! Turns capture files into a `ts,length,src,dst` row stream, resumable across runs.
pub mod decoder;
pub mod resume;
pub mod rows;
pub mod tshark;

use crate::analyser::containers::PacketRecord;
use crate::config::DecoderConfig;
use crate::error::FlowError;
use serde::Serialize;
use std::path::Path;

/// Side-channel diagnostics gathered while decoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DecodeStats {
    pub decoded: u64,
    /// Records skipped for an out-of-range captured length
    pub malformed: u64,
    /// Records emitted with sentinel addresses
    pub unaddressed: u64,
    /// Raw magic when it was not one of the two known values
    pub unknown_magic: Option<u32>,
}

/// A single-pass, ordered stream of packet records.
///
/// Per-record anomalies are absorbed into [`DecodeStats`]; an `Err` item is
/// structural and ends the stream.
pub trait PacketSource: Iterator<Item = Result<PacketRecord, FlowError>> {
    fn stats(&self) -> DecodeStats;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum DecoderKind {
    /// Built-in binary decoder
    Native,
    /// External tshark process
    Tshark,
}

/// Opens `path` with the chosen decoding strategy.
pub fn open_source(
    kind: DecoderKind,
    path: &Path,
    config: &DecoderConfig,
) -> Result<Box<dyn PacketSource>, FlowError> {
    let source: Box<dyn PacketSource> = match kind {
        DecoderKind::Native => Box::new(decoder::PcapDecoder::open(path, config.clone())?),
        DecoderKind::Tshark => Box::new(tshark::TsharkSource::spawn(path)?),
    };
    Ok(source)
}

/// Synthetic capture builders shared by the capture and analyser tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::analyser::containers::ByteOrder;

    fn put_u32(out: &mut Vec<u8>, order: ByteOrder, value: u32) {
        match order {
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    fn put_u16(out: &mut Vec<u8>, order: ByteOrder, value: u16) {
        match order {
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    pub(crate) fn global_header(order: ByteOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(24);
        put_u32(&mut out, order, 0xA1B2_C3D4);
        put_u16(&mut out, order, 2);
        put_u16(&mut out, order, 4);
        put_u32(&mut out, order, 0);
        put_u32(&mut out, order, 0);
        put_u32(&mut out, order, 65535);
        put_u32(&mut out, order, 1);
        out
    }

    /// Ethernet + minimal IPv4 header, padded to `len` bytes.
    pub(crate) fn ipv4_frame(src: [u8; 4], dst: [u8; 4], len: usize) -> Vec<u8> {
        let mut frame = vec![0u8; len.max(34)];
        frame[12] = 0x08;
        frame[14] = 0x45;
        frame[26..30].copy_from_slice(&src);
        frame[30..34].copy_from_slice(&dst);
        frame
    }

    /// Record header declaring `captured_len`, followed by `payload` verbatim.
    pub(crate) fn record(order: ByteOrder, sec: u32, usec: u32, captured_len: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + payload.len());
        put_u32(&mut out, order, sec);
        put_u32(&mut out, order, usec);
        put_u32(&mut out, order, captured_len);
        put_u32(&mut out, order, captured_len);
        out.extend_from_slice(payload);
        out
    }

    /// Little-endian capture with one well-formed frame per `(sec, usec)`.
    pub(crate) fn capture(packets: &[(u32, u32, [u8; 4], [u8; 4], usize)]) -> Vec<u8> {
        let mut out = global_header(ByteOrder::Little);
        for &(sec, usec, src, dst, len) in packets {
            let frame = ipv4_frame(src, dst, len);
            out.extend(record(ByteOrder::Little, sec, usec, frame.len() as u32, &frame));
        }
        out
    }

    /// Unique path under the system temp dir.
    pub(crate) fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("flowsniff-{}-{}", std::process::id(), name))
    }
}
