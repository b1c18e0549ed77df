//! Native decoder for classic libpcap capture files.
//!
//! Layout: a 24-byte global header, then records of a 16-byte header
//! (seconds, microseconds, captured length, original length) followed by
//! `captured length` bytes of link-layer payload. The magic number fixes the
//! byte order of every later multi-byte field.
use super::{DecodeStats, PacketSource};
use crate::analyser::containers::{ByteOrder, CaptureFileHeader, PacketRecord, SENTINEL_ADDR};
use crate::config::DecoderConfig;
use crate::error::{AddressError, FlowError};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::net::Ipv4Addr;
use std::path::Path;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Magic as read big-endian from a big-endian file.
pub const MAGIC_BIG: u32 = 0xA1B2_C3D4;
/// Magic as read big-endian from a little-endian file.
pub const MAGIC_LITTLE: u32 = 0xD4C3_B2A1;

const ETHERNET_HEADER_LEN: usize = 14;
/// Ethernet header plus the fixed 20-byte IPv4 header.
const MIN_IPV4_FRAME: usize = ETHERNET_HEADER_LEN + 20;

impl ByteOrder {
    fn u16_at(self, raw: &[u8], at: usize) -> u16 {
        let bytes = [raw[at], raw[at + 1]];
        match self {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        }
    }

    fn u32_at(self, raw: &[u8], at: usize) -> u32 {
        let bytes = [raw[at], raw[at + 1], raw[at + 2], raw[at + 3]];
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }
}

/// Decodes the global header. An unknown magic falls back to little-endian.
pub fn parse_global_header(raw: &[u8; GLOBAL_HEADER_LEN]) -> CaptureFileHeader {
    let magic = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let (byte_order, recognised) = match magic {
        MAGIC_BIG => (ByteOrder::Big, true),
        MAGIC_LITTLE => (ByteOrder::Little, true),
        _ => (ByteOrder::Little, false),
    };

    CaptureFileHeader {
        magic,
        byte_order,
        recognised,
        version_major: byte_order.u16_at(raw, 4),
        version_minor: byte_order.u16_at(raw, 6),
        thiszone: byte_order.u32_at(raw, 8) as i32,
        sigfigs: byte_order.u32_at(raw, 12),
        snaplen: byte_order.u32_at(raw, 16),
        linktype: byte_order.u32_at(raw, 20),
    }
}

/// Pulls the IPv4 source and destination out of an Ethernet frame.
pub fn extract_addresses(payload: &[u8]) -> Result<(Ipv4Addr, Ipv4Addr), AddressError> {
    if payload.len() < MIN_IPV4_FRAME {
        return Err(AddressError::TooShort(payload.len()));
    }

    let ip = &payload[ETHERNET_HEADER_LEN..];
    let version = ip[0] >> 4;
    if version != 4 {
        return Err(AddressError::NotIpv4(version));
    }

    let src = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);
    Ok((src, dst))
}

pub fn sentinel_pair() -> (String, String) {
    (SENTINEL_ADDR.to_string(), SENTINEL_ADDR.to_string())
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Lazily decodes packet records from a capture stream.
pub struct PcapDecoder<R> {
    reader: R,
    header: CaptureFileHeader,
    config: DecoderConfig,
    stats: DecodeStats,
    payload: Vec<u8>,
    /// Index of the next record header, malformed ones included
    index: u64,
    done: bool,
}

impl PcapDecoder<BufReader<File>> {
    pub fn open(path: &Path, config: DecoderConfig) -> Result<Self, FlowError> {
        let file = File::open(path).map_err(|source| FlowError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Reading from {}", path.display());
        Self::new(BufReader::new(file), config)
    }
}

impl<R: Read> PcapDecoder<R> {
    /// Consumes the global header. Fails only if it is shorter than 24 bytes.
    pub fn new(mut reader: R, config: DecoderConfig) -> Result<Self, FlowError> {
        let mut raw = [0u8; GLOBAL_HEADER_LEN];
        let got = read_full(&mut reader, &mut raw)?;
        if got < GLOBAL_HEADER_LEN {
            return Err(FlowError::TruncatedHeader(got));
        }

        let header = parse_global_header(&raw);
        let mut stats = DecodeStats::default();
        if header.recognised {
            log::info!("Detected {} capture format", header.byte_order);
            log::debug!(
                "Capture v{}.{}, snaplen {}, linktype {}",
                header.version_major,
                header.version_minor,
                header.snaplen,
                header.linktype
            );
        } else {
            log::warn!(
                "Unexpected magic number {:#010x}, assuming {}",
                header.magic,
                header.byte_order
            );
            stats.unknown_magic = Some(header.magic);
        }

        Ok(Self {
            reader,
            header,
            config,
            stats,
            payload: Vec::new(),
            index: 0,
            done: false,
        })
    }

    fn next_record(&mut self) -> Result<Option<PacketRecord>, FlowError> {
        loop {
            let mut raw = [0u8; RECORD_HEADER_LEN];
            if read_full(&mut self.reader, &mut raw)? < RECORD_HEADER_LEN {
                return Ok(None);
            }

            let index = self.index;
            self.index += 1;

            let order = self.header.byte_order;
            let seconds = order.u32_at(&raw, 0);
            let micros = order.u32_at(&raw, 4);
            let captured_len = order.u32_at(&raw, 8);

            // Only the record header is consumed; the next 16 bytes are read
            // as the following record header.
            if captured_len == 0 || captured_len > self.config.max_captured_len {
                log::warn!("Invalid packet length {captured_len} at record {index}");
                self.stats.malformed += 1;
                continue;
            }

            self.payload.resize(captured_len as usize, 0);
            let got = read_full(&mut self.reader, &mut self.payload)?;
            if got < self.payload.len() {
                log::warn!(
                    "Could not read full packet data for record {index} ({got} of {captured_len} bytes)"
                );
                return Ok(None);
            }

            let (source_addr, dest_addr) = match extract_addresses(&self.payload) {
                Ok((src, dst)) => (src.to_string(), dst.to_string()),
                Err(err) => {
                    log::trace!("Record {index}: {err}");
                    self.stats.unaddressed += 1;
                    sentinel_pair()
                }
            };

            self.stats.decoded += 1;
            return Ok(Some(PacketRecord {
                timestamp: seconds as f64 + micros as f64 / 1_000_000.0,
                length: captured_len,
                source_addr,
                dest_addr,
            }));
        }
    }
}

impl<R: Read> Iterator for PcapDecoder<R> {
    type Item = Result<PacketRecord, FlowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: Read> PacketSource for PcapDecoder<R> {
    fn stats(&self) -> DecodeStats {
        self.stats.clone()
    }
}
