use serde::{Deserialize, Serialize};
use std::fmt;

/// Address written when a payload carries no usable IPv4 header.
pub const SENTINEL_ADDR: &str = "0.0.0.0";

/// Column order of the packet table.
pub const PACKET_COLUMNS: [&str; 4] = ["ts", "length", "src", "dst"];

/// Column order of the feature-window table.
pub const WINDOW_COLUMNS: [&str; 14] = [
    "wstart",
    "bytes_down",
    "pkt_count_down",
    "avg_pkt_size_down",
    "std_pkt_size_down",
    "bytes_up",
    "pkt_count_up",
    "avg_pkt_size_up",
    "std_pkt_size_up",
    "bitrate_down",
    "iat_mean_down",
    "iat_std_down",
    "burst_count_down",
    "ratio_down_up",
];

/// One decoded packet, also one row of the packet table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    #[serde(rename = "ts")]
    pub timestamp: f64,
    pub length: u32,
    #[serde(rename = "src")]
    pub source_addr: String,
    #[serde(rename = "dst")]
    pub dest_addr: String,
}

impl PacketRecord {
    /// True if `device` is either endpoint.
    pub fn involves(&self, device: &str) -> bool {
        self.source_addr == device || self.dest_addr == device
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ByteOrder {
    Big,
    Little,
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ByteOrder::Big => write!(f, "big-endian"),
            ByteOrder::Little => write!(f, "little-endian"),
        }
    }
}

/// The 24-byte global header of a capture file.
///
/// Only `byte_order` drives decoding; the rest is kept for diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureFileHeader {
    pub magic: u32,
    pub byte_order: ByteOrder,
    /// False when the magic was unrecognised and little-endian was assumed
    pub recognised: bool,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub linktype: u32,
}

/// Statistical summary of one time window for the device of interest.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WindowFeatureRow {
    pub wstart: f64,
    pub bytes_down: u64,
    pub pkt_count_down: u64,
    pub avg_pkt_size_down: f64,
    pub std_pkt_size_down: f64,
    pub bytes_up: u64,
    pub pkt_count_up: u64,
    pub avg_pkt_size_up: f64,
    pub std_pkt_size_up: f64,
    pub bitrate_down: f64,
    pub iat_mean_down: f64,
    pub iat_std_down: f64,
    pub burst_count_down: u64,
    pub ratio_down_up: f64,
}
