//! Decoding through an external tshark process, via rtshark.
//!
//! Yields the same [`PacketRecord`] contract as the native decoder. The
//! child process is owned by [`TsharkSource`] and killed on end of stream,
//! on the first read error, and on drop, so an early stop (row cap, `?`)
//! never leaves tshark behind.
use super::decoder::sentinel_pair;
use super::{DecodeStats, PacketSource};
use crate::analyser::containers::PacketRecord;
use crate::error::FlowError;
use rtshark::{Packet, RTShark};
use std::path::Path;

pub struct TsharkSource {
    rtshark: Option<RTShark>,
    stats: DecodeStats,
}

impl TsharkSource {
    pub fn spawn(path: &Path) -> Result<Self, FlowError> {
        // tshark reports a missing file only through its stderr, check first.
        std::fs::metadata(path).map_err(|source| FlowError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let input = path
            .to_str()
            .ok_or_else(|| FlowError::Tshark(format!("non UTF-8 path {}", path.display())))?;

        let builder = rtshark::RTSharkBuilder::builder().input_path(input);
        let rtshark = match builder.spawn() {
            Err(err) => return Err(FlowError::Tshark(format!("error spawning tshark: {err}"))),
            Ok(rtshark) => {
                log::info!("Reading from {} via tshark", path.display());
                rtshark
            }
        };

        Ok(Self {
            rtshark: Some(rtshark),
            stats: DecodeStats::default(),
        })
    }

    /// Kills and reaps the child. Idempotent.
    fn finish(&mut self) {
        if let Some(mut rtshark) = self.rtshark.take() {
            rtshark.kill();
            log::debug!("tshark terminated after {} packets", self.stats.decoded);
        }
    }
}

/// Epoch microseconds to fractional seconds, rounded the way the native
/// decoder computes `seconds + micros / 1e6`.
pub fn micros_to_timestamp(micros: i64) -> f64 {
    let seconds = micros.div_euclid(1_000_000);
    let fraction = micros.rem_euclid(1_000_000);
    seconds as f64 + fraction as f64 / 1_000_000.0
}

/// `None` when tshark gave no timestamp or captured length.
fn to_record(packet: &Packet) -> Option<(PacketRecord, bool)> {
    let timestamp = micros_to_timestamp(packet.timestamp_micros()?);
    let length = packet
        .layer_name("frame")?
        .metadata("frame.cap_len")?
        .value()
        .parse::<u32>()
        .ok()?;

    let addresses = packet.layer_name("ip").and_then(|ip| {
        let src = ip.metadata("ip.src")?.value().to_string();
        let dst = ip.metadata("ip.dst")?.value().to_string();
        Some((src, dst))
    });
    let addressed = addresses.is_some();
    let (source_addr, dest_addr) = addresses.unwrap_or_else(sentinel_pair);

    Some((
        PacketRecord {
            timestamp,
            length,
            source_addr,
            dest_addr,
        },
        addressed,
    ))
}

impl Iterator for TsharkSource {
    type Item = Result<PacketRecord, FlowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let rtshark = self.rtshark.as_mut()?;
            match rtshark.read() {
                Ok(Some(packet)) => match to_record(&packet) {
                    Some((record, addressed)) => {
                        if !addressed {
                            self.stats.unaddressed += 1;
                        }
                        self.stats.decoded += 1;
                        return Some(Ok(record));
                    }
                    None => {
                        log::warn!("tshark packet without timestamp or frame.cap_len, skipping");
                        self.stats.malformed += 1;
                    }
                },
                Ok(None) => {
                    self.finish();
                    return None;
                }
                Err(err) => {
                    self.finish();
                    return Some(Err(FlowError::Tshark(format!("error parsing tshark output: {err}"))));
                }
            }
        }
    }
}

impl PacketSource for TsharkSource {
    fn stats(&self) -> DecodeStats {
        self.stats.clone()
    }
}

impl Drop for TsharkSource {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::fixtures::temp_path;

    #[test]
    fn test_micros_to_timestamp() {
        assert_eq!(micros_to_timestamp(15_000_000), 15.0);
        assert_eq!(micros_to_timestamp(1_499_162_400_123_456), 1_499_162_400.0 + 123_456.0 / 1_000_000.0);
    }

    #[test]
    fn test_missing_capture_is_fatal() {
        let result = TsharkSource::spawn(&temp_path("does-not-exist.pcap"));
        assert!(matches!(result, Err(FlowError::Open { .. })));
    }
}
