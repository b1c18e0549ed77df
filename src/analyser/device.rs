//! Guessing the device of interest from its traffic.
use super::containers::{PacketRecord, SENTINEL_ADDR};
use crate::config::DeviceConfig;
use serde::Serialize;
use std::collections::HashMap;

/// How the device address was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DetectionBasis {
    /// Given on the command line
    Supplied,
    /// Private address receiving the most bytes
    ReceivedBytes,
    /// Private address sending the most bytes
    SentBytes,
    /// Busiest destination of any kind
    Fallback,
    /// Nothing sampled
    Empty,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub address: String,
    pub basis: DetectionBasis,
}

/// Byte totals per address, remembering first-seen order for tie-breaks.
#[derive(Default)]
struct ByteTally {
    totals: HashMap<String, (u64, usize)>,
}

impl ByteTally {
    fn add(&mut self, addr: &str, bytes: u32) {
        let next = self.totals.len();
        let entry = self.totals.entry(addr.to_string()).or_insert((0, next));
        entry.0 += bytes as u64;
    }

    /// Largest total first; ties go to the address seen first.
    fn ranked(self) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64, usize)> = self
            .totals
            .into_iter()
            .map(|(addr, (bytes, seen))| (addr, bytes, seen))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.into_iter().map(|(addr, bytes, _)| (addr, bytes)).collect()
    }
}

pub struct DeviceIdentifier {
    config: DeviceConfig,
}

impl DeviceIdentifier {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    pub fn sample_rows(&self) -> usize {
        self.config.sample_rows
    }

    /// Picks the device from at most `sample_rows` rows.
    pub fn identify<'a, I>(&self, rows: I) -> Detection
    where
        I: IntoIterator<Item = &'a PacketRecord>,
    {
        let mut received = ByteTally::default();
        let mut sent = ByteTally::default();
        for row in rows.into_iter().take(self.config.sample_rows) {
            received.add(&row.dest_addr, row.length);
            sent.add(&row.source_addr, row.length);
        }

        let received = received.ranked();
        if let Some((addr, bytes)) = received.iter().find(|(a, _)| self.config.is_private(a)) {
            log::info!("Chosen by dst bytes: {addr} ({bytes} bytes)");
            return Detection {
                address: addr.clone(),
                basis: DetectionBasis::ReceivedBytes,
            };
        }

        if let Some((addr, bytes)) = sent.ranked().into_iter().find(|(a, _)| self.config.is_private(a)) {
            log::info!("Chosen by src bytes: {addr} ({bytes} bytes)");
            return Detection {
                address: addr,
                basis: DetectionBasis::SentBytes,
            };
        }

        match received.into_iter().next() {
            Some((addr, _)) => {
                log::warn!("No private address in sample, falling back to {addr}");
                Detection {
                    address: addr,
                    basis: DetectionBasis::Fallback,
                }
            }
            None => {
                log::warn!("Empty sample, no device detected");
                Detection {
                    address: SENTINEL_ADDR.to_string(),
                    basis: DetectionBasis::Empty,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(src: &str, dst: &str, length: u32) -> PacketRecord {
        PacketRecord {
            timestamp: 0.0,
            length,
            source_addr: src.to_string(),
            dest_addr: dst.to_string(),
        }
    }

    fn identify(rows: &[PacketRecord]) -> Detection {
        DeviceIdentifier::new(DeviceConfig::default()).identify(rows)
    }

    #[test]
    fn test_largest_private_receiver() {
        let mut rows = Vec::new();
        for _ in 0..9 {
            rows.push(row("8.8.8.8", "192.168.1.5", 100_000));
        }
        rows.push(row("8.8.4.4", "10.0.0.9", 50_000));
        rows.push(row("192.168.1.5", "1.1.1.1", 2_000_000));

        let detection = identify(&rows);
        assert_eq!(detection.address, "192.168.1.5");
        assert_eq!(detection.basis, DetectionBasis::ReceivedBytes);
    }

    #[test]
    fn test_falls_back_to_sender() {
        let rows = vec![row("172.20.0.3", "8.8.8.8", 500), row("8.8.8.8", "1.1.1.1", 9_000)];
        let detection = identify(&rows);
        assert_eq!(detection.address, "172.20.0.3");
        assert_eq!(detection.basis, DetectionBasis::SentBytes);
    }

    #[test]
    fn test_public_fallback_and_empty() {
        let rows = vec![row("1.1.1.1", "8.8.8.8", 500), row("1.1.1.1", "9.9.9.9", 900)];
        assert_eq!(identify(&rows).address, "9.9.9.9");
        assert_eq!(identify(&rows).basis, DetectionBasis::Fallback);

        let empty = identify(&[]);
        assert_eq!(empty.address, SENTINEL_ADDR);
        assert_eq!(empty.basis, DetectionBasis::Empty);
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let rows = vec![
            row("8.8.8.8", "10.0.0.2", 300),
            row("8.8.8.8", "10.0.0.1", 300),
            row("8.8.8.8", "10.0.0.2", 100),
            row("8.8.8.8", "10.0.0.1", 100),
        ];
        assert_eq!(identify(&rows).address, "10.0.0.2");
    }

    #[test]
    fn test_sample_is_bounded() {
        let config = DeviceConfig {
            sample_rows: 2,
            ..DeviceConfig::default()
        };
        let rows = vec![
            row("8.8.8.8", "10.0.0.1", 100),
            row("8.8.8.8", "10.0.0.1", 100),
            row("8.8.8.8", "10.0.0.2", 10_000),
        ];
        assert_eq!(DeviceIdentifier::new(config).identify(&rows).address, "10.0.0.1");
    }
}
