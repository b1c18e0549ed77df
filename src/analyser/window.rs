//! Sliding-window traffic features for one device.
//!
//! Windows are `[wstart, wstart + window_size)`, starting at the first row's
//! timestamp and advancing by `step` while `wstart <= last timestamp`. A
//! window with no downstream and no upstream row is dropped.
use super::containers::{PacketRecord, WindowFeatureRow};
use super::utils::Moments;
use crate::config::WindowConfig;

/// Byte and size statistics of one traffic direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct DirectionStats {
    bytes: u64,
    count: u64,
    sizes: Moments,
}

impl DirectionStats {
    fn compute(rows: &[&PacketRecord]) -> Self {
        let sizes: Vec<f64> = rows.iter().map(|r| r.length as f64).collect();
        Self {
            bytes: rows.iter().map(|r| r.length as u64).sum(),
            count: rows.len() as u64,
            sizes: Moments::compute(&sizes),
        }
    }
}

pub struct WindowAggregator {
    config: WindowConfig,
}

impl WindowAggregator {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Computes every non-empty window over `rows`.
    ///
    /// `rows` must be sorted by timestamp and should already be restricted
    /// to rows where `device` is source or destination.
    pub fn aggregate(&self, rows: &[PacketRecord], device: &str) -> Vec<WindowFeatureRow> {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Vec::new();
        };
        let end_ts = last.timestamp;

        let mut windows = Vec::new();
        let mut t = first.timestamp;
        while t <= end_ts {
            let wend = t + self.config.window_size;
            let lo = rows.partition_point(|r| r.timestamp < t);
            let hi = rows.partition_point(|r| r.timestamp < wend);

            if let Some(window) = self.summarise(t, &rows[lo..hi], device) {
                windows.push(window);
            }

            let next = t + self.config.step;
            if next <= t {
                log::warn!("Step {} too small to advance past {t}, stopping", self.config.step);
                break;
            }
            t = next;
        }

        log::debug!("{} windows from {} rows", windows.len(), rows.len());
        windows
    }

    fn summarise(&self, wstart: f64, rows: &[PacketRecord], device: &str) -> Option<WindowFeatureRow> {
        let down: Vec<&PacketRecord> = rows.iter().filter(|r| r.dest_addr == device).collect();
        let up: Vec<&PacketRecord> = rows.iter().filter(|r| r.source_addr == device).collect();
        if down.is_empty() && up.is_empty() {
            return None;
        }

        let down_stats = DirectionStats::compute(&down);
        let up_stats = DirectionStats::compute(&up);

        // Rows arrive time-ordered, so consecutive differences are the gaps.
        let iat = if down.len() > 1 {
            let gaps: Vec<f64> = down.windows(2).map(|p| p[1].timestamp - p[0].timestamp).collect();
            Moments::compute(&gaps)
        } else {
            Moments::default()
        };

        let burst_count_down = down
            .iter()
            .filter(|r| r.length > self.config.burst_threshold)
            .count() as u64;

        Some(WindowFeatureRow {
            wstart,
            bytes_down: down_stats.bytes,
            pkt_count_down: down_stats.count,
            avg_pkt_size_down: down_stats.sizes.mean,
            std_pkt_size_down: down_stats.sizes.std_dev,
            bytes_up: up_stats.bytes,
            pkt_count_up: up_stats.count,
            avg_pkt_size_up: up_stats.sizes.mean,
            std_pkt_size_up: up_stats.sizes.std_dev,
            bitrate_down: down_stats.bytes as f64 / self.config.window_size,
            iat_mean_down: iat.mean,
            iat_std_down: iat.std_dev,
            burst_count_down,
            // +1 keeps the ratio finite when nothing went up
            ratio_down_up: down_stats.bytes as f64 / (up_stats.bytes as f64 + 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEVICE: &str = "192.168.1.5";
    const PEER: &str = "93.184.216.34";

    fn down(ts: f64, length: u32) -> PacketRecord {
        PacketRecord {
            timestamp: ts,
            length,
            source_addr: PEER.to_string(),
            dest_addr: DEVICE.to_string(),
        }
    }

    fn up(ts: f64, length: u32) -> PacketRecord {
        PacketRecord {
            timestamp: ts,
            length,
            source_addr: DEVICE.to_string(),
            dest_addr: PEER.to_string(),
        }
    }

    fn aggregator(window_size: f64, step: f64) -> WindowAggregator {
        WindowAggregator::new(WindowConfig::new(window_size, step).unwrap())
    }

    #[test]
    fn test_tumbling_windows() {
        let rows: Vec<PacketRecord> = [0.0, 1.0, 2.0, 6.0, 7.0].iter().map(|&ts| down(ts, 100)).collect();
        let windows = aggregator(5.0, 5.0).aggregate(&rows, DEVICE);

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].wstart, 0.0);
        assert_eq!(windows[0].pkt_count_down, 3);
        assert_eq!(windows[0].bytes_down, 300);
        assert_eq!(windows[1].wstart, 5.0);
        assert_eq!(windows[1].pkt_count_down, 2);
        assert_eq!(windows[1].bytes_down, 200);
    }

    #[test]
    fn test_ratio_without_upstream() {
        let rows: Vec<PacketRecord> = [0.0, 1.0, 2.0].iter().map(|&ts| down(ts, 100)).collect();
        let window = &aggregator(5.0, 5.0).aggregate(&rows, DEVICE)[0];

        assert_eq!(window.bytes_up, 0);
        assert_eq!(window.ratio_down_up, 300.0);
        assert_eq!(window.avg_pkt_size_up, 0.0);
        assert_eq!(window.std_pkt_size_up, 0.0);
        assert_eq!(window.bitrate_down, 60.0);
    }

    #[test]
    fn test_feature_values() {
        let rows = vec![down(0.0, 1500), up(0.5, 100), down(1.0, 500), down(3.0, 1200), up(4.0, 300)];
        let w = &aggregator(10.0, 10.0).aggregate(&rows, DEVICE)[0];

        assert_eq!(w.bytes_down, 3200);
        assert_eq!(w.pkt_count_down, 3);
        assert!((w.avg_pkt_size_down - 3200.0 / 3.0).abs() < 1e-9);
        let expected_std = (((1500.0 - 3200.0 / 3.0f64).powi(2)
            + (500.0 - 3200.0 / 3.0f64).powi(2)
            + (1200.0 - 3200.0 / 3.0f64).powi(2))
            / 3.0)
            .sqrt();
        assert!((w.std_pkt_size_down - expected_std).abs() < 1e-9);

        assert_eq!(w.bytes_up, 400);
        assert_eq!(w.pkt_count_up, 2);
        assert_eq!(w.avg_pkt_size_up, 200.0);
        assert_eq!(w.std_pkt_size_up, 100.0);

        // gaps 1.0 and 2.0
        assert_eq!(w.iat_mean_down, 1.5);
        assert_eq!(w.iat_std_down, 0.5);
        assert_eq!(w.burst_count_down, 2);
        assert_eq!(w.bitrate_down, 320.0);
        assert_eq!(w.ratio_down_up, 3200.0 / 401.0);
    }

    #[test]
    fn test_single_downstream_packet_iat() {
        let rows = vec![down(0.0, 100), up(1.0, 100)];
        let w = &aggregator(5.0, 5.0).aggregate(&rows, DEVICE)[0];
        assert_eq!(w.iat_mean_down, 0.0);
        assert_eq!(w.iat_std_down, 0.0);
    }

    #[test]
    fn test_empty_windows_dropped() {
        let rows = vec![down(0.0, 100), down(21.0, 100)];
        let windows = aggregator(5.0, 5.0).aggregate(&rows, DEVICE);
        let starts: Vec<f64> = windows.iter().map(|w| w.wstart).collect();
        assert_eq!(starts, vec![0.0, 20.0]);
    }

    #[test]
    fn test_overlapping_windows() {
        let rows: Vec<PacketRecord> = [0.0, 1.0, 2.0, 3.0].iter().map(|&ts| down(ts, 100)).collect();
        let windows = aggregator(2.0, 1.0).aggregate(&rows, DEVICE);
        let counts: Vec<u64> = windows.iter().map(|w| w.pkt_count_down).collect();
        assert_eq!(counts, vec![2, 2, 2, 1]);
    }

    #[test]
    fn test_no_rows() {
        assert!(aggregator(5.0, 5.0).aggregate(&[], DEVICE).is_empty());
    }

    proptest! {
        #[test]
        fn windows_cover_only_device_traffic(
            gaps in prop::collection::vec(0.0f64..3.0, 1..60),
            lengths in prop::collection::vec(1u32..2000, 60),
            window_size in 0.5f64..10.0,
            step in 0.5f64..10.0,
        ) {
            let mut ts = 100.0;
            let rows: Vec<PacketRecord> = gaps
                .iter()
                .zip(&lengths)
                .enumerate()
                .map(|(i, (gap, &len))| {
                    ts += gap;
                    if i % 3 == 0 { up(ts, len) } else { down(ts, len) }
                })
                .collect();

            let windows = aggregator(window_size, step).aggregate(&rows, DEVICE);
            let last = rows.last().unwrap().timestamp;

            prop_assert!(!windows.is_empty());
            prop_assert_eq!(windows[0].wstart, rows[0].timestamp);
            for pair in windows.windows(2) {
                prop_assert!(pair[0].wstart < pair[1].wstart);
            }
            for w in &windows {
                prop_assert!(w.wstart <= last);
                prop_assert!(w.pkt_count_down + w.pkt_count_up > 0);
                prop_assert!(w.ratio_down_up.is_finite());
                prop_assert!(w.burst_count_down <= w.pkt_count_down);
            }
        }
    }
}
