//! Contains small numeric helpers shared by the analysers.
use super::containers::PacketRecord;

/// Mean and population standard deviation of a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std_dev: f64,
}

impl Moments {
    /// Zero for an empty slice.
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Stable sort on timestamp; equal timestamps keep file order.
pub fn sort_by_timestamp(rows: &mut [PacketRecord]) {
    rows.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_std() {
        let stats = Moments::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(Moments::compute(&[]), Moments::default());
    }

    #[test]
    fn test_sort_is_stable() {
        let row = |ts: f64, src: &str| PacketRecord {
            timestamp: ts,
            length: 60,
            source_addr: src.to_string(),
            dest_addr: String::from("10.0.0.1"),
        };
        let mut rows = vec![row(2.0, "a"), row(1.0, "b"), row(2.0, "c"), row(1.0, "d")];
        sort_by_timestamp(&mut rows);
        let order: Vec<&str> = rows.iter().map(|r| r.source_addr.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }
}
