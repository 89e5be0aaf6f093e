use serde::Serialize;

use super::contours::CrackMetrics;
use crate::source::ConnectionState;

/// Latest crack-detection statistics.
///
/// Whenever `crack_detected` is false the three numeric metrics are zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    /// Classifier score scaled to 0-100.
    pub confidence: f32,
    pub crack_detected: bool,
    pub crack_count: usize,
    pub largest_crack: f64,
    pub avg_width: f64,
}

impl DetectionStats {
    pub(crate) fn detected(score: f32, metrics: CrackMetrics) -> Self {
        Self {
            confidence: score * 100.0,
            crack_detected: true,
            crack_count: metrics.count,
            largest_crack: metrics.largest,
            avg_width: metrics.avg_width,
        }
    }

    pub(crate) fn clear(score: f32) -> Self {
        Self {
            confidence: score * 100.0,
            ..Self::default()
        }
    }

    /// Rounded, connection-aware snapshot for a stats endpoint.
    pub fn report(&self, state: ConnectionState) -> StatsReport {
        StatsReport {
            connection_status: state,
            confidence: round_to(self.confidence as f64, 1),
            crack_detected: self.crack_detected,
            crack_count: self.crack_count,
            largest_crack: round_to(self.largest_crack, 2),
            avg_width: round_to(self.avg_width, 2),
        }
    }
}

/// Stats payload as served to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsReport {
    pub connection_status: ConnectionState,
    pub confidence: f64,
    pub crack_detected: bool,
    pub crack_count: usize,
    pub largest_crack: f64,
    pub avg_width: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_stats_zero_every_metric() {
        let stats = DetectionStats::clear(0.2);
        assert!(!stats.crack_detected);
        assert_eq!(stats.crack_count, 0);
        assert_eq!(stats.largest_crack, 0.0);
        assert_eq!(stats.avg_width, 0.0);
        assert!((stats.confidence - 20.0).abs() < 1e-4);
    }

    #[test]
    fn report_rounds_and_names_fields() {
        let stats = DetectionStats {
            confidence: 87.6543,
            crack_detected: true,
            crack_count: 4,
            largest_crack: 3.14159,
            avg_width: 0.2468,
        };
        let report = stats.report(ConnectionState::Connected);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["connection_status"], "connected");
        assert_eq!(json["confidence"], 87.7);
        assert_eq!(json["crack_detected"], true);
        assert_eq!(json["crack_count"], 4);
        assert_eq!(json["largest_crack"], 3.14);
        assert_eq!(json["avg_width"], 0.25);
    }
}
