//! Planning diagnostics: timing and counts for each stage.
//!
//! [`process_with_diagnostics`](crate::process_with_diagnostics) fills a
//! [`PlanDiagnostics`] alongside the plan.  Time is read through the
//! [`Clock`] trait so the core never touches a platform timer itself;
//! callers supply one (the CLI wraps [`std::time::Instant`]).
//!
//! Durations are serialized as fractional seconds (`f64`) since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Source of monotonic timestamps.
pub trait Clock {
    type Instant;

    fn now(&self) -> Self::Instant;

    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration seconds must be finite and non-negative")
        })
    }
}

/// Diagnostics collected from one planning run.
///
/// Optional stages are `None` when the configuration skipped them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDiagnostics {
    pub regularize: Option<StageDiagnostics>,
    pub shatter: StageDiagnostics,
    pub faces: StageDiagnostics,
    pub network: StageDiagnostics,
    pub partition: Option<StageDiagnostics>,
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    pub summary: PlanSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub metrics: StageMetrics,
}

/// Stage-specific counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    Regularize {
        segments_in: usize,
        segments_out: usize,
        directions: usize,
        axes: usize,
        intersections: usize,
    },
    Shatter {
        segments_in: usize,
        segments_out: usize,
    },
    Faces {
        shells: usize,
        regions: usize,
        pruned: usize,
        orphans: usize,
    },
    Network {
        connections: usize,
        tree_segments: usize,
        tree_length: f64,
        unmatched: usize,
        rooted: bool,
    },
    Partition {
        requested: usize,
        solutions: usize,
        forests: usize,
        /// Largest minus smallest forest load of the best solution.
        load_spread: Option<f64>,
    },
}

/// Headline counts for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub input_segments: usize,
    pub regions: usize,
    pub tree_segments: usize,
    pub tree_length: f64,
    /// Forests in the best partition, or 0 when not partitioned.
    pub partitions: usize,
}

impl PlanDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Plan Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!("Input: {} segments", self.summary.input_segments));
        lines.push(format!("Total duration: {:.3}ms", duration_ms(self.total_duration)));
        lines.push(String::new());

        lines.push(format!("{:<16} {:>10} {:>10}  {}", "Stage", "Duration", "% Total", "Details"));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let mut stages: Vec<(&str, &StageDiagnostics)> = Vec::new();
        if let Some(ref r) = self.regularize {
            stages.push(("Regularize", r));
        }
        stages.push(("Shatter", &self.shatter));
        stages.push(("Faces", &self.faces));
        stages.push(("Network", &self.network));
        if let Some(ref p) = self.partition {
            stages.push(("Partition", p));
        }

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 { ms / total_ms * 100.0 } else { 0.0 };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Regions: {}  |  Tree: {} segments, {:.3} long  |  Partitions: {}",
            self.summary.regions,
            self.summary.tree_segments,
            self.summary.tree_length,
            self.summary.partitions,
        ));

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Regularize {
            segments_in,
            segments_out,
            directions,
            axes,
            intersections,
        } => format!(
            "{segments_in}->{segments_out} segs, {directions} dirs, {axes} axes, \
             {intersections} crossings"
        ),
        StageMetrics::Shatter {
            segments_in,
            segments_out,
        } => format!("{segments_in}->{segments_out} segs"),
        StageMetrics::Faces {
            shells,
            regions,
            pruned,
            orphans,
        } => format!("{shells} shells, {regions} regions, {pruned} pruned, {orphans} orphans"),
        StageMetrics::Network {
            connections,
            tree_segments,
            tree_length,
            unmatched,
            rooted,
        } => {
            let root = if *rooted { "rooted" } else { "unrooted" };
            format!(
                "{connections} connections, {tree_segments} segs ({tree_length:.3}), \
                 {unmatched} unmatched, {root}"
            )
        }
        StageMetrics::Partition {
            requested,
            solutions,
            forests,
            load_spread,
        } => match load_spread {
            Some(spread) => format!(
                "k={requested}: {solutions} solutions, {forests} forests, spread={spread:.3}"
            ),
            None => format!("k={requested}: infeasible"),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stage(ms: u64, metrics: StageMetrics) -> StageDiagnostics {
        StageDiagnostics {
            duration: Duration::from_millis(ms),
            metrics,
        }
    }

    fn sample() -> PlanDiagnostics {
        PlanDiagnostics {
            regularize: None,
            shatter: stage(
                1,
                StageMetrics::Shatter {
                    segments_in: 5,
                    segments_out: 7,
                },
            ),
            faces: stage(
                2,
                StageMetrics::Faces {
                    shells: 1,
                    regions: 2,
                    pruned: 0,
                    orphans: 0,
                },
            ),
            network: stage(
                3,
                StageMetrics::Network {
                    connections: 2,
                    tree_segments: 4,
                    tree_length: 12.5,
                    unmatched: 0,
                    rooted: true,
                },
            ),
            partition: Some(stage(
                4,
                StageMetrics::Partition {
                    requested: 2,
                    solutions: 0,
                    forests: 0,
                    load_spread: None,
                },
            )),
            total_duration: Duration::from_millis(10),
            summary: PlanSummary {
                input_segments: 5,
                regions: 2,
                tree_segments: 4,
                tree_length: 12.5,
                partitions: 0,
            },
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        assert!((duration_ms(Duration::from_micros(1500)) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn report_lists_executed_stages_only() {
        let report = sample().report();
        assert!(report.contains("Shatter"));
        assert!(report.contains("Partition"));
        assert!(report.contains("infeasible"));
        assert!(!report.contains("Regularize"));
        assert!(report.contains("40.0%"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!((json["total_duration"].as_f64().unwrap() - 0.01).abs() < 1e-12);
        let back: PlanDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn negative_durations_are_rejected() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<PlanDiagnostics>(json).is_err());
    }
}
