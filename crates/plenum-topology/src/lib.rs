//! plenum-topology: floorplan centerlines to distribution topology (sans-IO).
//!
//! Turns a set of wall or corridor centerlines into:
//! regularized axes -> shattered network -> planar regions ->
//! rooted Steiner tree over the terminals -> optional balanced partition.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! segment lists and returns structured data.  Reading inputs, writing
//! JSON or SVG and timing live in `plenum-cli` and `plenum-export`.

pub mod diagnostics;
pub mod faces;
pub mod geometry;
pub mod graph;
pub mod network;
pub mod partition;
pub mod regularize;
pub mod steiner;
pub mod types;
pub mod weld;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn};

pub use diagnostics::{Clock, PlanDiagnostics, PlanSummary, StageDiagnostics, StageMetrics};
pub use faces::{FaceSet, Hole, Region, extract_faces};
pub use graph::{Edge, Graph, Path, Vertex, VertexId};
pub use network::{Combination, ZoneNetwork, best_terminal_combination, zone_network};
pub use partition::{
    Forest, GoodLpSolver, MilpSolver, PartitionOutcome, PartitionRequest, PartitionSolution,
    SourceSelection, partition,
};
pub use regularize::{Regularized, regularize};
pub use steiner::{ProxyEdge, SteinerTree, steiner_tree};
pub use types::{
    PartitionConfig, PlanConfig, PlanError, Point, Segment, ToleranceConfig, TreeAlgorithm,
};

/// Everything a planning run consumes besides its configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanInput {
    /// Centerline segments of the floorplan.
    pub segments: Vec<Segment>,
    /// Fixed terminals, each served by the tree.
    pub terminals: Vec<Point>,
    /// Alternative terminal positions.  One is picked per group, scored
    /// together with `terminals` by shortest-path cost.
    pub terminal_groups: Vec<Vec<Point>>,
    /// Supply points; the first one that lands on the tree becomes its root.
    pub sources: Vec<Point>,
    /// Demand per entry of `terminals`.  Empty means 1 each.
    pub weights: Vec<f64>,
}

/// Result of [`process`].
#[derive(Debug, Clone, Serialize)]
pub struct NetworkPlan {
    /// Segments after regularization and shattering.
    pub segments: Vec<Segment>,
    pub faces: FaceSet,
    /// The group pick, when `terminal_groups` was non-empty.  Its choice
    /// vector starts with a zero per fixed terminal.
    pub combination: Option<Combination>,
    pub zone: ZoneNetwork,
    pub partition: Option<PartitionOutcome>,
}

/// Run the full planning pipeline.
///
/// # Pipeline steps
///
/// 1. Validate the configuration and input weights
/// 2. Optional line regularization
/// 3. Shatter at every crossing
/// 4. Planar face extraction
/// 5. Terminal group selection, then the rooted zone network
/// 6. Optional balanced partition of the tree
///
/// # Errors
///
/// Returns [`PlanError::InvalidConfig`] for an out-of-range configuration
/// and [`PlanError::InvalidArgument`] when `weights` does not match
/// `terminals`.  Degenerate geometry yields empty stages, not errors.
pub fn process(input: &PlanInput, config: &PlanConfig) -> Result<NetworkPlan, PlanError> {
    run(input, config, &NoClock).map(|(plan, _)| plan)
}

/// [`process`], also timing each stage through `clock`.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_with_diagnostics<C: Clock>(
    input: &PlanInput,
    config: &PlanConfig,
    clock: &C,
) -> Result<(NetworkPlan, PlanDiagnostics), PlanError> {
    run(input, config, clock)
}

/// Clock for untimed runs.
struct NoClock;

impl Clock for NoClock {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

fn invalid(message: impl Into<String>) -> PlanError {
    PlanError::InvalidArgument(message.into())
}

#[allow(clippy::too_many_lines)]
fn run<C: Clock>(
    input: &PlanInput,
    config: &PlanConfig,
    clock: &C,
) -> Result<(NetworkPlan, PlanDiagnostics), PlanError> {
    config.validate()?;
    if !input.weights.is_empty() && input.weights.len() != input.terminals.len() {
        return Err(invalid(format!(
            "{} weights given for {} terminals",
            input.weights.len(),
            input.terminals.len()
        )));
    }
    if input.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(invalid("terminal weights must be finite and non-negative"));
    }
    let tol = &config.tolerances;
    let total_start = clock.now();

    // 1. Regularize.
    let (segments, regularize_diag) = if config.regularize {
        let _span = debug_span!("regularize").entered();
        let start = clock.now();
        let out = regularize::regularize(&input.segments, tol);
        let diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Regularize {
                segments_in: input.segments.len(),
                segments_out: out.segments.len(),
                directions: out.directions.len(),
                axes: out.axes.len(),
                intersections: out.intersections.len(),
            },
        };
        (out.segments, Some(diag))
    } else {
        (input.segments.clone(), None)
    };

    // 2. Shatter.
    let (segments, shatter_diag) = {
        let _span = debug_span!("shatter").entered();
        let start = clock.now();
        let out = geometry::shatter(&segments, tol.merge);
        let diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Shatter {
                segments_in: segments.len(),
                segments_out: out.len(),
            },
        };
        (out, diag)
    };

    // 3. Faces.
    let (faces, faces_diag) = {
        let _span = debug_span!("faces").entered();
        let start = clock.now();
        let out = faces::extract_faces(&segments, tol);
        let diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Faces {
                shells: out.shells.len(),
                regions: out.regions.len(),
                pruned: out.pruned.len(),
                orphans: out.orphans.len(),
            },
        };
        (out, diag)
    };

    // 4. Zone network.
    let (combination, zone, network_diag) = {
        let _span = debug_span!("network").entered();
        let start = clock.now();
        let combination = if input.terminal_groups.iter().any(|g| !g.is_empty()) {
            let groups: Vec<Vec<Point>> = input
                .terminals
                .iter()
                .map(|&t| vec![t])
                .chain(input.terminal_groups.iter().cloned())
                .collect();
            network::best_terminal_combination(&segments, &groups, tol)
        } else {
            None
        };
        let terminals = combination
            .as_ref()
            .map_or_else(|| input.terminals.clone(), |c| c.terminals.clone());
        let mut zone = network::zone_network(
            &segments,
            &terminals,
            &input.sources,
            config.tree_algorithm,
            tol,
        )?;
        if !input.weights.is_empty() {
            apply_weights(&mut zone, &input.terminals, &input.weights, tol);
        }
        let diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Network {
                connections: zone.connection.connections.len(),
                tree_segments: zone.tree.segments.len(),
                tree_length: zone.tree.total_length,
                unmatched: zone.tree.unmatched.len(),
                rooted: zone.root.is_some(),
            },
        };
        (combination, zone, diag)
    };

    // 5. Partition.
    let (outcome, partition_diag) = match &config.partition {
        Some(partition_config) => {
            let _span = debug_span!("partition").entered();
            let start = clock.now();
            let outcome = partition_zone(&zone, &input.sources, partition_config, tol)?;
            let best = outcome.best();
            let diag = StageDiagnostics {
                duration: clock.elapsed(&start),
                metrics: StageMetrics::Partition {
                    requested: partition_config.count,
                    solutions: outcome.solutions.len(),
                    forests: best.map_or(0, |s| s.forests.len()),
                    load_spread: best.map(load_spread),
                },
            };
            (Some(outcome), Some(diag))
        }
        None => (None, None),
    };

    let summary = PlanSummary {
        input_segments: input.segments.len(),
        regions: faces.regions.len(),
        tree_segments: zone.tree.segments.len(),
        tree_length: zone.tree.total_length,
        partitions: outcome
            .as_ref()
            .and_then(PartitionOutcome::best)
            .map_or(0, |s| s.forests.len()),
    };
    let diagnostics = PlanDiagnostics {
        regularize: regularize_diag,
        shatter: shatter_diag,
        faces: faces_diag,
        network: network_diag,
        partition: partition_diag,
        total_duration: clock.elapsed(&total_start),
        summary,
    };
    debug!(
        regions = diagnostics.summary.regions,
        tree_segments = diagnostics.summary.tree_segments,
        partitions = diagnostics.summary.partitions,
        "plan complete"
    );

    Ok((
        NetworkPlan {
            segments,
            faces,
            combination,
            zone,
            partition: outcome,
        },
        diagnostics,
    ))
}

/// Replace the unit weights of the fixed terminals with their demands.
///
/// Terminals picked from groups keep weight 1.  Fixed terminals landing
/// on the same vertex add up.
fn apply_weights(
    zone: &mut ZoneNetwork,
    terminals: &[Point],
    weights: &[f64],
    tol: &ToleranceConfig,
) {
    let matched: Vec<(VertexId, f64)> = terminals
        .iter()
        .zip(weights)
        .filter_map(|(&t, &w)| {
            network::nearest_vertex(&zone.graph, t, tol.root_match).map(|id| (id, w))
        })
        .collect();
    for &(id, _) in &matched {
        if let Some(v) = zone.graph.vertex_mut(id) {
            v.weight = 0.0;
        }
    }
    for (id, w) in matched {
        if let Some(v) = zone.graph.vertex_mut(id) {
            v.weight += w;
        }
    }
}

/// Partition the zone tree into balanced forests.
///
/// The tree is rebuilt undirected with the same vertex ids as
/// `zone.graph`, so forests refer to zone vertices.
fn partition_zone(
    zone: &ZoneNetwork,
    sources: &[Point],
    config: &PartitionConfig,
    tol: &ToleranceConfig,
) -> Result<PartitionOutcome, PlanError> {
    let mut graph = network::rebuild_graph(&zone.tree.segments, tol);
    for (id, v) in zone.graph.vertices() {
        if let Some(target) = graph.vertex_mut(id) {
            target.weight = v.weight;
        }
    }
    if graph.vertex_count() < config.count {
        warn!(
            vertices = graph.vertex_count(),
            count = config.count,
            "partition: tree has fewer vertices than partitions, skipping"
        );
        return Ok(PartitionOutcome::default());
    }

    let mut request = PartitionRequest::from_config(config);
    if config.at_sources {
        let mut entries: Vec<VertexId> = Vec::new();
        for &s in sources {
            if let Some(id) = network::nearest_vertex(&graph, s, tol.root_match)
                && !entries.contains(&id)
            {
                entries.push(id);
            }
        }
        if entries.is_empty() {
            warn!("partition: no source matches a tree vertex, entering anywhere");
        } else {
            request.sources = SourceSelection::Candidates {
                count: config.count,
                vertices: entries,
            };
        }
    }
    partition::partition(&graph, &request, &GoodLpSolver::default())
}

fn load_spread(solution: &PartitionSolution) -> f64 {
    let loads = solution.forests.iter().map(|f| f.load);
    let high = loads.clone().fold(f64::NEG_INFINITY, f64::max);
    let low = loads.fold(f64::INFINITY, f64::min);
    if high >= low { high - low } else { 0.0 }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn seg(x0: f64, y0: f64, x1: f64, y1: f64) -> Segment {
        Segment::new(p(x0, y0), p(x1, y1))
    }

    /// Two 10x10 rooms sharing a wall.
    fn two_rooms() -> Vec<Segment> {
        vec![
            seg(0.0, 0.0, 20.0, 0.0),
            seg(20.0, 0.0, 20.0, 10.0),
            seg(20.0, 10.0, 0.0, 10.0),
            seg(0.0, 10.0, 0.0, 0.0),
            seg(10.0, 0.0, 10.0, 10.0),
        ]
    }

    fn unregularized() -> PlanConfig {
        PlanConfig {
            regularize: false,
            ..PlanConfig::default()
        }
    }

    #[test]
    fn empty_input_yields_an_empty_plan() {
        let plan = process(&PlanInput::default(), &PlanConfig::default()).unwrap();
        assert!(plan.segments.is_empty());
        assert!(plan.faces.regions.is_empty());
        assert!(plan.zone.root.is_none());
        assert!(plan.partition.is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PlanConfig {
            tolerances: ToleranceConfig {
                merge: f64::NAN,
                ..ToleranceConfig::default()
            },
            ..PlanConfig::default()
        };
        assert!(matches!(
            process(&PlanInput::default(), &config),
            Err(PlanError::InvalidConfig(_))
        ));
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let input = PlanInput {
            terminals: vec![p(1.0, 1.0)],
            weights: vec![1.0, 2.0],
            ..PlanInput::default()
        };
        assert!(matches!(
            process(&input, &PlanConfig::default()),
            Err(PlanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn weights_replace_unit_demand() {
        let input = PlanInput {
            segments: two_rooms(),
            terminals: vec![p(5.0, 0.0), p(15.0, 0.0)],
            weights: vec![2.0, 3.5],
            ..PlanInput::default()
        };
        let plan = process(&input, &unregularized()).unwrap();
        assert!((plan.zone.graph.total_weight() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn groups_are_scored_with_the_fixed_terminals() {
        let input = PlanInput {
            segments: two_rooms(),
            terminals: vec![p(0.0, 0.0)],
            terminal_groups: vec![
                vec![p(20.0, 10.0), p(0.0, 10.0)],
                vec![p(20.0, 0.0), p(4.0, 0.0)],
            ],
            ..PlanInput::default()
        };
        let plan = process(&input, &unregularized()).unwrap();
        let combination = plan.combination.unwrap();
        assert_eq!(combination.choice, vec![0, 1, 1]);
        assert!((combination.subgraph.total_length - 14.0).abs() < 1e-9);
        assert_eq!(plan.zone.terminals.len(), 3);
    }

    #[test]
    fn group_picks_keep_unit_demand_next_to_weighted_terminals() {
        let input = PlanInput {
            segments: two_rooms(),
            terminals: vec![p(5.0, 0.0)],
            terminal_groups: vec![vec![p(15.0, 10.0), p(15.0, 0.0)]],
            weights: vec![2.0],
            ..PlanInput::default()
        };
        let plan = process(&input, &unregularized()).unwrap();
        let zone = &plan.zone;
        assert_eq!(zone.terminals.len(), 2);
        let weights: Vec<f64> = zone
            .terminals
            .iter()
            .map(|&t| zone.graph.vertex(t).unwrap().weight)
            .collect();
        assert!(weights.iter().any(|w| (w - 2.0).abs() < 1e-9), "{weights:?}");
        assert!(weights.iter().any(|w| (w - 1.0).abs() < 1e-9), "{weights:?}");
        assert!((zone.graph.total_weight() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn diagnostics_cover_every_stage_that_ran() {
        let input = PlanInput {
            segments: two_rooms(),
            terminals: vec![p(5.0, 0.0), p(15.0, 10.0)],
            ..PlanInput::default()
        };
        let (plan, diag) = process_with_diagnostics(&input, &unregularized(), &NoClock).unwrap();
        assert!(diag.regularize.is_none());
        assert!(diag.partition.is_none());
        assert_eq!(diag.summary.regions, 2);
        assert_eq!(diag.summary.regions, plan.faces.regions.len());
        assert!(matches!(diag.faces.metrics, StageMetrics::Faces { shells: 1, regions: 2, .. }));
    }

    #[test]
    fn partitioning_a_tiny_tree_is_skipped() {
        let input = PlanInput {
            segments: vec![seg(0.0, 0.0, 1.0, 0.0)],
            ..PlanInput::default()
        };
        let config = PlanConfig {
            partition: Some(PartitionConfig {
                count: 5,
                ..PartitionConfig::default()
            }),
            ..PlanConfig::default()
        };
        let plan = process(&input, &config).unwrap();
        assert!(!plan.partition.unwrap().is_feasible());
    }
}
