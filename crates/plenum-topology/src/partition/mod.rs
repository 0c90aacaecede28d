//! Balanced connected partitioning as a lexicographic MILP.
//!
//! The graph becomes a flow network: every undirected edge is a pair of
//! arcs and each of the *k* partitions gets a synthetic super-source with
//! virtual arcs into the graph.  Every vertex consumes its weight, receives
//! over at most one arc, and each super-source feeds at most one entry
//! vertex, so the arcs carrying flow form one tree per super-source.
//!
//! Objective tiers, highest priority first:
//!
//! 1. total length-weighted flow over real arcs;
//! 2. spread between the largest and smallest source load;
//! 3. total absolute deviation of each arc's flow from the mean outflow of
//!    its tail vertex.
//!
//! Solving is delegated to a [`MilpSolver`].  Positive-flow arcs of each
//! incumbent are merged into forests by shared endpoints.

pub mod model;
pub mod solver;

use std::collections::{HashMap, HashSet};

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::model::{
    LinearConstraint, LinearExpr, MilpModel, MilpSolution, MilpSolver, Relation, SolveLimits,
    SolverError, VarId, VarKind,
};
pub use self::solver::GoodLpSolver;
use crate::graph::{Graph, VertexId};
use crate::types::{PartitionConfig, PlanError};

/// Where the partitions may be fed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSelection {
    /// `k` partitions entering anywhere.
    Count(usize),
    /// `count` partitions entering only at the listed vertices.
    Candidates { count: usize, vertices: Vec<VertexId> },
    /// One partition per listed vertex, entering there.
    Explicit(Vec<VertexId>),
}

/// Parameters of one [`partition`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRequest {
    pub sources: SourceSelection,
    /// Decimal digits kept when rounding flows.
    pub flow_digits: u32,
    pub limits: SolveLimits,
}

impl PartitionRequest {
    #[must_use]
    pub fn count(k: usize) -> Self {
        Self {
            sources: SourceSelection::Count(k),
            flow_digits: PartitionConfig::DEFAULT_FLOW_DIGITS,
            limits: SolveLimits::default(),
        }
    }

    #[must_use]
    pub fn explicit(sources: Vec<VertexId>) -> Self {
        Self {
            sources: SourceSelection::Explicit(sources),
            ..Self::count(0)
        }
    }

    /// A count request using the limits of `config`.
    #[must_use]
    pub fn from_config(config: &PartitionConfig) -> Self {
        Self {
            sources: SourceSelection::Count(config.count),
            flow_digits: config.flow_digits,
            limits: SolveLimits {
                time_limit: std::time::Duration::try_from_secs_f64(config.time_limit_secs)
                    .unwrap_or(std::time::Duration::MAX),
            },
        }
    }
}

/// A real edge of a forest, oriented along the flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub from: VertexId,
    pub to: VertexId,
    pub flow: f64,
    pub length: f64,
}

/// The sub-tree fed by one super-source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    /// Super-source index.
    pub source: usize,
    /// Entry vertex fed by the super-source.
    pub root_vertex: VertexId,
    /// Total weight served, i.e. the flow into `root_vertex`.
    pub load: f64,
    /// Edges by descending flow.
    pub edges: Vec<FlowEdge>,
}

impl Forest {
    /// Every vertex of the forest, entry vertex first.
    #[must_use]
    pub fn vertices(&self) -> Vec<VertexId> {
        let mut out = vec![self.root_vertex];
        for e in &self.edges {
            for v in [e.from, e.to] {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSolution {
    /// One forest per super-source that carries flow, by source index.
    pub forests: Vec<Forest>,
    /// Objective value per tier.
    pub objectives: Vec<f64>,
}

/// All partitions recovered from the solver, most refined first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionOutcome {
    pub solutions: Vec<PartitionSolution>,
}

impl PartitionOutcome {
    /// `false` when no feasible partition was found.
    #[must_use]
    pub const fn is_feasible(&self) -> bool {
        !self.solutions.is_empty()
    }

    #[must_use]
    pub fn best(&self) -> Option<&PartitionSolution> {
        self.solutions.first()
    }
}

// ---------------------------------------------------------------------------
// Flow network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Super(usize),
    Vertex(usize),
}

#[derive(Debug, Clone)]
struct Arc {
    tail: Tail,
    head: usize,
    length: f64,
    usage: VarId,
    flow: VarId,
}

struct FlowNetwork {
    ids: Vec<VertexId>,
    arcs: Vec<Arc>,
    sources: usize,
    model: MilpModel,
}

fn invalid(message: impl Into<String>) -> PlanError {
    PlanError::InvalidArgument(message.into())
}

impl FlowNetwork {
    fn build<T>(graph: &Graph<T>, request: &PartitionRequest) -> Result<Self, PlanError> {
        if graph.is_directed() {
            return Err(invalid("cannot partition a directed graph"));
        }
        let ids: Vec<VertexId> = graph.vertices().map(|(id, _)| id).collect();
        let index: HashMap<VertexId, usize> =
            ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let weights: Vec<f64> = graph.vertices().map(|(_, v)| v.weight).collect();
        if let Some(bad) = weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid(format!(
                "vertex {} weight must be finite and non-negative",
                ids[bad].0
            )));
        }
        let edges = graph.edges();
        if edges.iter().any(|e| !e.weight.is_finite() || e.weight < 0.0) {
            return Err(invalid("edge lengths must be finite and non-negative"));
        }

        let n = ids.len();
        let lookup = |list: &[VertexId]| -> Result<Vec<usize>, PlanError> {
            let mut seen = HashSet::new();
            list.iter()
                .map(|id| {
                    let &i = index
                        .get(id)
                        .ok_or_else(|| invalid(format!("unknown source vertex {}", id.0)))?;
                    if seen.insert(i) {
                        Ok(i)
                    } else {
                        Err(invalid(format!("duplicate source vertex {}", id.0)))
                    }
                })
                .collect()
        };
        let (entries, explicit): (Vec<Vec<usize>>, bool) = match &request.sources {
            SourceSelection::Count(k) => (vec![(0..n).collect(); *k], false),
            SourceSelection::Candidates { count, vertices } => {
                (vec![lookup(vertices)?; *count], false)
            }
            SourceSelection::Explicit(list) => {
                (lookup(list)?.into_iter().map(|i| vec![i]).collect(), true)
            }
        };
        let k = entries.len();
        if k == 0 {
            return Err(invalid("at least one partition is required"));
        }
        if k > n {
            return Err(invalid(format!("{k} partitions requested for {n} vertices")));
        }
        if entries.iter().any(Vec::is_empty) {
            return Err(invalid("no candidate entry vertices"));
        }

        let total: f64 = weights.iter().sum();
        let big_m = if total > 0.0 { total } else { 1.0 };

        let mut model = MilpModel::new();
        let mut arcs = Vec::new();
        let mut add_arc = |model: &mut MilpModel, tail, head, length| {
            arcs.push(Arc {
                tail,
                head,
                length,
                usage: model.add_var(VarKind::Binary),
                flow: model.add_var(VarKind::NON_NEGATIVE),
            });
        };
        for e in &edges {
            let (a, b) = (index[&e.from], index[&e.to]);
            add_arc(&mut model, Tail::Vertex(a), b, e.weight);
            add_arc(&mut model, Tail::Vertex(b), a, e.weight);
        }
        for (s, heads) in entries.iter().enumerate() {
            for &h in heads {
                add_arc(&mut model, Tail::Super(s), h, 0.0);
            }
        }

        let mut balance = vec![LinearExpr::new(); n];
        let mut inbound = vec![LinearExpr::new(); n];
        let mut outbound = vec![LinearExpr::new(); k];
        let mut loads = vec![LinearExpr::new(); k];
        let mut out_flows: Vec<Vec<(VarId, VarId)>> = vec![Vec::new(); n];
        for arc in &arcs {
            balance[arc.head].add(arc.flow, 1.0);
            inbound[arc.head].add(arc.usage, 1.0);
            match arc.tail {
                Tail::Vertex(t) => {
                    balance[t].add(arc.flow, -1.0);
                    out_flows[t].push((arc.flow, arc.usage));
                }
                Tail::Super(s) => {
                    outbound[s].add(arc.usage, 1.0);
                    loads[s].add(arc.flow, 1.0);
                }
            }
            model.constrain(
                LinearExpr::new().term(arc.flow, 1.0).term(arc.usage, -big_m),
                Relation::Le,
                0.0,
            );
        }
        for (v, expr) in balance.into_iter().enumerate() {
            model.constrain(expr, Relation::Eq, weights[v]);
        }
        for expr in inbound {
            model.constrain(expr, Relation::Le, 1.0);
        }
        for expr in outbound {
            model.constrain(expr, if explicit { Relation::Eq } else { Relation::Le }, 1.0);
        }

        let spread = if explicit {
            let high = model.add_var(VarKind::NON_NEGATIVE);
            let low = model.add_var(VarKind::NON_NEGATIVE);
            for load in &loads {
                let mut above = load.clone();
                above.add(high, -1.0);
                model.constrain(above.clone(), Relation::Le, 0.0);
                let mut below = load.clone();
                below.add(low, -1.0);
                model.constrain(below, Relation::Ge, 0.0);
            }
            LinearExpr::new().term(high, 1.0).term(low, -1.0)
        } else {
            for pair in loads.windows(2) {
                let mut ordered = pair[0].clone();
                ordered.terms.extend(pair[1].terms.iter().map(|&(v, c)| (v, -c)));
                model.constrain(ordered, Relation::Ge, 0.0);
            }
            let mut spread = loads[0].clone();
            spread.terms.extend(loads[k - 1].terms.iter().map(|&(v, c)| (v, -c)));
            spread
        };

        let mut deviation = LinearExpr::new();
        for out in out_flows.iter().filter(|out| !out.is_empty()) {
            let mean = model.add_var(VarKind::NON_NEGATIVE);
            #[allow(clippy::cast_precision_loss)]
            let degree = out.len() as f64;
            let mut averaged: LinearExpr = out.iter().map(|&(f, _)| (f, -1.0)).collect();
            averaged.add(mean, degree);
            model.constrain(averaged, Relation::Eq, 0.0);
            for &(f, _) in out {
                let d = model.add_var(VarKind::NON_NEGATIVE);
                deviation.add(d, 1.0);
                model.constrain(
                    LinearExpr::new().term(f, 1.0).term(mean, -1.0).term(d, -1.0),
                    Relation::Le,
                    0.0,
                );
                model.constrain(
                    LinearExpr::new().term(mean, 1.0).term(f, -1.0).term(d, -1.0),
                    Relation::Le,
                    0.0,
                );
            }
        }

        let weighted_flow: LinearExpr = arcs
            .iter()
            .filter(|a| matches!(a.tail, Tail::Vertex(_)))
            .map(|a| (a.flow, a.length))
            .collect();
        model.add_objective(weighted_flow);
        model.add_objective(spread);
        model.add_objective(deviation);

        Ok(Self {
            ids,
            arcs,
            sources: k,
            model,
        })
    }

    /// Recover forests from an incumbent, or `None` if its positive-flow
    /// arcs do not form one tree per super-source.
    fn extract(&self, solution: &MilpSolution, digits: u32) -> Option<PartitionSolution> {
        let n = self.ids.len();
        let scale = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX).min(15));
        let node = |tail: Tail| match tail {
            Tail::Vertex(v) => v,
            Tail::Super(s) => n + s,
        };

        let flows: Vec<(usize, f64)> = self
            .arcs
            .iter()
            .enumerate()
            .map(|(i, a)| (i, (solution.value(a.flow) * scale).round() / scale))
            .filter(|&(_, f)| f > 0.0)
            .collect();

        let mut components = UnionFind::<usize>::new(n + self.sources);
        for &(i, _) in &flows {
            components.union(node(self.arcs[i].tail), self.arcs[i].head);
        }

        let mut groups: HashMap<usize, Vec<(usize, f64)>> = HashMap::new();
        for &(i, f) in &flows {
            groups.entry(components.find(self.arcs[i].head)).or_default().push((i, f));
        }

        let mut forests = Vec::new();
        for arcs in groups.values() {
            let mut nodes = HashSet::new();
            let mut entry = None;
            for &(i, f) in arcs {
                let arc = &self.arcs[i];
                nodes.insert(node(arc.tail));
                nodes.insert(arc.head);
                if let Tail::Super(s) = arc.tail {
                    if entry.is_some() {
                        warn!("partition: forest fed by more than one source");
                        return None;
                    }
                    entry = Some((s, arc.head, f));
                }
            }
            let Some((source, head, load)) = entry else {
                warn!("partition: forest without a source");
                return None;
            };
            if nodes.len() != arcs.len() + 1 {
                warn!(source, "partition: forest is not a tree");
                return None;
            }
            let mut edges: Vec<FlowEdge> = arcs
                .iter()
                .filter_map(|&(i, flow)| {
                    let arc = &self.arcs[i];
                    let Tail::Vertex(t) = arc.tail else {
                        return None;
                    };
                    Some(FlowEdge {
                        from: self.ids[t],
                        to: self.ids[arc.head],
                        flow,
                        length: arc.length,
                    })
                })
                .collect();
            edges.sort_by(|a, b| {
                b.flow
                    .total_cmp(&a.flow)
                    .then((a.from, a.to).cmp(&(b.from, b.to)))
            });
            forests.push(Forest {
                source,
                root_vertex: self.ids[head],
                load,
                edges,
            });
        }
        forests.sort_by_key(|f| f.source);
        Some(PartitionSolution {
            forests,
            objectives: solution.objectives.clone(),
        })
    }
}

/// Split `graph` into balanced connected forests.
///
/// Vertex demand comes from [`Vertex::weight`](crate::graph::Vertex) and
/// arc cost from edge weights.  Solver failures are logged and yield an
/// outcome with no solutions.
///
/// # Errors
///
/// [`PlanError::InvalidArgument`] for a directed graph, a partition count
/// of zero or above the vertex count, unknown or duplicate sources, and
/// non-finite weights.
pub fn partition<T>(
    graph: &Graph<T>,
    request: &PartitionRequest,
    solver: &dyn MilpSolver,
) -> Result<PartitionOutcome, PlanError> {
    let network = FlowNetwork::build(graph, request)?;
    debug!(
        arcs = network.arcs.len(),
        vars = network.model.vars.len(),
        constraints = network.model.constraints.len(),
        sources = network.sources,
        "partition: model built"
    );

    let incumbents = match solver.solve(&network.model, &request.limits) {
        Ok(incumbents) => incumbents,
        Err(err) => {
            warn!(%err, "partition: solver failed");
            return Ok(PartitionOutcome::default());
        }
    };

    let mut solutions: Vec<PartitionSolution> = Vec::new();
    for incumbent in &incumbents {
        if let Some(solution) = network.extract(incumbent, request.flow_digits)
            && !solutions.iter().any(|s| s.forests == solution.forests)
        {
            solutions.push(solution);
        }
    }
    if solutions.is_empty() {
        debug!(incumbents = incumbents.len(), "partition: no feasible partition");
    }
    Ok(PartitionOutcome { solutions })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::types::Point;

    struct Failing;

    impl MilpSolver for Failing {
        fn solve(&self, _: &MilpModel, _: &SolveLimits) -> Result<Vec<MilpSolution>, SolverError> {
            Err(SolverError::Backend("license expired".to_owned()))
        }
    }

    /// Records the model and replays canned incumbents.
    #[derive(Default)]
    struct Scripted {
        seen: RefCell<Option<MilpModel>>,
        replies: Vec<MilpSolution>,
    }

    impl MilpSolver for Scripted {
        fn solve(
            &self,
            model: &MilpModel,
            _: &SolveLimits,
        ) -> Result<Vec<MilpSolution>, SolverError> {
            *self.seen.borrow_mut() = Some(model.clone());
            Ok(self.replies.clone())
        }
    }

    fn weighted(points: &[(f64, f64, f64)], edges: &[(usize, usize)]) -> Graph<usize> {
        let mut g = Graph::new();
        for (i, &(x, y, w)) in points.iter().enumerate() {
            let id = g.add_vertex(i, Point::new(x, y)).unwrap();
            g.vertex_mut(id).unwrap().weight = w;
        }
        for &(a, b) in edges {
            let length = (points[a].0 - points[b].0).hypot(points[a].1 - points[b].1);
            g.add_edge(VertexId(a), VertexId(b), length).unwrap();
        }
        g
    }

    /// Centre 0 (weight 0) joining hubs 1 and 2, each with three unit leaves.
    fn star_of_stars() -> Graph<usize> {
        weighted(
            &[
                (0.0, 0.0, 0.0),
                (-2.0, 0.0, 1.0),
                (2.0, 0.0, 1.0),
                (-3.0, 0.0, 1.0),
                (-2.0, 1.0, 1.0),
                (-2.0, -1.0, 1.0),
                (3.0, 0.0, 1.0),
                (2.0, 1.0, 1.0),
                (2.0, -1.0, 1.0),
            ],
            &[(0, 1), (0, 2), (1, 3), (1, 4), (1, 5), (2, 6), (2, 7), (2, 8)],
        )
    }

    fn path(n: usize) -> Graph<usize> {
        #[allow(clippy::cast_precision_loss)]
        let points: Vec<(f64, f64, f64)> = (0..n).map(|i| (i as f64, 0.0, 1.0)).collect();
        let edges: Vec<(usize, usize)> = (1..n).map(|i| (i - 1, i)).collect();
        weighted(&points, &edges)
    }

    fn assert_tree(forest: &Forest) {
        assert_eq!(forest.vertices().len(), forest.edges.len() + 1);
    }

    #[test]
    fn solver_failure_is_an_infeasible_outcome() {
        let outcome = partition(&path(3), &PartitionRequest::count(2), &Failing).unwrap();
        assert!(!outcome.is_feasible());
        assert!(outcome.best().is_none());
    }

    #[test]
    fn empty_incumbent_set_is_infeasible() {
        let solver = Scripted::default();
        let outcome = partition(&path(3), &PartitionRequest::count(2), &solver).unwrap();
        assert!(!outcome.is_feasible());
        let model = solver.seen.borrow().clone().unwrap();
        assert_eq!(model.objectives.len(), 3);
        // 2 edges and 2 x 3 virtual arcs, each with usage and flow.
        let binaries = model.vars.iter().filter(|v| **v == VarKind::Binary).count();
        assert_eq!(binaries, 4 + 6);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let g = path(3);
        let solver = Scripted::default();
        let cases = [
            PartitionRequest::count(0),
            PartitionRequest::count(4),
            PartitionRequest::explicit(vec![VertexId(0), VertexId(9)]),
            PartitionRequest::explicit(vec![VertexId(1), VertexId(1)]),
            PartitionRequest::explicit(Vec::new()),
        ];
        for request in cases {
            assert!(
                matches!(partition(&g, &request, &solver), Err(PlanError::InvalidArgument(_))),
                "{request:?}"
            );
        }

        let mut bad = path(3);
        bad.vertex_mut(VertexId(1)).unwrap().weight = f64::NAN;
        assert!(partition(&bad, &PartitionRequest::count(1), &solver).is_err());

        let mut negative = path(3);
        negative.vertex_mut(VertexId(2)).unwrap().weight = -1.0;
        assert!(matches!(
            partition(&negative, &PartitionRequest::count(1), &solver),
            Err(PlanError::InvalidArgument(_))
        ));

        let mut directed = path(3);
        directed.graft(VertexId(0)).unwrap();
        assert!(partition(&directed, &PartitionRequest::count(1), &solver).is_err());
    }

    #[test]
    fn forests_fed_twice_are_discarded() {
        let g = path(2);
        let request = PartitionRequest::count(2);
        let network = FlowNetwork::build(&g, &request).unwrap();
        let mut values = vec![0.0; network.model.vars.len()];
        for arc in &network.arcs {
            let flow = match (arc.tail, arc.head) {
                (Tail::Super(0), 0) | (Tail::Vertex(0), 1) | (Tail::Super(1), 1) => 1.0,
                _ => continue,
            };
            values[arc.usage.0] = 1.0;
            values[arc.flow.0] = flow;
        }
        let solver = Scripted {
            replies: vec![MilpSolution::from_values(&network.model, values)],
            ..Scripted::default()
        };
        let outcome = partition(&g, &request, &solver).unwrap();
        assert!(!outcome.is_feasible());
    }

    #[test]
    fn scripted_incumbent_becomes_sorted_forests() {
        let g = path(3);
        let request = PartitionRequest::count(1);
        let network = FlowNetwork::build(&g, &request).unwrap();
        let mut values = vec![0.0; network.model.vars.len()];
        for arc in &network.arcs {
            let flow = match (arc.tail, arc.head) {
                (Tail::Super(0), 0) => 3.0,
                (Tail::Vertex(0), 1) => 2.000_000_000_4,
                (Tail::Vertex(1), 2) => 1.0,
                _ => continue,
            };
            values[arc.usage.0] = 1.0;
            values[arc.flow.0] = flow;
        }
        let solver = Scripted {
            replies: vec![MilpSolution::from_values(&network.model, values)],
            ..Scripted::default()
        };
        let outcome = partition(&g, &request, &solver).unwrap();
        let forest = &outcome.best().unwrap().forests[0];
        assert_eq!(forest.root_vertex, VertexId(0));
        assert!((forest.load - 3.0).abs() < 1e-12);
        assert!((forest.edges[0].flow - 2.0).abs() < f64::EPSILON);
        assert_eq!(forest.edges[0].from, VertexId(0));
        assert_eq!(forest.edges[1].to, VertexId(2));
        assert_tree(forest);
    }

    #[test]
    fn star_of_stars_splits_evenly() {
        let outcome =
            partition(&star_of_stars(), &PartitionRequest::count(2), &GoodLpSolver::default())
                .unwrap();
        let best = outcome.best().unwrap();
        assert_eq!(best.forests.len(), 2);
        let mut roots: Vec<VertexId> = best.forests.iter().map(|f| f.root_vertex).collect();
        roots.sort();
        assert_eq!(roots, vec![VertexId(1), VertexId(2)]);
        for forest in &best.forests {
            assert!((forest.load - 4.0).abs() < 1e-6, "load {}", forest.load);
            assert_eq!(forest.edges.len(), 3);
            assert_tree(forest);
        }
        assert!(best.objectives[1].abs() < 1e-6);
    }

    #[test]
    fn explicit_sources_share_a_path_evenly() {
        let request = PartitionRequest::explicit(vec![VertexId(0), VertexId(3)]);
        let outcome = partition(&path(4), &request, &GoodLpSolver::default()).unwrap();
        let best = outcome.best().unwrap();
        assert_eq!(best.forests.len(), 2);
        assert_eq!(best.forests[0].root_vertex, VertexId(0));
        assert_eq!(best.forests[1].root_vertex, VertexId(3));
        for forest in &best.forests {
            assert!((forest.load - 2.0).abs() < 1e-6);
            assert_tree(forest);
        }
    }
}
