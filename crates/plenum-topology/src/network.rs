//! Zone network assembly: terminals attached to the guide network, a
//! Steiner tree over it, and the rooted graph handed downstream.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{project, shatter};
use crate::graph::{Graph, VertexId};
use crate::steiner::{SteinerTree, steiner_tree};
use crate::types::{PlanError, Point, Segment, ToleranceConfig, TreeAlgorithm};
use crate::weld::WeldedNetwork;

/// A network with its terminals attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalConnection {
    /// Shattered network including the connections.
    pub network: Vec<Segment>,
    /// One segment per terminal that was off the network, terminal first.
    pub connections: Vec<Segment>,
}

/// Attach each terminal to its nearest segment.
///
/// A terminal further than `tol.merge` from the network gets a connection
/// to the nearest point on it; a terminal already on the network splits
/// the segment it lies on.  The result is shattered so every terminal and
/// foot is a vertex.
#[must_use]
pub fn connect_terminals(
    segments: &[Segment],
    terminals: &[Point],
    tol: &ToleranceConfig,
) -> TerminalConnection {
    let live: Vec<Segment> = segments
        .iter()
        .copied()
        .filter(|s| !s.is_degenerate(tol.merge))
        .collect();
    let mut splits: Vec<Vec<f64>> = vec![Vec::new(); live.len()];
    let mut connections = Vec::new();

    for &terminal in terminals {
        let nearest = live
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let t = project(terminal, s).t.clamp(0.0, 1.0);
                let foot = s.point_at(t);
                (i, t, foot, terminal.distance(foot))
            })
            .min_by(|a, b| a.3.total_cmp(&b.3).then(a.0.cmp(&b.0)));
        let Some((i, t, foot, distance)) = nearest else {
            debug!(x = terminal.x, y = terminal.y, "network: no segment to connect to");
            continue;
        };
        if distance <= tol.merge {
            splits[i].push(t);
        } else {
            connections.push(Segment::new(terminal, foot));
        }
    }

    let mut pieces = Vec::with_capacity(live.len() + connections.len());
    for (segment, mut cuts) in live.iter().zip(splits) {
        cuts.sort_by(f64::total_cmp);
        let mut from = segment.start;
        for t in cuts {
            let at = segment.point_at(t);
            if at.distance(from) > tol.merge && at.distance(segment.end) > tol.merge {
                pieces.push(Segment::new(from, at));
                from = at;
            }
        }
        pieces.push(Segment::new(from, segment.end));
    }
    pieces.extend_from_slice(&connections);

    TerminalConnection {
        network: shatter(&pieces, tol.merge),
        connections,
    }
}

/// A welded graph with payloads equal to vertex ids and edge weights
/// equal to segment lengths.
#[must_use]
pub fn rebuild_graph(segments: &[Segment], tol: &ToleranceConfig) -> Graph<usize> {
    let net = WeldedNetwork::build(segments, tol.merge);
    let mut graph = Graph::new();
    for (i, &p) in net.vertices.iter().enumerate() {
        graph.add_vertex(i, p);
    }
    for (e, &(a, b)) in net.edges.iter().enumerate() {
        graph.add_edge(VertexId(a), VertexId(b), net.segment(e).length());
    }
    graph
}

pub(crate) fn nearest_vertex(graph: &Graph<usize>, point: Point, eps: f64) -> Option<VertexId> {
    graph
        .vertices()
        .map(|(id, v)| (id, v.coords.distance(point)))
        .filter(|&(_, d)| d <= eps)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}

/// The union of pairwise shortest paths between terminals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub segments: Vec<Segment>,
    pub total_length: f64,
    /// Terminal pairs with no connecting path, counting unmatched terminals.
    pub disconnected: usize,
}

/// Union of the shortest paths between every pair of `terminals`.
#[must_use]
pub fn shortest_path_subgraph(
    segments: &[Segment],
    terminals: &[Point],
    tol: &ToleranceConfig,
) -> Subgraph {
    let graph = rebuild_graph(segments, tol);
    let ids: Vec<Option<VertexId>> = terminals
        .iter()
        .map(|&t| nearest_vertex(&graph, t, tol.merge))
        .collect();

    let mut used: Vec<(VertexId, VertexId)> = Vec::new();
    let mut disconnected = 0;
    for (i, from) in ids.iter().enumerate() {
        let later = &ids[i + 1..];
        let Some(from) = *from else {
            disconnected += later.len();
            continue;
        };
        let tree = graph.shortest_path_tree(from);
        for to in later {
            let Some(mut at) = *to else {
                disconnected += 1;
                continue;
            };
            if at != from && tree[at.0].is_none() {
                disconnected += 1;
                continue;
            }
            while let Some(prev) = tree[at.0] {
                used.push((prev.min(at), prev.max(at)));
                at = prev;
            }
        }
    }
    used.sort_unstable();
    used.dedup();

    let mut total_length = 0.0;
    let mut out = Vec::with_capacity(used.len());
    for (a, b) in used {
        if let (Some(edge), Some(va), Some(vb)) =
            (graph.edge(a, b), graph.vertex(a), graph.vertex(b))
        {
            total_length += edge.weight;
            out.push(Segment::new(va.coords, vb.coords));
        }
    }
    Subgraph {
        segments: out,
        total_length,
        disconnected,
    }
}

/// One terminal picked per group, and the subgraph it induces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    /// Index of the chosen alternative within each non-empty group.
    pub choice: Vec<usize>,
    pub terminals: Vec<Point>,
    pub subgraph: Subgraph,
}

/// The cheapest way to pick one terminal from each group.
///
/// At most `tol.max_combinations` combinations are evaluated, in
/// mixed-radix order with the last group varying fastest.  Combinations
/// leaving fewer pairs disconnected win, then shorter ones; ties keep
/// enumeration order.
#[must_use]
pub fn best_terminal_combination(
    segments: &[Segment],
    groups: &[Vec<Point>],
    tol: &ToleranceConfig,
) -> Option<Combination> {
    let groups: Vec<&Vec<Point>> = groups.iter().filter(|g| !g.is_empty()).collect();
    if groups.is_empty() {
        return None;
    }
    let candidates: Vec<Point> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let network = connect_terminals(segments, &candidates, tol).network;

    let mut evaluated = Vec::new();
    let mut choice = vec![0usize; groups.len()];
    'enumerate: while evaluated.len() < tol.max_combinations {
        let terminals: Vec<Point> = choice.iter().zip(&groups).map(|(&c, g)| g[c]).collect();
        let subgraph = shortest_path_subgraph(&network, &terminals, tol);
        evaluated.push(Combination {
            choice: choice.clone(),
            terminals,
            subgraph,
        });
        for slot in (0..groups.len()).rev() {
            choice[slot] += 1;
            if choice[slot] < groups[slot].len() {
                continue 'enumerate;
            }
            choice[slot] = 0;
        }
        break;
    }
    debug!(evaluated = evaluated.len(), "network: terminal combinations scored");
    evaluated.sort_by(|a, b| {
        a.subgraph
            .disconnected
            .cmp(&b.subgraph.disconnected)
            .then(a.subgraph.total_length.total_cmp(&b.subgraph.total_length))
    });
    evaluated.into_iter().next()
}

/// The rooted distribution network of one zone.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneNetwork {
    pub connection: TerminalConnection,
    pub tree: SteinerTree,
    /// The tree as a graph, grafted away from `root`.
    pub graph: Graph<usize>,
    pub root: Option<VertexId>,
    /// Graph vertices carrying the terminals.
    pub terminals: Vec<VertexId>,
}

/// Connect `terminals`, span them with a Steiner tree and root the result.
///
/// The root is the vertex at the first source when one matches within
/// `tol.root_match`; otherwise a pseudo-root is placed `tol.root_offset`
/// off the tree's diameter midpoint.  Terminal vertices get weight 1.
///
/// # Errors
///
/// Propagates [`Graph::graft`] failures.
pub fn zone_network(
    segments: &[Segment],
    terminals: &[Point],
    sources: &[Point],
    algorithm: TreeAlgorithm,
    tol: &ToleranceConfig,
) -> Result<ZoneNetwork, PlanError> {
    let attach: Vec<Point> = terminals.iter().chain(sources).copied().collect();
    let connection = connect_terminals(segments, &attach, tol);
    let tree = steiner_tree(&connection.network, terminals, sources, algorithm, tol);
    let mut graph = rebuild_graph(&tree.segments, tol);

    let mut terminal_ids = Vec::new();
    for &t in terminals {
        if let Some(id) = nearest_vertex(&graph, t, tol.root_match)
            && !terminal_ids.contains(&id)
        {
            terminal_ids.push(id);
        }
    }
    for &id in &terminal_ids {
        if let Some(v) = graph.vertex_mut(id) {
            v.weight = 1.0;
        }
    }

    let matched = sources.first().and_then(|&s| nearest_vertex(&graph, s, tol.root_match));
    if !sources.is_empty() && matched.is_none() {
        warn!("network: first source matches no tree vertex, using a pseudo-root");
    }
    let root = match matched {
        Some(root) => Some(root),
        None => graph.pseudo_root(tol.root_offset),
    };
    if let Some(root) = root {
        graph.graft(root)?;
    }
    debug!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        terminals = terminal_ids.len(),
        rooted = root.is_some(),
        "network: zone assembled"
    );

    Ok(ZoneNetwork {
        connection,
        tree,
        graph,
        root,
        terminals: terminal_ids,
    })
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

    fn tol() -> ToleranceConfig {
        ToleranceConfig::default()
    }

    /// A corridor along y = 0 with a spur up at x = 5.
    fn corridor() -> Vec<Segment> {
        vec![seg(0.0, 0.0, 10.0, 0.0), seg(5.0, 0.0, 5.0, 4.0)]
    }

    #[test]
    fn off_network_terminal_gets_a_perpendicular_connection() {
        let out = connect_terminals(&corridor(), &[p(2.0, 1.0)], &tol());
        assert_eq!(out.connections, vec![seg(2.0, 1.0, 2.0, 0.0)]);
        // corridor split at the spur and the foot, plus spur and connection
        assert_eq!(out.network.len(), 5);
    }

    #[test]
    fn on_network_terminal_splits_its_segment() {
        let out = connect_terminals(&corridor(), &[p(8.0, 0.0)], &tol());
        assert!(out.connections.is_empty());
        assert_eq!(out.network.len(), 4);
        assert!(out.network.iter().any(|s| s.end == p(8.0, 0.0) || s.start == p(8.0, 0.0)));
    }

    #[test]
    fn terminal_beyond_an_end_connects_to_it() {
        let out = connect_terminals(&corridor(), &[p(12.0, 0.0)], &tol());
        assert_eq!(out.connections, vec![seg(12.0, 0.0, 10.0, 0.0)]);
    }

    #[test]
    fn subgraph_joins_pairwise_paths() {
        let terminals = [p(0.0, 0.0), p(10.0, 0.0), p(5.0, 4.0)];
        let net = connect_terminals(&corridor(), &terminals, &tol()).network;
        let sub = shortest_path_subgraph(&net, &terminals, &tol());
        assert_eq!(sub.disconnected, 0);
        assert!((sub.total_length - 14.0).abs() < 1e-9);
        assert_eq!(sub.segments.len(), 3);
    }

    #[test]
    fn subgraph_counts_unreachable_pairs() {
        let segs = vec![seg(0.0, 0.0, 1.0, 0.0), seg(5.0, 0.0, 6.0, 0.0)];
        let sub = shortest_path_subgraph(&segs, &[p(0.0, 0.0), p(6.0, 0.0), p(9.0, 9.0)], &tol());
        assert_eq!(sub.disconnected, 3);
        assert!(sub.segments.is_empty());
    }

    #[test]
    fn cheapest_combination_wins() {
        let groups = vec![vec![p(0.0, 0.0), p(4.0, 0.0)], vec![p(6.0, 0.0), p(10.0, 0.0)]];
        let best = best_terminal_combination(&corridor(), &groups, &tol()).unwrap();
        assert_eq!(best.choice, vec![1, 0]);
        assert!((best.subgraph.total_length - 2.0).abs() < 1e-9);
    }

    #[test]
    fn combination_search_respects_the_cap() {
        let groups = vec![vec![p(0.0, 0.0), p(4.0, 0.0)], vec![p(6.0, 0.0), p(10.0, 0.0)]];
        let capped = ToleranceConfig {
            max_combinations: 1,
            ..tol()
        };
        let best = best_terminal_combination(&corridor(), &groups, &capped).unwrap();
        assert_eq!(best.choice, vec![0, 0]);
        assert!(best_terminal_combination(&corridor(), &[Vec::new()], &tol()).is_none());
    }

    #[test]
    fn zone_network_roots_at_the_source() {
        let zone = zone_network(
            &corridor(),
            &[p(1.0, 1.0), p(9.0, 1.0)],
            &[p(5.0, 4.0)],
            TreeAlgorithm::Mst,
            &tol(),
        )
        .unwrap();
        let root = zone.root.unwrap();
        assert!(zone.graph.is_directed());
        let r = zone.graph.vertex(root).unwrap();
        assert!(r.is_root);
        assert!(r.coords.distance(p(5.0, 4.0)) < 1e-9);
        assert_eq!(zone.terminals.len(), 2);
        for &t in &zone.terminals {
            let v = zone.graph.vertex(t).unwrap();
            assert!((v.weight - 1.0).abs() < f64::EPSILON);
            assert!(v.depth.is_some());
        }
        assert!((zone.graph.total_weight() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zone_network_without_sources_uses_a_pseudo_root() {
        let terminals = [p(0.0, 0.0), p(10.0, 0.0)];
        let zone =
            zone_network(&corridor(), &terminals, &[], TreeAlgorithm::Spt, &tol()).unwrap();
        let root = zone.graph.vertex(zone.root.unwrap()).unwrap();
        assert!((root.coords.x - 5.0).abs() < 1e-9);
        assert!((root.coords.y.abs() - tol().root_offset).abs() < 1e-9);
        assert_eq!(root.depth, Some(0));
    }

    #[test]
    fn empty_zone_has_no_root() {
        let zone = zone_network(&[], &[], &[], TreeAlgorithm::Mst, &tol()).unwrap();
        assert!(zone.root.is_none());
        assert_eq!(zone.graph.vertex_count(), 0);
    }
}
