//! Steiner tree approximation by relay collapse, spanning tree and pruning.
//!
//! Chains of degree-2 relay vertices are first folded into [`ProxyEdge`]s
//! so the spanning step runs over junctions and kept vertices only.  The
//! spanning tree (Kruskal or a shortest-path tree) is then stripped of
//! non-terminal leaves and the surviving proxies are expanded back into
//! their original segments.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{Graph, VertexId};
use crate::types::{Point, Segment, ToleranceConfig, TreeAlgorithm};
use crate::weld::WeldedNetwork;

/// A chain of welded edges standing in for one edge between its ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyEdge {
    /// End vertex ids; `members` run from `ends.0` to `ends.1`.
    pub ends: (usize, usize),
    /// Welded edge indices in path order.
    pub members: Vec<usize>,
    pub length: f64,
}

impl ProxyEdge {
    fn single(net: &WeldedNetwork, edge: usize) -> Self {
        Self {
            ends: net.edges[edge],
            members: vec![edge],
            length: net.segment(edge).length(),
        }
    }

    const fn far_end(&self, from: usize) -> usize {
        if self.ends.0 == from { self.ends.1 } else { self.ends.0 }
    }

    /// Members ordered as walked from `from`.
    fn members_from(&self, from: usize) -> Vec<usize> {
        if self.ends.0 == from {
            self.members.clone()
        } else {
            self.members.iter().rev().copied().collect()
        }
    }

    /// The original segments, oriented and ordered from `ends.0` to
    /// `ends.1`.
    #[must_use]
    pub fn expand(&self, net: &WeldedNetwork) -> Vec<Segment> {
        let mut at = self.ends.0;
        self.members
            .iter()
            .map(|&e| {
                let (a, b) = net.edges[e];
                let (from, to) = if a == at { (a, b) } else { (b, a) };
                at = to;
                Segment::new(net.vertices[from], net.vertices[to])
            })
            .collect()
    }
}

/// Fold every degree-2 vertex not flagged in `keep` into proxy edges.
///
/// A fold that would join a proxy to itself (closing a loop of relays) is
/// skipped, so every returned proxy has distinct ends.
#[must_use]
pub fn collapse_relays(net: &WeldedNetwork, keep: &[bool]) -> Vec<ProxyEdge> {
    let mut proxies: Vec<Option<ProxyEdge>> = (0..net.edges.len())
        .map(|e| Some(ProxyEdge::single(net, e)))
        .collect();
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); net.vertices.len()];
    for (e, &(a, b)) in net.edges.iter().enumerate() {
        incident[a].push(e);
        incident[b].push(e);
    }

    for v in 0..net.vertices.len() {
        if keep.get(v).copied().unwrap_or(false) {
            continue;
        }
        let [p, q] = incident[v][..] else {
            continue;
        };
        let (Some(left), Some(right)) = (&proxies[p], &proxies[q]) else {
            continue;
        };
        let (a, b) = (left.far_end(v), right.far_end(v));
        if a == b {
            continue;
        }
        let mut members: Vec<usize> = left.members_from(a);
        members.extend(right.members_from(v));
        let merged = ProxyEdge {
            ends: (a, b),
            members,
            length: left.length + right.length,
        };
        let id = proxies.len();
        proxies[p] = None;
        proxies[q] = None;
        proxies.push(Some(merged));
        incident[v].clear();
        for (end, old) in [(a, p), (b, q)] {
            for slot in &mut incident[end] {
                if *slot == old {
                    *slot = id;
                }
            }
        }
    }
    proxies.into_iter().flatten().collect()
}

/// Result of [`steiner_tree`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteinerTree {
    /// Selected original segments.
    pub segments: Vec<Segment>,
    /// Surviving proxies; expanding them yields `segments`.
    pub proxies: Vec<ProxyEdge>,
    /// Welded vertex positions the proxies refer to.
    pub vertices: Vec<Point>,
    /// Vertex ids matched by the requested terminals.
    pub terminals: Vec<usize>,
    /// Vertex ids matched by the requested sources.
    pub sources: Vec<usize>,
    pub total_length: f64,
    /// Requested terminals and sources that matched no vertex.
    pub unmatched: Vec<Point>,
}

/// Id of the vertex nearest to `point`, if within `eps`.
fn nearest_vertex(vertices: &[Point], point: Point, eps: f64) -> Option<usize> {
    vertices
        .iter()
        .enumerate()
        .map(|(i, v)| (i, v.distance(point)))
        .filter(|&(_, d)| d <= eps)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Approximate the Steiner tree spanning `terminals` over `segments`.
#[must_use]
pub fn steiner_tree(
    segments: &[Segment],
    terminals: &[Point],
    sources: &[Point],
    algorithm: TreeAlgorithm,
    tol: &ToleranceConfig,
) -> SteinerTree {
    let net = WeldedNetwork::build(segments, tol.merge);
    let mut unmatched = Vec::new();
    let mut resolve = |points: &[Point]| -> Vec<usize> {
        let mut ids = Vec::new();
        for &p in points {
            match nearest_vertex(&net.vertices, p, tol.merge) {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => {
                    debug!(x = p.x, y = p.y, "steiner: point matches no vertex");
                    unmatched.push(p);
                }
            }
        }
        ids
    };
    let terminal_ids = resolve(terminals);
    let source_ids = resolve(sources);

    let mut keep = vec![false; net.vertices.len()];
    for &v in terminal_ids.iter().chain(&source_ids) {
        keep[v] = true;
    }

    let proxies = collapse_relays(&net, &keep);
    let selected = match algorithm {
        TreeAlgorithm::Mst => kruskal(&proxies, net.vertices.len()),
        TreeAlgorithm::Spt => {
            let roots: Vec<usize> = source_ids.iter().chain(&terminal_ids).copied().collect();
            shortest_path_forest(&proxies, &net.vertices, &roots)
        }
    };
    let kept = prune_leaves(&proxies, &selected, &keep, net.vertices.len());

    let proxies: Vec<ProxyEdge> = kept.into_iter().map(|i| proxies[i].clone()).collect();
    let segments: Vec<Segment> = proxies.iter().flat_map(|p| p.expand(&net)).collect();
    let total_length: f64 = proxies.iter().map(|p| p.length).sum();
    debug!(
        proxies = proxies.len(),
        segments = segments.len(),
        total_length,
        unmatched = unmatched.len(),
        "steiner: tree built"
    );
    SteinerTree {
        segments,
        proxies,
        vertices: net.vertices,
        terminals: terminal_ids,
        sources: source_ids,
        total_length,
        unmatched,
    }
}

/// Kruskal over proxies sorted by length, then index.
fn kruskal(proxies: &[ProxyEdge], vertex_count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..proxies.len()).collect();
    order.sort_by(|&a, &b| proxies[a].length.total_cmp(&proxies[b].length).then(a.cmp(&b)));
    let mut sets = UnionFind::<usize>::new(vertex_count);
    order
        .into_iter()
        .filter(|&i| sets.union(proxies[i].ends.0, proxies[i].ends.1))
        .collect()
}

/// Shortest-path trees grown from each root not yet reached.
///
/// Parallel proxies reduce to the cheapest, lowest index first.
fn shortest_path_forest(proxies: &[ProxyEdge], vertices: &[Point], roots: &[usize]) -> Vec<usize> {
    let mut cheapest: HashMap<(usize, usize), usize> = HashMap::new();
    for (i, p) in proxies.iter().enumerate() {
        let key = (p.ends.0.min(p.ends.1), p.ends.0.max(p.ends.1));
        let entry = cheapest.entry(key).or_insert(i);
        if p.length < proxies[*entry].length {
            *entry = i;
        }
    }
    let mut graph: Graph<usize> = Graph::new();
    for (i, &v) in vertices.iter().enumerate() {
        graph.add_vertex(i, v);
    }
    let mut keys: Vec<_> = cheapest.iter().map(|(&k, &i)| (k, i)).collect();
    keys.sort_unstable();
    for &((a, b), i) in &keys {
        graph.add_edge(VertexId(a), VertexId(b), proxies[i].length);
    }

    let mut reached = vec![false; vertices.len()];
    let mut selected = Vec::new();
    for &root in roots {
        if reached[root] {
            continue;
        }
        reached[root] = true;
        for (v, pred) in graph.shortest_path_tree(VertexId(root)).into_iter().enumerate() {
            if let Some(VertexId(p)) = pred {
                reached[v] = true;
                if let Some(&i) = cheapest.get(&(v.min(p), v.max(p))) {
                    selected.push(i);
                }
            }
        }
    }
    selected.sort_unstable();
    selected
}

/// Repeatedly drop proxies hanging off a leaf that is not kept.
fn prune_leaves(
    proxies: &[ProxyEdge],
    selected: &[usize],
    keep: &[bool],
    vertex_count: usize,
) -> Vec<usize> {
    let mut alive: Vec<bool> = vec![false; proxies.len()];
    let mut degree = vec![0usize; vertex_count];
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); vertex_count];
    for &i in selected {
        alive[i] = true;
        let (a, b) = proxies[i].ends;
        degree[a] += 1;
        degree[b] += 1;
        incident[a].push(i);
        incident[b].push(i);
    }
    let mut stack: Vec<usize> = (0..vertex_count)
        .filter(|&v| degree[v] == 1 && !keep[v])
        .collect();
    while let Some(v) = stack.pop() {
        if degree[v] != 1 {
            continue;
        }
        let Some(&i) = incident[v].iter().find(|&&i| alive[i]) else {
            continue;
        };
        alive[i] = false;
        let other = proxies[i].far_end(v);
        degree[v] -= 1;
        degree[other] -= 1;
        if degree[other] == 1 && !keep[other] {
            stack.push(other);
        }
    }
    selected.iter().copied().filter(|&i| alive[i]).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn seg(x0: f64, y0: f64, x1: f64, y1: f64) -> Segment {
        Segment::new(p(x0, y0), p(x1, y1))
    }

    /// 3 x 3 lattice of unit cells, 4 x 4 vertices.
    fn grid() -> Vec<Segment> {
        let mut segs = Vec::new();
        for i in 0..4 {
            for j in 0..3 {
                let (a, b) = (f64::from(i), f64::from(j));
                segs.push(seg(a, b, a, b + 1.0));
                segs.push(seg(b, a, b + 1.0, a));
            }
        }
        segs
    }

    fn tol() -> ToleranceConfig {
        ToleranceConfig::default()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn point_key(q: Point) -> (i64, i64) {
        ((q.x * 1e6).round() as i64, (q.y * 1e6).round() as i64)
    }

    fn endpoint_degrees(segments: &[Segment]) -> HashMap<(i64, i64), usize> {
        let mut degrees = HashMap::new();
        for s in segments {
            *degrees.entry(point_key(s.start)).or_default() += 1;
            *degrees.entry(point_key(s.end)).or_default() += 1;
        }
        degrees
    }

    #[test]
    fn relay_chain_collapses_to_one_proxy() {
        let segs = [seg(0.0, 0.0, 1.0, 0.0), seg(1.0, 0.0, 2.0, 0.0), seg(2.0, 0.0, 2.0, 1.0)];
        let net = WeldedNetwork::build(&segs, 1e-6);
        let proxies = collapse_relays(&net, &[false; 4]);
        assert_eq!(proxies.len(), 1);
        assert!((proxies[0].length - 3.0).abs() < 1e-12);
        let expanded = proxies[0].expand(&net);
        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[0].end, expanded[1].start);
        assert_eq!(expanded[1].end, expanded[2].start);
    }

    #[test]
    fn kept_relays_are_not_collapsed() {
        let segs = [seg(0.0, 0.0, 1.0, 0.0), seg(1.0, 0.0, 2.0, 0.0)];
        let net = WeldedNetwork::build(&segs, 1e-6);
        let proxies = collapse_relays(&net, &[false, true, false]);
        assert_eq!(proxies.len(), 2);
    }

    #[test]
    fn relay_ring_is_not_folded_into_a_self_loop() {
        let segs = [
            seg(0.0, 0.0, 1.0, 0.0),
            seg(1.0, 0.0, 1.0, 1.0),
            seg(1.0, 1.0, 0.0, 1.0),
            seg(0.0, 1.0, 0.0, 0.0),
        ];
        let net = WeldedNetwork::build(&segs, 1e-6);
        let proxies = collapse_relays(&net, &[false; 4]);
        assert!(proxies.iter().all(|p| p.ends.0 != p.ends.1));
        let members: usize = proxies.iter().map(|p| p.members.len()).sum();
        assert_eq!(members, 4);
    }

    #[test]
    fn tree_input_with_leaf_terminals_is_reproduced() {
        let segs = vec![
            seg(0.0, 0.0, 1.0, 0.0),
            seg(1.0, 0.0, 2.0, 0.0),
            seg(2.0, 0.0, 3.0, 0.0),
            seg(2.0, 0.0, 2.0, 1.0),
            seg(2.0, 1.0, 2.0, 2.0),
        ];
        let terminals = [p(0.0, 0.0), p(3.0, 0.0), p(2.0, 2.0)];
        let tree = steiner_tree(&segs, &terminals, &[], TreeAlgorithm::Mst, &tol());
        let net = WeldedNetwork::build(&segs, tol().merge);
        let input: HashSet<_> = (0..net.edges.len()).map(|e| net.segment(e)).map(key).collect();
        let output: HashSet<_> = tree.segments.iter().map(|&s| key(s)).collect();
        assert_eq!(input, output);
        assert!((tree.total_length - 5.0).abs() < 1e-12);
    }

    fn key(s: Segment) -> [(i64, i64); 2] {
        let (a, b) = (point_key(s.start), point_key(s.end));
        if a <= b { [a, b] } else { [b, a] }
    }

    #[test]
    fn expanded_proxies_match_selected_segments() {
        let segs = grid();
        let terminals = [p(0.0, 0.0), p(3.0, 3.0), p(3.0, 0.0)];
        let tree = steiner_tree(&segs, &terminals, &[], TreeAlgorithm::Mst, &tol());
        let net = WeldedNetwork::build(&segs, tol().merge);
        let expanded: Vec<Segment> = tree.proxies.iter().flat_map(|px| px.expand(&net)).collect();
        assert_eq!(expanded, tree.segments);
        let members: usize = tree.proxies.iter().map(|px| px.members.len()).sum();
        assert_eq!(members, tree.segments.len());
    }

    #[test]
    fn every_terminal_subset_is_covered_without_stray_leaves() {
        let segs = grid();
        let candidates = [p(0.0, 0.0), p(3.0, 0.0), p(1.0, 2.0), p(3.0, 3.0), p(0.0, 3.0)];
        for algorithm in [TreeAlgorithm::Mst, TreeAlgorithm::Spt] {
            for mask in 1u32..(1 << candidates.len()) {
                let terminals: Vec<Point> = (0..candidates.len())
                    .filter(|i| mask & (1 << i) != 0)
                    .map(|i| candidates[i])
                    .collect();
                let tree = steiner_tree(&segs, &terminals, &[], algorithm, &tol());
                let degrees = endpoint_degrees(&tree.segments);
                if terminals.len() > 1 {
                    for t in &terminals {
                        assert!(
                            degrees.contains_key(&point_key(*t)),
                            "{algorithm:?} {mask:b} misses {t:?}"
                        );
                    }
                } else {
                    assert!(tree.segments.is_empty());
                }
                for (k, &d) in &degrees {
                    if d == 1 {
                        assert!(
                            terminals.iter().any(|t| point_key(*t) == *k),
                            "{algorithm:?} {mask:b} leaves a stray leaf at {k:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn spt_roots_at_the_source() {
        // A triangle where the cheap edge between terminals is bypassed by
        // a shortest path tree rooted at the source.
        let segs = vec![seg(0.0, 0.0, 4.0, 0.0), seg(0.0, 0.0, 2.0, 3.0), seg(2.0, 3.0, 4.0, 0.0)];
        let terminals = [p(4.0, 0.0), p(2.0, 3.0)];
        let sources = [p(0.0, 0.0)];
        let spt = steiner_tree(&segs, &terminals, &sources, TreeAlgorithm::Spt, &tol());
        let mst = steiner_tree(&segs, &terminals, &sources, TreeAlgorithm::Mst, &tol());
        assert_eq!(spt.segments.len(), 2);
        assert_eq!(mst.segments.len(), 2);
        assert!(spt.segments.iter().all(|s| s.start == p(0.0, 0.0) || s.end == p(0.0, 0.0)));
        assert_eq!(spt.sources, vec![0]);
    }

    #[test]
    fn disconnected_terminals_give_a_forest() {
        let segs = vec![seg(0.0, 0.0, 1.0, 0.0), seg(5.0, 0.0, 6.0, 0.0)];
        let terminals = [p(0.0, 0.0), p(1.0, 0.0), p(5.0, 0.0), p(6.0, 0.0)];
        for algorithm in [TreeAlgorithm::Mst, TreeAlgorithm::Spt] {
            let tree = steiner_tree(&segs, &terminals, &[], algorithm, &tol());
            assert_eq!(tree.segments.len(), 2, "{algorithm:?}");
        }
    }

    #[test]
    fn unmatched_points_are_reported() {
        let segs = vec![seg(0.0, 0.0, 1.0, 0.0)];
        let terminals = [p(0.0, 0.0), p(7.0, 7.0)];
        let tree = steiner_tree(&segs, &terminals, &[], TreeAlgorithm::Mst, &tol());
        assert_eq!(tree.unmatched, vec![p(7.0, 7.0)]);
        assert_eq!(tree.terminals, vec![0]);
        assert!(tree.segments.is_empty());
    }

    #[test]
    fn empty_inputs_give_an_empty_tree() {
        let tree = steiner_tree(&[], &[], &[], TreeAlgorithm::Mst, &tol());
        assert!(tree.segments.is_empty());
        assert!(tree.vertices.is_empty());
    }
}
