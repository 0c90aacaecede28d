//! Weighted graph over a vertex arena.
//!
//! Vertices are addressed by [`VertexId`] handles into a `Vec` that only
//! ever grows; removal leaves a tombstone so existing handles stay valid.
//! Each vertex owns its neighbor/weight list, and an edge map keyed by
//! endpoint pair answers lookups without an adjacency matrix.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{PlanError, Point};

/// Distance below which a diameter midpoint reuses an existing vertex.
pub const SPLIT_REUSE_DISTANCE: f64 = 1e-9;

/// Stable handle to a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub usize);

/// A vertex and its outgoing adjacency.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex<T> {
    pub value: T,
    pub coords: Point,
    /// Demand carried by the vertex (its share of the load).
    pub weight: f64,
    pub is_root: bool,
    /// Hop count from the root, set by [`Graph::graft`].
    pub depth: Option<usize>,
    neighbors: Vec<(VertexId, f64)>,
}

impl<T> Vertex<T> {
    /// Outgoing `(neighbor, edge weight)` pairs.
    #[must_use]
    pub fn neighbors(&self) -> &[(VertexId, f64)] {
        &self.neighbors
    }
}

/// An edge as exported by [`Graph::edges`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: VertexId,
    pub to: VertexId,
    pub weight: f64,
}

/// A vertex sequence and its summed edge weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub vertices: Vec<VertexId>,
    pub length: f64,
}

impl Path {
    #[must_use]
    pub fn first(&self) -> Option<VertexId> {
        self.vertices.first().copied()
    }

    #[must_use]
    pub fn last(&self) -> Option<VertexId> {
        self.vertices.last().copied()
    }
}

/// A weighted, optionally directed graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph<T> {
    vertices: Vec<Option<Vertex<T>>>,
    edges: HashMap<(VertexId, VertexId), f64>,
    directed: bool,
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Graph<T> {
    /// An empty undirected graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            edges: HashMap::new(),
            directed: false,
        }
    }

    #[must_use]
    pub const fn is_directed(&self) -> bool {
        self.directed
    }

    /// Number of live vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().flatten().count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Live vertices in id order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex<T>)> {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (VertexId(i), v)))
    }

    #[must_use]
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex<T>> {
        self.vertices.get(id.0).and_then(Option::as_ref)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex<T>> {
        self.vertices.get_mut(id.0).and_then(Option::as_mut)
    }

    #[must_use]
    pub fn contains(&self, id: VertexId) -> bool {
        self.vertex(id).is_some()
    }

    /// Outgoing adjacency of `id`; empty for unknown ids.
    #[must_use]
    pub fn neighbors(&self, id: VertexId) -> &[(VertexId, f64)] {
        self.vertex(id).map_or(&[], |v| v.neighbors.as_slice())
    }

    #[must_use]
    pub fn degree(&self, id: VertexId) -> usize {
        self.neighbors(id).len()
    }

    /// The vertex flagged as root, if any.
    #[must_use]
    pub fn root(&self) -> Option<VertexId> {
        self.vertices().find(|(_, v)| v.is_root).map(|(id, _)| id)
    }

    /// Sum of vertex weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.vertices().map(|(_, v)| v.weight).sum()
    }

    fn key(&self, a: VertexId, b: VertexId) -> (VertexId, VertexId) {
        if self.directed { (a, b) } else { (a.min(b), a.max(b)) }
    }

    /// Connect `a` and `b`.
    ///
    /// Returns `None` when either endpoint is unknown, when `a == b`, or
    /// when the edge already exists.
    pub fn add_edge(&mut self, a: VertexId, b: VertexId, weight: f64) -> Option<Edge> {
        if a == b || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let key = self.key(a, b);
        if self.edges.contains_key(&key) {
            return None;
        }
        self.edges.insert(key, weight);
        if let Some(v) = self.vertex_mut(a) {
            v.neighbors.push((b, weight));
        }
        if !self.directed
            && let Some(v) = self.vertex_mut(b)
        {
            v.neighbors.push((a, weight));
        }
        Some(Edge {
            from: key.0,
            to: key.1,
            weight,
        })
    }

    /// Disconnect `a` and `b`, returning the removed edge weight.
    pub fn remove_edge(&mut self, a: VertexId, b: VertexId) -> Option<f64> {
        let key = self.key(a, b);
        let weight = self.edges.remove(&key)?;
        if let Some(v) = self.vertex_mut(key.0) {
            v.neighbors.retain(|&(n, _)| n != key.1);
        }
        if !self.directed
            && let Some(v) = self.vertex_mut(key.1)
        {
            v.neighbors.retain(|&(n, _)| n != key.0);
        }
        Some(weight)
    }

    /// Look up the edge between `a` and `b`.
    #[must_use]
    pub fn edge(&self, a: VertexId, b: VertexId) -> Option<Edge> {
        let key = self.key(a, b);
        self.edges.get(&key).map(|&weight| Edge {
            from: key.0,
            to: key.1,
            weight,
        })
    }

    /// Every edge once, sorted by endpoint ids.
    ///
    /// Undirected edges run from the lower to the higher id.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .edges
            .iter()
            .map(|(&(from, to), &weight)| Edge { from, to, weight })
            .collect();
        edges.sort_by_key(|e| (e.from, e.to));
        edges
    }

    /// Remove a vertex and every edge touching it.
    pub fn remove_vertex(&mut self, id: VertexId) -> Option<Vertex<T>> {
        let mut vertex = self.vertices.get_mut(id.0)?.take()?;
        self.edges.retain(|&(a, b), _| a != id && b != id);
        for v in self.vertices.iter_mut().flatten() {
            v.neighbors.retain(|&(n, _)| n != id);
        }
        vertex.neighbors.clear();
        Some(vertex)
    }

    // -----------------------------------------------------------------------
    // Paths
    // -----------------------------------------------------------------------

    /// Single-source Dijkstra: distances and predecessors by vertex index.
    fn dijkstra(&self, from: VertexId) -> (Vec<f64>, Vec<Option<VertexId>>) {
        let n = self.vertices.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut prev = vec![None; n];
        let mut heap = BinaryHeap::new();
        dist[from.0] = 0.0;
        heap.push(Frontier {
            cost: 0.0,
            vertex: from,
        });
        while let Some(Frontier { cost, vertex }) = heap.pop() {
            if cost > dist[vertex.0] {
                continue;
            }
            for &(next, weight) in self.neighbors(vertex) {
                let candidate = cost + weight;
                if candidate < dist[next.0] {
                    dist[next.0] = candidate;
                    prev[next.0] = Some(vertex);
                    heap.push(Frontier {
                        cost: candidate,
                        vertex: next,
                    });
                }
            }
        }
        (dist, prev)
    }

    fn unwind(prev: &[Option<VertexId>], to: VertexId) -> Vec<VertexId> {
        let mut vertices = vec![to];
        let mut at = to;
        while let Some(p) = prev[at.0] {
            vertices.push(p);
            at = p;
        }
        vertices.reverse();
        vertices
    }

    /// Cheapest path from `from` to `to`, or `None` if unreachable.
    #[must_use]
    pub fn shortest_path(&self, from: VertexId, to: VertexId) -> Option<Path> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        let (dist, prev) = self.dijkstra(from);
        let length = dist[to.0];
        if !length.is_finite() {
            return None;
        }
        Some(Path {
            vertices: Self::unwind(&prev, to),
            length,
        })
    }

    /// Dijkstra predecessor of every vertex, indexed by id.  Unreachable
    /// vertices and `from` itself map to `None`.
    #[must_use]
    pub fn shortest_path_tree(&self, from: VertexId) -> Vec<Option<VertexId>> {
        if !self.contains(from) {
            return vec![None; self.vertices.len()];
        }
        self.dijkstra(from).1
    }

    /// Path from `from` to the reachable vertex furthest from it.
    ///
    /// Ties go to the lowest vertex id.  On a graph with at most one vertex
    /// the path is just `from` with length 0; an unknown `from` yields an
    /// empty path.
    #[must_use]
    pub fn furthest_path(&self, from: VertexId) -> Path {
        if !self.contains(from) {
            return Path::default();
        }
        if self.vertex_count() <= 1 {
            return Path {
                vertices: vec![from],
                length: 0.0,
            };
        }
        let (dist, prev) = self.dijkstra(from);
        let mut best = from;
        for (i, &d) in dist.iter().enumerate() {
            if d.is_finite() && d > dist[best.0] {
                best = VertexId(i);
            }
        }
        Path {
            vertices: Self::unwind(&prev, best),
            length: dist[best.0],
        }
    }

    /// Approximate diameter by double sweep from the first live vertex.
    #[must_use]
    pub fn diameter(&self) -> Option<Path> {
        let (start, _) = self.vertices().next()?;
        let end = self.furthest_path(start).last()?;
        Some(self.furthest_path(end))
    }

    // -----------------------------------------------------------------------
    // Rooting
    // -----------------------------------------------------------------------

    fn push_vertex(&mut self, value: T, coords: Point, is_root: bool) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.vertices.push(Some(Vertex {
            value,
            coords,
            weight: 0.0,
            is_root,
            depth: None,
            neighbors: Vec::new(),
        }));
        id
    }

    /// Orient every edge away from `root` and assign hop depths.
    ///
    /// The result is a breadth-first tree: an edge leading to a vertex that
    /// was already reached is dropped.  Vertices in other components keep
    /// `depth = None` and their edges are oriented from lower to higher id.
    ///
    /// # Errors
    ///
    /// [`PlanError::UnknownVertex`] for an unknown root and
    /// [`PlanError::GraftCapExceeded`] if the frontier fails to drain.
    pub fn graft(&mut self, root: VertexId) -> Result<(), PlanError> {
        if !self.contains(root) {
            return Err(PlanError::UnknownVertex(root.0));
        }
        let cap = self.vertex_count() + 1;
        let mut visited = vec![false; self.vertices.len()];
        for (i, v) in self.vertices.iter_mut().enumerate() {
            if let Some(v) = v {
                v.depth = None;
                v.is_root = i == root.0;
            }
        }
        visited[root.0] = true;
        if let Some(v) = self.vertex_mut(root) {
            v.depth = Some(0);
        }

        let mut frontier = vec![root];
        let mut rounds = 0;
        while !frontier.is_empty() {
            rounds += 1;
            if rounds > cap {
                return Err(PlanError::GraftCapExceeded { rounds });
            }
            let mut next = Vec::new();
            for v in frontier {
                let Some(vertex) = self.vertex_mut(v) else {
                    continue;
                };
                let depth = vertex.depth.map_or(1, |d| d + 1);
                let mut children = std::mem::take(&mut vertex.neighbors);
                children.retain(|&(n, _)| !visited[n.0]);
                for &(n, _) in &children {
                    visited[n.0] = true;
                    next.push(n);
                    if let Some(child) = self.vertex_mut(n) {
                        child.depth = Some(depth);
                    }
                }
                if let Some(vertex) = self.vertex_mut(v) {
                    vertex.neighbors = children;
                }
            }
            frontier = next;
        }

        for (i, v) in self.vertices.iter_mut().enumerate() {
            if let Some(v) = v
                && !visited[i]
            {
                v.neighbors.retain(|&(n, _)| n.0 > i);
            }
        }
        self.directed = true;
        self.edges = self
            .vertices()
            .flat_map(|(id, v)| v.neighbors.iter().map(move |&(n, w)| ((id, n), w)))
            .collect();
        Ok(())
    }
}

impl<T: PartialEq> Graph<T> {
    /// Add a vertex, or return `None` if one with an equal payload exists.
    pub fn add_vertex(&mut self, value: T, coords: Point) -> Option<VertexId> {
        if self.find_vertex(&value).is_some() {
            return None;
        }
        Some(self.push_vertex(value, coords, false))
    }

    /// Id of the vertex holding `value`.
    #[must_use]
    pub fn find_vertex(&self, value: &T) -> Option<VertexId> {
        self.vertices()
            .find(|(_, v)| v.value == *value)
            .map(|(id, _)| id)
    }

    /// Place a root next to the weighted midpoint of the diameter.
    ///
    /// The diameter edge containing the midpoint is split at it (or an
    /// endpoint within [`SPLIT_REUSE_DISTANCE`] is reused) and a new
    /// vertex flagged `is_root` is attached `offset` away, perpendicular
    /// to that edge.  Returns the root id, or `None` for an empty graph or
    /// when a payload already exists.
    pub fn insert_pseudo_root(
        &mut self,
        split_value: T,
        root_value: T,
        offset: f64,
    ) -> Option<VertexId> {
        if self.find_vertex(&split_value).is_some() || self.find_vertex(&root_value).is_some() {
            return None;
        }
        let diameter = self.diameter()?;
        let (anchor, normal) = match diameter.vertices.as_slice() {
            [] => return None,
            [only] => (*only, Point::new(0.0, 1.0)),
            path => self.split_at_midpoint(path, diameter.length / 2.0, split_value)?,
        };
        let coords = self.vertex(anchor)?.coords + normal * offset;
        let root = self.push_vertex(root_value, coords, true);
        self.add_edge(anchor, root, offset);
        Some(root)
    }

    /// Walk `path` to `half` of its weight and return the vertex there with
    /// the unit normal of the crossed edge.
    fn split_at_midpoint(
        &mut self,
        path: &[VertexId],
        half: f64,
        split_value: T,
    ) -> Option<(VertexId, Point)> {
        let mut walked = 0.0;
        for pair in path.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let weight = self.edge(a, b)?.weight;
            if walked + weight < half {
                walked += weight;
                continue;
            }
            let pa = self.vertex(a)?.coords;
            let pb = self.vertex(b)?.coords;
            let normal = (pb - pa).normalized().map_or(Point::new(0.0, 1.0), Point::perp);
            let t = if weight > 0.0 { (half - walked) / weight } else { 0.0 };
            let at = pa + (pb - pa) * t;
            if at.distance(pa) <= SPLIT_REUSE_DISTANCE {
                return Some((a, normal));
            }
            if at.distance(pb) <= SPLIT_REUSE_DISTANCE {
                return Some((b, normal));
            }
            self.remove_edge(a, b);
            let split = self.push_vertex(split_value, at, false);
            self.add_edge(a, split, weight * t);
            self.add_edge(split, b, weight * (1.0 - t));
            return Some((split, normal));
        }
        path.last().map(|&v| (v, Point::new(0.0, 1.0)))
    }
}

impl Graph<usize> {
    /// [`insert_pseudo_root`](Self::insert_pseudo_root) with payloads one
    /// and two past the largest in use.
    pub fn pseudo_root(&mut self, offset: f64) -> Option<VertexId> {
        let next = self.vertices().map(|(_, v)| v.value + 1).max().unwrap_or(0);
        self.insert_pseudo_root(next, next + 1, offset)
    }
}

/// Min-heap entry; ties pop the lowest vertex id first.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f64,
    vertex: VertexId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct VertexRecord<'a, T> {
    id: VertexId,
    value: &'a T,
    coords: Point,
    weight: f64,
    is_root: bool,
    depth: Option<usize>,
}

#[derive(Serialize)]
struct GraphRecord<'a, T> {
    directed: bool,
    vertices: Vec<VertexRecord<'a, T>>,
    edges: Vec<Edge>,
}

impl<T: Serialize> Serialize for Graph<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        GraphRecord {
            directed: self.directed,
            vertices: self
                .vertices()
                .map(|(id, v)| VertexRecord {
                    id,
                    value: &v.value,
                    coords: v.coords,
                    weight: v.weight,
                    is_root: v.is_root,
                    depth: v.depth,
                })
                .collect(),
            edges: self.edges(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    /// Unit square 0-1-2-3 with unit edges.
    fn square() -> Graph<usize> {
        let mut g = Graph::new();
        let corners = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        for (i, &c) in corners.iter().enumerate() {
            g.add_vertex(i, c).unwrap();
        }
        for i in 0..4 {
            g.add_edge(VertexId(i), VertexId((i + 1) % 4), 1.0).unwrap();
        }
        g
    }

    /// A straight chain 0 - 1 - ... - (n-1) along x with unit edges.
    fn chain(n: usize) -> Graph<usize> {
        let mut g = Graph::new();
        for i in 0..n {
            g.add_vertex(i, p(i as f64, 0.0)).unwrap();
        }
        for i in 1..n {
            g.add_edge(VertexId(i - 1), VertexId(i), 1.0).unwrap();
        }
        g
    }

    #[test]
    fn add_is_idempotent() {
        let mut g = square();
        assert!(g.add_vertex(0, p(5.0, 5.0)).is_none());
        assert!(g.add_edge(VertexId(1), VertexId(0), 1.0).is_none());
        assert!(g.add_edge(VertexId(0), VertexId(0), 1.0).is_none());
        assert!(g.add_edge(VertexId(0), VertexId(9), 1.0).is_none());
        assert_eq!(g.find_vertex(&2), Some(VertexId(2)));
    }

    #[test]
    fn edges_are_reported_lower_to_higher() {
        let g = square();
        let edges = g.edges();
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|e| e.from < e.to));
        assert_eq!(g.edge(VertexId(3), VertexId(0)).unwrap().from, VertexId(0));
    }

    #[test]
    fn removing_a_vertex_drops_its_edges() {
        let mut g = square();
        g.remove_vertex(VertexId(1)).unwrap();
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.degree(VertexId(0)), 1);
        assert!(g.vertex(VertexId(1)).is_none());
        assert!(g.add_vertex(1, p(1.0, 0.0)).is_some());
    }

    #[test]
    fn square_shortest_path_goes_through_one_corner() {
        let g = square();
        let path = g.shortest_path(VertexId(0), VertexId(2)).unwrap();
        assert!((path.length - 2.0).abs() < 1e-12);
        assert_eq!(path.vertices.len(), 3);
        assert!(matches!(path.vertices[1], VertexId(1) | VertexId(3)));
    }

    #[test]
    fn unreachable_target_has_no_path() {
        let mut g = square();
        g.add_vertex(7, p(9.0, 9.0)).unwrap();
        assert!(g.shortest_path(VertexId(0), VertexId(4)).is_none());
    }

    #[test]
    fn furthest_path_on_tiny_graphs_is_degenerate() {
        let mut g: Graph<usize> = Graph::new();
        assert!(g.furthest_path(VertexId(0)).vertices.is_empty());
        let only = g.add_vertex(0, p(0.0, 0.0)).unwrap();
        let path = g.furthest_path(only);
        assert_eq!(path.vertices, vec![only]);
        assert!(path.length.abs() < f64::EPSILON);
    }

    #[test]
    fn diameter_of_a_chain_spans_it() {
        let g = chain(5);
        let d = g.diameter().unwrap();
        assert!((d.length - 4.0).abs() < 1e-12);
        let mut ends = [d.first().unwrap(), d.last().unwrap()];
        ends.sort();
        assert_eq!(ends, [VertexId(0), VertexId(4)]);
    }

    #[test]
    fn pseudo_root_splits_an_even_chain_at_its_middle_edge() {
        let mut g = chain(4);
        let root = g.pseudo_root(0.5).unwrap();
        assert_eq!(g.vertex_count(), 6);
        let split = g.neighbors(root)[0].0;
        let at = g.vertex(split).unwrap().coords;
        assert!((at.x - 1.5).abs() < 1e-12);
        assert!(at.y.abs() < 1e-12);
        let r = g.vertex(root).unwrap();
        assert!(r.is_root);
        assert!((r.coords.y.abs() - 0.5).abs() < 1e-12);
        assert!(g.edge(VertexId(1), VertexId(2)).is_none());
        assert_eq!(g.root(), Some(root));
    }

    #[test]
    fn pseudo_root_reuses_a_vertex_at_the_midpoint() {
        let mut g = chain(3);
        let root = g.pseudo_root(1.0).unwrap();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.neighbors(root)[0].0, VertexId(1));
    }

    #[test]
    fn pseudo_root_on_edgeless_graph_attaches_to_first_vertex() {
        let mut g: Graph<usize> = Graph::new();
        assert!(g.pseudo_root(0.5).is_none());
        g.add_vertex(0, p(2.0, 2.0)).unwrap();
        let root = g.pseudo_root(0.5).unwrap();
        assert_eq!(g.neighbors(root)[0].0, VertexId(0));
    }

    #[test]
    fn graft_orients_edges_and_assigns_depth() {
        let mut g = chain(4);
        g.graft(VertexId(1)).unwrap();
        assert!(g.is_directed());
        let depths: Vec<_> = g.vertices().map(|(_, v)| v.depth).collect();
        assert_eq!(depths, vec![Some(1), Some(0), Some(1), Some(2)]);
        assert_eq!(g.edge_count(), 3);
        assert!(g.edge(VertexId(1), VertexId(0)).is_some());
        assert!(g.edge(VertexId(0), VertexId(1)).is_none());
        assert_eq!(g.degree(VertexId(3)), 0);
        assert_eq!(g.root(), Some(VertexId(1)));
    }

    #[test]
    fn graft_of_a_cycle_keeps_a_breadth_first_tree() {
        let mut g = square();
        g.graft(VertexId(0)).unwrap();
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.vertex(VertexId(2)).unwrap().depth, Some(2));
    }

    #[test]
    fn graft_leaves_other_components_undepthed() {
        let mut g = chain(2);
        g.add_vertex(5, p(9.0, 9.0)).unwrap();
        g.graft(VertexId(0)).unwrap();
        assert_eq!(g.vertex(VertexId(2)).unwrap().depth, None);
    }

    #[test]
    fn graft_rejects_unknown_root() {
        let mut g = chain(2);
        assert_eq!(g.graft(VertexId(9)), Err(PlanError::UnknownVertex(9)));
    }

    #[test]
    fn serializes_vertices_and_edges() {
        let mut g = chain(2);
        g.graft(VertexId(0)).unwrap();
        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json["directed"], true);
        assert_eq!(json["vertices"][1]["depth"], 1);
        assert_eq!(json["edges"][0]["from"], 0);
    }
}
