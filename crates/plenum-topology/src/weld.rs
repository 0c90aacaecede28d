//! Tolerance-based vertex welding.
//!
//! Every stage that turns loose segments into topology starts the same
//! way: endpoints closer than the merge tolerance become one vertex.
//! [`VertexWelder`] keeps an R-tree of the vertices seen so far and
//! hands out dense ids in first-seen order.

use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::types::{Point, Segment};

type IndexedVertex = GeomWithData<[f64; 2], usize>;

/// Incrementally merges points into vertices.
#[derive(Debug)]
pub struct VertexWelder {
    eps: f64,
    tree: RTree<IndexedVertex>,
    points: Vec<Point>,
}

impl VertexWelder {
    /// Create an empty welder merging points within `eps`.
    #[must_use]
    pub fn new(eps: f64) -> Self {
        Self {
            eps,
            tree: RTree::new(),
            points: Vec::new(),
        }
    }

    /// Id of the vertex within `eps` of `point`, if any.
    ///
    /// When several vertices are in range the lowest id wins.
    #[must_use]
    pub fn find(&self, point: Point) -> Option<usize> {
        self.tree
            .locate_within_distance([point.x, point.y], self.eps * self.eps)
            .map(|v| v.data)
            .min()
    }

    /// Id of the vertex for `point`, creating one if none is in range.
    pub fn insert_or_find(&mut self, point: Point) -> usize {
        if let Some(id) = self.find(point) {
            return id;
        }
        let id = self.points.len();
        self.tree.insert(IndexedVertex::new([point.x, point.y], id));
        self.points.push(point);
        id
    }

    /// Vertex positions indexed by id.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Consume the welder, returning the vertex positions.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }
}

/// A segment set welded into vertices and index-pair edges.
#[derive(Debug, Clone, Default)]
pub struct WeldedNetwork {
    /// Vertex positions.
    pub vertices: Vec<Point>,
    /// Undirected edges as `(lower, higher)` vertex ids, one per input
    /// segment that survived.
    pub edges: Vec<(usize, usize)>,
}

impl WeldedNetwork {
    /// Weld `segments` with tolerance `eps`.
    ///
    /// Zero-length segments and segments whose endpoints weld together
    /// are dropped, as is any second segment between the same pair of
    /// vertices.
    #[must_use]
    pub fn build(segments: &[Segment], eps: f64) -> Self {
        let mut welder = VertexWelder::new(eps);
        let mut edges = Vec::with_capacity(segments.len());
        let mut seen = std::collections::HashSet::new();
        for seg in segments {
            if seg.is_degenerate(eps) {
                continue;
            }
            let a = welder.insert_or_find(seg.start);
            let b = welder.insert_or_find(seg.end);
            if a == b {
                continue;
            }
            let key = (a.min(b), a.max(b));
            if seen.insert(key) {
                edges.push(key);
            }
        }
        Self {
            vertices: welder.into_points(),
            edges,
        }
    }

    /// The edge as a segment from its lower to its higher vertex.
    #[must_use]
    pub fn segment(&self, edge: usize) -> Segment {
        let (a, b) = self.edges[edge];
        Segment::new(self.vertices[a], self.vertices[b])
    }
}
