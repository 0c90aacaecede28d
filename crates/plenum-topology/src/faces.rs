//! Planar face extraction over a shattered segment set.
//!
//! Each segment contributes two half-edges, `2e` (start to end) and
//! `2e + 1` (end to start), so a half-edge's opposite is `h ^ 1`.
//! Dangling trees are peeled off first; their segments are orphans.
//! Every remaining half-edge then has a successor: at its destination,
//! the live outgoing half-edge reached first when sweeping clockwise from
//! the reversed incoming direction.  With y pointing up this traces
//! bounded faces counter-clockwise and the outer face of each connected
//! component clockwise.
//!
//! Closed faces are classified by signed area.  Components nested inside
//! a region of another component become holes of that region.

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{ccw_angle, point_in_polygon, signed_area};
use crate::types::{Point, Segment, ToleranceConfig};
use crate::weld::WeldedNetwork;

/// Label for an edge whose opposite side belongs to no closed face.
pub const UNMATCHED_LABEL: &str = "Outside_X";

/// An inner boundary of a multiply-connected region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hole {
    /// The hole boundary, clockwise.
    pub loop_points: Vec<Point>,
    /// Per-edge labels naming the enclosed regions across each edge.
    pub labels: Vec<String>,
}

/// A closed face: an outer shell or an enclosed region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Face id, unique within one extraction.
    pub id: usize,
    /// `"Z{id}"`.
    pub label: String,
    /// Vertex loop without a repeated closing point.  Edge `i` runs from
    /// `loop_points[i]` to `loop_points[i + 1]` (wrapping).
    pub loop_points: Vec<Point>,
    /// Adjacency label per edge, parallel to `loop_points`.
    pub labels: Vec<String>,
    /// Signed area: positive for regions, negative for shells.
    pub area: f64,
    /// Inner boundaries of nested components.
    pub holes: Vec<Hole>,
}

/// Everything found by [`extract_faces`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceSet {
    /// Clockwise outer shells of top-level components.
    pub shells: Vec<Region>,
    /// Counter-clockwise enclosed regions.
    pub regions: Vec<Region>,
    /// Regions of nested components dropped for being too small.
    pub pruned: Vec<Region>,
    /// Segments that bound no closed face.
    pub orphans: Vec<Segment>,
}

#[derive(Debug, Clone)]
struct HalfEdge {
    origin: usize,
    edge: usize,
    dead: bool,
    next: Option<usize>,
}

struct Mesh {
    vertices: Vec<Point>,
    half_edges: Vec<HalfEdge>,
    outgoing: Vec<Vec<usize>>,
}

enum Walk {
    Closed(Vec<usize>),
    Open(Vec<usize>),
}

impl Mesh {
    fn build(net: &WeldedNetwork) -> Self {
        let mut half_edges = Vec::with_capacity(net.edges.len() * 2);
        let mut outgoing = vec![Vec::new(); net.vertices.len()];
        for (e, &(a, b)) in net.edges.iter().enumerate() {
            for origin in [a, b] {
                outgoing[origin].push(half_edges.len());
                half_edges.push(HalfEdge {
                    origin,
                    edge: e,
                    dead: false,
                    next: None,
                });
            }
        }
        Self {
            vertices: net.vertices.clone(),
            half_edges,
            outgoing,
        }
    }

    const fn twin(h: usize) -> usize {
        h ^ 1
    }

    fn dest(&self, h: usize) -> usize {
        self.half_edges[Self::twin(h)].origin
    }

    fn vector(&self, h: usize) -> Point {
        self.vertices[self.dest(h)] - self.vertices[self.half_edges[h].origin]
    }

    /// Kill half-edges at degree-1 vertices until none remain, so whole
    /// dangling trees go.
    fn peel_dangling(&mut self) {
        let mut live: Vec<usize> = self.outgoing.iter().map(Vec::len).collect();
        let mut stack: Vec<usize> = (0..live.len()).filter(|&v| live[v] == 1).collect();
        while let Some(v) = stack.pop() {
            if live[v] != 1 {
                continue;
            }
            let Some(h) = self.outgoing[v]
                .iter()
                .copied()
                .find(|&h| !self.half_edges[h].dead)
            else {
                continue;
            };
            let w = self.dest(h);
            self.half_edges[h].dead = true;
            self.half_edges[Self::twin(h)].dead = true;
            live[v] -= 1;
            live[w] -= 1;
            if live[w] == 1 {
                stack.push(w);
            }
        }
    }

    /// Link every live half-edge to its successor.
    ///
    /// Ties on angle go to the lowest destination vertex id, then the
    /// lowest half-edge id.
    fn link_next(&mut self) {
        for h in 0..self.half_edges.len() {
            if self.half_edges[h].dead {
                continue;
            }
            let v = self.dest(h);
            let back = -self.vector(h);
            let mut best: Option<(f64, usize, usize)> = None;
            for &g in &self.outgoing[v] {
                if g == Self::twin(h) || self.half_edges[g].dead {
                    continue;
                }
                let turn = 2.0f64.mul_add(std::f64::consts::PI, -ccw_angle(back, self.vector(g)));
                let key = (turn, self.dest(g), g);
                let better = best.is_none_or(|(t, d, id)| {
                    turn.total_cmp(&t).then(key.1.cmp(&d)).then(g.cmp(&id)).is_lt()
                });
                if better {
                    best = Some(key);
                }
            }
            self.half_edges[h].next = best.map(|(_, _, g)| g);
        }
    }

    /// Walk every live half-edge into a face.
    fn trace(&self) -> Vec<Walk> {
        let bound = self.half_edges.iter().filter(|h| !h.dead).count();
        let mut visited = vec![false; self.half_edges.len()];
        let mut walks = Vec::new();
        for start in 0..self.half_edges.len() {
            if visited[start] || self.half_edges[start].dead {
                continue;
            }
            let mut path = Vec::new();
            let mut h = start;
            let walk = loop {
                visited[h] = true;
                path.push(h);
                match self.half_edges[h].next {
                    Some(n) if n == start => break Walk::Closed(path),
                    Some(n) if !visited[n] && path.len() <= bound => h = n,
                    _ => break Walk::Open(path),
                }
            };
            walks.push(walk);
        }
        walks
    }

    fn segment(&self, edge: usize) -> Segment {
        let h = 2 * edge;
        Segment::new(
            self.vertices[self.half_edges[h].origin],
            self.vertices[self.dest(h)],
        )
    }
}

struct Face {
    half_edges: Vec<usize>,
    points: Vec<Point>,
    area: f64,
}

/// Extract the shells, regions and orphans of a shattered segment set.
///
/// Input segments must touch only at endpoints; run
/// [`shatter`](crate::geometry::shatter) first otherwise.
#[must_use]
pub fn extract_faces(segments: &[Segment], tol: &ToleranceConfig) -> FaceSet {
    let net = WeldedNetwork::build(segments, tol.merge);
    if net.edges.is_empty() {
        return FaceSet::default();
    }
    let mut mesh = Mesh::build(&net);
    mesh.peel_dangling();
    mesh.link_next();

    let mut orphan_edges: Vec<usize> = mesh
        .half_edges
        .iter()
        .filter(|h| h.dead)
        .map(|h| h.edge)
        .collect();

    let mut faces: Vec<Face> = Vec::new();
    for walk in mesh.trace() {
        match walk {
            Walk::Closed(half_edges) => {
                let points: Vec<Point> = half_edges
                    .iter()
                    .map(|&h| mesh.vertices[mesh.half_edges[h].origin])
                    .collect();
                let area = signed_area(&points);
                if area.abs() <= tol.merge {
                    orphan_edges.extend(half_edges.iter().map(|&h| mesh.half_edges[h].edge));
                } else {
                    faces.push(Face {
                        half_edges,
                        points,
                        area,
                    });
                }
            }
            Walk::Open(half_edges) => {
                orphan_edges.extend(half_edges.iter().map(|&h| mesh.half_edges[h].edge));
            }
        }
    }
    orphan_edges.sort_unstable();
    orphan_edges.dedup();

    // face id and position within its loop, per half-edge
    let mut owner: Vec<Option<(usize, usize)>> = vec![None; mesh.half_edges.len()];
    for (f, face) in faces.iter().enumerate() {
        for (i, &h) in face.half_edges.iter().enumerate() {
            owner[h] = Some((f, i));
        }
    }

    let mut regions: Vec<Region> = faces
        .iter()
        .enumerate()
        .map(|(f, face)| Region {
            id: f,
            label: format!("Z{f}"),
            loop_points: face.points.clone(),
            labels: face
                .half_edges
                .iter()
                .map(|&h| match owner[Mesh::twin(h)] {
                    Some((g, j)) if faces[g].area > 0.0 => format!("Z{g}::Wall_{j}"),
                    Some((g, j)) => format!("Z{g}::Outside_{j}"),
                    None => UNMATCHED_LABEL.to_owned(),
                })
                .collect(),
            area: face.area,
            holes: Vec::new(),
        })
        .collect();

    let mut components = UnionFind::<usize>::new(mesh.vertices.len());
    for h in mesh.half_edges.iter().step_by(2).filter(|h| !h.dead) {
        components.union(h.origin, mesh.dest(2 * h.edge));
    }
    let component_of: Vec<usize> = faces
        .iter()
        .map(|face| components.find(mesh.half_edges[face.half_edges[0]].origin))
        .collect();

    let nesting = nest(&mut regions, &component_of, tol);

    let mut shells = Vec::new();
    let mut pruned_regions = Vec::new();
    let mut kept = Vec::new();
    for region in regions {
        if nesting.dropped_shells.contains(&region.id) {
            continue;
        }
        if nesting.pruned.contains(&region.id) {
            pruned_regions.push(region);
        } else if region.area < 0.0 {
            shells.push(region);
        } else {
            kept.push(region);
        }
    }
    let regions = kept;

    debug!(
        shells = shells.len(),
        regions = regions.len(),
        pruned = pruned_regions.len(),
        orphans = orphan_edges.len(),
        "faces: extracted"
    );

    FaceSet {
        shells,
        regions,
        pruned: pruned_regions,
        orphans: orphan_edges.into_iter().map(|e| mesh.segment(e)).collect(),
    }
}

#[derive(Debug, Default)]
struct Nesting {
    /// Shells absorbed as holes or discarded with a pruned component.
    dropped_shells: Vec<usize>,
    /// Regions of nested components too small to keep.
    pruned: Vec<usize>,
}

/// Resolve component nesting in place.
///
/// A component whose shell lies strictly inside a region of another
/// component is attached to the smallest such region.  A nested
/// component made of a single region under `min_nested_area` is pruned
/// instead.
fn nest(faces: &mut [Region], component_of: &[usize], tol: &ToleranceConfig) -> Nesting {
    let shells: Vec<usize> = (0..faces.len()).filter(|&f| faces[f].area < 0.0).collect();
    let mut nesting = Nesting::default();

    // Parents are resolved against the untouched loops before any edit.
    let parents: Vec<(usize, Option<usize>)> = shells
        .iter()
        .map(|&s| {
            let seed = faces[s].loop_points[0];
            let parent = (0..faces.len())
                .filter(|&r| faces[r].area > 0.0 && component_of[r] != component_of[s])
                .filter(|&r| point_in_polygon(seed, &faces[r].loop_points, false, tol.merge))
                .min_by(|&a, &b| faces[a].area.total_cmp(&faces[b].area));
            (s, parent)
        })
        .collect();

    for (shell, parent) in parents {
        let Some(parent) = parent else {
            continue;
        };
        let members: Vec<usize> = (0..faces.len())
            .filter(|&r| faces[r].area > 0.0 && component_of[r] == component_of[shell])
            .collect();
        nesting.dropped_shells.push(shell);

        if let [only] = members.as_slice()
            && faces[*only].area < tol.min_nested_area
        {
            debug!(region = *only, parent, "faces: pruned small nested region");
            nesting.pruned.push(*only);
            continue;
        }

        let hole_index = faces[parent].holes.len();
        let shell_tag = format!("Z{shell}::Outside_");
        let parent_label = faces[parent].label.clone();
        for &m in &members {
            for label in &mut faces[m].labels {
                if let Some(j) = label.strip_prefix(&shell_tag) {
                    *label = format!("{parent_label}::Wall{hole_index}_{j}");
                }
            }
        }
        let hole = Hole {
            loop_points: faces[shell].loop_points.clone(),
            labels: faces[shell].labels.clone(),
        };
        faces[parent].holes.push(hole);
    }
    nesting
}
