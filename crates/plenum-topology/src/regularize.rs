//! Line regularization: cluster near-parallel, near-collinear segments
//! into canonical axes and snap the network onto them.
//!
//! The pass runs in four stages over a welded vertex table:
//!
//! 1. **Directions.**  Segments are greedily bundled by undirected angle.
//!    A bundle's direction is the angle carrying the most length.
//! 2. **Axes.**  Within each direction, quality-threshold clustering by
//!    perpendicular offset, then a split by gaps along the direction.
//!    Each cluster yields one axis through the member whose "swept area"
//!    (projected length times mean offset of the others) is smallest.
//! 3. **Snap and extend.**  Edges close to a parallel axis move onto it;
//!    dangling vertices extend along their edge to the first boundary hit.
//! 4. **Collapse.**  Vertices near a pairwise axis intersection merge into
//!    it, dragging paired dangling endpoints along rigidly.
//!
//! Malformed input never fails: it yields an empty or partial result.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{
    direction_angle, distance_to_segment, line_intersection, project, undirected_angle,
};
use crate::types::{Point, Segment, ToleranceConfig};
use crate::weld::WeldedNetwork;

/// Angles closer than this count as the same member angle when weighting
/// a direction bundle.
const SAME_ANGLE: f64 = 1e-9;

/// A dominant direction shared by a bundle of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    /// Undirected angle in `[0, pi)`.
    pub angle: f64,
    /// Indices of the member segments.
    pub members: Vec<usize>,
}

impl Direction {
    /// Unit vector along the direction.
    #[must_use]
    pub fn vector(&self) -> Point {
        Point::new(self.angle.cos(), self.angle.sin())
    }
}

/// A canonical line standing in for a cluster of near-collinear segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// The axis extent, aligned exactly to its direction.
    pub line: Segment,
    /// Undirected angle of the owning direction.
    pub angle: f64,
    /// Indices of the member segments.
    pub members: Vec<usize>,
}

/// Output of a regularization pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Regularized {
    /// The snapped segment set, one segment per surviving edge.
    pub segments: Vec<Segment>,
    /// Dominant directions of the welded input.
    pub directions: Vec<Direction>,
    /// Canonical axes across all directions.
    pub axes: Vec<Axis>,
    /// Pairwise axis intersections used for collapse.
    pub intersections: Vec<Point>,
}

/// Regularize `segments` using their own axes as the extension boundary.
#[must_use]
pub fn regularize(segments: &[Segment], tol: &ToleranceConfig) -> Regularized {
    run(segments, None, tol)
}

/// Regularize `segments`, extending dangling vertices to `boundary`.
#[must_use]
pub fn regularize_with_boundary(
    segments: &[Segment],
    boundary: &[Segment],
    tol: &ToleranceConfig,
) -> Regularized {
    run(segments, Some(boundary), tol)
}

fn run(segments: &[Segment], boundary: Option<&[Segment]>, tol: &ToleranceConfig) -> Regularized {
    let net = WeldedNetwork::build(segments, tol.merge);
    if net.edges.is_empty() {
        return Regularized::default();
    }
    let welded: Vec<Segment> = (0..net.edges.len()).map(|e| net.segment(e)).collect();

    let directions = find_directions(&welded, tol);
    let axes: Vec<Axis> = directions
        .iter()
        .flat_map(|d| find_axes(&welded, d, tol))
        .collect();
    debug!(
        segments = welded.len(),
        directions = directions.len(),
        axes = axes.len(),
        "regularize: clustered"
    );

    let mut table = VertexTable::new(&net);
    let snapped = table.snap(&axes, tol);

    let axis_lines: Vec<Segment> = axes.iter().map(|a| a.line).collect();
    let extended = table.extend(boundary.unwrap_or(&axis_lines), tol);

    let intersections = axis_intersections(&axes, tol);
    let absorbed = table.collapse(&intersections, tol);
    debug!(snapped, extended, absorbed, "regularize: adjusted vertices");

    Regularized {
        segments: table.segments(tol.merge),
        directions,
        axes,
        intersections,
    }
}

// ---------------------------------------------------------------------------
// Direction discovery
// ---------------------------------------------------------------------------

/// Bundle segments by undirected angle.
///
/// A segment joins the first bundle whose mean angular distance to its
/// members is below `tol.angle`; otherwise it starts a new bundle.
/// Zero-length segments belong to no bundle.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn find_directions(segments: &[Segment], tol: &ToleranceConfig) -> Vec<Direction> {
    let angles: Vec<f64> = segments
        .iter()
        .map(|s| direction_angle(s.direction()))
        .collect();

    let mut bundles: Vec<Vec<usize>> = Vec::new();
    for (i, seg) in segments.iter().enumerate() {
        if seg.is_degenerate(tol.merge) {
            continue;
        }
        let fit = bundles.iter().position(|members| {
            let total: f64 = members
                .iter()
                .map(|&m| undirected_angle(angles[i], angles[m]))
                .sum();
            total / (members.len() as f64) < tol.angle
        });
        match fit {
            Some(b) => bundles[b].push(i),
            None => bundles.push(vec![i]),
        }
    }

    bundles
        .into_iter()
        .map(|members| Direction {
            angle: dominant_angle(&members, &angles, segments),
            members,
        })
        .collect()
}

/// The member angle with the greatest summed length; first wins ties.
fn dominant_angle(members: &[usize], angles: &[f64], segments: &[Segment]) -> f64 {
    let mut weights: Vec<(f64, f64)> = Vec::new();
    for &m in members {
        let angle = angles[m];
        let length = segments[m].length();
        match weights
            .iter_mut()
            .find(|(a, _)| undirected_angle(*a, angle) <= SAME_ANGLE)
        {
            Some(entry) => entry.1 += length,
            None => weights.push((angle, length)),
        }
    }
    let mut best = (0.0, f64::NEG_INFINITY);
    for (angle, weight) in weights {
        if weight > best.1 {
            best = (angle, weight);
        }
    }
    best.0
}

// ---------------------------------------------------------------------------
// Axis extraction
// ---------------------------------------------------------------------------

/// Extract the canonical axes of one direction bundle.
///
/// Considers every segment within `tol.angle` of `direction`, not only
/// the bundle members, so a segment can contribute to axes of the
/// direction it is closest to.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn find_axes(segments: &[Segment], direction: &Direction, tol: &ToleranceConfig) -> Vec<Axis> {
    let dir = direction.vector();
    let normal = dir.perp();
    let offset = |i: usize| segments[i].midpoint().dot(normal);

    let candidates = segments.iter().enumerate().filter(|(_, s)| {
        !s.is_degenerate(tol.merge)
            && undirected_angle(direction_angle(s.direction()), direction.angle) < tol.angle
    });

    // Quality-threshold clustering on perpendicular offset.
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (i, _) in candidates {
        let oi = offset(i);
        let mut best: Option<(usize, f64)> = None;
        for (c, members) in clusters.iter().enumerate() {
            let dists = members.iter().map(|&m| (offset(m) - oi).abs());
            let max = dists.clone().fold(0.0, f64::max);
            if max > tol.offset {
                continue;
            }
            let mean = dists.sum::<f64>() / members.len() as f64;
            if best.is_none_or(|(_, b)| mean < b) {
                best = Some((c, mean));
            }
        }
        match best {
            Some((c, _)) => clusters[c].push(i),
            None => clusters.push(vec![i]),
        }
    }

    clusters
        .iter()
        .flat_map(|cluster| split_by_gaps(segments, cluster, dir, tol.offset))
        .filter_map(|run| build_axis(segments, run, direction, tol))
        .collect()
}

/// Split an offset cluster into runs whose spans along `dir` overlap once
/// each span is grown by `reach` at both ends.
fn split_by_gaps(
    segments: &[Segment],
    cluster: &[usize],
    dir: Point,
    reach: f64,
) -> Vec<Vec<usize>> {
    let span = |i: usize| {
        let a = segments[i].start.dot(dir);
        let b = segments[i].end.dot(dir);
        (a.min(b), a.max(b))
    };
    let mut order: Vec<usize> = cluster.to_vec();
    order.sort_by(|&a, &b| span(a).0.total_cmp(&span(b).0));

    let mut runs: Vec<Vec<usize>> = Vec::new();
    let mut run_end = f64::NEG_INFINITY;
    for i in order {
        let (lo, hi) = span(i);
        match runs.last_mut() {
            Some(run) if lo - reach <= run_end + reach => {
                run.push(i);
                run_end = run_end.max(hi);
            }
            _ => {
                runs.push(vec![i]);
                run_end = hi;
            }
        }
    }
    for run in &mut runs {
        run.sort_unstable();
    }
    runs
}

fn build_axis(
    segments: &[Segment],
    members: Vec<usize>,
    direction: &Direction,
    tol: &ToleranceConfig,
) -> Option<Axis> {
    let origin = match members.as_slice() {
        [] => return None,
        [only] => {
            let seg = &segments[*only];
            if seg.length() <= tol.axis_length_floor() {
                return None;
            }
            seg.midpoint()
        }
        _ => extended_baseline_midpoint(segments, &members),
    };

    let dir = direction.vector();
    let params = members
        .iter()
        .flat_map(|&m| [segments[m].start, segments[m].end])
        .map(|p| (p - origin).dot(dir));
    let (lo, hi) = params.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
        (lo.min(t), hi.max(t))
    });
    let line = Segment::new(origin + dir * lo, origin + dir * hi);
    if line.is_degenerate(tol.merge) {
        return None;
    }
    Some(Axis {
        line,
        angle: direction.angle,
        members,
    })
}

/// Midpoint of the minimum-swept-area baseline, extended to cover the
/// projections of every member.
fn extended_baseline_midpoint(segments: &[Segment], members: &[usize]) -> Point {
    let swept = |b: usize| -> f64 {
        let base = &segments[b];
        members
            .iter()
            .filter(|&&m| m != b)
            .map(|&m| {
                let p0 = project(segments[m].start, base);
                let p1 = project(segments[m].end, base);
                (p1.t - p0.t).abs() * base.length() * (p0.distance + p1.distance) / 2.0
            })
            .sum()
    };

    let mut baseline = members[0];
    let mut best = swept(baseline);
    for &m in &members[1..] {
        let area = swept(m);
        if area < best {
            best = area;
            baseline = m;
        }
    }

    let base = &segments[baseline];
    let (lo, hi) = members
        .iter()
        .flat_map(|&m| [segments[m].start, segments[m].end])
        .map(|p| project(p, base).t)
        .fold((0.0_f64, 1.0_f64), |(lo, hi), t| (lo.min(t), hi.max(t)));
    base.point_at((lo + hi) / 2.0)
}

/// Intersections of every pair of non-parallel axes, each axis grown by
/// `tol.axis_reach()` at both ends.  Points closer than `tol.merge` to an
/// earlier intersection are dropped.
#[must_use]
pub fn axis_intersections(axes: &[Axis], tol: &ToleranceConfig) -> Vec<Point> {
    let grown: Vec<Segment> = axes
        .iter()
        .map(|a| grow(&a.line, tol.axis_reach()))
        .collect();
    let mut points: Vec<Point> = Vec::new();
    for i in 0..axes.len() {
        for j in (i + 1)..axes.len() {
            if undirected_angle(axes[i].angle, axes[j].angle) < tol.angle {
                continue;
            }
            let Some(hit) = line_intersection(&grown[i], &grown[j]) else {
                continue;
            };
            let inside = |t: f64| (0.0..=1.0).contains(&t);
            if inside(hit.t1)
                && inside(hit.t2)
                && !points.iter().any(|p| p.distance(hit.point) <= tol.merge)
            {
                points.push(hit.point);
            }
        }
    }
    points
}

fn grow(line: &Segment, by: f64) -> Segment {
    line.unit_direction().map_or(*line, |u| {
        Segment::new(line.start - u * by, line.end + u * by)
    })
}

// ---------------------------------------------------------------------------
// Vertex table
// ---------------------------------------------------------------------------

/// Mutable vertex positions plus adjacency sets.
///
/// Merged vertices stay in the arena as tombstones so ids stay stable.
struct VertexTable {
    points: Vec<Point>,
    adjacency: Vec<BTreeSet<usize>>,
    alive: Vec<bool>,
}

impl VertexTable {
    fn new(net: &WeldedNetwork) -> Self {
        let mut adjacency = vec![BTreeSet::new(); net.vertices.len()];
        for &(a, b) in &net.edges {
            adjacency[a].insert(b);
            adjacency[b].insert(a);
        }
        Self {
            points: net.vertices.clone(),
            alive: vec![true; net.vertices.len()],
            adjacency,
        }
    }

    /// Live edges as `(lower, higher)` pairs in ascending order.
    fn edges(&self) -> Vec<(usize, usize)> {
        self.adjacency
            .iter()
            .enumerate()
            .filter(|(v, _)| self.alive[*v])
            .flat_map(|(v, ns)| ns.iter().filter(move |&&n| n > v).map(move |&n| (v, n)))
            .collect()
    }

    fn degree(&self, v: usize) -> usize {
        self.adjacency[v].len()
    }

    /// Move both endpoints of each edge onto the longest parallel axis
    /// whose span contains their projections and whose mean distance is
    /// below the snap distance.  Returns the number of edges snapped.
    fn snap(&mut self, axes: &[Axis], tol: &ToleranceConfig) -> usize {
        let mut snapped = 0;
        for (u, v) in self.edges() {
            let seg = Segment::new(self.points[u], self.points[v]);
            let angle = direction_angle(seg.direction());
            let mut best: Option<(f64, Point, Point)> = None;
            for axis in axes {
                if undirected_angle(angle, axis.angle) >= tol.angle {
                    continue;
                }
                let slack = tol.merge / axis.line.length();
                let pu = project(seg.start, &axis.line);
                let pv = project(seg.end, &axis.line);
                if !(pu.within(slack) && pv.within(slack)) {
                    continue;
                }
                if (pu.distance + pv.distance) / 2.0 >= tol.snap_distance() {
                    continue;
                }
                let length = axis.line.length();
                if best.is_none_or(|(l, _, _)| length > l) {
                    best = Some((length, pu.foot, pv.foot));
                }
            }
            if let Some((_, fu, fv)) = best {
                self.points[u] = fu;
                self.points[v] = fv;
                snapped += 1;
            }
        }
        snapped
    }

    /// Extend each dangling vertex along its edge to the first boundary
    /// crossing of the outward ray, within `tol.max_extension()`.
    /// Returns the number of vertices moved.
    fn extend(&mut self, boundary: &[Segment], tol: &ToleranceConfig) -> usize {
        let mut moved = 0;
        for v in 0..self.points.len() {
            if !self.alive[v] || self.degree(v) != 1 {
                continue;
            }
            let Some(&n) = self.adjacency[v].first() else {
                continue;
            };
            let tip = self.points[v];
            if boundary
                .iter()
                .any(|b| distance_to_segment(tip, b) <= tol.merge)
            {
                continue;
            }
            let edge = Segment::new(self.points[n], tip);
            let length = edge.length();
            if length <= tol.merge {
                continue;
            }

            let mut best: Option<(f64, Point)> = None;
            for b in boundary {
                let Some(hit) = line_intersection(&edge, b) else {
                    continue;
                };
                let slack = tol.merge / b.length().max(f64::EPSILON);
                if hit.t2 < -slack || hit.t2 > 1.0 + slack {
                    continue;
                }
                let reach = (hit.t1 - 1.0) * length;
                if reach <= tol.merge || reach > tol.max_extension() {
                    continue;
                }
                if best.is_none_or(|(r, _)| reach < r) {
                    best = Some((reach, hit.point));
                }
            }
            if let Some((_, point)) = best {
                self.points[v] = point;
                moved += 1;
            }
        }
        moved
    }

    /// Absorb vertices within `tol.capture` of each intersection.
    ///
    /// The lowest captured id survives and takes the intersection
    /// position; the others hand it their adjacency.  A dangling
    /// neighbor of a moved vertex is translated by the same vector unless
    /// an intersection will capture it directly.
    /// Returns the number of vertices absorbed.
    fn collapse(&mut self, intersections: &[Point], tol: &ToleranceConfig) -> usize {
        let pinned: Vec<bool> = self
            .points
            .iter()
            .map(|p| intersections.iter().any(|x| p.distance(*x) <= tol.capture))
            .collect();
        let mut absorbed = 0;
        for &x in intersections {
            let captured: Vec<usize> = (0..self.points.len())
                .filter(|&v| self.alive[v] && self.points[v].distance(x) <= tol.capture)
                .collect();
            let Some((&base, rest)) = captured.split_first() else {
                continue;
            };

            for &c in &captured {
                let delta = x - self.points[c];
                if delta.length() <= f64::EPSILON {
                    continue;
                }
                let strays: Vec<usize> = self.adjacency[c]
                    .iter()
                    .copied()
                    .filter(|&n| self.degree(n) == 1 && !pinned[n])
                    .collect();
                for n in strays {
                    self.points[n] = self.points[n] + delta;
                }
            }

            self.points[base] = x;
            for &other in rest {
                let neighbors = std::mem::take(&mut self.adjacency[other]);
                for n in neighbors {
                    self.adjacency[n].remove(&other);
                    if n != base {
                        self.adjacency[n].insert(base);
                        self.adjacency[base].insert(n);
                    }
                }
                self.alive[other] = false;
                absorbed += 1;
            }
        }
        absorbed
    }

    /// Emit one segment per live edge, dropping edges shorter than `eps`.
    fn segments(&self, eps: f64) -> Vec<Segment> {
        self.edges()
            .into_iter()
            .map(|(a, b)| Segment::new(self.points[a], self.points[b]))
            .filter(|s| !s.is_degenerate(eps))
            .collect()
    }
}
