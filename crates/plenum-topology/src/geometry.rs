//! Planar geometry primitives shared by every stage.
//!
//! All functions are pure.  Heavier predicates (segment intersection,
//! polygon containment, signed area) delegate to [`geo`]; the R-tree
//! used to find candidate pairs in [`shatter`] comes from [`rstar`].
//! Conversions between [`Point`] and `geo` types happen at the call
//! boundary of each function.

use std::f64::consts::{FRAC_PI_2, PI};

use geo::algorithm::line_intersection::{LineIntersection, line_intersection as geo_intersection};
use geo::line_measures::Distance;
use geo::{Area, Contains, Euclidean, Line, LineString, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

use crate::types::{Point, Segment};

/// Orthogonal projection of a point onto the line carrying a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Unclamped parameter along the segment (0 at start, 1 at end).
    pub t: f64,
    /// Foot of the perpendicular.
    pub foot: Point,
    /// Distance from the point to the foot.
    pub distance: f64,
}

impl Projection {
    /// Whether the foot lies within the segment, allowing `slack` in
    /// parameter space.
    #[must_use]
    pub fn within(&self, slack: f64) -> bool {
        self.t >= -slack && self.t <= 1.0 + slack
    }
}

/// Project `point` onto the infinite line through `segment`.
///
/// A zero-length segment projects everything onto its start with `t = 0`.
#[must_use]
pub fn project(point: Point, segment: &Segment) -> Projection {
    let d = segment.direction();
    let len_sq = d.dot(d);
    if len_sq <= f64::EPSILON * f64::EPSILON {
        return Projection {
            t: 0.0,
            foot: segment.start,
            distance: point.distance(segment.start),
        };
    }
    let t = (point - segment.start).dot(d) / len_sq;
    let foot = segment.point_at(t);
    Projection {
        t,
        foot,
        distance: point.distance(foot),
    }
}

/// Euclidean distance from `point` to the closed segment.
#[must_use]
pub fn distance_to_segment(point: Point, segment: &Segment) -> f64 {
    let line = Line::from(*segment);
    Euclidean.distance(&geo::Point::from(geo::Coord::from(point)), &line)
}

/// Perpendicular distance from `point` to the infinite line through
/// `origin` along `direction`.
///
/// `direction` need not be normalized; a zero direction yields the
/// distance to `origin`.
#[must_use]
pub fn ray_distance(point: Point, origin: Point, direction: Point) -> f64 {
    let offset = point - origin;
    direction
        .normalized()
        .map_or_else(|| offset.length(), |unit| unit.cross(offset).abs())
}

/// A point where two segments meet, with the parameter on each.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// The meeting point.
    pub point: Point,
    /// Parameter along the first segment.
    pub t1: f64,
    /// Parameter along the second segment.
    pub t2: f64,
}

/// Intersections of two closed segments.
///
/// A single crossing or touching point yields one entry.  Collinear
/// overlap yields the two ends of the shared piece (one entry if the
/// overlap is a single point).  Disjoint segments yield nothing.
#[must_use]
pub fn intersect(a: &Segment, b: &Segment) -> Vec<Intersection> {
    let to_hit = |c: geo::Coord<f64>| {
        let point = Point::from(c);
        Intersection {
            point,
            t1: project(point, a).t,
            t2: project(point, b).t,
        }
    };
    match geo_intersection(Line::from(*a), Line::from(*b)) {
        None => Vec::new(),
        Some(LineIntersection::SinglePoint { intersection, .. }) => vec![to_hit(intersection)],
        Some(LineIntersection::Collinear { intersection }) => {
            if intersection.start == intersection.end {
                vec![to_hit(intersection.start)]
            } else {
                vec![to_hit(intersection.start), to_hit(intersection.end)]
            }
        }
    }
}

/// Intersection of the infinite lines carrying two segments.
///
/// Returns `None` when the lines are parallel (or either segment is
/// degenerate).
#[must_use]
pub fn line_intersection(a: &Segment, b: &Segment) -> Option<Intersection> {
    let da = a.direction();
    let db = b.direction();
    let denom = da.cross(db);
    let scale = da.length() * db.length();
    if scale <= f64::EPSILON || denom.abs() <= 1e-12 * scale {
        return None;
    }
    let offset = b.start - a.start;
    let t1 = offset.cross(db) / denom;
    let t2 = offset.cross(da) / denom;
    Some(Intersection {
        point: a.point_at(t1),
        t1,
        t2,
    })
}

/// Signed area of a closed loop (positive when counter-clockwise).
///
/// The loop is given without a repeated closing point.
#[must_use]
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    to_polygon(points).signed_area()
}

/// Whether a loop winds clockwise.  Degenerate loops are not clockwise.
#[must_use]
pub fn is_clockwise(points: &[Point]) -> bool {
    signed_area(points) < 0.0
}

/// Point-in-polygon test for a loop without a repeated closing point.
///
/// Points within `eps` of the boundary count as inside only when
/// `include_boundary` is set.  Loops with fewer than three points
/// contain nothing.
#[must_use]
pub fn point_in_polygon(point: Point, points: &[Point], include_boundary: bool, eps: f64) -> bool {
    if points.len() < 3 {
        return false;
    }
    let on_boundary = loop_edges(points).any(|edge| distance_to_segment(point, &edge) <= eps);
    if on_boundary {
        return include_boundary;
    }
    to_polygon(points).contains(&geo::Point::from(geo::Coord::from(point)))
}

/// The closing edges of a loop, `points[i] -> points[i + 1]`, wrapping.
pub fn loop_edges(points: &[Point]) -> impl Iterator<Item = Segment> + '_ {
    let n = points.len();
    (0..n).map(move |i| Segment::new(points[i], points[(i + 1) % n]))
}

fn to_polygon(points: &[Point]) -> Polygon<f64> {
    let ring: LineString<f64> = points.iter().map(|&p| geo::Coord::from(p)).collect();
    Polygon::new(ring, vec![])
}

/// Undirected angle of a vector, normalized to `[0, pi)`.
#[must_use]
pub fn direction_angle(v: Point) -> f64 {
    let angle = v.y.atan2(v.x).rem_euclid(PI);
    // rem_euclid can round up to exactly PI for tiny negative angles.
    if angle >= PI { 0.0 } else { angle }
}

/// Angle between two undirected directions, in `[0, pi/2]`.
#[must_use]
pub fn undirected_angle(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(PI);
    if diff > FRAC_PI_2 { PI - diff } else { diff }
}

/// Counter-clockwise angle from `from` to `to`, in `[0, 2*pi)`.
#[must_use]
pub fn ccw_angle(from: Point, to: Point) -> f64 {
    let angle = from.cross(to).atan2(from.dot(to));
    if angle < 0.0 { angle + 2.0 * PI } else { angle }
}

// ---------------------------------------------------------------------------
// Shattering and deduplication
// ---------------------------------------------------------------------------

type IndexedLine = GeomWithData<Line<f64>, usize>;

/// Split every segment at every point where another segment meets it.
///
/// Pieces shorter than `eps` are dropped and coincident pieces are
/// reported once.  The output is "fully shattered": segments touch only
/// at endpoints.
#[must_use]
pub fn shatter(segments: &[Segment], eps: f64) -> Vec<Segment> {
    let live: Vec<Segment> = segments
        .iter()
        .copied()
        .filter(|s| !s.is_degenerate(eps))
        .collect();
    let tree = RTree::bulk_load(
        live.iter()
            .enumerate()
            .map(|(i, s)| IndexedLine::new(Line::from(*s), i))
            .collect(),
    );

    let mut pieces = Vec::with_capacity(live.len());
    for (i, seg) in live.iter().enumerate() {
        let query = AABB::from_corners(
            geo::Point::new(seg.start.x.min(seg.end.x) - eps, seg.start.y.min(seg.end.y) - eps),
            geo::Point::new(seg.start.x.max(seg.end.x) + eps, seg.start.y.max(seg.end.y) + eps),
        );

        let len = seg.length();
        let mut cuts = vec![0.0, 1.0];
        for candidate in tree.locate_in_envelope_intersecting(&query) {
            if candidate.data == i {
                continue;
            }
            let other = &live[candidate.data];
            for hit in intersect(seg, other) {
                cuts.push(hit.t1.clamp(0.0, 1.0));
            }
            // Near-misses within eps (endpoint touching mid-span).
            for end in [other.start, other.end] {
                let proj = project(end, seg);
                if proj.distance <= eps && proj.within(0.0) {
                    cuts.push(proj.t);
                }
            }
        }
        cuts.sort_by(f64::total_cmp);
        cuts.dedup_by(|b, a| (*b - *a) * len <= eps);
        // Dedup may have folded the end into an interior cut.
        if let Some(last) = cuts.last_mut() {
            *last = 1.0;
        }

        let mut points: Vec<Point> = cuts.iter().map(|&t| seg.point_at(t)).collect();
        points[0] = seg.start;
        if let Some(last) = points.last_mut() {
            *last = seg.end;
        }
        for pair in points.windows(2) {
            let piece = Segment::new(pair[0], pair[1]);
            if !piece.is_degenerate(eps) {
                pieces.push(piece);
            }
        }
    }

    remove_duplicate_segments(&pieces, eps)
}

/// Drop segments whose endpoints match an earlier segment in either
/// orientation.  First occurrence wins.
#[must_use]
pub fn remove_duplicate_segments(segments: &[Segment], eps: f64) -> Vec<Segment> {
    let eps_sq = eps * eps;
    let same = |a: &Segment, b: &Segment| {
        (a.start.distance_squared(b.start) <= eps_sq && a.end.distance_squared(b.end) <= eps_sq)
            || (a.start.distance_squared(b.end) <= eps_sq
                && a.end.distance_squared(b.start) <= eps_sq)
    };
    let mut kept: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments {
        if !kept.iter().any(|k| same(k, seg)) {
            kept.push(*seg);
        }
    }
    kept
}

/// Drop points within `eps` of an earlier point.  First occurrence wins.
#[must_use]
pub fn remove_duplicate_points(points: &[Point], eps: f64) -> Vec<Point> {
    let eps_sq = eps * eps;
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if !kept.iter().any(|k| k.distance_squared(p) <= eps_sq) {
            kept.push(p);
        }
    }
    kept
}
