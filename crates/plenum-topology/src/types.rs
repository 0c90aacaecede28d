//! Shared types for the plenum topology core.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// A 2D point (or free vector) in plan coordinates.
///
/// The frame is y-up: counter-clockwise loops have positive signed area.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Dot product, treating both points as vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x.mul_add(other.x, self.y * other.y)
    }

    /// Z component of the 3D cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> f64 {
        self.x.mul_add(other.y, -(self.y * other.x))
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        (len > f64::EPSILON).then(|| Self::new(self.x / len, self.y / len))
    }

    /// The vector rotated 90 degrees counter-clockwise.
    #[must_use]
    pub const fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl From<Point> for geo::Coord<f64> {
    fn from(p: Point) -> Self {
        geo::coord! { x: p.x, y: p.y }
    }
}

impl From<geo::Coord<f64>> for Point {
    fn from(c: geo::Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

/// A straight line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// First endpoint.
    pub start: Point,
    /// Second endpoint.
    pub end: Point,
}

impl Segment {
    /// Create a new segment.
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Vector from `start` to `end`.
    #[must_use]
    pub fn direction(&self) -> Point {
        self.end - self.start
    }

    /// Unit direction, or `None` for a zero-length segment.
    #[must_use]
    pub fn unit_direction(&self) -> Option<Point> {
        self.direction().normalized()
    }

    /// Point at parameter `t` (0 at `start`, 1 at `end`, unclamped).
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point {
        self.start + self.direction() * t
    }

    /// Midpoint.
    #[must_use]
    pub fn midpoint(&self) -> Point {
        self.point_at(0.5)
    }

    /// The same segment traversed the other way.
    #[must_use]
    pub const fn reversed(&self) -> Self {
        Self::new(self.end, self.start)
    }

    /// Whether the endpoints coincide within `eps`.
    #[must_use]
    pub fn is_degenerate(&self, eps: f64) -> bool {
        self.length() <= eps
    }
}

impl From<Segment> for geo::Line<f64> {
    fn from(s: Segment) -> Self {
        Self::new(geo::Coord::from(s.start), geo::Coord::from(s.end))
    }
}

/// Base topology used before Steiner pruning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeAlgorithm {
    /// Kruskal minimum spanning tree.
    #[default]
    Mst,
    /// Dijkstra shortest-path tree rooted at the first source.
    Spt,
}

/// Numeric tolerances threaded through every stage.
///
/// Distances are in plan units; `angle` is in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Two points closer than this are the same vertex.
    pub merge: f64,
    /// Perpendicular distance for axis clustering.
    pub offset: f64,
    /// Angular distance for direction clustering (radians).
    pub angle: f64,
    /// Radius around an axis intersection that absorbs vertices.
    pub capture: f64,
    /// Nested components with a single region smaller than this are pruned.
    pub min_nested_area: f64,
    /// Distance for matching a source point to a tree vertex.
    pub root_match: f64,
    /// Perpendicular offset of a pseudo-root from its tree edge.
    pub root_offset: f64,
    /// Cap on enumerated terminal combinations.
    pub max_combinations: usize,
}

impl ToleranceConfig {
    /// Default vertex merge tolerance.
    pub const DEFAULT_MERGE: f64 = 1e-5;
    /// Default axis clustering offset.
    pub const DEFAULT_OFFSET: f64 = 0.5;
    /// Default direction clustering angle (5 degrees).
    pub const DEFAULT_ANGLE: f64 = 5.0 * std::f64::consts::PI / 180.0;
    /// Default intersection capture radius.
    pub const DEFAULT_CAPTURE: f64 = 0.5;
    /// Default minimum area of a nested component.
    pub const DEFAULT_MIN_NESTED_AREA: f64 = 10.0;
    /// Default source-to-vertex match distance.
    pub const DEFAULT_ROOT_MATCH: f64 = 1e-4;
    /// Default pseudo-root offset.
    pub const DEFAULT_ROOT_OFFSET: f64 = 0.5;
    /// Default cap on terminal combinations.
    pub const DEFAULT_MAX_COMBINATIONS: usize = 4096;

    /// Mean endpoint distance below which an edge snaps onto an axis.
    #[must_use]
    pub fn snap_distance(&self) -> f64 {
        0.5 * self.offset
    }

    /// Longest extension applied to a dangling vertex.
    #[must_use]
    pub fn max_extension(&self) -> f64 {
        4.0 * self.offset
    }

    /// Single-segment clusters must be longer than this to become an axis.
    #[must_use]
    pub fn axis_length_floor(&self) -> f64 {
        2.0 * self.offset
    }

    /// How far axes are extended past their ends when intersecting.
    #[must_use]
    pub fn axis_reach(&self) -> f64 {
        2.0 * self.offset
    }

    /// Check that every tolerance is finite and in range.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), PlanError> {
        let positive = [("merge", self.merge), ("offset", self.offset)];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PlanError::InvalidConfig(format!(
                    "{name} tolerance must be positive and finite, got {value}"
                )));
            }
        }
        let non_negative = [
            ("capture", self.capture),
            ("min_nested_area", self.min_nested_area),
            ("root_match", self.root_match),
            ("root_offset", self.root_offset),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PlanError::InvalidConfig(format!(
                    "{name} must be non-negative and finite, got {value}"
                )));
            }
        }
        if !(self.angle > 0.0 && self.angle < std::f64::consts::FRAC_PI_2) {
            return Err(PlanError::InvalidConfig(format!(
                "angle must be in (0, pi/2) radians, got {}",
                self.angle
            )));
        }
        if self.max_combinations == 0 {
            return Err(PlanError::InvalidConfig(
                "max_combinations must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            merge: Self::DEFAULT_MERGE,
            offset: Self::DEFAULT_OFFSET,
            angle: Self::DEFAULT_ANGLE,
            capture: Self::DEFAULT_CAPTURE,
            min_nested_area: Self::DEFAULT_MIN_NESTED_AREA,
            root_match: Self::DEFAULT_ROOT_MATCH,
            root_offset: Self::DEFAULT_ROOT_OFFSET,
            max_combinations: Self::DEFAULT_MAX_COMBINATIONS,
        }
    }
}

/// Settings for the balanced partition stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Number of partitions when no explicit sources are supplied.
    pub count: usize,
    /// Let partitions enter only at vertices matching the input sources.
    pub at_sources: bool,
    /// Decimal digits kept when rounding solver flows.
    pub flow_digits: u32,
    /// Wall-clock budget for the solver, in seconds.
    pub time_limit_secs: f64,
}

impl PartitionConfig {
    /// Default partition count.
    pub const DEFAULT_COUNT: usize = 2;
    /// Default flow rounding precision.
    pub const DEFAULT_FLOW_DIGITS: u32 = 6;
    /// Beyond this many digits rounding falls below `f64` precision.
    pub const MAX_FLOW_DIGITS: u32 = 15;
    /// Default solver time limit.
    pub const DEFAULT_TIME_LIMIT_SECS: f64 = 600.0;

    /// Check the partition settings.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidConfig`] for a zero count, too many
    /// flow digits or a non-positive time limit.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.count == 0 {
            return Err(PlanError::InvalidConfig(
                "partition count must be at least 1".to_owned(),
            ));
        }
        if self.flow_digits > Self::MAX_FLOW_DIGITS {
            return Err(PlanError::InvalidConfig(format!(
                "flow digits must be at most {}, got {}",
                Self::MAX_FLOW_DIGITS,
                self.flow_digits
            )));
        }
        if !(self.time_limit_secs.is_finite() && self.time_limit_secs > 0.0) {
            return Err(PlanError::InvalidConfig(format!(
                "time limit must be positive and finite, got {}",
                self.time_limit_secs
            )));
        }
        Ok(())
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            count: Self::DEFAULT_COUNT,
            at_sources: false,
            flow_digits: Self::DEFAULT_FLOW_DIGITS,
            time_limit_secs: Self::DEFAULT_TIME_LIMIT_SECS,
        }
    }
}

/// Configuration for a full planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Tolerances shared by all stages.
    pub tolerances: ToleranceConfig,
    /// Base topology for the Steiner tree.
    pub tree_algorithm: TreeAlgorithm,
    /// Whether to run the line regularizer before shattering.
    pub regularize: bool,
    /// Partition settings; `None` skips partitioning.
    pub partition: Option<PartitionConfig>,
}

impl PlanConfig {
    /// Validate every nested section.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidConfig`] from the first failing section.
    pub fn validate(&self) -> Result<(), PlanError> {
        self.tolerances.validate()?;
        if let Some(partition) = &self.partition {
            partition.validate()?;
        }
        Ok(())
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            tolerances: ToleranceConfig::default(),
            tree_algorithm: TreeAlgorithm::default(),
            regularize: true,
            partition: None,
        }
    }
}

/// Errors surfaced across the public boundary.
///
/// Degenerate geometry never produces an error; only invalid arguments do.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An argument violates a precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A vertex handle does not refer to a live vertex.
    #[error("unknown vertex {0}")]
    UnknownVertex(usize),

    /// Grafting did not settle within its round limit.
    #[error("graft did not converge within {rounds} rounds")]
    GraftCapExceeded {
        /// Rounds performed before giving up.
        rounds: usize,
    },
}
