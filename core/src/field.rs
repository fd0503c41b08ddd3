//! Static field geometry.
//!
//! The field is a rectangle bounded by four axis-aligned walls. It may additionally carry interior
//! wall segments (barriers, goals) that block range sensors, and painted lines running parallel to the
//! x axis, given by their y offsets, that line sensors can detect. The geometry is immutable once the
//! filter is built and is shared with the sensor models through an `Arc`.
//!
//! Expected range measurements are computed in two parts. Against the boundary walls the distance along
//! a ray is the perpendicular distance to the wall divided by the cosine of the angle between the ray
//! and the wall normal (a secant projection), evaluated only for walls within ±90° of the ray. Against
//! interior segments a general ray/segment intersection is used.

use nalgebra::Vector2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::{INCH, LocalizationError, wrap_to_pi};

/// Half width of a standard 12 ft square competition field (m)
pub const DEFAULT_FIELD_HALF_WIDTH: f64 = 72.0 * INCH;
/// Determinant magnitude below which a ray and a segment are treated as parallel
const PARALLEL_EPSILON: f64 = 1e-12;

/// Axis-aligned bounds of the field (m)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}
impl Default for FieldBounds {
    fn default() -> Self {
        FieldBounds::square(DEFAULT_FIELD_HALF_WIDTH)
    }
}
impl FieldBounds {
    /// Square bounds centered on the origin
    pub fn square(half_width: f64) -> Self {
        FieldBounds {
            min_x: -half_width,
            min_y: -half_width,
            max_x: half_width,
            max_y: half_width,
        }
    }
    /// Inclusive containment test
    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
    pub fn center(&self) -> Vector2<f64> {
        Vector2::new(
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }
    /// Draw a point uniformly inside the bounds.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector2<f64> {
        Vector2::new(
            rng.random_range(self.min_x..=self.max_x),
            rng.random_range(self.min_y..=self.max_y),
        )
    }
    fn validate(&self) -> Result<(), LocalizationError> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(LocalizationError::InvalidField(format!(
                "bounds must be finite: {:?}",
                self
            )));
        }
        if self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(LocalizationError::InvalidField(format!(
                "bounds must have positive extent: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// A wall segment between two points (m)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: [f64; 2],
    pub end: [f64; 2],
}
impl Segment {
    pub fn new(start: Vector2<f64>, end: Vector2<f64>) -> Self {
        Segment {
            start: [start.x, start.y],
            end: [end.x, end.y],
        }
    }
    pub fn start(&self) -> Vector2<f64> {
        Vector2::new(self.start[0], self.start[1])
    }
    pub fn end(&self) -> Vector2<f64> {
        Vector2::new(self.end[0], self.end[1])
    }
    /// Distance along a ray to this segment, if the ray hits it in front of the origin.
    ///
    /// Solves `origin + t d = start + s (end - start)` for `t > 0` and `s` in `[0, 1]`.
    pub fn ray_intersection(&self, origin: &Vector2<f64>, direction: &Vector2<f64>) -> Option<f64> {
        let edge = self.end() - self.start();
        let denominator = cross(direction, &edge);
        if denominator.abs() < PARALLEL_EPSILON {
            return None;
        }
        let to_start = self.start() - origin;
        let t = cross(&to_start, &edge) / denominator;
        let s = cross(&to_start, direction) / denominator;
        if t > 0.0 && (0.0..=1.0).contains(&s) && t.is_finite() {
            Some(t)
        } else {
            None
        }
    }
}

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// One of the four boundary walls, described by its outward normal direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryWall {
    /// Direction a ray must face to hit this wall head-on (rad)
    pub normal: f64,
    /// Coordinate of the wall along its normal axis (m)
    pub offset: f64,
}
impl BoundaryWall {
    /// Perpendicular distance from a point inside the field to this wall.
    pub fn perpendicular_distance(&self, point: &Vector2<f64>) -> f64 {
        let (s, c) = self.normal.sin_cos();
        // normals are axis aligned so exactly one of the components is used
        let along = if c.abs() > s.abs() {
            point.x * c.signum()
        } else {
            point.y * s.signum()
        };
        self.offset - along
    }
}

/// Immutable description of the field the robot localizes in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub bounds: FieldBounds,
    /// Interior wall segments that block range sensors
    #[serde(default)]
    pub walls: Vec<Segment>,
    /// Y offsets of painted lines parallel to the x axis (m)
    #[serde(default)]
    pub line_offsets: Vec<f64>,
}
impl Default for FieldGeometry {
    /// Standard 12 ft field with a single painted center line
    fn default() -> Self {
        FieldGeometry {
            bounds: FieldBounds::default(),
            walls: Vec::new(),
            line_offsets: vec![0.0],
        }
    }
}
impl FieldGeometry {
    pub fn new(
        bounds: FieldBounds,
        walls: Vec<Segment>,
        line_offsets: Vec<f64>,
    ) -> Result<Self, LocalizationError> {
        let field = FieldGeometry {
            bounds,
            walls,
            line_offsets,
        };
        field.validate()?;
        Ok(field)
    }
    /// Check the geometry is usable. Deserialized geometry must be validated before use.
    pub fn validate(&self) -> Result<(), LocalizationError> {
        self.bounds.validate()?;
        if let Some(offset) = self.line_offsets.iter().find(|v| !v.is_finite()) {
            return Err(LocalizationError::InvalidField(format!(
                "line offset must be finite, got {}",
                offset
            )));
        }
        let bad_wall = self
            .walls
            .iter()
            .find(|w| !w.start.iter().chain(w.end.iter()).all(|v| v.is_finite()));
        if let Some(wall) = bad_wall {
            return Err(LocalizationError::InvalidField(format!(
                "wall endpoints must be finite, got {:?}",
                wall
            )));
        }
        Ok(())
    }
    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        self.bounds.contains(point)
    }
    /// East, north, west and south boundary walls
    pub fn boundary_walls(&self) -> [BoundaryWall; 4] {
        let b = &self.bounds;
        [
            BoundaryWall {
                normal: 0.0,
                offset: b.max_x,
            },
            BoundaryWall {
                normal: FRAC_PI_2,
                offset: b.max_y,
            },
            BoundaryWall {
                normal: PI,
                offset: -b.min_x,
            },
            BoundaryWall {
                normal: -FRAC_PI_2,
                offset: -b.min_y,
            },
        ]
    }
    /// Distance from `origin` along `bearing` to the nearest boundary wall.
    ///
    /// Each wall within ±90° of the bearing predicts `perpendicular / cos(difference)`; the smallest
    /// prediction is the wall the ray actually reaches first. Origins outside the field are clamped to
    /// zero perpendicular distance.
    pub fn boundary_distance(&self, origin: &Vector2<f64>, bearing: f64) -> f64 {
        let mut nearest = f64::INFINITY;
        for wall in self.boundary_walls() {
            let difference = wrap_to_pi(bearing - wall.normal);
            if difference.abs() >= FRAC_PI_2 {
                continue;
            }
            let perpendicular = wall.perpendicular_distance(origin).max(0.0);
            nearest = nearest.min(perpendicular / difference.cos());
        }
        nearest
    }
    /// Distance from `origin` along `bearing` to the nearest interior wall, if any is hit.
    pub fn interior_distance(&self, origin: &Vector2<f64>, bearing: f64) -> Option<f64> {
        let (s, c) = bearing.sin_cos();
        let direction = Vector2::new(c, s);
        self.walls
            .iter()
            .filter_map(|wall| wall.ray_intersection(origin, &direction))
            .reduce(f64::min)
    }
    /// Expected range reading from `origin` along `bearing`, capped at `max_range`.
    pub fn raycast(&self, origin: &Vector2<f64>, bearing: f64, max_range: f64) -> f64 {
        let mut distance = self.boundary_distance(origin, bearing);
        if let Some(interior) = self.interior_distance(origin, bearing) {
            distance = distance.min(interior);
        }
        distance.min(max_range)
    }
    /// Perpendicular distance from a y coordinate to the nearest painted line.
    ///
    /// Returns `None` if the field has no lines.
    pub fn nearest_line_distance(&self, y: f64) -> Option<f64> {
        self.line_offsets
            .iter()
            .map(|offset| (y - offset).abs())
            .reduce(f64::min)
    }
}
