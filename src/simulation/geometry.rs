//! Geometry and mobility.
//!
//! Contains helper functions for:
//! - Distance calculations (squared distance to avoid sqrt in hot paths)
//! - World-unit to meter conversion
//! - Euler integration with elastic reflection at the world margin

use super::types::{Bounds, Node, Point};

/// Squared Euclidean distance in world units.
///
/// Used when only comparing distances; see [`distance`] when the actual value
/// is needed for the propagation model.
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Euclidean distance in world units.
pub fn distance(a: &Point, b: &Point) -> f64 {
    distance2(a, b).sqrt()
}

/// Convert a world-unit distance to meters.
pub fn units_to_meters(units: f64, meters_per_unit: f64) -> f64 {
    units * meters_per_unit
}

/// Reflect one coordinate at the `[min, max]` walls.
///
/// Returns the clamped coordinate and velocity component. Touching a wall
/// counts as a collision, so the velocity flips there too.
fn reflect(coordinate: f64, velocity: f64, min: f64, max: f64) -> (f64, f64) {
    if coordinate <= min || coordinate >= max {
        (coordinate.clamp(min, max), -velocity)
    } else {
        (coordinate, velocity)
    }
}

impl Node {
    /// Advance the node by explicit Euler integration and bounce off the margin.
    ///
    /// `delta_secs` is the effective tick duration (speed multiplier already
    /// applied). Velocity is only ever negated, never otherwise changed.
    pub fn move_within(&mut self, bounds: &Bounds, delta_secs: f64) {
        let x = self.position.x + self.velocity.x * delta_secs;
        let y = self.position.y + self.velocity.y * delta_secs;

        let (x, vx) = reflect(x, self.velocity.x, bounds.min_x(), bounds.max_x());
        let (y, vy) = reflect(y, self.velocity.y, bounds.min_y(), bounds.max_y());

        self.position = Point { x, y };
        self.velocity.x = vx;
        self.velocity.y = vy;
    }
}
