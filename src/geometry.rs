//! Planar geometry on pose keypoints.
//!
//! Points live in image space with y growing downward; callers scale x by the
//! frame aspect ratio so both axes share one unit.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Angle ABC at vertex `b`, in degrees. Degenerate limbs read as straight (180).
pub fn angle_at(a: Point, b: Point, c: Point) -> f64 {
    let v1 = (a.x - b.x, a.y - b.y);
    let v2 = (c.x - b.x, c.y - b.y);
    let mag1 = v1.0.hypot(v1.1);
    let mag2 = v2.0.hypot(v2.1);
    if mag1 < 1e-9 || mag2 < 1e-9 {
        return 180.0;
    }
    let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (mag1 * mag2)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Angle between `from -> to` and straight up, in degrees (0..=180).
pub fn inclination_from_vertical(from: Point, to: Point) -> f64 {
    let dx = to.x - from.x;
    let dy = from.y - to.y; // Image y grows downward
    if dx.abs() < 1e-12 && dy.abs() < 1e-12 {
        return 0.0;
    }
    dx.abs().atan2(dy).to_degrees()
}

/// Steepness of a path segment above horizontal, in degrees (0..=90).
pub fn steepness(from: Point, to: Point) -> f64 {
    let dx = (to.x - from.x).abs();
    let dy = (to.y - from.y).abs();
    if dx < 1e-12 && dy < 1e-12 {
        return 0.0;
    }
    dy.atan2(dx).to_degrees()
}

/// Rotation implied by a segment foreshortened from `reference` to `width`, in degrees.
///
/// A single face-on camera only sees the projected width, so the sign of the turn
/// is not recoverable.
pub fn rotation_from_width(width: f64, reference: f64) -> f64 {
    if reference <= 1e-9 {
        return 0.0;
    }
    (width / reference).clamp(0.0, 1.0).acos().to_degrees()
}

/// Shortest distance from `p` to the segment `a`-`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-18 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_right_angle() {
        let angle = angle_at(
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
        );
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_angle_is_straight() {
        let p = Point::new(0.3, 0.3);
        assert_eq!(angle_at(p, p, Point::new(1.0, 1.0)), 180.0);
    }

    #[test]
    fn test_inclination() {
        // Straight up in image space is decreasing y
        let up = inclination_from_vertical(Point::new(0.5, 0.6), Point::new(0.5, 0.3));
        assert!(up.abs() < 1e-9);
        let tilted = inclination_from_vertical(Point::new(0.0, 1.0), Point::new(1.0, 0.0));
        assert!((tilted - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_from_width() {
        assert_eq!(rotation_from_width(1.0, 1.0), 0.0);
        assert!((rotation_from_width(0.5, 1.0) - 60.0).abs() < 1e-9);
        assert!((rotation_from_width(0.0, 1.0) - 90.0).abs() < 1e-9);
        // Wider than reference reads as square, not NaN
        assert_eq!(rotation_from_width(1.2, 1.0), 0.0);
    }

    #[test]
    fn test_distance_to_segment() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(2.0, 0.0);
        assert!((distance_to_segment(Point::new(1.0, 1.0), a, b) - 1.0).abs() < 1e-12);
        assert!((distance_to_segment(Point::new(3.0, 0.0), a, b) - 1.0).abs() < 1e-12);
    }
}
