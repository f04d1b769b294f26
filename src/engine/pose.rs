use serde::Serialize;

use crate::geometry::{normalize_axis_angle, Point, Rect, RotatedRect};

/// Vehicle position and orientation. `length` is always the long axis and
/// `angle` (degrees, clockwise from the image x-axis) is reduced into `[0, 180)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub center: Point,
    pub length: f64,
    pub width: f64,
    pub angle: f64,
}

impl Pose {
    /// Builds a pose from a rectangle whose first side lies along `angle`.
    /// When that side is the short one the sides are swapped and the angle
    /// turned a quarter so that `length` follows the long axis.
    pub fn from_sides(center: Point, side_along: f64, side_across: f64, angle: f64) -> Self {
        let (length, width, angle) = if side_along < side_across {
            (side_across, side_along, angle + 90.0)
        } else {
            (side_along, side_across, angle)
        };

        Self {
            center,
            length,
            width,
            angle: normalize_axis_angle(angle),
        }
    }

    pub fn axis_aligned(rect: Rect) -> Self {
        Self::from_sides(rect.center(), rect.width, rect.height, 0.0)
    }

    pub fn footprint(&self) -> RotatedRect {
        RotatedRect {
            center: self.center,
            width: self.length,
            height: self.width,
            angle: self.angle,
        }
    }

    pub fn bounding_rect(&self) -> Rect {
        self.footprint().bounding_rect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_side_becomes_length() {
        let pose = Pose::from_sides(Point::new(0.0, 0.0), 40.0, 100.0, 30.0);
        assert_eq!(pose.length, 100.0);
        assert_eq!(pose.width, 40.0);
        assert!((pose.angle - 120.0).abs() < 1e-9);

        let pose = Pose::from_sides(Point::new(0.0, 0.0), 40.0, 100.0, 120.0);
        assert!((pose.angle - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_axis_aligned_tall_box() {
        let pose = Pose::axis_aligned(Rect::new(10.0, 20.0, 50.0, 200.0));
        assert_eq!(pose.length, 200.0);
        assert!((pose.angle - 90.0).abs() < 1e-9);

        let bounds = pose.bounding_rect();
        assert!((bounds.x - 10.0).abs() < 1e-9);
        assert!((bounds.y - 20.0).abs() < 1e-9);
        assert!((bounds.width - 50.0).abs() < 1e-9);
        assert!((bounds.height - 200.0).abs() < 1e-9);
    }
}
