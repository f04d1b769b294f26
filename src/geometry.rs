use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

/// Rotates an offset by `angle_deg` (clockwise in image coordinates, y down).
pub fn rotate_offset(dx: f64, dy: f64, angle_deg: f64) -> (f64, f64) {
    let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();
    (dx * cos_a - dy * sin_a, dx * sin_a + dy * cos_a)
}

/// Reduces an undirected axis angle into `[0, 180)`.
pub fn normalize_axis_angle(angle_deg: f64) -> f64 {
    let a = angle_deg.rem_euclid(180.0);
    if a >= 180.0 {
        0.0
    } else {
        a
    }
}

/// Axis-aligned rectangle in pixel coordinates; `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            width,
            height,
        )
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Strict AABB overlap; rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Pixel window covered by this rectangle inside a `frame_width` x
    /// `frame_height` grid, or `None` when nothing is left after clamping.
    pub fn clip_to_frame(&self, frame_width: usize, frame_height: usize) -> Option<PixelWindow> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return None;
        }

        let x0 = self.x.round().clamp(0.0, frame_width as f64) as usize;
        let y0 = self.y.round().clamp(0.0, frame_height as f64) as usize;
        let x1 = self.right().round().clamp(0.0, frame_width as f64) as usize;
        let y1 = self.bottom().round().clamp(0.0, frame_height as f64) as usize;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(PixelWindow { x0, y0, x1, y1 })
    }
}

/// Half-open pixel range `[x0, x1) x [y0, y1)`, always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl PixelWindow {
    pub fn pixel_count(&self) -> usize {
        (self.x1 - self.x0) * (self.y1 - self.y0)
    }
}

/// Rectangle of `width` x `height` centered on `center`, rotated by `angle` degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedRect {
    pub fn corners(&self) -> [Point; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)].map(|(dx, dy)| {
            let (rx, ry) = rotate_offset(dx, dy, self.angle);
            self.center.offset(rx, ry)
        })
    }

    pub fn bounding_rect(&self) -> Rect {
        let (sin_a, cos_a) = self.angle.to_radians().sin_cos();
        let w = self.width * cos_a.abs() + self.height * sin_a.abs();
        let h = self.width * sin_a.abs() + self.height * cos_a.abs();
        Rect::centered(self.center, w, h)
    }

    pub fn contains(&self, p: Point) -> bool {
        // Undo the rotation, then test against the unrotated half-extents.
        let (lx, ly) = rotate_offset(p.x - self.center.x, p.y - self.center.y, -self.angle);
        lx.abs() <= self.width / 2.0 && ly.abs() <= self.height / 2.0
    }
}
