use opencv::{
    core::{Mat, Point, Scalar, Vector},
    imgproc,
    prelude::*,
    videoio::VideoWriter,
    Result as CvResult,
};

use crate::engine::{ZoneShape, ZoneStatus};
use crate::geometry;

use super::localizer::Candidate;

const VEHICLE_COLOR: (f64, f64, f64) = (255.0, 255.0, 0.0);
const IDLE_COLOR: (f64, f64, f64) = (0.0, 255.0, 0.0);
const ACTIVE_COLOR: (f64, f64, f64) = (0.0, 0.0, 255.0);

fn bgr(c: (f64, f64, f64)) -> Scalar {
    Scalar::new(c.0, c.1, c.2, 0.0)
}

fn to_cv(p: geometry::Point) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

fn polygon(points: &[geometry::Point]) -> Vector<Vector<Point>> {
    let ring: Vector<Point> = points.iter().copied().map(to_cv).collect();
    let mut rings = Vector::new();
    rings.push(ring);
    rings
}

/// Writes an annotated copy of the analyzed video. Drawing happens on the
/// frame after the engine consumed it.
pub struct OverlayWriter {
    writer: VideoWriter,
}

impl OverlayWriter {
    pub fn new(writer: VideoWriter) -> Self {
        Self { writer }
    }

    pub fn draw_candidate(&self, frame: &mut Mat, candidate: &Candidate) -> CvResult<()> {
        imgproc::polylines(
            frame,
            &polygon(&candidate.outline),
            true,
            bgr(VEHICLE_COLOR),
            2,
            imgproc::LINE_8,
            0,
        )
    }

    pub fn draw_zones(&self, frame: &mut Mat, zones: &[ZoneStatus<'_>]) -> CvResult<()> {
        for status in zones {
            let color = bgr(if status.active {
                ACTIVE_COLOR
            } else {
                IDLE_COLOR
            });

            match &status.zone.shape {
                ZoneShape::Aligned(rect) => {
                    imgproc::rectangle(
                        frame,
                        opencv::core::Rect::new(
                            rect.x.round() as i32,
                            rect.y.round() as i32,
                            rect.width.round() as i32,
                            rect.height.round() as i32,
                        ),
                        color,
                        2,
                        imgproc::LINE_8,
                        0,
                    )?;
                }
                ZoneShape::Rotated(rotated) => {
                    imgproc::polylines(
                        frame,
                        &polygon(&rotated.corners()),
                        true,
                        color,
                        2,
                        imgproc::LINE_8,
                        0,
                    )?;
                }
            }

            let bounds = status.zone.shape.bounding_rect();
            imgproc::put_text(
                frame,
                &status.zone.name,
                Point::new(bounds.x.round() as i32, bounds.y.round() as i32 - 5),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                color,
                1,
                imgproc::LINE_8,
                false,
            )?;
        }
        Ok(())
    }

    pub fn write(&mut self, frame: &Mat) -> CvResult<()> {
        self.writer.write(frame)
    }
}
