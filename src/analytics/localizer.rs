use opencv::{
    core::{self, Mat, Point, Scalar, Size, Vector},
    imgproc,
    prelude::*,
    Result as CvResult,
};

use crate::config::{Cleanup, PoseShape, VehicleConfig};
use crate::engine::Pose;
use crate::geometry::{self, Rect};

/// The largest color blob of a frame, as a pose plus its outline.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pose: Pose,
    pub outline: [geometry::Point; 4],
}

/// Finds the vehicle by its paint color.
pub struct VehicleLocalizer {
    lower: Scalar,
    upper: Scalar,
    kernel: Mat,
    cleanup: Cleanup,
    dilate_iterations: i32,
    min_area_pixels: f64,
    min_area_fraction: f64,
    shape: PoseShape,
    hsv: Mat,
    mask: Mat,
    scratch: Mat,
}

impl VehicleLocalizer {
    pub fn new(config: &VehicleConfig) -> CvResult<Self> {
        let [h_lo, s_lo, v_lo] = config.hsv_lower.map(f64::from);
        let [h_hi, s_hi, v_hi] = config.hsv_upper.map(f64::from);
        let k = config.kernel_size as i32;
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(k, k),
            Point::new(-1, -1),
        )?;

        Ok(Self {
            lower: Scalar::new(h_lo, s_lo, v_lo, 0.0),
            upper: Scalar::new(h_hi, s_hi, v_hi, 0.0),
            kernel,
            cleanup: config.cleanup,
            dilate_iterations: config.dilate_iterations as i32,
            min_area_pixels: config.min_area_pixels,
            min_area_fraction: config.min_area_fraction,
            shape: config.shape,
            hsv: Mat::default(),
            mask: Mat::default(),
            scratch: Mat::default(),
        })
    }

    /// Returns `None` when no blob survives the area filters.
    pub fn locate(&mut self, frame: &Mat) -> CvResult<Option<Candidate>> {
        let rows = frame.rows();
        let cols = frame.cols();
        if rows == 0 || cols == 0 {
            return Ok(None);
        }

        imgproc::cvt_color_def(frame, &mut self.hsv, imgproc::COLOR_BGR2HSV)?;
        core::in_range(&self.hsv, &self.lower, &self.upper, &mut self.mask)?;
        self.clean_mask()?;

        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours(
            &self.mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut best: Option<(f64, Vector<Point>)> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if best.as_ref().map_or(true, |(a, _)| area > *a) {
                best = Some((area, contour));
            }
        }

        let Some((area, contour)) = best else {
            return Ok(None);
        };

        let frame_area = rows as f64 * cols as f64;
        if area < self.min_area_pixels || area < self.min_area_fraction * frame_area {
            tracing::trace!(area, "largest blob below area floor");
            return Ok(None);
        }

        let pose = match self.shape {
            PoseShape::Oriented => {
                let rect = imgproc::min_area_rect(&contour)?;
                Pose::from_sides(
                    geometry::Point::new(rect.center.x as f64, rect.center.y as f64),
                    rect.size.width as f64,
                    rect.size.height as f64,
                    rect.angle as f64,
                )
            }
            PoseShape::AxisAligned => {
                let r = imgproc::bounding_rect(&contour)?;
                Pose::axis_aligned(Rect::new(
                    r.x as f64,
                    r.y as f64,
                    r.width as f64,
                    r.height as f64,
                ))
            }
        };

        tracing::trace!(area, "vehicle blob");
        Ok(Some(Candidate {
            pose,
            outline: pose.footprint().corners(),
        }))
    }

    fn clean_mask(&mut self) -> CvResult<()> {
        let anchor = Point::new(-1, -1);
        let border = imgproc::morphology_default_border_value()?;

        match self.cleanup {
            Cleanup::OpenClose => {
                imgproc::morphology_ex(
                    &self.mask,
                    &mut self.scratch,
                    imgproc::MORPH_OPEN,
                    &self.kernel,
                    anchor,
                    1,
                    core::BORDER_CONSTANT,
                    border,
                )?;
                imgproc::morphology_ex(
                    &self.scratch,
                    &mut self.mask,
                    imgproc::MORPH_CLOSE,
                    &self.kernel,
                    anchor,
                    1,
                    core::BORDER_CONSTANT,
                    border,
                )?;
            }
            Cleanup::Dilate => {
                imgproc::dilate(
                    &self.mask,
                    &mut self.scratch,
                    &self.kernel,
                    anchor,
                    self.dilate_iterations,
                    core::BORDER_CONSTANT,
                    border,
                )?;
                std::mem::swap(&mut self.mask, &mut self.scratch);
            }
        }

        Ok(())
    }
}
