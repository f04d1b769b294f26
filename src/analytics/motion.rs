use ndarray::ArrayView2;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    video::{self, BackgroundSubtractorTrait},
    Result as CvResult,
};

use crate::config::OccupancyConfig;
use crate::error::EngineError;

/// MOG2 background model producing a binary foreground mask per frame.
/// Frames must be fed in order; the model learns as it goes.
pub struct ForegroundExtractor {
    mog2: opencv::core::Ptr<video::BackgroundSubtractorMOG2>,
    fg_mask: Mat,
    binary: Mat,
    mask_threshold: f64,
    learning_rate: f64,
}

impl ForegroundExtractor {
    pub fn new(config: &OccupancyConfig) -> CvResult<Self> {
        let mog2 = video::create_background_subtractor_mog2(
            config.background_history,
            config.background_var_threshold,
            false,
        )?;

        Ok(Self {
            mog2,
            fg_mask: Mat::default(),
            binary: Mat::default(),
            mask_threshold: config.mask_threshold as f64,
            learning_rate: -1.0,
        })
    }

    pub fn apply(&mut self, frame: &impl opencv::core::ToInputArray) -> CvResult<&Mat> {
        BackgroundSubtractorTrait::apply(
            &mut self.mog2,
            frame,
            &mut self.fg_mask,
            self.learning_rate,
        )?;
        imgproc::threshold(
            &self.fg_mask,
            &mut self.binary,
            self.mask_threshold,
            255.0,
            imgproc::THRESH_BINARY,
        )?;
        Ok(&self.binary)
    }
}

/// Borrows a single-channel 8-bit mask as a `rows x cols` array.
pub fn mask_view(mask: &Mat) -> Result<ArrayView2<'_, u8>, EngineError> {
    let rows = mask.rows().max(0) as usize;
    let cols = mask.cols().max(0) as usize;
    let data = mask.data_bytes()?;
    Ok(ArrayView2::from_shape((rows, cols), data)?)
}
