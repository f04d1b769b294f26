use std::path::Path;

use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};

use crate::error::EngineError;

/// Ordered frames at a constant rate.
pub trait FrameSource {
    fn fps(&self) -> f64;

    /// Expected number of frames; `0` when unknown.
    fn frame_count(&self) -> u64;

    /// The next frame, or `None` at end of input.
    fn next_frame(&mut self) -> Result<Option<&mut Mat>, EngineError>;
}

/// Sequential frame reader over a video file.
pub struct VideoSource {
    capture: VideoCapture,
    fps: f64,
    frame_count: u64,
    size: Size,
    frame: Mat,
}

impl VideoSource {
    /// Opens `path`; `fps_override` replaces a missing or bogus container rate.
    pub fn open(path: &Path, fps_override: Option<f64>) -> Result<Self, EngineError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| EngineError::Open(format!("non UTF-8 path {}", path.display())))?;

        let capture = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(EngineError::Open(path.display().to_string()));
        }

        let fps = match fps_override {
            Some(fps) => fps,
            None => capture.get(videoio::CAP_PROP_FPS)?,
        };
        if !fps.is_finite() || fps <= 0.0 {
            return Err(EngineError::InvalidFrameRate(fps));
        }

        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
        let size = Size::new(
            capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32,
            capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32,
        );

        tracing::info!(
            path = %path.display(),
            fps = format!("{:.2}", fps),
            frames = frame_count,
            width = size.width,
            height = size.height,
            "video opened"
        );

        Ok(Self {
            capture,
            fps,
            frame_count,
            size,
            frame: Mat::default(),
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }
}

impl FrameSource for VideoSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    /// Container frame count; `0` when the container does not say.
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn next_frame(&mut self) -> Result<Option<&mut Mat>, EngineError> {
        if !self.capture.read(&mut self.frame)? || self.frame.empty() {
            return Ok(None);
        }
        Ok(Some(&mut self.frame))
    }
}

/// Opens a writer matching the source geometry: MJPG for `.avi`, mp4v otherwise.
pub fn open_writer(path: &Path, fps: f64, size: Size) -> Result<VideoWriter, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Open(format!("non UTF-8 path {}", path.display())))?;
    let fourcc = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("avi") => VideoWriter::fourcc('M', 'J', 'P', 'G')?,
        _ => VideoWriter::fourcc('m', 'p', '4', 'v')?,
    };
    let writer = VideoWriter::new(path_str, fourcc, fps, size, true)?;
    if !writer.is_opened()? {
        return Err(EngineError::Open(path.display().to_string()));
    }
    Ok(writer)
}
