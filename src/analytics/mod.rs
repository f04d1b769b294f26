mod decoder;
mod localizer;
mod motion;
#[cfg(feature = "person-detector")]
mod object;
mod overlay;
mod pipeline;

pub use decoder::{open_writer, FrameSource, VideoSource};
pub use localizer::{Candidate, VehicleLocalizer};
pub use motion::{mask_view, ForegroundExtractor};
#[cfg(feature = "person-detector")]
pub use object::PersonDetector;
pub use overlay::OverlayWriter;
pub use pipeline::{spawn_analyzer, Analyzer, RunPaths};
