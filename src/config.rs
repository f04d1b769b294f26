use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no zones configured")]
    NoZones,
    #[error("duplicate zone name: {0}")]
    DuplicateZone(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("{value} is outside [0, 1]")));
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("{value} must be a positive number")));
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, format!("{value} must not be negative")));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cleanup {
    /// Morphological opening followed by closing.
    #[default]
    OpenClose,
    /// Repeated dilation, merges fragmented paintwork into one blob.
    Dilate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseShape {
    #[default]
    Oriented,
    AxisAligned,
}

fn default_hsv_lower() -> [u8; 3] {
    [25, 50, 50]
}

fn default_hsv_upper() -> [u8; 3] {
    [45, 255, 255]
}

fn default_kernel_size() -> u32 {
    5
}

fn default_dilate_iterations() -> u32 {
    2
}

fn default_min_area_pixels() -> f64 {
    5000.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    #[serde(default = "default_hsv_lower")]
    pub hsv_lower: [u8; 3],
    #[serde(default = "default_hsv_upper")]
    pub hsv_upper: [u8; 3],
    #[serde(default = "default_kernel_size")]
    pub kernel_size: u32,
    #[serde(default)]
    pub cleanup: Cleanup,
    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u32,
    /// Absolute blob area floor, in pixels.
    #[serde(default = "default_min_area_pixels")]
    pub min_area_pixels: f64,
    /// Blob area floor as a fraction of the frame area.
    #[serde(default)]
    pub min_area_fraction: f64,
    #[serde(default)]
    pub shape: PoseShape,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            hsv_lower: default_hsv_lower(),
            hsv_upper: default_hsv_upper(),
            kernel_size: default_kernel_size(),
            cleanup: Cleanup::default(),
            dilate_iterations: default_dilate_iterations(),
            min_area_pixels: default_min_area_pixels(),
            min_area_fraction: 0.0,
            shape: PoseShape::default(),
        }
    }
}

impl VehicleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hsv_lower.iter().zip(&self.hsv_upper).any(|(lo, hi)| lo > hi) {
            return Err(invalid(
                "vehicle.hsv_lower",
                format!("{:?} exceeds hsv_upper {:?}", self.hsv_lower, self.hsv_upper),
            ));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(invalid(
                "vehicle.kernel_size",
                format!("{} must be odd and positive", self.kernel_size),
            ));
        }
        if self.cleanup == Cleanup::Dilate && self.dilate_iterations == 0 {
            return Err(invalid("vehicle.dilate_iterations", "must be at least 1"));
        }
        check_non_negative("vehicle.min_area_pixels", self.min_area_pixels)?;
        check_fraction("vehicle.min_area_fraction", self.min_area_fraction)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPolicy {
    /// A frame without a detection neither advances nor clears the counter.
    #[default]
    Hold,
    /// A frame without a detection clears the counter and the last pose.
    Reset,
}

fn default_stable_seconds() -> f64 {
    0.5
}

fn default_movement_tolerance() -> f64 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_stable_seconds")]
    pub stable_seconds: f64,
    /// Largest per-frame center displacement still counted as "at rest", in pixels.
    #[serde(default = "default_movement_tolerance")]
    pub movement_tolerance_px: f64,
    #[serde(default)]
    pub miss_policy: MissPolicy,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            stable_seconds: default_stable_seconds(),
            movement_tolerance_px: default_movement_tolerance(),
            miss_policy: MissPolicy::default(),
        }
    }
}

impl StabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("stability.stable_seconds", self.stable_seconds)?;
        check_positive("stability.movement_tolerance_px", self.movement_tolerance_px)
    }
}

/// Zone placed at a rotated offset from the vehicle center.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OffsetZone {
    pub name: String,
    /// Offset along the long axis, as a fraction of vehicle length.
    pub along: f64,
    /// Offset across the long axis, as a fraction of vehicle width.
    pub across: f64,
}

impl OffsetZone {
    pub fn new(name: &str, along: f64, across: f64) -> Self {
        Self {
            name: name.to_string(),
            along,
            across,
        }
    }
}

fn default_extent_fraction() -> f64 {
    0.4
}

fn default_offset_zones() -> Vec<OffsetZone> {
    vec![
        OffsetZone::new("FL_Tire", -0.35, -0.60),
        OffsetZone::new("FR_Tire", -0.35, 0.60),
        OffsetZone::new("RL_Tire", 0.35, -0.60),
        OffsetZone::new("RR_Tire", 0.35, 0.60),
        OffsetZone::new("Fuel_Rig", 0.10, -0.40),
        OffsetZone::new("Jack", 0.55, 0.00),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct OffsetLayout {
    /// Zone side length as a fraction of vehicle width.
    #[serde(default = "default_extent_fraction")]
    pub extent_fraction: f64,
    /// Rotate the zone extent with the vehicle instead of keeping it axis-aligned.
    #[serde(default)]
    pub oriented: bool,
    #[serde(default = "default_offset_zones")]
    pub zones: Vec<OffsetZone>,
}

impl Default for OffsetLayout {
    fn default() -> Self {
        Self {
            extent_fraction: default_extent_fraction(),
            oriented: false,
            zones: default_offset_zones(),
        }
    }
}

/// Zone placed relative to the vehicle's axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoxZone {
    pub name: String,
    /// Top-left corner as fractions of box width/height from the box's top-left.
    pub origin: [f64; 2],
    /// Extent as fractions of box width/height.
    pub size: [f64; 2],
    /// Extra shift in pixels.
    #[serde(default)]
    pub padding: [f64; 2],
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoxLayout {
    #[serde(default)]
    pub zones: Vec<BoxZone>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum ZoneLayout {
    Offset(OffsetLayout),
    BoundingBox(BoxLayout),
}

impl Default for ZoneLayout {
    fn default() -> Self {
        ZoneLayout::Offset(OffsetLayout::default())
    }
}

impl ZoneLayout {
    pub fn zone_names(&self) -> Vec<&str> {
        match self {
            ZoneLayout::Offset(layout) => layout.zones.iter().map(|z| z.name.as_str()).collect(),
            ZoneLayout::BoundingBox(layout) => {
                layout.zones.iter().map(|z| z.name.as_str()).collect()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = self.zone_names();
        if names.is_empty() {
            return Err(ConfigError::NoZones);
        }

        let mut seen = HashSet::new();
        for name in names {
            if name.trim().is_empty() {
                return Err(invalid("zones.name", "zone names must not be empty"));
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateZone(name.to_string()));
            }
        }

        match self {
            ZoneLayout::Offset(layout) => {
                check_positive("zones.extent_fraction", layout.extent_fraction)?;
                for zone in &layout.zones {
                    if !zone.along.is_finite() || !zone.across.is_finite() {
                        return Err(invalid("zones.offset", format!("{} is not finite", zone.name)));
                    }
                }
            }
            ZoneLayout::BoundingBox(layout) => {
                for zone in &layout.zones {
                    check_positive("zones.size", zone.size[0])?;
                    check_positive("zones.size", zone.size[1])?;
                    if zone.origin.iter().chain(&zone.padding).any(|v| !v.is_finite()) {
                        return Err(invalid("zones.origin", format!("{} is not finite", zone.name)));
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    #[default]
    MotionRatio,
    PersonOverlap,
}

fn default_motion_threshold() -> f64 {
    0.15
}

fn default_mask_threshold() -> u8 {
    200
}

fn default_background_history() -> i32 {
    500
}

fn default_background_var_threshold() -> f64 {
    50.0
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_person_class() -> String {
    "person".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OccupancyConfig {
    #[serde(default)]
    pub signal: SignalKind,
    /// Foreground fraction of a zone above which it counts as busy.
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: f64,
    /// Mask values at or below this are treated as background.
    #[serde(default = "default_mask_threshold")]
    pub mask_threshold: u8,
    #[serde(default = "default_background_history")]
    pub background_history: i32,
    #[serde(default = "default_background_var_threshold")]
    pub background_var_threshold: f64,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_person_class")]
    pub person_class: String,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            signal: SignalKind::default(),
            motion_threshold: default_motion_threshold(),
            mask_threshold: default_mask_threshold(),
            background_history: default_background_history(),
            background_var_threshold: default_background_var_threshold(),
            model_path: None,
            confidence_threshold: default_confidence_threshold(),
            person_class: default_person_class(),
        }
    }
}

impl OccupancyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("occupancy.motion_threshold", self.motion_threshold)?;
        check_fraction(
            "occupancy.confidence_threshold",
            self.confidence_threshold as f64,
        )?;
        if self.background_history <= 0 {
            return Err(invalid("occupancy.background_history", "must be positive"));
        }
        check_positive(
            "occupancy.background_var_threshold",
            self.background_var_threshold,
        )?;
        if crate::engine::class_id(&self.person_class).is_none() {
            return Err(invalid(
                "occupancy.person_class",
                format!("{:?} is not a detector class", self.person_class),
            ));
        }
        if self.signal == SignalKind::PersonOverlap {
            match &self.model_path {
                Some(path) if !path.trim().is_empty() => {}
                _ => {
                    return Err(invalid(
                        "occupancy.model_path",
                        "required when signal is person_overlap",
                    ))
                }
            }
        }
        Ok(())
    }
}

fn default_patience_seconds() -> f64 {
    0.5
}

fn default_min_duration_seconds() -> f64 {
    1.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// Idle time an active zone tolerates before its interval is closed.
    #[serde(default = "default_patience_seconds")]
    pub patience_seconds: f64,
    /// Intervals this short or shorter are discarded.
    #[serde(default = "default_min_duration_seconds")]
    pub min_duration_seconds: f64,
    /// Close zones that are still active when the input ends.
    #[serde(default)]
    pub close_open_intervals: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            patience_seconds: default_patience_seconds(),
            min_duration_seconds: default_min_duration_seconds(),
            close_open_intervals: false,
        }
    }
}

impl ActivityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("activity.patience_seconds", self.patience_seconds)?;
        check_non_negative("activity.min_duration_seconds", self.min_duration_seconds)
    }
}

fn default_progress_every() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_progress_every")]
    pub progress_every_frames: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            progress_every_frames: default_progress_every(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub zones: ZoneLayout,
    #[serde(default)]
    pub occupancy: OccupancyConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vehicle.validate()?;
        self.stability.validate()?;
        self.zones.validate()?;
        self.occupancy.validate()?;
        self.activity.validate()?;
        if self.output.progress_every_frames == 0 {
            return Err(invalid("output.progress_every_frames", "must be at least 1"));
        }
        Ok(())
    }
}
