use ndarray::{s, ArrayView2};
use serde::Serialize;

use crate::geometry::{Point, Rect};

use super::{Zone, ZoneShape};

/// Per-frame evidence of crew presence, queried once per zone.
pub trait OccupancySignal {
    fn is_busy(&self, zone: &Zone) -> bool;
}

/// Busy when the foreground share of a zone exceeds `threshold`.
/// Non-zero mask values are foreground.
pub struct MotionRatio<'a> {
    mask: ArrayView2<'a, u8>,
    threshold: f64,
}

impl<'a> MotionRatio<'a> {
    pub fn new(mask: ArrayView2<'a, u8>, threshold: f64) -> Self {
        Self { mask, threshold }
    }

    /// Foreground pixels over in-frame zone pixels; `0.0` when the zone has
    /// no pixels inside the frame.
    pub fn ratio(&self, zone: &Zone) -> f64 {
        let (rows, cols) = self.mask.dim();
        let Some(window) = zone.shape.bounding_rect().clip_to_frame(cols, rows) else {
            return 0.0;
        };

        let (foreground, area) = match &zone.shape {
            ZoneShape::Aligned(_) => {
                let roi = self
                    .mask
                    .slice(s![window.y0..window.y1, window.x0..window.x1]);
                let foreground = roi.iter().filter(|&&v| v != 0).count();
                (foreground, window.pixel_count())
            }
            ZoneShape::Rotated(_) => {
                let mut foreground = 0usize;
                let mut area = 0usize;
                for y in window.y0..window.y1 {
                    for x in window.x0..window.x1 {
                        let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                        if zone.shape.contains(center) {
                            area += 1;
                            if self.mask[[y, x]] != 0 {
                                foreground += 1;
                            }
                        }
                    }
                }
                (foreground, area)
            }
        };

        if area == 0 {
            return 0.0;
        }
        foreground as f64 / area as f64
    }
}

impl OccupancySignal for MotionRatio<'_> {
    fn is_busy(&self, zone: &Zone) -> bool {
        self.ratio(zone) > self.threshold
    }
}

/// COCO labels, indexed by detector class id.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

pub fn class_id(name: &str) -> Option<usize> {
    COCO_CLASSES.iter().position(|c| *c == name)
}

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub class_name: String,
    pub class_id: usize,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Detection {
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

/// Busy when any detection box overlaps the zone's bounding rectangle.
pub struct BoxOverlap {
    boxes: Vec<Rect>,
}

impl BoxOverlap {
    pub fn new(boxes: Vec<Rect>) -> Self {
        Self { boxes }
    }

    pub fn from_detections(detections: &[Detection], class_name: &str) -> Self {
        Self::new(
            detections
                .iter()
                .filter(|d| d.class_name == class_name)
                .map(Detection::rect)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

impl OccupancySignal for BoxOverlap {
    fn is_busy(&self, zone: &Zone) -> bool {
        let bounds = zone.shape.bounding_rect();
        if bounds.area() <= 0.0 {
            return false;
        }
        self.boxes.iter().any(|b| b.intersects(&bounds))
    }
}
