use ndarray::{Array4, ArrayViewD};
use opencv::core::{Mat, Scalar, Size, BORDER_CONSTANT};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use crate::engine::{class_id, Detection, COCO_CLASSES};
use crate::error::EngineError;

const YOLO_INPUT_SIZE: usize = 640;

fn detector_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Detector(e.to_string())
}

/// Letterbox transform from the source frame into the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    orig_w: f32,
    orig_h: f32,
}

impl Letterbox {
    fn to_frame(&self, cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        let x = ((cx - w / 2.0) - self.pad_x) / self.scale;
        let y = ((cy - h / 2.0) - self.pad_y) / self.scale;
        let x = x.clamp(0.0, self.orig_w);
        let y = y.clamp(0.0, self.orig_h);
        let w = (w / self.scale).min(self.orig_w - x);
        let h = (h / self.scale).min(self.orig_h - y);
        (x, y, w, h)
    }
}

/// YOLO26 ONNX detector reporting boxes of one COCO class, `person` by default.
pub struct PersonDetector {
    session: Session,
    confidence_threshold: f32,
    target_class: usize,
}

impl PersonDetector {
    pub fn new(
        model_path: &str,
        confidence_threshold: f32,
        class_name: &str,
    ) -> Result<Self, EngineError> {
        let target_class = class_id(class_name)
            .ok_or_else(|| EngineError::Detector(format!("unknown class {class_name:?}")))?;

        let builder = Session::builder()
            .map_err(detector_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(detector_error)?
            .with_intra_threads(4)
            .map_err(detector_error)?;

        let session = if model_path.starts_with("http://") || model_path.starts_with("https://") {
            builder.commit_from_url(model_path)
        } else {
            builder.commit_from_file(model_path)
        }
        .map_err(detector_error)?;

        tracing::info!(model = %model_path, class = class_name, "detector loaded");

        Ok(Self {
            session,
            confidence_threshold,
            target_class,
        })
    }

    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, EngineError> {
        if frame.rows() == 0 || frame.cols() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(frame)?;
        let tensor = TensorRef::from_array_view(input.view())
            .map_err(detector_error)?
            .into_dyn();
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(detector_error)?;

        let (Some(logits), Some(boxes)) = (outputs.get("logits"), outputs.get("pred_boxes")) else {
            return Err(EngineError::Detector(
                "expected YOLO26 outputs 'logits' and 'pred_boxes'".to_string(),
            ));
        };

        let logits = logits
            .try_extract_array::<f32>()
            .map_err(detector_error)?
            .to_owned();
        let boxes = boxes
            .try_extract_array::<f32>()
            .map_err(detector_error)?
            .to_owned();
        drop(outputs);

        postprocess(
            &logits.view(),
            &boxes.view(),
            self.confidence_threshold,
            self.target_class,
            letterbox,
        )
    }
}

fn preprocess(frame: &Mat) -> Result<(Array4<f32>, Letterbox), EngineError> {
    let rows = frame.rows() as f32;
    let cols = frame.cols() as f32;
    let input_size = YOLO_INPUT_SIZE as f32;

    let scale = (input_size / cols).min(input_size / rows);
    let new_w = (cols * scale).round() as i32;
    let new_h = (rows * scale).round() as i32;

    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(new_w, new_h),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let pad_x = (YOLO_INPUT_SIZE as i32 - new_w) / 2;
    let pad_y = (YOLO_INPUT_SIZE as i32 - new_h) / 2;

    let mut padded = Mat::default();
    opencv::core::copy_make_border(
        &resized,
        &mut padded,
        pad_y,
        YOLO_INPUT_SIZE as i32 - new_h - pad_y,
        pad_x,
        YOLO_INPUT_SIZE as i32 - new_w - pad_x,
        BORDER_CONSTANT,
        Scalar::new(114.0, 114.0, 114.0, 0.0),
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(&padded, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let data = rgb.data_bytes()?;
    if data.len() < YOLO_INPUT_SIZE * YOLO_INPUT_SIZE * 3 {
        return Err(EngineError::Detector("frame data too small".to_string()));
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE));
    for y in 0..YOLO_INPUT_SIZE {
        for x in 0..YOLO_INPUT_SIZE {
            let idx = (y * YOLO_INPUT_SIZE + x) * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = data[idx + c] as f32 / 255.0;
            }
        }
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: cols,
            orig_h: rows,
        },
    ))
}

// logits [1, N, C] and boxes [1, N, 4] with normalized (cx, cy, w, h).
fn postprocess(
    logits: &ArrayViewD<f32>,
    boxes: &ArrayViewD<f32>,
    confidence_threshold: f32,
    target_class: usize,
    letterbox: Letterbox,
) -> Result<Vec<Detection>, EngineError> {
    let shape = logits.shape();
    if shape.len() < 2 || boxes.shape().len() < 2 {
        return Ok(Vec::new());
    }
    let (num_detections, num_classes) = if shape.len() == 3 {
        (shape[1], shape[2])
    } else {
        (shape[0], shape[1])
    };
    if num_classes <= target_class {
        return Ok(Vec::new());
    }

    let logits = logits
        .as_slice()
        .ok_or_else(|| EngineError::Detector("logits are not contiguous".to_string()))?;
    let boxes = boxes
        .as_slice()
        .ok_or_else(|| EngineError::Detector("boxes are not contiguous".to_string()))?;
    if logits.len() < num_detections * num_classes || boxes.len() < num_detections * 4 {
        return Ok(Vec::new());
    }

    let input_size = YOLO_INPUT_SIZE as f32;
    let mut detections = Vec::new();

    for i in 0..num_detections {
        let row = &logits[i * num_classes..(i + 1) * num_classes];
        let (best_class, best_logit) = row
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (j, l)| if l > acc.1 { (j, l) } else { acc });

        if best_class != target_class {
            continue;
        }
        let score = 1.0 / (1.0 + (-best_logit).exp());
        if score < confidence_threshold {
            continue;
        }

        let b = &boxes[i * 4..i * 4 + 4];
        let (x, y, width, height) = letterbox.to_frame(
            b[0] * input_size,
            b[1] * input_size,
            b[2] * input_size,
            b[3] * input_size,
        );

        detections.push(Detection {
            class_name: COCO_CLASSES[best_class].to_string(),
            class_id: best_class,
            confidence: score,
            x,
            y,
            width,
            height,
        });
    }

    Ok(detections)
}
