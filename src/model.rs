// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 检测模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;
use tracing::warn;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

pub const DETECTION_BOXES: &str = "detection_boxes";
pub const DETECTION_CLASSES: &str = "detection_classes";
pub const DETECTION_SCORES: &str = "detection_scores";
pub const NUM_DETECTIONS: &str = "num_detections";

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出无效: {0}")]
  Parse(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("推理请求尚未提交")]
  NotStarted,
  #[cfg(feature = "tensorflow")]
  #[error("TensorFlow 错误: {0}")]
  TensorFlow(#[from] tensorflow::Status),
  #[cfg(feature = "onnxruntime")]
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
}

/// 模型原始输出：按检测槽位对齐的四组并行数据，批次大小为 1
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
  /// 归一化坐标 [ymin, xmin, ymax, xmax]
  pub boxes: Vec<[f32; 4]>,
  pub classes: Vec<f32>,
  pub scores: Vec<f32>,
  pub num_detections: f32,
}

impl DetectionSet {
  pub fn new(
    boxes: Vec<[f32; 4]>,
    classes: Vec<f32>,
    scores: Vec<f32>,
    num_detections: f32,
  ) -> Result<Self, ModelError> {
    if boxes.len() != classes.len() || boxes.len() != scores.len() {
      return Err(ModelError::Parse(format!(
        "检测槽位数量不一致: boxes={}, classes={}, scores={}",
        boxes.len(),
        classes.len(),
        scores.len()
      )));
    }

    Ok(Self {
      boxes,
      classes,
      scores,
      num_detections,
    })
  }

  /// 由展平的输出张量构建，`boxes` 每 4 个值为一个槽位
  pub fn from_flat(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    num_detections: &[f32],
  ) -> Result<Self, ModelError> {
    if boxes.len() % 4 != 0 {
      return Err(ModelError::Parse(format!(
        "{} 长度 {} 不是 4 的倍数",
        DETECTION_BOXES,
        boxes.len()
      )));
    }
    let num_detections = *num_detections
      .first()
      .ok_or_else(|| ModelError::Parse(format!("{} 为空", NUM_DETECTIONS)))?;

    let boxes = boxes
      .chunks_exact(4)
      .map(|c| [c[0], c[1], c[2], c[3]])
      .collect();

    Self::new(boxes, classes.to_vec(), scores.to_vec(), num_detections)
  }

  pub fn slot_count(&self) -> usize {
    self.boxes.len()
  }

  /// `num_detections` 向零截断后的有效槽位数，超出槽位数量时按槽位数量处理
  pub fn valid_count(&self) -> usize {
    let raw = self.num_detections;
    let count = if raw.is_nan() || raw <= 0.0 {
      0
    } else {
      raw as usize
    };

    let slots = self.slot_count();
    if count > slots {
      warn!("num_detections = {} 超过输出槽位数 {}", raw, slots);
      return slots;
    }
    count
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
  Boxes,
  Classes,
  Scores,
  NumDetections,
}

impl OutputKind {
  pub fn name(&self) -> &'static str {
    match self {
      OutputKind::Boxes => DETECTION_BOXES,
      OutputKind::Classes => DETECTION_CLASSES,
      OutputKind::Scores => DETECTION_SCORES,
      OutputKind::NumDetections => NUM_DETECTIONS,
    }
  }
}

/// 输出张量的定位方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputBinding {
  /// 按固定名称查找
  #[default]
  Named,
  /// 按输出序号查找，只对特定导出的模型有效
  Positional {
    boxes: usize,
    classes: usize,
    scores: usize,
    num_detections: usize,
  },
}

impl OutputBinding {
  /// 转换后 IR 的历史输出序号 (7, 6, 3, 4)
  pub const LEGACY_IR: OutputBinding = OutputBinding::Positional {
    boxes: 3,
    classes: 4,
    scores: 6,
    num_detections: 7,
  };

  pub fn position(&self, kind: OutputKind) -> Option<usize> {
    match *self {
      OutputBinding::Named => None,
      OutputBinding::Positional {
        boxes,
        classes,
        scores,
        num_detections,
      } => Some(match kind {
        OutputKind::Boxes => boxes,
        OutputKind::Classes => classes,
        OutputKind::Scores => scores,
        OutputKind::NumDetections => num_detections,
      }),
    }
  }
}

mod resolve;

#[cfg(feature = "tensorflow")]
mod native;
#[cfg(feature = "tensorflow")]
pub use self::native::{NativeModel, NativeModelBuilder};

#[cfg(feature = "openvino")]
mod compiled;
#[cfg(feature = "openvino")]
pub use self::compiled::{CompiledModel, CompiledModelBuilder, Device, InferRequest};

#[cfg(feature = "onnxruntime")]
mod onnx;
#[cfg(feature = "onnxruntime")]
pub use self::onnx::{OnnxModel, OnnxModelBuilder};

mod wrapper;
pub use self::wrapper::ModelWrapper;
