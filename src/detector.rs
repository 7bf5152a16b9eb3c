// 该文件是 Kanjian （看见） 项目的一部分。
// src/detector.rs - 检测结果解码
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
use tracing::{debug, trace};

use crate::{label::LabelMap, model::DetectionSet};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("置信度阈值必须在 [0, 1] 内: {0}")]
  InvalidThreshold(f32),
}

/// 检测结果（像素坐标）
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
  pub xmin: i32,
  pub ymin: i32,
  pub xmax: i32,
  pub ymax: i32,
  /// 类别编号
  pub class_id: i64,
  /// 类别名称
  pub label: String,
  /// 置信度
  pub score: f32,
}

impl Detection {
  /// 坐标可能饱和到 `i32` 边界，宽高以 `i64` 计算
  pub fn width(&self) -> i64 {
    i64::from(self.xmax) - i64::from(self.xmin)
  }

  pub fn height(&self) -> i64 {
    i64::from(self.ymax) - i64::from(self.ymin)
  }
}

/// 将模型原始输出筛选、还原为像素坐标并附加类别名称
#[derive(Debug, Clone, Copy)]
pub struct Detector {
  threshold: f32,
  clip: bool,
}

impl Detector {
  pub fn new(threshold: f32) -> Result<Self, DetectorError> {
    if !(0.0..=1.0).contains(&threshold) {
      return Err(DetectorError::InvalidThreshold(threshold));
    }
    Ok(Self {
      threshold,
      clip: false,
    })
  }

  /// 是否将坐标裁剪到图像范围内，默认不裁剪
  pub fn with_clip(mut self, clip: bool) -> Self {
    self.clip = clip;
    self
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn detect(
    &self,
    height: u32,
    width: u32,
    detections: &DetectionSet,
    labels: &LabelMap,
  ) -> Vec<Detection> {
    let count = detections.valid_count();
    let mut items = Vec::new();

    for slot in 0..count {
      let score = detections.scores[slot];
      // 严格大于阈值
      if score.is_nan() || score <= self.threshold {
        continue;
      }

      let [ymin, xmin, ymax, xmax] = detections.boxes[slot];
      let mut detection = Detection {
        xmin: denormalize(xmin, width),
        ymin: denormalize(ymin, height),
        xmax: denormalize(xmax, width),
        ymax: denormalize(ymax, height),
        class_id: detections.classes[slot] as i64,
        label: String::new(),
        score,
      };
      detection.label = labels.resolve(detection.class_id);

      if self.clip {
        detection.xmin = detection.xmin.clamp(0, width as i32);
        detection.xmax = detection.xmax.clamp(0, width as i32);
        detection.ymin = detection.ymin.clamp(0, height as i32);
        detection.ymax = detection.ymax.clamp(0, height as i32);
      }

      trace!(
        "槽位 {}: {} {:.2} at ({}, {}) - ({}, {})",
        slot, detection.label, score, detection.xmin, detection.ymin, detection.xmax, detection.ymax
      );
      items.push(detection);
    }

    debug!(
      "有效槽位 {} 个，阈值 {} 以上 {} 个",
      count,
      self.threshold,
      items.len()
    );
    items
  }
}

/// 归一化坐标乘以边长后向零截断
fn denormalize(value: f32, extent: u32) -> i32 {
  (f64::from(value) * f64::from(extent)) as i32
}
