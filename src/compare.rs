// 该文件是 Kanjian （看见） 项目的一部分。
// src/compare.rs - 两个后端输出的逐槽位比较
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

use std::fmt;

use crate::model::DetectionSet;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Comparison {
  pub native_count: usize,
  pub compiled_count: usize,
  /// 参与比较的槽位数，取两者有效数量的较小值
  pub compared_slots: usize,
  pub max_score_delta: f32,
  /// 归一化坐标的最大差值
  pub max_box_delta: f32,
  pub class_mismatches: usize,
}

impl Comparison {
  pub fn is_within(&self, tolerance: f32) -> bool {
    self.native_count == self.compiled_count
      && self.class_mismatches == 0
      && self.max_score_delta <= tolerance
      && self.max_box_delta <= tolerance
  }
}

impl fmt::Display for Comparison {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "检测数量 {} / {}，比较 {} 个槽位，最大置信度差 {:.4}，最大坐标差 {:.4}，类别不一致 {} 个",
      self.native_count,
      self.compiled_count,
      self.compared_slots,
      self.max_score_delta,
      self.max_box_delta,
      self.class_mismatches
    )
  }
}

/// NaN 参与的差值记为无穷大
fn delta(a: f32, b: f32) -> f32 {
  let d = (a - b).abs();
  if d.is_nan() { f32::INFINITY } else { d }
}

fn same_class(a: f32, b: f32) -> bool {
  !a.is_nan() && !b.is_nan() && a as i64 == b as i64
}

pub fn compare_detection_sets(native: &DetectionSet, compiled: &DetectionSet) -> Comparison {
  let native_count = native.valid_count();
  let compiled_count = compiled.valid_count();
  let compared_slots = native_count.min(compiled_count);

  let mut comparison = Comparison {
    native_count,
    compiled_count,
    compared_slots,
    ..Default::default()
  };

  for slot in 0..compared_slots {
    let score_delta = delta(native.scores[slot], compiled.scores[slot]);
    comparison.max_score_delta = comparison.max_score_delta.max(score_delta);

    let box_delta = native.boxes[slot]
      .iter()
      .zip(compiled.boxes[slot].iter())
      .map(|(&a, &b)| delta(a, b))
      .fold(0.0f32, f32::max);
    comparison.max_box_delta = comparison.max_box_delta.max(box_delta);

    if !same_class(native.classes[slot], compiled.classes[slot]) {
      comparison.class_mismatches += 1;
    }
  }

  comparison
}
