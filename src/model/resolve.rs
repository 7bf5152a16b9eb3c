// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/resolve.rs - 按输出定位方式读取四组检测输出
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

use tracing::debug;

use crate::model::{DetectionSet, ModelError, OutputBinding, OutputKind};

/// 单个输出张量的形状与数据
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct OutputTensor {
  pub shape: Vec<i64>,
  pub data: Vec<f32>,
}

/// 推理后端的输出集合
pub(crate) trait OutputSource {
  /// 输出数量，后端无法给出时为 `None`
  fn output_count(&self) -> Option<usize>;
  fn by_name(&self, name: &str) -> Result<Option<OutputTensor>, ModelError>;
  fn by_index(&self, index: usize) -> Result<OutputTensor, ModelError>;
}

/// 已按名称取出的输出
#[cfg_attr(not(feature = "tensorflow"), allow(dead_code))]
#[derive(Debug, Clone, Default)]
pub(crate) struct NamedOutputs {
  outputs: Vec<(String, OutputTensor)>,
}

#[cfg_attr(not(feature = "tensorflow"), allow(dead_code))]
impl NamedOutputs {
  pub fn push(&mut self, name: impl Into<String>, tensor: OutputTensor) {
    self.outputs.push((name.into(), tensor));
  }
}

impl OutputSource for NamedOutputs {
  fn output_count(&self) -> Option<usize> {
    Some(self.outputs.len())
  }

  fn by_name(&self, name: &str) -> Result<Option<OutputTensor>, ModelError> {
    Ok(
      self
        .outputs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, t)| t.clone()),
    )
  }

  fn by_index(&self, index: usize) -> Result<OutputTensor, ModelError> {
    self
      .outputs
      .get(index)
      .map(|(_, t)| t.clone())
      .ok_or_else(|| ModelError::Parse(format!("输出序号 {} 不存在", index)))
  }
}

fn resolve_output(
  source: &impl OutputSource,
  binding: OutputBinding,
  kind: OutputKind,
) -> Result<OutputTensor, ModelError> {
  let tensor = match binding.position(kind) {
    Some(index) => {
      if let Some(count) = source.output_count()
        && index >= count
      {
        return Err(ModelError::Parse(format!(
          "输出 {} 的序号 {} 超出范围 (共 {} 个输出)",
          kind.name(),
          index,
          count
        )));
      }
      source.by_index(index)?
    }
    None => source
      .by_name(kind.name())?
      .ok_or_else(|| ModelError::Parse(format!("模型缺少输出 {}", kind.name())))?,
  };

  if let Some(&batch) = tensor.shape.first()
    && batch != 1
  {
    return Err(ModelError::Parse(format!(
      "输出 {} 的批次大小为 {}, 仅支持 1",
      kind.name(),
      batch
    )));
  }
  Ok(tensor)
}

pub(crate) fn collect_detections(
  source: &impl OutputSource,
  binding: OutputBinding,
) -> Result<DetectionSet, ModelError> {
  let boxes = resolve_output(source, binding, OutputKind::Boxes)?;
  let classes = resolve_output(source, binding, OutputKind::Classes)?;
  let scores = resolve_output(source, binding, OutputKind::Scores)?;
  let num_detections = resolve_output(source, binding, OutputKind::NumDetections)?;

  let detections =
    DetectionSet::from_flat(&boxes.data, &classes.data, &scores.data, &num_detections.data)?;
  debug!(
    "模型输出 {} 个槽位, num_detections = {}",
    detections.slot_count(),
    detections.num_detections
  );
  Ok(detections)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tensor(shape: &[i64], data: &[f32]) -> OutputTensor {
    OutputTensor {
      shape: shape.to_vec(),
      data: data.to_vec(),
    }
  }

  /// 模拟转换后模型的 8 个输出，检测输出位于 3/4/6/7
  fn legacy_outputs() -> NamedOutputs {
    let mut outputs = NamedOutputs::default();
    for i in 0..8 {
      let t = match i {
        3 => tensor(&[1, 2, 4], &[0.1, 0.2, 0.5, 0.6, 0.0, 0.0, 1.0, 1.0]),
        4 => tensor(&[1, 2], &[3.0, 1.0]),
        6 => tensor(&[1, 2], &[0.9, 0.4]),
        7 => tensor(&[1], &[2.0]),
        _ => tensor(&[1, 1], &[-1.0]),
      };
      outputs.push(format!("StatefulPartitionedCall:{}", i), t);
    }
    outputs
  }

  fn named_outputs(batch: i64) -> NamedOutputs {
    let mut outputs = NamedOutputs::default();
    outputs.push("raw_detection_scores", tensor(&[1, 1], &[0.0]));
    outputs.push(
      "detection_boxes",
      tensor(&[batch, 1, 4], &[0.1, 0.2, 0.5, 0.6]),
    );
    outputs.push("detection_classes", tensor(&[1, 1], &[3.0]));
    outputs.push("detection_scores", tensor(&[1, 1], &[0.9]));
    outputs.push("num_detections", tensor(&[1], &[1.0]));
    outputs
  }

  #[test]
  fn named_lookup_ignores_output_order() {
    let set = collect_detections(&named_outputs(1), OutputBinding::Named).unwrap();
    assert_eq!(set.boxes, vec![[0.1, 0.2, 0.5, 0.6]]);
    assert_eq!(set.classes, vec![3.0]);
    assert_eq!(set.scores, vec![0.9]);
    assert_eq!(set.num_detections, 1.0);
  }

  #[test]
  fn missing_named_output_is_parse_error() {
    let mut outputs = NamedOutputs::default();
    outputs.push("detection_boxes", tensor(&[1, 1, 4], &[0.0; 4]));
    let err = collect_detections(&outputs, OutputBinding::Named).unwrap_err();
    assert!(matches!(err, ModelError::Parse(msg) if msg.contains("detection_classes")));
  }

  #[test]
  fn legacy_positions_select_detection_outputs() {
    let set = collect_detections(&legacy_outputs(), OutputBinding::LEGACY_IR).unwrap();
    assert_eq!(set.slot_count(), 2);
    assert_eq!(set.boxes[1], [0.0, 0.0, 1.0, 1.0]);
    assert_eq!(set.classes, vec![3.0, 1.0]);
    assert_eq!(set.scores, vec![0.9, 0.4]);
    assert_eq!(set.num_detections, 2.0);
  }

  #[test]
  fn positional_index_out_of_range_is_rejected() {
    // 只有 5 个输出时序号 6、7 不存在
    let err = collect_detections(&named_outputs(1), OutputBinding::LEGACY_IR).unwrap_err();
    assert!(matches!(err, ModelError::Parse(msg) if msg.contains("超出范围")));
  }

  #[test]
  fn batch_larger_than_one_is_rejected() {
    let err = collect_detections(&named_outputs(2), OutputBinding::Named).unwrap_err();
    assert!(matches!(err, ModelError::Parse(msg) if msg.contains("批次大小为 2")));
  }
}
