// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/json_record.rs - 以 JSON 记录检测结果
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

use std::path::PathBuf;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detector::Detection, frame::Image, output::Render};

pub struct JsonRecordOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  Serialize(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(Self {
      path: PathBuf::from(uri.path()),
    })
  }
}

fn detection_record(detection: &Detection) -> Value {
  json!({
    "label": detection.label,
    "class_id": detection.class_id,
    "score": detection.score,
    "box": [detection.xmin, detection.ymin, detection.xmax, detection.ymax],
  })
}

impl Render<Image, Vec<Detection>> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, _frame: &Image, result: &Vec<Detection>) -> Result<(), Self::Error> {
    let records: Vec<Value> = result.iter().map(detection_record).collect();
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&self.path, serde_json::to_string_pretty(&records)?)?;
    info!("记录 {} 个检测结果到 {}", records.len(), self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ChannelOrder;

  #[test]
  fn writes_detection_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.json");
    let url = Url::parse(&format!("json://{}", path.display())).unwrap();
    let output = JsonRecordOutput::from_url(&url).unwrap();

    let frame = Image::from_raw(1, 1, vec![0; 3], ChannelOrder::Rgb).unwrap();
    let detections = vec![Detection {
      xmin: 80,
      ymin: 40,
      xmax: 240,
      ymax: 200,
      class_id: 3,
      label: "bicycle".to_string(),
      score: 0.5,
    }];
    output.render_result(&frame, &detections).unwrap();

    let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
      value,
      json!([{
        "label": "bicycle",
        "class_id": 3,
        "score": 0.5,
        "box": [80, 40, 240, 200],
      }])
    );
  }

  #[test]
  fn empty_result_is_empty_array() {
    let dir = tempfile::tempdir().unwrap();
    let output = JsonRecordOutput {
      path: dir.path().join("empty.json"),
    };
    let frame = Image::from_raw(1, 1, vec![0; 3], ChannelOrder::Rgb).unwrap();
    output.render_result(&frame, &Vec::new()).unwrap();
    assert_eq!(std::fs::read_to_string(dir.path().join("empty.json")).unwrap(), "[]");
  }
}
