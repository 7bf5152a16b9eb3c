// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 后端，加载 tf2onnx 导出的模型
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

use ort::{
  execution_providers::CPUExecutionProvider,
  session::{Session, SessionOutputs, builder::GraphOptimizationLevel},
  value::Tensor,
};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  input::AsNhwcFrame,
  model::{
    DetectionSet, Model, ModelError, OutputBinding,
    resolve::{OutputSource, OutputTensor, collect_detections},
  },
};

const DETECTION_NUM_INPUTS: usize = 1;
const ONNX_EXTENSION: &str = "onnx";

pub struct OnnxModel<const W: u32, const H: u32> {
  session: Session,
  binding: OutputBinding,
}

pub struct OnnxModelBuilder {
  model_path: PathBuf,
  binding: OutputBinding,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = OnnxModelBuilder::new(url.path());
    for (key, value) in url.query_pairs() {
      if key == "binding" && value == "legacy" {
        builder.binding = OutputBinding::LEGACY_IR;
      }
    }
    Ok(builder)
  }
}

impl OnnxModelBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      binding: OutputBinding::Named,
    }
  }

  pub fn build<const W: u32, const H: u32>(self) -> Result<OnnxModel<W, H>, ModelError> {
    if self.model_path.extension().and_then(|e| e.to_str()) != Some(ONNX_EXTENSION) {
      return Err(ModelError::ModelPathError(format!(
        "{} 不是 ONNX 模型，OpenVINO IR 请使用 ir:// 加载",
        self.model_path.display()
      )));
    }
    if !self.model_path.is_file() {
      return Err(ModelError::ModelPathError(format!(
        "模型文件不存在: {}",
        self.model_path.display()
      )));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let session = Session::builder()?
      .with_execution_providers(vec![CPUExecutionProvider::default().build()])?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_file(&self.model_path)
      .map_err(|e| ModelError::Load(format!("{}: {}", self.model_path.display(), e)))?;

    if session.inputs.len() != DETECTION_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        DETECTION_NUM_INPUTS,
        session.inputs.len()
      );
      return Err(ModelError::Load(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        DETECTION_NUM_INPUTS,
        session.inputs.len()
      )));
    }

    let input = &session.inputs[0];
    if let Some(dims) = input.input_type.tensor_dimensions() {
      let expected = [1, H as i64, W as i64, 3];
      // 动态维度为 -1
      let compatible = dims.len() == expected.len()
        && dims
          .iter()
          .zip(expected.iter())
          .all(|(&actual, &want)| actual <= 0 || actual == want);
      if !compatible {
        error!("模型输入 {} 形状 {:?} 与 {:?} 不符", input.name, dims, expected);
        return Err(ModelError::Load(format!(
          "模型输入形状 {:?} 与 {:?} 不符",
          dims, expected
        )));
      }
    }

    debug!("模型输入: {}", input.name);
    for (index, output) in session.outputs.iter().enumerate() {
      debug!("模型输出 {}: {}", index, output.name);
    }
    info!("ONNX 模型加载完成，输出定位方式: {:?}", self.binding);

    Ok(OnnxModel {
      session,
      binding: self.binding,
    })
  }
}

fn to_output_tensor(
  value: &ort::value::DynValue,
  label: &str,
) -> Result<OutputTensor, ModelError> {
  let (shape, data) = value
    .try_extract_raw_tensor::<f32>()
    .map_err(|e| ModelError::Parse(format!("输出 {} 无法读取为 f32: {}", label, e)))?;
  Ok(OutputTensor {
    shape: shape.to_vec(),
    data: data.to_vec(),
  })
}

impl OutputSource for SessionOutputs<'_, '_> {
  fn output_count(&self) -> Option<usize> {
    Some(self.len())
  }

  fn by_name(&self, name: &str) -> Result<Option<OutputTensor>, ModelError> {
    self
      .get(name)
      .map(|value| to_output_tensor(value, name))
      .transpose()
  }

  fn by_index(&self, index: usize) -> Result<OutputTensor, ModelError> {
    to_output_tensor(&self[index], &index.to_string())
  }
}

impl<const W: u32, const H: u32> Model for OnnxModel<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectionSet;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor = Tensor::from_array((input.shape(), input.as_nhwc().to_vec()))?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![tensor]?)
      .map_err(|e| ModelError::Inference(e.to_string()))?;

    debug!("获取模型输出");
    collect_detections(&outputs, self.binding)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn model_optimizer_output_is_not_an_onnx_model() {
    let dir = tempfile::tempdir().unwrap();
    let xml = dir.path().join("saved_model.xml");
    std::fs::write(&xml, "<net/>").unwrap();
    let url = Url::from_file_path(&xml).unwrap();
    let url = Url::parse(&format!("onnx://{}", url.path())).unwrap();

    let err = OnnxModelBuilder::from_url(&url)
      .unwrap()
      .build::<320, 320>()
      .err()
      .unwrap();
    assert!(matches!(err, ModelError::ModelPathError(msg) if msg.contains("ir://")));
  }

  #[test]
  fn legacy_binding_from_query() {
    let url = Url::parse("onnx:///m/model.onnx?binding=legacy").unwrap();
    let builder = OnnxModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/m/model.onnx"));
    assert_eq!(builder.binding, OutputBinding::LEGACY_IR);
  }
}
