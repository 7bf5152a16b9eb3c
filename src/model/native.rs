// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/native.rs - 以 TensorFlow SavedModel 原样运行的模型
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

use tensorflow::{
  DEFAULT_SERVING_SIGNATURE_DEF_KEY, Graph, Operation, SavedModelBundle, SessionOptions,
  SessionRunArgs, Tensor,
};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  input::AsNhwcFrame,
  model::{
    DetectionSet, Model, ModelError, OutputBinding, OutputKind,
    resolve::{NamedOutputs, OutputTensor, collect_detections},
  },
};

const SERVING_TAG: &str = "serve";
const INPUT_TENSOR: &str = "input_tensor";
const SAVED_MODEL_FILE: &str = "saved_model.pb";

const OUTPUT_KINDS: [OutputKind; 4] = [
  OutputKind::Boxes,
  OutputKind::Classes,
  OutputKind::Scores,
  OutputKind::NumDetections,
];

/// 计算图中的一个张量端点
struct Endpoint {
  operation: Operation,
  index: i32,
}

impl Endpoint {
  fn lookup(graph: &Graph, name: &str, index: i32) -> Result<Self, ModelError> {
    Ok(Self {
      operation: graph.operation_by_name_required(name)?,
      index,
    })
  }
}

/// 发布时的 SavedModel，经由服务签名按名称读取四组输出
pub struct NativeModel<const W: u32, const H: u32> {
  bundle: SavedModelBundle,
  input: Endpoint,
  outputs: Vec<(OutputKind, Endpoint)>,
}

pub struct NativeModelBuilder {
  saved_model_dir: PathBuf,
}

impl FromUrlWithScheme for NativeModelBuilder {
  const SCHEME: &'static str = "native";
}

impl FromUrl for NativeModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(NativeModelBuilder::new(url.path()))
  }
}

impl NativeModelBuilder {
  pub fn new(saved_model_dir: impl Into<PathBuf>) -> Self {
    Self {
      saved_model_dir: saved_model_dir.into(),
    }
  }

  pub fn build<const W: u32, const H: u32>(self) -> Result<NativeModel<W, H>, ModelError> {
    if !self.saved_model_dir.join(SAVED_MODEL_FILE).is_file() {
      return Err(ModelError::ModelPathError(format!(
        "{} 不是 SavedModel 目录",
        self.saved_model_dir.display()
      )));
    }

    info!("加载 SavedModel: {}", self.saved_model_dir.display());
    let mut graph = Graph::new();
    let bundle = SavedModelBundle::load(
      &SessionOptions::new(),
      [SERVING_TAG],
      &mut graph,
      &self.saved_model_dir,
    )
    .map_err(|e| ModelError::Load(format!("{}: {}", self.saved_model_dir.display(), e)))?;

    let signature = bundle
      .meta_graph_def()
      .get_signature(DEFAULT_SERVING_SIGNATURE_DEF_KEY)?;

    let input_info = signature.get_input(INPUT_TENSOR)?.name();
    let input = Endpoint::lookup(&graph, &input_info.name, input_info.index)?;
    debug!("模型输入: {}:{}", input_info.name, input_info.index);

    let mut outputs = Vec::with_capacity(OUTPUT_KINDS.len());
    for kind in OUTPUT_KINDS {
      let info = signature.get_output(kind.name())?.name();
      debug!("模型输出 {}: {}:{}", kind.name(), info.name, info.index);
      outputs.push((kind, Endpoint::lookup(&graph, &info.name, info.index)?));
    }
    info!("原生模型加载完成");

    Ok(NativeModel {
      bundle,
      input,
      outputs,
    })
  }
}

impl<const W: u32, const H: u32> Model for NativeModel<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectionSet;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor =
      Tensor::<u8>::new(&[1, u64::from(H), u64::from(W), 3]).with_values(input.as_nhwc())?;
    let mut args = SessionRunArgs::new();
    args.add_feed(&self.input.operation, self.input.index, &tensor);
    let tokens: Vec<_> = self
      .outputs
      .iter()
      .map(|(kind, endpoint)| (*kind, args.request_fetch(&endpoint.operation, endpoint.index)))
      .collect();

    debug!("执行模型推理");
    self
      .bundle
      .session
      .run(&mut args)
      .map_err(|e| ModelError::Inference(e.to_string()))?;

    debug!("获取模型输出");
    let mut outputs = NamedOutputs::default();
    for (kind, token) in tokens {
      let value = args.fetch::<f32>(token)?;
      outputs.push(
        kind.name(),
        OutputTensor {
          shape: value.dims().iter().map(|&d| d as i64).collect(),
          data: value.to_vec(),
        },
      );
    }
    collect_detections(&outputs, OutputBinding::Named)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn directory_without_saved_model_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("saved_model.onnx"), "onnx").unwrap();
    let err = NativeModelBuilder::new(dir.path())
      .build::<320, 320>()
      .err()
      .unwrap();
    assert!(matches!(err, ModelError::ModelPathError(msg) if msg.contains("SavedModel")));
  }

  #[test]
  fn scheme_selects_saved_model_dir() {
    let url = Url::parse("native:///models/ssd/saved_model").unwrap();
    let builder = NativeModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.saved_model_dir, PathBuf::from("/models/ssd/saved_model"));
    assert!(NativeModelBuilder::from_url(&Url::parse("ir:///a.xml").unwrap()).is_err());
  }
}
