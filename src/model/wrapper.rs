// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/wrapper.rs - 按 URL 方案选择模型后端
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

use url::Url;

#[cfg(feature = "openvino")]
use crate::model::{CompiledModel, CompiledModelBuilder};
#[cfg(feature = "tensorflow")]
use crate::model::{NativeModel, NativeModelBuilder};
#[cfg(feature = "onnxruntime")]
use crate::model::{OnnxModel, OnnxModelBuilder};
#[allow(unused_imports)]
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  model::{DetectionSet, Model, ModelError},
};

/// `native://` SavedModel 目录，`ir://` OpenVINO IR，`onnx://` ONNX 文件
pub enum ModelWrapper<const W: u32, const H: u32> {
  #[cfg(feature = "tensorflow")]
  Native(NativeModel<W, H>),
  #[cfg(feature = "openvino")]
  Compiled(CompiledModel<W, H>),
  #[cfg(feature = "onnxruntime")]
  Onnx(OnnxModel<W, H>),
}

impl<const W: u32, const H: u32> FromUrl for ModelWrapper<W, H> {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "tensorflow")]
      NativeModelBuilder::SCHEME => Ok(ModelWrapper::Native(
        NativeModelBuilder::from_url(url)?.build()?,
      )),
      #[cfg(feature = "openvino")]
      CompiledModelBuilder::SCHEME => Ok(ModelWrapper::Compiled(
        CompiledModelBuilder::from_url(url)?.build()?,
      )),
      #[cfg(feature = "onnxruntime")]
      OnnxModelBuilder::SCHEME => Ok(ModelWrapper::Onnx(
        OnnxModelBuilder::from_url(url)?.build()?,
      )),
      other => Err(ModelError::ModelPathError(format!(
        "不支持的模型方案: {} (未启用对应的后端特性?)",
        other
      ))),
    }
  }
}

impl<const W: u32, const H: u32> Model for ModelWrapper<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectionSet;
  type Error = ModelError;

  #[allow(unused_variables)]
  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match *self {
      #[cfg(feature = "tensorflow")]
      ModelWrapper::Native(ref model) => model.infer(input),
      #[cfg(feature = "openvino")]
      ModelWrapper::Compiled(ref model) => model.infer(input),
      #[cfg(feature = "onnxruntime")]
      ModelWrapper::Onnx(ref model) => model.infer(input),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("savedmodel:///m").unwrap();
    assert!(matches!(
      ModelWrapper::<320, 320>::from_url(&url),
      Err(ModelError::ModelPathError(msg)) if msg.contains("savedmodel")
    ));
  }
}
