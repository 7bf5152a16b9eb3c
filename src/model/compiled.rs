// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/compiled.rs - 用 OpenVINO 编译转换后的 IR 并发起异步推理请求
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

use std::{cell::RefCell, fmt::Display, path::Path};

use openvino::{Core, DeviceType, ElementType, Shape, Tensor};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  convert::ConvertedModel,
  frame::RgbNhwcFrame,
  input::AsNhwcFrame,
  model::{
    DetectionSet, Model, ModelError, OutputBinding,
    resolve::{OutputSource, OutputTensor, collect_detections},
  },
};

const IR_EXTENSION: &str = "xml";
const WEIGHTS_EXTENSION: &str = "bin";
/// 每次等待的毫秒数，OpenVINO 不接受负的超时
const WAIT_STEP_MS: i64 = 1000;

fn load_error(err: impl Display) -> ModelError {
  ModelError::Load(err.to_string())
}

fn inference_error(err: impl Display) -> ModelError {
  ModelError::Inference(err.to_string())
}

fn path_str(path: &Path) -> Result<&str, ModelError> {
  path
    .to_str()
    .ok_or_else(|| ModelError::ModelPathError(format!("路径不是有效的 UTF-8: {}", path.display())))
}

/// 编译目标设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
  #[default]
  Cpu,
}

impl Device {
  fn parse(value: &str) -> Result<Self, ModelError> {
    match value.to_ascii_uppercase().as_str() {
      "CPU" => Ok(Device::Cpu),
      other => Err(ModelError::ModelPathError(format!("不支持的设备: {}", other))),
    }
  }
}

pub struct CompiledModel<const W: u32, const H: u32> {
  compiled: RefCell<openvino::CompiledModel>,
  input_name: String,
  binding: OutputBinding,
  _core: Core,
}

pub struct CompiledModelBuilder {
  files: ConvertedModel,
  device: Device,
  binding: OutputBinding,
}

impl FromUrlWithScheme for CompiledModelBuilder {
  const SCHEME: &'static str = "ir";
}

impl FromUrl for CompiledModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut files = ConvertedModel::new(url.path());
    let mut device = Device::default();
    let mut binding = OutputBinding::Named;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "weights" => files = files.with_weights(value.as_ref()),
        "device" => device = Device::parse(&value)?,
        "binding" if value == "legacy" => binding = OutputBinding::LEGACY_IR,
        _ => {}
      }
    }

    Ok(
      Self::from_converted(files)
        .device(device)
        .output_binding(binding),
    )
  }
}

impl CompiledModelBuilder {
  /// 未给出权重文件时使用描述文件同名的 `.bin`
  pub fn from_converted(files: ConvertedModel) -> Self {
    let files = match files.weights {
      Some(_) => files,
      None => {
        let weights = files.description.with_extension(WEIGHTS_EXTENSION);
        files.with_weights(weights)
      }
    };
    Self {
      files,
      device: Device::default(),
      binding: OutputBinding::default(),
    }
  }

  pub fn device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  pub fn output_binding(mut self, binding: OutputBinding) -> Self {
    self.binding = binding;
    self
  }

  fn check_files(&self) -> Result<&Path, ModelError> {
    let description = self.files.description.as_path();
    if description.extension().and_then(|e| e.to_str()) != Some(IR_EXTENSION) {
      return Err(ModelError::ModelPathError(format!(
        "{} 不是 OpenVINO IR 描述文件",
        description.display()
      )));
    }
    std::iter::once(description)
      .chain(self.files.weights.as_deref())
      .find(|p| !p.is_file())
      .map_or(Ok(()), |missing| {
        Err(ModelError::ModelPathError(format!(
          "模型文件不存在: {}",
          missing.display()
        )))
      })?;
    Ok(self.files.weights.as_deref().unwrap_or(description))
  }

  pub fn build<const W: u32, const H: u32>(self) -> Result<CompiledModel<W, H>, ModelError> {
    let weights = self.check_files()?;
    let description = path_str(&self.files.description)?;
    let weights = path_str(weights)?;

    info!("读取 IR: {} ({})", description, weights);
    let mut core = Core::new().map_err(load_error)?;
    let model = core
      .read_model_from_file(description, weights)
      .map_err(load_error)?;
    let input_name = model
      .get_input_by_index(0)
      .and_then(|port| port.get_name())
      .map_err(load_error)?;
    debug!("模型输入: {}", input_name);

    info!("编译模型，目标设备: {:?}", self.device);
    let compiled = match self.device {
      Device::Cpu => core.compile_model(&model, DeviceType::CPU),
    }
    .map_err(load_error)?;
    info!("模型编译完成，输出定位方式: {:?}", self.binding);

    Ok(CompiledModel {
      compiled: RefCell::new(compiled),
      input_name,
      binding: self.binding,
      _core: core,
    })
  }
}

impl<const W: u32, const H: u32> CompiledModel<W, H> {
  pub fn create_infer_request(&self) -> Result<InferRequest<W, H>, ModelError> {
    let request = self
      .compiled
      .borrow_mut()
      .create_infer_request()
      .map_err(inference_error)?;
    Ok(InferRequest {
      request,
      input_name: self.input_name.clone(),
      binding: self.binding,
      pending: None,
    })
  }
}

impl OutputSource for openvino::InferRequest {
  fn output_count(&self) -> Option<usize> {
    None
  }

  fn by_name(&self, name: &str) -> Result<Option<OutputTensor>, ModelError> {
    match self.get_tensor(name) {
      Ok(tensor) => to_output_tensor(&tensor, name).map(Some),
      Err(e) => {
        debug!("输出 {} 不存在: {}", name, e);
        Ok(None)
      }
    }
  }

  fn by_index(&self, index: usize) -> Result<OutputTensor, ModelError> {
    let tensor = self
      .get_output_tensor_by_index(index)
      .map_err(|e| ModelError::Parse(format!("输出序号 {} 不存在: {}", index, e)))?;
    to_output_tensor(&tensor, &index.to_string())
  }
}

fn to_output_tensor(tensor: &Tensor, label: &str) -> Result<OutputTensor, ModelError> {
  let parse = |e: &dyn Display| ModelError::Parse(format!("输出 {} 无法读取为 f32: {}", label, e));
  let shape = tensor.get_shape().map_err(|e| parse(&e))?;
  let data = tensor.get_data::<f32>().map_err(|e| parse(&e))?;
  Ok(OutputTensor {
    shape: shape.get_dimensions().to_vec(),
    data: data.to_vec(),
  })
}

/// 一次推理请求：`start` 提交后立即返回，`wait` 阻塞直到完成并读取输出
pub struct InferRequest<const W: u32, const H: u32> {
  request: openvino::InferRequest,
  input_name: String,
  binding: OutputBinding,
  /// 推理完成前输入张量必须保持有效
  pending: Option<Tensor>,
}

impl<const W: u32, const H: u32> InferRequest<W, H> {
  pub fn start(&mut self, input: &RgbNhwcFrame<W, H>) -> Result<(), ModelError> {
    if self.pending.is_some() {
      return Err(ModelError::Inference("上一次推理尚未完成".to_string()));
    }

    debug!("设置模型输入");
    let shape = Shape::new(&[1, i64::from(H), i64::from(W), 3]).map_err(inference_error)?;
    let mut tensor = Tensor::new(ElementType::U8, &shape).map_err(inference_error)?;
    tensor
      .get_raw_data_mut()
      .map_err(inference_error)?
      .copy_from_slice(input.as_nhwc());
    self
      .request
      .set_tensor(&self.input_name, &tensor)
      .map_err(inference_error)?;

    debug!("执行模型推理");
    self.request.infer_async().map_err(inference_error)?;
    self.pending = Some(tensor);
    Ok(())
  }

  pub fn wait(&mut self) -> Result<DetectionSet, ModelError> {
    let input = self.pending.take().ok_or(ModelError::NotStarted)?;
    while !self.request.wait(WAIT_STEP_MS).map_err(inference_error)? {
      debug!("等待推理完成");
    }
    drop(input);

    debug!("获取模型输出");
    collect_detections(&self.request, self.binding)
  }
}

impl<const W: u32, const H: u32> Model for CompiledModel<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectionSet;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let mut request = self.create_infer_request()?;
    request.start(input)?;
    request.wait()
  }
}
