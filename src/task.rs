// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 推理任务
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

use std::time::Instant;

use tracing::{info, warn};

use crate::{
  compare::{Comparison, compare_detection_sets},
  detector::{Detection, Detector},
  frame::{Image, MODEL_INPUT_SIZE, RgbNhwcFrame},
  label::LabelMap,
  model::{DetectionSet, Model},
  output::Render,
  preprocess::Preprocessor,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 推理并解码一帧，返回原始输出与检测结果
fn infer_frame<const W: u32, const H: u32, ME, M>(
  name: &str,
  tensor: &RgbNhwcFrame<W, H>,
  frame: &Image,
  model: &M,
  detector: &Detector,
  labels: &LabelMap,
) -> anyhow::Result<(DetectionSet, Vec<Detection>)>
where
  ME: std::error::Error + Sync + Send + 'static,
  M: Model<Input = RgbNhwcFrame<W, H>, Output = DetectionSet, Error = ME>,
{
  let now = Instant::now();
  let raw = model.infer(tensor)?;
  info!("[{}] 推理完成，耗时: {:.2?}", name, now.elapsed());

  let detections = detector.detect(frame.height(), frame.width(), &raw, labels);
  info!(
    "[{}] 检测到 {} 个目标 (阈值 {})",
    name,
    detections.len(),
    detector.threshold()
  );
  for detection in &detections {
    info!(
      "[{}] {} {:.2} ({}, {}) - ({}, {})",
      name,
      detection.label,
      detection.score,
      detection.xmin,
      detection.ymin,
      detection.xmax,
      detection.ymax
    );
  }
  Ok((raw, detections))
}

/// 单个模型处理一张图像
pub struct OneShotTask<const W: u32 = MODEL_INPUT_SIZE, const H: u32 = MODEL_INPUT_SIZE> {
  preprocessor: Preprocessor<W, H>,
  detector: Detector,
  labels: LabelMap,
}

impl<const W: u32, const H: u32> OneShotTask<W, H> {
  pub fn new(detector: Detector, labels: LabelMap) -> Self {
    Self {
      preprocessor: Preprocessor,
      detector,
      labels,
    }
  }
}

impl<
  const W: u32,
  const H: u32,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Image>,
  M: Model<Input = RgbNhwcFrame<W, H>, Output = DetectionSet, Error = ME>,
  O: Render<Image, Vec<Detection>, Error = RE>,
> Task<I, M, O> for OneShotTask<W, H>
{
  type Output = Vec<Detection>;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始预处理...");

    let now = Instant::now();
    let tensor = self.preprocessor.preprocess(&frame);
    info!("预处理完成，耗时: {:.2?}", now.elapsed());

    let (_, detections) = infer_frame(
      "model",
      &tensor,
      &frame,
      &model,
      &self.detector,
      &self.labels,
    )?;

    let now = Instant::now();
    output.render_result(&frame, &detections)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(detections)
  }
}

/// 比较两个后端输出时的默认容差
pub const DEFAULT_TOLERANCE: f32 = 1e-3;

/// 原生模型与转换后模型处理同一预处理结果并比较输出
pub struct CompareTask<const W: u32 = MODEL_INPUT_SIZE, const H: u32 = MODEL_INPUT_SIZE> {
  preprocessor: Preprocessor<W, H>,
  detector: Detector,
  labels: LabelMap,
  tolerance: f32,
}

impl<const W: u32, const H: u32> CompareTask<W, H> {
  pub fn new(detector: Detector, labels: LabelMap) -> Self {
    Self {
      preprocessor: Preprocessor,
      detector,
      labels,
      tolerance: DEFAULT_TOLERANCE,
    }
  }

  pub fn with_tolerance(mut self, tolerance: f32) -> Self {
    self.tolerance = tolerance;
    self
  }
}

impl<
  const W: u32,
  const H: u32,
  NE: std::error::Error + Sync + Send + 'static,
  CE: std::error::Error + Sync + Send + 'static,
  NRE: std::error::Error + Sync + Send + 'static,
  CRE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Image>,
  N: Model<Input = RgbNhwcFrame<W, H>, Output = DetectionSet, Error = NE>,
  C: Model<Input = RgbNhwcFrame<W, H>, Output = DetectionSet, Error = CE>,
  NO: Render<Image, Vec<Detection>, Error = NRE>,
  CO: Render<Image, Vec<Detection>, Error = CRE>,
> Task<I, (N, C), (NO, CO)> for CompareTask<W, H>
{
  type Output = Comparison;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    (native, compiled): (N, C),
    (native_output, compiled_output): (NO, CO),
  ) -> Result<Self::Output, Self::Error> {
    info!("开始比较任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;

    let now = Instant::now();
    let tensor = self.preprocessor.preprocess(&frame);
    info!("预处理完成，耗时: {:.2?}", now.elapsed());

    let (native_raw, native_detections) = infer_frame(
      "native",
      &tensor,
      &frame,
      &native,
      &self.detector,
      &self.labels,
    )?;
    let (compiled_raw, compiled_detections) = infer_frame(
      "compiled",
      &tensor,
      &frame,
      &compiled,
      &self.detector,
      &self.labels,
    )?;

    let comparison = compare_detection_sets(&native_raw, &compiled_raw);
    if comparison.is_within(self.tolerance) {
      info!("两个后端输出一致: {}", comparison);
    } else {
      warn!("两个后端输出差异超过 {}: {}", self.tolerance, comparison);
    }

    let now = Instant::now();
    native_output.render_result(&frame, &native_detections)?;
    compiled_output.render_result(&frame, &compiled_detections)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(comparison)
  }
}
