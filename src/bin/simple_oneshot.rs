// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单模型单张图像检测
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl,
  detector::Detector,
  frame::MODEL_INPUT_SIZE,
  input::ImageFileInput,
  label::LabelMap,
  model::ModelWrapper,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Kanjian 单模型检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径 (native://、ir:// 或 onnx://)
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径 (image:// 或 json://)
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别标签 JSON 地址
  #[arg(long, value_name = "LABELS")]
  pub labels: Url,
  /// 置信度阈值
  #[arg(long, default_value_t = 0.5)]
  pub threshold: f32,
  /// 将检测框裁剪到图像范围内
  #[arg(long)]
  pub clip: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.threshold);

  let detector = Detector::new(args.threshold)?.with_clip(args.clip);
  let labels = LabelMap::from_url(&args.labels)?;
  let input = ImageFileInput::from_url(&args.input)?;
  let model = ModelWrapper::<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let task: OneShotTask = OneShotTask::new(detector, labels);
  let detections = task.run_task(input, model, output)?;
  info!("任务完成，共 {} 个目标", detections.len());

  Ok(())
}
