// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/compare_oneshot.rs - 原生模型与转换后模型的对比检测
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
  task::{CompareTask, DEFAULT_TOLERANCE, Task},
};
use tracing::info;

/// Kanjian 对比检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 原生模型路径 (native:// SavedModel 目录)
  #[arg(long, value_name = "MODEL")]
  pub native: Url,
  /// 转换后模型路径 (ir:// 或 onnx://)
  #[arg(long, value_name = "MODEL")]
  pub compiled: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 原生模型结果输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub native_output: Url,
  /// 转换后模型结果输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub compiled_output: Url,
  /// 类别标签 JSON 地址
  #[arg(long, value_name = "LABELS")]
  pub labels: Url,
  /// 置信度阈值
  #[arg(long, default_value_t = 0.5)]
  pub threshold: f32,
  /// 两个后端输出允许的最大差值
  #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
  pub tolerance: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("原生模型: {}", args.native);
  info!("转换后模型: {}", args.compiled);
  info!("输入来源: {}", args.input);

  let detector = Detector::new(args.threshold)?;
  let labels = LabelMap::from_url(&args.labels)?;
  let input = ImageFileInput::from_url(&args.input)?;
  let native = ModelWrapper::<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>::from_url(&args.native)?;
  let compiled = ModelWrapper::<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>::from_url(&args.compiled)?;
  let native_output = OutputWrapper::from_url(&args.native_output)?;
  let compiled_output = OutputWrapper::from_url(&args.compiled_output)?;

  let task: CompareTask = CompareTask::new(detector, labels).with_tolerance(args.tolerance);
  task.run_task(
    input,
    (native, compiled),
    (native_output, compiled_output),
  )?;

  Ok(())
}
