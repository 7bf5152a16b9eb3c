// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/prepare.rs - 下载并转换模型
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

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use url::Url;

use kanjian::{
  acquire::{DEFAULT_MODEL_URL, ModelArchive},
  convert::{ConvertRequest, Converter, ConverterProfile},
};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ConverterKind {
  /// OpenVINO Model Optimizer，生成 IR
  Mo,
  /// tf2onnx，生成 ONNX 模型
  Tf2onnx,
}

/// 模型准备参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型压缩包地址
  #[arg(long, value_name = "URL", default_value = DEFAULT_MODEL_URL)]
  pub model_url: Url,
  /// 模型缓存目录
  #[arg(long, value_name = "DIR", default_value = "models")]
  pub cache_dir: PathBuf,
  /// 转换结果目录，默认为模型目录下的 converted
  #[arg(long, value_name = "DIR")]
  pub output_dir: Option<PathBuf>,
  /// 转换程序
  #[arg(long, value_enum, default_value = "mo")]
  pub converter: ConverterKind,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model_url);
  info!("缓存目录: {}", args.cache_dir.display());

  let layout = ModelArchive::new(args.model_url, &args.cache_dir)
    .fetch()
    .context("获取模型失败")?;

  let output_dir = args
    .output_dir
    .unwrap_or_else(|| layout.root().join("converted"));
  let profile = match args.converter {
    ConverterKind::Tf2onnx => ConverterProfile::Tf2Onnx,
    ConverterKind::Mo => ConverterProfile::ModelOptimizer,
  };

  let saved_model_dir = layout.saved_model_dir();
  let pipeline_config = layout.pipeline_config();
  let converter = Converter::new(profile);
  info!("转换程序: {:?}", converter.profile());
  let files = converter
    .convert(&ConvertRequest {
      saved_model_dir: &saved_model_dir,
      pipeline_config: &pipeline_config,
      output_dir: &output_dir,
    })
    .context("模型转换失败")?;

  info!("模型描述文件: {}", files.description.display());
  if let Some(weights) = &files.weights {
    info!("模型权重文件: {}", weights.display());
  }

  info!("原生模型: native://{}", saved_model_dir.display());
  match converter.profile() {
    ConverterProfile::Tf2Onnx => info!("转换后模型: onnx://{}", files.description.display()),
    _ => info!("转换后模型: ir://{}", files.description.display()),
  }

  Ok(())
}
