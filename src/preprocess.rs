// 该文件是 Kanjian （看见） 项目的一部分。
// src/preprocess.rs - 模型输入预处理
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

use std::path::Path;

use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{
  frame::{Image, MODEL_INPUT_SIZE, RgbNhwcFrame},
  input::{ImageFileInputError, load_image},
};

/// 将任意尺寸图像缩放为 W x H 的 RGB NHWC 帧，不做归一化
#[derive(Debug, Default, Clone, Copy)]
pub struct Preprocessor<const W: u32, const H: u32>;

pub type Preprocessor320 = Preprocessor<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>;

impl<const W: u32, const H: u32> Preprocessor<W, H> {
  pub fn preprocess(&self, image: &Image) -> RgbNhwcFrame<W, H> {
    let rgb = image.to_rgb();
    // 双线性插值，结果可复现
    let resized = imageops::resize(&rgb, W, H, FilterType::Triangle);
    debug!(
      "预处理: {}x{} -> {}x{}",
      image.width(),
      image.height(),
      W,
      H
    );

    RgbNhwcFrame::try_from(resized.into_raw()).expect("缩放结果尺寸固定为 W x H")
  }

  pub fn preprocess_file(
    &self,
    path: impl AsRef<Path>,
  ) -> Result<RgbNhwcFrame<W, H>, ImageFileInputError> {
    let image = load_image(path)?;
    Ok(self.preprocess(&image))
  }
}
