// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 图像与 NHWC 帧定义
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

use image::RgbImage;
use thiserror::Error;

use crate::input::AsNhwcFrame;

const RGB_CHANNELS: usize = 3;

/// 模型输入边长
pub const MODEL_INPUT_SIZE: u32 = 320;

/// 预处理后的模型输入：1 x 320 x 320 x 3, RGB
pub type PreprocessedTensor = RgbNhwcFrame<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 像素通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
  Rgb,
  Bgr,
}

/// 高 x 宽 x 3 的 8 位图像，通道顺序作为属性显式记录
#[derive(Debug, Clone)]
pub struct Image {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  order: ChannelOrder,
}

impl Image {
  pub fn from_raw(
    width: u32,
    height: u32,
    data: Vec<u8>,
    order: ChannelOrder,
  ) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
      order,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn as_raw(&self) -> &[u8] {
    &self.data
  }

  /// 返回 RGB 顺序的副本
  pub fn to_rgb(&self) -> RgbImage {
    let mut data = self.data.to_vec();
    if self.order == ChannelOrder::Bgr {
      for pixel in data.chunks_exact_mut(RGB_CHANNELS) {
        pixel.swap(0, 2);
      }
    }
    RgbImage::from_raw(self.width, self.height, data).expect("图像数据长度在构造时已校验")
  }
}

impl From<RgbImage> for Image {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      data: image.into_raw().into_boxed_slice(),
      width,
      height,
      order: ChannelOrder::Rgb,
    }
  }
}

#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for RgbNhwcFrame<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    let expected = RGB_CHANNELS * W as usize * H as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 带批次维度的形状 [N, H, W, C]
  pub fn shape(&self) -> [usize; 4] {
    [1, H as usize, W as usize, RGB_CHANNELS]
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}
