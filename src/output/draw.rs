// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::{detector::Detection, frame::Image};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: i32 = 2;

pub struct Draw {
  font: FontArc,
  font_scale: PxScale,
  color: Rgb<u8>,
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      color: Rgb(BOX_COLOR),
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  /// 在原图副本上绘制检测结果，原图不变
  pub fn annotate(&self, image: &Image, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.to_rgb();
    self.draw_detections_on_image(&mut canvas, detections);
    canvas
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, detections: &[Detection]) {
    // 后绘制的结果覆盖先绘制的
    for detection in detections {
      self.draw_bbox(image, detection);
      self.draw_label(image, detection);
    }
  }

  fn draw_bbox(&self, image: &mut RgbImage, detection: &Detection) {
    let canvas_width = i64::from(image.width());
    let canvas_height = i64::from(image.height());

    for t in 0..i64::from(self.thickness) {
      // 右、下边界不含
      let left = i64::from(detection.xmin) + t;
      let top = i64::from(detection.ymin) + t;
      let right = i64::from(detection.xmax) - t;
      let bottom = i64::from(detection.ymax) - t;
      if right <= left || bottom <= top {
        break;
      }

      // 裁剪到画布外一个像素，落在画布外的边不绘制
      let left = left.max(-1);
      let top = top.max(-1);
      let right = right.min(canvas_width + 1);
      let bottom = bottom.min(canvas_height + 1);
      if right <= left || bottom <= top {
        continue;
      }

      let rect =
        Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32);
      draw_hollow_rect_mut(image, rect, self.color);
    }
  }

  fn draw_label(&self, image: &mut RgbImage, detection: &Detection) {
    let label = format!("{} {:.2}", detection.label, detection.score);
    let (_, text_height) = text_size(self.font_scale, &self.font, &label);

    // 文本底边贴在框的左上角
    let x = i64::from(detection.xmin).clamp(0, i64::from(image.width()));
    let y =
      (i64::from(detection.ymin) - i64::from(text_height)).clamp(0, i64::from(image.height()));
    draw_text_mut(
      image,
      self.color,
      x as i32,
      y as i32,
      self.font_scale,
      &self.font,
      &label,
    );
  }
}

/// 左右拼接两幅图像，高度取较大者
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
  let width = left.width() + right.width();
  let height = left.height().max(right.height());
  let mut canvas = RgbImage::new(width, height);
  imageops::replace(&mut canvas, left, 0, 0);
  imageops::replace(&mut canvas, right, i64::from(left.width()), 0);
  canvas
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ChannelOrder;

  fn black(width: u32, height: u32) -> Image {
    Image::from_raw(
      width,
      height,
      vec![0; (width * height * 3) as usize],
      ChannelOrder::Rgb,
    )
    .unwrap()
  }

  fn detection(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Detection {
    Detection {
      xmin,
      ymin,
      xmax,
      ymax,
      class_id: 3,
      label: "bicycle".to_string(),
      score: 0.9,
    }
  }

  #[test]
  fn annotate_draws_box_on_copy() {
    let image = black(100, 100);
    let annotated = Draw::default().annotate(&image, &[detection(10, 40, 50, 90)]);

    assert_eq!(annotated.get_pixel(10, 60), &Rgb(BOX_COLOR));
    assert_eq!(annotated.get_pixel(11, 60), &Rgb(BOX_COLOR));
    assert_eq!(annotated.get_pixel(30, 70), &Rgb([0, 0, 0]));
    assert!(image.as_raw().iter().all(|&v| v == 0));
  }

  #[test]
  fn out_of_bounds_and_degenerate_boxes_do_not_panic() {
    let image = black(20, 20);
    let draw = Draw::default();
    let annotated = draw.annotate(
      &image,
      &[
        detection(-30, -30, 80, 80),
        detection(5, 5, 5, 12),
        detection(15, 15, 10, 10),
      ],
    );
    assert_eq!(annotated.dimensions(), (20, 20));
  }

  #[test]
  fn saturated_box_is_clipped_to_canvas() {
    use crate::{detector::Detector, label::LabelMap, model::DetectionSet};

    let set =
      DetectionSet::new(vec![[-1e7, -1e7, 1.0, 1.0]], vec![1.0], vec![0.9], 1.0).unwrap();
    let detections = Detector::new(0.5)
      .unwrap()
      .detect(400, 400, &set, &LabelMap::default());
    assert_eq!(detections[0].xmin, i32::MIN);

    let annotated = Draw::default().annotate(&black(400, 400), &detections);
    // 左、上两条边在画布外，只剩右、下两条边
    assert_eq!(annotated.get_pixel(399, 200), &Rgb(BOX_COLOR));
    assert_eq!(annotated.get_pixel(200, 399), &Rgb(BOX_COLOR));
    assert_eq!(annotated.get_pixel(398, 200), &Rgb(BOX_COLOR));
    assert_eq!(annotated.get_pixel(200, 200), &Rgb([0, 0, 0]));
  }

  #[test]
  fn panels_are_placed_side_by_side() {
    let left = RgbImage::from_pixel(4, 3, Rgb([255, 0, 0]));
    let right = RgbImage::from_pixel(5, 2, Rgb([0, 0, 255]));
    let panel = side_by_side(&left, &right);
    assert_eq!(panel.dimensions(), (9, 3));
    assert_eq!(panel.get_pixel(0, 0), &Rgb([255, 0, 0]));
    assert_eq!(panel.get_pixel(4, 0), &Rgb([0, 0, 255]));
    assert_eq!(panel.get_pixel(4, 2), &Rgb([0, 0, 0]));
  }
}
