// 该文件是 HTP Lens 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::detection::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: u32 = 4;
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

/// 在画作副本上绘制检测框和标签
pub struct Draw {
  font_size: f32,
  font: Option<FontArc>,
  label_color: [u8; 3],
}

impl Draw {
  /// 没有字体时只画框，不画标签
  pub fn new(font: Option<FontArc>) -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      font,
      label_color: LABEL_COLOR,
    }
  }

  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    for detection in detections {
      self.draw_bbox_with_label(&mut canvas, detection);
    }
    canvas
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let bbox = &detection.bbox;
    let x_min = (bbox.x.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y.floor() as i32).clamp(0, h - 1);
    let x_max = ((bbox.x + bbox.w).ceil() as i32).clamp(0, w - 1);
    let y_max = ((bbox.y + bbox.h).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(self.label_color);
    // 绘制边框（加粗为2像素）
    for thickness in 0..2 {
      let width = (x_max - x_min + 1 - 2 * thickness).max(0) as u32;
      let height = (y_max - y_min + 1 - 2 * thickness).max(0) as u32;
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width, height);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", detection.label, detection.confidence);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, &label);
    let label_height = text_height + 2 * LABEL_TEXT_VERTICAL_PADDING as u32;

    // 标签放在边框上方，空间不足时贴住上边缘
    let label_x = x_min;
    let label_y = (y_min - label_height as i32).max(0);
    let max_width = (w - label_x).max(0) as u32;
    let label_width = (text_width + 2 * LABEL_TEXT_HORIZONTAL_PADDING).min(max_width);

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        label_x + LABEL_TEXT_HORIZONTAL_PADDING as i32,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::BoxRect;

  fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
    Detection {
      label: "window".into(),
      confidence: 0.9,
      bbox: BoxRect { x, y, w, h },
      area_ratio: None,
      position_zone: None,
    }
  }

  #[test]
  fn draws_box_outline_without_font() {
    let image = RgbImage::from_pixel(50, 50, Rgb([255, 255, 255]));
    let out = Draw::new(None).annotate(&image, &[detection(10.0, 10.0, 20.0, 20.0)]);
    assert_eq!(out.get_pixel(10, 10), &Rgb(LABEL_COLOR));
    assert_eq!(out.get_pixel(11, 20), &Rgb(LABEL_COLOR));
    assert_eq!(out.get_pixel(20, 20), &Rgb([255, 255, 255]));
    // 原图不变
    assert_eq!(image.get_pixel(10, 10), &Rgb([255, 255, 255]));
  }

  #[test]
  fn degenerate_and_outside_boxes_are_skipped() {
    let image = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
    let out = Draw::new(None).annotate(
      &image,
      &[detection(5.0, 5.0, 0.0, 0.0), detection(500.0, 500.0, 10.0, 10.0)],
    );
    assert_eq!(out, image);
  }
}
