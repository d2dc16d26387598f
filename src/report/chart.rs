// 该文件是 HTP Lens 项目的一部分。
// src/report/chart.rs - 报告图表
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

use std::io::Cursor;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::debug;

use super::RenderError;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
const BAR: Rgb<u8> = Rgb([31, 119, 180]);
const TEXT: Rgb<u8> = Rgb([0, 0, 0]);

const TITLE_SIZE: f32 = 24.0;
const LABEL_SIZE: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
  /// 竖直柱状图
  Bar,
  /// 水平条形图，第一项在最上方
  HorizontalBar,
}

/// 图表渲染接口，返回 PNG 数据
pub trait ChartRenderer: Send + Sync {
  fn render(
    &self,
    data: &[(String, f64)],
    title: &str,
    kind: ChartKind,
  ) -> Result<Vec<u8>, RenderError>;
}

/// 用 imageproc 绘制的简单条形图。没有字体时省略所有文字。
pub struct BarChartRenderer {
  font: Option<FontArc>,
  width: u32,
  height: u32,
}

impl BarChartRenderer {
  pub fn new(font: Option<FontArc>) -> Self {
    Self {
      font,
      width: 750,
      height: 450,
    }
  }

  pub fn with_size(mut self, width: u32, height: u32) -> Self {
    self.width = width.max(100);
    self.height = height.max(100);
    self
  }

  fn text(&self, canvas: &mut RgbImage, x: i32, y: i32, size: f32, text: &str) {
    if let Some(font) = &self.font {
      draw_text_mut(canvas, TEXT, x, y, PxScale::from(size), font, text);
    }
  }

  fn text_width(&self, size: f32, text: &str) -> i32 {
    match &self.font {
      Some(font) => text_size(PxScale::from(size), font, text).0 as i32,
      None => 0,
    }
  }

  fn draw_vertical(
    &self,
    canvas: &mut RgbImage,
    data: &[(String, f64)],
    plot: Rect,
    max: f64,
  ) {
    let slot = plot.width() as f64 / data.len() as f64;
    let bar_width = (slot * 0.6).max(1.0) as u32;
    for (idx, (label, value)) in data.iter().enumerate() {
      let center = plot.left() as f64 + slot * (idx as f64 + 0.5);
      let bar_height = (value / max * plot.height() as f64).round() as u32;
      let x = (center - bar_width as f64 / 2.0) as i32;
      if bar_height > 0 {
        let rect =
          Rect::at(x, plot.bottom() + 1 - bar_height as i32).of_size(bar_width, bar_height);
        draw_filled_rect_mut(canvas, rect, BAR);
      }
      let w = self.text_width(LABEL_SIZE, label);
      self.text(canvas, center as i32 - w / 2, plot.bottom() + 8, LABEL_SIZE, label);
    }
  }

  fn draw_horizontal(
    &self,
    canvas: &mut RgbImage,
    data: &[(String, f64)],
    plot: Rect,
    max: f64,
  ) {
    let slot = plot.height() as f64 / data.len() as f64;
    let bar_height = (slot * 0.6).max(1.0) as u32;
    for (idx, (label, value)) in data.iter().enumerate() {
      let center = plot.top() as f64 + slot * (idx as f64 + 0.5);
      let bar_width = (value / max * plot.width() as f64).round() as u32;
      let y = (center - bar_height as f64 / 2.0) as i32;
      if bar_width > 0 {
        let rect = Rect::at(plot.left(), y).of_size(bar_width, bar_height);
        draw_filled_rect_mut(canvas, rect, BAR);
      }
      let w = self.text_width(LABEL_SIZE, label);
      self.text(
        canvas,
        plot.left() - w - 8,
        center as i32 - LABEL_SIZE as i32 / 2,
        LABEL_SIZE,
        label,
      );
    }
  }
}

impl ChartRenderer for BarChartRenderer {
  fn render(
    &self,
    data: &[(String, f64)],
    title: &str,
    kind: ChartKind,
  ) -> Result<Vec<u8>, RenderError> {
    let mut canvas = RgbImage::from_pixel(self.width, self.height, BACKGROUND);

    let title_width = self.text_width(TITLE_SIZE, title);
    self.text(
      &mut canvas,
      (self.width as i32 - title_width) / 2,
      12,
      TITLE_SIZE,
      title,
    );

    let left = match kind {
      ChartKind::Bar => 50,
      ChartKind::HorizontalBar => (self.width / 4) as i32,
    };
    let (top, right, bottom) = (50, 20, 40);
    let plot = Rect::at(left, top).of_size(
      (self.width as i32 - left - right).max(1) as u32,
      (self.height as i32 - top - bottom).max(1) as u32,
    );

    let origin = (plot.left() as f32, plot.bottom() as f32);
    draw_line_segment_mut(&mut canvas, origin, (plot.right() as f32, origin.1), AXIS);
    draw_line_segment_mut(&mut canvas, origin, (origin.0, plot.top() as f32), AXIS);

    let max = data
      .iter()
      .map(|(_, v)| *v)
      .filter(|v| v.is_finite())
      .fold(0.0f64, f64::max);
    debug!("绘制图表 {:?}: {} 项, 最大值 {}", title, data.len(), max);

    if !data.is_empty() && max > 0.0 {
      let data: Vec<(String, f64)> = data
        .iter()
        .map(|(l, v)| (l.clone(), if v.is_finite() { v.max(0.0) } else { 0.0 }))
        .collect();
      match kind {
        ChartKind::Bar => self.draw_vertical(&mut canvas, &data, plot, max),
        ChartKind::HorizontalBar => self.draw_horizontal(&mut canvas, &data, plot, max),
      }
    }

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn decode(png: &[u8]) -> RgbImage {
    image::load_from_memory(png).unwrap().to_rgb8()
  }

  fn count(image: &RgbImage, color: Rgb<u8>) -> usize {
    image.pixels().filter(|p| **p == color).count()
  }

  #[test]
  fn bars_scale_with_values() {
    let renderer = BarChartRenderer::new(None).with_size(300, 200);
    let small = decode(
      &renderer
        .render(&[("house".into(), 10.0)], "t", ChartKind::Bar)
        .unwrap(),
    );
    let mixed = decode(
      &renderer
        .render(
          &[("house".into(), 10.0), ("tree".into(), 5.0)],
          "t",
          ChartKind::Bar,
        )
        .unwrap(),
    );
    assert_eq!(small.dimensions(), (300, 200));
    assert!(count(&small, BAR) > 0);
    // 第二根柱子只有一半高，且两根柱子都更窄
    assert!(count(&mixed, BAR) < count(&small, BAR));
  }

  #[test]
  fn empty_or_zero_data_has_no_bars() {
    let renderer = BarChartRenderer::new(None).with_size(200, 150);
    for data in [vec![], vec![("door".to_string(), 0.0)]] {
      let png = renderer.render(&data, "empty", ChartKind::HorizontalBar).unwrap();
      assert_eq!(count(&decode(&png), BAR), 0);
    }
  }
}
