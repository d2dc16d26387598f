// 该文件是 HTP Lens 项目的一部分。
// src/frame.rs - 模型输入帧
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

/// 预热用的规范尺寸
pub const WARMUP_SIZE: u32 = 640;

/// 纯白空帧，用于模型预热
pub fn blank(width: u32, height: u32) -> RgbImage {
  RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]))
}

/// 缩放到 `size x size` 并转换为归一化的 NCHW 浮点张量
#[derive(Debug, Clone)]
pub struct NchwTensor {
  data: Box<[f32]>,
  size: u32,
  scale_x: f32,
  scale_y: f32,
}

impl NchwTensor {
  pub fn from_rgb(image: &RgbImage, size: u32) -> Self {
    let (src_w, src_h) = image.dimensions();
    let resized = if (src_w, src_h) == (size, size) {
      image.clone()
    } else {
      image::imageops::resize(image, size, size, FilterType::Triangle)
    };

    let plane = (size * size) as usize;
    let mut data = vec![0f32; RGB_CHANNELS * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y * size + x) as usize;
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    Self {
      data: data.into_boxed_slice(),
      size,
      scale_x: src_w as f32 / size as f32,
      scale_y: src_h as f32 / size as f32,
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.size as usize, self.size as usize]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn into_vec(self) -> Vec<f32> {
    self.data.into_vec()
  }

  /// 把张量坐标映射回原图像素坐标
  pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.scale_x, y * self.scale_y)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_frame_has_requested_size() {
    let frame = blank(WARMUP_SIZE, WARMUP_SIZE);
    assert_eq!(frame.dimensions(), (640, 640));
  }

  #[test]
  fn tensor_is_planar_and_normalized() {
    let mut image = RgbImage::new(2, 2);
    image.put_pixel(1, 0, image::Rgb([255, 0, 51]));
    let tensor = NchwTensor::from_rgb(&image, 2);
    assert_eq!(tensor.shape(), [1, 3, 2, 2]);
    let data = tensor.as_slice();
    assert_eq!(data[1], 1.0);
    assert_eq!(data[4 + 1], 0.0);
    assert!((data[8 + 1] - 0.2).abs() < 1e-6);
  }

  #[test]
  fn coordinates_map_back_to_source() {
    let image = RgbImage::new(1280, 320);
    let tensor = NchwTensor::from_rgb(&image, 640);
    assert_eq!(tensor.to_source(320.0, 320.0), (640.0, 160.0));
  }
}
