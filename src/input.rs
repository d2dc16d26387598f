// 该文件是 HTP Lens 项目的一部分。
// src/input.rs - 上传图像解码
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

use image::{DynamicImage, ImageReader, RgbImage, RgbaImage};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("上传内容为空")]
  Empty,
  #[error("无法识别图像格式: {0}")]
  UnknownFormat(std::io::Error),
  #[error("图像解码错误: {0}")]
  Image(#[from] image::ImageError),
}

/// 解码后的画作，保留透明通道供颜色分析使用
#[derive(Debug, Clone)]
pub struct DecodedDrawing {
  image: DynamicImage,
}

impl DecodedDrawing {
  pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
    if bytes.is_empty() {
      return Err(DecodeError::Empty);
    }

    let image = ImageReader::new(Cursor::new(bytes))
      .with_guessed_format()
      .map_err(DecodeError::UnknownFormat)?
      .decode()?;
    debug!(
      "解码上传图像: {}x{}, {:?}",
      image.width(),
      image.height(),
      image.color()
    );

    Ok(Self { image })
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.image.width(), self.image.height())
  }

  pub fn to_rgb(&self) -> RgbImage {
    self.image.to_rgb8()
  }

  pub fn to_rgba(&self) -> RgbaImage {
    self.image.to_rgba8()
  }
}

impl From<RgbImage> for DecodedDrawing {
  fn from(image: RgbImage) -> Self {
    Self {
      image: DynamicImage::ImageRgb8(image),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(w, h))
      .write_to(&mut buf, image::ImageFormat::Png)
      .unwrap();
    buf.into_inner()
  }

  #[test]
  fn decodes_png_upload() {
    let drawing = DecodedDrawing::decode(&png_bytes(12, 7)).unwrap();
    assert_eq!(drawing.dimensions(), (12, 7));
  }

  #[test]
  fn rejects_empty_and_corrupt_uploads() {
    assert!(matches!(DecodedDrawing::decode(&[]), Err(DecodeError::Empty)));
    assert!(DecodedDrawing::decode(b"definitely not an image").is_err());

    let mut truncated = png_bytes(32, 32);
    truncated.truncate(20);
    assert!(DecodedDrawing::decode(&truncated).is_err());
  }
}
