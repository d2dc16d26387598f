// 该文件是 HTP Lens 项目的一部分。
// src/model.rs - 模型
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
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detection::RawOutput};

/// 检测模型。对调用方而言是不透明的打分器：图像进，原始检测结果出。
pub trait Model: Send + Sync {
  fn infer(&self, input: &RgbImage) -> Result<RawOutput, ModelError>;

  /// 能否被多个线程同时调用
  fn reentrant(&self) -> bool {
    true
  }

  fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  Load(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("推理错误: {0}")]
  Runtime(String),
  #[error("不支持的模型方案: {0}")]
  UnsupportedScheme(String),
}

mod replay;
pub use self::replay::Replay;

#[cfg(feature = "model_yolo_onnx")]
mod yolo_onnx;
#[cfg(feature = "model_yolo_onnx")]
pub use self::yolo_onnx::{YoloOnnx, YoloOnnxBuilder};

/// 根据 URL 方案选择模型后端
pub fn load_model(url: &Url) -> Result<Box<dyn Model>, ModelError> {
  info!("加载模型: {}", url);
  match url.scheme() {
    Replay::SCHEME => Ok(Box::new(Replay::from_url(url)?)),
    #[cfg(feature = "model_yolo_onnx")]
    YoloOnnxBuilder::SCHEME => Ok(Box::new(YoloOnnxBuilder::from_url(url)?.build()?)),
    other => Err(ModelError::UnsupportedScheme(other.to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rknn:///models/house.rknn").unwrap();
    assert!(matches!(
      load_model(&url),
      Err(ModelError::UnsupportedScheme(s)) if s == "rknn"
    ));
  }
}
