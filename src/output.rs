// 该文件是 HTP Lens 项目的一部分。
// src/output.rs - 标注图像输出
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, category::Category};

/// 标注图像的持久化接口。
///
/// 调用在推理工作线程上同步执行，返回的引用路径供外部静态文件服务读取。
/// 同一类别的并发调用不得产生相同路径，唯一性由实现保证。
pub trait AnnotationSink: Send + Sync {
  fn persist(&self, image: &RgbImage, category: Category) -> Result<String, SinkError>;
}

pub mod draw;

mod directory_sink;
pub use self::directory_sink::DirectorySink;

#[derive(Error, Debug)]
pub enum SinkError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("不支持的图像格式: {0}")]
  UnsupportedFormat(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 根据 URL 方案创建标注输出
pub fn sink_from_url(url: &Url) -> Result<Box<dyn AnnotationSink>, SinkError> {
  match url.scheme() {
    DirectorySink::SCHEME => Ok(Box::new(DirectorySink::from_url(url)?)),
    other => Err(SinkError::SchemeMismatch(other.to_string())),
  }
}
