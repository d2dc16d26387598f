// 该文件是 HTP Lens 项目的一部分。
// src/output/directory_sink.rs - 目录标注输出
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

use std::{
  path::PathBuf,
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::Local;
use image::{ImageFormat, RgbImage};
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  category::Category,
  url_file_path,
  output::{AnnotationSink, SinkError},
};

const DEFAULT_PREFIX: &str = "/uploads/yolo_bbox";
const DEFAULT_EXT: &str = "jpg";

/// 把标注图像写入 `{root}/{category}/{timestamp}_bbox.{ext}`，
/// 返回 `{prefix}/{category}/{timestamp}_bbox.{ext}`
pub struct DirectorySink {
  directory: PathBuf,
  prefix: String,
  ext: String,
  format: ImageFormat,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectorySink {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectorySink {
  type Error = SinkError;

  /// `folder:///srv/uploads/yolo_bbox?prefix=/uploads/yolo_bbox&ext=png`
  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SinkError::SchemeMismatch(uri.scheme().to_string()));
    }

    let mut prefix = DEFAULT_PREFIX.to_string();
    let mut ext = DEFAULT_EXT.to_string();
    for (k, v) in uri.query_pairs() {
      match k.as_ref() {
        "prefix" => prefix = v.trim_end_matches('/').to_string(),
        "ext" => ext = v.to_ascii_lowercase(),
        _ => {}
      }
    }

    Self::new(url_file_path(uri), prefix, &ext)
  }
}

impl DirectorySink {
  pub fn new(directory: PathBuf, prefix: String, ext: &str) -> Result<Self, SinkError> {
    let format = ImageFormat::from_extension(ext)
      .filter(|f| matches!(f, ImageFormat::Jpeg | ImageFormat::Png))
      .ok_or_else(|| SinkError::UnsupportedFormat(ext.to_string()))?;

    Ok(Self {
      directory,
      prefix,
      ext: ext.to_string(),
      format,
      frame_counter: AtomicU16::new(0),
    })
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// 毫秒级时间戳加递增计数，保证并发下文件名唯一
  fn file_name(&self) -> String {
    let now = Local::now();
    format!(
      "{}-{:04X}_bbox.{}",
      now.format("%Y%m%d_%H%M%S_%3f"),
      self.frame_id(),
      self.ext
    )
  }
}

impl AnnotationSink for DirectorySink {
  fn persist(&self, image: &RgbImage, category: Category) -> Result<String, SinkError> {
    let directory = self.directory.join(category.as_str());
    std::fs::create_dir_all(&directory)?;

    let file_name = self.file_name();
    let path = directory.join(&file_name);
    image.save_with_format(&path, self.format)?;
    info!("保存标注图像到文件: {}", path.display());

    Ok(format!("{}/{}/{}", self.prefix, category, file_name))
  }
}
