// 该文件是 HTP Lens 项目的一部分。
// src/config.rs - 配置文件
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

//! 配置示例：
//!
//! ```toml
//! [models]
//! house = "replay:///srv/htp/models/house.json"
//! tree = "yolo:///srv/htp/models/tree.onnx?names=/srv/htp/models/tree.txt"
//! person = "yolo:///srv/htp/models/person.onnx?names=/srv/htp/models/person.txt"
//!
//! [registry]
//! required = ["house", "tree", "person"]
//! warmup_size = 640
//! serialize = { tree = true }
//!
//! [dispatch]
//! workers = 4
//! timeout_ms = 30000
//! position_zones = true
//! color_analysis = true
//! annotation = "folder:///srv/htp/uploads/yolo_bbox?prefix=/uploads/yolo_bbox&ext=jpg"
//!
//! [report]
//! font = "fonts/NanumGothic.ttf"
//! output_dir = "uploads/reports"
//! top_n = 10
//! unexpressed_markers = ["(미표현)"]
//! ```

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{category::Category, frame::WARMUP_SIZE};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件 {0} 失败: {1}")]
  Io(PathBuf, #[source] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub models: BTreeMap<Category, Url>,
  pub registry: RegistryConfig,
  pub dispatch: DispatchConfig,
  pub report: ReportConfig,
}

impl Config {
  pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
    let path = path.into();
    let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
    Self::from_toml(&text)
  }

  pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(text)?)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  /// 必须加载成功的类别
  pub required: Vec<Category>,
  pub warmup_size: u32,
  /// 按类别覆盖是否串行调用模型，未配置时由模型自行声明
  pub serialize: BTreeMap<Category, bool>,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      required: Category::ALL.to_vec(),
      warmup_size: WARMUP_SIZE,
      serialize: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
  pub workers: usize,
  pub timeout_ms: u64,
  pub position_zones: bool,
  pub color_analysis: bool,
  /// 标注图像的保存位置，未配置时不保存
  pub annotation: Option<Url>,
  /// 标注文字使用的字体
  pub font: Option<PathBuf>,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      workers: std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2),
      timeout_ms: 30_000,
      position_zones: true,
      color_analysis: true,
      annotation: None,
      font: None,
    }
  }
}

impl DispatchConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
  pub font: Option<PathBuf>,
  pub output_dir: Option<PathBuf>,
  /// 图表临时文件的父目录，默认使用系统临时目录
  pub scratch_dir: Option<PathBuf>,
  pub top_n: usize,
  pub unexpressed_markers: Vec<String>,
  /// 页面栅格化分辨率
  pub dpi: f32,
}

impl Default for ReportConfig {
  fn default() -> Self {
    Self {
      font: Some(PathBuf::from("fonts/NanumGothic.ttf")),
      output_dir: None,
      scratch_dir: None,
      top_n: 10,
      unexpressed_markers: vec!["(미표현)".to_string()],
      dpi: 150.0,
    }
  }
}
