// 该文件是 HTP Lens 项目的一部分。
// src/model/replay.rs - 回放检测器
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

//! 从 JSON 文件回放预先录制的检测结果，不依赖任何推理运行时。
//!
//! 支持三种文件内容：
//!
//! - `[{"label": "창문", "confidence": 0.9, "bbox": [x1, y1, x2, y2]}, ...]`
//! - `{"detections": [...]}`，内容同上
//! - `{"rows": [[x1, y1, x2, y2, conf, cls], ...], "names": ["창문", ...]}`
//!
//! URL 形如 `replay:///path/to/house.json`。

use std::sync::Arc;

use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{RawBox, RawOutput},
  model::{Model, ModelError},
  url_file_path,
};

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayFile {
  Boxes(Vec<RawBox>),
  Wrapped { detections: Vec<RawBox> },
  Table {
    rows: Vec<Vec<f32>>,
    #[serde(default)]
    names: Vec<String>,
  },
}

pub struct Replay {
  name: String,
  output: RawOutput,
}

impl FromUrlWithScheme for Replay {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for Replay {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ModelError::UnsupportedScheme(url.scheme().to_string()));
    }

    let path = url_file_path(url);
    let data = std::fs::read(&path)?;
    Self::from_json(&path.to_string_lossy(), &data)
  }
}

impl Replay {
  pub fn from_json(name: &str, data: &[u8]) -> Result<Self, ModelError> {
    let file: ReplayFile = serde_json::from_slice(data)
      .map_err(|e| ModelError::Invalid(format!("{}: {}", name, e)))?;
    let output = match file {
      ReplayFile::Boxes(boxes) | ReplayFile::Wrapped { detections: boxes } => RawOutput::Boxes(boxes),
      ReplayFile::Table { rows, names } => RawOutput::Table {
        rows,
        names: Arc::from(names),
      },
    };
    debug!("回放文件 {} 包含 {} 个检测结果", name, output.len());

    Ok(Self {
      name: name.to_string(),
      output,
    })
  }
}

impl Model for Replay {
  fn infer(&self, _input: &RgbImage) -> Result<RawOutput, ModelError> {
    Ok(self.output.clone())
  }

  fn name(&self) -> &str {
    &self.name
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_all_file_shapes() {
    let boxes = Replay::from_json("a", br#"[{"label": "door"}]"#).unwrap();
    assert!(matches!(boxes.output, RawOutput::Boxes(ref b) if b.len() == 1));

    let wrapped = Replay::from_json("b", br#"{"detections": [{"label": "door"}, {}]}"#).unwrap();
    assert_eq!(wrapped.output.len(), 2);

    let table = Replay::from_json("c", br#"{"rows": [[0, 0, 1, 1, 0.5, 0]], "names": ["door"]}"#)
      .unwrap();
    assert!(matches!(table.output, RawOutput::Table { ref names, .. } if names[0] == "door"));
  }

  #[test]
  fn invalid_json_is_reported() {
    assert!(matches!(
      Replay::from_json("bad", b"{"),
      Err(ModelError::Invalid(_))
    ));
  }

  #[test]
  fn loads_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("나무 tree.json");
    std::fs::write(&path, br#"[{"label": "roots", "bbox": [1, 2, 3, 4]}]"#).unwrap();
    let url = Url::parse(&format!("replay://{}", path.display())).unwrap();
    let model = Replay::from_url(&url).unwrap();
    let out = model.infer(&RgbImage::new(4, 4)).unwrap();
    assert_eq!(out.len(), 1);
    assert!(model.name().ends_with("나무 tree.json"));
  }
}
