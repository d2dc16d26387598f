// 该文件是 HTP Lens 项目的一部分。
// src/font.rs - 字体加载
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

use std::path::Path;

use ab_glyph::FontArc;
use tracing::{info, warn};

/// 加载字体文件。缺失或损坏只降级为无字体渲染，不报错。
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
  let path = path?;
  let data = match std::fs::read(path) {
    Ok(data) => data,
    Err(e) => {
      warn!("无法读取字体文件 {}: {}，使用内置字体", path.display(), e);
      return None;
    }
  };

  match FontArc::try_from_vec(data) {
    Ok(font) => {
      info!("加载字体: {}", path.display());
      Some(font)
    }
    Err(e) => {
      warn!("字体文件 {} 无效: {}，使用内置字体", path.display(), e);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_or_invalid_font_degrades() {
    assert!(load_font(None).is_none());
    assert!(load_font(Some(Path::new("/nonexistent/htp/font.ttf"))).is_none());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(load_font(Some(&path)).is_none());
  }
}
