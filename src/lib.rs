// 该文件是 HTP Lens 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod aggregate;
pub mod category;
pub mod config;
pub mod detection;
pub mod dispatch;
pub mod error;
pub mod font;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod palette;
pub mod registry;
pub mod report;
pub mod session;

pub use self::category::Category;
pub use self::error::{ErrorKind, ErrorPayload};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// URL 路径部分对应的本地路径，百分号编码会被还原
pub fn url_file_path(url: &url::Url) -> std::path::PathBuf {
  match urlencoding::decode(url.path()) {
    Ok(path) => std::path::PathBuf::from(path.as_ref()),
    Err(e) => {
      tracing::warn!("URL 路径解码失败，按原样使用 {}: {}", url.path(), e);
      std::path::PathBuf::from(url.path())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_file_path_decodes_escapes() {
    let url = url::Url::parse("replay:///srv/htp data/집.json").unwrap();
    assert_eq!(url_file_path(&url), std::path::PathBuf::from("/srv/htp data/집.json"));
  }
}
