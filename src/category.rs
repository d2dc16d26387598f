// 该文件是 HTP Lens 项目的一部分。
// src/category.rs - 绘画类别
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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 绘画类别，每个类别对应一个独立的检测模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  House,
  Tree,
  Person,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的绘画类别: {0:?}")]
pub struct UnknownCategory(pub String);

impl Category {
  pub const ALL: [Category; 3] = [Category::House, Category::Tree, Category::Person];

  pub fn as_str(&self) -> &'static str {
    match self {
      Category::House => "house",
      Category::Tree => "tree",
      Category::Person => "person",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = UnknownCategory;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "house" => Ok(Category::House),
      "tree" => Ok(Category::Tree),
      // 前端按性别提交人物画
      "person" | "person_male" | "person_female" => Ok(Category::Person),
      _ => Err(UnknownCategory(s.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_known_names_and_aliases() {
    assert_eq!("house".parse::<Category>(), Ok(Category::House));
    assert_eq!(" Tree ".parse::<Category>(), Ok(Category::Tree));
    assert_eq!("person_female".parse::<Category>(), Ok(Category::Person));
  }

  #[test]
  fn rejects_unknown_names() {
    assert_eq!(
      "car".parse::<Category>(),
      Err(UnknownCategory("car".to_string()))
    );
  }
}
