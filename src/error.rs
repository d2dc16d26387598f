// 该文件是 HTP Lens 项目的一部分。
// src/error.rs - 对外错误描述
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

use serde::{Deserialize, Serialize};

/// 错误分类，调用方据此决定是否重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
  UnknownCategory,
  DecodeFailure,
  InferenceTimeout,
  InferenceFailure,
  ModelLoadFailure,
  RenderFailure,
  ConfigError,
}

impl ErrorKind {
  pub fn is_retriable(&self) -> bool {
    matches!(self, ErrorKind::InferenceTimeout | ErrorKind::InferenceFailure)
  }
}

/// 机器可读的错误结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
  pub error: ErrorKind,
  pub message: String,
  pub retriable: bool,
}

impl ErrorPayload {
  pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      error,
      message: message.into(),
      retriable: error.is_retriable(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payload_serializes_kind_by_name() {
    let payload = ErrorPayload::new(ErrorKind::InferenceTimeout, "too slow");
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["error"], "InferenceTimeout");
    assert_eq!(json["retriable"], true);
  }
}
