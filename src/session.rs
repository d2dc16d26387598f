// 该文件是 HTP Lens 项目的一部分。
// src/session.rs - 检查会话数据
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

//! 会话数据由上游拼装，字段拼写和类型都不可靠。这里宽松地解析：
//! 时长不是数字按 0 计，`analysis` 既可能是数组也可能包在对象里，
//! 缺失的文本字段用 `-` 代替。只有整体结构错误才报错。

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  category::Category,
  detection::{BoxRect, Detection, PositionZone},
};

const MISSING: &str = "-";

#[derive(Error, Debug)]
pub enum PayloadError {
  #[error("会话数据不是 JSON 对象")]
  NotAnObject,
  #[error("drawings 字段不是数组")]
  DrawingsNotArray,
  #[error("JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub name: String,
  pub gender: String,
  pub birth: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingRecord {
  #[serde(rename = "type")]
  pub kind: Category,
  pub duration_seconds: u64,
  pub detections: Vec<Detection>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub annotated_image_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
  pub session_id: String,
  pub user: User,
  pub created_at: DateTime<FixedOffset>,
  pub drawings: Vec<DrawingRecord>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub overall_summary: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub diagnosis: Option<String>,
}

impl SessionPayload {
  pub fn from_slice(data: &[u8]) -> Result<Self, PayloadError> {
    let value: Value = serde_json::from_slice(data)?;
    Self::from_value(&value)
  }

  pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
    let root = value.as_object().ok_or(PayloadError::NotAnObject)?;

    let drawings = match root.get("drawings") {
      None | Some(Value::Null) => Vec::new(),
      Some(Value::Array(items)) => items.iter().filter_map(parse_drawing).collect(),
      Some(_) => return Err(PayloadError::DrawingsNotArray),
    };

    let user_root = root.get("user").and_then(Value::as_object);
    let user_field = |key: &str| {
      user_root
        .and_then(|u| text(u, &[key]))
        .or_else(|| text(root, &[key]))
        .unwrap_or_else(|| MISSING.to_string())
    };
    let user = User {
      name: user_field("name"),
      gender: user_field("gender"),
      birth: user_field("birth"),
    };

    let created_at = match text(root, &["created_at", "createdAt"]) {
      Some(raw) => parse_timestamp(&raw).unwrap_or_else(|| {
        warn!("无法解析检查时间 {:?}，使用当前时间", raw);
        now()
      }),
      None => now(),
    };

    let payload = SessionPayload {
      session_id: text(root, &["session_id", "id"]).unwrap_or_else(|| MISSING.to_string()),
      user,
      created_at,
      drawings,
      overall_summary: text(root, &["overall_summary"]),
      diagnosis: text(root, &["diagnosis"]),
    };
    debug!(
      "会话 {} 包含 {} 幅画作",
      payload.session_id,
      payload.drawings.len()
    );
    Ok(payload)
  }
}

fn now() -> DateTime<FixedOffset> {
  Local::now().fixed_offset()
}

/// 取第一个非空字符串字段，数字也按文本接受
fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|k| match obj.get(*k) {
    Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
    Some(Value::Number(n)) => Some(n.to_string()),
    _ => None,
  })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
  let raw = raw.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Some(ts);
  }
  let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
    .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
    .ok()
    .or_else(|| {
      NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    })?;
  FixedOffset::east_opt(0)?.from_local_datetime(&naive).single()
}

/// 数字、数字字符串都接受；负数、小数截断，其余按 0 计
pub fn lenient_seconds(value: Option<&Value>) -> u64 {
  let seconds = match value {
    Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
    Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f.max(0.0) as u64),
    _ => None,
  };
  seconds.unwrap_or(0)
}

/// `analysis` 可能是数组，也可能是 `{"analysis": [...]}`，其他一律视为空
pub fn analysis_items(value: Option<&Value>) -> &[Value] {
  match value {
    Some(Value::Array(items)) => items,
    Some(Value::Object(wrapper)) => match wrapper.get("analysis") {
      Some(Value::Array(items)) => items,
      _ => &[],
    },
    _ => &[],
  }
}

fn parse_drawing(value: &Value) -> Option<DrawingRecord> {
  let obj = value.as_object()?;
  let result = obj.get("result").and_then(Value::as_object);

  let kind_text =
    text(obj, &["type", "subtype"]).or_else(|| result.and_then(|r| text(r, &["type"])));
  let kind = match kind_text.as_deref().map(str::parse::<Category>) {
    Some(Ok(kind)) => kind,
    Some(Err(e)) => {
      warn!("跳过画作: {}", e);
      return None;
    }
    None => {
      warn!("跳过缺少类别的画作");
      return None;
    }
  };

  let duration = obj
    .get("duration_seconds")
    .or_else(|| obj.get("duration"))
    .or_else(|| result.and_then(|r| r.get("duration")));

  let items = ["detections", "analysis", "objects"]
    .iter()
    .map(|k| analysis_items(obj.get(*k)))
    .find(|items| !items.is_empty())
    .or_else(|| result.map(|r| analysis_items(r.get("analysis"))))
    .unwrap_or(&[]);

  Some(DrawingRecord {
    kind,
    duration_seconds: lenient_seconds(duration),
    detections: items.iter().filter_map(parse_detection).collect(),
    annotated_image_ref: text(obj, &["annotated_image_ref", "image", "path"]),
  })
}

fn number(obj: &Map<String, Value>, key: &str) -> Option<f32> {
  obj.get(key).and_then(Value::as_f64).map(|f| f as f32)
}

/// 没有字符串标签的条目直接跳过
fn parse_detection(value: &Value) -> Option<Detection> {
  let obj = value.as_object()?;
  let label = match obj.get("label") {
    Some(Value::String(label)) => label.clone(),
    _ => return None,
  };

  let bbox = match (obj.get("box"), obj.get("bbox")) {
    (Some(Value::Object(b)), _) => BoxRect {
      x: number(b, "x").unwrap_or(0.0),
      y: number(b, "y").unwrap_or(0.0),
      w: number(b, "w").unwrap_or(0.0).max(0.0),
      h: number(b, "h").unwrap_or(0.0).max(0.0),
    },
    (_, Some(Value::Array(corners))) => {
      let at = |i: usize| corners.get(i).and_then(Value::as_f64).unwrap_or(0.0) as f32;
      BoxRect::from_corners(at(0), at(1), at(2), at(3))
    }
    _ => BoxRect::default(),
  };

  let position_zone = obj
    .get("position_zone")
    .or_else(|| obj.get("position"))
    .and_then(Value::as_str)
    .and_then(|s| s.parse::<PositionZone>().ok());

  Some(Detection {
    label,
    confidence: number(obj, "confidence").unwrap_or(0.0).clamp(0.0, 1.0),
    bbox,
    area_ratio: number(obj, "area_ratio")
      .or_else(|| number(obj, "areaRatio"))
      .map(|r| r.clamp(0.0, 1.0)),
    position_zone,
  })
}
