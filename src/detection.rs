// 该文件是 HTP Lens 项目的一部分。
// src/detection.rs - 检测结果规范化
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

//! 检测器输出有两种形态：按行排列的表格 `[x1, y1, x2, y2, conf, cls]`，
//! 以及带字段名的对象列表。两者都在这里转换为统一的 [`Detection`]，
//! 下游代码只依赖规范形态。

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

const UNKNOWN_LABEL: &str = "unknown";

/// 像素坐标下的检测框，`w`、`h` 恒为非负
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxRect {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

impl BoxRect {
  /// 由对角坐标构造，宽高按 `x2 - x1`、`y2 - y1` 计算并截断到 0
  pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self {
      x: x1,
      y: y1,
      w: non_negative(x2 - x1),
      h: non_negative(y2 - y1),
    }
  }

  pub fn center(&self) -> (f32, f32) {
    (self.x + self.w / 2.0, self.y + self.h / 2.0)
  }

  pub fn area(&self) -> f32 {
    self.w * self.h
  }
}

fn non_negative(v: f32) -> f32 {
  if v.is_nan() { 0.0 } else { v.max(0.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalZone {
  Top,
  Middle,
  Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalZone {
  Left,
  Center,
  Right,
}

/// 图像九宫格位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionZone {
  pub vertical: VerticalZone,
  pub horizontal: HorizontalZone,
}

impl PositionZone {
  /// 按框中心与图像三等分线比较，恰好落在分界线上的归入内侧区域
  pub fn classify(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    let horizontal = if cx < width / 3.0 {
      HorizontalZone::Left
    } else if cx > width * 2.0 / 3.0 {
      HorizontalZone::Right
    } else {
      HorizontalZone::Center
    };
    let vertical = if cy < height / 3.0 {
      VerticalZone::Top
    } else if cy > height * 2.0 / 3.0 {
      VerticalZone::Bottom
    } else {
      VerticalZone::Middle
    };
    Self {
      vertical,
      horizontal,
    }
  }
}

impl fmt::Display for PositionZone {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let v = match self.vertical {
      VerticalZone::Top => "top",
      VerticalZone::Middle => "middle",
      VerticalZone::Bottom => "bottom",
    };
    let h = match self.horizontal {
      HorizontalZone::Left => "left",
      HorizontalZone::Center => "center",
      HorizontalZone::Right => "right",
    };
    write!(f, "{}-{}", v, h)
  }
}

impl FromStr for PositionZone {
  type Err = String;

  // 历史数据中两种顺序都出现过："top-left" 与 "left-top"
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut vertical = None;
    let mut horizontal = None;
    for part in s.trim().split('-') {
      match part {
        "top" => vertical = Some(VerticalZone::Top),
        "middle" => vertical = Some(VerticalZone::Middle),
        "bottom" => vertical = Some(VerticalZone::Bottom),
        "left" => horizontal = Some(HorizontalZone::Left),
        "center" => horizontal = Some(HorizontalZone::Center),
        "right" => horizontal = Some(HorizontalZone::Right),
        _ => return Err(format!("无法识别的位置: {}", s)),
      }
    }
    match (vertical, horizontal) {
      (Some(vertical), Some(horizontal)) => Ok(Self {
        vertical,
        horizontal,
      }),
      _ => Err(format!("位置不完整: {}", s)),
    }
  }
}

impl Serialize for PositionZone {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for PositionZone {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// 规范化的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  #[serde(rename = "box")]
  pub bbox: BoxRect,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub area_ratio: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position_zone: Option<PositionZone>,
}

/// 对象列表形态的原始检测项，所有字段都可能缺失
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawBox {
  #[serde(default)]
  pub label: Option<String>,
  #[serde(default)]
  pub class_id: Option<u32>,
  #[serde(default)]
  pub confidence: Option<f32>,
  #[serde(default)]
  pub x1: Option<f32>,
  #[serde(default)]
  pub y1: Option<f32>,
  #[serde(default)]
  pub x2: Option<f32>,
  #[serde(default)]
  pub y2: Option<f32>,
  /// `[x1, y1, x2, y2]`，字段缺失时作为备选
  #[serde(default)]
  pub bbox: Option<Vec<f32>>,
  /// 检测器自报的宽高，不参与计算
  #[serde(default)]
  pub width: Option<f32>,
  #[serde(default)]
  pub height: Option<f32>,
}

impl RawBox {
  fn corner(&self, explicit: Option<f32>, idx: usize) -> f32 {
    explicit
      .or_else(|| self.bbox.as_ref().and_then(|b| b.get(idx).copied()))
      .unwrap_or(0.0)
  }
}

/// 检测器的原始输出
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
  /// 每行 `[x1, y1, x2, y2, confidence, class_id]`，末尾的列可能缺失
  Table {
    rows: Vec<Vec<f32>>,
    names: Arc<[String]>,
  },
  Boxes(Vec<RawBox>),
}

impl RawOutput {
  pub fn len(&self) -> usize {
    match self {
      RawOutput::Table { rows, .. } => rows.len(),
      RawOutput::Boxes(boxes) => boxes.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// 规范化选项
#[derive(Debug, Clone, Copy)]
pub struct Canonicalize {
  pub width: u32,
  pub height: u32,
  pub position_zones: bool,
}

impl Canonicalize {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      position_zones: false,
    }
  }

  pub fn with_position_zones(mut self, enabled: bool) -> Self {
    self.position_zones = enabled;
    self
  }

  pub fn apply(&self, raw: RawOutput) -> Vec<Detection> {
    let detections: Vec<Detection> = match raw {
      RawOutput::Table { rows, names } => rows
        .iter()
        .map(|row| {
          let at = |i: usize| row.get(i).copied().unwrap_or(0.0);
          let label = match row.get(5) {
            Some(&cls) if cls >= 0.0 => names
              .get(cls as usize)
              .cloned()
              .unwrap_or_else(|| format!("{}", cls as u32)),
            _ => UNKNOWN_LABEL.to_string(),
          };
          self.build(label, row.get(4).copied(), at(0), at(1), at(2), at(3))
        })
        .collect(),
      RawOutput::Boxes(boxes) => boxes
        .iter()
        .map(|b| {
          let label = b
            .label
            .clone()
            .or_else(|| b.class_id.map(|id| id.to_string()))
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
          self.build(
            label,
            b.confidence,
            b.corner(b.x1, 0),
            b.corner(b.y1, 1),
            b.corner(b.x2, 2),
            b.corner(b.y2, 3),
          )
        })
        .collect(),
    };
    debug!("规范化得到 {} 个检测结果", detections.len());
    detections
  }

  fn build(
    &self,
    label: String,
    confidence: Option<f32>,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
  ) -> Detection {
    let confidence = match confidence {
      Some(c) if !c.is_nan() => c.clamp(0.0, 1.0),
      _ => 0.0,
    };
    let bbox = BoxRect::from_corners(x1, y1, x2, y2);
    let (width, height) = (self.width as f32, self.height as f32);
    let image_area = width * height;
    let area_ratio = (image_area > 0.0).then(|| (bbox.area() / image_area).clamp(0.0, 1.0));
    let position_zone = (self.position_zones && image_area > 0.0).then(|| {
      let (cx, cy) = bbox.center();
      PositionZone::classify(cx, cy, width, height)
    });

    Detection {
      label,
      confidence,
      bbox,
      area_ratio,
      position_zone,
    }
  }
}
