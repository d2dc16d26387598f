// 该文件是 HTP Lens 项目的一部分。
// src/aggregate.rs - 跨画作汇总
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

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
  category::Category,
  config::ReportConfig,
  session::{PayloadError, SessionPayload},
};

pub const DEFAULT_TOP_N: usize = 10;

/// 会话汇总，每次生成报告时重新计算
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationSummary {
  /// 按首次出现顺序排列
  pub duration_by_type: Vec<(Category, u64)>,
  pub total_duration_seconds: u64,
  /// 按次数降序，次数相同按首次出现顺序
  pub label_frequency_top_n: Vec<(String, usize)>,
}

impl AggregationSummary {
  pub fn duration_of(&self, category: Category) -> Option<u64> {
    self
      .duration_by_type
      .iter()
      .find(|(c, _)| *c == category)
      .map(|(_, s)| *s)
  }
}

/// 去掉“未表现”标记后比较标签，使缺失特征与其表现形式计为同一标签
#[derive(Debug, Clone)]
pub struct LabelNormalizer {
  markers: Vec<String>,
}

impl Default for LabelNormalizer {
  fn default() -> Self {
    Self::new(["(미표현)"])
  }
}

impl LabelNormalizer {
  pub fn new<S: Into<String>>(markers: impl IntoIterator<Item = S>) -> Self {
    Self {
      markers: markers
        .into_iter()
        .map(Into::into)
        .filter(|m: &String| !m.is_empty())
        .collect(),
    }
  }

  pub fn normalize(&self, label: &str) -> String {
    let mut label = label.to_string();
    for marker in &self.markers {
      label = label.replace(marker.as_str(), "");
    }
    label.trim().to_string()
  }
}

#[derive(Debug, Clone)]
pub struct Aggregator {
  normalizer: LabelNormalizer,
  top_n: usize,
}

impl Default for Aggregator {
  fn default() -> Self {
    Self::new(LabelNormalizer::default(), DEFAULT_TOP_N)
  }
}

impl Aggregator {
  pub fn new(normalizer: LabelNormalizer, top_n: usize) -> Self {
    Self { normalizer, top_n }
  }

  pub fn from_config(config: &ReportConfig) -> Self {
    Self::new(
      LabelNormalizer::new(config.unexpressed_markers.iter().cloned()),
      config.top_n,
    )
  }

  pub fn summarize(&self, payload: &SessionPayload) -> AggregationSummary {
    let mut duration_by_type: Vec<(Category, u64)> = Vec::new();
    for drawing in &payload.drawings {
      match duration_by_type.iter_mut().find(|(c, _)| *c == drawing.kind) {
        Some((_, total)) => *total = total.saturating_add(drawing.duration_seconds),
        None => duration_by_type.push((drawing.kind, drawing.duration_seconds)),
      }
    }
    let total_duration_seconds = duration_by_type
      .iter()
      .fold(0u64, |acc, (_, s)| acc.saturating_add(*s));

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for detection in payload.drawings.iter().flat_map(|d| &d.detections) {
      let label = self.normalizer.normalize(&detection.label);
      if label.is_empty() {
        continue;
      }
      match index.get(&label) {
        Some(&i) => counts[i].1 += 1,
        None => {
          index.insert(label.clone(), counts.len());
          counts.push((label, 1));
        }
      }
    }
    // 稳定排序保留首次出现顺序
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(self.top_n);

    debug!(
      "汇总会话 {}: {} 个类别, 总时长 {} 秒, {} 个标签",
      payload.session_id,
      duration_by_type.len(),
      total_duration_seconds,
      counts.len()
    );

    AggregationSummary {
      duration_by_type,
      total_duration_seconds,
      label_frequency_top_n: counts,
    }
  }

  /// 直接从上游 JSON 汇总
  pub fn summarize_json(&self, value: &Value) -> Result<AggregationSummary, PayloadError> {
    Ok(self.summarize(&SessionPayload::from_value(value)?))
  }
}

/// `"{m}분 {s}초"`，不足一分钟时只显示秒
pub fn format_duration(seconds: u64) -> String {
  let (m, s) = (seconds / 60, seconds % 60);
  if m > 0 {
    format!("{}분 {}초", m, s)
  } else {
    format!("{}초", s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn payload(value: Value) -> SessionPayload {
    SessionPayload::from_value(&value).unwrap()
  }

  #[test]
  fn durations_are_grouped_by_type() {
    let p = payload(json!({"drawings": [
      {"type": "house", "duration_seconds": 125},
      {"type": "tree", "duration_seconds": 40},
      {"type": "house", "duration_seconds": 55}
    ]}));
    let summary = Aggregator::default().summarize(&p);
    assert_eq!(
      summary.duration_by_type,
      vec![(Category::House, 180), (Category::Tree, 40)]
    );
    assert_eq!(summary.total_duration_seconds, 220);
    assert_eq!(format_duration(summary.duration_of(Category::House).unwrap()), "3분 0초");
    assert_eq!(format_duration(summary.duration_of(Category::Tree).unwrap()), "40초");
    assert_eq!(format_duration(summary.total_duration_seconds), "3분 40초");
  }

  #[test]
  fn non_numeric_duration_contributes_zero() {
    let p = payload(json!({"drawings": [
      {"type": "house", "duration_seconds": "soon"},
      {"type": "house", "duration_seconds": 30},
      {"type": "person"}
    ]}));
    let summary = Aggregator::default().summarize(&p);
    assert_eq!(
      summary.duration_by_type,
      vec![(Category::House, 30), (Category::Person, 0)]
    );
    let sum: u64 = summary.duration_by_type.iter().map(|(_, s)| s).sum();
    assert_eq!(sum, summary.total_duration_seconds);
  }

  #[test]
  fn oversized_durations_saturate() {
    let p = payload(json!({"drawings": [
      {"type": "house", "duration_seconds": u64::MAX},
      {"type": "house", "duration_seconds": 10},
      {"type": "tree", "duration": 1e19},
      {"type": "person", "duration_seconds": u64::MAX}
    ]}));
    let summary = Aggregator::default().summarize(&p);
    assert_eq!(summary.duration_of(Category::House), Some(u64::MAX));
    assert_eq!(summary.duration_of(Category::Tree), Some(10_000_000_000_000_000_000));
    assert_eq!(summary.total_duration_seconds, u64::MAX);
  }

  #[test]
  fn unexpressed_marker_is_merged() {
    let labels = ["window", "window", "door(미표현)", "door", "chimney"];
    let analysis: Vec<Value> = labels
      .iter()
      .cycle()
      .take(12)
      .map(|l| json!({"label": l}))
      .collect();
    let p = payload(json!({"drawings": [{"type": "house", "analysis": analysis}]}));
    let summary = Aggregator::default().summarize(&p);
    assert!(summary.label_frequency_top_n.len() <= 10);
    assert_eq!(
      summary.label_frequency_top_n,
      vec![
        ("window".to_string(), 6),
        ("door".to_string(), 4),
        ("chimney".to_string(), 2)
      ]
    );
  }

  #[test]
  fn top_n_is_truncated_and_ties_keep_first_seen_order() {
    let mut analysis = Vec::new();
    for i in 0..15 {
      analysis.push(json!({"label": format!("label{}", i)}));
    }
    analysis.push(json!({"label": "label14"}));
    let p = payload(json!({"drawings": [
      {"type": "tree", "analysis": {"analysis": analysis}}
    ]}));
    let summary = Aggregator::default().summarize(&p);
    assert_eq!(summary.label_frequency_top_n.len(), 10);
    assert_eq!(summary.label_frequency_top_n[0], ("label14".to_string(), 2));
    let rest: Vec<&str> = summary.label_frequency_top_n[1..]
      .iter()
      .map(|(l, _)| l.as_str())
      .collect();
    assert_eq!(
      rest,
      vec!["label0", "label1", "label2", "label3", "label4", "label5", "label6", "label7", "label8"]
    );
    assert!(
      summary
        .label_frequency_top_n
        .windows(2)
        .all(|w| w[0].1 >= w[1].1)
    );
  }

  #[test]
  fn markers_are_configurable() {
    let p = payload(json!({"drawings": [{"type": "tree", "analysis": [
      {"label": "roots [absent]"}, {"label": "roots"}, {"label": "(미표현)"}
    ]}]}));
    let aggregator = Aggregator::new(LabelNormalizer::new(["[absent]", "(미표현)"]), 10);
    assert_eq!(
      aggregator.summarize(&p).label_frequency_top_n,
      vec![("roots".to_string(), 2)]
    );
  }

  #[test]
  fn summarize_is_idempotent() {
    let p = payload(json!({"drawings": [
      {"type": "house", "duration": 10, "analysis": [{"label": "a"}, {"label": "b"}]},
      {"type": "tree", "duration": 20, "analysis": [{"label": "b"}]}
    ]}));
    let aggregator = Aggregator::default();
    assert_eq!(aggregator.summarize(&p), aggregator.summarize(&p));
  }

  #[test]
  fn non_list_analysis_counts_as_empty() {
    let summary = Aggregator::default()
      .summarize_json(&json!({"drawings": [{"type": "house", "analysis": "n/a"}]}))
      .unwrap();
    assert!(summary.label_frequency_top_n.is_empty());
  }
}
