// 该文件是 HTP Lens 项目的一部分。
// src/dispatch.rs - 推理调度
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

//! 请求在 tokio 上接收，推理放到阻塞线程池里执行，并由信号量限制同时运行的数量。
//!
//! 类别检查和图像解码都在获取工作槽之前完成，失败的请求不会占用槽位。
//! 推理一旦开始就不会被打断：超时只让调用方先拿到 `InferenceTimeout`，
//! 后台的推理跑完后丢弃结果并归还槽位。

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
  category::Category,
  config::DispatchConfig,
  detection::{Canonicalize, Detection},
  error::{ErrorKind, ErrorPayload},
  font,
  input::{DecodeError, DecodedDrawing},
  model::ModelError,
  output::{AnnotationSink, SinkError, draw::Draw, sink_from_url},
  palette::{ColorShare, dominant_colors},
  registry::{ModelRegistry, ModelSlot},
  session::DrawingRecord,
};

#[derive(Error, Debug)]
pub enum DispatchError {
  #[error("未知的画作类别: {0}")]
  UnknownCategory(String),
  #[error("图像解码失败: {0}")]
  DecodeFailure(#[from] DecodeError),
  #[error("推理超时 ({0:?})")]
  InferenceTimeout(Duration),
  #[error("推理失败: {0}")]
  Inference(#[from] ModelError),
  #[error("推理工作线程异常: {0}")]
  Worker(String),
}

impl DispatchError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      DispatchError::UnknownCategory(_) => ErrorKind::UnknownCategory,
      DispatchError::DecodeFailure(_) => ErrorKind::DecodeFailure,
      DispatchError::InferenceTimeout(_) => ErrorKind::InferenceTimeout,
      DispatchError::Inference(_) | DispatchError::Worker(_) => ErrorKind::InferenceFailure,
    }
  }

  pub fn to_payload(&self) -> ErrorPayload {
    ErrorPayload::new(self.kind(), self.to_string())
  }
}

/// 单幅画作的分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingAnalysis {
  #[serde(rename = "type")]
  pub kind: Category,
  pub objects: Vec<Detection>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub annotated_image_ref: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub colors: Option<Vec<ColorShare>>,
}

impl DrawingAnalysis {
  /// 附上作画时长，固化为会话记录
  pub fn into_record(self, duration_seconds: u64) -> DrawingRecord {
    DrawingRecord {
      kind: self.kind,
      duration_seconds,
      detections: self.objects,
      annotated_image_ref: self.annotated_image_ref,
    }
  }
}

/// 对外的响应，错误不会以 `Err` 的形式越过边界
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SubmitResponse {
  Ok(DrawingAnalysis),
  Err(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
  pub ok: bool,
  pub loaded: Vec<Category>,
}

pub struct Dispatcher {
  registry: Arc<ModelRegistry>,
  sink: Option<Arc<dyn AnnotationSink>>,
  draw: Arc<Draw>,
  permits: Arc<Semaphore>,
  workers: usize,
  timeout: Duration,
  position_zones: bool,
  color_analysis: bool,
}

impl Dispatcher {
  /// 按配置创建调度器，标注输出由 `annotation` URL 决定
  pub fn new(registry: Arc<ModelRegistry>, config: &DispatchConfig) -> Result<Self, SinkError> {
    let sink: Option<Arc<dyn AnnotationSink>> = match &config.annotation {
      Some(url) => Some(Arc::from(sink_from_url(url)?)),
      None => None,
    };
    let workers = config.workers.max(1);
    info!(
      "推理调度器: {} 个工作槽, 超时 {:?}, 标注输出: {}",
      workers,
      config.timeout(),
      config
        .annotation
        .as_ref()
        .map(|u| u.as_str())
        .unwrap_or("无")
    );

    Ok(Self {
      registry,
      sink,
      draw: Arc::new(Draw::new(font::load_font(config.font.as_deref()))),
      permits: Arc::new(Semaphore::new(workers)),
      workers,
      timeout: config.timeout(),
      position_zones: config.position_zones,
      color_analysis: config.color_analysis,
    })
  }

  pub fn with_sink(mut self, sink: Arc<dyn AnnotationSink>) -> Self {
    self.sink = Some(sink);
    self
  }

  pub fn workers(&self) -> usize {
    self.workers
  }

  /// 当前空闲的工作槽数量
  pub fn available_slots(&self) -> usize {
    self.permits.available_permits()
  }

  pub async fn submit_drawing(
    &self,
    category: &str,
    bytes: &[u8],
  ) -> Result<DrawingAnalysis, DispatchError> {
    let category: Category = category
      .parse()
      .map_err(|_| DispatchError::UnknownCategory(category.to_string()))?;
    let slot = self
      .registry
      .get(category)
      .map_err(|_| DispatchError::UnknownCategory(category.to_string()))?;
    let drawing = DecodedDrawing::decode(bytes)?;

    let permit = self
      .permits
      .clone()
      .acquire_owned()
      .await
      .map_err(|e| DispatchError::Worker(e.to_string()))?;
    debug!("类别 {} 获取工作槽，剩余 {}", category, self.available_slots());

    let job = Job {
      slot,
      drawing,
      sink: self.sink.clone(),
      draw: self.draw.clone(),
      position_zones: self.position_zones,
      color_analysis: self.color_analysis,
    };
    let handle = tokio::task::spawn_blocking(move || {
      let _permit = permit;
      job.run()
    });

    match tokio::time::timeout(self.timeout, handle).await {
      Ok(Ok(result)) => result,
      Ok(Err(e)) => Err(DispatchError::Worker(e.to_string())),
      Err(_) => {
        warn!("类别 {} 推理超过 {:?}，结果将被丢弃", category, self.timeout);
        Err(DispatchError::InferenceTimeout(self.timeout))
      }
    }
  }

  pub async fn respond(&self, category: &str, bytes: &[u8]) -> SubmitResponse {
    match self.submit_drawing(category, bytes).await {
      Ok(analysis) => SubmitResponse::Ok(analysis),
      Err(e) => {
        warn!("画作分析失败 ({:?}): {}", e.kind(), e);
        SubmitResponse::Err(e.to_payload())
      }
    }
  }

  pub fn health(&self) -> HealthReport {
    let loaded: Vec<Category> = self.registry.health().into_iter().collect();
    HealthReport {
      ok: !loaded.is_empty(),
      loaded,
    }
  }
}

/// 在工作线程上顺序执行的一次分析
struct Job {
  slot: Arc<ModelSlot>,
  drawing: DecodedDrawing,
  sink: Option<Arc<dyn AnnotationSink>>,
  draw: Arc<Draw>,
  position_zones: bool,
  color_analysis: bool,
}

impl Job {
  fn run(self) -> Result<DrawingAnalysis, DispatchError> {
    let category = self.slot.category();
    let image = self.drawing.to_rgb();
    let (width, height) = image.dimensions();

    let now = Instant::now();
    let raw = self.slot.run(&image)?;
    info!(
      "类别 {} 推理完成，耗时: {:.2?}，原始结果 {} 条",
      category,
      now.elapsed(),
      raw.len()
    );

    let objects = Canonicalize::new(width, height)
      .with_position_zones(self.position_zones)
      .apply(raw);

    let colors = self
      .color_analysis
      .then(|| dominant_colors(&self.drawing.to_rgba()));

    let annotated_image_ref = self.sink.as_ref().and_then(|sink| {
      let annotated = self.draw.annotate(&image, &objects);
      match sink.persist(&annotated, category) {
        Ok(path) => Some(path),
        Err(e) => {
          warn!("类别 {} 的标注图像保存失败: {}", category, e);
          None
        }
      }
    });

    Ok(DrawingAnalysis {
      kind: category,
      objects,
      annotated_image_ref,
      colors,
    })
  }
}
