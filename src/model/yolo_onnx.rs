// 该文件是 HTP Lens 项目的一部分。
// src/model/yolo_onnx.rs - ONNX YOLO 检测模型
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

use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;
use ort::{session::Session, value::Tensor};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::RawOutput,
  frame::NchwTensor,
  model::{Model, ModelError},
  url_file_path,
};

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_OBJECT_THRESH: f32 = 0.25;
const YOLO_NMS_THRESH: f32 = 0.45;

/// 导出为 ONNX 的 YOLOv8 风格检测模型，输出形状 `[1, 4 + nc, anchors]`
pub struct YoloOnnx {
  name: String,
  // Session::run 需要 &mut，调用天然串行
  session: Mutex<Session>,
  names: Arc<[String]>,
  input_size: u32,
  object_thresh: f32,
  nms_thresh: f32,
}

pub struct YoloOnnxBuilder {
  model_path: String,
  names_path: Option<String>,
  input_size: u32,
  object_thresh: f32,
  nms_thresh: f32,
}

impl FromUrlWithScheme for YoloOnnxBuilder {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloOnnxBuilder {
  type Error = ModelError;

  /// `yolo:///models/house.onnx?names=/models/house.txt&conf=0.25&iou=0.45&size=640`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::UnsupportedScheme(url.scheme().to_string()));
    }

    let mut builder = YoloOnnxBuilder {
      model_path: url_file_path(url).to_string_lossy().into_owned(),
      names_path: None,
      input_size: YOLO_INPUT_SIZE,
      object_thresh: YOLO_OBJECT_THRESH,
      nms_thresh: YOLO_NMS_THRESH,
    };
    for (k, v) in url.query_pairs() {
      let invalid =
        |e: &dyn std::fmt::Display| ModelError::Invalid(format!("参数 {}={}: {}", k, v, e));
      match k.as_ref() {
        "names" => builder.names_path = Some(v.to_string()),
        "conf" => builder.object_thresh = v.parse().map_err(|e| invalid(&e))?,
        "iou" => builder.nms_thresh = v.parse().map_err(|e| invalid(&e))?,
        "size" => builder.input_size = v.parse().map_err(|e| invalid(&e))?,
        _ => debug!("忽略未知参数: {}", k),
      }
    }
    Ok(builder)
  }
}

impl YoloOnnxBuilder {
  pub fn build(self) -> Result<YoloOnnx, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let session = Session::builder()
      .and_then(|b| b.commit_from_file(&self.model_path))
      .map_err(|e| {
        error!("创建 ONNX 会话失败: {}", e);
        ModelError::Invalid(format!("{}: {}", self.model_path, e))
      })?;

    let names: Vec<String> = match &self.names_path {
      Some(path) => std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect(),
      None => Vec::new(),
    };
    debug!("类别数量: {}", names.len());
    info!("模型加载完成");

    Ok(YoloOnnx {
      name: self.model_path,
      session: Mutex::new(session),
      names: names.into(),
      input_size: self.input_size,
      object_thresh: self.object_thresh,
      nms_thresh: self.nms_thresh,
    })
  }
}

impl Model for YoloOnnx {
  fn infer(&self, input: &RgbImage) -> Result<RawOutput, ModelError> {
    let tensor = NchwTensor::from_rgb(input, self.input_size);
    let value = Tensor::from_array((tensor.shape(), tensor.as_slice().to_vec()))
      .map_err(|e| ModelError::Runtime(e.to_string()))?;

    debug!("执行模型推理");
    let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
    let outputs = session
      .run(ort::inputs![value])
      .map_err(|e| ModelError::Runtime(e.to_string()))?;
    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(|e| ModelError::Runtime(e.to_string()))?;
    let dims: &[i64] = shape;
    if dims.len() != 3 || dims[1] < 5 {
      return Err(ModelError::Invalid(format!("输出形状不符合预期: {:?}", dims)));
    }

    let rows = postprocess(
      &tensor,
      dims[1] as usize,
      dims[2] as usize,
      data,
      self.object_thresh,
      self.nms_thresh,
    );
    debug!("检测到 {} 个物体", rows.len());
    Ok(RawOutput::Table {
      rows,
      names: self.names.clone(),
    })
  }

  fn reentrant(&self) -> bool {
    false
  }

  fn name(&self) -> &str {
    &self.name
  }
}

/// `[1, 4 + classes, anchors]` 输出转为原图坐标的 `[x1, y1, x2, y2, conf, cls]`，按类别做 NMS
fn postprocess(
  tensor: &NchwTensor,
  attrs: usize,
  anchors: usize,
  data: &[f32],
  object_thresh: f32,
  nms_thresh: f32,
) -> Vec<Vec<f32>> {
  let classes = attrs - 4;
  let mut candidates = Vec::new();

  for i in 0..anchors {
    let (mut best, mut cls) = (f32::MIN, 0usize);
    for c in 0..classes {
      let score = data[(4 + c) * anchors + i];
      if score > best {
        best = score;
        cls = c;
      }
    }
    if best <= object_thresh {
      continue;
    }

    let cx = data[i];
    let cy = data[anchors + i];
    let w = data[2 * anchors + i];
    let h = data[3 * anchors + i];
    let (x1, y1) = tensor.to_source(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = tensor.to_source(cx + w / 2.0, cy + h / 2.0);
    candidates.push(vec![x1, y1, x2, y2, best, cls as f32]);
  }

  candidates.sort_by(|a, b| b[4].total_cmp(&a[4]));
  let mut kept: Vec<Vec<f32>> = Vec::new();
  for cand in candidates {
    let suppressed = kept
      .iter()
      .any(|k| k[5] == cand[5] && iou(k, &cand) > nms_thresh);
    if !suppressed {
      kept.push(cand);
    }
  }
  kept
}

fn iou(a: &[f32], b: &[f32]) -> f32 {
  let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = ix * iy;
  let area = |r: &[f32]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
  let union = area(a) + area(b) - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}
