// 该文件是 HTP Lens 项目的一部分。
// tests/pipeline.rs - 从画作分析到报告的完整流程
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

use std::{io::Cursor, path::Path, sync::Arc};

use chrono::DateTime;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::Document;
use serde_json::json;

use htp_lens::{
  Category, ErrorKind,
  aggregate::format_duration,
  config::Config,
  dispatch::{Dispatcher, SubmitResponse},
  registry::ModelRegistry,
  report::ReportAssembler,
  session::{SessionPayload, User},
};

fn write_replays(dir: &Path) {
  std::fs::write(
    dir.join("house.json"),
    json!([
      {"label": "window", "confidence": 0.91, "x1": 10, "y1": 10, "x2": 40, "y2": 30},
      {"label": "window", "confidence": 0.88, "bbox": [60, 10, 90, 30]},
      {"label": "door(미표현)", "confidence": 0.4}
    ])
    .to_string(),
  )
  .unwrap();
  std::fs::write(
    dir.join("tree.json"),
    json!({"rows": [[20, 5, 80, 95, 0.7, 0], [0, 0, 10, 10, 0.2, 1]], "names": ["trunk", "door"]})
      .to_string(),
  )
  .unwrap();
  std::fs::write(
    dir.join("person.json"),
    json!({"detections": [{"label": "head", "x1": 40, "y1": 5, "x2": 60, "y2": 25, "width": 999}]})
      .to_string(),
  )
  .unwrap();
}

fn config(dir: &Path) -> Config {
  let models = Category::ALL
    .iter()
    .map(|c| format!("{c} = \"replay://{}/{c}.json\"", dir.display()))
    .collect::<Vec<_>>()
    .join("\n");
  Config::from_toml(&format!(
    r#"
      [models]
      {models}

      [registry]
      warmup_size = 32

      [dispatch]
      workers = 2
      timeout_ms = 5000
      annotation = "folder://{root}/annotated?prefix=/uploads/yolo_bbox&ext=png"

      [report]
      font = "{root}/missing-font.ttf"
      scratch_dir = "{root}/scratch"
    "#,
    models = models,
    root = dir.display(),
  ))
  .unwrap()
}

fn drawing_png() -> Vec<u8> {
  let mut image = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
  for x in 20..80 {
    image.put_pixel(x, 50, Rgb([139, 69, 19]));
  }
  let mut buf = Cursor::new(Vec::new());
  DynamicImage::ImageRgb8(image)
    .write_to(&mut buf, ImageFormat::Png)
    .unwrap();
  buf.into_inner()
}

#[tokio::test]
async fn drawings_flow_into_a_four_page_report() {
  let dir = tempfile::tempdir().unwrap();
  write_replays(dir.path());
  let config = config(dir.path());

  let registry = ModelRegistry::load_all(&config.models, &config.registry).unwrap();
  let dispatcher = Dispatcher::new(Arc::new(registry), &config.dispatch).unwrap();
  assert_eq!(dispatcher.health().loaded, Category::ALL.to_vec());

  let png = drawing_png();
  let mut drawings = Vec::new();
  for (category, seconds) in [("house", 125), ("tree", 40), ("house", 55), ("person", 0)] {
    let analysis = dispatcher.submit_drawing(category, &png).await.unwrap();
    assert!(analysis.annotated_image_ref.is_some());
    drawings.push(analysis.into_record(seconds));
  }

  let tree = &drawings[1];
  assert_eq!(tree.detections[0].label, "trunk");
  assert_eq!(tree.detections[0].bbox.w, 60.0);
  assert_eq!(tree.detections[0].area_ratio, Some(0.54));
  let person = &drawings[3];
  // 检测器自报的宽度被忽略
  assert_eq!(person.detections[0].bbox.w, 20.0);

  let payload = SessionPayload {
    session_id: "1760000000".into(),
    user: User {
      name: "김채이".into(),
      gender: "여".into(),
      birth: "2017-03-01".into(),
    },
    created_at: DateTime::parse_from_rfc3339("2025-10-10T23:30:00+09:00").unwrap(),
    drawings,
    overall_summary: Some("전반적으로 안정적인 표현".into()),
    diagnosis: None,
  };

  // 经过上游 JSON 往返后结果一致
  let reparsed = SessionPayload::from_value(&serde_json::to_value(&payload).unwrap()).unwrap();
  assert_eq!(reparsed, payload);

  let assembler = ReportAssembler::from_config(&config.report);
  let summary = assembler.aggregator().summarize(&payload);
  assert_eq!(
    summary.duration_by_type,
    vec![
      (Category::House, 180),
      (Category::Tree, 40),
      (Category::Person, 0)
    ]
  );
  assert_eq!(format_duration(summary.total_duration_seconds), "3분 40초");
  assert_eq!(summary.label_frequency_top_n[0], ("window".to_string(), 4));
  assert_eq!(summary.label_frequency_top_n[1], ("door".to_string(), 3));

  let out = dir.path().join("reports");
  let path = assembler.generate_to(&payload, &out).unwrap();
  assert_eq!(path, out.join("HTP_1760000000.pdf"));

  let bytes = std::fs::read(&path).unwrap();
  assert!(bytes.starts_with(b"%PDF"));
  let doc = Document::load_mem(&bytes).unwrap();
  assert_eq!(doc.get_pages().len(), 4);

  let scratch = dir.path().join("scratch");
  assert_eq!(std::fs::read_dir(scratch).unwrap().count(), 0);
}

#[tokio::test]
async fn boundary_errors_become_payloads() {
  let dir = tempfile::tempdir().unwrap();
  write_replays(dir.path());
  let config = config(dir.path());
  let registry = ModelRegistry::load_all(&config.models, &config.registry).unwrap();
  let dispatcher = Dispatcher::new(Arc::new(registry), &config.dispatch).unwrap();

  let cases = [
    ("car", drawing_png(), ErrorKind::UnknownCategory),
    ("tree", b"not an image".to_vec(), ErrorKind::DecodeFailure),
  ];
  for (category, bytes, expected) in cases {
    match dispatcher.respond(category, &bytes).await {
      SubmitResponse::Err(payload) => {
        assert_eq!(payload.error, expected);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["error"], format!("{:?}", expected));
      }
      SubmitResponse::Ok(analysis) => panic!("unexpected success: {:?}", analysis),
    }
    assert_eq!(dispatcher.available_slots(), 2);
  }
}

#[test]
fn missing_required_model_stops_startup() {
  let dir = tempfile::tempdir().unwrap();
  write_replays(dir.path());
  let mut config = config(dir.path());
  config.models.remove(&Category::Person);
  assert!(ModelRegistry::load_all(&config.models, &config.registry).is_err());
}
