// 该文件是 HTP Lens 项目的一部分。
// src/report.rs - 检查报告生成
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

//! 报告固定四页：封面、作画时长、对象识别次数、综合解读。
//! 图表先写到私有的临时目录，渲染结束后随目录一起删除，
//! 最终只留下 PDF 数据。

use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  aggregate::{AggregationSummary, Aggregator, format_duration},
  config::ReportConfig,
  error::{ErrorKind, ErrorPayload},
  font,
  session::{PayloadError, SessionPayload},
};

pub mod chart;
pub mod pdf;

pub use self::chart::{BarChartRenderer, ChartKind, ChartRenderer};
pub use self::pdf::{PageRenderer, PdfRenderer};

pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;

const MARGIN_MM: f32 = 20.0;
const TITLE_SIZE: f32 = 18.0;
const BODY_SIZE: f32 = 12.0;
const LINE_MM: f32 = 8.0;
/// 正文一行的宽度，按半角字符计
const WRAP_COLUMNS: usize = 80;
const PAGE_BOTTOM_MM: f32 = 280.0;

const NO_SUMMARY: &str = "(해석 요약 없음)";
const NO_DIAGNOSIS: &str = "(진단 내용 없음)";

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("PDF 错误: {0}")]
  Pdf(#[from] lopdf::Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("会话数据无效: {0}")]
  Payload(#[from] PayloadError),
  #[error("无法创建输出目录 {0}: {1}")]
  OutputDir(PathBuf, #[source] std::io::Error),
  #[error("无法创建临时目录: {0}")]
  Scratch(#[source] std::io::Error),
  #[error("渲染失败: {0}")]
  Render(#[from] RenderError),
  #[error("写入报告 {0} 失败: {1}")]
  Write(PathBuf, #[source] std::io::Error),
}

impl ReportError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ReportError::OutputDir(..) => ErrorKind::ConfigError,
      _ => ErrorKind::RenderFailure,
    }
  }

  pub fn to_payload(&self) -> ErrorPayload {
    ErrorPayload::new(self.kind(), self.to_string())
  }
}

/// 以页面左上角为原点的毫米矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmRect {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

impl MmRect {
  /// 保持宽高比缩放到矩形内并居中
  pub fn fit(&self, width: u32, height: u32) -> MmRect {
    if width == 0 || height == 0 {
      return *self;
    }
    let scale = (self.w / width as f32).min(self.h / height as f32);
    let (w, h) = (width as f32 * scale, height as f32 * scale);
    MmRect {
      x: self.x + (self.w - w) / 2.0,
      y: self.y + (self.h - h) / 2.0,
      w,
      h,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
  /// `y_mm` 是基线位置
  Text {
    text: String,
    x_mm: f32,
    y_mm: f32,
    size: f32,
  },
  Image {
    path: PathBuf,
    rect: MmRect,
  },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
  pub elements: Vec<Element>,
}

impl Page {
  fn text(&mut self, text: impl Into<String>, y_mm: f32, size: f32) {
    self.elements.push(Element::Text {
      text: text.into(),
      x_mm: MARGIN_MM,
      y_mm,
      size,
    });
  }

  fn title(&mut self, text: &str, y_mm: f32) {
    self.text(text, y_mm, TITLE_SIZE);
  }
}

/// 按显示宽度折行，全角字符计两列。优先在空白处断开，单词过长时硬断。
pub fn wrap_text(text: &str, columns: usize) -> Vec<String> {
  let width = |s: &str| s.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum::<usize>();
  let columns = columns.max(2);
  let mut lines = Vec::new();

  for paragraph in text.lines() {
    let mut line = String::new();
    for word in paragraph.split_whitespace() {
      let sep = usize::from(!line.is_empty());
      if width(&line) + sep + width(word) <= columns {
        if sep == 1 {
          line.push(' ');
        }
        line.push_str(word);
        continue;
      }
      if !line.is_empty() {
        lines.push(std::mem::take(&mut line));
      }
      for c in word.chars() {
        if width(&line) + width(c.encode_utf8(&mut [0; 4])) > columns {
          lines.push(std::mem::take(&mut line));
        }
        line.push(c);
      }
    }
    lines.push(line);
  }
  if lines.is_empty() {
    lines.push(String::new());
  }
  lines
}

pub struct ReportAssembler {
  aggregator: Aggregator,
  charts: Box<dyn ChartRenderer>,
  pages: Box<dyn PageRenderer>,
  scratch_dir: Option<PathBuf>,
}

impl ReportAssembler {
  pub fn new(
    aggregator: Aggregator,
    charts: Box<dyn ChartRenderer>,
    pages: Box<dyn PageRenderer>,
  ) -> Self {
    Self {
      aggregator,
      charts,
      pages,
      scratch_dir: None,
    }
  }

  /// 字体加载失败只降级渲染效果，不会报错
  pub fn from_config(config: &ReportConfig) -> Self {
    let font = font::load_font(config.font.as_deref());
    Self::new(
      Aggregator::from_config(config),
      Box::new(BarChartRenderer::new(font.clone())),
      Box::new(PdfRenderer::new(font, config.dpi)),
    )
    .with_scratch_dir(config.scratch_dir.clone())
  }

  pub fn with_scratch_dir(mut self, dir: Option<PathBuf>) -> Self {
    self.scratch_dir = dir;
    self
  }

  pub fn aggregator(&self) -> &Aggregator {
    &self.aggregator
  }

  /// 汇总并渲染
  pub fn generate(&self, payload: &SessionPayload) -> Result<Vec<u8>, ReportError> {
    let summary = self.aggregator.summarize(payload);
    self.render(payload, &summary)
  }

  pub fn generate_json(&self, value: &Value) -> Result<Vec<u8>, ReportError> {
    self.generate(&SessionPayload::from_value(value)?)
  }

  /// 先确认输出目录可用，再渲染并写入 `HTP_{session_id}.pdf`
  pub fn generate_to(
    &self,
    payload: &SessionPayload,
    output_dir: &Path,
  ) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(output_dir)
      .map_err(|e| ReportError::OutputDir(output_dir.to_path_buf(), e))?;
    if !output_dir.is_dir() {
      return Err(ReportError::OutputDir(
        output_dir.to_path_buf(),
        std::io::Error::other("不是目录"),
      ));
    }

    let bytes = self.generate(payload)?;
    let path = output_dir.join(format!("HTP_{}.pdf", file_safe(&payload.session_id)));
    std::fs::write(&path, &bytes).map_err(|e| ReportError::Write(path.clone(), e))?;
    info!("报告已写入: {} ({} 字节)", path.display(), bytes.len());
    Ok(path)
  }

  pub fn render(
    &self,
    payload: &SessionPayload,
    summary: &AggregationSummary,
  ) -> Result<Vec<u8>, ReportError> {
    let scratch = self.scratch()?;

    let pages = vec![
      cover_page(payload),
      self.timing_page(summary, scratch.path()),
      self.frequency_page(summary, scratch.path()),
      narrative_page(payload),
    ];
    let bytes = self.pages.render(&pages)?;
    info!("会话 {} 的报告渲染完成", payload.session_id);
    Ok(bytes)
  }

  fn scratch(&self) -> Result<TempDir, ReportError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("htp-charts-");
    let dir = match &self.scratch_dir {
      Some(dir) => {
        std::fs::create_dir_all(dir).map_err(ReportError::Scratch)?;
        builder.tempdir_in(dir)
      }
      None => builder.tempdir(),
    };
    dir.map_err(ReportError::Scratch)
  }

  /// 图表失败时只记录警告，页面上不放这张图
  fn chart(
    &self,
    scratch: &Path,
    file: &str,
    data: &[(String, f64)],
    title: &str,
    kind: ChartKind,
    rect: MmRect,
  ) -> Option<Element> {
    let path = scratch.join(file);
    let written = self
      .charts
      .render(data, title, kind)
      .and_then(|png| std::fs::write(&path, png).map_err(RenderError::from));
    match written {
      Ok(()) => Some(Element::Image { path, rect }),
      Err(e) => {
        warn!("图表 {} 生成失败: {}", title, e);
        None
      }
    }
  }

  fn timing_page(&self, summary: &AggregationSummary, scratch: &Path) -> Page {
    let mut page = Page::default();
    page.title("그리기 소요시간", 28.0);
    let mut y = 44.0;
    for (category, seconds) in &summary.duration_by_type {
      page.text(
        format!("• {}: {}", category, format_duration(*seconds)),
        y,
        BODY_SIZE,
      );
      y += LINE_MM;
    }
    page.text(
      format!(
        "총 소요시간: {}",
        format_duration(summary.total_duration_seconds)
      ),
      y + 2.0,
      BODY_SIZE,
    );

    let data: Vec<(String, f64)> = summary
      .duration_by_type
      .iter()
      .map(|(c, s)| (c.to_string(), *s as f64))
      .collect();
    let rect = MmRect {
      x: MARGIN_MM,
      y: 187.0,
      w: 170.0,
      h: 80.0,
    };
    page.elements.extend(self.chart(
      scratch,
      "durations.png",
      &data,
      "소요시간(초)",
      ChartKind::Bar,
      rect,
    ));
    page
  }

  fn frequency_page(&self, summary: &AggregationSummary, scratch: &Path) -> Page {
    let mut page = Page::default();
    page.title("객체 인식 수(상위 10)", 28.0);

    let data: Vec<(String, f64)> = summary
      .label_frequency_top_n
      .iter()
      .map(|(label, count)| (label.clone(), *count as f64))
      .collect();
    let rect = MmRect {
      x: MARGIN_MM,
      y: 167.0,
      w: 170.0,
      h: 100.0,
    };
    page.elements.extend(self.chart(
      scratch,
      "objects.png",
      &data,
      "객체 인식 수",
      ChartKind::HorizontalBar,
      rect,
    ));
    page
  }
}

fn cover_page(payload: &SessionPayload) -> Page {
  let mut page = Page::default();
  page.title("HTP 심리검사 보고서", 28.0);
  let lines = [
    format!("세션 ID: {}", payload.session_id),
    format!("이름: {}", payload.user.name),
    format!("성별: {}", payload.user.gender),
    format!("생년월일: {}", payload.user.birth),
    format!("검사일: {}", payload.created_at.format("%Y-%m-%d")),
  ];
  for (idx, line) in lines.into_iter().enumerate() {
    page.text(line, 42.0 + LINE_MM * idx as f32, BODY_SIZE);
  }
  page
}

fn narrative_page(payload: &SessionPayload) -> Page {
  let mut page = Page::default();
  let mut y = 28.0;
  let sections = [
    ("종합 해석", payload.overall_summary.as_deref().unwrap_or(NO_SUMMARY)),
    ("진단 내용", payload.diagnosis.as_deref().unwrap_or(NO_DIAGNOSIS)),
  ];
  for (idx, (title, body)) in sections.into_iter().enumerate() {
    if idx > 0 {
      y = (y + LINE_MM).max(70.0);
    }
    page.title(title, y);
    y += 16.0;
    for line in wrap_text(body, WRAP_COLUMNS) {
      if y > PAGE_BOTTOM_MM {
        warn!("{} 内容超出页面，已截断", title);
        break;
      }
      page.text(line, y, BODY_SIZE);
      y += LINE_MM * 0.75;
    }
  }
  page
}

/// 会话 ID 作为文件名时去掉路径分隔符等字符
fn file_safe(id: &str) -> String {
  id.chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '-' || c == '_' {
        c
      } else {
        '_'
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::{Arc, Mutex};

  /// 记录页面模型，不产生真正的文档
  #[derive(Clone, Default)]
  struct Capture(Arc<Mutex<Vec<Page>>>);

  impl PageRenderer for Capture {
    fn render(&self, pages: &[Page]) -> Result<Vec<u8>, RenderError> {
      for page in pages {
        for element in &page.elements {
          if let Element::Image { path, .. } = element {
            assert!(path.exists());
          }
        }
      }
      *self.0.lock().unwrap() = pages.to_vec();
      Ok(b"%PDF-capture".to_vec())
    }
  }

  struct FailingCharts;

  impl ChartRenderer for FailingCharts {
    fn render(
      &self,
      _data: &[(String, f64)],
      _title: &str,
      _kind: ChartKind,
    ) -> Result<Vec<u8>, RenderError> {
      Err(RenderError::Io(std::io::Error::other("no backend")))
    }
  }

  fn texts(page: &Page) -> Vec<String> {
    page
      .elements
      .iter()
      .filter_map(|e| match e {
        Element::Text { text, .. } => Some(text.clone()),
        _ => None,
      })
      .collect()
  }

  fn payload() -> SessionPayload {
    SessionPayload::from_value(&json!({
      "session_id": "1760",
      "user": {"name": "김채이", "gender": "여", "birth": "2017-03-01"},
      "created_at": "2025-10-10T12:34:56Z",
      "drawings": [
        {"type": "house", "duration_seconds": 125, "analysis": [{"label": "window"}, {"label": "door(미표현)"}]},
        {"type": "tree", "duration_seconds": 40, "analysis": [{"label": "door"}]},
        {"type": "house", "duration_seconds": 55}
      ]
    }))
    .unwrap()
  }

  fn assembler(capture: &Capture, scratch: &Path) -> ReportAssembler {
    ReportAssembler::new(
      Aggregator::default(),
      Box::new(BarChartRenderer::new(None).with_size(200, 120)),
      Box::new(capture.clone()),
    )
    .with_scratch_dir(Some(scratch.to_path_buf()))
  }

  #[test]
  fn pages_follow_fixed_order() {
    let scratch = tempfile::tempdir().unwrap();
    let capture = Capture::default();
    let bytes = assembler(&capture, scratch.path()).generate(&payload()).unwrap();
    assert_eq!(bytes, b"%PDF-capture");

    let pages = capture.0.lock().unwrap().clone();
    assert_eq!(pages.len(), 4);
    assert_eq!(
      texts(&pages[0]),
      vec![
        "HTP 심리검사 보고서",
        "세션 ID: 1760",
        "이름: 김채이",
        "성별: 여",
        "생년월일: 2017-03-01",
        "검사일: 2025-10-10",
      ]
    );
    assert_eq!(
      texts(&pages[1]),
      vec![
        "그리기 소요시간",
        "• house: 3분 0초",
        "• tree: 40초",
        "총 소요시간: 3분 40초",
      ]
    );
    assert!(matches!(pages[1].elements.last(), Some(Element::Image { .. })));
    assert!(matches!(pages[2].elements.last(), Some(Element::Image { .. })));
    assert_eq!(
      texts(&pages[3]),
      vec!["종합 해석", NO_SUMMARY, "진단 내용", NO_DIAGNOSIS]
    );

    // 图表文件随临时目录删除
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
  }

  #[test]
  fn chart_failure_drops_only_the_chart() {
    let scratch = tempfile::tempdir().unwrap();
    let capture = Capture::default();
    ReportAssembler::new(
      Aggregator::default(),
      Box::new(FailingCharts),
      Box::new(capture.clone()),
    )
    .with_scratch_dir(Some(scratch.path().to_path_buf()))
    .generate(&payload())
    .unwrap();

    let pages = capture.0.lock().unwrap().clone();
    assert_eq!(pages.len(), 4);
    assert!(pages[1].elements.iter().all(|e| matches!(e, Element::Text { .. })));
    assert_eq!(texts(&pages[2]), vec!["객체 인식 수(상위 10)"]);
  }

  #[test]
  fn long_narrative_wraps() {
    let mut p = payload();
    p.overall_summary = Some("집 그림에서 창문이 크게 표현되었습니다. ".repeat(10));
    p.diagnosis = Some("stable".to_string());
    let page = narrative_page(&p);
    let lines = texts(&page);
    assert!(lines.len() > 4);
    assert_eq!(lines.last().map(String::as_str), Some("stable"));
  }

  #[test]
  fn wrap_text_respects_width() {
    let lines = wrap_text("alpha beta gamma delta", 11);
    assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
    let lines = wrap_text("가나다라마바", 4);
    assert_eq!(lines, vec!["가나", "다라", "마바"]);
    assert_eq!(wrap_text("", 10), vec![String::new()]);
  }

  #[test]
  fn fit_keeps_aspect_ratio_centered() {
    let rect = MmRect {
      x: 20.0,
      y: 187.0,
      w: 170.0,
      h: 80.0,
    };
    let fit = rect.fit(750, 450);
    assert!((fit.h - 80.0).abs() < 1e-3);
    assert!((fit.w - 133.333).abs() < 1e-2);
    assert!((fit.x - (20.0 + (170.0 - fit.w) / 2.0)).abs() < 1e-3);
  }

  #[test]
  fn unwritable_output_dir_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();
    let capture = Capture::default();
    let err = assembler(&capture, dir.path())
      .generate_to(&payload(), &blocker.join("reports"))
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
    // 渲染尚未开始
    assert!(capture.0.lock().unwrap().is_empty());
  }

  #[test]
  fn generate_to_writes_named_file() {
    let scratch = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let capture = Capture::default();
    let path = assembler(&capture, scratch.path())
      .generate_to(&payload(), &out.path().join("reports"))
      .unwrap();
    assert_eq!(path.file_name().unwrap(), "HTP_1760.pdf");
    assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-capture");
  }

  #[test]
  fn malformed_payload_is_a_render_failure() {
    let capture = Capture::default();
    let scratch = tempfile::tempdir().unwrap();
    let err = assembler(&capture, scratch.path())
      .generate_json(&json!({"drawings": "oops"}))
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RenderFailure);
  }
}
