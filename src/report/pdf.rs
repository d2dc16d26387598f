// 该文件是 HTP Lens 项目的一部分。
// src/report/pdf.rs - PDF 页面渲染
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

//! 有字体时整页栅格化后嵌入，保证韩文正常显示；
//! 没有字体时退回 PDF 内置的 Helvetica，文字仍是矢量，但只能显示 Latin-1。

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{
  Rgb, RgbImage,
  codecs::jpeg::JpegEncoder,
  imageops::{self, FilterType},
};
use imageproc::drawing::draw_text_mut;
use lopdf::{
  Dictionary, Document, Object, ObjectId, Stream, StringFormat,
  content::{Content, Operation},
  dictionary,
};
use tracing::{debug, info};

use super::{A4_HEIGHT_MM, A4_WIDTH_MM, Element, MmRect, Page, RenderError};

const PT_PER_MM: f32 = 72.0 / 25.4;
const JPEG_QUALITY: u8 = 90;

/// 页面渲染接口，把页面模型转换成完整的文档
pub trait PageRenderer: Send + Sync {
  fn render(&self, pages: &[Page]) -> Result<Vec<u8>, RenderError>;
}

pub struct PdfRenderer {
  font: Option<FontArc>,
  dpi: f32,
}

impl PdfRenderer {
  pub fn new(font: Option<FontArc>, dpi: f32) -> Self {
    Self {
      font,
      dpi: if dpi.is_finite() && dpi >= 36.0 { dpi } else { 150.0 },
    }
  }

  fn mm_to_px(&self, mm: f32) -> f32 {
    mm / 25.4 * self.dpi
  }

  fn raster_page(&self, font: &FontArc, page: &Page) -> Result<RgbImage, RenderError> {
    let width = self.mm_to_px(A4_WIDTH_MM).round() as u32;
    let height = self.mm_to_px(A4_HEIGHT_MM).round() as u32;
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    for element in &page.elements {
      match element {
        Element::Text {
          text,
          x_mm,
          y_mm,
          size,
        } => {
          let scale = PxScale::from(size * self.dpi / 72.0);
          let ascent = font.as_scaled(scale).ascent();
          draw_text_mut(
            &mut canvas,
            Rgb([0, 0, 0]),
            self.mm_to_px(*x_mm) as i32,
            (self.mm_to_px(*y_mm) - ascent) as i32,
            scale,
            font,
            text,
          );
        }
        Element::Image { path, rect } => {
          let image = image::open(path)?.to_rgb8();
          let fit = rect.fit(image.width(), image.height());
          let (w, h) = (
            self.mm_to_px(fit.w).round().max(1.0) as u32,
            self.mm_to_px(fit.h).round().max(1.0) as u32,
          );
          let resized = imageops::resize(&image, w, h, FilterType::Triangle);
          imageops::overlay(
            &mut canvas,
            &resized,
            self.mm_to_px(fit.x) as i64,
            self.mm_to_px(fit.y) as i64,
          );
        }
      }
    }
    Ok(canvas)
  }

  fn vector_page(&self, builder: &mut PdfBuilder, page: &Page) -> Result<(), RenderError> {
    let font_id = builder.helvetica();
    let mut operations = Vec::new();
    let mut xobjects = Dictionary::new();

    for element in &page.elements {
      match element {
        Element::Text {
          text,
          x_mm,
          y_mm,
          size,
        } => {
          operations.push(Operation::new("BT", vec![]));
          operations.push(Operation::new("Tf", vec!["F1".into(), (*size).into()]));
          operations.push(Operation::new(
            "Td",
            vec![(x_mm * PT_PER_MM).into(), ((A4_HEIGHT_MM - y_mm) * PT_PER_MM).into()],
          ));
          operations.push(Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
          ));
          operations.push(Operation::new("ET", vec![]));
        }
        Element::Image { path, rect } => {
          let image = image::open(path)?.to_rgb8();
          let fit = rect.fit(image.width(), image.height());
          let name = format!("Im{}", xobjects.len());
          let image_id = builder.image(&image)?;
          xobjects.set(name.clone(), image_id);
          operations.extend(place(&name, &fit));
        }
      }
    }

    let resources = dictionary! {
      "Font" => dictionary! { "F1" => font_id },
      "XObject" => xobjects,
    };
    builder.page(operations, resources)
  }
}

impl PageRenderer for PdfRenderer {
  fn render(&self, pages: &[Page]) -> Result<Vec<u8>, RenderError> {
    let mut builder = PdfBuilder::new();
    match &self.font {
      Some(font) => {
        debug!("栅格化 {} 页, {} dpi", pages.len(), self.dpi);
        for page in pages {
          let canvas = self.raster_page(font, page)?;
          let image_id = builder.image(&canvas)?;
          let full = MmRect {
            x: 0.0,
            y: 0.0,
            w: A4_WIDTH_MM,
            h: A4_HEIGHT_MM,
          };
          builder.page(
            place("Page", &full),
            dictionary! { "XObject" => dictionary! { "Page" => image_id } },
          )?;
        }
      }
      None => {
        info!("未加载字体，使用内置 Helvetica 渲染");
        for page in pages {
          self.vector_page(&mut builder, page)?;
        }
      }
    }
    builder.finish()
  }
}

/// 以左上角为原点的毫米坐标放置图像
fn place(name: &str, rect: &MmRect) -> Vec<Operation> {
  let bottom = A4_HEIGHT_MM - rect.y - rect.h;
  vec![
    Operation::new("q", vec![]),
    Operation::new(
      "cm",
      vec![
        (rect.w * PT_PER_MM).into(),
        0.0f32.into(),
        0.0f32.into(),
        (rect.h * PT_PER_MM).into(),
        (rect.x * PT_PER_MM).into(),
        (bottom * PT_PER_MM).into(),
      ],
    ),
    Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
    Operation::new("Q", vec![]),
  ]
}

/// WinAnsi 编码，无法表示的字符替换为 `?`
fn win_ansi(text: &str) -> Vec<u8> {
  text
    .chars()
    .map(|c| match c {
      '•' => 0x95,
      ' '..='~' | '\u{a0}'..='\u{ff}' => c as u8,
      _ => b'?',
    })
    .collect()
}

struct PdfBuilder {
  doc: Document,
  pages_id: ObjectId,
  kids: Vec<Object>,
  helvetica: Option<ObjectId>,
}

impl PdfBuilder {
  fn new() -> Self {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    Self {
      doc,
      pages_id,
      kids: Vec::new(),
      helvetica: None,
    }
  }

  fn helvetica(&mut self) -> ObjectId {
    if let Some(id) = self.helvetica {
      return id;
    }
    let id = self.doc.add_object(dictionary! {
      "Type" => "Font",
      "Subtype" => "Type1",
      "BaseFont" => "Helvetica",
      "Encoding" => "WinAnsiEncoding",
    });
    self.helvetica = Some(id);
    id
  }

  fn image(&mut self, image: &RgbImage) -> Result<ObjectId, RenderError> {
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY).encode_image(image)?;
    let stream = Stream::new(
      dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width() as i64,
        "Height" => image.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8i64,
        "Filter" => "DCTDecode",
      },
      data,
    )
    .with_compression(false);
    Ok(self.doc.add_object(stream))
  }

  fn page(&mut self, operations: Vec<Operation>, resources: Dictionary) -> Result<(), RenderError> {
    let content = Content { operations }.encode()?;
    let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = self.doc.add_object(dictionary! {
      "Type" => "Page",
      "Parent" => self.pages_id,
      "Contents" => content_id,
      "Resources" => resources,
    });
    self.kids.push(page_id.into());
    Ok(())
  }

  fn finish(mut self) -> Result<Vec<u8>, RenderError> {
    let count = self.kids.len() as i64;
    let pages = dictionary! {
      "Type" => "Pages",
      "Kids" => self.kids,
      "Count" => count,
      "MediaBox" => vec![
        0.0f32.into(),
        0.0f32.into(),
        (A4_WIDTH_MM * PT_PER_MM).into(),
        (A4_HEIGHT_MM * PT_PER_MM).into(),
      ],
    };
    self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
    let catalog_id = self.doc.add_object(dictionary! {
      "Type" => "Catalog",
      "Pages" => self.pages_id,
    });
    self.doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    self.doc.save_to(&mut out)?;
    debug!("PDF 共 {} 页, {} 字节", count, out.len());
    Ok(out)
  }
}
