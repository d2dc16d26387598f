// 该文件是 HTP Lens 项目的一部分。
// src/palette.rs - 画作主色分析
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

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// 画板提供的十种颜色
pub const PALETTE: [(&str, [u8; 3]); 10] = [
  ("빨강", [255, 0, 0]),
  ("분홍", [255, 105, 180]),
  ("주황", [255, 165, 0]),
  ("노랑", [255, 255, 0]),
  ("초록", [0, 255, 0]),
  ("파랑", [0, 0, 255]),
  ("보라", [128, 0, 128]),
  ("갈색", [139, 69, 19]),
  ("검정", [0, 0, 0]),
  ("흰색", [255, 255, 255]),
];

const WHITE: &str = "흰색";
const ALPHA_CUTOFF: u8 = 128;
const WHITE_DOMINANCE: f32 = 0.6;
const TOP_COLORS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorShare {
  pub name: String,
  pub ratio: f32,
}

fn closest_color(pixel: [u8; 3]) -> usize {
  let mut best = (u32::MAX, PALETTE.len() - 1);
  for (idx, (_, rgb)) in PALETTE.iter().enumerate() {
    let dist: u32 = (0..3)
      .map(|c| {
        let d = pixel[c] as i32 - rgb[c] as i32;
        (d * d) as u32
      })
      .sum();
    if dist < best.0 {
      best = (dist, idx);
    }
  }
  best.1
}

/// 统计不透明像素的最近调色板颜色，返回占比最高的三种。
/// 最高占比超过 60% 时不计白色背景。
pub fn dominant_colors(image: &RgbaImage) -> Vec<ColorShare> {
  let mut counts = [0u64; PALETTE.len()];
  let mut total = 0u64;
  for pixel in image.pixels() {
    if pixel[3] < ALPHA_CUTOFF {
      continue;
    }
    counts[closest_color([pixel[0], pixel[1], pixel[2]])] += 1;
    total += 1;
  }
  if total == 0 {
    return Vec::new();
  }

  let mut shares: Vec<ColorShare> = counts
    .iter()
    .enumerate()
    .filter(|(_, n)| **n > 0)
    .map(|(idx, n)| ColorShare {
      name: PALETTE[idx].0.to_string(),
      ratio: *n as f32 / total as f32,
    })
    .collect();
  shares.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));

  if shares.first().is_some_and(|top| top.ratio > WHITE_DOMINANCE) {
    shares.retain(|s| s.name != WHITE);
  }
  shares.truncate(TOP_COLORS);
  shares
}
