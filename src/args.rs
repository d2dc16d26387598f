// 该文件是 HTP Lens 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// HTP Lens 画作分析与报告工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径
  #[arg(long, global = true, default_value = "htp-lens.toml", value_name = "FILE")]
  pub config: PathBuf,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 分析一幅画作，输出 JSON 结果
  Analyze {
    /// 画作类别 (house / tree / person)
    #[arg(long)]
    category: String,
    /// 画作图像文件
    #[arg(long, value_name = "IMAGE")]
    image: PathBuf,
    /// 作画时长（秒），给出时输出会话记录格式
    #[arg(long, value_name = "SECONDS")]
    duration: Option<u64>,
  },
  /// 根据会话数据生成 PDF 报告
  Report {
    /// 会话数据 JSON 文件
    #[arg(long, value_name = "PAYLOAD")]
    payload: PathBuf,
    /// 输出目录，默认使用配置中的 output_dir
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
  },
  /// 加载全部模型并报告状态
  Health,
}
