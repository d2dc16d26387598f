// 该文件是 HTP Lens 项目的一部分。
// src/main.rs - 主程序入口
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

mod args;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use htp_lens::{
  config::Config,
  dispatch::{Dispatcher, SubmitResponse},
  registry::ModelRegistry,
  report::{ReportAssembler, ReportError},
  session::SessionPayload,
};

use args::{Args, Command};

const DEFAULT_REPORT_DIR: &str = "uploads/reports";

fn load_dispatcher(config: &Config) -> Result<Dispatcher> {
  info!("正在加载模型...");
  let now = std::time::Instant::now();
  let registry = ModelRegistry::load_all(&config.models, &config.registry)
    .context("模型注册表初始化失败")?;
  info!("模型加载完成，耗时: {:.2?}", now.elapsed());
  Ok(Dispatcher::new(Arc::new(registry), &config.dispatch)?)
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("配置文件: {}", args.config.display());
  let config = Config::from_file(&args.config)?;

  match args.command {
    Command::Analyze {
      category,
      image,
      duration,
    } => {
      let dispatcher = load_dispatcher(&config)?;
      let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("无法读取图像 {}", image.display()))?;
      let response = dispatcher.respond(&category, &bytes).await;
      let json = match (response, duration) {
        (SubmitResponse::Ok(analysis), Some(seconds)) => {
          serde_json::to_string_pretty(&analysis.into_record(seconds))?
        }
        (response, _) => serde_json::to_string_pretty(&response)?,
      };
      println!("{}", json);
    }
    Command::Report { payload, out } => {
      let data = tokio::fs::read(&payload)
        .await
        .with_context(|| format!("无法读取会话数据 {}", payload.display()))?;
      let output_dir = out
        .or_else(|| config.report.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR));
      let report = config.report.clone();

      let path = tokio::task::spawn_blocking(move || -> Result<PathBuf, ReportError> {
        let payload = SessionPayload::from_slice(&data)?;
        ReportAssembler::from_config(&report).generate_to(&payload, &output_dir)
      })
      .await?
      .inspect_err(|e| error!("报告生成失败 ({:?}): {}", e.kind(), e))?;
      println!("{}", path.display());
    }
    Command::Health => {
      let dispatcher = load_dispatcher(&config)?;
      println!("{}", serde_json::to_string_pretty(&dispatcher.health())?);
    }
  }

  Ok(())
}
