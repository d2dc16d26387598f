// 该文件是 HTP Lens 项目的一部分。
// src/registry.rs - 模型注册表
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

//! 启动时按类别加载全部模型并预热，之后只读。任何一个类别加载失败，
//! 整个注册表都构建失败，服务不得在缺少模型的情况下启动。

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  sync::{Arc, Mutex, PoisonError},
  time::Instant,
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  category::Category,
  config::RegistryConfig,
  detection::RawOutput,
  error::ErrorKind,
  frame,
  model::{self, Model, ModelError},
};

#[derive(Error, Debug)]
pub enum RegistryError {
  #[error("类别 {category} 的模型加载失败: {source}")]
  ModelLoad {
    category: Category,
    #[source]
    source: ModelError,
  },
  #[error("类别 {category} 的模型预热失败: {source}")]
  Warmup {
    category: Category,
    #[source]
    source: ModelError,
  },
  #[error("缺少必需类别的模型: {0}")]
  MissingRequired(Category),
  #[error("未配置的类别: {0}")]
  UnknownCategory(Category),
}

impl RegistryError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      RegistryError::UnknownCategory(_) => ErrorKind::UnknownCategory,
      _ => ErrorKind::ModelLoadFailure,
    }
  }
}

/// 单个类别的模型及其可选的调用闸门
pub struct ModelSlot {
  category: Category,
  model: Box<dyn Model>,
  gate: Option<Mutex<()>>,
}

impl std::fmt::Debug for ModelSlot {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModelSlot")
      .field("category", &self.category)
      .field("model", &self.model.name())
      .field("serialized", &self.is_serialized())
      .finish()
  }
}

impl ModelSlot {
  fn new(category: Category, model: Box<dyn Model>, serialize: bool) -> Self {
    Self {
      category,
      model,
      gate: serialize.then(|| Mutex::new(())),
    }
  }

  pub fn category(&self) -> Category {
    self.category
  }

  pub fn is_serialized(&self) -> bool {
    self.gate.is_some()
  }

  /// 同步执行一次推理，非可重入模型在此串行化
  pub fn run(&self, image: &RgbImage) -> Result<RawOutput, ModelError> {
    match &self.gate {
      Some(gate) => {
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.model.infer(image)
      }
      None => self.model.infer(image),
    }
  }
}

pub struct ModelRegistry {
  slots: HashMap<Category, Arc<ModelSlot>>,
}

impl std::fmt::Debug for ModelRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModelRegistry")
      .field("loaded", &self.health())
      .finish()
  }
}

impl ModelRegistry {
  /// 按 URL 加载每个类别的模型，全部成功才返回
  pub fn load_all(
    sources: &BTreeMap<Category, Url>,
    config: &RegistryConfig,
  ) -> Result<Self, RegistryError> {
    for category in &config.required {
      if !sources.contains_key(category) {
        error!("必需类别 {} 没有配置模型", category);
        return Err(RegistryError::MissingRequired(*category));
      }
    }

    let mut models = Vec::with_capacity(sources.len());
    for (&category, url) in sources {
      let model = model::load_model(url).map_err(|source| {
        error!("类别 {} 的模型加载失败: {}", category, source);
        RegistryError::ModelLoad { category, source }
      })?;
      models.push((category, model));
    }

    Self::with_models(models, config)
  }

  /// 接管已构建的模型并逐个预热
  pub fn with_models(
    models: impl IntoIterator<Item = (Category, Box<dyn Model>)>,
    config: &RegistryConfig,
  ) -> Result<Self, RegistryError> {
    let warmup = frame::blank(config.warmup_size, config.warmup_size);
    let mut slots = HashMap::new();

    for (category, model) in models {
      let serialize = config
        .serialize
        .get(&category)
        .copied()
        .unwrap_or(!model.reentrant());
      debug!(
        "类别 {} 使用模型 {}，串行调用: {}",
        category,
        model.name(),
        serialize
      );
      let slot = ModelSlot::new(category, model, serialize);

      let now = Instant::now();
      slot
        .run(&warmup)
        .map_err(|source| RegistryError::Warmup { category, source })?;
      info!("类别 {} 预热完成，耗时: {:.2?}", category, now.elapsed());

      if slots.insert(category, Arc::new(slot)).is_some() {
        warn!("类别 {} 重复配置，后者覆盖前者", category);
      }
    }

    for category in &config.required {
      if !slots.contains_key(category) {
        return Err(RegistryError::MissingRequired(*category));
      }
    }

    info!("模型注册表就绪: {:?}", slots.keys().collect::<BTreeSet<_>>());
    Ok(Self { slots })
  }

  pub fn get(&self, category: Category) -> Result<Arc<ModelSlot>, RegistryError> {
    self
      .slots
      .get(&category)
      .cloned()
      .ok_or(RegistryError::UnknownCategory(category))
  }

  pub fn health(&self) -> BTreeSet<Category> {
    self.slots.keys().copied().collect()
  }
}
