// 该文件是 Kanjian （看见） 项目的一部分。
// src/label.rs - 类别标签映射
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

use std::{collections::HashMap, path::Path};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::FromUrl;

#[derive(Error, Debug)]
pub enum LabelMapError {
  #[error("网络错误: {0}")]
  Network(#[from] reqwest::Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("标签解析错误: {0}")]
  Parse(String),
  #[error("不支持的标签来源: {0}")]
  SchemeMismatch(String),
}

impl From<serde_json::Error> for LabelMapError {
  fn from(err: serde_json::Error) -> Self {
    LabelMapError::Parse(err.to_string())
  }
}

/// 类别编号到显示名称的映射，加载后不再修改
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
  labels: HashMap<i64, String>,
}

impl FromIterator<(i64, String)> for LabelMap {
  fn from_iter<T: IntoIterator<Item = (i64, String)>>(iter: T) -> Self {
    Self {
      labels: iter.into_iter().collect(),
    }
  }
}

impl LabelMap {
  /// 解析 `{"1": "person", ...}` 形式的 JSON 对象
  pub fn from_json_str(text: &str) -> Result<Self, LabelMapError> {
    let value: Value = serde_json::from_str(text)?;
    let object = value
      .as_object()
      .ok_or_else(|| LabelMapError::Parse("标签文件顶层必须是 JSON 对象".to_string()))?;

    let mut labels = HashMap::with_capacity(object.len());
    for (key, name) in object {
      let id = key
        .trim()
        .parse::<i64>()
        .map_err(|_| LabelMapError::Parse(format!("类别编号不是整数: {:?}", key)))?;
      let name = name
        .as_str()
        .ok_or_else(|| LabelMapError::Parse(format!("类别 {} 的名称不是字符串", id)))?;
      labels.insert(id, name.to_string());
    }

    debug!("解析到 {} 个类别标签", labels.len());
    Ok(Self { labels })
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelMapError> {
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn get(&self, id: i64) -> Option<&str> {
    self.labels.get(&id).map(String::as_str)
  }

  /// 查询显示名称，未知编号返回 `Label unknown {id}`
  pub fn resolve(&self, id: i64) -> String {
    match self.get(id) {
      Some(name) => name.to_string(),
      None => format!("Label unknown {}", id),
    }
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl FromUrl for LabelMap {
  type Error = LabelMapError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    info!("加载类别标签: {}", url);
    let labels = match url.scheme() {
      "http" | "https" => {
        let text = reqwest::blocking::get(url.as_str())?
          .error_for_status()?
          .text()?;
        Self::from_json_str(&text)?
      }
      "file" => {
        let path = url
          .to_file_path()
          .map_err(|_| LabelMapError::SchemeMismatch(url.to_string()))?;
        Self::from_file(path)?
      }
      other => return Err(LabelMapError::SchemeMismatch(other.to_string())),
    };
    info!("类别标签加载完成，共 {} 类", labels.len());
    Ok(labels)
  }
}
