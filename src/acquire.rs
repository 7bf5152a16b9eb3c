// 该文件是 Kanjian （看见） 项目的一部分。
// src/acquire.rs - 下载并解压预训练模型
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

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_MODEL_URL: &str = "http://download.tensorflow.org/models/object_detection/tf2/20200711/ssd_mobilenet_v2_320x320_coco17_tpu-8.tar.gz";

const ARCHIVE_SUFFIXES: [&str; 2] = [".tar.gz", ".tgz"];

#[derive(Error, Debug)]
pub enum AcquireError {
  #[error("网络错误: {0}")]
  Network(#[from] reqwest::Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("无效的模型地址: {0}")]
  InvalidUrl(String),
  #[error("解压后未找到模型目录: {0}")]
  MissingDirectory(PathBuf),
}

/// 解压后的模型目录结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLayout {
  root: PathBuf,
}

impl ModelLayout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn saved_model_dir(&self) -> PathBuf {
    self.root.join("saved_model")
  }

  pub fn pipeline_config(&self) -> PathBuf {
    self.root.join("pipeline.config")
  }
}

/// 远程模型压缩包，解压到 `cache_dir/<压缩包名>`
#[derive(Debug, Clone)]
pub struct ModelArchive {
  url: Url,
  cache_dir: PathBuf,
}

impl ModelArchive {
  pub fn new(url: Url, cache_dir: impl Into<PathBuf>) -> Self {
    Self {
      url,
      cache_dir: cache_dir.into(),
    }
  }

  pub fn with_default_url(cache_dir: impl Into<PathBuf>) -> Result<Self, AcquireError> {
    let url = Url::parse(DEFAULT_MODEL_URL).map_err(|e| AcquireError::InvalidUrl(e.to_string()))?;
    Ok(Self::new(url, cache_dir))
  }

  /// 去掉压缩包后缀的文件名
  pub fn archive_stem(&self) -> Result<String, AcquireError> {
    let name = self
      .url
      .path_segments()
      .and_then(|segments| segments.last())
      .filter(|name| !name.is_empty())
      .ok_or_else(|| AcquireError::InvalidUrl(self.url.to_string()))?;

    ARCHIVE_SUFFIXES
      .iter()
      .find_map(|suffix| name.strip_suffix(suffix))
      .filter(|stem| !stem.is_empty())
      .map(str::to_string)
      .ok_or_else(|| AcquireError::InvalidUrl(format!("{} 不是 tar.gz 压缩包", self.url)))
  }

  pub fn model_dir(&self) -> Result<PathBuf, AcquireError> {
    Ok(self.cache_dir.join(self.archive_stem()?))
  }

  /// 模型目录已存在时不访问网络
  pub fn fetch(&self) -> Result<ModelLayout, AcquireError> {
    let model_dir = self.model_dir()?;
    if model_dir.is_dir() {
      info!("模型目录 {} 已存在，跳过下载", model_dir.display());
      return Ok(ModelLayout::new(model_dir));
    }

    info!("下载模型: {}", self.url);
    let now = std::time::Instant::now();
    let bytes = self.download()?;
    info!("下载完成，大小 {} 字节，耗时: {:.2?}", bytes.len(), now.elapsed());

    std::fs::create_dir_all(&self.cache_dir)?;
    unpack_archive(&bytes, &self.cache_dir)?;

    if !model_dir.is_dir() {
      return Err(AcquireError::MissingDirectory(model_dir));
    }
    info!("模型已解压到 {}", model_dir.display());
    Ok(ModelLayout::new(model_dir))
  }

  fn download(&self) -> Result<Vec<u8>, AcquireError> {
    match self.url.scheme() {
      "http" | "https" => {
        let client = reqwest::blocking::Client::builder().build()?;
        let response = client.get(self.url.clone()).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
      }
      "file" => {
        let path = self
          .url
          .to_file_path()
          .map_err(|_| AcquireError::InvalidUrl(self.url.to_string()))?;
        Ok(std::fs::read(path)?)
      }
      other => Err(AcquireError::InvalidUrl(format!("不支持的下载方案: {}", other))),
    }
  }
}

/// 解压 gzip 压缩的 tar 数据到 `dest`
pub fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<(), AcquireError> {
  let tar = GzDecoder::new(bytes);
  let mut archive = Archive::new(tar);
  archive.unpack(dest)?;
  debug!("解压到 {}", dest.display());
  Ok(())
}
