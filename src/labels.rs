// 该文件是 Streamdet （流检） 项目的一部分。
// src/labels.rs - 类别名称表
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

use thiserror::Error;
use tracing::{debug, info};

pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum LabelsError {
  #[error("无法读取类别文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("类别文件 {0} 为空")]
  Empty(PathBuf),
}

/// 按类别编号排列的类别名称，启动时加载一次，之后只读
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
  names: Box<[String]>,
}

impl ClassNames {
  /// 每行一个名称，去掉首尾空白，行号即类别编号
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelsError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|source| LabelsError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let names = Self::parse(&content);
    if names.is_empty() {
      return Err(LabelsError::Empty(path.to_path_buf()));
    }
    debug!("类别数量: {}", names.len());
    Ok(names)
  }

  pub fn parse(content: &str) -> Self {
    content.lines().map(str::trim).collect()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  /// 找不到时返回 "unknown"
  pub fn name_or_unknown(&self, class_id: usize) -> &str {
    self.get(class_id).unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for ClassNames {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}
