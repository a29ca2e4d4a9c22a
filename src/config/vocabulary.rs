// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/config/vocabulary.rs - 类别名称表
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

use std::{convert::Infallible, path::Path, str::FromStr};

use super::{ConfigError, read_document, strip_whitespace};

/// 类别名称表，下标即类别编号
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
  names: Vec<String>,
}

impl Vocabulary {
  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
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

impl<S: Into<String>> FromIterator<S> for Vocabulary {
  fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
    Vocabulary {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}

impl FromStr for Vocabulary {
  type Err = Infallible;

  fn from_str(document: &str) -> Result<Self, Self::Err> {
    Ok(
      document
        .lines()
        .map(strip_whitespace)
        .filter(|name| !name.is_empty())
        .collect(),
    )
  }
}

pub fn read_vocabulary(path: impl AsRef<Path>) -> Result<Vocabulary, ConfigError> {
  let document = read_document(path.as_ref())?;
  let Ok(vocabulary) = document.parse();
  Ok(vocabulary)
}
