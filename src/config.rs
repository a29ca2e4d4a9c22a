// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/config.rs - 数据集与网络描述文件解析
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

mod dataset;
mod network;
mod vocabulary;

pub use self::dataset::{DatasetManifest, parse_dataset_manifest};
pub use self::network::{LayerBlock, NetworkDescription, parse_network_description};
pub use self::vocabulary::{Vocabulary, read_vocabulary};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("数据集描述文件格式错误: {0}")]
  MalformedManifest(String),
  #[error("网络描述文件格式错误: {0}")]
  MalformedDescription(String),
  #[error("无法读取文件 {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

fn read_document(path: &Path) -> Result<String, ConfigError> {
  std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })
}

/// 去掉一行中所有空白字符
fn strip_whitespace(line: &str) -> String {
  line.chars().filter(|c| !c.is_whitespace()).collect()
}
