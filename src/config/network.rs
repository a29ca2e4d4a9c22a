// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/config/network.rs - 网络描述文件
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

use std::{path::Path, str::FromStr};

use tracing::info;

use super::{ConfigError, read_document, strip_whitespace};

/// 网络描述中的一个段
///
/// `kind` 是方括号中的段名，位于第一个方括号之前的内容组成的段没有段名。
/// `raw_lines` 保存去掉空白后的原始 `key=value` 文本，字段拆分交给网络构建方。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerBlock {
  kind: String,
  raw_lines: Vec<String>,
}

impl LayerBlock {
  pub fn kind(&self) -> &str {
    &self.kind
  }

  pub fn raw_lines(&self) -> &[String] {
    &self.raw_lines
  }

  /// 按行拼接的原始文本，每行以换行结尾
  pub fn raw_text(&self) -> String {
    self.raw_lines.iter().fold(String::new(), |mut text, line| {
      text.push_str(line);
      text.push('\n');
      text
    })
  }

  /// 按出现顺序拆分字段，重复的键原位覆盖
  pub fn fields(&self) -> Vec<(&str, &str)> {
    let mut fields: Vec<(&str, &str)> = Vec::with_capacity(self.raw_lines.len());
    for line in &self.raw_lines {
      let Some((key, value)) = line.split_once('=') else {
        continue;
      };
      match fields.iter_mut().find(|(existing, _)| *existing == key) {
        Some(field) => field.1 = value,
        None => fields.push((key, value)),
      }
    }
    fields
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .fields()
      .into_iter()
      .find_map(|(k, v)| (k == key).then_some(v))
  }

  pub fn parse_field<T: FromStr>(&self, key: &str) -> Option<Result<T, T::Err>> {
    self.get(key).map(str::parse)
  }
}

/// 正在累积的段，遇到下一个段头时落地为 `LayerBlock`
#[derive(Default)]
struct BlockAccumulator {
  kind: String,
  raw_lines: Vec<String>,
}

impl BlockAccumulator {
  fn open(kind: &str) -> Self {
    BlockAccumulator {
      kind: kind.to_string(),
      raw_lines: Vec::new(),
    }
  }

  fn is_empty(&self) -> bool {
    self.kind.is_empty() && self.raw_lines.is_empty()
  }

  fn push(&mut self, line: String) {
    self.raw_lines.push(line);
  }

  fn finish(self) -> LayerBlock {
    LayerBlock {
      kind: self.kind,
      raw_lines: self.raw_lines,
    }
  }
}

fn is_identifier(name: &str) -> bool {
  !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// 网络描述
///
/// 第 0 个段保存网络全局参数（输入宽高等），其后每个段对应一层。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescription {
  blocks: Vec<LayerBlock>,
}

impl NetworkDescription {
  pub fn blocks(&self) -> &[LayerBlock] {
    &self.blocks
  }

  pub fn net(&self) -> &LayerBlock {
    &self.blocks[0]
  }

  pub fn layers(&self) -> &[LayerBlock] {
    &self.blocks[1..]
  }

  pub fn layer_count(&self) -> usize {
    self.blocks.len() - 1
  }

  /// 网络输入尺寸 `(width, height)`
  pub fn input_size(&self) -> Result<(u32, u32), ConfigError> {
    let dimension = |key: &str| -> Result<u32, ConfigError> {
      match self.net().parse_field::<u32>(key) {
        Some(Ok(value)) if value > 0 => Ok(value),
        Some(_) => Err(ConfigError::MalformedDescription(format!(
          "网络参数 '{key}' 不是正整数"
        ))),
        None => Err(ConfigError::MalformedDescription(format!(
          "网络参数缺少 '{key}'"
        ))),
      }
    };
    Ok((dimension("width")?, dimension("height")?))
  }
}

impl FromStr for NetworkDescription {
  type Err = ConfigError;

  fn from_str(document: &str) -> Result<Self, Self::Err> {
    let mut blocks = Vec::new();
    let mut current = BlockAccumulator::default();

    for (index, line) in document.lines().enumerate() {
      // `#` 之后都是注释
      let line = line.split_once('#').map_or(line, |(content, _)| content);
      let line = strip_whitespace(line.trim());
      if line.is_empty() {
        continue;
      }

      let Some(header) = line.strip_prefix('[') else {
        current.push(line);
        continue;
      };
      let invalid = || {
        ConfigError::MalformedDescription(format!("第 {} 行的段头无效: {}", index + 1, line))
      };
      let (kind, rest) = header.split_once(']').ok_or_else(invalid)?;
      if !is_identifier(kind) {
        return Err(invalid());
      }
      let finished = std::mem::replace(&mut current, BlockAccumulator::open(kind));
      if !finished.is_empty() {
        blocks.push(finished.finish());
      }
      if !rest.is_empty() {
        current.push(rest.to_string());
      }
    }

    if !current.is_empty() {
      blocks.push(current.finish());
    }

    if blocks.is_empty() {
      return Err(ConfigError::MalformedDescription("没有任何段".to_string()));
    }

    info!("网络层数: {}", blocks.len() - 1);
    Ok(NetworkDescription { blocks })
  }
}

pub fn parse_network_description(
  path: impl AsRef<Path>,
) -> Result<NetworkDescription, ConfigError> {
  read_document(path.as_ref())?.parse()
}

impl<'a> IntoIterator for &'a NetworkDescription {
  type Item = &'a LayerBlock;
  type IntoIter = std::slice::Iter<'a, LayerBlock>;

  fn into_iter(self) -> Self::IntoIter {
    self.blocks.iter()
  }
}
