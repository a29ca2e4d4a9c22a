// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/config/dataset.rs - 数据集描述文件
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

use tracing::{debug, warn};

use super::{ConfigError, read_document, strip_whitespace};

/// 数据集描述
///
/// 由 `key=value` 形式的文本解析而来，四个键都必须出现：
///
/// ```text
/// classes=8
/// train=dataset/train.txt
/// names=dataset/kitti.names
/// backup=backup/
/// ```
///
/// 同一个键出现多次时以最后一次为准，覆盖时会输出警告。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetManifest {
  pub class_count: usize,
  pub train_list_path: String,
  pub names_path: String,
  pub backup_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManifestKey {
  Classes,
  Train,
  Names,
  Backup,
}

impl ManifestKey {
  // 匹配优先级
  const ALL: [ManifestKey; 4] = [
    ManifestKey::Classes,
    ManifestKey::Train,
    ManifestKey::Names,
    ManifestKey::Backup,
  ];

  fn prefix(self) -> &'static str {
    match self {
      ManifestKey::Classes => "classes=",
      ManifestKey::Train => "train=",
      ManifestKey::Names => "names=",
      ManifestKey::Backup => "backup=",
    }
  }

  fn value_of(self, line: &str) -> Option<&str> {
    let value = line.strip_prefix(self.prefix())?;
    // classes 之后必须紧跟数字
    if self == ManifestKey::Classes && !value.starts_with(|c: char| c.is_ascii_digit()) {
      return None;
    }
    Some(value)
  }
}

#[derive(Default)]
struct ManifestSlots {
  classes: Option<String>,
  train: Option<String>,
  names: Option<String>,
  backup: Option<String>,
}

impl ManifestSlots {
  fn slot(&mut self, key: ManifestKey) -> &mut Option<String> {
    match key {
      ManifestKey::Classes => &mut self.classes,
      ManifestKey::Train => &mut self.train,
      ManifestKey::Names => &mut self.names,
      ManifestKey::Backup => &mut self.backup,
    }
  }

  fn take(&mut self, key: ManifestKey) -> Result<String, ConfigError> {
    match self.slot(key).take() {
      Some(value) if !value.is_empty() => Ok(value),
      Some(_) => Err(ConfigError::MalformedManifest(format!(
        "键 '{}' 的值为空",
        key.prefix()
      ))),
      None => Err(ConfigError::MalformedManifest(format!(
        "缺少必需的键 '{}'",
        key.prefix()
      ))),
    }
  }
}

impl FromStr for DatasetManifest {
  type Err = ConfigError;

  fn from_str(document: &str) -> Result<Self, Self::Err> {
    let mut slots = ManifestSlots::default();

    for (index, line) in document.lines().enumerate() {
      let line = strip_whitespace(line);
      if line.is_empty() {
        continue;
      }

      let Some((key, value)) = ManifestKey::ALL
        .iter()
        .find_map(|key| key.value_of(&line).map(|value| (*key, value)))
      else {
        debug!("忽略数据集描述第 {} 行: {}", index + 1, line);
        continue;
      };

      if let Some(previous) = slots.slot(key).replace(value.to_string()) {
        warn!(
          "数据集描述第 {} 行覆盖了 '{}': {} -> {}",
          index + 1,
          key.prefix(),
          previous,
          value
        );
      }
    }

    let classes = slots.take(ManifestKey::Classes)?;
    let class_count = classes
      .parse::<usize>()
      .ok()
      .filter(|count| *count > 0)
      .ok_or_else(|| ConfigError::MalformedManifest(format!("类别数量不是正整数: {classes}")))?;

    Ok(DatasetManifest {
      class_count,
      train_list_path: slots.take(ManifestKey::Train)?,
      names_path: slots.take(ManifestKey::Names)?,
      backup_dir: slots.take(ManifestKey::Backup)?,
    })
  }
}

pub fn parse_dataset_manifest(path: impl AsRef<Path>) -> Result<DatasetManifest, ConfigError> {
  read_document(path.as_ref())?.parse()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_all_four_keys() {
    let manifest: DatasetManifest = "classes=8\ntrain=t.txt\nnames=n.txt\nbackup=b/"
      .parse()
      .unwrap();

    assert_eq!(
      manifest,
      DatasetManifest {
        class_count: 8,
        train_list_path: "t.txt".to_string(),
        names_path: "n.txt".to_string(),
        backup_dir: "b/".to_string(),
      }
    );
  }

  #[test]
  fn order_and_whitespace_do_not_matter() {
    let manifest: DatasetManifest =
      "\n  backup = backup/ \nnames= data/kitti.names\n\nclasses = 12\ntrain =data/train.txt\n"
        .parse()
        .unwrap();

    assert_eq!(manifest.class_count, 12);
    assert_eq!(manifest.train_list_path, "data/train.txt");
    assert_eq!(manifest.names_path, "data/kitti.names");
    assert_eq!(manifest.backup_dir, "backup/");
  }

  #[test]
  fn later_lines_overwrite_earlier_ones() {
    let manifest: DatasetManifest = "classes=3\ntrain=a.txt\nnames=n.txt\nbackup=b/\ntrain=b.txt"
      .parse()
      .unwrap();

    assert_eq!(manifest.train_list_path, "b.txt");
  }

  #[test]
  fn unknown_keys_are_ignored() {
    let manifest: DatasetManifest = "classes=3\nvalid=v.txt\ntrain=t.txt\nnames=n.txt\nbackup=b/"
      .parse()
      .unwrap();

    assert_eq!(manifest.class_count, 3);
  }

  #[test]
  fn missing_key_is_malformed() {
    let result = "classes=8\ntrain=t.txt\nnames=n.txt".parse::<DatasetManifest>();

    assert!(matches!(result, Err(ConfigError::MalformedManifest(_))));
  }

  #[test]
  fn class_count_must_be_a_positive_integer() {
    for document in [
      "classes=abc\ntrain=t.txt\nnames=n.txt\nbackup=b/",
      "classes=0\ntrain=t.txt\nnames=n.txt\nbackup=b/",
      "classes=4x\ntrain=t.txt\nnames=n.txt\nbackup=b/",
    ] {
      let result = document.parse::<DatasetManifest>();
      assert!(
        matches!(result, Err(ConfigError::MalformedManifest(_))),
        "{document:?} should be rejected"
      );
    }
  }

  #[test]
  fn reading_a_missing_file_reports_the_path() {
    let result = parse_dataset_manifest("/nonexistent/qingxie/kitti.data");

    match result {
      Err(ConfigError::Io { path, .. }) => {
        assert_eq!(path, Path::new("/nonexistent/qingxie/kitti.data"))
      }
      other => panic!("unexpected result: {other:?}"),
    }
  }
}
