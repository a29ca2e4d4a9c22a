// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/model/replay.rs - 离线检测结果回放
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

use std::{
  cell::Cell,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::RgbNchwFrame,
  model::{DetectResult, Model},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("无法读取检测结果文件 {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("检测结果文件格式错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("输入尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputSizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

/// 回放由外部评估器导出的检测框张量
///
/// 文件内容可以是单帧 `[[f32; 9], ...]`，也可以是多帧
/// `[[[f32; 9], ...], ...]`，多帧时每次推理依次取一帧并循环。
pub struct ReplayModel {
  input_size: (u32, u32),
  class_thresh: f32,
  frames: Vec<DetectResult>,
  cursor: Cell<usize>,
}

pub struct ReplayModelBuilder {
  input_size: (u32, u32),
  class_thresh: f32,
  detections: Option<PathBuf>,
}

impl ReplayModelBuilder {
  pub fn new(input_size: (u32, u32)) -> Self {
    ReplayModelBuilder {
      input_size,
      class_thresh: 0.0,
      detections: None,
    }
  }

  pub fn class_thresh(mut self, class_thresh: f32) -> Self {
    self.class_thresh = class_thresh;
    self
  }

  pub fn detections(mut self, path: Option<&Path>) -> Self {
    self.detections = path.map(Path::to_path_buf);
    self
  }

  pub fn build(self) -> Result<ReplayModel, ReplayError> {
    let frames = match &self.detections {
      Some(path) => {
        info!("加载检测结果文件: {}", path.display());
        let document = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
          path: path.clone(),
          source,
        })?;
        parse_frames(&document)?
      }
      None => Vec::new(),
    };
    info!("回放帧数: {}", frames.len());

    Ok(ReplayModel {
      input_size: self.input_size,
      class_thresh: self.class_thresh,
      frames,
      cursor: Cell::new(0),
    })
  }
}

fn parse_frames(document: &str) -> Result<Vec<DetectResult>, ReplayError> {
  if let Ok(frames) = serde_json::from_str::<Vec<Vec<Vec<f32>>>>(document) {
    // `[]` 是一帧空的检测结果
    if frames.is_empty() {
      return Ok(vec![DetectResult::default()]);
    }
    return Ok(frames.into_iter().map(DetectResult::from_rows).collect());
  }
  let rows = serde_json::from_str::<Vec<Vec<f32>>>(document)?;
  Ok(vec![DetectResult::from_rows(rows)])
}

impl ReplayModel {
  pub fn frame_count(&self) -> usize {
    self.frames.len()
  }
}

impl Model for ReplayModel {
  type Output = Option<DetectResult>;
  type Error = ReplayError;

  fn input_size(&self) -> (u32, u32) {
    self.input_size
  }

  fn infer(&self, input: &RgbNchwFrame) -> Result<Self::Output, Self::Error> {
    let actual = (input.width(), input.height());
    if actual != self.input_size {
      return Err(ReplayError::InputSizeMismatch {
        expected: self.input_size,
        actual,
      });
    }

    if self.frames.is_empty() {
      return Ok(None);
    }
    let index = self.cursor.get();
    self.cursor.set((index + 1) % self.frames.len());
    debug!("回放第 {} 帧检测结果", index);
    Ok(Some(self.frames[index].clone()))
  }

  fn evaluate(
    &self,
    output: Self::Output,
    _source_width: u32,
    _source_height: u32,
  ) -> Result<Option<DetectResult>, Self::Error> {
    Ok(output.map(|mut result| {
      result.retain_confident(self.class_thresh);
      result
    }))
  }
}
