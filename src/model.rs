// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/model.rs - 模型
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

use crate::frame::RgbNchwFrame;

/// 网络与后处理的能力接口
///
/// `infer` 对应网络前向，`evaluate` 对应把网络输出整理成检测框张量
/// （阈值过滤、NMS 都已在这里完成）。`evaluate` 返回 `None` 表示没有结果。
pub trait Model {
  type Output;
  type Error;

  /// 网络输入尺寸 `(width, height)`
  fn input_size(&self) -> (u32, u32);
  fn infer(&self, input: &RgbNchwFrame) -> Result<Self::Output, Self::Error>;
  fn evaluate(
    &self,
    output: Self::Output,
    source_width: u32,
    source_height: u32,
  ) -> Result<Option<DetectResult>, Self::Error>;
}

/// 解码几何所需的最少字段数
pub const GEOMETRY_FIELDS: usize = 7;
/// 含类别与置信度的完整字段数
pub const DETECTION_FIELDS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScore {
  pub class_id: usize,
  pub confidence: f32,
}

/// 检测框张量中的一行
///
/// 字段顺序：`[reserved, cx, cy, w, h, sin, cos, class_id, class_conf]`，
/// 位置与尺寸按网络输入归一化到 `[0, 1]`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
  pub reserved: f32,
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
  pub heading_sin: f32,
  pub heading_cos: f32,
  /// 行长度不足或类别编号无效时为 `None`
  pub class: Option<ClassScore>,
}

impl RawDetection {
  pub fn from_row(row: &[f32]) -> Option<Self> {
    if row.len() < GEOMETRY_FIELDS {
      return None;
    }

    let class = match row.get(7..DETECTION_FIELDS) {
      Some(&[class_id, confidence]) if class_id.is_finite() && class_id >= 0.0 => {
        Some(ClassScore {
          class_id: class_id as usize,
          confidence,
        })
      }
      _ => None,
    };

    Some(RawDetection {
      reserved: row[0],
      center_x: row[1],
      center_y: row[2],
      width: row[3],
      height: row[4],
      heading_sin: row[5],
      heading_cos: row[6],
      class,
    })
  }

  pub fn heading(&self) -> f64 {
    f64::from(self.heading_sin).atan2(f64::from(self.heading_cos))
  }
}

/// 一帧的检测结果，行顺序无意义
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  rows: Vec<Vec<f32>>,
}

impl DetectResult {
  pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
    DetectResult { rows }
  }

  pub fn rows(&self) -> &[Vec<f32>] {
    &self.rows
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// 过滤掉置信度低于 `thresh` 的行，缺少置信度字段的行保留
  pub fn retain_confident(&mut self, thresh: f32) {
    self.rows.retain(|row| {
      row
        .get(DETECTION_FIELDS - 1)
        .is_none_or(|confidence| *confidence >= thresh)
    });
  }

  /// 可以解码几何的行
  pub fn detections(&self) -> impl Iterator<Item = RawDetection> + '_ {
    self.rows.iter().filter_map(|row| RawDetection::from_row(row))
  }
}

mod replay;
pub use self::replay::{ReplayError, ReplayModel, ReplayModelBuilder};
