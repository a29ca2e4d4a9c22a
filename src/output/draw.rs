// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/output/draw.rs - 旋转框检测结果可视化
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

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use tracing::{debug, info, warn};

use crate::{
  config::Vocabulary,
  decode::decode,
  model::{ClassScore, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const FPS_FONT_SIZE: f32 = 30.0;
const FPS_ANCHOR: (i32, i32) = (100, 100);
const DEFAULT_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

const COLOR_HASH_MULTIPLIER: usize = 123457;
const PALETTE: [[f32; 3]; 6] = [
  [1.0, 0.0, 1.0], // 品红
  [0.0, 0.0, 1.0], // 蓝
  [0.0, 1.0, 1.0], // 青
  [0.0, 1.0, 0.0], // 绿
  [1.0, 1.0, 0.0], // 黄
  [1.0, 0.0, 0.0], // 红
];

// DejaVu Sans
const FONT_DATA: &[u8] = include_bytes!("../../assets/font.ttf");

fn embedded_font() -> Option<FontArc> {
  match FontArc::try_from_slice(FONT_DATA) {
    Ok(font) => Some(font),
    Err(e) => {
      warn!("无法加载嵌入的字体，只绘制检测框: {}", e);
      None
    }
  }
}

fn palette_channel(channel: usize, offset: usize, class_count: usize) -> u8 {
  let ratio = offset as f32 / class_count as f32 * 5.0;
  let lower = ratio.floor() as usize;
  let upper = ratio.ceil() as usize;
  let ratio = ratio - lower as f32;
  let value = (1.0 - ratio) * PALETTE[lower][channel] + ratio * PALETTE[upper][channel];
  (value * 255.0) as u8
}

/// 按类别编号生成的固定颜色
pub fn class_color(class_id: usize, class_count: usize) -> Rgb<u8> {
  if class_count == 0 {
    return Rgb(DEFAULT_COLOR);
  }
  let offset =
    (class_id % class_count) * (COLOR_HASH_MULTIPLIER % class_count) % class_count;
  Rgb([
    palette_channel(0, offset, class_count),
    palette_channel(1, offset, class_count),
    palette_channel(2, offset, class_count),
  ])
}

/// 把线段裁剪到图像范围内，完全在外面时返回 `None`
fn clip_segment(
  start: (f32, f32),
  end: (f32, f32),
  width: u32,
  height: u32,
) -> Option<((f32, f32), (f32, f32))> {
  if width == 0 || height == 0 {
    return None;
  }
  let (x_max, y_max) = ((width - 1) as f32, (height - 1) as f32);
  let (dx, dy) = (end.0 - start.0, end.1 - start.1);
  let (mut t0, mut t1) = (0f32, 1f32);

  for (p, q) in [
    (-dx, start.0),
    (dx, x_max - start.0),
    (-dy, start.1),
    (dy, y_max - start.1),
  ] {
    if p == 0.0 {
      if q < 0.0 {
        return None;
      }
      continue;
    }
    let t = q / p;
    if p < 0.0 {
      t0 = t0.max(t);
    } else {
      t1 = t1.min(t);
    }
    if t0 > t1 {
      return None;
    }
  }

  Some((
    (start.0 + t0 * dx, start.1 + t0 * dy),
    (start.0 + t1 * dx, start.1 + t1 * dy),
  ))
}

/// 检测结果绘制器
pub struct Draw {
  vocabulary: Vocabulary,
  font: Option<FontArc>,
  fixed_color: Option<Rgb<u8>>,
  label_scale: PxScale,
  fps_scale: PxScale,
}

impl Draw {
  /// 使用嵌入的默认字体
  pub fn new(vocabulary: Vocabulary) -> Self {
    Self {
      vocabulary,
      font: embedded_font(),
      fixed_color: None,
      label_scale: PxScale::from(LABEL_FONT_SIZE),
      fps_scale: PxScale::from(FPS_FONT_SIZE),
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  /// 所有框都使用同一种颜色
  pub fn with_fixed_color(mut self, color: Rgb<u8>) -> Self {
    self.fixed_color = Some(color);
    self
  }

  pub fn vocabulary(&self) -> &Vocabulary {
    &self.vocabulary
  }

  pub fn read_font(path: &Path) -> Result<FontArc, std::io::Error> {
    let data = std::fs::read(path)?;
    FontArc::try_from_vec(data)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
  }

  // cv2 风格：锚点是文本基线的左端
  fn draw_text(
    &self,
    image: &mut RgbImage,
    text: &str,
    anchor: (i32, i32),
    scale: PxScale,
    color: Rgb<u8>,
  ) {
    let Some(font) = &self.font else {
      return;
    };
    let ascent = font.as_scaled(scale).ascent().round() as i32;
    draw_text_mut(image, color, anchor.0, anchor.1 - ascent, scale, font, text);
  }

  fn draw_edge(image: &mut RgbImage, start: (i32, i32), end: (i32, i32), color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let start = (start.0 as f32, start.1 as f32);
    let end = (end.0 as f32, end.1 as f32);
    if let Some((start, end)) = clip_segment(start, end, width, height) {
      draw_line_segment_mut(image, start, end, color);
    }
  }

  /// 在图像上绘制检测框、类别标签以及可选的帧率，返回绘制的框数
  ///
  /// 缺少类别字段或类别编号超出类别表的检测会被跳过。
  /// 帧率使用最后一个框的颜色，没有绘制任何框时使用默认颜色。
  pub fn draw_detections_mut(
    &self,
    image: &mut RgbImage,
    result: &DetectResult,
    fps: Option<f32>,
  ) -> usize {
    let (width, height) = image.dimensions();
    let mut color = self.fixed_color.unwrap_or(Rgb(DEFAULT_COLOR));
    let mut drawn = 0;

    for raw in result.detections() {
      let Some(ClassScore {
        class_id,
        confidence,
      }) = raw.class
      else {
        debug!("检测结果缺少类别字段，跳过");
        continue;
      };
      let Some(name) = self.vocabulary.get(class_id) else {
        warn!(
          "类别编号 {} 超出类别表范围 ({})，跳过",
          class_id,
          self.vocabulary.len()
        );
        continue;
      };

      info!("{}: {:.6}", name, confidence);
      let oriented = decode(&raw, width, height);
      color = self
        .fixed_color
        .unwrap_or_else(|| class_color(class_id, self.vocabulary.len()));

      let label = format!("{}{:.2}", name, confidence);
      self.draw_text(image, &label, oriented.anchor(), self.label_scale, color);
      for (start, end) in oriented.edges() {
        Self::draw_edge(image, start, end, color);
      }
      drawn += 1;
    }

    if let Some(fps) = fps {
      let fps_info = format!("fps:{:.2}", fps);
      self.draw_text(image, &fps_info, FPS_ANCHOR, self.fps_scale, color);
    }

    drawn
  }

  pub fn draw_detections(
    &self,
    mut image: RgbImage,
    result: &DetectResult,
    fps: Option<f32>,
  ) -> RgbImage {
    self.draw_detections_mut(&mut image, result, fps);
    image
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vocabulary() -> Vocabulary {
    ["Car", "Van", "Truck", "Pedestrian", "Person_sitting", "Cyclist", "Tram", "Misc"]
      .into_iter()
      .collect()
  }

  fn row(class_id: f32, confidence: f32) -> Vec<f32> {
    vec![0.0, 0.5, 0.5, 0.2, 0.1, 0.0, 1.0, class_id, confidence]
  }

  #[test]
  fn first_offset_is_magenta() {
    assert_eq!(class_color(0, 8), Rgb([255, 0, 255]));
  }

  #[test]
  fn colors_interpolate_between_anchors() {
    // 123457 % 8 == 1，位置 5/8 落在品红与蓝之间
    assert_eq!(class_color(1, 8), Rgb([95, 0, 255]));
  }

  #[test]
  fn color_depends_only_on_class_and_vocabulary_size() {
    for class_count in [1, 3, 8, 80] {
      for class_id in 0..class_count {
        assert_eq!(class_color(class_id, class_count), class_color(class_id, class_count));
      }
      assert_eq!(class_color(class_count, class_count), class_color(0, class_count));
    }
  }

  #[test]
  fn draws_edges_in_class_color() {
    let mut image = RgbImage::new(100, 100);
    let result = DetectResult::from_rows(vec![row(0.0, 0.87)]);

    let drawn = Draw::new(vocabulary()).draw_detections_mut(&mut image, &result, None);

    assert_eq!(drawn, 1);
    let raw = result.detections().next().unwrap();
    for (x, y) in decode(&raw, 100, 100).corners() {
      assert_eq!(*image.get_pixel(x as u32, y as u32), Rgb([255, 0, 255]));
    }
    // 中心不在任何一条边上
    assert_eq!(*image.get_pixel(50, 50), Rgb([0, 0, 0]));
  }

  #[test]
  fn fixed_color_overrides_palette() {
    let mut image = RgbImage::new(100, 100);
    let result = DetectResult::from_rows(vec![row(2.0, 0.5)]);
    let draw = Draw::new(vocabulary()).with_fixed_color(Rgb([0, 255, 0]));

    draw.draw_detections_mut(&mut image, &result, Some(12.5));

    let raw = result.detections().next().unwrap();
    let (x, y) = decode(&raw, 100, 100).anchor();
    assert_eq!(*image.get_pixel(x as u32, y as u32), Rgb([0, 255, 0]));
  }

  fn is_black(pixel: &Rgb<u8>) -> bool {
    *pixel == Rgb([0, 0, 0])
  }

  #[test]
  fn incomplete_or_unknown_detections_are_skipped() {
    let mut image = RgbImage::new(300, 200);
    let result = DetectResult::from_rows(vec![
      vec![0.0, 0.5, 0.5, 0.2, 0.1, 0.0, 1.0],
      row(42.0, 0.9),
      vec![0.0, 0.5],
    ]);

    let drawn = Draw::new(vocabulary()).draw_detections_mut(&mut image, &result, Some(30.0));

    assert_eq!(drawn, 0);
    // 只剩默认蓝色的帧率文字
    assert!(image.pixels().any(|pixel| !is_black(pixel)));
    for (x, y, pixel) in image.enumerate_pixels() {
      if is_black(pixel) {
        continue;
      }
      assert_eq!((pixel[0], pixel[1]), (0, 0), "({x}, {y})");
      assert!(x >= 99 && (70..=112).contains(&y), "({x}, {y})");
    }
  }

  #[test]
  fn embedded_font_is_available() {
    assert!(embedded_font().is_some());
  }

  #[test]
  fn label_sits_above_the_anchor_baseline() {
    let mut image = RgbImage::new(200, 200);
    let result = DetectResult::from_rows(vec![row(0.0, 0.87)]);

    Draw::new(vocabulary()).draw_detections_mut(&mut image, &result, None);

    // 锚点 P1 = (110, 80)，框的边都在 x <= 110
    let mut label_pixels = 0;
    for (x, y, pixel) in image.enumerate_pixels() {
      if x < 112 || is_black(pixel) {
        continue;
      }
      assert!((60..82).contains(&y), "({x}, {y})");
      assert_eq!(pixel[1], 0);
      assert_eq!(pixel[0], pixel[2]);
      label_pixels += 1;
    }
    assert!(label_pixels > 0);
  }

  #[test]
  fn fps_uses_the_last_box_color() {
    let mut image = RgbImage::new(300, 200);
    let result =
      DetectResult::from_rows(vec![vec![0.0, 0.8, 0.8, 0.05, 0.05, 0.0, 1.0, 0.0, 0.9]]);

    Draw::new(vocabulary()).draw_detections_mut(&mut image, &result, Some(25.0));

    let fps_pixels: Vec<_> = image
      .enumerate_pixels()
      .filter(|(_, y, pixel)| (60..115).contains(y) && !is_black(*pixel))
      .map(|(_, _, pixel)| *pixel)
      .collect();
    assert!(!fps_pixels.is_empty());
    assert!(fps_pixels.iter().all(|pixel| pixel[1] == 0 && pixel[0] == pixel[2]));
  }

  #[test]
  fn text_is_skipped_without_a_font() {
    let mut image = RgbImage::new(300, 200);
    let mut draw = Draw::new(vocabulary());
    draw.font = None;

    draw.draw_detections_mut(&mut image, &DetectResult::default(), Some(30.0));

    assert!(image.pixels().all(is_black));
  }

  #[test]
  fn boxes_crossing_the_border_are_clipped() {
    let mut image = RgbImage::new(40, 30);
    let result = DetectResult::from_rows(vec![
      vec![0.0, 0.98, 0.02, 0.9, 0.9, 0.6, 0.8, 5.0, 0.7],
      vec![0.0, 5.0, -3.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.7],
    ]);

    let drawn = Draw::new(vocabulary()).draw_detections_mut(&mut image, &result, None);

    assert_eq!(drawn, 2);
    assert!(image.pixels().any(|pixel| *pixel != Rgb([0, 0, 0])));
  }

  #[test]
  fn clip_segment_handles_inside_and_outside() {
    assert_eq!(
      clip_segment((1.0, 1.0), (5.0, 5.0), 10, 10),
      Some(((1.0, 1.0), (5.0, 5.0)))
    );
    assert_eq!(
      clip_segment((-10.0, 5.0), (22.0, 5.0), 10, 10),
      Some(((0.0, 5.0), (9.0, 5.0)))
    );
    assert_eq!(clip_segment((-5.0, -5.0), (-1.0, 20.0), 10, 10), None);
    assert_eq!(clip_segment((1.0, 1.0), (2.0, 2.0), 0, 10), None);
  }

  #[test]
  fn reading_a_missing_font_fails() {
    assert!(Draw::read_font(Path::new("/nonexistent/qingxie/font.ttf")).is_err());
  }
}
