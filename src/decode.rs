// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/decode.rs - 旋转框解码
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

use crate::model::RawDetection;

/// 像素坐标系下的旋转框
///
/// 四个角点到中心的距离都是半对角线 `diagonal / 2`，方向分别为
/// `heading ∓ theta`（P1/P2 互为反向，P3/P4 互为反向）。
/// 其中 `theta = atan2(w, h)`，把 `(w, h)` 当作向量处理。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
  pub center: (i32, i32),
  pub extent: (i32, i32),
  pub heading: f64,
  pub theta: f64,
  pub diagonal: f64,
  /// P1, P2, P3, P4
  pub points: [(f64, f64); 4],
}

impl OrientedBox {
  /// 截断到整数像素的角点
  pub fn corners(&self) -> [(i32, i32); 4] {
    self.points.map(|(x, y)| (x as i32, y as i32))
  }

  /// 需要绘制的四条边：P1-P3、P1-P4、P2-P3、P2-P4
  pub fn edges(&self) -> [((i32, i32), (i32, i32)); 4] {
    let [p1, p2, p3, p4] = self.corners();
    [(p1, p3), (p1, p4), (p2, p3), (p2, p4)]
  }

  /// 标签锚点
  pub fn anchor(&self) -> (i32, i32) {
    self.corners()[0]
  }
}

/// 把归一化的检测行转换为 `image_width x image_height` 图像上的旋转框
pub fn decode(raw: &RawDetection, image_width: u32, image_height: u32) -> OrientedBox {
  let heading = raw.heading();

  let (image_width, image_height) = (image_width as f32, image_height as f32);
  let x = (raw.center_x * image_width) as i32;
  let y = (raw.center_y * image_height) as i32;
  let w = (raw.width * image_width) as i32;
  let h = (raw.height * image_height) as i32;

  let theta = f64::from(w).atan2(f64::from(h));
  let diagonal = f64::from(w).hypot(f64::from(h));
  let half = diagonal / 2.0;

  let (cx, cy) = (f64::from(x), f64::from(y));
  let (minus_cos, minus_sin) = ((heading - theta).cos(), (heading - theta).sin());
  let (plus_cos, plus_sin) = ((heading + theta).cos(), (heading + theta).sin());

  let points = [
    (cx + half * minus_cos, cy + half * minus_sin),
    (cx - half * minus_cos, cy - half * minus_sin),
    (cx + half * plus_cos, cy + half * plus_sin),
    (cx - half * plus_cos, cy - half * plus_sin),
  ];

  OrientedBox {
    center: (x, y),
    extent: (w, h),
    heading,
    theta,
    diagonal,
    points,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPSILON: f64 = 1e-9;

  fn raw(center: (f32, f32), size: (f32, f32), heading: (f32, f32)) -> RawDetection {
    RawDetection {
      reserved: 0.0,
      center_x: center.0,
      center_y: center.1,
      width: size.0,
      height: size.1,
      heading_sin: heading.0,
      heading_cos: heading.1,
      class: None,
    }
  }

  fn assert_point(actual: (f64, f64), expected: (f64, f64)) {
    assert!(
      (actual.0 - expected.0).abs() < EPSILON && (actual.1 - expected.1).abs() < EPSILON,
      "{actual:?} != {expected:?}"
    );
  }

  #[test]
  fn decodes_axis_heading_box() {
    let oriented = decode(&raw((0.5, 0.5), (0.2, 0.1), (0.0, 1.0)), 100, 100);

    assert_eq!(oriented.center, (50, 50));
    assert_eq!(oriented.extent, (20, 10));
    assert!((oriented.theta - 20f64.atan2(10.0)).abs() < EPSILON);
    assert!((oriented.theta - 1.107).abs() < 1e-3);
    assert!((oriented.diagonal - 500f64.sqrt()).abs() < EPSILON);

    assert_point(oriented.points[0], (55.0, 40.0));
    assert_point(oriented.points[1], (45.0, 60.0));
    assert_point(oriented.points[2], (55.0, 60.0));
    assert_point(oriented.points[3], (45.0, 40.0));
  }

  #[test]
  fn equal_extents_put_corners_on_diagonals() {
    let oriented = decode(&raw((0.5, 0.5), (0.2, 0.2), (0.0, 1.0)), 100, 100);

    assert!((oriented.theta - std::f64::consts::FRAC_PI_4).abs() < EPSILON);
    for (x, y) in oriented.points {
      let (dx, dy) = (x - 50.0, y - 50.0);
      assert!((dx.abs() - dy.abs()).abs() < EPSILON);
      assert!((dx.hypot(dy) - oriented.diagonal / 2.0).abs() < EPSILON);
    }
  }

  #[test]
  fn heading_rotates_the_corners() {
    // 朝向 90 度
    let oriented = decode(&raw((0.5, 0.5), (0.2, 0.1), (1.0, 0.0)), 100, 100);

    assert!((oriented.heading - std::f64::consts::FRAC_PI_2).abs() < EPSILON);
    assert_point(oriented.points[0], (60.0, 55.0));
    assert_point(oriented.points[1], (40.0, 45.0));
    assert_point(oriented.points[2], (40.0, 55.0));
    assert_point(oriented.points[3], (60.0, 45.0));
  }

  #[test]
  fn decoding_is_deterministic() {
    let detection = raw((0.31, 0.77), (0.13, 0.29), (0.6, -0.8));
    let first = decode(&detection, 1242, 375);
    let second = decode(&detection, 1242, 375);

    for (a, b) in first.points.iter().zip(second.points.iter()) {
      assert_eq!(a.0.to_bits(), b.0.to_bits());
      assert_eq!(a.1.to_bits(), b.1.to_bits());
    }
    assert_eq!(first.corners(), second.corners());
  }

  #[test]
  fn edges_skip_the_diagonals() {
    let oriented = decode(&raw((0.5, 0.5), (0.4, 0.2), (0.0, 1.0)), 10, 10);
    let [p1, p2, p3, p4] = oriented.corners();

    assert_eq!(oriented.edges(), [(p1, p3), (p1, p4), (p2, p3), (p2, p4)]);
    assert_eq!(oriented.anchor(), p1);
  }

  #[test]
  fn pixel_values_truncate_toward_zero() {
    let oriented = decode(&raw((0.019, 0.5), (0.0, 0.0), (0.0, 1.0)), 100, 100);

    assert_eq!(oriented.center, (1, 50));
    assert_eq!(oriented.extent, (0, 0));
    assert_eq!(oriented.corners(), [(1, 50); 4]);
  }
}
