// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/frame.rs - NCHW 帧定义
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;
const NORMALIZE_MEAN: f32 = 0.5;
const NORMALIZE_STD: f32 = 0.5;

/// 送入网络的输入张量，形状为 `1 x 3 x H x W`
///
/// 像素先缩放到 `[0, 1]`，再按均值 0.5、标准差 0.5 归一化到 `[-1, 1]`。
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  width: u32,
  height: u32,
  data: Box<[f32]>,
}

impl RgbNchwFrame {
  pub fn from_rgb_image(image: &RgbImage, width: u32, height: u32) -> Self {
    let resized;
    let image = if image.dimensions() == (width, height) {
      image
    } else {
      resized = image::imageops::resize(image, width, height, FilterType::Triangle);
      &resized
    };

    let plane_size = (width as usize) * (height as usize);
    let mut data = vec![0f32; plane_size * RGB_CHANNELS];

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y as usize) * (width as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        let value = f32::from(pixel[c]) / 255.0;
        data[c * plane_size + idx] = (value - NORMALIZE_MEAN) / NORMALIZE_STD;
      }
    }

    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height as usize, self.width as usize]
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}
