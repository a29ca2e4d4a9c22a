// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频输入
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

//! # GStreamer 视频输入
//!
//! 支持视频文件与 V4L2 摄像头两种来源，输出为原始尺寸的 RGB 帧。
//!
//! ## URL
//!
//! - `gst://file/path/to/video.mp4?rotate=90`
//! - `gst://camera/dev/video0?width=640&height=480&fps=30`
//!
//! ## 系统依赖
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::{collections::HashMap, path::Path};

use crate::{FromUrl, FromUrlWithScheme, url_path};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

const STATE_CHANGE_TIMEOUT_SECONDS: u64 = 5;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("视频源无法打开: {0}")]
  SourceUnavailable(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("无法获取 appsink 元素")]
  AppSinkNotFound,
  #[error("无法转换元素为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        width,
        height,
        fps,
      } => {
        let mut caps = Vec::new();
        if let Some(width) = width {
          caps.push(format!("width={}", width));
        }
        if let Some(height) = height {
          caps.push(format!("height={}", height));
        }
        if let Some(fps) = fps {
          caps.push(format!("framerate={}/1", fps));
        }
        if caps.is_empty() {
          format!("v4l2src device={}", camera)
        } else {
          format!("v4l2src device={} ! video/x-raw,{}", camera, caps.join(","))
        }
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }

  // 打开管道前可以检查的来源
  fn local_path(&self) -> Option<&str> {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => Some(path),
      GStreamerInputBuilderItem::CameraSource { camera, .. } => Some(camera),
      _ => None,
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerInputPipelineBuilder {
  pub fn file(path: impl Into<String>) -> Self {
    GStreamerInputPipelineBuilder {
      items: vec![GStreamerInputBuilderItem::FileSource(path.into())],
    }
  }

  pub fn camera(
    camera: impl Into<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
  ) -> Self {
    GStreamerInputPipelineBuilder {
      items: vec![GStreamerInputBuilderItem::CameraSource {
        camera: camera.into(),
        width,
        height,
        fps,
      }],
    }
  }

  pub fn rotate(mut self, rotate: Option<&str>) -> Self {
    let method = match rotate {
      Some("90") => 1,
      Some("180") => 2,
      Some("270") => 3,
      _ => return self,
    };
    self
      .items
      .push(GStreamerInputBuilderItem::VideoFlip { method });
    self
  }

  pub fn describe(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .chain(std::iter::once(
        GStreamerInputBuilderItem::TargetFormat {
          format: "RGB".to_string(),
        }
        .to_pipeline(),
      ))
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 sync=false name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    for path in self.items.iter().filter_map(|item| item.local_path()) {
      if !Path::new(path).exists() {
        return Err(GStreamerInputError::SourceUnavailable(format!(
          "{} 不存在",
          path
        )));
      }
    }

    gst::init()?;

    let full_pipeline = self.describe();
    info!("GStreamer 管道描述: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    // 从这里开始由 Drop 负责把管道置回 Null
    let input = GStreamerInput { pipeline, appsink };

    input
      .pipeline
      .set_state(gst::State::Playing)
      .map_err(|e| GStreamerInputError::SourceUnavailable(e.to_string()))?;
    let (result, _, _) = input
      .pipeline
      .state(gst::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_SECONDS));
    result.map_err(|e| GStreamerInputError::SourceUnavailable(e.to_string()))?;

    Ok(input)
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let number = |key: &str| query.get(key).and_then(|v| v.parse::<u32>().ok());

    let path = url_path(url);
    let builder = match url.host_str() {
      Some("camera") => Self::camera(path, number("width"), number("height"), number("fps")),
      Some("file") => Self::file(path),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    Ok(builder.rotate(query.get("rotate").map(String::as_str)))
  }
}

/// GStreamer 视频输入，逐帧产出 RGB 图像，流结束时停止
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止 GStreamer 管道: {}", e);
    }
    info!("视频源已释放");
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(sample),
      Err(_) if self.appsink.is_eos() => {
        debug!("视频流结束");
        None
      }
      Err(e) => {
        error!("无法获取样本: {}", e);
        None
      }
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    convert_sample_to_rgb(sample)
      .map_err(|e| {
        error!("无法转换样本: {}", e);
        e
      })
      .ok()
  }
}

fn convert_sample_to_rgb(sample: gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let offset = video_info.offset()[0];

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  // 每行末尾可能有对齐填充
  let expected_size = offset + stride * height.saturating_sub(1) + width * 3;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let reverse = match video_info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let mut pixels = Vec::with_capacity(width * height * 3);
  for row in 0..height {
    let start = offset + row * stride;
    let line = &data[start..start + width * 3];
    if reverse {
      for pixel in line.chunks_exact(3) {
        pixels.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
      }
    } else {
      pixels.extend_from_slice(line);
    }
  }

  RgbImage::from_raw(width as u32, height as u32, pixels)
    .ok_or_else(|| GStreamerInputError::PipelineError("无法构造图像".to_string()))
}
