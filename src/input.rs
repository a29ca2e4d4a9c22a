// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi"];
const GSTREAMER_SCHEME: &str = "gst";

#[derive(Error, Debug)]
pub enum InputError {
  #[error("视频源无法打开: {0}")]
  SourceUnavailable(String),
  #[error("不支持的输入: {0}")]
  UnsupportedSource(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(GStreamerInputError),
}

#[cfg(feature = "gstreamer_input")]
impl From<GStreamerInputError> for InputError {
  fn from(err: GStreamerInputError) -> Self {
    match err {
      GStreamerInputError::SourceUnavailable(reason) => InputError::SourceUnavailable(reason),
      err => InputError::GStreamerInputError(err),
    }
  }
}

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  /// 单张图片
  Image,
  /// 视频文件或摄像头
  Stream,
}

/// 从命令行参数识别出的输入来源
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
  ImageFile(PathBuf),
  VideoFile(PathBuf),
  /// 摄像头设备，例如 `/dev/video0`
  Camera(String),
  Url(Url),
}

fn extension_of(path: &Path) -> Option<String> {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(str::to_ascii_lowercase)
}

impl InputSource {
  /// 识别图片路径、视频路径、摄像头编号或 URL
  pub fn parse(source: &str) -> Result<Self, InputError> {
    if let Ok(url) = Url::parse(source)
      && (url.scheme() == ImageFileInput::SCHEME || url.scheme() == GSTREAMER_SCHEME)
    {
      return Ok(InputSource::Url(url));
    }

    if !source.is_empty() && source.chars().all(|c| c.is_ascii_digit()) {
      return Ok(InputSource::Camera(format!("/dev/video{}", source)));
    }

    let path = PathBuf::from(source);
    match extension_of(&path) {
      Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => Ok(InputSource::ImageFile(path)),
      Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Ok(InputSource::VideoFile(path)),
      _ => Err(InputError::UnsupportedSource(source.to_string())),
    }
  }

  pub fn kind(&self) -> SourceKind {
    match self {
      InputSource::ImageFile(_) => SourceKind::Image,
      InputSource::VideoFile(_) | InputSource::Camera(_) => SourceKind::Stream,
      InputSource::Url(url) if url.scheme() == ImageFileInput::SCHEME => SourceKind::Image,
      InputSource::Url(_) => SourceKind::Stream,
    }
  }

  pub fn open(self) -> Result<InputWrapper, InputError> {
    info!("打开输入: {:?}", self);
    match self {
      InputSource::ImageFile(path) => Ok(InputWrapper::ReadImageFile(ImageFileInput::open(path)?)),
      InputSource::Url(url) => InputWrapper::from_url(&url),
      #[cfg(feature = "gstreamer_input")]
      InputSource::VideoFile(path) => {
        let builder = GStreamerInputPipelineBuilder::file(path.to_string_lossy());
        Ok(InputWrapper::GStreamerInput(builder.build()?))
      }
      #[cfg(feature = "gstreamer_input")]
      InputSource::Camera(device) => {
        let builder = GStreamerInputPipelineBuilder::camera(device, None, None, None);
        Ok(InputWrapper::GStreamerInput(builder.build()?))
      }
      #[cfg(not(feature = "gstreamer_input"))]
      InputSource::VideoFile(path) => Err(InputError::SourceUnavailable(format!(
        "{}: 未启用 gstreamer_input 特性",
        path.display()
      ))),
      #[cfg(not(feature = "gstreamer_input"))]
      InputSource::Camera(device) => Err(InputError::SourceUnavailable(format!(
        "{}: 未启用 gstreamer_input 特性",
        device
      ))),
    }
  }
}

/// 已打开的输入，逐帧产出原始尺寸的 RGB 图像
pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
}

impl InputWrapper {
  pub fn from_source(source: &str) -> Result<Self, InputError> {
    InputSource::parse(source)?.open()
  }

  pub fn kind(&self) -> SourceKind {
    match self {
      InputWrapper::ReadImageFile(_) => SourceKind::Image,
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(_) => SourceKind::Stream,
    }
  }
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(not(feature = "gstreamer_input"))]
    {
      if url.scheme() == GSTREAMER_SCHEME {
        return Err(InputError::SourceUnavailable(format!(
          "{}: 未启用 gstreamer_input 特性",
          url
        )));
      }
    }

    if url.scheme() == ImageFileInput::SCHEME {
      let input = ImageFileInput::from_url(url)?;
      return Ok(InputWrapper::ReadImageFile(input));
    }
    Err(InputError::SchemeMismatch)
  }
}

impl Iterator for InputWrapper {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
    }
  }
}
