// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/output.rs - 输出定义
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

use std::{convert::Infallible, time::Duration};

use image::RgbImage;
use thiserror::Error;
#[cfg(not(feature = "gstreamer_output"))]
use tracing::warn;

use crate::task::Cancellation;

/// 显示界面
///
/// `poll_close` 是流式处理每帧唯一的等待点，最多等待 `wait`，
/// 返回 `true` 表示用户关闭了界面。
pub trait Present {
  type Error;
  fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error>;
  fn poll_close(&mut self, wait: Duration) -> Result<bool, Self::Error>;
  /// 阻塞直到界面被关闭或收到取消请求
  fn wait_dismiss(&mut self, cancel: &dyn Cancellation) -> Result<(), Self::Error>;
}

pub mod draw;

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_display;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_display::{GStreamerDisplay, GStreamerDisplayError};

/// 不显示任何内容
#[derive(Debug, Default)]
pub struct Headless;

impl Present for Headless {
  type Error = Infallible;

  fn present(&mut self, _image: &RgbImage) -> Result<(), Self::Error> {
    Ok(())
  }

  fn poll_close(&mut self, _wait: Duration) -> Result<bool, Self::Error> {
    Ok(false)
  }

  fn wait_dismiss(&mut self, _cancel: &dyn Cancellation) -> Result<(), Self::Error> {
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 显示错误: {0}")]
  GStreamerDisplayError(#[from] GStreamerDisplayError),
}

impl From<Infallible> for OutputError {
  fn from(never: Infallible) -> Self {
    match never {}
  }
}

pub enum OutputWrapper {
  Headless(Headless),
  #[cfg(feature = "gstreamer_output")]
  GStreamerDisplay(GStreamerDisplay),
}

impl OutputWrapper {
  /// `enabled` 为真时打开显示窗口，否则不显示
  pub fn with_visualization(enabled: bool) -> Result<Self, OutputError> {
    if !enabled {
      return Ok(OutputWrapper::Headless(Headless));
    }

    #[cfg(feature = "gstreamer_output")]
    {
      Ok(OutputWrapper::GStreamerDisplay(GStreamerDisplay::new()?))
    }
    #[cfg(not(feature = "gstreamer_output"))]
    {
      warn!("未启用 gstreamer_output 特性，不打开显示窗口");
      Ok(OutputWrapper::Headless(Headless))
    }
  }
}

impl Present for OutputWrapper {
  type Error = OutputError;

  fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Headless(output) => output.present(image).map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerDisplay(output) => output.present(image).map_err(OutputError::from),
    }
  }

  fn poll_close(&mut self, wait: Duration) -> Result<bool, Self::Error> {
    match self {
      OutputWrapper::Headless(output) => output.poll_close(wait).map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerDisplay(output) => output.poll_close(wait).map_err(OutputError::from),
    }
  }

  fn wait_dismiss(&mut self, cancel: &dyn Cancellation) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Headless(output) => output.wait_dismiss(cancel).map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerDisplay(output) => {
        output.wait_dismiss(cancel).map_err(OutputError::from)
      }
    }
  }
}
