// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/output/gstreamer_display.rs - GStreamer 显示窗口
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

//! # GStreamer 显示窗口
//!
//! 通过 `appsrc ! videoconvert ! autovideosink` 把绘制好的帧显示出来。
//! 帧以 RGBA 推送，避免 RGB 行对齐带来的步长问题。
//! 窗口被关闭时视频接收端会在总线上报告错误，`poll_close` 据此返回 `true`。

use std::time::Duration;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::{DynamicImage, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{output::Present, task::Cancellation};

const DISPLAY_PIPELINE: &str = concat!(
  "appsrc name=src is-live=true do-timestamp=true format=time ! ",
  "videoconvert ! autovideosink sync=false"
);
const DISMISS_POLL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum GStreamerDisplayError {
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("无法获取 appsrc 元素")]
  AppSrcNotFound,
  #[error("无法转换元素为 appsrc")]
  AppSrcConversionFailed,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub struct GStreamerDisplay {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  dimensions: Option<(u32, u32)>,
  closed: bool,
}

impl GStreamerDisplay {
  pub fn new() -> Result<Self, GStreamerDisplayError> {
    gst::init()?;

    info!("创建显示管道: {}", DISPLAY_PIPELINE);
    let pipeline = gst::parse::launch(DISPLAY_PIPELINE)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerDisplayError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayError::AppSrcConversionFailed)?;

    Ok(GStreamerDisplay {
      pipeline,
      appsrc,
      dimensions: None,
      closed: false,
    })
  }

  // 帧尺寸第一次出现或变化时重新设置 caps
  fn ensure_caps(&mut self, width: u32, height: u32) -> Result<(), GStreamerDisplayError> {
    if self.dimensions == Some((width, height)) {
      return Ok(());
    }

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGBA")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(0, 1))
      .build();
    self.appsrc.set_caps(Some(&caps));

    if self.dimensions.is_none() {
      self.pipeline.set_state(gst::State::Playing)?;
      info!("显示窗口已打开: {}x{}", width, height);
    } else {
      debug!("显示尺寸变为: {}x{}", width, height);
    }
    self.dimensions = Some((width, height));
    Ok(())
  }

  fn push_frame(&self, data: Vec<u8>) -> Result<(), GStreamerDisplayError> {
    let buffer = gst::Buffer::from_mut_slice(data);
    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| GStreamerDisplayError::PipelineError(format!("无法推送缓冲区: {:?}", e)))?;
    Ok(())
  }
}

impl Present for GStreamerDisplay {
  type Error = GStreamerDisplayError;

  fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    if self.closed {
      return Ok(());
    }
    let (width, height) = image.dimensions();
    self.ensure_caps(width, height)?;

    let rgba = DynamicImage::ImageRgb8(image.clone()).into_rgba8();
    self.push_frame(rgba.into_raw())
  }

  fn poll_close(&mut self, wait: Duration) -> Result<bool, Self::Error> {
    if self.closed {
      return Ok(true);
    }
    let Some(bus) = self.pipeline.bus() else {
      std::thread::sleep(wait);
      return Ok(false);
    };

    let timeout = gst::ClockTime::from_mseconds(wait.as_millis() as u64);
    let Some(message) =
      bus.timed_pop_filtered(timeout, &[gst::MessageType::Eos, gst::MessageType::Error])
    else {
      return Ok(false);
    };

    match message.view() {
      gst::MessageView::Error(err) => {
        debug!("显示管道报告错误: {}", err.error());
      }
      _ => debug!("显示管道结束"),
    }
    info!("显示窗口已关闭");
    self.closed = true;
    Ok(true)
  }

  fn wait_dismiss(&mut self, cancel: &dyn Cancellation) -> Result<(), Self::Error> {
    if self.dimensions.is_none() {
      return Ok(());
    }
    info!("等待关闭显示窗口");
    while !cancel.is_cancelled() {
      if self.poll_close(DISMISS_POLL)? {
        break;
      }
    }
    Ok(())
  }
}

impl Drop for GStreamerDisplay {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止显示管道: {}", e);
    }
    info!("显示窗口已释放");
  }
}
