// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/task.rs - 单张图片与视频流任务
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  frame::RgbNchwFrame,
  model::{DetectResult, Model},
  output::{Present, SaveImageFileOutput, draw::Draw},
};

/// 每帧等待关闭事件的时长
pub const POLL_WAIT: Duration = Duration::from_millis(30);

/// 协作式取消判断，每帧检查一次
pub trait Cancellation {
  fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> Cancellation for F {
  fn is_cancelled(&self) -> bool {
    self()
  }
}

/// 共享的取消标志
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 收到 Ctrl-C 时取消
  pub fn install_ctrlc(&self) -> Result<(), ctrlc::Error> {
    let token = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      token.cancel();
    })
  }
}

impl Cancellation for CancelToken {
  fn is_cancelled(&self) -> bool {
    CancelToken::is_cancelled(self)
  }
}

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

// 预处理、推理与整理检测结果
fn detect<M: Model>(model: &M, image: &RgbImage) -> Result<Option<DetectResult>, M::Error> {
  let (width, height) = model.input_size();
  let frame = RgbNchwFrame::from_rgb_image(image, width, height);
  let output = model.infer(&frame)?;
  model.evaluate(output, image.width(), image.height())
}

/// 单张图片：推理、绘制、保存、显示并等待关闭
pub struct OneShotTask {
  draw: Draw,
  save: Option<SaveImageFileOutput>,
  cancel: CancelToken,
}

impl OneShotTask {
  pub fn new(draw: Draw, cancel: CancelToken) -> Self {
    OneShotTask {
      draw,
      save: None,
      cancel,
    }
  }

  pub fn with_save(mut self, save: Option<SaveImageFileOutput>) -> Self {
    self.save = save;
    self
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  PE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Error = ME>,
  O: Present<Error = PE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, mut output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");

    let now = Instant::now();
    let result = detect(&model, &image)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    match result {
      Some(result) => {
        debug!("检测结果: {:?}", result.rows());
        let drawn = self.draw.draw_detections_mut(&mut image, &result, None);
        info!("绘制 {} 个检测框", drawn);
      }
      None => info!("没有检测结果"),
    }

    if let Some(save) = &self.save {
      save.save(&image)?;
    }

    output.present(&image)?;
    output.wait_dismiss(&self.cancel)?;

    info!("任务完成，退出");
    Ok(())
  }
}

/// 视频流：逐帧推理并显示，直到流结束、窗口关闭或收到取消
pub struct ContinuousTask {
  draw: Draw,
  cancel: CancelToken,
  frame_number: Option<usize>,
  poll_wait: Duration,
}

impl ContinuousTask {
  pub fn new(draw: Draw, cancel: CancelToken) -> Self {
    ContinuousTask {
      draw,
      cancel,
      frame_number: None,
      poll_wait: POLL_WAIT,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
    self.poll_wait = poll_wait;
    self
  }

  fn frame_limit_reached(&self, frame_index: usize) -> bool {
    self.frame_number.is_some_and(|n| frame_index >= n)
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  PE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model<Error = ME>,
  O: Present<Error = PE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, mut output: O) -> Result<(), Self::Error> {
    info!("开始任务...");

    let mut input = input;
    let mut frame_index = 0;
    loop {
      // 取帧之前先检查，已取消时不再读取新帧
      if self.cancel.is_cancelled() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      let Some(mut image) = input.next() else {
        break;
      };
      frame_index += 1;
      debug!("处理第 {} 帧图像", frame_index);

      let now = Instant::now();
      let result = detect(&model, &image);
      let fps = 1.0 / now.elapsed().as_secs_f32().max(f32::EPSILON);

      let presented = match result {
        Ok(result) => {
          if let Some(result) = result {
            self.draw.draw_detections_mut(&mut image, &result, Some(fps));
          }
          info!("fps: {:.6}", fps);
          output.present(&image)?;
          true
        }
        Err(e) => {
          warn!("第 {} 帧推理失败，跳过: {}", frame_index, e);
          false
        }
      };

      if self.frame_limit_reached(frame_index) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if presented && output.poll_close(self.poll_wait)? {
        info!("显示窗口已关闭，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧，退出", frame_index);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::{
    cell::Cell,
    collections::VecDeque,
    convert::Infallible,
    sync::Mutex,
  };

  use image::Rgb;
  use thiserror::Error;

  use super::*;
  use crate::{config::Vocabulary, input::ImageFileInput};

  const BACKGROUND: Rgb<u8> = Rgb([7, 7, 7]);

  #[derive(Error, Debug)]
  #[error("推理失败")]
  struct StubError;

  struct StubModel {
    result: Option<DetectResult>,
    fail_on: Option<usize>,
    calls: Cell<usize>,
  }

  impl StubModel {
    fn new(result: Option<DetectResult>) -> Self {
      StubModel {
        result,
        fail_on: None,
        calls: Cell::new(0),
      }
    }
  }

  impl Model for StubModel {
    type Output = usize;
    type Error = StubError;

    fn input_size(&self) -> (u32, u32) {
      (32, 32)
    }

    fn infer(&self, input: &RgbNchwFrame) -> Result<Self::Output, Self::Error> {
      assert_eq!(input.shape(), [1, 3, 32, 32]);
      let call = self.calls.get() + 1;
      self.calls.set(call);
      if self.fail_on == Some(call) {
        return Err(StubError);
      }
      Ok(call)
    }

    fn evaluate(
      &self,
      _output: Self::Output,
      _source_width: u32,
      _source_height: u32,
    ) -> Result<Option<DetectResult>, Self::Error> {
      Ok(self.result.clone())
    }
  }

  struct SyntheticSource {
    frames: VecDeque<RgbImage>,
    released: Arc<AtomicBool>,
  }

  impl SyntheticSource {
    fn new(count: usize) -> (Self, Arc<AtomicBool>) {
      let released = Arc::new(AtomicBool::new(false));
      let frames = (0..count)
        .map(|_| RgbImage::from_pixel(64, 48, BACKGROUND))
        .collect();
      (
        SyntheticSource {
          frames,
          released: released.clone(),
        },
        released,
      )
    }
  }

  impl Iterator for SyntheticSource {
    type Item = RgbImage;

    fn next(&mut self) -> Option<Self::Item> {
      self.frames.pop_front()
    }
  }

  impl Drop for SyntheticSource {
    fn drop(&mut self) {
      self.released.store(true, Ordering::SeqCst);
    }
  }

  #[derive(Clone, Default)]
  struct RecordingPresenter {
    frames: Arc<Mutex<Vec<RgbImage>>>,
    cancel: CancelToken,
    cancel_after: Option<usize>,
    dismissed: Arc<AtomicBool>,
  }

  impl RecordingPresenter {
    fn presented(&self) -> Vec<RgbImage> {
      self.frames.lock().unwrap().clone()
    }
  }

  impl Present for RecordingPresenter {
    type Error = Infallible;

    fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
      let mut frames = self.frames.lock().unwrap();
      frames.push(image.clone());
      if self.cancel_after == Some(frames.len()) {
        self.cancel.cancel();
      }
      Ok(())
    }

    fn poll_close(&mut self, _wait: Duration) -> Result<bool, Self::Error> {
      Ok(false)
    }

    fn wait_dismiss(&mut self, _cancel: &dyn Cancellation) -> Result<(), Self::Error> {
      self.dismissed.store(true, Ordering::SeqCst);
      Ok(())
    }
  }

  fn vocabulary() -> Vocabulary {
    ["Car", "Van", "Truck", "Pedestrian"].into_iter().collect()
  }

  fn one_car() -> DetectResult {
    DetectResult::from_rows(vec![vec![0.0, 0.5, 0.5, 0.3, 0.2, 0.0, 1.0, 0.0, 0.9]])
  }

  fn continuous(cancel: &CancelToken) -> ContinuousTask {
    ContinuousTask::new(Draw::new(vocabulary()), cancel.clone()).with_poll_wait(Duration::ZERO)
  }

  #[test]
  fn cancellation_on_second_frame_stops_the_stream() {
    let cancel = CancelToken::new();
    let (source, released) = SyntheticSource::new(3);
    let presenter = RecordingPresenter {
      cancel: cancel.clone(),
      cancel_after: Some(2),
      ..Default::default()
    };

    continuous(&cancel)
      .run_task(source, StubModel::new(Some(one_car())), presenter.clone())
      .unwrap();

    assert_eq!(presenter.presented().len(), 2);
    assert!(released.load(Ordering::SeqCst));
    assert!(cancel.is_cancelled());
  }

  #[test]
  fn cancelled_before_start_reads_no_frames() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let (source, released) = SyntheticSource::new(3);
    let presenter = RecordingPresenter::default();

    continuous(&cancel)
      .run_task(source, StubModel::new(Some(one_car())), presenter.clone())
      .unwrap();

    assert!(presenter.presented().is_empty());
    assert!(released.load(Ordering::SeqCst));
  }

  #[test]
  fn stream_runs_until_the_source_ends() {
    let cancel = CancelToken::new();
    let (source, released) = SyntheticSource::new(3);
    let presenter = RecordingPresenter::default();

    continuous(&cancel)
      .run_task(source, StubModel::new(Some(one_car())), presenter.clone())
      .unwrap();

    let frames = presenter.presented();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|frame| frame.pixels().any(|p| *p != BACKGROUND)));
    assert!(released.load(Ordering::SeqCst));
  }

  #[test]
  fn failed_frames_are_skipped() {
    let cancel = CancelToken::new();
    let (source, released) = SyntheticSource::new(3);
    let presenter = RecordingPresenter::default();
    let model = StubModel {
      fail_on: Some(2),
      ..StubModel::new(Some(one_car()))
    };

    continuous(&cancel)
      .run_task(source, model, presenter.clone())
      .unwrap();

    assert_eq!(presenter.presented().len(), 2);
    assert!(released.load(Ordering::SeqCst));
  }

  #[test]
  fn frames_without_result_are_shown_raw() {
    let cancel = CancelToken::new();
    let (source, _) = SyntheticSource::new(2);
    let presenter = RecordingPresenter::default();

    continuous(&cancel)
      .run_task(source, StubModel::new(None), presenter.clone())
      .unwrap();

    let frames = presenter.presented();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|frame| frame.pixels().all(|p| *p == BACKGROUND)));
  }

  #[test]
  fn frame_limit_stops_the_stream() {
    let cancel = CancelToken::new();
    let (source, released) = SyntheticSource::new(3);
    let presenter = RecordingPresenter::default();

    continuous(&cancel)
      .with_frame_number(Some(1))
      .run_task(source, StubModel::new(Some(one_car())), presenter.clone())
      .unwrap();

    assert_eq!(presenter.presented().len(), 1);
    assert!(released.load(Ordering::SeqCst));
  }

  #[test]
  fn one_shot_saves_presents_and_waits() {
    let path = std::env::temp_dir().join(format!("qingxie-oneshot-{}.png", std::process::id()));
    let input = ImageFileInput::from_image(RgbImage::from_pixel(100, 100, BACKGROUND));
    let presenter = RecordingPresenter::default();

    OneShotTask::new(Draw::new(vocabulary()), CancelToken::new())
      .with_save(Some(SaveImageFileOutput::new(&path)))
      .run_task(input, StubModel::new(Some(one_car())), presenter.clone())
      .unwrap();

    let frames = presenter.presented();
    assert_eq!(frames.len(), 1);
    assert!(presenter.dismissed.load(Ordering::SeqCst));

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved, frames[0]);
    assert!(saved.pixels().any(|p| *p == Rgb([255, 0, 255])));
    std::fs::remove_file(&path).unwrap();
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let (source, _) = SyntheticSource::new(0);
    let result = OneShotTask::new(Draw::new(vocabulary()), CancelToken::new()).run_task(
      source,
      StubModel::new(None),
      RecordingPresenter::default(),
    );

    assert!(result.is_err());
  }

  #[test]
  fn cancel_token_is_shared_between_clones() {
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!Cancellation::is_cancelled(&clone));

    token.cancel();
    assert!(Cancellation::is_cancelled(&clone));

    let predicate = || true;
    assert!(predicate.is_cancelled());
  }
}
