// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use qingxie::{
  config::{parse_dataset_manifest, parse_network_description, read_vocabulary},
  input::{InputWrapper, SourceKind},
  model::ReplayModelBuilder,
  output::{OutputWrapper, SaveImageFileOutput, draw::Draw},
  task::{CancelToken, ContinuousTask, OneShotTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  info!("{:?}", args);

  let manifest = parse_dataset_manifest(&args.dataset)?;
  info!("数据集类别数: {}", manifest.class_count);
  info!("训练列表: {}", manifest.train_list_path);

  let vocabulary = read_vocabulary(&manifest.names_path)?;
  if vocabulary.len() != manifest.class_count {
    warn!(
      "类别名称数 {} 与数据集类别数 {} 不一致",
      vocabulary.len(),
      manifest.class_count
    );
  }

  let network = parse_network_description(&args.netcfg)?;
  info!("网络深度: {}", network.layer_count());
  let input_size = network.input_size()?;
  info!("网络输入尺寸: {}x{}", input_size.0, input_size.1);

  // 权重由外部推理后端加载
  info!("权重文件: {}", args.weight.display());
  info!("加速推理: {}", args.cuda != 0);

  let model = ReplayModelBuilder::new(input_size)
    .class_thresh(args.thresh)
    .detections(args.detections.as_deref())
    .build()?;

  let cancel = CancelToken::new();
  if let Err(e) = cancel.install_ctrlc() {
    warn!("无法设置 Ctrl-C 处理: {}", e);
  }

  let mut draw = Draw::new(vocabulary);
  if let Some(path) = &args.font {
    match Draw::read_font(path) {
      Ok(font) => draw = draw.with_font(font),
      Err(e) => warn!("无法读取字体 {}，使用内置字体: {}", path.display(), e),
    }
  }

  let output = OutputWrapper::with_visualization(args.vis != 0)?;
  let input = InputWrapper::from_source(&args.img)?;
  info!("输入来源: {}", args.img);

  match input.kind() {
    SourceKind::Image => OneShotTask::new(draw, cancel)
      .with_save(Some(SaveImageFileOutput::new(&args.output)))
      .run_task(input, model, output)?,
    SourceKind::Stream => ContinuousTask::new(draw, cancel)
      .with_frame_number(args.max_frames)
      .run_task(input, model, output)?,
  }

  Ok(())
}
