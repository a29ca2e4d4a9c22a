// 该文件是 Qingxie （倾斜框） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;

/// Qingxie 旋转框检测推理参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据集描述文件
  #[arg(long, default_value = "dataset/kitti.data", value_name = "FILE")]
  pub dataset: PathBuf,

  /// 网络结构描述文件
  #[arg(long, default_value = "cfg/complex-yolo.cfg", value_name = "FILE")]
  pub netcfg: PathBuf,

  /// 网络权重文件
  #[arg(long, default_value = "backup/complex-yolo.backup", value_name = "FILE")]
  pub weight: PathBuf,

  /// 非零时打开显示窗口
  #[arg(long, default_value_t = 1, value_name = "FLAG")]
  pub vis: u32,

  /// 输入来源
  /// 支持格式:
  /// - 图片: *.jpg, *.jpeg, *.png, *.bmp
  /// - 视频: *.mp4, *.mkv, *.avi
  /// - 摄像头编号: 0, 1, ...
  /// - URL: image:///path.png, gst://file/path.mp4, gst://camera/dev/video0
  #[arg(long, default_value = "007000.png", value_name = "SOURCE")]
  pub img: String,

  /// 类别置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.3, value_name = "THRESHOLD")]
  pub thresh: f32,

  /// 非零时请求加速推理
  #[arg(long, default_value_t = 1, value_name = "FLAG")]
  pub cuda: u32,

  /// 离线检测结果文件 (JSON)
  #[arg(long, value_name = "FILE")]
  pub detections: Option<PathBuf>,

  /// 替换内置标签字体 (TrueType)
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 最大处理帧数（仅对视频/摄像头有效）
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<usize>,

  /// 单张图片模式的输出文件
  #[arg(long, default_value = "prediction.png", value_name = "OUTPUT")]
  pub output: PathBuf,
}
