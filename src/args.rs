// 该文件是 Streamdet （流检） 项目的一部分。
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
use url::Url;

use streamdet::{
  config::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_SCORE_THRESHOLD, DetectorConfig,
  },
  postprocess::SuppressionMode,
};

/// Streamdet 流检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 onnx:///models/yolo.onnx?size=288
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///a.png 或 gst://camera/dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 gst://display、image:///out.png、folder:///records
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub names: PathBuf,
  /// 标注使用的 TrueType 字体，缺省时查找系统字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 解码置信度阈值
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS 分数阈值
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub score_threshold: f32,
  /// NMS IoU 阈值
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou_threshold: f32,
  /// 按类别分别做 NMS（默认所有类别一起）
  #[arg(long)]
  pub per_class_nms: bool,
  /// 每帧最多保留的检测数量
  #[arg(long, value_name = "K")]
  pub top_k: Option<usize>,

  /// 处理的最大帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 单帧失败时跳过而不是退出
  #[arg(long)]
  pub skip_failed_frames: bool,
}

impl Args {
  pub fn detector_config(&self) -> DetectorConfig {
    let suppression = if self.per_class_nms {
      SuppressionMode::PerClass
    } else {
      SuppressionMode::Pooled
    };
    DetectorConfig::default()
      .with_confidence_threshold(self.confidence)
      .with_score_threshold(self.score_threshold)
      .with_iou_threshold(self.iou_threshold)
      .with_suppression(suppression)
      .with_top_k(self.top_k)
  }
}
