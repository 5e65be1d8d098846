// 该文件是 Streamdet （流检） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像推理
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use url::Url;

use streamdet::{
  FromUrl,
  config::DetectorConfig,
  input::ImageFileInput,
  labels::ClassNames,
  model::{Detector, OnnxForwardPassBuilder},
  output::{SaveImageFileOutput, draw::Draw},
  task::{OneShotTask, Task},
};
use tracing::info;

/// 对单张图像做一次检测并保存标注结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 onnx:///models/yolo.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///data/bus.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出图像，例如 image:///tmp/bus.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别名称文件
  #[arg(long, value_name = "FILE")]
  pub names: PathBuf,
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let names = Arc::new(ClassNames::load(&args.names)?);
  let forward = OnnxForwardPassBuilder::from_url(&args.model)?.build()?;
  let model = Detector::new(forward, names, DetectorConfig::default());
  let input = ImageFileInput::from_url(&args.input)?;
  let output = SaveImageFileOutput::from_url(&args.output)?;
  let draw = match &args.font {
    Some(path) => Draw::from_font_file(path)?,
    None => Draw::default(),
  };

  OneShotTask::default()
    .with_draw(draw)
    .run_task(input, model, output)?;

  Ok(())
}
