// 该文件是 Streamdet （流检） 项目的一部分。
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use streamdet::{
  FromUrl,
  input::InputWrapper,
  labels::ClassNames,
  model::{Detector, OnnxForwardPassBuilder},
  output::{OutputWrapper, draw::Draw},
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  // 所有启动阶段的错误都在处理第一帧之前返回
  let config = args.detector_config();
  info!("检测配置: {:?}", config);
  let names = Arc::new(ClassNames::load(&args.names)?);
  let forward = OnnxForwardPassBuilder::from_url(&args.model)?.build()?;
  let model = Detector::new(forward, names, config);

  let draw = match &args.font {
    Some(path) => Draw::from_font_file(path)?,
    None => Draw::default(),
  };

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_skip_failed_frames(args.skip_failed_frames)
    .with_draw(draw)
    .run_task(input, model, output)?;

  Ok(())
}
