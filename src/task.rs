// 该文件是 Streamdet （流检） 项目的一部分。
// src/task.rs - 流水线驱动
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

use std::{sync::mpsc, thread, time::Duration, time::Instant};
use tracing::{error, info, warn};

use crate::{
  frame::RgbFrame,
  model::{DetectResult, Model},
  output::{Render, draw::Draw},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 处理一帧：推理、标注、输出，返回检测数量
fn process_frame<M, O>(
  draw: Option<&Draw>,
  model: &mut M,
  output: &O,
  mut frame: RgbFrame,
) -> anyhow::Result<usize>
where
  M: Model<Input = RgbFrame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<RgbFrame, DetectResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  let now = Instant::now();
  let result = model.infer(&frame)?;
  let elapsed_infer = now.elapsed();

  if let Some(draw) = draw
    && output.wants_annotation()
  {
    draw.annotate(&mut frame, &result);
  }
  output.render_result(&frame, &result)?;
  let elapsed_render = now.elapsed();

  info!(
    "第 {} 帧: {} 个目标，推理 {:.2?} / 总计 {:.2?}",
    frame.index(),
    result.len(),
    elapsed_infer,
    elapsed_render
  );
  Ok(result.len())
}

#[derive(Default)]
pub struct OneShotTask {
  draw: Option<Draw>,
}

impl OneShotTask {
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = Some(draw);
    self
  }
}

impl<I, M, O> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = RgbFrame>,
  M: Model<Input = RgbFrame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<RgbFrame, DetectResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功 ({}x{})，开始推理...", frame.width(), frame.height());
    process_frame(self.draw.as_ref(), &mut model, &output, frame)?;
    info!("任务完成");
    Ok(())
  }
}

#[derive(Default)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  skip_failed_frames: bool,
  draw: Option<Draw>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 单帧失败时记录错误并继续处理下一帧，而不是终止任务
  pub fn with_skip_failed_frames(mut self, skip: bool) -> Self {
    self.skip_failed_frames = skip;
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = Some(draw);
    self
  }
}

fn install_interrupt_handler() -> Option<mpsc::Receiver<()>> {
  let (tx, rx) = mpsc::channel();
  let installed = ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  });
  match installed {
    Ok(()) => Some(rx),
    Err(e) => {
      warn!("无法设置 Ctrl-C 处理函数: {}", e);
      None
    }
  }
}

impl<I, M, O> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = RgbFrame>,
  M: Model<Input = RgbFrame, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<RgbFrame, DetectResult>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let interrupt = install_interrupt_handler();

    let mut processed = 0usize;
    let mut failed = 0usize;
    let mut detections = 0usize;
    let started = Instant::now();
    for frame in input {
      processed += 1;
      let index = frame.index();
      match process_frame(self.draw.as_ref(), &mut model, &output, frame) {
        Ok(count) => detections += count,
        Err(e) if self.skip_failed_frames => {
          failed += 1;
          error!("第 {} 帧处理失败，跳过: {:#}", index, e);
        }
        Err(e) => return Err(e.context(format!("第 {} 帧处理失败", index))),
      }

      if self.frame_number.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成: {} 帧 (失败 {})，共 {} 个目标，耗时 {:.2?}",
      processed,
      failed,
      detections,
      started.elapsed()
    );
    Ok(())
  }
}
