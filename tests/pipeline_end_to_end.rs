// 该文件是 Streamdet （流检） 项目的一部分。
// tests/pipeline_end_to_end.rs - 流水线端到端测试
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

use std::{cell::RefCell, sync::Arc};

use ndarray::Array2;
use streamdet::{
  config::DetectorConfig,
  frame::RgbFrame,
  labels::ClassNames,
  model::{DetectResult, Detector, ForwardPass, Model, OutputTensor},
  output::{Render, draw::Draw},
  postprocess::{BoxRect, SuppressionMode},
  task::{ContinuousTask, Task},
};

const FRAME_W: u32 = 640;
const FRAME_H: u32 = 480;

/// 像素框 + 类别分数 → 归一化输出行
fn row(bbox: BoxRect, scores: &[f32]) -> Vec<f32> {
  let mut r = vec![
    (bbox.left + bbox.width / 2.0) / FRAME_W as f32,
    (bbox.top + bbox.height / 2.0) / FRAME_H as f32,
    bbox.width / FRAME_W as f32,
    bbox.height / FRAME_H as f32,
    1.0,
  ];
  r.extend_from_slice(scores);
  r
}

fn tensor(rows: Vec<Vec<f32>>) -> OutputTensor {
  let cols = rows[0].len();
  let data: Vec<f32> = rows.into_iter().flatten().collect();
  Array2::from_shape_vec((data.len() / cols, cols), data).unwrap()
}

#[derive(thiserror::Error, Debug)]
#[error("推理引擎故障")]
struct EngineFault;

/// 每帧返回同一组张量，指定帧序号时失败
struct Scripted {
  tensors: Vec<OutputTensor>,
  fail_on: Option<u64>,
}

impl ForwardPass for Scripted {
  type Error = EngineFault;

  fn forward(&mut self, frame: &RgbFrame) -> Result<Vec<OutputTensor>, EngineFault> {
    if self.fail_on == Some(frame.index()) {
      return Err(EngineFault);
    }
    Ok(self.tensors.clone())
  }
}

#[derive(Default)]
struct Recorder {
  results: RefCell<Vec<(u64, DetectResult)>>,
  fail_on: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
#[error("输出端故障")]
struct SinkFault;

impl Render<RgbFrame, DetectResult> for &Recorder {
  type Error = SinkFault;

  fn render_result(&self, frame: &RgbFrame, result: &DetectResult) -> Result<(), SinkFault> {
    if self.fail_on == Some(frame.index()) {
      return Err(SinkFault);
    }
    self
      .results
      .borrow_mut()
      .push((frame.index(), result.clone()));
    Ok(())
  }
}

fn names() -> Arc<ClassNames> {
  Arc::new(["person", "bicycle", "car"].into_iter().collect())
}

fn frames(n: u64) -> impl Iterator<Item = RgbFrame> {
  (0..n).map(|i| RgbFrame::filled(i, FRAME_W, FRAME_H, [0, 0, 0]))
}

// IoU = 8000 / 10000 = 0.8
fn overlapping_pair() -> Vec<OutputTensor> {
  vec![tensor(vec![
    row(BoxRect::new(100.0, 100.0, 100.0, 100.0), &[0.9, 0.0, 0.0]),
    row(BoxRect::new(100.0, 100.0, 100.0, 80.0), &[0.0, 0.7, 0.0]),
  ])]
}

// IoU = 2000 / 18000 ≈ 0.11
fn distant_pair() -> Vec<OutputTensor> {
  vec![tensor(vec![
    row(BoxRect::new(80.0, 0.0, 100.0, 100.0), &[0.0, 0.7, 0.0]),
    row(BoxRect::new(0.0, 0.0, 100.0, 100.0), &[0.9, 0.0, 0.0]),
  ])]
}

#[test]
fn overlapping_pair_keeps_only_strongest() {
  let mut detector = Detector::new(
    Scripted {
      tensors: overlapping_pair(),
      fail_on: None,
    },
    names(),
    DetectorConfig::default(),
  );
  let frame = RgbFrame::filled(0, FRAME_W, FRAME_H, [0, 0, 0]);
  let result = detector.infer(&frame).unwrap();

  assert_eq!(result.len(), 1);
  let item = &result.items[0];
  assert_eq!(item.label, "person");
  assert!((item.score - 0.9).abs() < 1e-6);
  assert!((item.bbox.left - 100.0).abs() < 1e-3);
  assert!((item.bbox.width - 100.0).abs() < 1e-3);
}

#[test]
fn distant_pair_keeps_both_in_confidence_order() {
  let mut detector = Detector::new(
    Scripted {
      tensors: distant_pair(),
      fail_on: None,
    },
    names(),
    DetectorConfig::default(),
  );
  let frame = RgbFrame::filled(0, FRAME_W, FRAME_H, [0, 0, 0]);
  let result = detector.infer(&frame).unwrap();

  let summary: Vec<(&str, usize)> = result
    .iter()
    .map(|item| (item.label.as_str(), item.rank))
    .collect();
  assert_eq!(summary, vec![("person", 0), ("bicycle", 1)]);
  assert!(result.items[0].score > result.items[1].score);
}

#[test]
fn per_class_mode_keeps_overlapping_different_classes() {
  let config = DetectorConfig::default().with_suppression(SuppressionMode::PerClass);
  let mut detector = Detector::new(
    Scripted {
      tensors: overlapping_pair(),
      fail_on: None,
    },
    names(),
    config,
  );
  let frame = RgbFrame::filled(0, FRAME_W, FRAME_H, [0, 0, 0]);
  let result = detector.infer(&frame).unwrap();
  assert_eq!(result.len(), 2);
}

#[test]
fn continuous_task_stops_at_end_of_stream() {
  let recorder = Recorder::default();
  let detector = Detector::new(
    Scripted {
      tensors: distant_pair(),
      fail_on: None,
    },
    names(),
    DetectorConfig::default(),
  );
  ContinuousTask::default()
    .with_draw(Draw::with_font(None))
    .run_task(frames(3), detector, &recorder)
    .unwrap();

  let results = recorder.results.borrow();
  let indices: Vec<u64> = results.iter().map(|(i, _)| *i).collect();
  assert_eq!(indices, vec![0, 1, 2]);
  assert!(results.iter().all(|(_, r)| r.len() == 2));
}

#[test]
fn continuous_task_halts_on_forward_error() {
  let recorder = Recorder::default();
  let detector = Detector::new(
    Scripted {
      tensors: distant_pair(),
      fail_on: Some(1),
    },
    names(),
    DetectorConfig::default(),
  );
  let outcome = ContinuousTask::default().run_task(frames(4), detector, &recorder);

  assert!(outcome.is_err());
  assert_eq!(recorder.results.borrow().len(), 1);
}

#[test]
fn continuous_task_halts_on_output_error() {
  let recorder = Recorder {
    fail_on: Some(0),
    ..Default::default()
  };
  let detector = Detector::new(
    Scripted {
      tensors: distant_pair(),
      fail_on: None,
    },
    names(),
    DetectorConfig::default(),
  );
  assert!(
    ContinuousTask::default()
      .run_task(frames(2), detector, &recorder)
      .is_err()
  );
  assert!(recorder.results.borrow().is_empty());
}

#[test]
fn continuous_task_skips_failed_frames_when_asked() {
  let recorder = Recorder::default();
  let detector = Detector::new(
    Scripted {
      tensors: distant_pair(),
      fail_on: Some(1),
    },
    names(),
    DetectorConfig::default(),
  );
  ContinuousTask::default()
    .with_skip_failed_frames(true)
    .run_task(frames(4), detector, &recorder)
    .unwrap();

  let indices: Vec<u64> = recorder.results.borrow().iter().map(|(i, _)| *i).collect();
  assert_eq!(indices, vec![0, 2, 3]);
}

#[test]
fn malformed_tensor_is_fatal() {
  let recorder = Recorder::default();
  let detector = Detector::new(
    Scripted {
      tensors: vec![Array2::zeros((2, 4))],
      fail_on: None,
    },
    names(),
    DetectorConfig::default(),
  );
  assert!(
    ContinuousTask::default()
      .run_task(frames(2), detector, &recorder)
      .is_err()
  );
}
