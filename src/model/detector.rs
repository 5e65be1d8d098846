// 该文件是 Streamdet （流检） 项目的一部分。
// src/model/detector.rs - 检测器：前向推理 + 解码 + NMS + 类别名称
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  config::DetectorConfig,
  frame::RgbFrame,
  labels::ClassNames,
  model::{DetectItem, DetectResult, ForwardPass, Model},
  postprocess::{DecodeError, decode, suppress_with},
};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("前向推理失败: {0}")]
  Forward(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("输出解码失败: {0}")]
  Decode(#[from] DecodeError),
}

/// 单帧检测流水线
pub struct Detector<P> {
  forward: P,
  names: Arc<ClassNames>,
  config: DetectorConfig,
}

impl<P: ForwardPass> Detector<P> {
  pub fn new(forward: P, names: Arc<ClassNames>, config: DetectorConfig) -> Self {
    Self {
      forward,
      names,
      config,
    }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn names(&self) -> &ClassNames {
    &self.names
  }
}

impl<P: ForwardPass> Model for Detector<P> {
  type Input = RgbFrame;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&mut self, frame: &RgbFrame) -> Result<DetectResult, DetectorError> {
    let tensors = self
      .forward
      .forward(frame)
      .map_err(|e| DetectorError::Forward(Box::new(e)))?;

    let candidates = decode(
      &tensors,
      frame.width(),
      frame.height(),
      self.config.confidence_threshold,
    )?;
    debug!("第 {} 帧: {} 个候选", frame.index(), candidates.len());

    let kept = suppress_with(&candidates, &self.config.nms_params());

    // 类别与置信度都按保留下标从同一候选取出
    let items = kept
      .iter()
      .enumerate()
      .map(|(rank, &idx)| {
        let candidate = &candidates[idx];
        if candidate.class_id >= self.names.len() {
          warn!(
            "类别编号 {} 超出类别表范围 ({})",
            candidate.class_id,
            self.names.len()
          );
        }
        DetectItem {
          rank,
          class_id: candidate.class_id,
          label: self.names.name_or_unknown(candidate.class_id).to_string(),
          score: candidate.confidence,
          bbox: candidate.bbox,
        }
      })
      .collect::<Vec<_>>();

    debug!("检测结果: {:?}", items);

    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use ndarray::Array2;

  use super::*;
  use crate::model::OutputTensor;

  struct Fixed(Vec<OutputTensor>);

  #[derive(Debug, Error)]
  #[error("boom")]
  struct Boom;

  impl ForwardPass for Fixed {
    type Error = Boom;

    fn forward(&mut self, _frame: &RgbFrame) -> Result<Vec<OutputTensor>, Boom> {
      Ok(self.0.clone())
    }
  }

  struct Failing;

  impl ForwardPass for Failing {
    type Error = Boom;

    fn forward(&mut self, _frame: &RgbFrame) -> Result<Vec<OutputTensor>, Boom> {
      Err(Boom)
    }
  }

  fn names() -> Arc<ClassNames> {
    Arc::new(ClassNames::parse("person\nbicycle\ncar"))
  }

  #[test]
  fn labels_follow_kept_candidate_not_position() {
    // 第 0 行: car 0.7（左侧）；第 1 行: person 0.9（右侧），两者不重叠
    let rows = vec![
      0.1, 0.5, 0.1, 0.1, 0.0, 0.0, 0.0, 0.7, //
      0.8, 0.5, 0.1, 0.1, 0.0, 0.9, 0.0, 0.0,
    ];
    let tensor = Array2::from_shape_vec((2, 8), rows).unwrap();
    let mut detector = Detector::new(Fixed(vec![tensor]), names(), DetectorConfig::default());

    let frame = RgbFrame::filled(0, 100, 100, [0, 0, 0]);
    let result = detector.infer(&frame).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.items[0].label, "person");
    assert!((result.items[0].score - 0.9).abs() < 1e-6);
    assert_eq!(result.items[0].rank, 0);
    assert_eq!(result.items[1].label, "car");
    assert!((result.items[1].score - 0.7).abs() < 1e-6);
    assert_eq!(result.items[1].rank, 1);
  }

  #[test]
  fn out_of_range_class_is_unknown() {
    let rows = vec![0.5, 0.5, 0.1, 0.1, 0.0, 0.0, 0.0, 0.0, 0.95];
    let tensor = Array2::from_shape_vec((1, 9), rows).unwrap();
    let mut detector = Detector::new(Fixed(vec![tensor]), names(), DetectorConfig::default());
    let result = detector.infer(&RgbFrame::filled(0, 10, 10, [0; 3])).unwrap();
    assert_eq!(result.items[0].class_id, 3);
    assert_eq!(result.items[0].label, "unknown");
  }

  #[test]
  fn forward_failure_is_reported() {
    let mut detector = Detector::new(Failing, names(), DetectorConfig::default());
    let err = detector.infer(&RgbFrame::filled(0, 10, 10, [0; 3])).unwrap_err();
    assert!(matches!(err, DetectorError::Forward(_)));
  }

  #[test]
  fn malformed_tensor_is_fatal() {
    let tensor = Array2::<f32>::zeros((2, 3));
    let mut detector = Detector::new(Fixed(vec![tensor]), names(), DetectorConfig::default());
    let err = detector.infer(&RgbFrame::filled(0, 10, 10, [0; 3])).unwrap_err();
    assert!(matches!(err, DetectorError::Decode(DecodeError::TooFewColumns { .. })));
  }
}
