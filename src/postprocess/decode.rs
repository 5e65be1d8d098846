// 该文件是 Streamdet （流检） 项目的一部分。
// src/postprocess/decode.rs - 输出张量解码
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

use ndarray::{ArrayView1, Axis};
use thiserror::Error;
use tracing::{debug, error};

use crate::{
  model::OutputTensor,
  postprocess::{BoxRect, Candidate},
};

/// 每行开头的非类别列数：cx, cy, w, h, objectness
pub const BOX_COLUMNS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("输出张量 {tensor} 列数不足: 至少需要 {BOX_COLUMNS} 列, 实际 {cols} 列")]
  TooFewColumns { tensor: usize, cols: usize },
  #[error("输出张量 {tensor} 没有类别分数列")]
  NoClassScores { tensor: usize },
}

/// 将一个或多个输出张量解码为像素坐标下的候选框
///
/// 每一行取类别分数列（第 5 列起）的最大值作为置信度，其列偏移作为类别；
/// 置信度严格大于 `confidence_threshold` 的行才会输出。
/// 输出顺序为张量顺序再行顺序。任何张量结构不合法时整体失败，不输出部分结果。
pub fn decode(
  tensors: &[OutputTensor],
  frame_width: u32,
  frame_height: u32,
  confidence_threshold: f32,
) -> Result<Vec<Candidate>, DecodeError> {
  for (tensor_idx, tensor) in tensors.iter().enumerate() {
    let cols = tensor.ncols();
    if cols < BOX_COLUMNS {
      error!("输出张量 {} 列数不足: {}", tensor_idx, cols);
      return Err(DecodeError::TooFewColumns {
        tensor: tensor_idx,
        cols,
      });
    }
    if cols == BOX_COLUMNS {
      error!("输出张量 {} 没有类别分数列", tensor_idx);
      return Err(DecodeError::NoClassScores { tensor: tensor_idx });
    }
  }

  let frame_w = frame_width as f32;
  let frame_h = frame_height as f32;
  let mut candidates = Vec::new();

  for (tensor_idx, tensor) in tensors.iter().enumerate() {
    let before = candidates.len();
    for row in tensor.axis_iter(Axis(0)) {
      let Some((class_id, confidence)) = best_class(row) else {
        continue;
      };

      if confidence <= confidence_threshold || confidence.is_nan() {
        continue;
      }

      let bbox = BoxRect::from_center(
        row[0] * frame_w,
        row[1] * frame_h,
        row[2] * frame_w,
        row[3] * frame_h,
      );

      candidates.push(Candidate {
        class_id,
        confidence,
        bbox,
      });
    }
    debug!(
      "输出张量 {}: {} 行, 候选 {} 个",
      tensor_idx,
      tensor.nrows(),
      candidates.len() - before
    );
  }

  Ok(candidates)
}

// 只在类别分数上做 argmax，相同最大值取最小下标
fn best_class(row: ArrayView1<f32>) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (offset, &score) in row.iter().skip(BOX_COLUMNS).enumerate() {
    match best {
      Some((_, max)) if score > max => best = Some((offset, score)),
      None if !score.is_nan() => best = Some((offset, score)),
      _ => {}
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use ndarray::{Array2, array};

  use super::*;

  fn row(cx: f32, cy: f32, w: f32, h: f32, scores: &[f32]) -> Vec<f32> {
    let mut r = vec![cx, cy, w, h, 0.0];
    r.extend_from_slice(scores);
    r
  }

  fn tensor(rows: &[Vec<f32>]) -> OutputTensor {
    let cols = rows[0].len();
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), cols), flat).unwrap()
  }

  #[test]
  fn denormalizes_box_into_pixel_space() {
    let t = tensor(&[row(0.5, 0.25, 0.2, 0.1, &[0.1, 0.9, 0.3])]);
    let out = decode(&[t], 640, 480, 0.6).unwrap();
    assert_eq!(out.len(), 1);
    let c = out[0];
    assert_eq!(c.class_id, 1);
    assert!((c.confidence - 0.9).abs() < 1e-6);
    assert!((c.bbox.left - (0.5 * 640.0 - (0.2 * 640.0) / 2.0)).abs() < 1e-3);
    assert!((c.bbox.top - (0.25 * 480.0 - (0.1 * 480.0) / 2.0)).abs() < 1e-3);
    assert!((c.bbox.width - 0.2 * 640.0).abs() < 1e-3);
    assert!((c.bbox.height - 0.1 * 480.0).abs() < 1e-3);
  }

  #[test]
  fn threshold_is_strict() {
    let at = tensor(&[row(0.5, 0.5, 0.1, 0.1, &[0.6])]);
    assert!(decode(&[at], 100, 100, 0.6).unwrap().is_empty());

    let above = tensor(&[row(0.5, 0.5, 0.1, 0.1, &[0.6 + f32::EPSILON * 4.0])]);
    assert_eq!(decode(&[above], 100, 100, 0.6).unwrap().len(), 1);
  }

  #[test]
  fn argmax_ignores_objectness_and_box_columns() {
    // objectness 与坐标列都比类别分数大，但不能参与 argmax
    let t = array![[0.9, 0.9, 0.9, 0.9, 0.99, 0.7, 0.8]];
    let out = decode(&[t], 10, 10, 0.5).unwrap();
    assert_eq!(out[0].class_id, 1);
    assert!((out[0].confidence - 0.8).abs() < 1e-6);
  }

  #[test]
  fn argmax_ties_take_lowest_class() {
    let t = tensor(&[row(0.5, 0.5, 0.1, 0.1, &[0.2, 0.8, 0.8, 0.8])]);
    let out = decode(&[t], 10, 10, 0.5).unwrap();
    assert_eq!(out[0].class_id, 1);
  }

  #[test]
  fn pools_tensors_in_tensor_then_row_order() {
    let a = tensor(&[
      row(0.1, 0.1, 0.1, 0.1, &[0.7, 0.0]),
      row(0.2, 0.2, 0.1, 0.1, &[0.1, 0.2]),
      row(0.3, 0.3, 0.1, 0.1, &[0.0, 0.95]),
    ]);
    let b = tensor(&[row(0.4, 0.4, 0.1, 0.1, &[0.65, 0.0])]);
    let out = decode(&[a, b], 100, 100, 0.6).unwrap();
    let confs: Vec<f32> = out.iter().map(|c| c.confidence).collect();
    assert_eq!(confs, vec![0.7, 0.95, 0.65]);
  }

  #[test]
  fn empty_inputs_yield_no_candidates() {
    assert!(decode(&[], 640, 480, 0.6).unwrap().is_empty());
    let no_rows = Array2::<f32>::zeros((0, 85));
    assert!(decode(&[no_rows], 640, 480, 0.6).unwrap().is_empty());
  }

  #[test]
  fn structural_errors_are_fatal() {
    let narrow = Array2::<f32>::zeros((3, 4));
    assert_eq!(
      decode(&[narrow], 640, 480, 0.6),
      Err(DecodeError::TooFewColumns { tensor: 0, cols: 4 })
    );

    let good = tensor(&[row(0.5, 0.5, 0.1, 0.1, &[0.9])]);
    let no_classes = Array2::<f32>::zeros((3, 5));
    assert_eq!(
      decode(&[good, no_classes], 640, 480, 0.6),
      Err(DecodeError::NoClassScores { tensor: 1 })
    );
  }

  #[test]
  fn nan_scores_are_dropped() {
    let t = tensor(&[row(0.5, 0.5, 0.1, 0.1, &[f32::NAN, f32::NAN])]);
    assert!(decode(&[t], 10, 10, 0.1).unwrap().is_empty());

    let t = tensor(&[row(0.5, 0.5, 0.1, 0.1, &[f32::NAN, 0.9])]);
    let out = decode(&[t], 10, 10, 0.1).unwrap();
    assert_eq!(out[0].class_id, 1);
  }
}
