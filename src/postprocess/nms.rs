// 该文件是 Streamdet （流检） 项目的一部分。
// src/postprocess/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::postprocess::Candidate;

/// 抑制时候选框之间的比较范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionMode {
  /// 所有类别放在一起比较
  #[default]
  Pooled,
  /// 只在同类别候选之间比较
  PerClass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsParams {
  pub score_threshold: f32,
  pub iou_threshold: f32,
  pub mode: SuppressionMode,
  pub top_k: Option<usize>,
}

impl NmsParams {
  pub fn new(score_threshold: f32, iou_threshold: f32) -> Self {
    Self {
      score_threshold,
      iou_threshold,
      mode: SuppressionMode::Pooled,
      top_k: None,
    }
  }
}

/// 贪心 NMS，所有类别放在一起比较
///
/// 返回保留候选在输入中的下标，按置信度降序排列。
pub fn suppress(candidates: &[Candidate], score_threshold: f32, iou_threshold: f32) -> Vec<usize> {
  suppress_with(candidates, &NmsParams::new(score_threshold, iou_threshold))
}

pub fn suppress_with(candidates: &[Candidate], params: &NmsParams) -> Vec<usize> {
  // 分数严格大于阈值才参与，NaN 不会通过
  let mut order: Vec<usize> = (0..candidates.len())
    .filter(|&i| candidates[i].confidence > params.score_threshold)
    .collect();

  // 稳定排序：置信度相同的按原下标升序
  order.sort_by(|&a, &b| candidates[b].confidence.total_cmp(&candidates[a].confidence));

  let limit = params.top_k.unwrap_or(usize::MAX);
  let mut kept: Vec<usize> = Vec::new();

  for idx in order {
    if kept.len() >= limit {
      break;
    }

    let current = &candidates[idx];
    let overlapped = kept.iter().any(|&k| {
      let other = &candidates[k];
      comparable(params.mode, current, other)
        && current.bbox.iou(&other.bbox) > params.iou_threshold
    });

    if !overlapped {
      kept.push(idx);
    }
  }

  debug!("NMS: {} 个候选, 保留 {} 个", candidates.len(), kept.len());
  kept
}

fn comparable(mode: SuppressionMode, a: &Candidate, b: &Candidate) -> bool {
  match mode {
    SuppressionMode::Pooled => true,
    SuppressionMode::PerClass => a.class_id == b.class_id,
  }
}
