// 该文件是 Streamdet （流检） 项目的一部分。
// src/config.rs - 检测参数配置
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

use crate::postprocess::{NmsParams, SuppressionMode};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// 检测流水线的阈值配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
  /// 解码阶段的置信度阈值（严格大于才保留）
  pub confidence_threshold: f32,
  /// NMS 阶段的分数阈值
  pub score_threshold: f32,
  /// NMS IoU 阈值
  pub iou_threshold: f32,
  pub suppression: SuppressionMode,
  /// 最多保留的检测数量，None 表示不限制
  pub top_k: Option<usize>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      suppression: SuppressionMode::Pooled,
      top_k: None,
    }
  }
}

impl DetectorConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_suppression(mut self, mode: SuppressionMode) -> Self {
    self.suppression = mode;
    self
  }

  pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
    self.top_k = top_k;
    self
  }

  pub fn nms_params(&self) -> NmsParams {
    NmsParams {
      score_threshold: self.score_threshold,
      iou_threshold: self.iou_threshold,
      mode: self.suppression,
      top_k: self.top_k,
    }
  }
}
