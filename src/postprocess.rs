// 该文件是 Streamdet （流检） 项目的一部分。
// src/postprocess.rs - 后处理：候选框解码与非极大值抑制
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

/// 像素坐标系下的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoxRect {
  pub left: f32,
  pub top: f32,
  pub width: f32,
  pub height: f32,
}

impl BoxRect {
  pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
    Self {
      left,
      top,
      width,
      height,
    }
  }

  /// 由中心点与宽高构造
  pub fn from_center(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
    Self {
      left: center_x - width / 2.0,
      top: center_y - height / 2.0,
      width,
      height,
    }
  }

  pub fn right(&self) -> f32 {
    self.left + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.top + self.height
  }

  pub fn area(&self) -> f32 {
    self.width.max(0.0) * self.height.max(0.0)
  }

  /// 计算两个矩形的 IoU，并集为零时返回 0
  pub fn iou(&self, other: &BoxRect) -> f32 {
    let x1 = self.left.max(other.left);
    let y1 = self.top.max(other.top);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 解码得到的单个候选检测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub confidence: f32,
  pub bbox: BoxRect,
}

mod decode;
mod nms;

pub use self::decode::{BOX_COLUMNS, DecodeError, decode};
pub use self::nms::{NmsParams, SuppressionMode, suppress, suppress_with};
