// 该文件是 Streamdet （流检） 项目的一部分。
// src/model.rs - 模型
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

use ndarray::Array2;

use crate::{frame::RgbFrame, postprocess::BoxRect};

/// 网络的一个输出头：每行一个锚点预测，列为 cx, cy, w, h, objectness, 类别分数...
pub type OutputTensor = Array2<f32>;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 前向推理能力，网络结构与权重格式对流水线不可见
///
/// 每次调用返回新的输出张量，不在帧之间复用。
pub trait ForwardPass {
  type Error: std::error::Error + Send + Sync + 'static;

  fn forward(&mut self, frame: &RgbFrame) -> Result<Vec<OutputTensor>, Self::Error>;
}

impl<P: ForwardPass + ?Sized> ForwardPass for Box<P> {
  type Error = P::Error;

  fn forward(&mut self, frame: &RgbFrame) -> Result<Vec<OutputTensor>, Self::Error> {
    (**self).forward(frame)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  /// 在保留列表中的名次（0 为置信度最高）
  pub rank: usize,
  pub class_id: usize,
  pub label: String,
  pub score: f32,
  pub bbox: BoxRect, // 像素坐标 [left, top, width, height]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &DetectItem> {
    self.items.iter()
  }
}

mod blob;
mod detector;
#[cfg(feature = "onnx")]
mod onnx;

pub use self::blob::{BlobParams, ChannelOrder, blob_from_frame};
pub use self::detector::{Detector, DetectorError};
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxError, OnnxForwardPass, OnnxForwardPassBuilder};
