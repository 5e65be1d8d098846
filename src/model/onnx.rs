// 该文件是 Streamdet （流检） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 前向推理
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

//! # ONNX 前向推理
//!
//! 加载导出为 ONNX 的 YOLO 检测网络（例如 YOLOv3），每个输出头被整理为
//! `rows x (5 + 类别数)` 的二维矩阵交给解码阶段。
//!
//! ## URL Scheme
//!
//! `onnx:///path/to/yolov3.onnx?size=288&input=images&threads=4`
//!
//! - `size`: 方形输入边长，默认 288
//! - `input`: 输入节点名称，默认 `images`
//! - `threads`: 推理线程数，默认 4
//! - `order`: 通道顺序 `rgb` / `bgr`，默认 `rgb`

use std::collections::HashMap;

use ndarray::Array2;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{
    BlobParams, ChannelOrder, ForwardPass, OutputTensor, blob::DEFAULT_INPUT_SIZE, blob_from_frame,
  },
  url_file_path,
};

const DEFAULT_INPUT_NAME: &str = "images";
const DEFAULT_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("输出形状不符合预期: {0:?}")]
  OutputShape(Vec<i64>),
}

pub struct OnnxForwardPassBuilder {
  model_path: String,
  input_name: String,
  threads: usize,
  blob: BlobParams,
}

impl FromUrlWithScheme for OnnxForwardPassBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxForwardPassBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let size = match query.get("size") {
      Some(v) => v
        .parse::<u32>()
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| OnnxError::InvalidParameter(format!("size={}", v)))?,
      None => DEFAULT_INPUT_SIZE,
    };
    let threads = match query.get("threads") {
      Some(v) => v
        .parse::<usize>()
        .map_err(|_| OnnxError::InvalidParameter(format!("threads={}", v)))?,
      None => DEFAULT_THREADS,
    };
    let channel_order = match query.get("order").map(String::as_str) {
      None | Some("rgb") => ChannelOrder::Rgb,
      Some("bgr") => ChannelOrder::Bgr,
      Some(other) => return Err(OnnxError::InvalidParameter(format!("order={}", other))),
    };

    Ok(OnnxForwardPassBuilder {
      model_path: url_file_path(url),
      input_name: query
        .get("input")
        .cloned()
        .unwrap_or_else(|| DEFAULT_INPUT_NAME.to_string()),
      threads,
      blob: BlobParams {
        channel_order,
        ..BlobParams::square(size)
      },
    })
  }
}

impl OnnxForwardPassBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      input_name: DEFAULT_INPUT_NAME.to_string(),
      threads: DEFAULT_THREADS,
      blob: BlobParams::default(),
    }
  }

  pub fn blob(mut self, blob: BlobParams) -> Self {
    self.blob = blob;
    self
  }

  pub fn input_name(mut self, name: impl Into<String>) -> Self {
    self.input_name = name.into();
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = threads;
    self
  }

  pub fn build(self) -> Result<OnnxForwardPass, OnnxError> {
    if !std::path::Path::new(&self.model_path).is_file() {
      error!("模型文件不存在: {}", self.model_path);
      return Err(OnnxError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path);
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .with_intra_threads(self.threads)?
      .commit_from_file(&self.model_path)?;
    info!(
      "模型加载完成, 输入 {}x{}, 输入节点 {}",
      self.blob.width, self.blob.height, self.input_name
    );

    Ok(OnnxForwardPass {
      session,
      input_name: self.input_name,
      blob: self.blob,
    })
  }
}

pub struct OnnxForwardPass {
  session: Session,
  input_name: String,
  blob: BlobParams,
}

impl OnnxForwardPass {
  pub fn blob(&self) -> &BlobParams {
    &self.blob
  }
}

impl ForwardPass for OnnxForwardPass {
  type Error = OnnxError;

  fn forward(&mut self, frame: &RgbFrame) -> Result<Vec<OutputTensor>, OnnxError> {
    debug!("设置模型输入");
    let data = blob_from_frame(frame, &self.blob);
    let input = Tensor::from_array((self.blob.shape(), data))?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => input])?;

    let mut tensors = Vec::with_capacity(outputs.len());
    for idx in 0..outputs.len() {
      let (shape, data) = outputs[idx].try_extract_tensor::<f32>()?;
      let matrix = to_matrix(&shape, data)?;
      debug!("输出 {}: {}x{}", idx, matrix.nrows(), matrix.ncols());
      tensors.push(matrix);
    }

    Ok(tensors)
  }
}

/// 将 `[.., rows, cols]` 形状的输出展平为 `rows x cols` 矩阵
fn to_matrix(shape: &[i64], data: &[f32]) -> Result<OutputTensor, OnnxError> {
  let Some((&cols, leading)) = shape.split_last() else {
    return Err(OnnxError::OutputShape(shape.to_vec()));
  };
  if cols <= 0 || leading.iter().any(|&d| d < 0) {
    return Err(OnnxError::OutputShape(shape.to_vec()));
  }
  let rows: i64 = leading.iter().product();

  Array2::from_shape_vec((rows as usize, cols as usize), data.to_vec())
    .map_err(|_| OnnxError::OutputShape(shape.to_vec()))
}
