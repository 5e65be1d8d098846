// 该文件是 Streamdet （流检） 项目的一部分。
// src/model/blob.rs - 网络输入预处理
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

use image::imageops::{self, FilterType};

use crate::frame::RgbFrame;

pub const DEFAULT_INPUT_SIZE: u32 = 288;
pub const DEFAULT_SCALE: f32 = 1.0 / 255.0;

/// 网络期望的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  /// 红蓝互换后的顺序（采集端为 BGR 时的 swapRB）
  #[default]
  Rgb,
  Bgr,
}

/// blob 参数：缩放尺寸、像素缩放系数、均值、通道顺序
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobParams {
  pub width: u32,
  pub height: u32,
  pub scale: f32,
  pub mean: [f32; 3],
  pub channel_order: ChannelOrder,
}

impl Default for BlobParams {
  fn default() -> Self {
    Self {
      width: DEFAULT_INPUT_SIZE,
      height: DEFAULT_INPUT_SIZE,
      scale: DEFAULT_SCALE,
      mean: [0.0; 3],
      channel_order: ChannelOrder::Rgb,
    }
  }
}

impl BlobParams {
  pub fn square(size: u32) -> Self {
    Self {
      width: size,
      height: size,
      ..Self::default()
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, 3, self.height as usize, self.width as usize]
  }
}

/// 将帧缩放到网络输入尺寸并转为 NCHW 浮点数据：(pixel - mean) * scale
pub fn blob_from_frame(frame: &RgbFrame, params: &BlobParams) -> Vec<f32> {
  let resized;
  let image = if frame.width() == params.width && frame.height() == params.height {
    frame.image()
  } else {
    resized = imageops::resize(
      frame.image(),
      params.width,
      params.height,
      FilterType::Triangle,
    );
    &resized
  };

  let plane = (params.width * params.height) as usize;
  let mut data = vec![0.0f32; plane * 3];

  for (x, y, pixel) in image.enumerate_pixels() {
    let idx = (y * params.width + x) as usize;
    for c in 0..3 {
      let src = match params.channel_order {
        ChannelOrder::Rgb => c,
        ChannelOrder::Bgr => 2 - c,
      };
      data[c * plane + idx] = (pixel[src] as f32 - params.mean[c]) * params.scale;
    }
  }

  data
}
