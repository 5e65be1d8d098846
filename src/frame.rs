// 该文件是 Streamdet （流检） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::{Rgb, RgbImage};

const RGB_CHANNELS: usize = 3;

/// 一帧 RGB 图像（HWC 排列，8 位）
///
/// 由输入源在每次迭代中创建，标注阶段原地修改，显示后丢弃。
#[derive(Debug, Clone)]
pub struct RgbFrame {
  index: u64,
  image: RgbImage,
}

impl RgbFrame {
  pub fn new(index: u64, image: RgbImage) -> Self {
    Self { index, image }
  }

  /// 纯色帧，主要用于测试
  pub fn filled(index: u64, width: u32, height: u32, color: [u8; 3]) -> Self {
    Self {
      index,
      image: RgbImage::from_pixel(width, height, Rgb(color)),
    }
  }

  /// 从紧密排列的 RGB 字节构造，长度不符时返回 None
  pub fn from_raw(index: u64, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
    RgbImage::from_raw(width, height, data).map(|image| Self { index, image })
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn image_mut(&mut self) -> &mut RgbImage {
    &mut self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  pub fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}

impl AsRef<RgbImage> for RgbFrame {
  fn as_ref(&self) -> &RgbImage {
    &self.image
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_raw_rejects_short_buffer() {
    assert!(RgbFrame::from_raw(0, 4, 4, vec![0u8; 10]).is_none());
    let frame = RgbFrame::from_raw(3, 2, 2, vec![7u8; 12]).unwrap();
    assert_eq!(frame.index(), 3);
    assert_eq!((frame.width(), frame.height()), (2, 2));
    assert_eq!(frame.as_nhwc().len(), 2 * 2 * frame.channels());
  }
}
