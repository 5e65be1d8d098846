// 该文件是 Streamdet （流检） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::RgbFrame,
  model::{DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

/// 未指定字体时依次尝试的系统字体
const SYSTEM_FONT_PATHS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
  "/Library/Fonts/Arial Unicode.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 帧标注器：画框并写上 "<类别> <置信度>"
///
/// 越界的框会被裁剪，退化的框直接跳过，不会 panic。
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  box_color: [u8; 3],
  text_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    let font = SYSTEM_FONT_PATHS
      .iter()
      .map(Path::new)
      .filter(|path| path.is_file())
      .find_map(|path| match load_font(path) {
        Ok(font) => {
          info!("使用系统字体: {}", path.display());
          Some(font)
        }
        Err(e) => {
          debug!("跳过字体 {}: {}", path.display(), e);
          None
        }
      });
    if font.is_none() {
      warn!("未找到可用字体，标注时只绘制边框");
    }
    Self::with_font(font)
  }
}

fn load_font(path: &Path) -> Result<FontArc, DrawError> {
  let data = std::fs::read(path)?;
  Ok(FontArc::try_from_vec(data)?)
}

impl Draw {
  pub fn with_font(font: Option<FontArc>) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
    }
  }

  pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    info!("加载字体文件: {}", path.display());
    Ok(Self::with_font(Some(load_font(path)?)))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn with_box_color(mut self, color: [u8; 3]) -> Self {
    self.box_color = color;
    self
  }

  /// 原地标注一帧
  pub fn annotate(&self, frame: &mut RgbFrame, result: &DetectResult) {
    let image = frame.image_mut();
    for item in result.iter() {
      self.draw_bbox_with_label(image, item);
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let bbox = &item.bbox;
    let x_min = (bbox.left.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.top.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.right().ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.bottom().ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      debug!("跳过画面外或退化的框: {:?}", bbox);
      return;
    }

    let color = Rgb(self.box_color);
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = label_text(item);
    let Some(font) = &self.font else {
      debug!("标签: {}", label);
      return;
    };

    // 标签放在框的左上角上方，放不下时贴着图像顶部
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x);
    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width as u32, self.label_text_height as u32);
      draw_filled_rect_mut(image, rect, color);
    }

    draw_text_mut(
      image,
      Rgb(self.text_color),
      label_x,
      label_y + self.label_text_vertical_padding,
      PxScale::from(self.font_size),
      font,
      &label,
    );
  }
}

/// 标签文本 "<类别> <置信度>"
pub fn label_text(item: &DetectItem) -> String {
  format!("{} {:.2}", item.label, item.score)
}
