// 该文件是 Streamdet （流检） 项目的一部分。
// src/output/gstreamer_output.rs - GStreamer 显示与视频文件输出
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

//! # GStreamer output
//!
//! Pushes annotated frames into an `appsrc` pipeline.
//!
//! - `gst://display` opens a window through `autovideosink`.
//! - `gst://file/path/out.mp4?fps=30` encodes into a file. The container is
//!   picked from the extension (`.mp4`, `.mkv`, `.avi`, `.webm`), MP4 otherwise.
//!
//! The frame size is taken from the first frame; later frames must match it.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::DetectResult,
  output::Render,
  url_file_path,
};

const DEFAULT_FPS: i32 = 30;

#[derive(Error, Debug)]
pub enum GStreamerOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Unsupported GStreamer output target: {0}")]
  UnsupportedTarget(String),
  #[error("Invalid parameter '{0}': {1}")]
  InvalidParameter(&'static str, String),
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Buffer creation error")]
  BufferCreationError,
  #[error("Frame size changed from {expected:?} to {actual:?}")]
  FrameSizeChanged {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GStreamerOutputTarget {
  Display,
  File(String),
}

impl GStreamerOutputTarget {
  fn pipeline_description(&self) -> String {
    match self {
      GStreamerOutputTarget::Display => {
        "appsrc name=src ! videoconvert ! autovideosink sync=false".to_string()
      }
      GStreamerOutputTarget::File(path) => {
        let encoder = if path.ends_with(".mkv") {
          "video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux"
        } else if path.ends_with(".avi") {
          "video/x-raw,format=I420 ! x264enc ! avimux"
        } else if path.ends_with(".webm") {
          "vp8enc ! webmmux"
        } else {
          "video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
        };
        format!(
          "appsrc name=src ! videoconvert ! {} ! filesink location=\"{}\"",
          encoder, path
        )
      }
    }
  }
}

pub struct GStreamerOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: i32,
  frame_layout: OnceLock<FrameLayout>,
  frame_count: AtomicU64,
}

/// 由首帧确定的输出帧布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameLayout {
  width: u32,
  height: u32,
  /// 每行字节数，RGB 行按 GStreamer 默认规则 4 字节对齐
  stride: usize,
  /// 整帧字节数
  size: usize,
}

/// 把紧密排列的 RGB 行复制到按 `stride` 对齐的缓冲区
fn pack_rows(data: &[u8], layout: &FrameLayout) -> Vec<u8> {
  let row_bytes = layout.width as usize * 3;
  let mut padded = vec![0u8; layout.size];
  for (src, dst) in data
    .chunks_exact(row_bytes)
    .zip(padded.chunks_mut(layout.stride))
    .take(layout.height as usize)
  {
    dst[..row_bytes].copy_from_slice(src);
  }
  padded
}

impl FromUrlWithScheme for GStreamerOutput {
  const SCHEME: &'static str = "gst";
}

fn parse_target(url: &Url) -> Result<(GStreamerOutputTarget, i32), GStreamerOutputError> {
  let fps = match url.query_pairs().find(|(k, _)| k == "fps") {
    Some((_, v)) => match v.parse::<i32>() {
      Ok(fps) if fps > 0 => fps,
      _ => {
        return Err(GStreamerOutputError::InvalidParameter(
          "fps",
          v.to_string(),
        ));
      }
    },
    None => DEFAULT_FPS,
  };

  let target = match url.host_str() {
    Some("display") => GStreamerOutputTarget::Display,
    Some("file") => {
      let path = url_file_path(url);
      if path.len() <= 1 {
        return Err(GStreamerOutputError::UnsupportedTarget(url.to_string()));
      }
      GStreamerOutputTarget::File(path)
    }
    _ => return Err(GStreamerOutputError::UnsupportedTarget(url.to_string())),
  };
  Ok((target, fps))
}

impl FromUrl for GStreamerOutput {
  type Error = GStreamerOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerOutputError::SchemeMismatch);
    }

    let (target, fps) = parse_target(url)?;

    gst::init()?;

    let pipeline_desc = target.pipeline_description();
    info!("Creating output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerOutputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!("Output pipeline started: {:?} @ {} fps", target, fps);

    Ok(GStreamerOutput {
      pipeline,
      appsrc,
      fps,
      frame_layout: OnceLock::new(),
      frame_count: AtomicU64::new(0),
    })
  }
}

impl Drop for GStreamerOutput {
  fn drop(&mut self) {
    // 文件输出需要 EOS 才能写完容器
    let _ = self.appsrc.end_of_stream();
    std::thread::sleep(std::time::Duration::from_millis(100));

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer output pipeline: {}", e);
    }

    info!(
      "Output closed. Total frames written: {}",
      self.frame_count.load(Ordering::Relaxed)
    );
  }
}

impl GStreamerOutput {
  fn negotiate(&self, width: u32, height: u32) -> Result<FrameLayout, GStreamerOutputError> {
    let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, width, height)
      .fps(gst::Fraction::new(self.fps, 1))
      .build()?;
    let caps = info.to_caps()?;
    self.appsrc.set_caps(Some(&caps));
    let layout = FrameLayout {
      width,
      height,
      stride: info.stride()[0] as usize,
      size: info.size(),
    };
    info!(
      "Output caps set: {}x{} @ {} fps, stride {}",
      width, height, self.fps, layout.stride
    );
    Ok(layout)
  }

  fn frame_layout(&self, width: u32, height: u32) -> Result<FrameLayout, GStreamerOutputError> {
    let layout = match self.frame_layout.get() {
      Some(layout) => *layout,
      None => {
        let layout = self.negotiate(width, height)?;
        *self.frame_layout.get_or_init(|| layout)
      }
    };

    if (layout.width, layout.height) != (width, height) {
      return Err(GStreamerOutputError::FrameSizeChanged {
        expected: (layout.width, layout.height),
        actual: (width, height),
      });
    }
    Ok(layout)
  }

  fn push_frame(&self, frame: &RgbFrame) -> Result<(), GStreamerOutputError> {
    let layout = self.frame_layout(frame.width(), frame.height())?;

    let mut buffer = gst::Buffer::from_mut_slice(pack_rows(frame.as_nhwc(), &layout));
    let frame_count = self.frame_count.fetch_add(1, Ordering::Relaxed);
    let duration = 1_000_000_000 / self.fps as u64;
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(frame_count * duration));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;

    Ok(())
  }
}

impl Render<RgbFrame, DetectResult> for GStreamerOutput {
  type Error = GStreamerOutputError;

  fn render_result(&self, frame: &RgbFrame, _result: &DetectResult) -> Result<(), Self::Error> {
    self.push_frame(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_display_target() {
    let url = Url::parse("gst://display").unwrap();
    let (target, fps) = parse_target(&url).unwrap();
    assert_eq!(target, GStreamerOutputTarget::Display);
    assert_eq!(fps, DEFAULT_FPS);
    assert!(target.pipeline_description().contains("autovideosink"));
  }

  #[test]
  fn picks_encoder_from_extension() {
    let url = Url::parse("gst://file/tmp/out.webm?fps=15").unwrap();
    let (target, fps) = parse_target(&url).unwrap();
    assert_eq!(fps, 15);
    let desc = target.pipeline_description();
    assert!(desc.contains("vp8enc ! webmmux"));
    assert!(desc.ends_with("filesink location=\"/tmp/out.webm\""));

    let url = Url::parse("gst://file/tmp/out.mp4").unwrap();
    let (target, _) = parse_target(&url).unwrap();
    assert!(target.pipeline_description().contains("mp4mux"));
  }

  #[test]
  fn file_target_path_is_percent_decoded() {
    let url = Url::parse("gst://file/tmp/my clips/out.mkv").unwrap();
    let (target, _) = parse_target(&url).unwrap();
    assert_eq!(
      target,
      GStreamerOutputTarget::File("/tmp/my clips/out.mkv".to_string())
    );
  }

  #[test]
  fn rows_are_padded_to_stride() {
    // 宽 3 像素：每行 9 字节，对齐后 12 字节
    let layout = FrameLayout {
      width: 3,
      height: 2,
      stride: 12,
      size: 24,
    };
    let frame = RgbFrame::from_raw(0, 3, 2, (1..=18).collect()).unwrap();
    let padded = pack_rows(frame.as_nhwc(), &layout);

    assert_eq!(padded.len(), layout.size);
    assert_eq!(&padded[..9], &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
    assert_eq!(&padded[9..12], &[0, 0, 0]);
    assert_eq!(&padded[12..21], &[10, 11, 12, 13, 14, 15, 16, 17, 18]);
    assert_eq!(&padded[21..], &[0, 0, 0]);
  }

  #[test]
  fn aligned_rows_are_copied_unchanged() {
    let layout = FrameLayout {
      width: 4,
      height: 2,
      stride: 12,
      size: 24,
    };
    let data: Vec<u8> = (0..24).collect();
    assert_eq!(pack_rows(&data, &layout), data);
  }

  #[test]
  fn rejects_bad_targets() {
    for url in ["gst://file", "gst://window", "gst://display?fps=0"] {
      let url = Url::parse(url).unwrap();
      assert!(parse_target(&url).is_err(), "{}", url);
    }
  }
}
