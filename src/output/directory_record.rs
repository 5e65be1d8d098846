// 该文件是 Streamdet （流检） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

//! 按日期分目录保存帧，可选地在图像旁边写一份检测记录。
//!
//! `folder:///records` 保存标注后的帧；`folder:///records?record=name`
//! （或 `id`、`json`）保存原始帧并附带记录文件。默认只保存有检测结果的帧，
//! 加上 `always` 后每一帧都保存。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::DetectResult,
  output::Render,
  url_file_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的记录格式: {0}")]
  UnknownRecordFormat(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  /// 每行 `类别名, 置信度, left, top, width, height`
  Name,
  /// 同上，类别写成编号
  Id,
  /// 一个 JSON 数组
  Json,
}

impl RecordFormat {
  fn parse(value: &str) -> Result<Self, DirectoryRecordOutputError> {
    match value {
      "" | "name" => Ok(RecordFormat::Name),
      "id" => Ok(RecordFormat::Id),
      "json" => Ok(RecordFormat::Json),
      other => Err(DirectoryRecordOutputError::UnknownRecordFormat(
        other.to_string(),
      )),
    }
  }

  fn extension(self) -> &'static str {
    match self {
      RecordFormat::Name | RecordFormat::Id => "txt",
      RecordFormat::Json => "json",
    }
  }
}

pub struct Record {
  pub format: RecordFormat,
}

impl Record {
  /// 在 `image_path` 旁边写入同名的记录文件，返回记录文件路径
  pub fn record(
    &self,
    result: &DetectResult,
    image_path: &Path,
  ) -> Result<PathBuf, DirectoryRecordOutputError> {
    let path = image_path.with_extension(self.format.extension());
    let content = match self.format {
      RecordFormat::Name | RecordFormat::Id => {
        let mut records = Vec::with_capacity(result.len());
        for item in result.iter() {
          let name = if self.format == RecordFormat::Name {
            item.label.clone()
          } else {
            item.class_id.to_string()
          };
          records.push(format!(
            "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
            name, item.score, item.bbox.left, item.bbox.top, item.bbox.width, item.bbox.height
          ));
        }
        records.join("\n")
      }
      RecordFormat::Json => {
        let items: Vec<_> = result
          .iter()
          .map(|item| {
            json!({
              "rank": item.rank,
              "class_id": item.class_id,
              "label": item.label,
              "score": item.score,
              "bbox": [item.bbox.left, item.bbox.top, item.bbox.width, item.bbox.height],
            })
          })
          .collect();
        serde_json::to_string_pretty(&items)?
      }
    };
    std::fs::write(&path, content)?;
    Ok(path)
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: Option<Record>,
  frame_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let format = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| RecordFormat::parse(&v))
      .transpose()?;
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(url_file_path(uri), format, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, format: Option<RecordFormat>, always: bool) -> Self {
    Self {
      directory: directory.into(),
      record: format.map(|format| Record { format }),
      frame_counter: AtomicU32::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u32 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("第 {} 帧没有检测结果，跳过保存", frame.index());
      return Ok(());
    }

    let path = self.frame_path()?;
    frame.image().save(&path)?;
    if let Some(record) = &self.record {
      let record_path = record.record(result, &path)?;
      debug!("写入检测记录: {}", record_path.display());
    }
    warn!("保存帧 {} 到: {}", frame.index(), path.display());
    Ok(())
  }

  // 记录模式保存原始帧，检测结果写在记录文件里
  fn wants_annotation(&self) -> bool {
    self.record.is_none()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;
  use crate::postprocess::BoxRect;

  fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("streamdet-{}-{}", name, std::process::id()))
  }

  fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
      let Ok(entries) = std::fs::read_dir(&dir) else {
        continue;
      };
      for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  fn one_detection() -> DetectResult {
    DetectResult {
      items: vec![DetectItem {
        rank: 0,
        class_id: 3,
        label: "dog".to_string(),
        score: 0.9,
        bbox: BoxRect::new(1.0, 2.0, 3.0, 4.0),
      }]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn parses_query_options() {
    let url = url::Url::parse("folder:///tmp/records?record=json&always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(output.always);
    assert_eq!(output.record.as_ref().map(|r| r.format), Some(RecordFormat::Json));
    assert!(!output.wants_annotation());

    let url = url::Url::parse("folder:///tmp/records").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(!output.always);
    assert!(output.record.is_none());
    assert!(output.wants_annotation());

    let url = url::Url::parse("folder:///tmp/records?record=xml").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::UnknownRecordFormat(_))
    ));
  }

  #[test]
  fn directory_path_is_percent_decoded() {
    let url = url::Url::parse("folder:///tmp/my records?always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory, PathBuf::from("/tmp/my records"));
  }

  #[test]
  fn skips_empty_results_unless_always() {
    let dir = temp_dir("record-skip");
    let frame = RgbFrame::filled(0, 4, 4, [0, 0, 0]);

    let output = DirectoryRecordOutput::new(&dir, None, false);
    output.render_result(&frame, &DetectResult::default()).unwrap();
    assert!(files_with_extension(&dir, "png").is_empty());

    let output = DirectoryRecordOutput::new(&dir, None, true);
    output.render_result(&frame, &DetectResult::default()).unwrap();
    assert_eq!(files_with_extension(&dir, "png").len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn writes_name_record_next_to_image() {
    let dir = temp_dir("record-name");
    let output = DirectoryRecordOutput::new(&dir, Some(RecordFormat::Name), false);
    let frame = RgbFrame::filled(0, 4, 4, [0, 0, 0]);
    output.render_result(&frame, &one_detection()).unwrap();

    let records = files_with_extension(&dir, "txt");
    assert_eq!(records.len(), 1);
    let content = std::fs::read_to_string(&records[0]).unwrap();
    assert_eq!(content, "dog, 0.9000, 1.0000, 2.0000, 3.0000, 4.0000");
    assert!(records[0].with_extension("png").is_file());

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn writes_json_record() {
    let dir = temp_dir("record-json");
    let output = DirectoryRecordOutput::new(&dir, Some(RecordFormat::Json), false);
    let frame = RgbFrame::filled(0, 4, 4, [0, 0, 0]);
    output.render_result(&frame, &one_detection()).unwrap();

    let records = files_with_extension(&dir, "json");
    assert_eq!(records.len(), 1);
    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&records[0]).unwrap()).unwrap();
    assert_eq!(value[0]["label"], "dog");
    assert_eq!(value[0]["class_id"], 3);

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
