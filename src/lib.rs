// 该文件是 Streamdet （流检） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod config;
pub mod frame;
pub mod input;
pub mod labels;
pub mod model;
pub mod output;
pub mod postprocess;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// URL 路径解码后的文件系统路径
///
/// `Url::path()` 保留百分号编码，`/a%20b/{}.png` 需要还原成 `/a b/{}.png`。
/// 解码结果不是合法 UTF-8 时保留原始路径。
pub fn url_file_path(url: &url::Url) -> String {
  let path = url.path();
  match urlencoding::decode(path) {
    Ok(decoded) => decoded.into_owned(),
    Err(e) => {
      tracing::warn!("URL 路径解码失败，使用原始路径 {}: {}", path, e);
      path.to_string()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_percent_escapes_in_path() {
    let url = url::Url::parse("image:///tmp/my frames/frame-{}.png").unwrap();
    assert_eq!(url.path(), "/tmp/my%20frames/frame-%7B%7D.png");
    assert_eq!(url_file_path(&url), "/tmp/my frames/frame-{}.png");
  }

  #[test]
  fn host_is_not_part_of_path() {
    let url = url::Url::parse("gst://file/data/a%20b.mp4").unwrap();
    assert_eq!(url_file_path(&url), "/data/a b.mp4");
  }
}
