//! デバッグ用の画像ダンプ
//!
//! デコードした画像や受信したストリームをファイルに書き出します。
//! 既定では無効で、デコーダに [`ImageDumper`] を渡したときだけ動作します。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::debug;
use remote_display_rs_common::protocol::{Bitmap, Palette};
use remote_display_rs_common::utils::path::ensure_dir_exists;
use remote_display_rs_common::Result;

use super::surface::{PixelFormat, Surface};

/// 画像ダンプの受け取り先
pub trait ImageDumper {
    /// デコード済みサーフェスを書き出す（`cached` はキャッシュ登録された画像）
    fn dump_surface(&mut self, surface: &Surface, cached: bool) -> Result<()>;

    /// JPEG ストリームをそのまま書き出す
    fn dump_jpeg(&mut self, data: &[u8]) -> Result<()>;

    /// 非圧縮ビットマップをそのまま書き出す
    fn dump_bitmap(&mut self, bitmap: &Bitmap, palette: Option<&Palette>) -> Result<()>;
}

/// ディレクトリに連番ファイルとして書き出すダンパー
///
/// ファイル名はセッション開始時刻と連番から作ります（例: `20260101-120000-0003-cache.ppm`）。
pub struct FileDumper {
    dir: PathBuf,
    session: String,
    counter: u32,
}

impl FileDumper {
    /// 出力先ディレクトリを指定して作成
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir_exists(&dir)?;
        Ok(Self {
            dir,
            session: Local::now().format("%Y%m%d-%H%M%S").to_string(),
            counter: 0,
        })
    }

    /// 出力先ディレクトリ
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&mut self, kind: &str, ext: &str) -> PathBuf {
        self.counter += 1;
        self.dir
            .join(format!("{}-{:04}-{}.{}", self.session, self.counter, kind, ext))
    }

    fn create(&mut self, kind: &str, ext: &str) -> Result<(PathBuf, BufWriter<File>)> {
        let path = self.next_path(kind, ext);
        let file = File::create(&path)?;
        Ok((path, BufWriter::new(file)))
    }
}

impl ImageDumper for FileDumper {
    fn dump_surface(&mut self, surface: &Surface, cached: bool) -> Result<()> {
        let kind = if cached { "cache" } else { "non-cache" };
        let gray = matches!(surface.format(), PixelFormat::A1 | PixelFormat::A8);
        let (path, mut out) = self.create(kind, if gray { "pgm" } else { "ppm" })?;
        let (w, h) = (surface.width(), surface.height());

        if gray {
            write!(out, "P5\n{} {}\n#{} dump\n255\n", w, h, kind)?;
            for y in 0..h {
                let row: Vec<u8> = (0..w)
                    .map(|x| match surface.format() {
                        PixelFormat::A1 => (surface.pixel(x, y) as u8).wrapping_neg(),
                        _ => surface.pixel(x, y) as u8,
                    })
                    .collect();
                out.write_all(&row)?;
            }
        } else {
            write!(out, "P6\n{} {}\n#{} dump\n255\n", w, h, kind)?;
            for y in 0..h {
                let row: Vec<u8> = (0..w)
                    .flat_map(|x| {
                        let v = surface.argb(x, y);
                        [(v >> 16) as u8, (v >> 8) as u8, v as u8]
                    })
                    .collect();
                out.write_all(&row)?;
            }
        }
        out.flush()?;
        debug!("サーフェスをダンプしました: {}", path.display());
        Ok(())
    }

    fn dump_jpeg(&mut self, data: &[u8]) -> Result<()> {
        let (path, mut out) = self.create("jpeg", "jpg")?;
        out.write_all(data)?;
        out.flush()?;
        debug!("JPEG をダンプしました: {}", path.display());
        Ok(())
    }

    fn dump_bitmap(&mut self, bitmap: &Bitmap, palette: Option<&Palette>) -> Result<()> {
        let (path, mut out) = self.create("bitmap", "raw")?;
        let ents = palette.map(|p| p.ents.as_slice()).unwrap_or(&[]);
        write!(out, "{:?}\n{} {}\n{}\n", bitmap.format, bitmap.width, bitmap.height, ents.len())?;
        for e in ents {
            out.write_all(&e.to_le_bytes())?;
        }
        out.write_all(b"\n")?;
        out.write_all(&bitmap.data.linearize())?;
        out.flush()?;
        debug!("ビットマップをダンプしました: {}", path.display());
        Ok(())
    }
}
