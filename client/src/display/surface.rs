//! ピクセルバッファ
//!
//! デコード結果とキャンバスの双方で使う、形式付きの画素配列です。
//! 行は上から下に並び、各行は4バイト境界に揃えられます。
//! 画素値はリトルエンディアンで格納されます（32ビット形式では b, g, r, a の順）。

use image::{Rgba, RgbaImage};
use remote_display_rs_common::protocol::Rect;
use remote_display_rs_common::{CommonError, Result};
use serde::{Deserialize, Serialize};

use super::convert;

/// サーフェスのピクセル形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 1ビットアルファ（LSB先頭）
    A1,
    /// 8ビットアルファ
    A8,
    /// 16ビット x1r5g5b5
    X1R5G5B5,
    /// 16ビット r5g6b5
    R5G6B5,
    /// 32ビット x8r8g8b8
    X8R8G8B8,
    /// 32ビット a8r8g8b8
    A8R8G8B8,
}

impl PixelFormat {
    /// 1画素のビット数
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::A1 => 1,
            PixelFormat::A8 => 8,
            PixelFormat::X1R5G5B5 | PixelFormat::R5G6B5 => 16,
            PixelFormat::X8R8G8B8 | PixelFormat::A8R8G8B8 => 32,
        }
    }

    /// アルファチャネルを持つかどうか
    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelFormat::A1 | PixelFormat::A8 | PixelFormat::A8R8G8B8)
    }

    /// 32ビット形式かどうか
    pub fn is_32bit(&self) -> bool {
        matches!(self, PixelFormat::X8R8G8B8 | PixelFormat::A8R8G8B8)
    }

    /// 幅に対する行のバイト数（4バイト境界）
    pub fn stride_for(&self, width: u32) -> usize {
        let bits = width as usize * self.bits_per_pixel() as usize;
        ((bits + 31) / 32) * 4
    }

    /// アルファを持たない同じ深さの形式
    pub fn opaque(&self) -> Self {
        match self {
            PixelFormat::A8R8G8B8 => PixelFormat::X8R8G8B8,
            other => *other,
        }
    }

    /// ワイヤ上のサーフェス形式コードから変換
    pub fn from_surface_format(code: u32) -> Result<Self> {
        Ok(match code {
            1 => PixelFormat::A1,
            8 => PixelFormat::A8,
            16 => PixelFormat::X1R5G5B5,
            80 => PixelFormat::R5G6B5,
            32 => PixelFormat::X8R8G8B8,
            96 => PixelFormat::A8R8G8B8,
            other => {
                return Err(CommonError::protocol(format!("未知のサーフェス形式です: {}", other)))
            }
        })
    }

    /// 設定文字列から変換（キャンバス形式のみ）
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "xrgb32" => Some(PixelFormat::X8R8G8B8),
            "argb32" => Some(PixelFormat::A8R8G8B8),
            "rgb555" => Some(PixelFormat::X1R5G5B5),
            "rgb565" => Some(PixelFormat::R5G6B5),
            _ => None,
        }
    }

    /// キャンバスとして使える形式かどうか
    pub fn is_canvas_format(&self) -> bool {
        !matches!(self, PixelFormat::A1 | PixelFormat::A8)
    }
}

/// ピクセルバッファ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    format: PixelFormat,
    width: i32,
    height: i32,
    stride: usize,
    data: Vec<u8>,
}

impl Surface {
    /// ゼロで埋めたサーフェスを作成
    pub fn new(format: PixelFormat, width: i32, height: i32) -> Result<Self> {
        if width < 0 || height < 0 {
            return Err(CommonError::InvalidParameterError(format!(
                "サーフェスのサイズが不正です: {}x{}",
                width, height
            )));
        }
        let stride = format.stride_for(width as u32);
        let size = stride.checked_mul(height as usize).ok_or_else(|| {
            CommonError::ResourceExhausted(format!("サーフェスが大きすぎます: {}x{}", width, height))
        })?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|e| {
            CommonError::ResourceExhausted(format!(
                "サーフェス {}x{} の確保に失敗しました: {}",
                width, height, e
            ))
        })?;
        data.resize(size, 0);
        Ok(Self { format, width, height, stride, data })
    }

    /// 既存の画素データから作成
    pub fn from_data(
        format: PixelFormat,
        width: i32,
        height: i32,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width < 0 || height < 0 || stride < format.stride_for(width as u32) {
            return Err(CommonError::InvalidParameterError(format!(
                "サーフェスの形状が不正です: {}x{} stride {}",
                width, height, stride
            )));
        }
        if data.len() < stride * height as usize {
            return Err(CommonError::InvalidParameterError(format!(
                "画素データが不足しています（{} < {}）",
                data.len(),
                stride * height as usize
            )));
        }
        Ok(Self { format, width, height, stride, data })
    }

    /// ピクセル形式
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// 幅
    pub fn width(&self) -> i32 {
        self.width
    }

    /// 高さ
    pub fn height(&self) -> i32 {
        self.height
    }

    /// 1行のバイト数
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// 画素データ
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 画素データ（書き込み用）
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// サーフェス全体の矩形
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// 同じ深さの形式に付け替える（xRGB と ARGB の切り替え用）
    pub fn relabel(&mut self, format: PixelFormat) -> Result<()> {
        if format.bits_per_pixel() != self.format.bits_per_pixel() {
            return Err(CommonError::InvalidParameterError(format!(
                "{:?} から {:?} には付け替えられません",
                self.format, format
            )));
        }
        self.format = format;
        Ok(())
    }

    /// 1行分のバイト列
    pub fn row(&self, y: i32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    /// 1行分のバイト列（書き込み用）
    pub fn row_mut(&mut self, y: i32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.stride]
    }

    /// 画素の生の値を取得
    ///
    /// 座標はサーフェス内でなければなりません。
    pub fn pixel(&self, x: i32, y: i32) -> u32 {
        let row = y as usize * self.stride;
        let x = x as usize;
        match self.format {
            PixelFormat::A1 => ((self.data[row + (x >> 3)] >> (x & 7)) & 1) as u32,
            PixelFormat::A8 => self.data[row + x] as u32,
            PixelFormat::X1R5G5B5 | PixelFormat::R5G6B5 => {
                let i = row + x * 2;
                u16::from_le_bytes([self.data[i], self.data[i + 1]]) as u32
            }
            PixelFormat::X8R8G8B8 | PixelFormat::A8R8G8B8 => {
                let i = row + x * 4;
                u32::from_le_bytes([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
            }
        }
    }

    /// 画素の生の値を設定
    pub fn set_pixel(&mut self, x: i32, y: i32, value: u32) {
        let row = y as usize * self.stride;
        let x = x as usize;
        match self.format {
            PixelFormat::A1 => {
                let byte = &mut self.data[row + (x >> 3)];
                if value & 1 != 0 {
                    *byte |= 1 << (x & 7);
                } else {
                    *byte &= !(1 << (x & 7));
                }
            }
            PixelFormat::A8 => self.data[row + x] = value as u8,
            PixelFormat::X1R5G5B5 | PixelFormat::R5G6B5 => {
                let i = row + x * 2;
                self.data[i..i + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            PixelFormat::X8R8G8B8 | PixelFormat::A8R8G8B8 => {
                let i = row + x * 4;
                self.data[i..i + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
    }

    /// 画素を a8r8g8b8 で取得
    pub fn argb(&self, x: i32, y: i32) -> u32 {
        convert::to_argb(self.format, self.pixel(x, y))
    }

    /// a8r8g8b8 の値を自身の形式で設定
    pub fn set_argb(&mut self, x: i32, y: i32, argb: u32) {
        let value = convert::from_argb(self.format, argb);
        self.set_pixel(x, y, value);
    }

    /// 矩形を生の値で塗りつぶす（範囲外は切り捨て）
    pub fn fill_rect(&mut self, rect: &Rect, value: u32) {
        let r = rect.intersect(&self.bounds());
        if r.is_empty() {
            return;
        }
        if self.format.is_32bit() {
            let bytes = value.to_le_bytes();
            for y in r.top..r.bottom {
                let row = self.row_mut(y);
                for px in row[r.left as usize * 4..r.right as usize * 4].chunks_exact_mut(4) {
                    px.copy_from_slice(&bytes);
                }
            }
        } else {
            for y in r.top..r.bottom {
                for x in r.left..r.right {
                    self.set_pixel(x, y, value);
                }
            }
        }
    }

    /// 別サーフェスの領域を `dest` に生の値でコピー
    ///
    /// `src` の `(src_x, src_y)` が `dest` の左上に対応します。
    /// 形式は一致している必要があり、範囲外は切り捨てます。
    pub fn copy_from(&mut self, src: &Surface, src_x: i32, src_y: i32, dest: &Rect) -> Result<()> {
        if src.format != self.format {
            return Err(CommonError::InvalidParameterError(format!(
                "形式が一致しません: {:?} と {:?}",
                src.format, self.format
            )));
        }
        let dx = src_x - dest.left;
        let dy = src_y - dest.top;
        let r = dest
            .intersect(&self.bounds())
            .intersect(&src.bounds().translate(-dx, -dy));
        if r.is_empty() {
            return Ok(());
        }
        if self.format == PixelFormat::A1 {
            for y in r.top..r.bottom {
                for x in r.left..r.right {
                    let v = src.pixel(x + dx, y + dy);
                    self.set_pixel(x, y, v);
                }
            }
            return Ok(());
        }
        let bpp = self.format.bits_per_pixel() as usize / 8;
        let len = r.width() as usize * bpp;
        for y in r.top..r.bottom {
            let s = (y + dy) as usize * src.stride + (r.left + dx) as usize * bpp;
            let d = y as usize * self.stride + r.left as usize * bpp;
            self.data[d..d + len].copy_from_slice(&src.data[s..s + len]);
        }
        Ok(())
    }

    /// 自身の中で矩形を移動（重なりを考慮）
    ///
    /// `rect` の内容を `(dx, dy)` だけずらした位置へコピーします。
    pub fn copy_within(&mut self, rect: &Rect, dx: i32, dy: i32) {
        let dest = rect.translate(dx, dy).intersect(&self.bounds());
        let dest = dest.intersect(&rect.intersect(&self.bounds()).translate(dx, dy));
        if dest.is_empty() {
            return;
        }
        if self.format == PixelFormat::A1 {
            let src = self.clone();
            for y in dest.top..dest.bottom {
                for x in dest.left..dest.right {
                    let v = src.pixel(x - dx, y - dy);
                    self.set_pixel(x, y, v);
                }
            }
            return;
        }
        let bpp = self.format.bits_per_pixel() as usize / 8;
        let len = dest.width() as usize * bpp;
        let mut copy_row = |y: i32| {
            let s = (y - dy) as usize * self.stride + (dest.left - dx) as usize * bpp;
            let d = y as usize * self.stride + dest.left as usize * bpp;
            self.data.copy_within(s..s + len, d);
        };
        // 下へ移動する場合は下の行から
        if dy > 0 {
            for y in (dest.top..dest.bottom).rev() {
                copy_row(y);
            }
        } else {
            for y in dest.top..dest.bottom {
                copy_row(y);
            }
        }
    }

    /// 領域を切り出した新しいサーフェス
    pub fn sub_image(&self, area: &Rect) -> Result<Surface> {
        let mut out = Surface::new(self.format, area.width().max(0), area.height().max(0))?;
        let dest = Rect::from_size(0, 0, out.width, out.height);
        out.copy_from(self, area.left, area.top, &dest)?;
        Ok(out)
    }

    /// `image` クレートの RGBA 画像に変換
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width as u32, self.height as u32, |x, y| self.rgba(x as i32, y as i32))
    }

    /// 画素を RGBA で取得（アルファを持たない形式は不透明）
    pub fn rgba(&self, x: i32, y: i32) -> Rgba<u8> {
        let v = self.argb(x, y);
        let a = if self.format.has_alpha() { (v >> 24) as u8 } else { 0xff };
        Rgba([(v >> 16) as u8, (v >> 8) as u8, v as u8, a])
    }
}
