//! JPEG と JPEG+アルファ
//!
//! 色データはベースライン JPEG として外部デコーダで展開します。
//! アルファ付きの画像では、JPEG の直後に LZ の XXXA ストリームで
//! 8ビットのアルファ面が続き、これを各画素のアルファバイトに書き込みます。

use image::RgbImage;
use log::warn;
use remote_display_rs_common::lz::{LzDecoder, LzImageType};
use remote_display_rs_common::protocol::{Chunks, ImageDescriptor, JpegAlphaFlags};
use remote_display_rs_common::{CommonError, Result};

use super::quic::invert_pixels;
use super::surface::{PixelFormat, Surface};

/// 外部の JPEG デコーダ
pub trait JpegDecoder {
    /// ヘッダーを読んで幅と高さを返す
    fn begin_decode(&mut self, data: &[u8]) -> Result<(u32, u32)>;

    /// x8r8g8b8 で `dest` に展開する（行ごとに `stride` バイト）
    fn decode(&mut self, dest: &mut [u8], stride: usize) -> Result<()>;
}

/// `image` クレートによる JPEG デコーダ
#[derive(Default)]
pub struct ImageJpegDecoder {
    pending: Option<RgbImage>,
}

impl ImageJpegDecoder {
    /// 新しいデコーダを作成
    pub fn new() -> Self {
        Self::default()
    }
}

impl JpegDecoder for ImageJpegDecoder {
    fn begin_decode(&mut self, data: &[u8]) -> Result<(u32, u32)> {
        let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
            .map_err(|e| CommonError::protocol(format!("JPEG の解析に失敗しました: {}", e)))?
            .to_rgb8();
        let size = image.dimensions();
        self.pending = Some(image);
        Ok(size)
    }

    fn decode(&mut self, dest: &mut [u8], stride: usize) -> Result<()> {
        let image = self
            .pending
            .take()
            .ok_or_else(|| CommonError::protocol("JPEG: begin_decode が呼ばれていません"))?;
        let width = image.width() as usize;
        for (y, row) in image.rows().enumerate() {
            let start = y * stride;
            let line = dest
                .get_mut(start..start + width * 4)
                .ok_or_else(|| CommonError::protocol("JPEG: 出力バッファが不足しています"))?;
            for (px, out) in row.zip(line.chunks_exact_mut(4)) {
                out.copy_from_slice(&[px[2], px[1], px[0], 0]);
            }
        }
        Ok(())
    }
}

fn check_size(width: u32, height: u32, descriptor: &ImageDescriptor) -> Result<()> {
    if width != descriptor.width || height != descriptor.height {
        return Err(CommonError::protocol(format!(
            "JPEG: サイズが記述子と一致しません（{}x{} != {}x{}）",
            width, height, descriptor.width, descriptor.height
        )));
    }
    Ok(())
}

fn decode_color(
    decoder: &mut dyn JpegDecoder,
    data: &[u8],
    descriptor: &ImageDescriptor,
    format: PixelFormat,
) -> Result<Surface> {
    let (width, height) = decoder.begin_decode(data)?;
    check_size(width, height, descriptor)?;
    let mut surface = Surface::new(format, width as i32, height as i32)?;
    let stride = surface.stride();
    decoder.decode(surface.data_mut(), stride)?;
    Ok(surface)
}

/// JPEG 画像をデコード
///
/// 入力は単一チャンクでなければなりません。`invers` なら RGB だけを反転します。
pub fn decode_jpeg(
    decoder: &mut dyn JpegDecoder,
    data: &Chunks,
    descriptor: &ImageDescriptor,
    invers: bool,
) -> Result<Surface> {
    let bytes = data.as_single()?;
    let mut surface = decode_color(decoder, bytes, descriptor, PixelFormat::X8R8G8B8).map_err(|e| {
        warn!("JPEG のデコードに失敗しました: {}", e);
        e
    })?;
    if invers {
        invert_pixels(&mut surface, 0x00ff_ffff);
    }
    Ok(surface)
}

/// JPEG+アルファ画像をデコード
///
/// `jpeg_size` バイト目以降が XXXA 形式の LZ ストリームです。アルファ面の
/// 幅・高さ・画素数・行順は JPEG と一致していなければなりません。
#[allow(clippy::too_many_arguments)]
pub fn decode_jpeg_alpha(
    decoder: &mut dyn JpegDecoder,
    flags: JpegAlphaFlags,
    jpeg_size: u32,
    data: &Chunks,
    descriptor: &ImageDescriptor,
    invers: bool,
    max_pixels: u64,
) -> Result<Surface> {
    let bytes = data.as_single()?;
    let jpeg_size = jpeg_size as usize;
    if jpeg_size > bytes.len() {
        return Err(CommonError::protocol(format!(
            "JPEG+アルファ: JPEG 部分 {} バイトがデータ長 {} を超えています",
            jpeg_size,
            bytes.len()
        )));
    }
    let (jpeg, alpha) = bytes.split_at(jpeg_size);

    let mut surface = decode_color(decoder, jpeg, descriptor, PixelFormat::A8R8G8B8)?;
    let (width, height) = (surface.width(), surface.height());

    let lz = LzDecoder::begin_with_limit(alpha, None, max_pixels)?;
    let header = *lz.header();
    if header.image_type != LzImageType::Xxxa {
        return Err(CommonError::protocol(format!(
            "JPEG+アルファ: アルファ面の種別が XXXA ではありません: {:?}",
            header.image_type
        )));
    }
    if header.top_down != flags.top_down() {
        return Err(CommonError::protocol("JPEG+アルファ: 行順が一致しません"));
    }
    if header.width != width as u32
        || header.height != height as u32
        || header.n_pixels != width as u64 * height as u64
    {
        return Err(CommonError::protocol(format!(
            "JPEG+アルファ: アルファ面のサイズ {}x{} が一致しません",
            header.width, header.height
        )));
    }

    let mut planes = vec![0u8; header.output_size(LzImageType::Xxxa)];
    lz.decode(LzImageType::Xxxa, &mut planes)?;

    let row_bytes = width as usize * 4;
    for (i, row) in planes.chunks_exact(row_bytes.max(1)).take(height as usize).enumerate() {
        let y = if header.top_down { i as i32 } else { height - 1 - i as i32 };
        let dest = surface.row_mut(y);
        for (out, src) in dest.chunks_exact_mut(4).zip(row.chunks_exact(4)) {
            out[3] = src[3];
        }
    }

    if invers {
        invert_pixels(&mut surface, 0x00ff_ffff);
    }
    Ok(surface)
}
