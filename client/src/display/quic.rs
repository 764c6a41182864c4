//! QUIC デコーダとの接続
//!
//! QUIC のビットプレーン符号化そのものは外部のコーダーが担当します。
//! ここではコーダーへの入力（複数チャンクの順次供給）と、出力種別から
//! サーフェス形式への対応付け、反転処理を扱います。

use log::warn;
use remote_display_rs_common::protocol::{Chunks, ImageDescriptor};
use remote_display_rs_common::{CommonError, Result};

use super::surface::{PixelFormat, Surface};

/// QUIC の画像種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuicImageType {
    /// 無効
    Invalid = 0,
    /// グレースケール（未対応）
    Gray = 1,
    /// 16ビット x1r5g5b5
    Rgb16 = 2,
    /// 24ビット
    Rgb24 = 3,
    /// 32ビット x8r8g8b8
    Rgb32 = 4,
    /// 32ビット a8r8g8b8
    Rgba = 5,
}

/// コーダーへ渡す入力
///
/// 最初のチャンクから読み始め、コーダーが [`QuicInput::more_input`] を
/// 呼ぶたびに次のチャンクへ進みます。各チャンクは32ビット語の列として
/// 扱うため、末尾の4バイト未満の端数は渡しません。
pub struct QuicInput<'a> {
    chunks: &'a Chunks,
    current: usize,
}

impl<'a> QuicInput<'a> {
    /// チャンク列の先頭から入力を開始
    pub fn new(chunks: &'a Chunks) -> Self {
        Self { chunks, current: 0 }
    }

    fn words(chunk: &[u8]) -> &[u8] {
        &chunk[..chunk.len() & !3]
    }

    /// 現在のチャンク
    pub fn current(&self) -> &'a [u8] {
        self.chunks
            .chunks
            .get(self.current)
            .map(|c| Self::words(c))
            .unwrap_or(&[])
    }

    /// 次のチャンクへ進む（最後のチャンクなら `None`）
    pub fn more_input(&mut self) -> Option<&'a [u8]> {
        if self.current + 1 >= self.chunks.count() {
            return None;
        }
        self.current += 1;
        Some(self.current())
    }

    /// 現在のチャンク番号
    pub fn chunk_index(&self) -> usize {
        self.current
    }
}

/// 外部の QUIC コーダー
pub trait QuicCoder {
    /// ヘッダーを読み、画像種別と幅・高さを返す
    fn begin(&mut self, input: &mut QuicInput<'_>) -> Result<(QuicImageType, u32, u32)>;

    /// `as_type` の画素で `dest` に展開する（行ごとに `stride` バイト）
    fn decode(
        &mut self,
        input: &mut QuicInput<'_>,
        as_type: QuicImageType,
        dest: &mut [u8],
        stride: usize,
    ) -> Result<()>;
}

/// 展開時の種別とサーフェス形式を選ぶ
fn output_type(
    ty: QuicImageType,
    canvas: PixelFormat,
    want_original: bool,
) -> Result<(QuicImageType, PixelFormat)> {
    Ok(match ty {
        QuicImageType::Rgba => (QuicImageType::Rgba, PixelFormat::A8R8G8B8),
        QuicImageType::Rgb32 | QuicImageType::Rgb24 => (QuicImageType::Rgb32, PixelFormat::X8R8G8B8),
        QuicImageType::Rgb16 => {
            if !want_original && canvas.is_32bit() {
                (QuicImageType::Rgb32, PixelFormat::X8R8G8B8)
            } else {
                (QuicImageType::Rgb16, PixelFormat::X1R5G5B5)
            }
        }
        QuicImageType::Gray | QuicImageType::Invalid => {
            return Err(CommonError::unsupported(format!("QUIC: 画像種別 {:?} は扱えません", ty)));
        }
    })
}

/// サーフェスの全画素を反転
pub(crate) fn invert_pixels(surface: &mut Surface, mask: u32) {
    let (width, height) = (surface.width(), surface.height());
    for y in 0..height {
        for x in 0..width {
            let v = surface.pixel(x, y);
            surface.set_pixel(x, y, v ^ mask);
        }
    }
}

/// QUIC 画像をデコード
///
/// `invers` なら全ビットを反転します。
pub fn decode_quic(
    coder: &mut dyn QuicCoder,
    data: &Chunks,
    descriptor: &ImageDescriptor,
    canvas: PixelFormat,
    want_original: bool,
    invers: bool,
) -> Result<Surface> {
    if data.count() == 0 {
        return Err(CommonError::protocol("QUIC: データがありません"));
    }
    let mut input = QuicInput::new(data);
    let (ty, width, height) = coder.begin(&mut input).map_err(|e| {
        warn!("QUIC のヘッダー解析に失敗しました: {}", e);
        e
    })?;
    let (as_type, format) = output_type(ty, canvas, want_original)?;

    if width != descriptor.width || height != descriptor.height {
        return Err(CommonError::protocol(format!(
            "QUIC: サイズが記述子と一致しません（{}x{} != {}x{}）",
            width, height, descriptor.width, descriptor.height
        )));
    }

    let mut surface = Surface::new(format, width as i32, height as i32)?;
    let stride = surface.stride();
    if let Err(e) = coder.decode(&mut input, as_type, surface.data_mut(), stride) {
        warn!("QUIC の展開に失敗しました: {}", e);
        return Err(e);
    }

    if invers {
        invert_pixels(&mut surface, 0xffff_ffff);
    }
    Ok(surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_display_rs_common::protocol::ImageFlags;

    /// 先頭語に幅と高さ、以降の語を画素値としてそのまま出力するコーダー
    struct PassThrough {
        ty: QuicImageType,
        chunks_seen: usize,
    }

    impl QuicCoder for PassThrough {
        fn begin(&mut self, input: &mut QuicInput<'_>) -> Result<(QuicImageType, u32, u32)> {
            let head = input.current();
            if head.len() < 8 {
                return Err(CommonError::protocol("ヘッダーが短すぎます"));
            }
            let w = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
            let h = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
            Ok((self.ty, w, h))
        }

        fn decode(
            &mut self,
            input: &mut QuicInput<'_>,
            _as_type: QuicImageType,
            dest: &mut [u8],
            _stride: usize,
        ) -> Result<()> {
            let mut words: Vec<u8> = input.current()[8..].to_vec();
            self.chunks_seen = 1;
            while let Some(more) = input.more_input() {
                words.extend_from_slice(more);
                self.chunks_seen += 1;
            }
            if words.len() < dest.len() {
                return Err(CommonError::protocol("入力が不足しています"));
            }
            dest.copy_from_slice(&words[..dest.len()]);
            Ok(())
        }
    }

    fn descriptor(w: u32, h: u32) -> ImageDescriptor {
        ImageDescriptor { id: 1, flags: ImageFlags(0), width: w, height: h }
    }

    fn stream(w: u32, h: u32, pixels: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&w.to_le_bytes());
        out.extend_from_slice(&h.to_le_bytes());
        for p in pixels {
            out.extend_from_slice(&p.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_multi_chunk_input() {
        // 2x2 の画素を3つのチャンクに分割
        let bytes = stream(2, 2, &[1, 2, 3, 4]);
        let chunks = Chunks::from_vec(vec![bytes[..12].to_vec(), bytes[12..16].to_vec(), bytes[16..].to_vec()]);
        let mut coder = PassThrough { ty: QuicImageType::Rgb32, chunks_seen: 0 };
        let surface = decode_quic(&mut coder, &chunks, &descriptor(2, 2), PixelFormat::X8R8G8B8, false, false)
            .expect("QUIC のデコードに失敗しました");
        assert_eq!(coder.chunks_seen, 3);
        assert_eq!(surface.format(), PixelFormat::X8R8G8B8);
        assert_eq!(surface.pixel(0, 0), 1);
        assert_eq!(surface.pixel(1, 1), 4);
    }

    #[test]
    fn test_invers_and_rgba() {
        let chunks = Chunks::single(stream(1, 1, &[0x8000_00ff]));
        let mut coder = PassThrough { ty: QuicImageType::Rgba, chunks_seen: 0 };
        let surface = decode_quic(&mut coder, &chunks, &descriptor(1, 1), PixelFormat::X8R8G8B8, false, true)
            .expect("QUIC のデコードに失敗しました");
        assert_eq!(surface.format(), PixelFormat::A8R8G8B8);
        assert_eq!(surface.pixel(0, 0), 0x7fff_ff00);
    }

    #[test]
    fn test_size_mismatch_is_protocol_error() {
        let chunks = Chunks::single(stream(1, 1, &[0]));
        let mut coder = PassThrough { ty: QuicImageType::Rgb32, chunks_seen: 0 };
        let err = decode_quic(&mut coder, &chunks, &descriptor(2, 1), PixelFormat::X8R8G8B8, false, false)
            .expect_err("サイズ不一致が検出されませんでした");
        assert!(matches!(err, CommonError::ProtocolError(_)));
    }

    #[test]
    fn test_rgb16_target_selection() {
        assert_eq!(
            output_type(QuicImageType::Rgb16, PixelFormat::X8R8G8B8, false).expect("種別の選択に失敗しました"),
            (QuicImageType::Rgb32, PixelFormat::X8R8G8B8)
        );
        assert_eq!(
            output_type(QuicImageType::Rgb16, PixelFormat::X8R8G8B8, true).expect("種別の選択に失敗しました"),
            (QuicImageType::Rgb16, PixelFormat::X1R5G5B5)
        );
        assert!(output_type(QuicImageType::Gray, PixelFormat::X8R8G8B8, false).is_err());
    }
}
