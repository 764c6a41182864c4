//! LZ 画像コーデック
//!
//! 辞書参照とランレングスを組み合わせた画像専用の圧縮形式です。
//! ストリームは7ワードのビッグエンディアンヘッダーに続いて、
//! 制御バイトで区切られたリテラル列と参照から構成されます。
//!
//! 展開結果の1画素は次のバイト列で表されます。
//!
//! | 種別 | バイト列 |
//! |------|----------|
//! | PLT* | パックされたインデックス（行あたり `stride` バイト） |
//! | RGB16 | `u16` リトルエンディアン（x1r5g5b5） |
//! | RGB24 | b, g, r |
//! | RGB32 | b, g, r, 0 |
//! | RGBA / XXXA | b, g, r, a |
//! | A8 | a |

mod decode;
mod encode;

pub use decode::LzDecoder;
pub use encode::LzEncoder;

use crate::error::{CommonError, Result};

/// ストリーム先頭のマジック（"LZ  "）
pub const LZ_MAGIC: u32 = 0x2020_5a4c;
/// 対応するストリームのバージョン
pub const LZ_VERSION: u32 = 0x0001_0001;
/// ヘッダーのバイト数
pub const LZ_HEADER_SIZE: usize = 7 * 4;
/// 展開を許容する最大ピクセル数
pub const LZ_MAX_PIXELS: u64 = 1 << 25;

/// リテラル列の最大長
pub(crate) const MAX_COPY: u32 = 32;
/// 近距離参照の最大距離
pub(crate) const MAX_DISTANCE: u32 = 8191;
/// 遠距離参照の最大距離
pub(crate) const MAX_FAR_DISTANCE: u32 = 65535 + MAX_DISTANCE - 1;

/// LZ ストリームの画像種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LzImageType {
    /// 1ビットパレット（LSB先頭）
    Plt1Le = 1,
    /// 1ビットパレット（MSB先頭）
    Plt1Be = 2,
    /// 4ビットパレット（下位ニブル先頭）
    Plt4Le = 3,
    /// 4ビットパレット（上位ニブル先頭）
    Plt4Be = 4,
    /// 8ビットパレット
    Plt8 = 5,
    /// 16ビット RGB555
    Rgb16 = 6,
    /// 24ビット RGB
    Rgb24 = 7,
    /// 32ビット RGB
    Rgb32 = 8,
    /// RGB32 + アルファストリーム
    Rgba = 9,
    /// アルファストリームのみ（32ビット画素のアルファに展開）
    Xxxa = 10,
    /// 8ビットアルファ
    A8 = 11,
}

impl LzImageType {
    /// ヘッダー値から変換
    pub fn from_u32(value: u32) -> Result<Self> {
        Ok(match value {
            1 => LzImageType::Plt1Le,
            2 => LzImageType::Plt1Be,
            3 => LzImageType::Plt4Le,
            4 => LzImageType::Plt4Be,
            5 => LzImageType::Plt8,
            6 => LzImageType::Rgb16,
            7 => LzImageType::Rgb24,
            8 => LzImageType::Rgb32,
            9 => LzImageType::Rgba,
            10 => LzImageType::Xxxa,
            11 => LzImageType::A8,
            other => {
                return Err(CommonError::protocol(format!("LZ: 未知の画像種別です: {}", other)))
            }
        })
    }

    /// パレット種別かどうか
    pub fn is_plt(&self) -> bool {
        matches!(
            self,
            LzImageType::Plt1Le
                | LzImageType::Plt1Be
                | LzImageType::Plt4Le
                | LzImageType::Plt4Be
                | LzImageType::Plt8
        )
    }

    /// 1バイトに含まれるパレット画素数（パレット種別以外は 0）
    pub fn pixels_per_byte(&self) -> u32 {
        match self {
            LzImageType::Plt1Le | LzImageType::Plt1Be => 8,
            LzImageType::Plt4Le | LzImageType::Plt4Be => 2,
            LzImageType::Plt8 => 1,
            _ => 0,
        }
    }

    /// 展開後の1画素のバイト数（パレット種別はバイト単位）
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            LzImageType::Plt1Le
            | LzImageType::Plt1Be
            | LzImageType::Plt4Le
            | LzImageType::Plt4Be
            | LzImageType::Plt8
            | LzImageType::A8 => 1,
            LzImageType::Rgb16 => 2,
            LzImageType::Rgb24 => 3,
            LzImageType::Rgb32 | LzImageType::Rgba | LzImageType::Xxxa => 4,
        }
    }

    /// 参照長の補正値（最小一致長）
    pub(crate) fn min_match(&self) -> u32 {
        match self {
            LzImageType::Rgb16 => 2,
            LzImageType::Rgb24 | LzImageType::Rgb32 => 1,
            _ => 3,
        }
    }
}

/// LZ ストリームのヘッダー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzHeader {
    /// 画像種別
    pub image_type: LzImageType,
    /// 幅
    pub width: u32,
    /// 高さ
    pub height: u32,
    /// 1行のバイト数
    pub stride: u32,
    /// 上から下の行順かどうか
    pub top_down: bool,
    /// 展開される画素数
    pub n_pixels: u64,
}

impl LzHeader {
    /// 指定した出力種別で必要なバッファサイズ
    pub fn output_size(&self, to_type: LzImageType) -> usize {
        if self.image_type.is_plt() && to_type == self.image_type {
            self.height as usize * self.stride as usize
        } else {
            self.n_pixels as usize * to_type.bytes_per_pixel()
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        for word in [
            LZ_MAGIC,
            LZ_VERSION,
            self.image_type as u32,
            self.width,
            self.height,
            self.stride,
            self.top_down as u32,
        ] {
            out.extend_from_slice(&word.to_be_bytes());
        }
    }
}

/// x1r5g5b5 を x8r8g8b8 に拡張
///
/// 上位ビットを下位に複製するため 0x1f は 0xff に対応します。
pub fn rgb555_to_rgb32(c: u16) -> u32 {
    let c = c as u32;
    (((c & 0x001f) << 3) | ((c & 0x001c) >> 2))
        | (((c & 0x03e0) << 6) | ((c & 0x0380) << 1))
        | (((c & 0x7c00) << 9) | ((c & 0x7000) << 4))
}

/// 入力バイト列の読み出し位置
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| CommonError::protocol("LZ: 入力データが途中で終了しました"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_u32_be(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | self.read_u8()? as u32;
        }
        Ok(value)
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb555_expand_full_domain() {
        // 全 65536 入力で各チャネルが上位ビット複製になること
        for c in 0..=u16::MAX {
            let v = rgb555_to_rgb32(c);
            let r5 = ((c >> 10) & 0x1f) as u32;
            let g5 = ((c >> 5) & 0x1f) as u32;
            let b5 = (c & 0x1f) as u32;
            let expand = |x: u32| (x << 3) | (x >> 2);
            assert_eq!(v, (expand(r5) << 16) | (expand(g5) << 8) | expand(b5), "c={:#06x}", c);
        }
        assert_eq!(rgb555_to_rgb32(0x7fff), 0x00ff_ffff);
    }

    #[test]
    fn test_type_tables() {
        assert_eq!(LzImageType::from_u32(9).expect("種別の変換に失敗しました"), LzImageType::Rgba);
        assert!(LzImageType::from_u32(0).is_err());
        assert!(LzImageType::from_u32(12).is_err());
        assert_eq!(LzImageType::Plt4Be.pixels_per_byte(), 2);
        assert_eq!(LzImageType::Rgb16.min_match(), 2);
        assert_eq!(LzImageType::Xxxa.bytes_per_pixel(), 4);
    }
}
