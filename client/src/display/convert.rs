//! ピクセル形式とパレットの変換
//!
//! ワイヤ上のビットマップ形式をキャンバスの作業形式に変換します。
//! 異なる形式間の変換はすべて a8r8g8b8 を経由します。

use remote_display_rs_common::lz::rgb555_to_rgb32;
use remote_display_rs_common::protocol::{Bitmap, BitmapFormat};
use remote_display_rs_common::{CommonError, Result};

use super::surface::{PixelFormat, Surface};

/// x8r8g8b8 を x1r5g5b5 に縮める
pub fn rgb32_to_555(c: u32) -> u16 {
    (((c >> 3) & 0x001f) | ((c >> 6) & 0x03e0) | ((c >> 9) & 0x7c00)) as u16
}

/// x8r8g8b8 を r5g6b5 に縮める
pub fn rgb32_to_565(c: u32) -> u16 {
    (((c >> 3) & 0x001f) | ((c >> 5) & 0x07e0) | ((c >> 8) & 0xf800)) as u16
}

/// r5g6b5 を x8r8g8b8 に拡張（上位ビットを下位に複製）
pub fn rgb565_to_rgb32(c: u16) -> u32 {
    let s = c as u32;
    (((s << 3) & 0xf8) | ((s >> 2) & 0x7))
        | (((s << 5) & 0xfc00) | ((s >> 1) & 0x300))
        | (((s << 8) & 0xf8_0000) | ((s << 3) & 0x7_0000))
}

/// 生の画素値を a8r8g8b8 に変換
pub fn to_argb(format: PixelFormat, value: u32) -> u32 {
    match format {
        PixelFormat::A1 => {
            if value & 1 != 0 {
                0xff00_0000
            } else {
                0
            }
        }
        PixelFormat::A8 => (value & 0xff) << 24,
        PixelFormat::X1R5G5B5 => 0xff00_0000 | rgb555_to_rgb32(value as u16),
        PixelFormat::R5G6B5 => 0xff00_0000 | rgb565_to_rgb32(value as u16),
        PixelFormat::X8R8G8B8 => 0xff00_0000 | value,
        PixelFormat::A8R8G8B8 => value,
    }
}

/// a8r8g8b8 を生の画素値に変換
pub fn from_argb(format: PixelFormat, argb: u32) -> u32 {
    match format {
        PixelFormat::A1 => argb >> 31,
        PixelFormat::A8 => argb >> 24,
        PixelFormat::X1R5G5B5 => rgb32_to_555(argb) as u32,
        PixelFormat::R5G6B5 => rgb32_to_565(argb) as u32,
        PixelFormat::X8R8G8B8 => argb & 0x00ff_ffff,
        PixelFormat::A8R8G8B8 => argb,
    }
}

/// デコード結果の目標形式を選ぶ
///
/// アルファを持つ画像はアルファ付きの形式、持たない画像は不透明形式に揃えます。
pub fn target_format(canvas: PixelFormat, has_alpha: bool) -> PixelFormat {
    match (canvas, has_alpha) {
        (PixelFormat::X8R8G8B8, true) => PixelFormat::A8R8G8B8,
        (PixelFormat::A8R8G8B8, false) => PixelFormat::X8R8G8B8,
        (other, _) => other,
    }
}

/// ビットマップ形式をそのまま表せるサーフェス形式
///
/// パレット形式はキャンバスの深さで展開します（32ビットキャンバスでは x8r8g8b8）。
pub fn native_format(format: BitmapFormat, canvas: PixelFormat) -> Result<PixelFormat> {
    Ok(match format {
        BitmapFormat::OneBitLe
        | BitmapFormat::OneBitBe
        | BitmapFormat::FourBitLe
        | BitmapFormat::FourBitBe
        | BitmapFormat::EightBit => canvas.opaque(),
        BitmapFormat::SixteenBit => PixelFormat::X1R5G5B5,
        BitmapFormat::TwentyFourBit | BitmapFormat::ThirtyTwoBit => PixelFormat::X8R8G8B8,
        BitmapFormat::Rgba => PixelFormat::A8R8G8B8,
        BitmapFormat::EightBitA => PixelFormat::A8,
        BitmapFormat::Invalid => {
            return Err(CommonError::protocol("ビットマップ形式が無効です"));
        }
    })
}

/// パレットをキャンバスの深さに合わせて変換
///
/// 32ビットキャンバスではそのまま、x1r5g5b5 キャンバスでは各エントリを
/// 555 に縮めます。r5g6b5 キャンバスでのパレットは扱えません。
pub fn localize_palette(ents: &[u32], canvas: PixelFormat) -> Result<Vec<u32>> {
    match canvas {
        PixelFormat::X8R8G8B8 | PixelFormat::A8R8G8B8 => Ok(ents.to_vec()),
        PixelFormat::X1R5G5B5 => Ok(ents.iter().map(|&e| rgb32_to_555(e) as u32).collect()),
        other => Err(CommonError::unsupported(format!(
            "{:?} キャンバスではパレット画像を扱えません",
            other
        ))),
    }
}

/// サーフェスを別の形式に変換
///
/// 同じ形式ならバイト単位でそのまま複製します。
pub fn convert_surface(src: &Surface, format: PixelFormat) -> Result<Surface> {
    if src.format() == format {
        return Ok(src.clone());
    }
    let mut out = Surface::new(format, src.width(), src.height())?;
    for y in 0..src.height() {
        for x in 0..src.width() {
            out.set_argb(x, y, src.argb(x, y));
        }
    }
    Ok(out)
}

/// 非圧縮ビットマップをサーフェスに変換
///
/// `want_original` ならビットマップをそのまま表せる形式で、そうでなければ
/// キャンバス向けの目標形式で返します。`palette` はワイヤ上の 0x00RRGGBB です。
pub fn bitmap_to_surface(
    bitmap: &Bitmap,
    palette: Option<&[u32]>,
    want_original: bool,
    canvas: PixelFormat,
) -> Result<Surface> {
    let native = native_format(bitmap.format, canvas)?;
    let format = if want_original {
        native
    } else {
        target_format(canvas, bitmap.format == BitmapFormat::Rgba)
    };

    let width = bitmap.width as usize;
    let height = bitmap.height as usize;
    let stride = bitmap.stride as usize;
    let row_bytes = (width * bitmap.format.bits_per_pixel() as usize + 7) / 8;
    if stride < row_bytes {
        return Err(CommonError::protocol(format!(
            "ビットマップの stride {} が行のバイト数 {} より小さいです",
            stride, row_bytes
        )));
    }

    // 複数チャンクは連結してから読む
    let data = bitmap.data.linearize();
    let needed = if height == 0 { 0 } else { (height - 1) * stride + row_bytes };
    if data.len() < needed {
        return Err(CommonError::protocol(format!(
            "ビットマップのデータが不足しています（{} < {}）",
            data.len(),
            needed
        )));
    }

    let ents = if bitmap.format.is_palette() {
        let raw = palette.ok_or_else(|| CommonError::protocol("パレット画像にパレットがありません"))?;
        Some(localize_palette(raw, native)?)
    } else {
        None
    };
    let lookup = |index: usize| -> Result<u32> {
        match &ents {
            Some(e) => e.get(index).copied().ok_or_else(|| {
                CommonError::protocol(format!(
                    "パレットインデックス {} が範囲外です（{} エントリ）",
                    index,
                    e.len()
                ))
            }),
            None => Ok(0),
        }
    };

    let mut surface = Surface::new(native, bitmap.width as i32, bitmap.height as i32)?;
    for y in 0..height {
        let src_y = if bitmap.flags.top_down() { y } else { height - 1 - y };
        let src = &data[src_y * stride..src_y * stride + row_bytes];
        let dy = y as i32;
        match bitmap.format {
            BitmapFormat::ThirtyTwoBit
            | BitmapFormat::Rgba
            | BitmapFormat::SixteenBit
            | BitmapFormat::EightBitA => {
                surface.row_mut(dy)[..row_bytes].copy_from_slice(src);
            }
            BitmapFormat::TwentyFourBit => {
                for (x, px) in src.chunks_exact(3).enumerate() {
                    let v = px[0] as u32 | (px[1] as u32) << 8 | (px[2] as u32) << 16;
                    surface.set_pixel(x as i32, dy, v);
                }
            }
            BitmapFormat::EightBit => {
                for (x, &index) in src.iter().enumerate() {
                    surface.set_pixel(x as i32, dy, lookup(index as usize)?);
                }
            }
            BitmapFormat::FourBitBe | BitmapFormat::FourBitLe => {
                let high_first = bitmap.format == BitmapFormat::FourBitBe;
                for x in 0..width {
                    let byte = src[x / 2];
                    let index = if (x & 1 == 0) == high_first { byte >> 4 } else { byte & 0x0f };
                    surface.set_pixel(x as i32, dy, lookup(index as usize)?);
                }
            }
            BitmapFormat::OneBitBe | BitmapFormat::OneBitLe => {
                for x in 0..width {
                    let mask = if bitmap.format == BitmapFormat::OneBitBe {
                        0x80 >> (x & 7)
                    } else {
                        1 << (x & 7)
                    };
                    let index = (src[x / 8] & mask != 0) as usize;
                    surface.set_pixel(x as i32, dy, lookup(index)?);
                }
            }
            BitmapFormat::Invalid => {
                return Err(CommonError::protocol("ビットマップ形式が無効です"));
            }
        }
    }

    if format == native {
        Ok(surface)
    } else {
        convert_surface(&surface, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_display_rs_common::protocol::{BitmapFlags, Chunks};

    fn bitmap(format: BitmapFormat, width: u32, height: u32, stride: u32, data: Vec<u8>) -> Bitmap {
        Bitmap {
            format,
            flags: BitmapFlags(BitmapFlags::TOP_DOWN),
            width,
            height,
            stride,
            palette: None,
            palette_id: 0,
            data: Chunks::single(data),
        }
    }

    #[test]
    fn test_565_expand_full_domain() {
        // 全 65536 入力で上位ビット複製になり、縮めると元に戻ること
        for c in 0..=u16::MAX {
            let v = rgb565_to_rgb32(c);
            let r5 = ((c >> 11) & 0x1f) as u32;
            let g6 = ((c >> 5) & 0x3f) as u32;
            let b5 = (c & 0x1f) as u32;
            let expected = (((r5 << 3) | (r5 >> 2)) << 16)
                | (((g6 << 2) | (g6 >> 4)) << 8)
                | ((b5 << 3) | (b5 >> 2));
            assert_eq!(v, expected, "c={:#06x}", c);
            assert_eq!(rgb32_to_565(v), c);
        }
    }

    #[test]
    fn test_555_shrink_round_trip() {
        for c in 0..0x8000u16 {
            assert_eq!(rgb32_to_555(rgb555_to_rgb32(c)), c);
        }
    }

    #[test]
    fn test_target_format_selection() {
        assert_eq!(target_format(PixelFormat::X8R8G8B8, true), PixelFormat::A8R8G8B8);
        assert_eq!(target_format(PixelFormat::A8R8G8B8, false), PixelFormat::X8R8G8B8);
        assert_eq!(target_format(PixelFormat::X1R5G5B5, true), PixelFormat::X1R5G5B5);
    }

    #[test]
    fn test_palette_bitmap_on_555_canvas() {
        // 2エントリのパレットで 555 キャンバスへ変換
        let bm = bitmap(BitmapFormat::EightBit, 2, 1, 4, vec![0, 1, 0, 0]);
        let palette = [0xFF00_0000u32, 0x00FF_FFFF];
        let s = bitmap_to_surface(&bm, Some(&palette), false, PixelFormat::X1R5G5B5)
            .expect("変換に失敗しました");
        assert_eq!(s.format(), PixelFormat::X1R5G5B5);
        assert_eq!(s.pixel(0, 0), 0);
        assert_eq!(s.pixel(1, 0), 0x7fff);

        // エントリ数は保たれる
        let local = localize_palette(&palette, PixelFormat::X1R5G5B5).expect("変換に失敗しました");
        assert_eq!(local.len(), palette.len());
        assert!(localize_palette(&palette, PixelFormat::R5G6B5).is_err());
    }

    #[test]
    fn test_native_format_is_byte_identical() {
        let data: Vec<u8> = (0..32).collect();
        let bm = bitmap(BitmapFormat::ThirtyTwoBit, 2, 4, 8, data.clone());
        let s = bitmap_to_surface(&bm, None, true, PixelFormat::X8R8G8B8).expect("変換に失敗しました");
        assert_eq!(s.data(), &data[..]);

        let again = convert_surface(&s, PixelFormat::X8R8G8B8).expect("変換に失敗しました");
        assert_eq!(again, s);
    }

    #[test]
    fn test_bottom_up_and_bit_orders() {
        // 1ビット BE: 0b1000_0000 は x=0 が前景
        let mut bm = bitmap(BitmapFormat::OneBitBe, 8, 2, 4, vec![0x80, 0, 0, 0, 0x01, 0, 0, 0]);
        bm.flags = BitmapFlags(0);
        let palette = [0x000000u32, 0xffffff];
        let s = bitmap_to_surface(&bm, Some(&palette), false, PixelFormat::X8R8G8B8)
            .expect("変換に失敗しました");
        // 下から上の行順なので2行目のデータが先頭行
        assert_eq!(s.pixel(7, 0), 0xffffff);
        assert_eq!(s.pixel(0, 1), 0xffffff);
        assert_eq!(s.pixel(0, 0), 0);

        let bm = bitmap(BitmapFormat::OneBitLe, 8, 1, 4, vec![0x80, 0, 0, 0]);
        let s = bitmap_to_surface(&bm, Some(&palette), false, PixelFormat::X8R8G8B8)
            .expect("変換に失敗しました");
        assert_eq!(s.pixel(7, 0), 0xffffff);

        let bm = bitmap(BitmapFormat::FourBitLe, 2, 1, 4, vec![0x21, 0, 0, 0]);
        let palette = [0u32, 0x11, 0x22];
        let s = bitmap_to_surface(&bm, Some(&palette), false, PixelFormat::X8R8G8B8)
            .expect("変換に失敗しました");
        assert_eq!((s.pixel(0, 0), s.pixel(1, 0)), (0x11, 0x22));
    }

    #[test]
    fn test_24bit_and_16bit_to_565_canvas() {
        let bm = bitmap(BitmapFormat::TwentyFourBit, 1, 1, 4, vec![0x00, 0x00, 0xff, 0]);
        let s = bitmap_to_surface(&bm, None, false, PixelFormat::R5G6B5).expect("変換に失敗しました");
        assert_eq!(s.pixel(0, 0), 0xf800);

        let bm = bitmap(BitmapFormat::SixteenBit, 1, 1, 4, vec![0xe0, 0x03, 0, 0]);
        let s = bitmap_to_surface(&bm, None, false, PixelFormat::R5G6B5).expect("変換に失敗しました");
        assert_eq!(s.pixel(0, 0), 0x07e0);
    }

    #[test]
    fn test_rgba_keeps_alpha() {
        let bm = bitmap(BitmapFormat::Rgba, 1, 1, 4, vec![1, 2, 3, 0x80]);
        let s = bitmap_to_surface(&bm, None, false, PixelFormat::X8R8G8B8).expect("変換に失敗しました");
        assert_eq!(s.format(), PixelFormat::A8R8G8B8);
        assert_eq!(s.pixel(0, 0), 0x8003_0201);
    }

    #[test]
    fn test_palette_index_out_of_range() {
        // 2エントリのパレットをインデックス 5 で参照する
        let bm = bitmap(BitmapFormat::EightBit, 2, 1, 4, vec![1, 5, 0, 0]);
        let palette = [0u32, 0x00ff_ffff];
        let err = bitmap_to_surface(&bm, Some(&palette), false, PixelFormat::X8R8G8B8)
            .expect_err("範囲外のインデックスが受理されました");
        assert!(matches!(err, CommonError::ProtocolError(_)));

        // 1ビット画像も2エントリ目が必要
        let bm = bitmap(BitmapFormat::OneBitLe, 1, 1, 4, vec![0x01, 0, 0, 0]);
        let palette = [0u32];
        assert!(bitmap_to_surface(&bm, Some(&palette), false, PixelFormat::X8R8G8B8).is_err());
    }

    #[test]
    fn test_short_data_rejected() {
        let bm = bitmap(BitmapFormat::ThirtyTwoBit, 2, 2, 8, vec![0; 12]);
        assert!(bitmap_to_surface(&bm, None, false, PixelFormat::X8R8G8B8).is_err());
    }
}
