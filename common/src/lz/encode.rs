//! LZ 圧縮
//!
//! 3画素のハッシュで直前の出現位置を探し、見つかれば参照、
//! 直前画素と同じならランとして出力します。

use super::{LzHeader, LzImageType, LZ_MAX_PIXELS, MAX_COPY, MAX_DISTANCE, MAX_FAR_DISTANCE};
use crate::error::{CommonError, Result};

const HASH_LOG: u32 = 13;
const HASH_SIZE: usize = 1 << HASH_LOG;
const HASH_MASK: u32 = (1 << HASH_LOG) - 1;

/// 圧縮単位（1画素）の比較値と書き出し方
#[derive(Clone, Copy)]
enum UnitKind {
    /// 1バイト（パレット、A8、アルファ）
    Byte,
    /// RGB555（上位バイト、下位バイトの順）
    Rgb16,
    /// b, g, r
    Rgb,
}

impl UnitKind {
    fn emit(&self, unit: u32, out: &mut Vec<u8>) {
        match self {
            UnitKind::Byte => out.push(unit as u8),
            UnitKind::Rgb16 => {
                out.push((unit >> 8) as u8);
                out.push(unit as u8);
            }
            UnitKind::Rgb => {
                out.push(unit as u8);
                out.push((unit >> 8) as u8);
                out.push((unit >> 16) as u8);
            }
        }
    }
}

fn hash3(units: &[u32]) -> usize {
    let mut h: u32 = 5381;
    for &u in &units[..3] {
        h = (h << 5).wrapping_add(h) ^ u;
    }
    (h & HASH_MASK) as usize
}

/// LZ エンコーダ
pub struct LzEncoder {
    htab: Vec<usize>,
    max_pixels: u64,
}

impl Default for LzEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LzEncoder {
    /// 新しいエンコーダを作成
    pub fn new() -> Self {
        Self {
            htab: vec![usize::MAX; HASH_SIZE],
            max_pixels: LZ_MAX_PIXELS,
        }
    }

    /// 画像を圧縮してヘッダー付きのストリームを返す
    ///
    /// `data` はモジュール文書の画素レイアウトで `stride` バイトごとの行を
    /// 並べたものです。パレット種別では各行の `stride` バイトすべてが
    /// 圧縮対象になります。
    pub fn encode(
        &mut self,
        image_type: LzImageType,
        width: u32,
        height: u32,
        stride: u32,
        top_down: bool,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let bpp = image_type.bytes_per_pixel();
        let row_bytes = if image_type.is_plt() {
            stride as usize
        } else {
            width as usize * bpp
        };

        if (stride as usize) < row_bytes {
            return Err(CommonError::InvalidParameterError(format!(
                "LZ: stride {} が行のバイト数 {} より小さいです",
                stride, row_bytes
            )));
        }
        let needed = if height == 0 {
            0
        } else {
            (height as usize - 1) * stride as usize + row_bytes
        };
        if data.len() < needed {
            return Err(CommonError::InvalidParameterError(format!(
                "LZ: 入力データが不足しています（{} < {}）",
                data.len(),
                needed
            )));
        }

        let n_pixels = if image_type.is_plt() {
            stride as u64 * image_type.pixels_per_byte() as u64 * height as u64
        } else {
            width as u64 * height as u64
        };
        if n_pixels > self.max_pixels {
            return Err(CommonError::ResourceExhausted(format!(
                "LZ: 画素数 {} が上限 {} を超えています",
                n_pixels, self.max_pixels
            )));
        }

        let header = LzHeader {
            image_type,
            width,
            height,
            stride: if image_type.is_plt() { stride } else { row_bytes as u32 },
            top_down,
            n_pixels,
        };
        let mut out = Vec::with_capacity(needed / 2 + super::LZ_HEADER_SIZE);
        header.write(&mut out);

        let rows = (0..height as usize).map(|y| &data[y * stride as usize..y * stride as usize + row_bytes]);
        let pixels = |f: &dyn Fn(&[u8]) -> u32| -> Vec<u32> {
            rows.clone().flat_map(|row| row.chunks_exact(bpp).map(|p| f(p))).collect()
        };

        match image_type {
            LzImageType::Plt1Le
            | LzImageType::Plt1Be
            | LzImageType::Plt4Le
            | LzImageType::Plt4Be
            | LzImageType::Plt8
            | LzImageType::A8 => {
                let units = pixels(&|p| p[0] as u32);
                self.compress(&units, 3, UnitKind::Byte, &mut out);
            }
            LzImageType::Rgb16 => {
                let units = pixels(&|p| u16::from_le_bytes([p[0], p[1]]) as u32);
                self.compress(&units, 2, UnitKind::Rgb16, &mut out);
            }
            LzImageType::Rgb24 | LzImageType::Rgb32 => {
                let units = pixels(&|p| u32::from_le_bytes([p[0], p[1], p[2], 0]));
                self.compress(&units, 1, UnitKind::Rgb, &mut out);
            }
            LzImageType::Rgba => {
                let units = pixels(&|p| u32::from_le_bytes([p[0], p[1], p[2], 0]));
                self.compress(&units, 1, UnitKind::Rgb, &mut out);
                let alpha = pixels(&|p| p[3] as u32);
                self.compress(&alpha, 3, UnitKind::Byte, &mut out);
            }
            LzImageType::Xxxa => {
                let alpha = pixels(&|p| p[3] as u32);
                self.compress(&alpha, 3, UnitKind::Byte, &mut out);
            }
        }

        Ok(out)
    }

    fn compress(&mut self, units: &[u32], min_match: usize, kind: UnitKind, out: &mut Vec<u8>) {
        self.htab.iter_mut().for_each(|slot| *slot = usize::MAX);

        let n = units.len();
        let match_len = |r: usize, i: usize| {
            let mut k = 0;
            while i + k < n && units[r + k] == units[i + k] {
                k += 1;
            }
            k
        };

        let mut literal_start = 0;
        let mut i = 0;
        while i < n {
            let mut best = (0usize, 0usize);

            // ラン（距離1）
            if i > 0 {
                let len = match_len(i - 1, i);
                if len >= min_match {
                    best = (len, 1);
                }
            }

            if i + 3 <= n {
                let h = hash3(&units[i..]);
                let candidate = self.htab[h];
                self.htab[h] = i;
                if candidate != usize::MAX && candidate < i {
                    let distance = i - candidate;
                    if distance <= MAX_FAR_DISTANCE as usize {
                        let len = match_len(candidate, i);
                        if len >= min_match && len > best.0 {
                            best = (len, distance);
                        }
                    }
                }
            }

            if best.0 > 0 {
                emit_literals(&units[literal_start..i], kind, out);
                emit_match(best.0, best.1, min_match, out);
                i += best.0;
                literal_start = i;
            } else {
                i += 1;
            }
        }
        emit_literals(&units[literal_start..n], kind, out);
    }
}

fn emit_literals(units: &[u32], kind: UnitKind, out: &mut Vec<u8>) {
    for run in units.chunks(MAX_COPY as usize) {
        out.push((run.len() - 1) as u8);
        for &unit in run {
            kind.emit(unit, out);
        }
    }
}

fn emit_match(len: usize, distance: usize, min_match: usize, out: &mut Vec<u8>) {
    // 長さフィールドは最小一致長を引いて 1 始まり
    let field = len - min_match + 1;
    let d = (distance - 1) as u32;
    let (head, extra) = if field < 7 { (field, None) } else { (7, Some(field - 7)) };

    let push_extra = |out: &mut Vec<u8>| {
        if let Some(mut rest) = extra {
            while rest >= 255 {
                out.push(255);
                rest -= 255;
            }
            out.push(rest as u8);
        }
    };

    if d < MAX_DISTANCE {
        out.push(((head as u32) << 5 | (d >> 8)) as u8);
        push_extra(out);
        out.push((d & 255) as u8);
    } else {
        let far = d - MAX_DISTANCE;
        out.push(((head as u32) << 5 | 31) as u8);
        push_extra(out);
        out.push(255);
        out.push((far >> 8) as u8);
        out.push((far & 255) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lz::LzDecoder;

    /// 疑似乱数（線形合同法）
    fn noise(seed: u32, len: usize) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (state >> 16) as u8
            })
            .collect()
    }

    fn round_trip(ty: LzImageType, width: u32, height: u32, stride: u32, data: &[u8]) -> Vec<u8> {
        let encoded = LzEncoder::new()
            .encode(ty, width, height, stride, false, data)
            .expect("圧縮に失敗しました");
        let decoder = LzDecoder::begin(&encoded, None).expect("ヘッダーの解析に失敗しました");
        assert!(!decoder.header().top_down);
        let mut out = vec![0u8; decoder.header().output_size(ty)];
        decoder.decode(ty, &mut out).expect("展開に失敗しました");
        out
    }

    /// 各種パターンの画素列（1画素 `bpp` バイト）
    fn patterns(bpp: usize, width: usize, height: usize) -> Vec<Vec<u8>> {
        let n = width * height;
        let solid = vec![0x5au8; n * bpp];
        let checker: Vec<u8> = (0..n)
            .flat_map(|i| {
                let on = ((i % width) + (i / width)) % 2 == 0;
                vec![if on { 0xff } else { 0x10 }; bpp]
            })
            .collect();
        let stripes: Vec<u8> = (0..n)
            .flat_map(|i| vec![if i % 2 == 0 { 0x00 } else { 0x7f }; bpp])
            .collect();
        vec![solid, checker, stripes, noise(7, n * bpp)]
    }

    #[test]
    fn test_rgb32_distinct_4x4() {
        let pixels: Vec<u8> = (0..16u8).flat_map(|i| [i * 3, i * 5 + 1, i * 7 + 2, 0]).collect();
        assert_eq!(round_trip(LzImageType::Rgb32, 4, 4, 16, &pixels), pixels);
    }

    #[test]
    fn test_round_trip_all_types() {
        for &(w, h) in &[(1usize, 1usize), (3, 2), (64, 17)] {
            for data in patterns(4, w, h) {
                // RGB32 はパディングが 0 で復元される
                let rgb32: Vec<u8> = data
                    .chunks(4)
                    .flat_map(|p| [p[0], p[1], p[2], 0])
                    .collect();
                let stride = (w * 4) as u32;
                assert_eq!(round_trip(LzImageType::Rgb32, w as u32, h as u32, stride, &rgb32), rgb32);
                assert_eq!(round_trip(LzImageType::Rgba, w as u32, h as u32, stride, &data), data);

                let xxxa = round_trip(LzImageType::Xxxa, w as u32, h as u32, stride, &data);
                for (a, b) in xxxa.chunks(4).zip(data.chunks(4)) {
                    assert_eq!(a[3], b[3]);
                }
            }
            for data in patterns(3, w, h) {
                let stride = (w * 3) as u32;
                assert_eq!(round_trip(LzImageType::Rgb24, w as u32, h as u32, stride, &data), data);
            }
            for data in patterns(2, w, h) {
                // 最上位ビットは使われない
                let rgb16: Vec<u8> = data.chunks(2).flat_map(|p| [p[0], p[1] & 0x7f]).collect();
                let stride = (w * 2) as u32;
                assert_eq!(round_trip(LzImageType::Rgb16, w as u32, h as u32, stride, &rgb16), rgb16);
            }
            for data in patterns(1, w, h) {
                let stride = w as u32;
                assert_eq!(round_trip(LzImageType::A8, w as u32, h as u32, stride, &data), data);
                assert_eq!(round_trip(LzImageType::Plt8, w as u32, h as u32, stride, &data), data);
                assert_eq!(round_trip(LzImageType::Plt4Be, w as u32 * 2, h as u32, stride, &data), data);
                assert_eq!(round_trip(LzImageType::Plt1Le, w as u32 * 8, h as u32, stride, &data), data);
            }
        }
    }

    #[test]
    fn test_long_runs_and_far_references() {
        // 長いラン（拡張長バイト）と 8191 画素以上離れた参照
        let mut data = vec![0u8; 600];
        data.extend(noise(3, 9000));
        let tail: Vec<u8> = data[600..700].to_vec();
        data.extend_from_slice(&tail);
        let w = data.len() as u32;
        assert_eq!(round_trip(LzImageType::A8, w, 1, w, &data), data);

        let encoded = LzEncoder::new()
            .encode(LzImageType::A8, w, 1, w, false, &data)
            .expect("圧縮に失敗しました");
        assert!(encoded.len() < data.len());
    }

    #[test]
    fn test_rgb16_to_rgb32_upgrade() {
        let pixels: Vec<u8> = [0x7fffu16, 0x0000, 0x7c00, 0x001f]
            .iter()
            .flat_map(|p| p.to_le_bytes())
            .collect();
        let encoded = LzEncoder::new()
            .encode(LzImageType::Rgb16, 4, 1, 8, true, &pixels)
            .expect("圧縮に失敗しました");
        let decoder = LzDecoder::begin(&encoded, None).expect("ヘッダーの解析に失敗しました");
        let mut out = vec![0u8; decoder.header().output_size(LzImageType::Rgb32)];
        decoder.decode(LzImageType::Rgb32, &mut out).expect("展開に失敗しました");
        let words: Vec<u32> = out
            .chunks(4)
            .map(|p| u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
            .collect();
        assert_eq!(words, vec![0x00ff_ffff, 0, 0x00ff_0000, 0x0000_00ff]);
    }

    #[test]
    fn test_short_input_rejected() {
        let result = LzEncoder::new().encode(LzImageType::Rgb32, 4, 4, 16, true, &[0u8; 10]);
        assert!(matches!(result, Err(CommonError::InvalidParameterError(_))));
    }
}
