//! LZ 展開

use log::warn;

use super::{
    rgb555_to_rgb32, ByteReader, LzHeader, LzImageType, LZ_MAGIC, LZ_MAX_PIXELS, LZ_VERSION,
    MAX_COPY, MAX_DISTANCE,
};
use crate::error::{CommonError, Result};

/// 展開単位ごとの書き出し方
///
/// 圧縮ストリームの1単位を `SCALE` 個の出力画素に展開します。
/// 参照コピーは出力バッファ上で `COPY_FROM..COPY_TO` のバイトだけを複製します。
trait Unpack {
    const OUT_BYTES: usize;
    const LEN_BIAS: u32;
    const SCALE: usize = 1;
    const COPY_FROM: usize = 0;
    const COPY_TO: usize = Self::OUT_BYTES;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()>;
}

fn put_rgb32(out: &mut [u8], ent: u32) {
    out[0] = ent as u8;
    out[1] = (ent >> 8) as u8;
    out[2] = (ent >> 16) as u8;
    out[3] = 0;
}

/// パレットのインデックスをそのまま出力
struct PltBytes;

impl Unpack for PltBytes {
    const OUT_BYTES: usize = 1;
    const LEN_BIAS: u32 = 3;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        out[0] = input.read_u8()?;
        Ok(())
    }
}

struct Plt8ToRgb32<'p> {
    ents: &'p [u32],
}

impl Unpack for Plt8ToRgb32<'_> {
    const OUT_BYTES: usize = 4;
    const LEN_BIAS: u32 = 3;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        let index = input.read_u8()? as usize;
        let ent = self.ents.get(index).copied().ok_or_else(|| {
            CommonError::protocol(format!(
                "LZ: パレットインデックス {} が範囲外です（{} エントリ）",
                index,
                self.ents.len()
            ))
        })?;
        put_rgb32(out, ent);
        Ok(())
    }
}

struct Plt4ToRgb32<'p> {
    ents: &'p [u32],
    big_endian: bool,
}

impl Unpack for Plt4ToRgb32<'_> {
    const OUT_BYTES: usize = 4;
    const LEN_BIAS: u32 = 3;
    const SCALE: usize = 2;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        let byte = input.read_u8()? as usize;
        let (first, second) = if self.big_endian {
            ((byte >> 4) & 0x0f, byte & 0x0f)
        } else {
            (byte & 0x0f, (byte >> 4) & 0x0f)
        };
        // エントリ数で剰余を取る
        let n = self.ents.len();
        put_rgb32(&mut out[0..4], self.ents[first % n]);
        put_rgb32(&mut out[4..8], self.ents[second % n]);
        Ok(())
    }
}

struct Plt1ToRgb32 {
    fore: u32,
    back: u32,
    big_endian: bool,
}

impl Unpack for Plt1ToRgb32 {
    const OUT_BYTES: usize = 4;
    const LEN_BIAS: u32 = 3;
    const SCALE: usize = 8;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        let byte = input.read_u8()?;
        for i in 0..8 {
            let bit = if self.big_endian { 7 - i } else { i };
            let ent = if (byte >> bit) & 1 != 0 { self.fore } else { self.back };
            put_rgb32(&mut out[i * 4..i * 4 + 4], ent);
        }
        Ok(())
    }
}

struct Rgb16;

impl Unpack for Rgb16 {
    const OUT_BYTES: usize = 2;
    const LEN_BIAS: u32 = 2;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        let hi = input.read_u8()?;
        let lo = input.read_u8()?;
        out[0] = lo;
        out[1] = hi;
        Ok(())
    }
}

struct Rgb16ToRgb32;

impl Unpack for Rgb16ToRgb32 {
    const OUT_BYTES: usize = 4;
    const LEN_BIAS: u32 = 2;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        let hi = input.read_u8()? as u16;
        let lo = input.read_u8()? as u16;
        put_rgb32(out, rgb555_to_rgb32((hi << 8) | lo));
        Ok(())
    }
}

struct Rgb24;

impl Unpack for Rgb24 {
    const OUT_BYTES: usize = 3;
    const LEN_BIAS: u32 = 1;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        out[0] = input.read_u8()?;
        out[1] = input.read_u8()?;
        out[2] = input.read_u8()?;
        Ok(())
    }
}

struct Rgb32;

impl Unpack for Rgb32 {
    const OUT_BYTES: usize = 4;
    const LEN_BIAS: u32 = 1;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        out[0] = input.read_u8()?;
        out[1] = input.read_u8()?;
        out[2] = input.read_u8()?;
        out[3] = 0;
        Ok(())
    }
}

/// 32ビット画素のアルファバイトだけを書き換える
struct Alpha;

impl Unpack for Alpha {
    const OUT_BYTES: usize = 4;
    const LEN_BIAS: u32 = 3;
    const COPY_FROM: usize = 3;
    const COPY_TO: usize = 4;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        out[3] = input.read_u8()?;
        Ok(())
    }
}

struct A8ToRgb32;

impl Unpack for A8ToRgb32 {
    const OUT_BYTES: usize = 4;
    const LEN_BIAS: u32 = 3;

    fn literal(&self, input: &mut ByteReader<'_>, out: &mut [u8]) -> Result<()> {
        out[0] = 0;
        out[1] = 0;
        out[2] = 0;
        out[3] = input.read_u8()?;
        Ok(())
    }
}

/// 1ストリームを展開し、書き出した画素数を返す
fn decompress<U: Unpack>(
    unpack: &U,
    input: &mut ByteReader<'_>,
    out: &mut [u8],
    size: usize,
) -> Result<usize> {
    let px = U::OUT_BYTES;
    if out.len() < size * px {
        return Err(CommonError::InvalidParameterError(format!(
            "LZ: 出力バッファが不足しています（{} < {}）",
            out.len(),
            size * px
        )));
    }
    if size == 0 {
        return Ok(0);
    }

    let mut op = 0usize;
    let mut ctrl = input.read_u8()? as u32;

    loop {
        if ctrl >= MAX_COPY {
            let mut len = (ctrl >> 5) - 1;
            let mut ofs = (ctrl & 31) << 8;

            if len == 7 - 1 {
                loop {
                    let code = input.read_u8()? as u32;
                    len = len
                        .checked_add(code)
                        .ok_or_else(|| CommonError::protocol("LZ: 参照長が大きすぎます"))?;
                    if code != 255 {
                        break;
                    }
                }
            }
            let code = input.read_u8()? as u32;
            ofs += code;

            // 16ビット距離
            if code == 255 && ofs - code == 31 << 8 {
                ofs = (input.read_u8()? as u32) << 8;
                ofs += input.read_u8()? as u32;
                ofs += MAX_DISTANCE;
            }

            let len = len
                .checked_add(U::LEN_BIAS)
                .ok_or_else(|| CommonError::protocol("LZ: 参照長が大きすぎます"))?;
            let len = len as usize * U::SCALE;
            let ofs = (ofs + 1) as usize * U::SCALE;

            if ofs > op {
                return Err(CommonError::protocol(format!(
                    "LZ: 参照距離 {} が出力位置 {} を超えています",
                    ofs, op
                )));
            }
            if op + len > size {
                return Err(CommonError::protocol("LZ: 参照が出力サイズを超えています"));
            }

            // 重なりを許すため先頭から順にコピー
            let from = op - ofs;
            for i in 0..len {
                let src = (from + i) * px;
                let dst = (op + i) * px;
                out.copy_within(src + U::COPY_FROM..src + U::COPY_TO, dst + U::COPY_FROM);
            }
            op += len;
        } else {
            let count = ctrl as usize + 1;
            if op + count * U::SCALE > size {
                return Err(CommonError::protocol("LZ: リテラル列が出力サイズを超えています"));
            }
            for _ in 0..count {
                let start = op * px;
                unpack.literal(input, &mut out[start..start + px * U::SCALE])?;
                op += U::SCALE;
            }
        }

        if op >= size {
            break;
        }
        ctrl = input.read_u8()? as u32;
    }

    Ok(op)
}

/// LZ ストリームのデコーダ
///
/// [`LzDecoder::begin`] でヘッダーを読み、[`LzDecoder::decode`] で
/// 画素データを展開します。
pub struct LzDecoder<'a> {
    input: ByteReader<'a>,
    header: LzHeader,
    palette: Option<&'a [u32]>,
}

impl<'a> LzDecoder<'a> {
    /// ヘッダーを解析して展開を開始
    pub fn begin(data: &'a [u8], palette: Option<&'a [u32]>) -> Result<Self> {
        Self::begin_with_limit(data, palette, LZ_MAX_PIXELS)
    }

    /// 最大ピクセル数を指定して展開を開始
    pub fn begin_with_limit(
        data: &'a [u8],
        palette: Option<&'a [u32]>,
        max_pixels: u64,
    ) -> Result<Self> {
        let mut input = ByteReader::new(data);

        let magic = input.read_u32_be()?;
        if magic != LZ_MAGIC {
            return Err(CommonError::protocol(format!("LZ: マジックが不正です: {:#010x}", magic)));
        }
        let version = input.read_u32_be()?;
        if version != LZ_VERSION {
            return Err(CommonError::protocol(format!(
                "LZ: 未対応のバージョンです: {:#010x}",
                version
            )));
        }

        let image_type = LzImageType::from_u32(input.read_u32_be()?)?;
        let width = input.read_u32_be()?;
        let height = input.read_u32_be()?;
        let stride = input.read_u32_be()?;
        let top_down = input.read_u32_be()? != 0;

        let n_pixels = if image_type.is_plt() {
            stride as u64 * image_type.pixels_per_byte() as u64 * height as u64
        } else {
            width as u64 * height as u64
        };

        if n_pixels > max_pixels {
            return Err(CommonError::ResourceExhausted(format!(
                "LZ: 画素数 {} が上限 {} を超えています",
                n_pixels, max_pixels
            )));
        }

        Ok(Self {
            input,
            header: LzHeader {
                image_type,
                width,
                height,
                stride,
                top_down,
                n_pixels,
            },
            palette: if image_type.is_plt() { palette } else { None },
        })
    }

    /// ヘッダー情報
    pub fn header(&self) -> &LzHeader {
        &self.header
    }

    /// 指定した種別で `out` に展開
    ///
    /// `out` は [`LzHeader::output_size`] 以上のサイズが必要です。
    /// 失敗した場合 `out` はゼロで埋められます。
    pub fn decode(mut self, to_type: LzImageType, out: &mut [u8]) -> Result<()> {
        let result = self.decode_inner(to_type, out);
        if let Err(e) = &result {
            warn!("LZ の展開に失敗しました: {}", e);
            let len = self.header.output_size(to_type).min(out.len());
            out[..len].iter_mut().for_each(|b| *b = 0);
        }
        result
    }

    fn decode_inner(&mut self, to_type: LzImageType, out: &mut [u8]) -> Result<()> {
        let header = self.header;
        let from = header.image_type;
        let unsupported = || {
            CommonError::unsupported(format!("LZ: {:?} から {:?} への展開は未対応です", from, to_type))
        };

        let (size, out_size) = if from.is_plt() {
            if to_type == from {
                let size = header.height as usize * header.stride as usize;
                (size, decompress(&PltBytes, &mut self.input, out, size)?)
            } else if to_type == LzImageType::Rgb32 {
                let size = header.n_pixels as usize;
                let ents = self
                    .palette
                    .ok_or_else(|| CommonError::protocol("LZ: RGB32 への展開にパレットがありません"))?;
                if ents.is_empty() {
                    return Err(CommonError::protocol("LZ: パレットが空です"));
                }
                let written = match from {
                    LzImageType::Plt1Le | LzImageType::Plt1Be => {
                        if ents.len() < 2 {
                            return Err(CommonError::protocol(
                                "LZ: 1ビットパレットには2エントリ必要です",
                            ));
                        }
                        let unpack = Plt1ToRgb32 {
                            fore: ents[1],
                            back: ents[0],
                            big_endian: from == LzImageType::Plt1Be,
                        };
                        decompress(&unpack, &mut self.input, out, size)?
                    }
                    LzImageType::Plt4Le | LzImageType::Plt4Be => {
                        let unpack = Plt4ToRgb32 { ents, big_endian: from == LzImageType::Plt4Be };
                        decompress(&unpack, &mut self.input, out, size)?
                    }
                    _ => decompress(&Plt8ToRgb32 { ents }, &mut self.input, out, size)?,
                };
                (size, written)
            } else {
                return Err(unsupported());
            }
        } else {
            let size = header.n_pixels as usize;
            let input = &mut self.input;
            let written = match (from, to_type) {
                (LzImageType::Rgb16, LzImageType::Rgb16) => decompress(&Rgb16, input, out, size)?,
                (LzImageType::Rgb16, LzImageType::Rgb32) => {
                    decompress(&Rgb16ToRgb32, input, out, size)?
                }
                (LzImageType::Rgb24, LzImageType::Rgb24) => decompress(&Rgb24, input, out, size)?,
                (LzImageType::Rgb24, LzImageType::Rgb32)
                | (LzImageType::Rgb32, LzImageType::Rgb32) => decompress(&Rgb32, input, out, size)?,
                (LzImageType::Rgba, LzImageType::Rgba) => {
                    let written = decompress(&Rgb32, input, out, size)?;
                    let alpha = decompress(&Alpha, input, out, size)?;
                    if alpha != size {
                        return Err(CommonError::protocol("LZ: アルファストリームのサイズが不正です"));
                    }
                    written
                }
                (LzImageType::Xxxa, LzImageType::Xxxa) => decompress(&Alpha, input, out, size)?,
                (LzImageType::A8, LzImageType::A8) => decompress(&PltBytes, input, out, size)?,
                (LzImageType::A8, LzImageType::Rgb32) => decompress(&A8ToRgb32, input, out, size)?,
                _ => return Err(unsupported()),
            };
            (size, written)
        };

        if !self.input.is_at_end() {
            return Err(CommonError::protocol(format!(
                "LZ: 展開後に {} バイトの余剰データがあります",
                self.input.remaining()
            )));
        }
        if out_size != size {
            return Err(CommonError::protocol(format!(
                "LZ: 展開サイズが不正です（{} != {}）",
                out_size, size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lz::LzEncoder;

    fn header_bytes(ty: u32, width: u32, height: u32, stride: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for word in [LZ_MAGIC, LZ_VERSION, ty, width, height, stride, 1] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out
    }

    #[test]
    fn test_hand_built_run() {
        // 2x2 RGB32: リテラル1画素 + 距離1の参照3画素
        let mut data = header_bytes(8, 2, 2, 8);
        data.extend_from_slice(&[0x00, 0x10, 0x20, 0x30]);
        // 長さ 3 = (field - 1) + 1 → field = 3、距離 1 → d = 0
        data.extend_from_slice(&[3 << 5, 0x00]);

        let decoder = LzDecoder::begin(&data, None).expect("ヘッダーの解析に失敗しました");
        assert_eq!(decoder.header().n_pixels, 4);
        let mut out = vec![0u8; 16];
        decoder.decode(LzImageType::Rgb32, &mut out).expect("展開に失敗しました");
        for px in out.chunks(4) {
            assert_eq!(px, &[0x10, 0x20, 0x30, 0x00]);
        }
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut data = header_bytes(8, 1, 1, 4);
        data[0] = 0;
        assert!(matches!(LzDecoder::begin(&data, None), Err(CommonError::ProtocolError(_))));

        let mut data = header_bytes(8, 1, 1, 4);
        data[7] = 2;
        assert!(matches!(LzDecoder::begin(&data, None), Err(CommonError::ProtocolError(_))));
    }

    #[test]
    fn test_too_many_pixels() {
        let data = header_bytes(8, 1 << 13, 1 << 13, 1 << 15);
        assert!(matches!(
            LzDecoder::begin(&data, None),
            Err(CommonError::ResourceExhausted(_))
        ));
        let small = header_bytes(8, 4, 4, 16);
        assert!(matches!(
            LzDecoder::begin_with_limit(&small, None, 15),
            Err(CommonError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_truncated_and_trailing_data_zero_output() {
        let pixels: Vec<u8> = (0..16u8).flat_map(|i| [i, i * 2, i * 3, 0]).collect();
        let encoded = LzEncoder::new()
            .encode(LzImageType::Rgb32, 4, 4, 16, true, &pixels)
            .expect("圧縮に失敗しました");

        // 途中で切れたストリーム
        let truncated = &encoded[..encoded.len() - 2];
        let mut out = vec![0xaau8; 64];
        let decoder = LzDecoder::begin(truncated, None).expect("ヘッダーの解析に失敗しました");
        assert!(decoder.decode(LzImageType::Rgb32, &mut out).is_err());
        assert!(out.iter().all(|&b| b == 0));

        // 余剰データ
        let mut trailing = encoded.clone();
        trailing.push(0);
        let mut out = vec![0u8; 64];
        let decoder = LzDecoder::begin(&trailing, None).expect("ヘッダーの解析に失敗しました");
        assert!(matches!(
            decoder.decode(LzImageType::Rgb32, &mut out),
            Err(CommonError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_reference_before_start_rejected() {
        let mut data = header_bytes(8, 4, 1, 16);
        // 先頭で距離 2 の参照
        data.extend_from_slice(&[3 << 5, 0x01]);
        let mut out = vec![0u8; 16];
        let decoder = LzDecoder::begin(&data, None).expect("ヘッダーの解析に失敗しました");
        assert!(decoder.decode(LzImageType::Rgb32, &mut out).is_err());
    }

    #[test]
    fn test_oversized_reference_length_rejected() {
        // 長さの継続バイトを u32 を超えるまで並べる
        let mut data = header_bytes(8, 4, 1, 16);
        data.extend_from_slice(&[0x00, 0x10, 0x20, 0x30]);
        data.push(7 << 5);
        data.resize(data.len() + (u32::MAX / 255) as usize + 1, 0xff);
        data.extend_from_slice(&[0x00, 0x00]);

        let mut out = vec![0u8; 16];
        let decoder = LzDecoder::begin(&data, None).expect("ヘッダーの解析に失敗しました");
        assert!(matches!(
            decoder.decode(LzImageType::Rgb32, &mut out),
            Err(CommonError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_unsupported_target() {
        let pixels = vec![1u8; 16];
        let encoded = LzEncoder::new()
            .encode(LzImageType::A8, 4, 4, 4, true, &pixels)
            .expect("圧縮に失敗しました");
        let mut out = vec![0u8; 64];
        let decoder = LzDecoder::begin(&encoded, None).expect("ヘッダーの解析に失敗しました");
        assert!(matches!(
            decoder.decode(LzImageType::Rgb16, &mut out),
            Err(CommonError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_plt_to_rgb32_requires_palette() {
        let indexes = vec![0u8, 1, 1, 0];
        let encoded = LzEncoder::new()
            .encode(LzImageType::Plt8, 4, 1, 4, true, &indexes)
            .expect("圧縮に失敗しました");
        let mut out = vec![0u8; 16];
        let decoder = LzDecoder::begin(&encoded, None).expect("ヘッダーの解析に失敗しました");
        assert!(decoder.decode(LzImageType::Rgb32, &mut out).is_err());

        let ents = [0x0011_2233u32, 0x00aa_bbcc];
        let decoder = LzDecoder::begin(&encoded, Some(&ents[..])).expect("ヘッダーの解析に失敗しました");
        decoder.decode(LzImageType::Rgb32, &mut out).expect("展開に失敗しました");
        assert_eq!(&out[4..8], &[0xcc, 0xbb, 0xaa, 0x00]);
        assert_eq!(&out[0..4], &[0x33, 0x22, 0x11, 0x00]);
    }

    #[test]
    fn test_plt1_bit_orders() {
        // 1バイト = 8画素、0b1000_0001
        let encoded_be = LzEncoder::new()
            .encode(LzImageType::Plt1Be, 8, 1, 1, true, &[0x81])
            .expect("圧縮に失敗しました");
        let encoded_le = LzEncoder::new()
            .encode(LzImageType::Plt1Le, 8, 1, 1, true, &[0x03])
            .expect("圧縮に失敗しました");
        let ents = [0x0000_0000u32, 0x00ff_ffff];

        let mut out = vec![0u8; 32];
        LzDecoder::begin(&encoded_be, Some(&ents[..]))
            .expect("ヘッダーの解析に失敗しました")
            .decode(LzImageType::Rgb32, &mut out)
            .expect("展開に失敗しました");
        let lit: Vec<bool> = out.chunks(4).map(|p| p[0] == 0xff).collect();
        assert_eq!(lit, vec![true, false, false, false, false, false, false, true]);

        LzDecoder::begin(&encoded_le, Some(&ents[..]))
            .expect("ヘッダーの解析に失敗しました")
            .decode(LzImageType::Rgb32, &mut out)
            .expect("展開に失敗しました");
        let lit: Vec<bool> = out.chunks(4).map(|p| p[0] == 0xff).collect();
        assert_eq!(lit, vec![true, true, false, false, false, false, false, false]);
    }
}
