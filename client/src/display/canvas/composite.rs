//! Porter-Duff 合成
//!
//! ソース・マスク・描画先の3項モデルで合成します。画素は乗算済みの
//! a8r8g8b8 として扱い、ソースとマスクは変換行列、フィルタ、繰り返し
//! 指定に従って標本化します。

use remote_display_rs_common::protocol::Transform;
use remote_display_rs_common::{CommonError, Result};

use super::blit::Filter;
use crate::display::surface::{PixelFormat, Surface};

/// 合成演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Clear,
    Src,
    Dst,
    Over,
    OverReverse,
    In,
    InReverse,
    Out,
    OutReverse,
    Atop,
    AtopReverse,
    Xor,
    Add,
    Saturate,
}

impl Operator {
    /// ワイヤ上のコードから変換
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Operator::Clear,
            1 => Operator::Src,
            2 => Operator::Dst,
            3 => Operator::Over,
            4 => Operator::OverReverse,
            5 => Operator::In,
            6 => Operator::InReverse,
            7 => Operator::Out,
            8 => Operator::OutReverse,
            9 => Operator::Atop,
            10 => Operator::AtopReverse,
            11 => Operator::Xor,
            12 => Operator::Add,
            13 => Operator::Saturate,
            other => {
                return Err(CommonError::unsupported(format!("未対応の合成演算子です: {}", other)))
            }
        })
    }

    /// ソースと描画先に掛ける係数（0..=255）
    fn factors(self, sa: u32, da: u32) -> (u32, u32) {
        match self {
            Operator::Clear => (0, 0),
            Operator::Src => (255, 0),
            Operator::Dst => (0, 255),
            Operator::Over => (255, 255 - sa),
            Operator::OverReverse => (255 - da, 255),
            Operator::In => (da, 0),
            Operator::InReverse => (0, sa),
            Operator::Out => (255 - da, 0),
            Operator::OutReverse => (0, 255 - sa),
            Operator::Atop => (da, 255 - sa),
            Operator::AtopReverse => (255 - da, sa),
            Operator::Xor => (255 - da, 255 - sa),
            Operator::Add => (255, 255),
            Operator::Saturate => {
                let fa = if sa == 0 { 255 } else { ((255 - da) * 255 / sa).min(255) };
                (fa, 255)
            }
        }
    }
}

/// フィルタコードを変換（FAST と NEAREST は最近傍、それ以外は双線形）
pub fn filter_from_code(code: u8) -> Result<Filter> {
    match code {
        0 | 3 => Ok(Filter::Nearest),
        1 | 2 | 4 => Ok(Filter::Bilinear),
        other => Err(CommonError::unsupported(format!("未対応のフィルタです: {}", other))),
    }
}

/// 範囲外の標本化方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// 透明
    None,
    /// 繰り返し
    Normal,
    /// 端の画素を延長
    Pad,
    /// 折り返し
    Reflect,
}

impl Repeat {
    /// ワイヤ上のコードから変換
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Repeat::None,
            1 => Repeat::Normal,
            2 => Repeat::Pad,
            3 => Repeat::Reflect,
            other => {
                return Err(CommonError::unsupported(format!("未対応の繰り返し指定です: {}", other)))
            }
        })
    }

    /// 座標を `0..size` に写す（範囲外で透明なら `None`）
    fn resolve(self, v: i32, size: i32) -> Option<i32> {
        match self {
            Repeat::None => (0..size).contains(&v).then_some(v),
            Repeat::Normal => Some(v.rem_euclid(size)),
            Repeat::Pad => Some(v.clamp(0, size - 1)),
            Repeat::Reflect => {
                let m = v.rem_euclid(size * 2);
                Some(if m >= size { size * 2 - 1 - m } else { m })
            }
        }
    }
}

fn fixed(v: u32) -> f64 {
    v as i32 as f64 / 65536.0
}

/// 合成の入力（ソースまたはマスク）
pub struct Layer<'a> {
    /// 画像
    pub surface: &'a Surface,
    /// 変換行列（16.16 固定小数点）
    pub transform: Option<Transform>,
    /// フィルタ
    pub filter: Filter,
    /// 繰り返し
    pub repeat: Repeat,
}

impl<'a> Layer<'a> {
    /// 変換なし・最近傍・繰り返しなしの入力
    pub fn new(surface: &'a Surface) -> Self {
        Self { surface, transform: None, filter: Filter::Nearest, repeat: Repeat::None }
    }

    fn texel(&self, x: i32, y: i32) -> u32 {
        let (w, h) = (self.surface.width(), self.surface.height());
        if w <= 0 || h <= 0 {
            return 0;
        }
        match (self.repeat.resolve(x, w), self.repeat.resolve(y, h)) {
            (Some(x), Some(y)) => self.surface.argb(x, y),
            _ => 0,
        }
    }

    /// 画素 `(x, y)` の中心を標本化して乗算済み a8r8g8b8 を返す
    fn fetch(&self, x: i32, y: i32) -> u32 {
        let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
        let (u, v) = match &self.transform {
            Some(t) => (
                fixed(t.t00) * cx + fixed(t.t01) * cy + fixed(t.t02),
                fixed(t.t10) * cx + fixed(t.t11) * cy + fixed(t.t12),
            ),
            None => (cx, cy),
        };
        let value = match self.filter {
            Filter::Nearest => {
                let e = 1.0 / 65536.0;
                self.texel((u - e).floor() as i32, (v - e).floor() as i32)
            }
            Filter::Bilinear => {
                let (u, v) = (u - 0.5, v - 0.5);
                let (x0, y0) = (u.floor(), v.floor());
                let (fx, fy) = (u - x0, v - y0);
                let (x0, y0) = (x0 as i32, y0 as i32);
                let p = [
                    self.texel(x0, y0),
                    self.texel(x0 + 1, y0),
                    self.texel(x0, y0 + 1),
                    self.texel(x0 + 1, y0 + 1),
                ];
                let mut out = 0u32;
                for shift in [24, 16, 8, 0] {
                    let c = |v: u32| ((v >> shift) & 0xff) as f64;
                    let top = c(p[0]) + (c(p[1]) - c(p[0])) * fx;
                    let bottom = c(p[2]) + (c(p[3]) - c(p[2])) * fx;
                    out |= ((top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u32) << shift;
                }
                out
            }
        };
        premultiply(value, self.surface.format())
    }
}

/// 8ビット同士の積（丸め付き）
fn mul(a: u32, b: u32) -> u32 {
    let t = a * b + 0x80;
    ((t >> 8) + t) >> 8
}

/// ARGB 形式のソースは乗算済みとして扱うため、アルファ専用形式だけを補正する
fn premultiply(argb: u32, format: PixelFormat) -> u32 {
    match format {
        PixelFormat::A1 | PixelFormat::A8 => argb & 0xff00_0000,
        _ => argb,
    }
}

/// 1画素を合成
///
/// `s` と `d` は乗算済み a8r8g8b8、`m` はマスク（`component_alpha` なら
/// チャネルごと、そうでなければアルファのみを使う）です。
pub(crate) fn combine(op: Operator, s: u32, m: u32, component_alpha: bool, d: u32) -> u32 {
    let sa = s >> 24;
    let da = d >> 24;
    let mut out = 0u32;
    for shift in [24, 16, 8, 0] {
        let mc = if component_alpha { (m >> shift) & 0xff } else { m >> 24 };
        let sc = mul((s >> shift) & 0xff, mc);
        let sac = mul(sa, mc);
        let (fa, fb) = op.factors(sac, da);
        let value = (mul(sc, fa) + mul((d >> shift) & 0xff, fb)).min(255);
        out |= value << shift;
    }
    out
}

/// `dest` の `(0, 0)` から `width` x `height` の範囲を合成
///
/// 描画先 `(x, y)` にはソース `(x + src_origin.0, y + src_origin.1)`、
/// マスク `(x + mask_origin.0, y + mask_origin.1)` が対応します。
#[allow(clippy::too_many_arguments)]
pub fn composite(
    op: Operator,
    src: &Layer<'_>,
    mask: Option<(&Layer<'_>, bool)>,
    dest: &mut Surface,
    src_origin: (i32, i32),
    mask_origin: (i32, i32),
    width: i32,
    height: i32,
) {
    let width = width.min(dest.width());
    let height = height.min(dest.height());
    for y in 0..height {
        for x in 0..width {
            let s = src.fetch(x + src_origin.0, y + src_origin.1);
            let (m, ca) = match mask {
                Some((layer, ca)) => {
                    let m = layer.fetch(x + mask_origin.0, y + mask_origin.1);
                    // アルファだけのマスクは全チャネルに同じ値を使う
                    if ca && !layer.surface.format().is_canvas_format() {
                        let a = m >> 24;
                        (a * 0x0101_0101, true)
                    } else {
                        (m, ca)
                    }
                }
                None => (0xff00_0000, false),
            };
            let d = dest.argb(x, y);
            dest.set_argb(x, y, combine(op, s, m, ca, d));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(format: PixelFormat, value: u32) -> Surface {
        let mut s = Surface::new(format, 1, 1).expect("サーフェスの作成に失敗しました");
        s.set_pixel(0, 0, value);
        s
    }

    #[test]
    fn test_operator_codes() {
        assert_eq!(Operator::from_code(3).expect("変換に失敗しました"), Operator::Over);
        assert_eq!(Operator::from_code(13).expect("変換に失敗しました"), Operator::Saturate);
        assert!(matches!(Operator::from_code(14), Err(CommonError::UnsupportedFormat(_))));
        assert!(filter_from_code(5).is_err());
        assert_eq!(filter_from_code(2).expect("変換に失敗しました"), Filter::Bilinear);
    }

    #[test]
    fn test_combine_over_half_red_on_white() {
        let out = combine(Operator::Over, 0x8080_0000, 0xff00_0000, false, 0xffff_ffff);
        assert_eq!(out, 0xffff_7f7f);
    }

    #[test]
    fn test_repeat_modes() {
        assert_eq!(Repeat::None.resolve(-1, 4), None);
        assert_eq!(Repeat::Normal.resolve(-1, 4), Some(3));
        assert_eq!(Repeat::Pad.resolve(9, 4), Some(3));
        assert_eq!(Repeat::Reflect.resolve(4, 4), Some(3));
        assert_eq!(Repeat::Reflect.resolve(-1, 4), Some(0));
    }

    #[test]
    fn test_composite_src_with_scale_transform() {
        let mut src = Surface::new(PixelFormat::A8R8G8B8, 2, 1).expect("サーフェスの作成に失敗しました");
        src.set_pixel(0, 0, 0xff00_0001);
        src.set_pixel(1, 0, 0xff00_0002);
        // 描画先の2画素がソースの1画素に対応する
        let half = Transform { t00: 0x8000, t01: 0, t02: 0, t10: 0, t11: 0x8000, t12: 0 };
        let layer = Layer { surface: &src, transform: Some(half), filter: Filter::Nearest, repeat: Repeat::Pad };
        let mut dest = Surface::new(PixelFormat::A8R8G8B8, 4, 1).expect("サーフェスの作成に失敗しました");
        composite(Operator::Src, &layer, None, &mut dest, (0, 0), (0, 0), 4, 1);
        let row: Vec<u32> = (0..4).map(|x| dest.pixel(x, 0)).collect();
        assert_eq!(row, vec![0xff00_0001, 0xff00_0001, 0xff00_0002, 0xff00_0002]);
    }

    #[test]
    fn test_composite_with_a8_mask() {
        let src = solid(PixelFormat::A8R8G8B8, 0xff00_00ff);
        let mask = solid(PixelFormat::A8, 0x00);
        let mut dest = solid(PixelFormat::X8R8G8B8, 0x0012_3456);
        let src_layer = Layer { repeat: Repeat::Normal, ..Layer::new(&src) };
        let mask_layer = Layer::new(&mask);
        composite(Operator::Over, &src_layer, Some((&mask_layer, false)), &mut dest, (0, 0), (0, 0), 1, 1);
        // マスクが0なので変化しない
        assert_eq!(dest.pixel(0, 0), 0x0012_3456);
    }
}
