//! 画素単位の描画プリミティブ
//!
//! 矩形リストに対する単色・タイル塗り、ROP 付き転送、透過色転送、
//! 拡大縮小、アルファブレンドを実装します。矩形は呼び出し側で
//! クリップ済みであることを前提とし、サーフェス外は切り捨てます。

use std::sync::Arc;

use remote_display_rs_common::protocol::{Rect, ScaleMode};
use remote_display_rs_common::{CommonError, Result};

use super::composite::{combine, Operator};
use crate::display::rop::{rop3, Rop};
use crate::display::surface::{PixelFormat, Surface};

/// 拡大縮小のフィルタ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// 最近傍
    Nearest,
    /// 双線形補間
    Bilinear,
}

impl From<ScaleMode> for Filter {
    fn from(mode: ScaleMode) -> Self {
        match mode {
            ScaleMode::Nearest => Filter::Nearest,
            ScaleMode::Interpolate => Filter::Bilinear,
        }
    }
}

/// 形式の深さに合わせた値のマスク
pub(crate) fn depth_mask(format: PixelFormat) -> u32 {
    match format.bits_per_pixel() {
        32 => 0xffff_ffff,
        16 => 0xffff,
        8 => 0xff,
        _ => 1,
    }
}

/// 単色で塗る
pub(crate) fn fill_solid(dest: &mut Surface, rects: &[Rect], color: u32, rop: Rop) {
    let mask = depth_mask(dest.format());
    let bounds = dest.bounds();
    for rect in rects {
        if rop == Rop::Copy {
            dest.fill_rect(rect, color & mask);
            continue;
        }
        let r = rect.intersect(&bounds);
        for y in r.top..r.bottom {
            for x in r.left..r.right {
                let d = dest.pixel(x, y);
                dest.set_pixel(x, y, rop.apply(color, d) & mask);
            }
        }
    }
}

/// タイルで塗る
///
/// 描画先 `(x, y)` にはタイルの `((x - offset_x) mod w, (y - offset_y) mod h)` が
/// 対応します（負の値も正の剰余で扱います）。
pub(crate) fn fill_tiled(
    dest: &mut Surface,
    rects: &[Rect],
    tile: &Surface,
    offset_x: i32,
    offset_y: i32,
    rop: Rop,
) -> Result<()> {
    let (tw, th) = (tile.width(), tile.height());
    if tw <= 0 || th <= 0 {
        return Err(CommonError::protocol("タイルが空です"));
    }
    let mask = depth_mask(dest.format());
    let bounds = dest.bounds();
    for rect in rects {
        let r = rect.intersect(&bounds);
        for y in r.top..r.bottom {
            let ty = (y - offset_y).rem_euclid(th);
            for x in r.left..r.right {
                let s = tile.pixel((x - offset_x).rem_euclid(tw), ty);
                let v = if rop == Rop::Copy { s } else { rop.apply(s, dest.pixel(x, y)) };
                dest.set_pixel(x, y, v & mask);
            }
        }
    }
    Ok(())
}

/// 解決済みのブラシ
#[derive(Debug, Clone)]
pub(crate) enum Paint {
    /// 単色（キャンバス形式の生の値）
    Solid(u32),
    /// タイル（`offset` は位相）
    Tile {
        surface: Arc<Surface>,
        offset_x: i32,
        offset_y: i32,
    },
}

/// ブラシで塗る
pub(crate) fn fill_paint(dest: &mut Surface, rects: &[Rect], paint: &Paint, rop: Rop) -> Result<()> {
    match paint {
        Paint::Solid(color) => {
            fill_solid(dest, rects, *color, rop);
            Ok(())
        }
        Paint::Tile { surface, offset_x, offset_y } => {
            fill_tiled(dest, rects, surface, *offset_x, *offset_y, rop)
        }
    }
}

/// ソースを転送
///
/// 描画先 `(x, y)` にはソース `(x - dx, y - dy)` が対応します。
pub(crate) fn blit(dest: &mut Surface, src: &Surface, rects: &[Rect], dx: i32, dy: i32, rop: Rop) -> Result<()> {
    let src_bounds = src.bounds().translate(dx, dy);
    if rop == Rop::Copy && src.format() == dest.format() {
        for rect in rects {
            let r = rect.intersect(&src_bounds);
            dest.copy_from(src, r.left - dx, r.top - dy, &r)?;
        }
        return Ok(());
    }
    let mask = depth_mask(dest.format());
    let bounds = dest.bounds();
    for rect in rects {
        let r = rect.intersect(&src_bounds).intersect(&bounds);
        for y in r.top..r.bottom {
            for x in r.left..r.right {
                let s = src.pixel(x - dx, y - dy);
                let v = rop.apply(s, dest.pixel(x, y));
                dest.set_pixel(x, y, v & mask);
            }
        }
    }
    Ok(())
}

/// 透過色以外の画素だけを転送
///
/// 32ビットでは下位24ビットだけを比較します。
pub(crate) fn blit_colorkey(dest: &mut Surface, src: &Surface, rects: &[Rect], dx: i32, dy: i32, key: u32) {
    let compare = if src.format().is_32bit() { 0x00ff_ffff } else { depth_mask(src.format()) };
    let key = key & compare;
    let src_bounds = src.bounds().translate(dx, dy);
    let bounds = dest.bounds();
    for rect in rects {
        let r = rect.intersect(&src_bounds).intersect(&bounds);
        for y in r.top..r.bottom {
            for x in r.left..r.right {
                let s = src.pixel(x - dx, y - dy);
                if s & compare != key {
                    dest.set_pixel(x, y, s);
                }
            }
        }
    }
}

/// パターン・ソース・描画先に3項演算を適用
///
/// 描画先 `(x, y)` にはソース `(x + src_x, y + src_y)` が対応します。
/// タイルの位相は [`fill_tiled`] と同じく正の剰余で求めます。
pub(crate) fn blit_rop3(
    dest: &mut Surface,
    src: &Surface,
    src_x: i32,
    src_y: i32,
    pattern: &Paint,
    code: u8,
) -> Result<()> {
    if let Paint::Tile { surface, .. } = pattern {
        if surface.width() <= 0 || surface.height() <= 0 {
            return Err(CommonError::protocol("パターンが空です"));
        }
    }
    let mask = depth_mask(dest.format());
    let area = dest.bounds().intersect(&src.bounds().translate(-src_x, -src_y));
    for y in area.top..area.bottom {
        for x in area.left..area.right {
            let p = match pattern {
                Paint::Solid(color) => *color,
                Paint::Tile { surface, offset_x, offset_y } => surface.pixel(
                    (x - offset_x).rem_euclid(surface.width()),
                    (y - offset_y).rem_euclid(surface.height()),
                ),
            };
            let s = src.pixel(x + src_x, y + src_y);
            let v = rop3(code, p, s, dest.pixel(x, y));
            dest.set_pixel(x, y, v & mask);
        }
    }
    Ok(())
}

fn lerp(a: u32, b: u32, t: f64) -> f64 {
    a as f64 + (b as f64 - a as f64) * t
}

fn bilinear(src: &Surface, area: &Rect, u: f64, v: f64) -> u32 {
    let x0 = u.floor();
    let y0 = v.floor();
    let (fx, fy) = (u - x0, v - y0);
    let clamp_x = |x: i32| x.clamp(area.left, area.right - 1);
    let clamp_y = |y: i32| y.clamp(area.top, area.bottom - 1);
    let (xa, xb) = (clamp_x(x0 as i32), clamp_x(x0 as i32 + 1));
    let (ya, yb) = (clamp_y(y0 as i32), clamp_y(y0 as i32 + 1));
    let p = [src.argb(xa, ya), src.argb(xb, ya), src.argb(xa, yb), src.argb(xb, yb)];
    let mut out = 0u32;
    for shift in [24, 16, 8, 0] {
        let c = |v: u32| (v >> shift) & 0xff;
        let top = lerp(c(p[0]), c(p[1]), fx);
        let bottom = lerp(c(p[2]), c(p[3]), fx);
        let value = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u32;
        out |= value << shift;
    }
    out
}

/// `area` を `width` x `height` に拡大縮小した新しいサーフェス
///
/// 出力画素の中心をソース上の位置に写して標本化します。範囲外はソース領域の
/// 端の画素で埋めます。
pub(crate) fn scale(src: &Surface, area: &Rect, width: i32, height: i32, filter: Filter) -> Result<Surface> {
    let area = area.intersect(&src.bounds());
    if area.is_empty() {
        return Err(CommonError::protocol(format!("拡大縮小するソース領域が空です: {:?}", area)));
    }
    let mut out = Surface::new(src.format(), width, height)?;
    let sx = area.width() as f64 / width.max(1) as f64;
    let sy = area.height() as f64 / height.max(1) as f64;
    for y in 0..height {
        let v = area.top as f64 + (y as f64 + 0.5) * sy;
        for x in 0..width {
            let u = area.left as f64 + (x as f64 + 0.5) * sx;
            match filter {
                Filter::Nearest => {
                    let px = (u.floor() as i32).clamp(area.left, area.right - 1);
                    let py = (v.floor() as i32).clamp(area.top, area.bottom - 1);
                    out.set_pixel(x, y, src.pixel(px, py));
                }
                Filter::Bilinear => {
                    out.set_argb(x, y, bilinear(src, &area, u - 0.5, v - 0.5));
                }
            }
        }
    }
    Ok(out)
}

/// 全体アルファ付きでソースを重ねる（OVER）
///
/// xRGB の描画先には計算したアルファもそのまま書き込みます。
pub(crate) fn blend(dest: &mut Surface, src: &Surface, rects: &[Rect], dx: i32, dy: i32, alpha: u8) {
    let mask = (alpha as u32) << 24;
    let src_bounds = src.bounds().translate(dx, dy);
    let bounds = dest.bounds();
    let keep_alpha = dest.format() == PixelFormat::X8R8G8B8;
    for rect in rects {
        let r = rect.intersect(&src_bounds).intersect(&bounds);
        for y in r.top..r.bottom {
            for x in r.left..r.right {
                let out = combine(Operator::Over, src.argb(x - dx, y - dy), mask, false, dest.argb(x, y));
                if keep_alpha {
                    dest.set_pixel(x, y, out);
                } else {
                    dest.set_argb(x, y, out);
                }
            }
        }
    }
}

/// ブレンドで書き込まれたアルファを消す
///
/// 先頭の画素のアルファが 0xff のときだけ矩形全体のアルファを 0 にします。
pub(crate) fn clear_dest_alpha(dest: &mut Surface, rect: &Rect) {
    let r = rect.intersect(&dest.bounds());
    if r.is_empty() || !dest.format().is_32bit() {
        return;
    }
    if dest.pixel(r.left, r.top) >> 24 != 0xff {
        return;
    }
    for y in r.top..r.bottom {
        for x in r.left..r.right {
            let v = dest.pixel(x, y);
            dest.set_pixel(x, y, v & 0x00ff_ffff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(format: PixelFormat, w: i32, h: i32, value: u32) -> Surface {
        let mut s = Surface::new(format, w, h).expect("サーフェスの作成に失敗しました");
        s.fill_rect(&s.bounds(), value);
        s
    }

    #[test]
    fn test_fill_solid_xor_on_16bit() {
        let mut s = surface(PixelFormat::X1R5G5B5, 2, 1, 0x7fff);
        fill_solid(&mut s, &[Rect::new(0, 0, 1, 1)], 0xffff_001f, Rop::Xor);
        assert_eq!(s.pixel(0, 0), 0x7fe0);
        assert_eq!(s.pixel(1, 0), 0x7fff);
    }

    #[test]
    fn test_tiled_negative_offset() {
        let mut tile = Surface::new(PixelFormat::X8R8G8B8, 2, 1).expect("サーフェスの作成に失敗しました");
        tile.set_pixel(0, 0, 10);
        tile.set_pixel(1, 0, 20);
        let mut s = surface(PixelFormat::X8R8G8B8, 4, 1, 0);
        let bounds = s.bounds();
        fill_tiled(&mut s, &[bounds], &tile, -1, 0, Rop::Copy).expect("タイル塗りに失敗しました");
        // x=0 はタイルの (0+1) mod 2 = 1
        assert_eq!((0..4).map(|x| s.pixel(x, 0)).collect::<Vec<_>>(), vec![20, 10, 20, 10]);
    }

    #[test]
    fn test_colorkey_ignores_alpha_byte() {
        let mut src = surface(PixelFormat::X8R8G8B8, 2, 1, 0xff00_ff00);
        src.set_pixel(1, 0, 0x0000_0001);
        let mut dest = surface(PixelFormat::X8R8G8B8, 2, 1, 7);
        let bounds = dest.bounds();
        blit_colorkey(&mut dest, &src, &[bounds], 0, 0, 0x0000_ff00);
        assert_eq!(dest.pixel(0, 0), 7);
        assert_eq!(dest.pixel(1, 0), 1);
    }

    #[test]
    fn test_scale_nearest_doubles() {
        let mut src = Surface::new(PixelFormat::X8R8G8B8, 2, 1).expect("サーフェスの作成に失敗しました");
        src.set_pixel(0, 0, 1);
        src.set_pixel(1, 0, 2);
        let out = scale(&src, &src.bounds(), 4, 2, Filter::Nearest).expect("拡大に失敗しました");
        assert_eq!((0..4).map(|x| out.pixel(x, 1)).collect::<Vec<_>>(), vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_scale_bilinear_midpoint() {
        let mut src = Surface::new(PixelFormat::A8R8G8B8, 2, 1).expect("サーフェスの作成に失敗しました");
        src.set_pixel(0, 0, 0xff00_0000);
        src.set_pixel(1, 0, 0xff00_00c8);
        // 縮小すると2画素の中間になる
        let out = scale(&src, &src.bounds(), 1, 1, Filter::Bilinear).expect("縮小に失敗しました");
        assert_eq!(out.pixel(0, 0), 0xff00_0064);
    }

    #[test]
    fn test_blend_and_clear_dest_alpha() {
        let src = surface(PixelFormat::A8R8G8B8, 1, 1, 0xff00_00ff);
        let mut dest = surface(PixelFormat::X8R8G8B8, 1, 1, 0x0000_0000);
        let bounds = dest.bounds();
        blend(&mut dest, &src, &[bounds], 0, 0, 0xff);
        assert_eq!(dest.pixel(0, 0), 0xff00_00ff);
        clear_dest_alpha(&mut dest, &bounds);
        assert_eq!(dest.pixel(0, 0), 0x0000_00ff);
    }
}
