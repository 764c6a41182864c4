//! 線描画コマンド
//!
//! 28.4 固定小数点のパスを整数の折れ線に分解し、ゼロ幅線として
//! ラスタライズします。ベジェ曲線は平坦とみなせるまで中点で分割します。

use log::trace;
use remote_display_rs_common::protocol::{LineAttr, Path, PathSeg, Point, PointFix, Rect};
use remote_display_rs_common::{CommonError, Result};

use super::blit::{fill_paint, Paint};
use crate::display::lines::{zero_dash_line, zero_line, CapStyle, JoinStyle, LineGc, LineStyle, Span, SpanSink};
use crate::display::region::Region;
use crate::display::rop::Rop;
use crate::display::surface::Surface;

/// 分割の深さの上限（始点と終点が一致する曲線でも停止させる）
const MAX_BEZIER_DEPTH: u32 = 16;

/// 28.4 固定小数点を整数に丸める（小数部が 8/16 を超えたら切り上げ）
pub(crate) fn fix_to_int(v: i32) -> i32 {
    let rem = v & 0x0f;
    let val = v >> 4;
    if rem > 8 {
        val + 1
    } else {
        val
    }
}

fn int_to_fix(v: i32) -> i32 {
    v << 4
}

fn dot(x1: i32, y1: i32, x2: i32, y2: i32) -> i64 {
    (x1 as i64 * x2 as i64 + y1 as i64 * y2 as i64) >> 4
}

fn dot2(x: i32, y: i32) -> i64 {
    dot(x, y, x, y)
}

fn midpoint(a: PointFix, b: PointFix) -> PointFix {
    PointFix { x: (a.x + b.x) / 2, y: (a.y + b.y) / 2 }
}

/// 描画待ちの折れ線
#[derive(Debug, Default)]
struct Polyline {
    points: Vec<Point>,
}

impl Polyline {
    fn append(&mut self, x: i32, y: i32) {
        self.points.push(Point::new(x, y));
    }

    fn append_fix(&mut self, p: &PointFix) {
        self.append(fix_to_int(p.x), fix_to_int(p.y));
    }

    fn append_bezier(&mut self, p1: PointFix, p2: PointFix, p3: PointFix) -> Result<()> {
        let last = self
            .points
            .last()
            .ok_or_else(|| CommonError::protocol("ベジェ曲線の始点がありません"))?;
        let p0 = PointFix { x: int_to_fix(last.x), y: int_to_fix(last.y) };
        self.subdivide(p0, p1, p2, p3, 0);
        Ok(())
    }

    fn subdivide(&mut self, p0: PointFix, p1: PointFix, p2: PointFix, p3: PointFix, depth: u32) {
        let a2 = dot2(p1.x - p0.x, p1.y - p0.y);
        let b2 = dot2(p3.x - p0.x, p3.y - p0.y);
        let c2 = dot2(p2.x - p3.x, p2.y - p3.y);
        let ab = dot(p1.x - p0.x, p1.y - p0.y, p3.x - p0.x, p3.y - p0.y);
        let cb = dot(p2.x - p3.x, p2.y - p3.y, p0.x - p3.x, p0.y - p3.y);
        let h1 = (a2.wrapping_mul(b2).wrapping_sub(ab.wrapping_mul(ab))) >> 3;
        let h2 = (c2.wrapping_mul(b2).wrapping_sub(cb.wrapping_mul(cb))) >> 3;

        // 偏差の2乗が半画素未満なら直線で近似
        if (h1 < b2 && h2 < b2) || depth >= MAX_BEZIER_DEPTH {
            self.append_fix(&p3);
            return;
        }
        let p01 = midpoint(p0, p1);
        let p12 = midpoint(p1, p2);
        let p23 = midpoint(p2, p3);
        let p012 = midpoint(p01, p12);
        let p123 = midpoint(p12, p23);
        let p0123 = midpoint(p012, p123);
        self.subdivide(p0, p01, p012, p0123, depth + 1);
        self.subdivide(p0123, p123, p23, p3, depth + 1);
    }

    fn draw(&mut self, gc: &LineGc, sink: &mut dyn SpanSink) {
        if self.points.is_empty() {
            return;
        }
        if gc.line_style == LineStyle::Solid {
            zero_line(gc, &self.points, sink);
        } else {
            zero_dash_line(gc, &self.points, sink);
        }
        self.points.clear();
    }
}

/// 線のスパンを描画先に書き込むシンク
struct StrokeSink<'a> {
    dest: &'a mut Surface,
    region: &'a Region,
    paint: &'a Paint,
    fore_rop: Rop,
    back_rop: Rop,
    error: Option<CommonError>,
}

impl StrokeSink<'_> {
    fn fill(&mut self, rects: &[Rect], foreground: bool) {
        if rects.is_empty() || self.error.is_some() {
            return;
        }
        let rop = if foreground { self.fore_rop } else { self.back_rop };
        if let Err(e) = fill_paint(self.dest, rects, self.paint, rop) {
            self.error = Some(e);
        }
    }
}

impl SpanSink for StrokeSink<'_> {
    fn fill_spans(&mut self, spans: &[Span], _sorted: bool, foreground: bool) {
        let rects: Vec<Rect> = self
            .region
            .clip_spans(spans)
            .iter()
            .map(|s| Rect::new(s.x, s.y, s.x + s.width, s.y + 1))
            .collect();
        self.fill(&rects, foreground);
    }

    fn fill_rects(&mut self, rects: &[Rect], foreground: bool) {
        let clipped = Region::from_rects(rects).intersect(self.region).rects();
        self.fill(&clipped, foreground);
    }
}

/// 破線パターンを作る（`START_WITH_GAP` なら先頭の長さを末尾に回す）
fn dash_pattern(attr: &LineAttr) -> (Vec<u8>, u16) {
    let lengths: Vec<u8> =
        attr.style.iter().map(|&v| fix_to_int(v as i32).clamp(0, 255) as u8).collect();
    if attr.start_with_gap() && !lengths.is_empty() {
        let mut dash = lengths[1..].to_vec();
        dash.push(lengths[0]);
        let offset = dash[0] as u16;
        (dash, offset)
    } else {
        (lengths, 0)
    }
}

/// 線の属性
pub(crate) struct StrokeStyle<'a> {
    /// 線属性
    pub attr: &'a LineAttr,
    /// 前景の演算
    pub fore_rop: Rop,
    /// 背景の演算
    pub back_rop: Rop,
    /// ゼロ幅線のバイアス
    pub zero_line_bias: u32,
}

/// パスを `region` 内に描画
pub(crate) fn stroke_path(
    dest: &mut Surface,
    region: &Region,
    path: &Path,
    style: &StrokeStyle<'_>,
    paint: &Paint,
) -> Result<()> {
    let mut gc = LineGc::new(dest.width(), dest.height());
    gc.rop = style.fore_rop;
    gc.line_width = 0;
    gc.cap_style = CapStyle::NotLast;
    gc.join_style = JoinStyle::Miter;
    gc.zero_line_bias = style.zero_line_bias;
    if style.attr.is_styled() {
        let (dash, offset) = dash_pattern(style.attr);
        gc.line_style = LineStyle::OnOffDash;
        gc.dash = dash;
        gc.dash_offset = offset;
    }

    let mut sink = StrokeSink {
        dest,
        region,
        paint,
        fore_rop: style.fore_rop,
        back_rop: style.back_rop,
        error: None,
    };
    let mut lines = Polyline::default();

    for seg in &path.segments {
        let mut points: &[PointFix] = &seg.points;
        if seg.has(PathSeg::BEGIN) {
            lines.draw(&gc, &mut sink);
            if let Some((first, rest)) = points.split_first() {
                lines.append_fix(first);
                points = rest;
            }
        }
        if seg.has(PathSeg::BEZIER) {
            if points.len() % 3 != 0 {
                return Err(CommonError::protocol(format!(
                    "ベジェ曲線の制御点の数が不正です: {}",
                    points.len()
                )));
            }
            for c in points.chunks_exact(3) {
                lines.append_bezier(c[0], c[1], c[2])?;
            }
        } else {
            points.iter().for_each(|p| lines.append_fix(p));
        }
        if seg.has(PathSeg::END) {
            if seg.has(PathSeg::CLOSE) {
                if let Some(&start) = lines.points.first() {
                    lines.append(start.x, start.y);
                }
            }
            lines.draw(&gc, &mut sink);
        }
    }
    lines.draw(&gc, &mut sink);

    trace!("線を描画しました: {} セグメント", path.segments.len());
    match sink.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::lines::DEFAULT_ZERO_LINE_BIAS;
    use crate::display::surface::PixelFormat;

    fn fix(x: i32, y: i32) -> PointFix {
        PointFix::from_int(x, y)
    }

    fn painted(s: &Surface) -> Vec<(i32, i32)> {
        let mut out = Vec::new();
        for y in 0..s.height() {
            for x in 0..s.width() {
                if s.pixel(x, y) != 0 {
                    out.push((x, y));
                }
            }
        }
        out
    }

    fn draw(path: Path, attr: LineAttr, region: &Region) -> Surface {
        let mut s = Surface::new(PixelFormat::X8R8G8B8, 12, 6).expect("サーフェスの作成に失敗しました");
        let style = StrokeStyle {
            attr: &attr,
            fore_rop: Rop::Copy,
            back_rop: Rop::Noop,
            zero_line_bias: DEFAULT_ZERO_LINE_BIAS,
        };
        stroke_path(&mut s, region, &path, &style, &Paint::Solid(0x00ff_ffff)).expect("線の描画に失敗しました");
        s
    }

    #[test]
    fn test_fix_to_int_rounding() {
        assert_eq!(fix_to_int(16 * 3 + 8), 3);
        assert_eq!(fix_to_int(16 * 3 + 9), 4);
        assert_eq!(fix_to_int(-16), -1);
        assert_eq!(fix_to_int(-1), 0);
    }

    #[test]
    fn test_horizontal_line_not_last() {
        let path = Path {
            segments: vec![PathSeg { flags: PathSeg::BEGIN | PathSeg::END, points: vec![fix(1, 2), fix(6, 2)] }],
        };
        let s = draw(path, LineAttr::default(), &Region::from_rect(&Rect::new(0, 0, 12, 6)));
        // 終点は描かない
        assert_eq!(painted(&s), (1..6).map(|x| (x, 2)).collect::<Vec<_>>());
    }

    #[test]
    fn test_region_clips_spans() {
        let path = Path {
            segments: vec![PathSeg { flags: PathSeg::BEGIN | PathSeg::END, points: vec![fix(0, 1), fix(10, 1)] }],
        };
        let s = draw(path, LineAttr::default(), &Region::from_rect(&Rect::new(3, 0, 5, 6)));
        assert_eq!(painted(&s), vec![(3, 1), (4, 1)]);
    }

    #[test]
    fn test_styled_dash() {
        let attr = LineAttr { flags: LineAttr::STYLED, style: vec![3 << 4, 2 << 4] };
        let path = Path {
            segments: vec![PathSeg { flags: PathSeg::BEGIN | PathSeg::END, points: vec![fix(0, 0), fix(10, 0)] }],
        };
        let s = draw(path, attr, &Region::from_rect(&Rect::new(0, 0, 12, 6)));
        assert_eq!(painted(&s), vec![(0, 0), (1, 0), (2, 0), (5, 0), (6, 0), (7, 0)]);
    }

    #[test]
    fn test_start_with_gap_rotates_pattern() {
        let attr = LineAttr {
            flags: LineAttr::STYLED | LineAttr::START_WITH_GAP,
            style: vec![1 << 4, 2 << 4, 3 << 4],
        };
        let (dash, offset) = dash_pattern(&attr);
        assert_eq!(dash, vec![2, 3, 1]);
        assert_eq!(offset, 2);
    }

    #[test]
    fn test_closed_path_returns_to_start() {
        let path = Path {
            segments: vec![PathSeg {
                flags: PathSeg::BEGIN | PathSeg::END | PathSeg::CLOSE,
                points: vec![fix(1, 1), fix(4, 1), fix(4, 4)],
            }],
        };
        let s = draw(path, LineAttr::default(), &Region::from_rect(&Rect::new(0, 0, 12, 6)));
        let pixels = painted(&s);
        // 閉じる辺の途中の画素が描かれている
        assert!(pixels.contains(&(2, 2)), "{:?}", pixels);
        assert!(pixels.contains(&(1, 1)));
    }

    #[test]
    fn test_straight_bezier_reaches_end() {
        let mut lines = Polyline::default();
        lines.append(0, 0);
        lines
            .append_bezier(fix(2, 0), fix(4, 0), fix(6, 0))
            .expect("ベジェ曲線の追加に失敗しました");
        assert_eq!(lines.points.last().copied(), Some(Point::new(6, 0)));
        assert!(lines.points.iter().all(|p| p.y == 0));
    }

    #[test]
    fn test_degenerate_bezier_terminates() {
        let mut lines = Polyline::default();
        lines.append(0, 0);
        lines
            .append_bezier(fix(5, 5), fix(-5, 5), fix(0, 0))
            .expect("ベジェ曲線の追加に失敗しました");
        assert_eq!(lines.points.last().copied(), Some(Point::new(0, 0)));
    }

    #[test]
    fn test_bezier_without_start_is_error() {
        let path = Path {
            segments: vec![PathSeg { flags: PathSeg::BEZIER, points: vec![fix(1, 1), fix(2, 2), fix(3, 3)] }],
        };
        let mut s = Surface::new(PixelFormat::X8R8G8B8, 4, 4).expect("サーフェスの作成に失敗しました");
        let attr = LineAttr::default();
        let style = StrokeStyle { attr: &attr, fore_rop: Rop::Copy, back_rop: Rop::Noop, zero_line_bias: 0 };
        let region = Region::from_rect(&s.bounds());
        assert!(stroke_path(&mut s, &region, &path, &style, &Paint::Solid(1)).is_err());
    }
}
