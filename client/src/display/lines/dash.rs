//! 破線
//!
//! 線分を破線パターンの区間ごとの四角形に分けて塗ります。区間の位置は
//! 線分をまたいで引き継がれ、二重破線では空白の区間を背景として塗ります。

use remote_display_rs_common::protocol::Point;

use super::poly::{build_poly, LineFace, PolySlope, PolyVertex};
use super::wide::{wide_line, Painter};
use super::zero::zero_line;
use super::{CapStyle, LineGc, LineStyle, SpanSink};

const V_TOP: usize = 0;
const V_RIGHT: usize = 1;
const V_BOTTOM: usize = 2;
const V_LEFT: usize = 3;

/// 破線パターン上の位置を `dist` だけ進める
///
/// `index` は現在の区間、`offset` は区間内の位置です。
pub fn step_dash(dist: i32, index: &mut usize, dash: &[u8], offset: &mut i32) {
    let total: i32 = dash.iter().map(|&d| d as i32).sum();
    if dash.is_empty() || total == 0 || *index >= dash.len() {
        return;
    }
    let mut dist = dist;
    let current = dash[*index] as i32 - *offset;
    if dist < current {
        *offset += dist;
        return;
    }
    dist -= current;
    let mut i = (*index + 1) % dash.len();
    if total <= dist {
        dist %= total;
    }
    while dist >= dash[i] as i32 {
        dist -= dash[i] as i32;
        i = (i + 1) % dash.len();
    }
    *index = i;
    *offset = dist;
}

/// 破線パターン上の現在位置
struct DashCursor<'d> {
    dash: &'d [u8],
    index: usize,
    offset: i32,
}

impl DashCursor<'_> {
    fn advance(&mut self) {
        self.index += 1;
        if self.index == self.dash.len() {
            self.index = 0;
        }
    }

    fn current(&self) -> i32 {
        self.dash[self.index] as i32
    }
}

fn shift(v: &mut PolyVertex, dx: f64, dy: f64) {
    v.x += dx;
    v.y += dy;
}

fn slope_k(v: &PolyVertex, s: &PolySlope) -> f64 {
    v.x * s.dy as f64 - v.y * s.dx as f64
}

/// 破線の1線分を描き、始点側と終点側の端面を返す
#[allow(clippy::too_many_arguments)]
fn wide_dash_segment(
    painter: &mut Painter<'_>,
    cursor: &mut DashCursor<'_>,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    project_left: bool,
    project_right: bool,
) -> (LineFace, LineFace) {
    let gc = painter.gc;
    let on_off = gc.line_style == LineStyle::OnOffDash;
    let double = gc.line_style == LineStyle::DoubleDash;
    let cap = gc.cap_style;
    let dx = x2 - x1;
    let dy = y2 - y1;
    let (dxf, dyf) = (dx as f64, dy as f64);
    let mut dash_remain = cursor.current() - cursor.offset;

    let l = gc.line_width as f64 / 2.0;
    let (len, rdx, rdy) = if dx == 0 {
        if dy < 0 {
            (-dyf, 0.0, -l)
        } else {
            (dyf, 0.0, l)
        }
    } else if dy == 0 {
        if dx < 0 {
            (-dxf, -l, 0.0)
        } else {
            (dxf, l, 0.0)
        }
    } else {
        let len = dxf.hypot(dyf);
        let r = l / len;
        (len, r * dxf, r * dyf)
    };
    let k = l * len;
    let mut l_remain = len;

    // 位置の説明は dx, dy > 0 の線分を基準にする
    let mut slopes = [
        PolySlope::new(dx, dy, k),
        PolySlope::new(-dy, dx, 0.0),
        PolySlope::new(-dx, -dy, k),
        PolySlope::new(dy, -dx, 0.0),
    ];
    let mut v = [
        PolyVertex::new(rdy, -rdx),
        PolyVertex::new(rdy, -rdx),
        PolyVertex::new(-rdy, rdx),
        PolyVertex::new(-rdy, rdx),
    ];
    if project_left {
        shift(&mut v[V_TOP], -rdx, -rdy);
        shift(&mut v[V_LEFT], -rdx, -rdy);
        slopes[V_LEFT].k = rdx * dxf + rdy * dyf;
    }

    let (mut lcx, mut lcy) = (x1 as f64, y1 as f64);
    let (mut rcx, mut rcy) = (0.0, 0.0);
    let mut lcap = LineFace { dx, dy, x: x1, y: y1, ..LineFace::default() };
    let mut rcap = LineFace { dx: -dx, dy: -dy, x: x1, y: y1, ..LineFace::default() };
    let mut save_right = PolyVertex::default();
    let mut save_bottom = PolyVertex::default();
    let mut save_k = 0.0;
    let mut first = true;

    while l_remain > dash_remain as f64 {
        let dash_dx = dash_remain as f64 * dxf / len;
        let dash_dy = dash_remain as f64 * dyf / len;
        rcx = lcx + dash_dx;
        rcy = lcy + dash_dy;
        shift(&mut v[V_RIGHT], dash_dx, dash_dy);
        shift(&mut v[V_BOTTOM], dash_dx, dash_dy);
        slopes[V_RIGHT].k = v[V_RIGHT].x * dxf + v[V_RIGHT].y * dyf;

        if double || cursor.index & 1 == 0 {
            if on_off && cap == CapStyle::Projecting {
                save_right = v[V_RIGHT];
                save_bottom = v[V_BOTTOM];
                save_k = slopes[V_RIGHT].k;
                if !first {
                    shift(&mut v[V_TOP], -rdx, -rdy);
                    shift(&mut v[V_LEFT], -rdx, -rdy);
                    slopes[V_LEFT].k = slope_k(&v[V_LEFT], &slopes[V_LEFT]);
                }
                shift(&mut v[V_RIGHT], rdx, rdy);
                shift(&mut v[V_BOTTOM], rdx, rdy);
                slopes[V_RIGHT].k = slope_k(&v[V_RIGHT], &slopes[V_RIGHT]);
            }
            let edges = build_poly(&v, &slopes, x1, y1);
            let foreground = cursor.index & 1 == 0;
            painter.fill_poly(foreground, &edges);

            if on_off {
                match cap {
                    CapStyle::Projecting => {
                        v[V_BOTTOM] = save_bottom;
                        v[V_RIGHT] = save_right;
                        slopes[V_RIGHT].k = save_k;
                    }
                    CapStyle::Round => {
                        if !first {
                            if dx < 0 {
                                lcap.xa = -v[V_LEFT].x;
                                lcap.ya = -v[V_LEFT].y;
                                lcap.k = slopes[V_LEFT].k;
                            } else {
                                lcap.xa = v[V_TOP].x;
                                lcap.ya = v[V_TOP].y;
                                lcap.k = -slopes[V_LEFT].k;
                            }
                            painter.line_arc(foreground, Some(&mut lcap), None, lcx, lcy, false);
                        }
                        if dx < 0 {
                            rcap.xa = v[V_BOTTOM].x;
                            rcap.ya = v[V_BOTTOM].y;
                            rcap.k = slopes[V_RIGHT].k;
                        } else {
                            rcap.xa = -v[V_RIGHT].x;
                            rcap.ya = -v[V_RIGHT].y;
                            rcap.k = -slopes[V_RIGHT].k;
                        }
                        painter.line_arc(foreground, None, Some(&mut rcap), rcx, rcy, false);
                    }
                    _ => {}
                }
            }
        }

        l_remain -= dash_remain as f64;
        cursor.advance();
        dash_remain = cursor.current();
        lcx = rcx;
        lcy = rcy;
        v[V_TOP] = v[V_RIGHT];
        v[V_LEFT] = v[V_BOTTOM];
        slopes[V_LEFT].k = -slopes[V_RIGHT].k;
        first = false;
    }

    // 線分の残り
    if double || cursor.index & 1 == 0 {
        shift(&mut v[V_TOP], -dxf, -dyf);
        shift(&mut v[V_LEFT], -dxf, -dyf);
        v[V_RIGHT] = PolyVertex::new(rdy, -rdx);
        v[V_BOTTOM] = PolyVertex::new(-rdy, rdx);

        if project_right {
            shift(&mut v[V_RIGHT], rdx, rdy);
            shift(&mut v[V_BOTTOM], rdx, rdy);
            slopes[V_RIGHT].k = slope_k(&v[V_RIGHT], &slopes[V_RIGHT]);
        } else {
            slopes[V_RIGHT].k = 0.0;
        }

        if !first && on_off && cap == CapStyle::Projecting {
            shift(&mut v[V_TOP], -rdx, -rdy);
            shift(&mut v[V_LEFT], -rdx, -rdy);
            slopes[V_LEFT].k = slope_k(&v[V_LEFT], &slopes[V_LEFT]);
        } else {
            slopes[V_LEFT].k += dxf * dxf + dyf * dyf;
        }

        let edges = build_poly(&v, &slopes, x2, y2);
        let foreground = cursor.index & 1 == 0;
        painter.fill_poly(foreground, &edges);

        if !first && on_off && cap == CapStyle::Round {
            lcap.x = x2;
            lcap.y = y2;
            if dx < 0 {
                lcap.xa = -v[V_LEFT].x;
                lcap.ya = -v[V_LEFT].y;
                lcap.k = slopes[V_LEFT].k;
            } else {
                lcap.xa = v[V_TOP].x;
                lcap.ya = v[V_TOP].y;
                lcap.k = -slopes[V_LEFT].k;
            }
            painter.line_arc(foreground, Some(&mut lcap), None, rcx, rcy, false);
        }
    }

    dash_remain = (dash_remain as f64 - l_remain) as i32;
    if dash_remain == 0 {
        cursor.advance();
        dash_remain = cursor.current();
    }
    cursor.offset = cursor.current() - dash_remain;

    let left = LineFace { x: x1, y: y1, dx, dy, xa: rdy, ya: -rdx, k };
    let right = LineFace { x: x2, y: y2, dx: -dx, dy: -dy, xa: -rdy, ya: rdx, k };
    (left, right)
}

/// 太い破線を描く（パターンが空なら実線）
pub fn wide_dash_line(gc: &LineGc, points: &[Point], sink: &mut dyn SpanSink) {
    if !gc.has_usable_dash() || gc.line_style == LineStyle::Solid {
        wide_line(gc, points, sink);
        return;
    }
    let first_point = match points.first() {
        Some(p) => *p,
        None => return,
    };
    let cap = gc.cap_style;
    let on_off = gc.line_style == LineStyle::OnOffDash;
    let double = gc.line_style == LineStyle::DoubleDash;
    let mut painter = Painter::new(gc, sink, points.len());

    let self_join = points.last() == Some(&first_point);
    let mut project_left = cap == CapStyle::Projecting && !self_join;
    let mut cursor = DashCursor { dash: &gc.dash, index: 0, offset: 0 };
    step_dash(gc.dash_offset as i32, &mut cursor.index, &gc.dash, &mut cursor.offset);

    let mut first = true;
    let mut something_drawn = false;
    let mut end_is_fg = false;
    let mut first_is_fg = false;
    let mut prev_is_fg = false;
    let mut first_face = LineFace::default();
    let mut prev_right = LineFace::default();
    let mut right_face = LineFace::default();
    let (mut x2, mut y2) = (first_point.x, first_point.y);
    let last = points.len() - 1;

    for (i, p) in points.iter().enumerate().skip(1) {
        let (x1, y1) = (x2, y2);
        x2 = p.x;
        y2 = p.y;
        let is_last = i == last;
        if x1 != x2 || y1 != y2 {
            something_drawn = true;
            let project_right = is_last && cap == CapStyle::Projecting && (!self_join || !first_is_fg);
            let prev_index = cursor.index;
            let (mut left_face, right) =
                wide_dash_segment(&mut painter, &mut cursor, x1, y1, x2, y2, project_left, project_right);
            right_face = right;
            let start_is_fg = prev_index & 1 == 0;
            end_is_fg = (cursor.index & 1 != 0) ^ (cursor.offset != 0);
            if double || start_is_fg {
                let foreground = start_is_fg;
                if first || (on_off && !prev_is_fg) {
                    if first && self_join {
                        first_face = left_face;
                        first_is_fg = start_is_fg;
                    } else if cap == CapStyle::Round {
                        painter.line_arc(foreground, Some(&mut left_face), None, 0.0, 0.0, true);
                    }
                } else {
                    painter.join(foreground, &mut left_face, &mut prev_right);
                }
            }
            prev_right = right_face;
            prev_is_fg = end_is_fg;
            first = false;
            project_left = false;
        }
        if is_last && something_drawn {
            if double || end_is_fg {
                let foreground = end_is_fg;
                if self_join && (double || first_is_fg) {
                    painter.join(foreground, &mut first_face, &mut right_face);
                } else if cap == CapStyle::Round {
                    painter.line_arc(foreground, None, Some(&mut right_face), 0.0, 0.0, true);
                }
            } else if self_join && first_is_fg {
                // 空白で終わった閉じた線は始点に端点を付ける
                match cap {
                    CapStyle::Projecting => painter.projecting_cap(true, &first_face, true),
                    CapStyle::Round => painter.line_arc(true, Some(&mut first_face), None, 0.0, 0.0, true),
                    _ => {}
                }
            }
        }
    }

    // すべての点が同じ位置
    if !something_drawn && (double || cursor.index & 1 == 0) {
        let foreground = cursor.index & 1 == 0;
        match cap {
            CapStyle::Round => painter.line_arc(foreground, None, None, x2 as f64, y2 as f64, false),
            CapStyle::Projecting => {
                let lw = painter.line_width();
                painter.fill_rect(foreground, x2 - (lw >> 1), y2 - (lw >> 1), lw, lw);
            }
            _ => {}
        }
    }
    painter.finish();
}

/// ゼロ幅の破線を描く（線幅1の太い破線として処理）
pub fn zero_dash_line(gc: &LineGc, points: &[Point], sink: &mut dyn SpanSink) {
    if !gc.has_usable_dash() || gc.line_style == LineStyle::Solid {
        zero_line(gc, points, sink);
        return;
    }
    let mut thin = gc.clone();
    thin.line_width = 1;
    wide_dash_line(&thin, points, sink);
}
