//! ゼロ幅線
//!
//! 整数 Bresenham で線を描きます。描画先の矩形でクリップするときは、
//! 新しい端点と誤差項を解析的に求めるため、クリップした線のピクセルは
//! クリップしない線のピクセルと完全に一致します。

use remote_display_rs_common::protocol::Point;

use super::{CapStyle, LineGc, Span, SpanSink};

const X_DECREASING: u32 = 4;
const Y_DECREASING: u32 = 2;
const Y_MAJOR: u32 = 1;

const OUT_LEFT: u32 = 0x08;
const OUT_RIGHT: u32 = 0x04;
const OUT_ABOVE: u32 = 0x02;
const OUT_BELOW: u32 = 0x01;

// クリップ方程式の項（ビットが0の項は暗黙の既定）
const T_2NDX: u32 = 1 << 0;
const T_DXNOTY: u32 = 1 << 1;
const T_SUBDXORY: u32 = 1 << 2;
const T_ADDDX: u32 = T_DXNOTY;
const T_SUBDX: u32 = T_DXNOTY | T_SUBDXORY;
const T_ADDDY: u32 = 0;
const T_SUBDY: u32 = T_SUBDXORY;
const T_BIASSUBONE: u32 = 1 << 3;
const T_SUBBIAS: u32 = 0;
const T_DIV2DX: u32 = 1 << 4;
const T_DIV2DY: u32 = 0;
const T_ADDONE: u32 = 1 << 5;

// 16通りのクリップ方程式
// X主軸でXを動かす: 1, 1b, 2, 2b / Y主軸でXを動かす: 3, 3b, 4, 4b
// X主軸でYを動かす: 5, 5b, 6, 6b / Y主軸でYを動かす: 7, 7b, 8, 8b
const EQN1: u32 = T_ADDDX | T_SUBBIAS | T_DIV2DX;
const EQN1B: u32 = T_ADDDX | T_SUBBIAS | T_DIV2DX;
const EQN2: u32 = T_ADDDX | T_BIASSUBONE | T_DIV2DX;
const EQN2B: u32 = T_ADDDX | T_BIASSUBONE | T_DIV2DX;
const EQN3: u32 = T_SUBDY | T_BIASSUBONE | T_DIV2DX | T_ADDONE;
const EQN3B: u32 = T_ADDDY | T_BIASSUBONE | T_DIV2DX;
const EQN4: u32 = T_SUBDY | T_SUBBIAS | T_DIV2DX | T_ADDONE;
const EQN4B: u32 = T_ADDDY | T_SUBBIAS | T_DIV2DX;
const EQN5: u32 = T_2NDX | T_SUBDX | T_BIASSUBONE | T_DIV2DY | T_ADDONE;
const EQN5B: u32 = T_2NDX | T_ADDDX | T_BIASSUBONE | T_DIV2DY;
const EQN6: u32 = T_2NDX | T_SUBDX | T_SUBBIAS | T_DIV2DY | T_ADDONE;
const EQN6B: u32 = T_2NDX | T_ADDDX | T_SUBBIAS | T_DIV2DY;
const EQN7: u32 = T_2NDX | T_ADDDY | T_SUBBIAS | T_DIV2DY;
const EQN7B: u32 = T_2NDX | T_ADDDY | T_SUBBIAS | T_DIV2DY;
const EQN8: u32 = T_2NDX | T_ADDDY | T_BIASSUBONE | T_DIV2DY;
const EQN8B: u32 = T_2NDX | T_ADDDY | T_BIASSUBONE | T_DIV2DY;

/// 端点がクリップ矩形のどちら側にあるか（max は含む）
fn outcode(x: i32, y: i32, xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> u32 {
    let mut code = 0;
    if x < xmin {
        code |= OUT_LEFT;
    }
    if x > xmax {
        code |= OUT_RIGHT;
    }
    if y < ymin {
        code |= OUT_ABOVE;
    }
    if y > ymax {
        code |= OUT_BELOW;
    }
    code
}

/// クリップ後の線分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clipped {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    pt1_clipped: u32,
    pt2_clipped: u32,
}

/// 線分を矩形でクリップ
///
/// 完全に外側なら `Err` に端点のアウトコードを入れて返します。
#[allow(clippy::too_many_arguments)]
fn clip_line(
    (xmin, ymin, xmax, ymax): (i32, i32, i32, i32),
    (mut x1, mut y1, mut x2, mut y2): (i32, i32, i32, i32),
    adx: u32,
    ady: u32,
    octant: u32,
    bias: u32,
    mut oc1: u32,
    mut oc2: u32,
) -> std::result::Result<Clipped, (u32, u32)> {
    let (mut x1_orig, mut y1_orig, mut x2_orig, mut y2_orig) = (x1, y1, x2, y2);
    let mut swapped = false;
    let mut clip1 = 0u32;
    let mut clip2 = 0u32;
    let xmajor = octant & Y_MAJOR == 0;
    let bias = (bias >> octant) & 1;

    loop {
        if oc1 & oc2 != 0 {
            return Err((oc1, oc2));
        }
        if oc1 | oc2 == 0 {
            if swapped {
                std::mem::swap(&mut x1, &mut x2);
                std::mem::swap(&mut y1, &mut y2);
                std::mem::swap(&mut clip1, &mut clip2);
            }
            return Ok(Clipped { x1, y1, x2, y2, pt1_clipped: clip1, pt2_clipped: clip2 });
        }

        // 外側の端点を1つずつ動かす
        if oc1 == 0 {
            std::mem::swap(&mut x1, &mut x2);
            std::mem::swap(&mut y1, &mut y2);
            std::mem::swap(&mut x1_orig, &mut x2_orig);
            std::mem::swap(&mut y1_orig, &mut y2_orig);
            std::mem::swap(&mut oc1, &mut oc2);
            std::mem::swap(&mut clip1, &mut clip2);
            swapped = !swapped;
        }
        clip1 |= oc1;

        let mut negslope;
        let mut utmp: u32;
        let eqn: u32;
        let anchorval: i32;
        // 左、上、右、下の順に処理する
        let horizontal = oc1 & OUT_LEFT != 0 || (oc1 & OUT_ABOVE == 0 && oc1 & OUT_RIGHT != 0);
        if horizontal {
            negslope = octant & Y_DECREASING != 0;
            let (near, far, edge) = if oc1 & OUT_LEFT != 0 {
                (xmin.wrapping_sub(x1_orig), x2_orig.wrapping_sub(xmin), xmin)
            } else {
                (x1_orig.wrapping_sub(xmax), xmax.wrapping_sub(x2_orig), xmax)
            };
            utmp = near as u32;
            if utmp <= 32767 {
                eqn = match (xmajor, swapped) {
                    (true, true) => EQN2,
                    (true, false) => EQN1,
                    (false, true) => EQN4,
                    (false, false) => EQN3,
                };
                anchorval = y1_orig;
            } else {
                utmp = far as u32;
                eqn = match (xmajor, swapped) {
                    (true, true) => EQN1B,
                    (true, false) => EQN2B,
                    (false, true) => EQN3B,
                    (false, false) => EQN4B,
                };
                anchorval = y2_orig;
                negslope = !negslope;
            }
            x1 = edge;
        } else {
            negslope = octant & X_DECREASING != 0;
            let (near, far, edge) = if oc1 & OUT_ABOVE != 0 {
                (ymin.wrapping_sub(y1_orig), y2_orig.wrapping_sub(ymin), ymin)
            } else {
                (y1_orig.wrapping_sub(ymax), ymax.wrapping_sub(y2_orig), ymax)
            };
            utmp = near as u32;
            if utmp <= 32767 {
                eqn = match (xmajor, swapped) {
                    (true, true) => EQN6,
                    (true, false) => EQN5,
                    (false, true) => EQN8,
                    (false, false) => EQN7,
                };
                anchorval = x1_orig;
            } else {
                utmp = far as u32;
                eqn = match (xmajor, swapped) {
                    (true, true) => EQN5B,
                    (true, false) => EQN6B,
                    (false, true) => EQN7B,
                    (false, false) => EQN8B,
                };
                anchorval = x2_orig;
                negslope = !negslope;
            }
            y1 = edge;
        }

        if swapped {
            negslope = !negslope;
        }

        // 2M または 2N
        utmp <<= 1;
        utmp = if eqn & T_2NDX != 0 { utmp.wrapping_mul(adx) } else { utmp.wrapping_mul(ady) };
        let delta = if eqn & T_DXNOTY != 0 { adx } else { ady };
        utmp = if eqn & T_SUBDXORY != 0 { utmp.wrapping_sub(delta) } else { utmp.wrapping_add(delta) };
        utmp = if eqn & T_BIASSUBONE != 0 {
            utmp.wrapping_add(bias).wrapping_sub(1)
        } else {
            utmp.wrapping_sub(bias)
        };
        let divisor = if eqn & T_DIV2DX != 0 { adx << 1 } else { ady << 1 };
        if divisor == 0 {
            return Err((oc1, oc2));
        }
        utmp /= divisor;
        if eqn & T_ADDONE != 0 {
            utmp = utmp.wrapping_add(1);
        }
        if negslope {
            utmp = (utmp as i32).wrapping_neg() as u32;
        }
        if eqn & T_2NDX != 0 {
            x1 = anchorval.wrapping_add(utmp as i32);
        } else {
            y1 = anchorval.wrapping_add(utmp as i32);
        }

        oc1 = outcode(x1, y1, xmin, ymin, xmax, ymax);
    }
}

/// 1行ずつ隣接する点をスパンにまとめるバッファ
struct PointSpans {
    spans: Vec<Span>,
    current_y: i32,
    new_span: bool,
}

impl PointSpans {
    fn new() -> Self {
        Self { spans: Vec::new(), current_y: 0, new_span: true }
    }

    fn output(&mut self, x: i32, y: i32) {
        if !self.new_span && y == self.current_y {
            if let Some(last) = self.spans.last_mut() {
                if x < last.x {
                    last.x = x;
                }
                last.width += 1;
                return;
            }
        }
        self.spans.push(Span::new(x, y, 1));
        self.current_y = y;
        self.new_span = false;
    }

    fn flush(&mut self, sink: &mut dyn SpanSink) {
        if !self.spans.is_empty() {
            sink.fill_spans(&self.spans, false, true);
        }
        self.spans.clear();
        self.new_span = true;
    }
}

/// 実線のゼロ幅折れ線を描く
///
/// 描画先の範囲 `[0, width) x [0, height)` でクリップします。
/// 端点の扱いは `cap_style` が [`CapStyle::NotLast`] のときだけ変わり、
/// 最後の点を描きません。
pub fn zero_line(gc: &LineGc, points: &[Point], sink: &mut dyn SpanSink) {
    let first = match points.first() {
        Some(p) => *p,
        None => return,
    };
    if gc.width <= 0 || gc.height <= 0 {
        return;
    }
    let bounds = (0, 0, gc.width - 1, gc.height - 1);
    let (xleft, ytop, xright, ybottom) = bounds;
    let bias = gc.zero_line_bias;

    let mut buf = PointSpans::new();
    let (xstart, ystart) = (first.x, first.y);
    let (mut x2, mut y2) = (xstart, ystart);
    let mut oc2 = outcode(x2, y2, xleft, ytop, xright, ybottom);
    let (mut x, mut y) = (0, 0);
    let mut pt2_clipped = 0u32;

    for pt in &points[1..] {
        buf.flush(sink);

        let (x1, y1, oc1) = (x2, y2, oc2);
        x2 = pt.x;
        y2 = pt.y;
        oc2 = outcode(x2, y2, xleft, ytop, xright, ybottom);

        let mut octant = 0u32;
        let mut signdx = 1;
        let mut adx = x2 - x1;
        if adx < 0 {
            adx = -adx;
            signdx = -1;
            octant |= X_DECREASING;
        }
        let mut signdy = 1;
        let mut ady = y2 - y1;
        if ady < 0 {
            ady = -ady;
            signdy = -1;
            octant |= Y_DECREASING;
        }

        let x_major = adx > ady;
        let (major, minor) = if x_major { (adx, ady) } else { (ady, adx) };
        if !x_major {
            octant |= Y_MAJOR;
        }
        let e1 = minor << 1;
        let e2 = e1 - (major << 1);
        let mut e = e1 - major;
        e -= ((bias >> octant) & 1) as i32;
        let mut length = major;

        let (mut nx1, mut ny1) = (x1, y1);
        pt2_clipped = 0;
        if oc1 | oc2 != 0 {
            match clip_line(bounds, (x1, y1, x2, y2), adx as u32, ady as u32, octant, bias, oc1, oc2) {
                Err((_, clip2)) => {
                    pt2_clipped = clip2;
                    continue;
                }
                Ok(c) => {
                    length = if x_major { (c.x2 - c.x1).abs() } else { (c.y2 - c.y1).abs() };
                    // 終点がクリップされたら端点の扱いに関係なく最後まで描く
                    if c.pt2_clipped != 0 {
                        length += 1;
                    }
                    if c.pt1_clipped != 0 {
                        let clipdx = (c.x1 - x1).abs();
                        let clipdy = (c.y1 - y1).abs();
                        e += if x_major {
                            clipdy * e2 + (clipdx - clipdy) * e1
                        } else {
                            clipdx * e2 + (clipdy - clipdx) * e1
                        };
                    }
                    nx1 = c.x1;
                    ny1 = c.y1;
                    pt2_clipped = c.pt2_clipped;
                }
            }
        }

        x = nx1;
        y = ny1;
        let e3 = e2 - e1;
        e -= e1;
        for _ in 0..length {
            buf.output(x, y);
            e += e1;
            if x_major {
                if e >= 0 {
                    y += signdy;
                    e += e3;
                }
                x += signdx;
            } else {
                if e >= 0 {
                    x += signdx;
                    e += e3;
                }
                y += signdy;
            }
        }
    }

    // 最後の線分の終点は、クリップされておらず NotLast でもないときだけ描く。
    // 閉じた折れ線の終点は始点と重なるので描かない（1線分だけの場合を除く）
    if pt2_clipped == 0
        && gc.cap_style != CapStyle::NotLast
        && (xstart != x2 || ystart != y2 || points.len() == 2)
    {
        buf.output(x, y);
    }
    buf.flush(sink);
}
