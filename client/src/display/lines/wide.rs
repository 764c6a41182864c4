//! 太線
//!
//! 各線分を四角形（水平・垂直なら矩形）として塗り、接合部と端点は
//! 別の多角形や円弧として追加します。描画先を読む ROP のときは
//! 部品ごとのスパンを [`SpanData`] に溜め、重複を除いてから塗ります。

use remote_display_rs_common::protocol::{Point, Rect};

use super::poly::{build_edge, build_poly, iceil, scan_poly, LineFace, PolyEdge, PolyEdges, PolySlope, PolyVertex};
use super::spans::SpanData;
use super::{CapStyle, JoinStyle, LineGc, LineStyle, Span, SpanSink};

/// マイター長の上限（線幅に対する比の2乗の4倍）
const SQSECANT: f64 = 108.856472512142;

/// 円弧を切り取る辺（切り取らない場合は `dy == -1`）
#[derive(Debug, Clone, Copy)]
struct ArcClip {
    edge: PolyEdge,
    y: i32,
    left: bool,
}

impl ArcClip {
    fn none() -> Self {
        Self { edge: PolyEdge { dy: -1, ..PolyEdge::default() }, y: 65536, left: false }
    }

    /// `ybase` 行で辺に達していれば左右端を狭め、辺を1行進める
    fn clip_row(&mut self, ybase: i32, xcl: &mut i32, xcr: &mut i32) {
        if ybase != self.y {
            return;
        }
        if self.left {
            if self.edge.x > *xcl {
                *xcl = self.edge.x;
            }
        } else if self.edge.x < *xcr {
            *xcr = self.edge.x;
        }
        self.y += 1;
        self.edge.step();
    }

    /// 円弧の描画範囲を決める辺か。水平な右辺は `ymax` を制限する
    fn classify(&mut self, ymax: &mut i32) -> bool {
        if self.edge.dy < 0 {
            return false;
        }
        if self.edge.dy == 0 {
            let is_min = self.left;
            if !self.left {
                *ymax = self.y;
            }
            self.y = 65536;
            is_min
        } else {
            (self.edge.signdx < 0) == self.left
        }
    }
}

/// 端面から円弧を切り取る辺を作る
///
/// 接合部では面の外側だけを残し、端点では面の延長線で切ります。
fn face_clip(face: &LineFace, k: f64, join: bool) -> ArcClip {
    let mut dx = -face.dy;
    let mut dy = face.dx;
    let mut xa = face.xa;
    let mut ya = face.ya;
    let mut left = true;
    if join && ya > 0.0 {
        ya = 0.0;
        xa = 0.0;
    }
    if dy < 0 || (dy == 0 && dx > 0) {
        dx = -dx;
        dy = -dy;
        if !join {
            xa = -xa;
            ya = -ya;
        }
        left = !left;
    }
    if dx == 0 && dy == 0 {
        dy = 1;
    }
    if dy == 0 {
        ArcClip {
            edge: PolyEdge { height: 0, x: -32767, stepx: 0, signdx: 0, e: -1, dy: 0, dx: 0 },
            y: iceil(face.ya) + face.y,
            left: !left,
        }
    } else {
        let (y, mut edge) = build_edge(xa, ya, k, dx, dy, face.x, face.y, !left);
        edge.height = 32767;
        ArcClip { edge, y, left: !left }
    }
}

fn round_join_clip(left: &mut LineFace, right: &mut LineFace) -> (ArcClip, ArcClip) {
    let denom = -(left.dx as f64) * right.dy as f64 + right.dx as f64 * left.dy as f64;
    if denom >= 0.0 {
        left.xa = -left.xa;
        left.ya = -left.ya;
    } else {
        right.xa = -right.xa;
        right.ya = -right.ya;
    }
    (face_clip(left, 0.0, true), face_clip(right, 0.0, true))
}

/// 整数座標を中心とする円
fn arc_i(lw: i32, xorg: i32, yorg: i32) -> Vec<Span> {
    if lw == 1 {
        return vec![Span::new(xorg, yorg, 1)];
    }
    let mut top = Vec::with_capacity(lw as usize);
    let mut bottom = Vec::with_capacity(lw as usize);
    let mut y = (lw >> 1) + 1;
    let mut e = if lw & 1 != 0 { -((y << 2) + 3) } else { -(y << 3) };
    let mut ex = -4;
    let mut x = 0;
    while y != 0 {
        e += (y << 3) - 4;
        while e >= 0 {
            x += 1;
            ex = -((x << 3) + 4);
            e += ex;
        }
        y -= 1;
        let mut w = (x << 1) + 1;
        if e == ex && w > 1 {
            w -= 1;
        }
        top.push(Span::new(xorg - x, yorg - y, w));
        if y != 0 && (w > 1 || e != ex) {
            bottom.push(Span::new(xorg - x, yorg + y, w));
        }
    }
    top.extend(bottom.into_iter().rev());
    top
}

fn arc_row(
    out: &mut Vec<Span>,
    ybase: i32,
    xl: i32,
    xr: i32,
    xbase: i32,
    c1: &mut ArcClip,
    c2: &mut ArcClip,
) {
    let mut xcl = xl + xbase;
    let mut xcr = xr + xbase;
    c1.clip_row(ybase, &mut xcl, &mut xcr);
    c2.clip_row(ybase, &mut xcl, &mut xcr);
    if xcr >= xcl {
        out.push(Span::new(xcl, ybase, xcr - xcl + 1));
    }
}

/// 実数座標を中心とする円（2つの辺で切り取り可能）
fn arc_d(lw: i32, xorg: f64, yorg: f64, mut c1: ArcClip, mut c2: ArcClip) -> Vec<Span> {
    let xbase = xorg.floor() as i32;
    let x0 = xorg - xbase as f64;
    let mut ybase = iceil(yorg);
    let y0 = yorg - ybase as f64;
    let xlk = x0 + x0 + 1.0;
    let xrk = x0 + x0 - 1.0;
    let yk = y0 + y0 - 1.0;
    let radius = lw as f64 / 2.0;
    let mut y = (radius - y0 + 1.0).floor() as i32;
    ybase -= y;
    let mut ymin = ybase;
    let mut ymax = 65536;

    let (ymin1, ymin2) = (c1.y, c2.y);
    let min1 = c1.classify(&mut ymax);
    let min2 = c2.classify(&mut ymax);
    if min1 {
        ymin = ymin1;
        if min2 && ymin1 > ymin2 {
            ymin = ymin2;
        }
    } else if min2 {
        ymin = ymin2;
    }

    let mut out = Vec::with_capacity(lw.max(1) as usize);
    let mut el = radius * radius - (y as f64 + y0) * (y as f64 + y0) - x0 * x0;
    let mut er = el + xrk;
    let mut xl = 1;
    let mut xr = 0;
    if x0 < 0.5 {
        xl = 0;
        el -= xlk;
    }

    // 上半分
    let mut boty = if y0 < -0.5 { 1 } else { 0 };
    if ybase + y - boty > ymax {
        boty = ymax - ybase - y;
    }
    while y > boty {
        let k = (y << 1) as f64 + yk;
        er += k;
        while er > 0.0 {
            xr += 1;
            er += xrk - (xr << 1) as f64;
        }
        el += k;
        while el >= 0.0 {
            xl -= 1;
            el += (xl << 1) as f64 - xlk;
        }
        y -= 1;
        ybase += 1;
        if ybase < ymin {
            continue;
        }
        arc_row(&mut out, ybase, xl, xr, xbase, &mut c1, &mut c2);
    }

    // 下半分
    er = xrk - (xr << 1) as f64 - er;
    el = (xl << 1) as f64 - xlk - el;
    boty = (-y0 - radius + 1.0).floor() as i32;
    if ybase + y - boty > ymax {
        boty = ymax - ybase - y;
    }
    while y > boty {
        let k = (y << 1) as f64 + yk;
        er -= k;
        while er >= 0.0 && xr >= 0 {
            xr -= 1;
            er += xrk - (xr << 1) as f64;
        }
        el -= k;
        while el > 0.0 && xl <= 0 {
            xl += 1;
            el += (xl << 1) as f64 - xlk;
        }
        y -= 1;
        ybase += 1;
        if ybase < ymin {
            continue;
        }
        arc_row(&mut out, ybase, xl, xr, xbase, &mut c1, &mut c2);
    }
    out
}

fn negate_face(face: &mut LineFace) {
    face.xa = -face.xa;
    face.ya = -face.ya;
    face.dx = -face.dx;
    face.dy = -face.dy;
}

/// 太線の部品を描画先（またはスパングループ）へ送る
pub(super) struct Painter<'a> {
    pub(super) gc: &'a LineGc,
    sink: &'a mut dyn SpanSink,
    data: Option<SpanData>,
}

impl<'a> Painter<'a> {
    /// 描画先を読む ROP で、部品が重なりうるときだけスパンを溜める
    pub(super) fn new(gc: &'a LineGc, sink: &'a mut dyn SpanSink, npt: usize) -> Self {
        let data = if (npt < 3 && gc.cap_style != CapStyle::Round) || !gc.rop.is_careful() {
            None
        } else {
            Some(SpanData::new(gc.line_style))
        };
        Self { gc, sink, data }
    }

    pub(super) fn line_width(&self) -> i32 {
        self.gc.line_width as i32
    }

    pub(super) fn collects_spans(&self) -> bool {
        self.data.is_some()
    }

    fn emit(&mut self, foreground: bool, spans: Vec<Span>) {
        if spans.is_empty() {
            return;
        }
        match &mut self.data {
            Some(data) => data.append(foreground, spans),
            None => self.sink.fill_spans(&spans, true, foreground),
        }
    }

    pub(super) fn fill_edges(
        &mut self,
        foreground: bool,
        y: i32,
        height: i32,
        left: &[PolyEdge],
        right: &[PolyEdge],
    ) {
        let spans = scan_poly(y, height, left, right);
        self.emit(foreground, spans);
    }

    pub(super) fn fill_poly(&mut self, foreground: bool, edges: &PolyEdges) {
        self.fill_edges(foreground, edges.y, edges.height, &edges.left, &edges.right);
    }

    pub(super) fn fill_rect(&mut self, foreground: bool, x: i32, y: i32, w: i32, h: i32) {
        if w <= 0 || h <= 0 {
            return;
        }
        match &mut self.data {
            Some(data) => {
                let spans = (y..y + h).map(|row| Span::new(x, row, w)).collect();
                data.append(foreground, spans);
            }
            None => self.sink.fill_rects(&[Rect::from_size(x, y, w, h)], foreground),
        }
    }

    /// 1ピクセル（重複除去の対象外）
    pub(super) fn one_point(&mut self, foreground: bool, x: i32, y: i32) {
        self.sink.fill_spans(&[Span::new(x, y, 1)], true, foreground);
    }

    /// 溜めたスパンを塗って終了
    pub(super) fn finish(self) {
        if let Some(data) = self.data {
            data.flush(self.sink);
        }
    }

    /// 4辺の多角形（線分本体や延長端点）を塗る
    ///
    /// 各辺は `(開始行, 辺)` で、`dx` の符号で左右への振り分けが決まります。
    #[allow(clippy::too_many_arguments)]
    fn fill_quad(
        &mut self,
        foreground: bool,
        dx: i32,
        (righty, mut right): (i32, PolyEdge),
        (lefty, mut left): (i32, PolyEdge),
        (topy, mut top): (i32, PolyEdge),
        (bottomy, mut bottom): (i32, PolyEdge),
        finaly: i32,
    ) {
        if dx < 0 {
            left.height = bottomy - lefty;
            right.height = finaly - righty;
            top.height = righty - topy;
        } else {
            right.height = bottomy - righty;
            left.height = finaly - lefty;
            top.height = lefty - topy;
        }
        bottom.height = finaly - bottomy;
        let height = bottom.height + bottomy - topy;
        if dx < 0 {
            self.fill_edges(foreground, topy, height, &[left, bottom], &[top, right]);
        } else {
            self.fill_edges(foreground, topy, height, &[top, left], &[right, bottom]);
        }
    }

    /// 2つの線分の接合部
    pub(super) fn join(&mut self, foreground: bool, left: &mut LineFace, right: &mut LineFace) {
        let lw = self.line_width();
        let mut join = self.gc.join_style;
        let denom = -(left.dx as f64) * right.dy as f64 + right.dx as f64 * left.dy as f64;

        if lw == 1 && self.data.is_none() {
            // どちらかの線分が接合点を描いている
            if left.dx > 0 || (left.dx == 0 && left.dy > 0) {
                return;
            }
            if right.dx > 0 || (right.dx == 0 && right.dy > 0) {
                return;
            }
            if join != JoinStyle::Round && denom == 0.0 {
                return;
            }
            if join != JoinStyle::Miter {
                self.one_point(foreground, left.x, left.y);
                return;
            }
        } else {
            if join == JoinStyle::Round {
                self.line_arc(foreground, Some(left), Some(right), 0.0, 0.0, true);
                return;
            }
            if denom == 0.0 {
                return;
            }
        }

        let swapslopes = denom <= 0.0;
        if swapslopes {
            negate_face(right);
        } else {
            negate_face(left);
        }

        let mut vertices = [
            PolyVertex::new(right.xa, right.ya),
            PolyVertex::new(0.0, 0.0),
            PolyVertex::new(left.xa, left.ya),
            PolyVertex::default(),
        ];
        let mut slopes = [
            PolySlope::new(-right.dy, right.dx, 0.0),
            PolySlope::new(left.dy, -left.dx, 0.0),
            PolySlope::default(),
            PolySlope::default(),
        ];

        let (mut mx, mut my) = (0.0, 0.0);
        if join == JoinStyle::Miter {
            my = (left.dy as f64 * (right.xa * right.dy as f64 - right.ya * right.dx as f64)
                - right.dy as f64 * (left.xa * left.dy as f64 - left.ya * left.dx as f64))
                / denom;
            mx = if left.dy != 0 {
                left.xa + (my - left.ya) * left.dx as f64 / left.dy as f64
            } else {
                right.xa + (my - right.ya) * right.dx as f64 / right.dy as f64
            };
            if (mx * mx + my * my) * 4.0 > SQSECANT * (lw * lw) as f64 {
                join = JoinStyle::Bevel;
            }
        }

        let count = if join == JoinStyle::Miter {
            let sign = if swapslopes { -1 } else { 1 };
            slopes[2] = PolySlope::new(left.dx * sign, left.dy * sign, left.k * sign as f64);
            vertices[3] = PolyVertex::new(mx, my);
            slopes[3] = PolySlope::new(right.dx * sign, right.dy * sign, right.k * sign as f64);
            4
        } else {
            let dx = right.xa - left.xa;
            let dy = right.ya - left.ya;
            let scale = dx.abs().max(dy.abs());
            if scale == 0.0 {
                return;
            }
            let sdx = (dx * 65536.0 / scale) as i32;
            let sdy = (dy * 65536.0 / scale) as i32;
            let k = ((left.xa + right.xa) * sdy as f64 - (left.ya + right.ya) * sdx as f64) / 2.0;
            slopes[2] = PolySlope::new(sdx, sdy, k);
            3
        };

        let edges = build_poly(&vertices[..count], &slopes[..count], left.x, left.y);
        self.fill_poly(foreground, &edges);
    }

    /// 円弧（丸い端点や接合部）
    ///
    /// `is_int` なら面の端点を中心とし、そうでなければ `(xorg, yorg)` を使います。
    pub(super) fn line_arc(
        &mut self,
        foreground: bool,
        left: Option<&mut LineFace>,
        right: Option<&mut LineFace>,
        xorg: f64,
        yorg: f64,
        is_int: bool,
    ) {
        let lw = self.line_width();
        let gc = self.gc;
        let (xorgi, yorgi) = match (&left, &right) {
            (Some(f), _) | (None, Some(f)) if is_int => (f.x, f.y),
            _ => (0, 0),
        };
        let (mut xorg, mut yorg, mut is_int) = (xorg, yorg, is_int);
        let mut c1 = ArcClip::none();
        let mut c2 = ArcClip::none();

        if (gc.line_style != LineStyle::Solid || lw > 2)
            && ((gc.cap_style == CapStyle::Round && gc.join_style != JoinStyle::Round)
                || (gc.join_style == JoinStyle::Round && gc.cap_style == CapStyle::Butt))
        {
            if is_int {
                xorg = xorgi as f64;
                yorg = yorgi as f64;
            }
            match (left, right) {
                (Some(l), Some(r)) => {
                    let (a, b) = round_join_clip(l, r);
                    c1 = a;
                    c2 = b;
                }
                (Some(l), None) => c1 = face_clip(l, if is_int { 0.0 } else { l.k }, false),
                (None, Some(r)) => c2 = face_clip(r, if is_int { 0.0 } else { r.k }, false),
                (None, None) => {}
            }
            is_int = false;
        }

        let spans = if is_int { arc_i(lw, xorgi, yorgi) } else { arc_d(lw, xorg, yorg, c1, c2) };
        self.emit(foreground, spans);
    }

    /// 延長端点（破線の区間境界で使う）
    pub(super) fn projecting_cap(&mut self, foreground: bool, face: &LineFace, is_left: bool) {
        let lw = self.line_width();
        let (xorgi, yorgi) = (face.x, face.y);
        let (dx, mut dy) = (face.dx, face.dy);
        let k = face.k;

        if dy == 0 {
            let mut l = PolyEdge { height: lw, x: xorgi, stepx: 0, signdx: 1, e: -lw, dx: 0, dy: lw };
            let mut r = l;
            if is_left {
                l.x -= lw >> 1;
            } else {
                r.x += (lw + 1) >> 1;
            }
            self.fill_edges(foreground, yorgi - (lw >> 1), lw, &[l], &[r]);
        } else if dx == 0 {
            let mut is_left = is_left;
            if dy < 0 {
                dy = -dy;
                is_left = !is_left;
            }
            let mut topy = yorgi;
            let mut bottomy = yorgi + dy;
            if is_left {
                topy -= lw >> 1;
            } else {
                bottomy += lw >> 1;
            }
            let l = PolyEdge { height: bottomy - topy, x: xorgi - (lw >> 1), stepx: 0, signdx: 1, e: -dy, dx, dy };
            let r = PolyEdge { x: l.x + (lw - 1), ..l };
            self.fill_edges(foreground, topy, bottomy - topy, &[l], &[r]);
        } else {
            let (xa, ya) = (face.xa, face.ya);
            let (pxo, pyo) = (-ya, xa);
            let (dxf, dyf) = (dx as f64, dy as f64);
            let (right, left, top, bottom, maxy) = if is_left {
                let right = build_edge(xa, ya, k, dx, dy, xorgi, yorgi, false);
                let (xa, ya, k) = (-xa, -ya, -k);
                let left = build_edge(xa - pxo, ya - pyo, k, dx, dy, xorgi, yorgi, true);
                let (xa, ya) = if dx > 0 { (-xa, -ya) } else { (xa, ya) };
                let (xap, yap) = (xa - pxo, ya - pyo);
                let top = build_edge(xap, yap, xap * dxf + yap * dyf, -dy, dx, xorgi, yorgi, dx > 0);
                let bottom = build_edge(xa, ya, 0.0, -dy, dx, xorgi, yorgi, dx < 0);
                (right, left, top, bottom, -ya)
            } else {
                let right = build_edge(xa - pxo, ya - pyo, k, dx, dy, xorgi, yorgi, false);
                let (xa, ya, k) = (-xa, -ya, -k);
                let left = build_edge(xa, ya, k, dx, dy, xorgi, yorgi, true);
                let (xa, ya) = if dx > 0 { (-xa, -ya) } else { (xa, ya) };
                let (xap, yap) = (xa - pxo, ya - pyo);
                let top = build_edge(xa, ya, 0.0, -dy, dx, xorgi, yorgi, dx > 0);
                let bottom = build_edge(xap, yap, xap * dxf + yap * dyf, -dy, dx, xorgi, yorgi, dx < 0);
                (right, left, top, bottom, -ya + pyo)
            };
            let finaly = iceil(maxy) + yorgi;
            self.fill_quad(foreground, dx, right, left, top, bottom, finaly);
        }
    }

    /// 線分本体を塗り、始点側と終点側の端面を返す
    ///
    /// 返す面の順は引数の点の順（始点、終点）に対応します。
    #[allow(clippy::too_many_arguments)]
    pub(super) fn wide_segment(
        &mut self,
        foreground: bool,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        project_left: bool,
        project_right: bool,
    ) -> (LineFace, LineFace) {
        let lw = self.line_width();

        // 常に上から下へ描く
        let swapped = y2 < y1 || (y2 == y1 && x2 < x1);
        let (x1, y1, x2, y2, project_left, project_right) = if swapped {
            (x2, y2, x1, y1, project_right, project_left)
        } else {
            (x1, y1, x2, y2, project_left, project_right)
        };

        let dx = x2 - x1;
        let dy = y2 - y1;
        let mut lface = LineFace { x: x1, y: y1, dx, dy, ..LineFace::default() };
        let mut rface = LineFace { x: x2, y: y2, dx: -dx, dy: -dy, ..LineFace::default() };

        if dy == 0 {
            rface.xa = 0.0;
            rface.ya = lw as f64 / 2.0;
            rface.k = -((lw * dx) as f64) / 2.0;
            lface.xa = 0.0;
            lface.ya = -rface.ya;
            lface.k = rface.k;
            let mut x = x1;
            if project_left {
                x -= lw >> 1;
            }
            let y = y1 - (lw >> 1);
            let mut w = x2 - x;
            if project_right {
                w += (lw + 1) >> 1;
            }
            self.fill_rect(foreground, x, y, w, lw);
        } else if dx == 0 {
            lface.xa = lw as f64 / 2.0;
            lface.ya = 0.0;
            lface.k = (lw * dy) as f64 / 2.0;
            rface.xa = -lface.xa;
            rface.ya = 0.0;
            rface.k = lface.k;
            let mut y = y1;
            if project_left {
                y -= lw >> 1;
            }
            let x = x1 - (lw >> 1);
            let mut h = y2 - y;
            if project_right {
                h += (lw + 1) >> 1;
            }
            self.fill_rect(foreground, x, y, lw, h);
        } else {
            let (dxf, dyf) = (dx as f64, dy as f64);
            let l = lw as f64 / 2.0;
            let len = dxf.hypot(dyf);
            let r = l / len;

            // 上側の境界
            let mut ya = -r * dxf;
            let mut xa = r * dyf;
            let (pxo, pyo) = if project_left || project_right { (-ya, xa) } else { (0.0, 0.0) };
            let mut k = l * len;

            lface.xa = xa;
            lface.ya = ya;
            lface.k = k;
            rface.xa = -xa;
            rface.ya = -ya;
            rface.k = k;

            let right = if project_left {
                build_edge(xa - pxo, ya - pyo, k, dx, dy, x1, y1, false)
            } else {
                build_edge(xa, ya, k, dx, dy, x1, y1, false)
            };

            // 下側の境界
            ya = -ya;
            xa = -xa;
            k = -k;
            let left = if project_left {
                build_edge(xa - pxo, ya - pyo, k, dx, dy, x1, y1, true)
            } else {
                build_edge(xa, ya, k, dx, dy, x1, y1, true)
            };

            if dx > 0 {
                ya = -ya;
                xa = -xa;
            }

            let top = if project_left {
                let (xap, yap) = (xa - pxo, ya - pyo);
                build_edge(xap, yap, xap * dxf + yap * dyf, -dy, dx, x1, y1, dx > 0)
            } else {
                build_edge(xa, ya, 0.0, -dy, dx, x1, y1, dx > 0)
            };

            let (bottom, maxy) = if project_right {
                let (xap, yap) = (xa + pxo, ya + pyo);
                (build_edge(xap, yap, xap * dxf + yap * dyf, -dy, dx, x2, y2, dx < 0), -ya + pyo)
            } else {
                (build_edge(xa, ya, 0.0, -dy, dx, x2, y2, dx < 0), -ya)
            };

            let finaly = iceil(maxy) + y2;
            self.fill_quad(foreground, dx, right, left, top, bottom, finaly);
        }

        if swapped {
            (rface, lface)
        } else {
            (lface, rface)
        }
    }

    /// 丸い端点（線幅1で重複除去しないときは1ピクセル）
    pub(super) fn round_cap(&mut self, foreground: bool, face: &mut LineFace, at_start: bool) {
        if self.line_width() == 1 && self.data.is_none() {
            self.one_point(foreground, face.x, face.y);
        } else if at_start {
            self.line_arc(foreground, Some(face), None, 0.0, 0.0, true);
        } else {
            self.line_arc(foreground, None, Some(face), 0.0, 0.0, true);
        }
    }
}

/// 実線の太線を描く
pub fn wide_line(gc: &LineGc, points: &[Point], sink: &mut dyn SpanSink) {
    let first_point = match points.first() {
        Some(p) => *p,
        None => return,
    };
    let cap = gc.cap_style;
    let mut painter = Painter::new(gc, sink, points.len());

    let self_join = points.len() > 1 && points.last() == Some(&first_point);
    let mut project_left = cap == CapStyle::Projecting && !self_join;
    let mut first = true;
    let mut something_drawn = false;
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
            let project_right = is_last && cap == CapStyle::Projecting && !self_join;
            let (mut left_face, right) = painter.wide_segment(true, x1, y1, x2, y2, project_left, project_right);
            right_face = right;
            if first {
                if self_join {
                    first_face = left_face;
                } else if cap == CapStyle::Round {
                    painter.round_cap(true, &mut left_face, true);
                }
            } else {
                painter.join(true, &mut left_face, &mut prev_right);
            }
            prev_right = right_face;
            first = false;
            project_left = false;
        }
        if is_last && something_drawn {
            if self_join {
                painter.join(true, &mut first_face, &mut right_face);
            } else if cap == CapStyle::Round {
                painter.round_cap(true, &mut right_face, false);
            }
        }
    }

    // すべての点が同じ位置
    if !something_drawn {
        let project = cap == CapStyle::Projecting;
        let (mut l, mut r) = painter.wide_segment(true, x2, y2, x2, y2, project, project);
        if cap == CapStyle::Round {
            painter.line_arc(true, Some(&mut l), None, 0.0, 0.0, true);
            r.dx = -1;
            painter.line_arc(true, None, Some(&mut r), 0.0, 0.0, true);
        }
    }
    painter.finish();
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::super::testing::Recorder;
    use super::*;
    use crate::display::rop::Rop;

    fn gc(lw: u16) -> LineGc {
        let mut gc = LineGc::new(100, 100);
        gc.line_width = lw;
        gc
    }

    fn pts(list: &[(i32, i32)]) -> Vec<Point> {
        list.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn block(x: std::ops::Range<i32>, y: std::ops::Range<i32>) -> BTreeSet<(i32, i32)> {
        x.flat_map(|px| y.clone().map(move |py| (px, py))).collect()
    }

    #[test]
    fn test_horizontal_butt_is_rect() {
        let mut sink = Recorder::default();
        wide_line(&gc(4), &pts(&[(2, 5), (8, 5)]), &mut sink);
        assert_eq!(sink.rects, vec![(Rect::new(2, 3, 8, 7), true)]);
        assert!(sink.spans.is_empty());
    }

    #[test]
    fn test_horizontal_projecting_extends_both_ends() {
        let mut g = gc(4);
        g.cap_style = CapStyle::Projecting;
        let mut sink = Recorder::default();
        wide_line(&g, &pts(&[(2, 5), (8, 5)]), &mut sink);
        assert_eq!(sink.pixels(), block(0..10, 3..7));
    }

    #[test]
    fn test_vertical_segment_direction_independent() {
        let mut down = Recorder::default();
        wide_line(&gc(3), &pts(&[(5, 1), (5, 9)]), &mut down);
        let mut up = Recorder::default();
        wide_line(&gc(3), &pts(&[(5, 9), (5, 1)]), &mut up);
        assert_eq!(down.pixels(), block(4..7, 1..9));
        assert_eq!(down.pixels(), up.pixels());
    }

    #[test]
    fn test_miter_join_fills_outer_corner() {
        let mut sink = Recorder::default();
        wide_line(&gc(4), &pts(&[(2, 2), (12, 2), (12, 12)]), &mut sink);
        let mut expected = block(2..14, 0..4);
        expected.extend(block(10..14, 0..12));
        assert_eq!(sink.pixels(), expected);
    }

    #[test]
    fn test_round_join_with_xor_touches_each_pixel_once() {
        let mut g = gc(5);
        g.rop = Rop::Xor;
        g.join_style = JoinStyle::Round;
        let mut sink = Recorder::default();
        wide_line(&g, &pts(&[(2, 2), (12, 2), (12, 12)]), &mut sink);

        assert!(sink.rects.is_empty());
        let counts = sink.counts();
        assert!(!counts.is_empty());
        assert!(counts.values().all(|&n| n == 1), "重複して塗られたピクセルがあります");
        // 外側の角を円弧が埋める
        assert!((12..15).any(|x| (0..2).any(|y| counts.contains_key(&(x, y)))));
    }

    #[test]
    fn test_bevel_join_cuts_outer_corner() {
        let mut miter = Recorder::default();
        wide_line(&gc(4), &pts(&[(2, 2), (12, 2), (12, 12)]), &mut miter);
        let mut g = gc(4);
        g.join_style = JoinStyle::Bevel;
        let mut bevel = Recorder::default();
        wide_line(&g, &pts(&[(2, 2), (12, 2), (12, 12)]), &mut bevel);

        let bevel = bevel.pixels();
        assert!(bevel.is_subset(&miter.pixels()));
        // 角の先端はマイターだけが塗る
        assert!(miter.pixels().contains(&(13, 0)));
        assert!(!bevel.contains(&(13, 0)));
        assert!(bevel.contains(&(11, 1)));
    }

    #[test]
    fn test_acute_miter_falls_back_to_bevel() {
        let points = pts(&[(10, 20), (60, 20), (10, 24)]);
        let mut miter = Recorder::default();
        wide_line(&gc(4), &points, &mut miter);
        let mut g = gc(4);
        g.join_style = JoinStyle::Bevel;
        let mut bevel = Recorder::default();
        wide_line(&g, &points, &mut bevel);

        // 鋭角のマイターは x=160 付近まで伸びるため上限を超えて面取りになる
        let max_x = miter.pixels().iter().map(|&(x, _)| x).max();
        assert!(matches!(max_x, Some(x) if x <= 61), "マイターが上限を超えて伸びました: {:?}", max_x);
        assert_eq!(miter.pixels(), bevel.pixels());
    }

    #[test]
    fn test_round_cap_row_profile() {
        let mut g = gc(8);
        g.cap_style = CapStyle::Round;
        let mut sink = Recorder::default();
        wide_line(&g, &pts(&[(10, 10), (20, 10)]), &mut sink);
        let pixels = sink.pixels();

        assert!(pixels.is_superset(&block(10..20, 6..14)));
        assert!(pixels.iter().all(|&(x, y)| (5..25).contains(&x) && (5..15).contains(&y)));
        let row_min = |row: i32| pixels.iter().filter(|&&(_, y)| y == row).map(|&(x, _)| x).min();
        let top = pixels.iter().map(|&(_, y)| y).min();
        let (top_min, mid_min) = match (top.and_then(row_min), row_min(9)) {
            (Some(t), Some(m)) => (t, m),
            other => panic!("行が見つかりません: {:?}", other),
        };
        // 中央の行ほど端点の外へ張り出す
        assert!(mid_min < 10);
        assert!(top_min > mid_min);
    }

    #[test]
    fn test_careful_rop_paints_round_caps_once() {
        let mut g = gc(6);
        g.cap_style = CapStyle::Round;
        let mut copy = Recorder::default();
        wide_line(&g, &pts(&[(10, 10), (30, 10)]), &mut copy);

        g.rop = Rop::Xor;
        let mut xor = Recorder::default();
        wide_line(&g, &pts(&[(10, 10), (30, 10)]), &mut xor);

        assert!(xor.rects.is_empty());
        assert!(xor.counts().values().all(|&n| n == 1), "重複して塗られたピクセルがあります");
        assert_eq!(xor.pixels(), copy.pixels());
    }

    #[test]
    fn test_careful_rop_merges_miter_and_projecting_caps() {
        let points = pts(&[(2, 2), (12, 2), (12, 12)]);
        let mut g = gc(4);
        g.cap_style = CapStyle::Projecting;
        let mut copy = Recorder::default();
        wide_line(&g, &points, &mut copy);

        g.rop = Rop::Xor;
        let mut xor = Recorder::default();
        wide_line(&g, &points, &mut xor);

        assert!(xor.counts().values().all(|&n| n == 1), "重複して塗られたピクセルがあります");
        assert_eq!(xor.pixels(), copy.pixels());
    }

    #[test]
    fn test_diagonal_segment_is_symmetric() {
        let mut a = Recorder::default();
        wide_line(&gc(3), &pts(&[(10, 10), (20, 16)]), &mut a);
        let mut b = Recorder::default();
        wide_line(&gc(3), &pts(&[(20, 16), (10, 10)]), &mut b);
        assert!(!a.pixels().is_empty());
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn test_integer_circle_is_symmetric() {
        let spans = arc_i(5, 10, 10);
        assert_eq!(spans.len(), 5);
        assert!(spans.windows(2).all(|w| w[0].y < w[1].y));
        for s in &spans {
            let mirrored = spans.iter().find(|m| m.y == 20 - s.y).map(|m| (m.x, m.width));
            assert_eq!(mirrored, Some((s.x, s.width)));
        }
    }

    #[test]
    fn test_empty_points_draw_nothing() {
        let mut sink = Recorder::default();
        wide_line(&gc(4), &[], &mut sink);
        assert!(sink.spans.is_empty() && sink.rects.is_empty());
    }
}
