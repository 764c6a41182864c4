//! 多角形の辺と走査変換
//!
//! 太線の各部品（線分本体、接合部、端点）は凸多角形として表し、
//! 左右の辺リストを作ってから1行ずつスパンに変換します。

use super::Span;

/// 走査変換用の辺（整数 DDA）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct PolyEdge {
    /// 処理する行数
    pub height: i32,
    /// 開始X座標
    pub x: i32,
    /// 1行あたりの整数部の移動量
    pub stepx: i32,
    /// 誤差があふれたときの移動方向
    pub signdx: i32,
    /// 誤差項（0と比較する）
    pub e: i32,
    pub dy: i32,
    pub dx: i32,
}

impl PolyEdge {
    /// 1行進める
    pub fn step(&mut self) {
        self.x += self.stepx;
        self.e += self.dx;
        if self.e > 0 {
            self.x += self.signdx;
            self.e -= self.dy;
        }
    }
}

/// 多角形の頂点（原点からの相対座標）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct PolyVertex {
    pub x: f64,
    pub y: f64,
}

impl PolyVertex {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 頂点から出る辺の傾き。`k = x0 * dy - y0 * dx`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct PolySlope {
    pub dx: i32,
    pub dy: i32,
    pub k: f64,
}

impl PolySlope {
    pub const fn new(dx: i32, dy: i32, k: f64) -> Self {
        Self { dx, dy, k }
    }
}

/// 線分の端面（端点と接合部の形状計算に使う）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct LineFace {
    pub xa: f64,
    pub ya: f64,
    pub dx: i32,
    pub dy: i32,
    pub x: i32,
    pub y: i32,
    pub k: f64,
}

/// 切り上げ（負の値は0方向に丸める）
pub(super) fn iceil(x: f64) -> i32 {
    let t = x as i32;
    if x == t as f64 || x < 0.0 {
        t
    } else {
        t + 1
    }
}

/// 辺を作成し、最初に処理する行のY座標を返す
///
/// `(_x0, y0)` は `(xi, yi)` からの相対位置で、`left` なら左辺として
/// 1ピクセル内側から始めます。
#[allow(clippy::too_many_arguments)]
pub(super) fn build_edge(
    _x0: f64,
    y0: f64,
    k: f64,
    mut dx: i32,
    mut dy: i32,
    xi: i32,
    yi: i32,
    left: bool,
) -> (i32, PolyEdge) {
    let mut k = k;
    if dy < 0 {
        dy = -dy;
        dx = -dx;
        k = -k;
    }

    let y = iceil(y0);
    let xady = iceil(k) as i64 + y as i64 * dx as i64;
    let dy64 = dy as i64;
    let x = if xady <= 0 { -(-xady / dy64) - 1 } else { (xady - 1) / dy64 };
    let mut e = (xady - x * dy64) as i32;

    let mut edge = PolyEdge::default();
    if dx >= 0 {
        edge.signdx = 1;
        edge.stepx = dx / dy;
        edge.dx = dx % dy;
    } else {
        edge.signdx = -1;
        edge.stepx = -(-dx / dy);
        edge.dx = -dx % dy;
        e = dy - e + 1;
    }
    edge.dy = dy;
    edge.x = x as i32 + left as i32 + xi;
    edge.e = e - dy;
    (y + yi, edge)
}

fn step_around(v: usize, incr: isize, max: usize) -> usize {
    let next = v as isize + incr;
    if next < 0 {
        max - 1
    } else if next as usize == max {
        0
    } else {
        next as usize
    }
}

/// 凸多角形の左右の辺リスト
#[derive(Debug, Clone, Default)]
pub(super) struct PolyEdges {
    /// 最初の行
    pub y: i32,
    /// 行数
    pub height: i32,
    pub left: Vec<PolyEdge>,
    pub right: Vec<PolyEdge>,
}

/// 頂点と傾きから凸多角形の辺リストを作る
///
/// `slopes[i]` は `vertices[i]` から次の頂点へ向かう辺です。
pub(super) fn build_poly(vertices: &[PolyVertex], slopes: &[PolySlope], xi: i32, yi: i32) -> PolyEdges {
    let count = vertices.len();
    let mut top = 0;
    let mut bottom = 0;
    let mut miny = vertices[0].y;
    let mut maxy = vertices[0].y;
    for (i, v) in vertices.iter().enumerate().skip(1) {
        if v.y < miny {
            top = i;
            miny = v.y;
        }
        if v.y >= maxy {
            bottom = i;
            maxy = v.y;
        }
    }

    // 頂点の回り方向
    let mut clockwise: isize = 1;
    let mut slopeoff: isize = 0;
    let j = step_around(top, -1, count);
    if slopes[j].dy as i64 * slopes[top].dx as i64 > slopes[top].dy as i64 * slopes[j].dx as i64 {
        clockwise = -1;
        slopeoff = -1;
    }

    let bottomy = iceil(maxy) + yi;
    let mut topy = 0;
    let mut lasty = 0;

    let mut right: Vec<PolyEdge> = Vec::with_capacity(count);
    let mut s = step_around(top, slopeoff, count);
    let mut i = top;
    while i != bottom {
        if slopes[s].dy != 0 {
            let (y, edge) =
                build_edge(vertices[i].x, vertices[i].y, slopes[s].k, slopes[s].dx, slopes[s].dy, xi, yi, false);
            match right.last_mut() {
                Some(prev) => prev.height = y - lasty,
                None => topy = y,
            }
            right.push(edge);
            lasty = y;
        }
        i = step_around(i, clockwise, count);
        s = step_around(s, clockwise, count);
    }
    if let Some(last) = right.last_mut() {
        last.height = bottomy - lasty;
    }

    let slopeoff = if slopeoff == 0 { -1 } else { 0 };
    let mut left: Vec<PolyEdge> = Vec::with_capacity(count);
    let mut s = step_around(top, slopeoff, count);
    let mut i = top;
    while i != bottom {
        if slopes[s].dy != 0 {
            let (y, edge) =
                build_edge(vertices[i].x, vertices[i].y, slopes[s].k, slopes[s].dx, slopes[s].dy, xi, yi, true);
            if let Some(prev) = left.last_mut() {
                prev.height = y - lasty;
            }
            left.push(edge);
            lasty = y;
        }
        i = step_around(i, -clockwise, count);
        s = step_around(s, -clockwise, count);
    }
    if let Some(last) = left.last_mut() {
        last.height = bottomy - lasty;
    }

    PolyEdges { y: topy, height: bottomy - topy, left, right }
}

/// 左右の辺リストをスパンに変換（Y昇順）
pub(super) fn scan_poly(y: i32, overall_height: i32, left: &[PolyEdge], right: &[PolyEdge]) -> Vec<Span> {
    let mut out = Vec::with_capacity(overall_height.max(0) as usize);
    let mut y = y;
    let mut left_iter = left.iter();
    let mut right_iter = right.iter();
    let mut l = PolyEdge::default();
    let mut r = PolyEdge::default();
    let mut left_count = left.len();
    let mut right_count = right.len();
    l.height = 0;
    r.height = 0;

    while (left_count > 0 || l.height != 0) && (right_count > 0 || r.height != 0) {
        if l.height == 0 && left_count > 0 {
            if let Some(edge) = left_iter.next() {
                l = *edge;
            }
            left_count -= 1;
        }
        if r.height == 0 && right_count > 0 {
            if let Some(edge) = right_iter.next() {
                r = *edge;
            }
            right_count -= 1;
        }
        let height = l.height.min(r.height);
        l.height -= height;
        r.height -= height;
        for _ in 0..height.max(0) {
            if r.x >= l.x {
                out.push(Span::new(l.x, y, r.x - l.x + 1));
            }
            y += 1;
            l.step();
            r.step();
        }
    }
    out
}
