//! クリップ領域
//!
//! 重ならない矩形の集合を、水平な帯（band）の列として保持します。
//! 各帯は同じ上端・下端を持つ区間の列で、区間は左から右へ並び、
//! 隣接する帯が同じ区間列なら1つにまとめます。

use remote_display_rs_common::protocol::Rect;

use super::lines::Span;
use super::surface::Surface;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Band {
    top: i32,
    bottom: i32,
    /// `[x1, x2)` の区間列
    spans: Vec<(i32, i32)>,
}

/// 領域
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    bands: Vec<Band>,
}

#[derive(Clone, Copy)]
enum SetOp {
    Union,
    Intersect,
    Subtract,
}

impl SetOp {
    fn keep(self, a: bool, b: bool) -> bool {
        match self {
            SetOp::Union => a || b,
            SetOp::Intersect => a && b,
            SetOp::Subtract => a && !b,
        }
    }
}

fn combine_spans(a: &[(i32, i32)], b: &[(i32, i32)], op: SetOp) -> Vec<(i32, i32)> {
    let mut xs: Vec<i32> = a.iter().chain(b.iter()).flat_map(|&(l, r)| [l, r]).collect();
    xs.sort_unstable();
    xs.dedup();

    let inside = |spans: &[(i32, i32)], x: i32| spans.iter().any(|&(l, r)| x >= l && x < r);

    let mut out: Vec<(i32, i32)> = Vec::new();
    for pair in xs.windows(2) {
        let (x0, x1) = (pair[0], pair[1]);
        if !op.keep(inside(a, x0), inside(b, x0)) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == x0 => last.1 = x1,
            _ => out.push((x0, x1)),
        }
    }
    out
}

fn push_band(bands: &mut Vec<Band>, top: i32, bottom: i32, spans: Vec<(i32, i32)>) {
    if spans.is_empty() || bottom <= top {
        return;
    }
    if let Some(last) = bands.last_mut() {
        if last.bottom == top && last.spans == spans {
            last.bottom = bottom;
            return;
        }
    }
    bands.push(Band { top, bottom, spans });
}

impl Region {
    /// 空の領域
    pub fn new() -> Self {
        Self::default()
    }

    /// 矩形1つの領域
    pub fn from_rect(rect: &Rect) -> Self {
        let mut bands = Vec::new();
        if !rect.is_empty() {
            push_band(&mut bands, rect.top, rect.bottom, vec![(rect.left, rect.right)]);
        }
        Self { bands }
    }

    /// 矩形リストの和集合
    pub fn from_rects(rects: &[Rect]) -> Self {
        rects
            .iter()
            .fold(Region::new(), |acc, r| acc.union(&Region::from_rect(r)))
    }

    /// マスク画像の被覆領域
    ///
    /// `area` 内で値が0でない画素の集合を、サーフェス座標で返します。
    pub fn from_mask(surface: &Surface, area: &Rect) -> Self {
        let area = area.intersect(&surface.bounds());
        let mut bands = Vec::new();
        if area.is_empty() {
            return Self { bands };
        }
        for y in area.top..area.bottom {
            let mut spans = Vec::new();
            let mut start: Option<i32> = None;
            for x in area.left..area.right {
                let set = surface.pixel(x, y) != 0;
                match (set, start) {
                    (true, None) => start = Some(x),
                    (false, Some(s)) => {
                        spans.push((s, x));
                        start = None;
                    }
                    _ => {}
                }
            }
            if let Some(s) = start {
                spans.push((s, area.right));
            }
            push_band(&mut bands, y, y + 1, spans);
        }
        Self { bands }
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// 外接矩形（空なら空矩形）
    pub fn extents(&self) -> Rect {
        let (first, last) = match (self.bands.first(), self.bands.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Rect::default(),
        };
        let left = self.bands.iter().filter_map(|b| b.spans.first()).map(|s| s.0).min().unwrap_or(0);
        let right = self.bands.iter().filter_map(|b| b.spans.last()).map(|s| s.1).max().unwrap_or(0);
        Rect::new(left, first.top, right, last.bottom)
    }

    /// 上から下、左から右の順の矩形列
    pub fn rects(&self) -> Vec<Rect> {
        self.bands
            .iter()
            .flat_map(|b| b.spans.iter().map(move |&(l, r)| Rect::new(l, b.top, r, b.bottom)))
            .collect()
    }

    /// 矩形の数
    pub fn num_rects(&self) -> usize {
        self.bands.iter().map(|b| b.spans.len()).sum()
    }

    /// 画素を含むかどうか
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.bands
            .iter()
            .filter(|b| y >= b.top && y < b.bottom)
            .any(|b| b.spans.iter().any(|&(l, r)| x >= l && x < r))
    }

    fn combine(&self, other: &Region, op: SetOp) -> Region {
        let mut ys: Vec<i32> = self
            .bands
            .iter()
            .chain(other.bands.iter())
            .flat_map(|b| [b.top, b.bottom])
            .collect();
        ys.sort_unstable();
        ys.dedup();

        let spans_at = |region: &Region, y: i32| -> Vec<(i32, i32)> {
            region
                .bands
                .iter()
                .find(|b| y >= b.top && y < b.bottom)
                .map(|b| b.spans.clone())
                .unwrap_or_default()
        };

        let mut bands = Vec::new();
        for pair in ys.windows(2) {
            let (y0, y1) = (pair[0], pair[1]);
            let spans = combine_spans(&spans_at(self, y0), &spans_at(other, y0), op);
            push_band(&mut bands, y0, y1, spans);
        }
        Region { bands }
    }

    /// 和集合
    pub fn union(&self, other: &Region) -> Region {
        self.combine(other, SetOp::Union)
    }

    /// 積集合
    pub fn intersect(&self, other: &Region) -> Region {
        self.combine(other, SetOp::Intersect)
    }

    /// 差集合
    pub fn subtract(&self, other: &Region) -> Region {
        self.combine(other, SetOp::Subtract)
    }

    /// 矩形との積集合
    pub fn intersect_rect(&self, rect: &Rect) -> Region {
        self.intersect(&Region::from_rect(rect))
    }

    /// `bounds` 内での補集合
    pub fn inverse(&self, bounds: &Rect) -> Region {
        Region::from_rect(bounds).subtract(self)
    }

    /// 平行移動
    pub fn translate(&mut self, dx: i32, dy: i32) {
        for band in &mut self.bands {
            band.top += dy;
            band.bottom += dy;
            for span in &mut band.spans {
                span.0 += dx;
                span.1 += dx;
            }
        }
    }

    /// 重なりのあるコピーで安全な順序の矩形列
    ///
    /// 描画先がソースから `(dx, dy)` ずれている場合に、まだ読んでいない
    /// ソース画素を上書きしない順に並べます。
    pub fn copy_order(&self, dx: i32, dy: i32) -> Vec<Rect> {
        let (bands_reversed, x_reversed) = if dy > 0 {
            (true, dx >= 0)
        } else {
            (false, dx > 0)
        };
        let mut out = Vec::with_capacity(self.num_rects());
        let mut push = |b: &Band| {
            let mut row: Vec<Rect> =
                b.spans.iter().map(|&(l, r)| Rect::new(l, b.top, r, b.bottom)).collect();
            if x_reversed {
                row.reverse();
            }
            out.extend(row);
        };
        if bands_reversed {
            self.bands.iter().rev().for_each(&mut push);
        } else {
            self.bands.iter().for_each(&mut push);
        }
        out
    }

    /// スパン列を領域で切り取る
    pub fn clip_spans(&self, spans: &[Span]) -> Vec<Span> {
        let mut out = Vec::new();
        for span in spans {
            if span.width <= 0 {
                continue;
            }
            let band = match self.bands.iter().find(|b| span.y >= b.top && span.y < b.bottom) {
                Some(b) => b,
                None => continue,
            };
            let (x1, x2) = (span.x, span.x + span.width);
            for &(l, r) in &band.spans {
                let (cl, cr) = (x1.max(l), x2.min(r));
                if cl < cr {
                    out.push(Span { x: cl, y: span.y, width: cr - cl });
                }
            }
        }
        out
    }
}
