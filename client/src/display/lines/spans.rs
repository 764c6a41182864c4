//! スパングループ
//!
//! 太線や破線を複数の多角形に分けて描くと、継ぎ目のピクセルが2回塗られます。
//! 描画先を読む ROP ではこれが結果を変えるため、スパンをグループに溜めてから
//! 重複を取り除いて一度に塗ります。

use super::{LineStyle, Span, SpanSink};

/// Y昇順に並んだスパン列の集まり
#[derive(Debug, Clone, Default)]
pub struct SpanGroup {
    lists: Vec<Vec<Span>>,
    ymin: i32,
    ymax: i32,
}

impl SpanGroup {
    /// 空のグループを作成
    pub fn new() -> Self {
        Self { lists: Vec::new(), ymin: i32::MAX, ymax: i32::MIN + 1 }
    }

    /// 溜まっているスパン列の数
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Y昇順のスパン列を追加
    ///
    /// `other` があれば、そちらから今回のスパンと重なる部分を取り除きます。
    pub fn append(&mut self, other: Option<&mut SpanGroup>, spans: Vec<Span>) {
        let (first, last) = match (spans.first(), spans.last()) {
            (Some(f), Some(l)) => (f.y, l.y),
            _ => return,
        };
        self.ymin = self.ymin.min(first);
        self.ymax = self.ymax.max(last);
        if let Some(other) = other {
            if other.ymin < last && first < other.ymax {
                other.subtract(&spans);
            }
        }
        self.lists.push(spans);
    }

    /// 各スパン列から `sub` と重なる部分を取り除く
    fn subtract(&mut self, sub: &[Span]) {
        let (ymin, ymax) = match (sub.first(), sub.last()) {
            (Some(f), Some(l)) => (f.y, l.y),
            _ => return,
        };
        for spans in &mut self.lists {
            let overlaps = match (spans.first(), spans.last()) {
                (Some(f), Some(l)) => f.y <= ymax && ymin <= l.y,
                _ => false,
            };
            if !overlaps {
                continue;
            }
            let mut i = 0;
            let mut j = 0;
            loop {
                while i < spans.len() && spans[i].y < sub[j].y {
                    i += 1;
                }
                if i == spans.len() {
                    break;
                }
                while j < sub.len() && sub[j].y < spans[i].y {
                    j += 1;
                }
                if j == sub.len() {
                    break;
                }
                if sub[j].y == spans[i].y {
                    let xmin = sub[j].x;
                    let xmax = xmin + sub[j].width;
                    let span = spans[i];
                    let right = span.x + span.width;
                    if xmin >= right || span.x >= xmax {
                        // 重なりなし
                    } else if xmin <= span.x {
                        if xmax >= right {
                            // 全体が消える。同じ位置の次の要素を続けて調べる
                            spans.remove(i);
                            continue;
                        }
                        spans[i].width -= xmax - span.x;
                        spans[i].x = xmax;
                    } else if xmax >= right {
                        spans[i].width = xmin - span.x;
                    } else {
                        // 中央が抜けて2つに分かれる
                        spans[i].width = xmin - span.x;
                        spans.insert(i + 1, Span::new(xmax, span.y, right - xmax));
                        i += 1;
                    }
                }
                i += 1;
            }
        }
    }

    /// 重複を除いたスパンを塗り、グループを空にする
    pub fn fill_unique(&mut self, sink: &mut dyn SpanSink, foreground: bool) {
        let lists = std::mem::take(&mut self.lists);
        let (ymin, ymax) = (self.ymin, self.ymax);
        self.ymin = i32::MAX;
        self.ymax = i32::MIN + 1;

        match lists.len() {
            0 => {}
            // 1つの列は生成時点で重複がない
            1 => sink.fill_spans(&lists[0], true, foreground),
            _ => {
                let rows = (ymax as i64 - ymin as i64 + 1).max(0) as usize;
                let mut buckets: Vec<Vec<Span>> = vec![Vec::new(); rows];
                for span in lists.iter().flatten() {
                    let index = span.y as i64 - ymin as i64;
                    if index >= 0 && (index as usize) < rows {
                        buckets[index as usize].push(*span);
                    }
                }
                let mut out = Vec::new();
                for mut row in buckets {
                    if row.len() > 1 {
                        row.sort_by_key(|s| s.x);
                        merge_row(&row, &mut out);
                    } else {
                        out.extend(row);
                    }
                }
                sink.fill_spans(&out, true, foreground);
            }
        }
    }
}

/// X昇順に並んだ同じ行のスパンを結合して `out` に追加
fn merge_row(row: &[Span], out: &mut Vec<Span>) {
    let y = row[0].y;
    let mut x1 = row[0].x;
    let mut x2 = x1 + row[0].width;
    for span in &row[1..] {
        if span.x > x2 {
            out.push(Span::new(x1, y, x2 - x1));
            x1 = span.x;
            x2 = span.x + span.width;
        } else {
            x2 = x2.max(span.x + span.width);
        }
    }
    out.push(Span::new(x1, y, x2 - x1));
}

/// 前景と背景のスパングループ
#[derive(Debug)]
pub(super) struct SpanData {
    fg: SpanGroup,
    bg: SpanGroup,
    double_dash: bool,
}

impl SpanData {
    pub(super) fn new(style: LineStyle) -> Self {
        Self { fg: SpanGroup::new(), bg: SpanGroup::new(), double_dash: style == LineStyle::DoubleDash }
    }

    /// 前景/背景のグループへ追加
    ///
    /// 前景は二重破線のときだけ背景から重なりを取り除き、
    /// 背景は常に前景から取り除きます。
    pub(super) fn append(&mut self, foreground: bool, spans: Vec<Span>) {
        if foreground {
            let other = if self.double_dash { Some(&mut self.bg) } else { None };
            self.fg.append(other, spans);
        } else {
            self.bg.append(Some(&mut self.fg), spans);
        }
    }

    /// 溜めたスパンを塗る
    pub(super) fn flush(mut self, sink: &mut dyn SpanSink) {
        if self.double_dash {
            self.bg.fill_unique(sink, false);
        }
        self.fg.fill_unique(sink, true);
    }
}
