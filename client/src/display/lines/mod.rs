//! 線ラスタライザ
//!
//! ゼロ幅線（Bresenham）と太線（多角形分解）を、破線を含めてスパンまたは
//! 矩形に変換します。出力は [`SpanSink`] に渡され、描画先への書き込みは
//! 呼び出し側が行います。
//!
//! 座標はすべて絶対座標（原点基準）です。

mod dash;
mod poly;
mod spans;
mod wide;
mod zero;

use remote_display_rs_common::protocol::Rect;

use super::rop::Rop;

pub use dash::{step_dash, wide_dash_line, zero_dash_line};
pub use spans::SpanGroup;
pub use wide::wide_line;
pub use zero::zero_line;

/// 既定のゼロ幅線バイアス（第2〜第5象限で軸方向の移動を優先）
pub const DEFAULT_ZERO_LINE_BIAS: u32 = 0xd8;

/// 水平方向のピクセル列
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// 開始X座標
    pub x: i32,
    /// Y座標
    pub y: i32,
    /// 幅
    pub width: i32,
}

impl Span {
    /// 新しいスパンを作成
    pub const fn new(x: i32, y: i32, width: i32) -> Self {
        Self { x, y, width }
    }
}

/// 線種
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineStyle {
    /// 実線
    #[default]
    Solid,
    /// 破線（空白部は描かない）
    OnOffDash,
    /// 破線（空白部を背景として描く）
    DoubleDash,
}

/// 端点の形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapStyle {
    /// 終点を描かない
    NotLast,
    /// 終点で切る
    #[default]
    Butt,
    /// 丸
    Round,
    /// 線幅の半分だけ延長
    Projecting,
}

/// 接合部の形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinStyle {
    /// 尖らせる（角度が鋭すぎる場合はベベル）
    #[default]
    Miter,
    /// 丸
    Round,
    /// 面取り
    Bevel,
}

/// ラスタライズ結果の受け取り先
pub trait SpanSink {
    /// スパン列を塗る
    ///
    /// `sorted` はスパンがY昇順に並んでいることを示します。
    /// `foreground` が偽なら破線の背景部分です。
    fn fill_spans(&mut self, spans: &[Span], sorted: bool, foreground: bool);

    /// 矩形列を塗る
    fn fill_rects(&mut self, rects: &[Rect], foreground: bool);
}

/// 線描画の属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineGc {
    /// 描画先の幅（ゼロ幅線のクリップに使用）
    pub width: i32,
    /// 描画先の高さ
    pub height: i32,
    /// 前景の ROP（スパンの重複除去が必要かの判定に使用）
    pub rop: Rop,
    /// 線幅（0 はゼロ幅線）
    pub line_width: u16,
    /// 破線パターンの開始オフセット
    pub dash_offset: u16,
    /// 破線パターン（前景と空白の長さを交互に並べる）
    pub dash: Vec<u8>,
    /// 線種
    pub line_style: LineStyle,
    /// 端点の形状
    pub cap_style: CapStyle,
    /// 接合部の形状
    pub join_style: JoinStyle,
    /// ゼロ幅線のバイアス（象限ごとのビット）
    pub zero_line_bias: u32,
}

impl LineGc {
    /// 描画先サイズを指定して既定の属性で作成
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            rop: Rop::Copy,
            line_width: 0,
            dash_offset: 0,
            dash: Vec::new(),
            line_style: LineStyle::Solid,
            cap_style: CapStyle::Butt,
            join_style: JoinStyle::Miter,
            zero_line_bias: DEFAULT_ZERO_LINE_BIAS,
        }
    }

    /// 破線パターンが使えるか（空または全要素0のパターンは実線扱い）
    pub(crate) fn has_usable_dash(&self) -> bool {
        self.dash.iter().any(|&d| d != 0)
    }
}
