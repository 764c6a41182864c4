//! 描画プロトコル定義
//!
//! ディスプレイチャネルで受信する画像記述子、ビットマップ、描画コマンドの
//! データモデルを定義します。ビットフィールドの位置は送信側と共通です。

use serde::{Serialize, Deserialize};
use std::borrow::Cow;

use crate::error::{CommonError, Result};

/// 整数座標
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// X座標
    pub x: i32,
    /// Y座標
    pub y: i32,
}

impl Point {
    /// 新しい座標を作成
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 16ビット座標（合成コマンドの原点）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point16 {
    /// X座標
    pub x: i16,
    /// Y座標
    pub y: i16,
}

/// 28.4 固定小数点座標
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointFix {
    /// X座標（下位4ビットが小数部）
    pub x: i32,
    /// Y座標（下位4ビットが小数部）
    pub y: i32,
}

impl PointFix {
    /// 整数座標から作成
    pub const fn from_int(x: i32, y: i32) -> Self {
        Self { x: x << 4, y: y << 4 }
    }
}

/// 矩形（right/bottom は含まない）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// 左端
    pub left: i32,
    /// 上端
    pub top: i32,
    /// 右端
    pub right: i32,
    /// 下端
    pub bottom: i32,
}

impl Rect {
    /// 新しい矩形を作成
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// 原点とサイズから作成
    pub const fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { left: x, top: y, right: x + width, bottom: y + height }
    }

    /// 幅
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// 高さ
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// 同じサイズかどうか
    pub fn is_same_size(&self, other: &Rect) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }

    /// 交差矩形
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }

    /// 平行移動
    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }

    /// 点を含むかどうか
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// 他の矩形を完全に含むかどうか
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.right <= self.right
            && other.top >= self.top
            && other.bottom <= self.bottom
    }
}

/// 画像種別（ワイヤ上のタグ値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageType {
    /// 非圧縮ビットマップ
    Bitmap = 0,
    /// QUIC 圧縮
    Quic = 1,
    /// LZ パレット
    LzPlt = 100,
    /// LZ RGB
    LzRgb = 101,
    /// グローバル辞書 LZ
    GlzRgb = 102,
    /// キャッシュ参照
    FromCache = 103,
    /// 別サーフェス参照
    Surface = 104,
    /// JPEG
    Jpeg = 105,
    /// キャッシュ参照（ロスレスのみ）
    FromCacheLossless = 106,
    /// zlib で包まれたグローバル辞書 LZ
    ZlibGlzRgb = 107,
    /// JPEG + LZ アルファ
    JpegAlpha = 108,
}

impl ImageType {
    /// タグ値から変換
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => ImageType::Bitmap,
            1 => ImageType::Quic,
            100 => ImageType::LzPlt,
            101 => ImageType::LzRgb,
            102 => ImageType::GlzRgb,
            103 => ImageType::FromCache,
            104 => ImageType::Surface,
            105 => ImageType::Jpeg,
            106 => ImageType::FromCacheLossless,
            107 => ImageType::ZlibGlzRgb,
            108 => ImageType::JpegAlpha,
            other => return Err(CommonError::protocol(format!("未知の画像種別です: {}", other))),
        })
    }

    /// 非可逆圧縮かどうか
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageType::Jpeg | ImageType::JpegAlpha)
    }

    /// グローバル辞書を更新する種別かどうか
    pub fn is_glz(&self) -> bool {
        matches!(self, ImageType::GlzRgb | ImageType::ZlibGlzRgb)
    }
}

/// 画像記述子フラグ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFlags(pub u8);

impl ImageFlags {
    /// キャッシュに保存する
    pub const CACHE_ME: u8 = 1 << 0;
    /// アルファを 0xff とみなす
    pub const HIGH_BITS_SET: u8 = 1 << 1;
    /// 非可逆エントリをロスレスで置き換える
    pub const CACHE_REPLACE_ME: u8 = 1 << 2;

    /// キャッシュ保存要求
    pub fn cache_me(&self) -> bool {
        self.0 & Self::CACHE_ME != 0
    }

    /// 上位ビット設定
    pub fn high_bits_set(&self) -> bool {
        self.0 & Self::HIGH_BITS_SET != 0
    }

    /// キャッシュ置き換え要求
    pub fn cache_replace_me(&self) -> bool {
        self.0 & Self::CACHE_REPLACE_ME != 0
    }
}

/// 画像記述子
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// キャッシュID
    pub id: u64,
    /// フラグ
    pub flags: ImageFlags,
    /// 幅
    pub width: u32,
    /// 高さ
    pub height: u32,
}

/// ビットマップのピクセル形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitmapFormat {
    /// 無効
    Invalid = 0,
    /// 1ビットパレット（LSB先頭）
    OneBitLe = 1,
    /// 1ビットパレット（MSB先頭）
    OneBitBe = 2,
    /// 4ビットパレット（下位ニブル先頭）
    FourBitLe = 3,
    /// 4ビットパレット（上位ニブル先頭）
    FourBitBe = 4,
    /// 8ビットパレット
    EightBit = 5,
    /// 16ビット RGB555
    SixteenBit = 6,
    /// 24ビット BGR
    TwentyFourBit = 7,
    /// 32ビット xRGB
    ThirtyTwoBit = 8,
    /// 32ビット ARGB
    Rgba = 9,
    /// 8ビットアルファ
    EightBitA = 10,
}

impl BitmapFormat {
    /// タグ値から変換
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => BitmapFormat::Invalid,
            1 => BitmapFormat::OneBitLe,
            2 => BitmapFormat::OneBitBe,
            3 => BitmapFormat::FourBitLe,
            4 => BitmapFormat::FourBitBe,
            5 => BitmapFormat::EightBit,
            6 => BitmapFormat::SixteenBit,
            7 => BitmapFormat::TwentyFourBit,
            8 => BitmapFormat::ThirtyTwoBit,
            9 => BitmapFormat::Rgba,
            10 => BitmapFormat::EightBitA,
            other => {
                return Err(CommonError::protocol(format!("未知のビットマップ形式です: {}", other)))
            }
        })
    }

    /// 1ピクセルあたりのビット数
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            BitmapFormat::Invalid => 0,
            BitmapFormat::OneBitLe | BitmapFormat::OneBitBe => 1,
            BitmapFormat::FourBitLe | BitmapFormat::FourBitBe => 4,
            BitmapFormat::EightBit | BitmapFormat::EightBitA => 8,
            BitmapFormat::SixteenBit => 16,
            BitmapFormat::TwentyFourBit => 24,
            BitmapFormat::ThirtyTwoBit | BitmapFormat::Rgba => 32,
        }
    }

    /// パレット形式かどうか
    pub fn is_palette(&self) -> bool {
        matches!(
            self,
            BitmapFormat::OneBitLe
                | BitmapFormat::OneBitBe
                | BitmapFormat::FourBitLe
                | BitmapFormat::FourBitBe
                | BitmapFormat::EightBit
        )
    }

    /// アルファを持つかどうか
    pub fn has_alpha(&self) -> bool {
        matches!(self, BitmapFormat::Rgba | BitmapFormat::EightBitA)
    }
}

/// ビットマップフラグ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapFlags(pub u8);

impl BitmapFlags {
    /// パレットをキャッシュに保存する
    pub const PAL_CACHE_ME: u8 = 1 << 0;
    /// パレットをキャッシュから取得する
    pub const PAL_FROM_CACHE: u8 = 1 << 1;
    /// 上から下の行順
    pub const TOP_DOWN: u8 = 1 << 2;

    /// パレット保存要求
    pub fn pal_cache_me(&self) -> bool {
        self.0 & Self::PAL_CACHE_ME != 0
    }

    /// パレット参照
    pub fn pal_from_cache(&self) -> bool {
        self.0 & Self::PAL_FROM_CACHE != 0
    }

    /// 上から下の行順かどうか
    pub fn top_down(&self) -> bool {
        self.0 & Self::TOP_DOWN != 0
    }
}

/// 受信データのチャンク列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunks {
    /// 各チャンクのバイト列
    pub chunks: Vec<Vec<u8>>,
}

impl Chunks {
    /// 単一チャンクから作成
    pub fn single(data: Vec<u8>) -> Self {
        Self { chunks: vec![data] }
    }

    /// 複数チャンクから作成
    pub fn from_vec(chunks: Vec<Vec<u8>>) -> Self {
        Self { chunks }
    }

    /// チャンク数
    pub fn count(&self) -> usize {
        self.chunks.len()
    }

    /// 総バイト数
    pub fn total_len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    /// 単一チャンクのデータを取得（複数ならエラー）
    pub fn as_single(&self) -> Result<&[u8]> {
        match self.chunks.as_slice() {
            [only] => Ok(only.as_slice()),
            _ => Err(CommonError::protocol(format!(
                "単一チャンクが必要ですが {} 個あります",
                self.chunks.len()
            ))),
        }
    }

    /// 連続したバッファに結合
    ///
    /// 単一チャンクの場合はコピーしません。
    pub fn linearize(&self) -> Cow<'_, [u8]> {
        match self.chunks.as_slice() {
            [] => Cow::Borrowed(&[]),
            [only] => Cow::Borrowed(only.as_slice()),
            many => {
                let mut buf = Vec::with_capacity(self.total_len());
                for chunk in many {
                    buf.extend_from_slice(chunk);
                }
                Cow::Owned(buf)
            }
        }
    }
}

/// パレット
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    /// パレットキャッシュID
    pub unique: u64,
    /// 色エントリ（0x00RRGGBB）
    pub ents: Vec<u32>,
}

/// 非圧縮ビットマップ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    /// ピクセル形式
    pub format: BitmapFormat,
    /// フラグ
    pub flags: BitmapFlags,
    /// 幅
    pub width: u32,
    /// 高さ
    pub height: u32,
    /// 1行のバイト数
    pub stride: u32,
    /// 添付パレット
    pub palette: Option<Palette>,
    /// キャッシュ上のパレットID（`PAL_FROM_CACHE` 時）
    pub palette_id: u64,
    /// ピクセルデータ
    pub data: Chunks,
}

/// JPEG+アルファのフラグ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JpegAlphaFlags(pub u8);

impl JpegAlphaFlags {
    /// 上から下の行順
    pub const TOP_DOWN: u8 = 1 << 0;

    /// 上から下の行順かどうか
    pub fn top_down(&self) -> bool {
        self.0 & Self::TOP_DOWN != 0
    }
}

/// 画像本体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageData {
    /// 非圧縮ビットマップ
    Bitmap(Bitmap),
    /// QUIC ストリーム
    Quic(Chunks),
    /// LZ RGB ストリーム
    LzRgb(Chunks),
    /// LZ パレットストリーム
    LzPlt {
        /// ビットマップフラグ（パレットのキャッシュ指定）
        flags: BitmapFlags,
        /// 添付パレット
        palette: Option<Palette>,
        /// キャッシュ上のパレットID
        palette_id: u64,
        /// 圧縮データ
        data: Chunks,
    },
    /// JPEG ストリーム
    Jpeg(Chunks),
    /// JPEG + LZ アルファ
    JpegAlpha {
        /// フラグ
        flags: JpegAlphaFlags,
        /// 先頭の JPEG 部分のバイト数
        jpeg_size: u32,
        /// JPEG とアルファを連結したデータ
        data: Chunks,
    },
    /// グローバル辞書 LZ
    GlzRgb(Chunks),
    /// zlib 圧縮されたグローバル辞書 LZ
    ZlibGlzRgb {
        /// 展開後のバイト数
        glz_data_size: u32,
        /// zlib ストリーム
        data: Chunks,
    },
    /// キャッシュ参照
    FromCache,
    /// ロスレス版のキャッシュ参照
    FromCacheLossless,
    /// 別サーフェス参照
    Surface {
        /// サーフェスID
        surface_id: u32,
    },
}

/// 画像（記述子 + 本体）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// 記述子
    pub descriptor: ImageDescriptor,
    /// 本体
    pub data: ImageData,
}

impl Image {
    /// 画像種別を取得
    pub fn image_type(&self) -> ImageType {
        match &self.data {
            ImageData::Bitmap(_) => ImageType::Bitmap,
            ImageData::Quic(_) => ImageType::Quic,
            ImageData::LzRgb(_) => ImageType::LzRgb,
            ImageData::LzPlt { .. } => ImageType::LzPlt,
            ImageData::Jpeg(_) => ImageType::Jpeg,
            ImageData::JpegAlpha { .. } => ImageType::JpegAlpha,
            ImageData::GlzRgb(_) => ImageType::GlzRgb,
            ImageData::ZlibGlzRgb { .. } => ImageType::ZlibGlzRgb,
            ImageData::FromCache => ImageType::FromCache,
            ImageData::FromCacheLossless => ImageType::FromCacheLossless,
            ImageData::Surface { .. } => ImageType::Surface,
        }
    }

    /// 非圧縮ビットマップ画像を作成
    pub fn bitmap(id: u64, flags: u8, bitmap: Bitmap) -> Self {
        Self {
            descriptor: ImageDescriptor {
                id,
                flags: ImageFlags(flags),
                width: bitmap.width,
                height: bitmap.height,
            },
            data: ImageData::Bitmap(bitmap),
        }
    }

    /// キャッシュ参照画像を作成
    pub fn from_cache(id: u64, width: u32, height: u32) -> Self {
        Self {
            descriptor: ImageDescriptor { id, flags: ImageFlags(0), width, height },
            data: ImageData::FromCache,
        }
    }
}

/// ブラシ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Brush {
    /// なし
    None,
    /// 単色
    Solid(u32),
    /// タイルパターン
    Pattern {
        /// パターン画像
        pat: Box<Image>,
        /// タイルの位相
        pos: Point,
    },
}

impl Default for Brush {
    fn default() -> Self {
        Brush::None
    }
}

/// マスク
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QMask {
    /// フラグ（`INVERS`）
    pub flags: u8,
    /// マスク原点
    pub pos: Point,
    /// マスク画像（`None` ならマスクなし）
    pub bitmap: Option<Box<Image>>,
}

impl QMask {
    /// マスク反転
    pub const INVERS: u8 = 1 << 0;

    /// 反転指定かどうか
    pub fn is_inverted(&self) -> bool {
        self.flags & Self::INVERS != 0
    }
}

/// クリップ指定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clip {
    /// 制限なし
    None,
    /// 矩形リスト
    Rects(Vec<Rect>),
}

impl Default for Clip {
    fn default() -> Self {
        Clip::None
    }
}

/// ROP 記述子
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RopDescriptor(pub u16);

impl RopDescriptor {
    /// ソース反転
    pub const INVERS_SRC: u16 = 1 << 0;
    /// ブラシ反転
    pub const INVERS_BRUSH: u16 = 1 << 1;
    /// 描画先反転
    pub const INVERS_DEST: u16 = 1 << 2;
    /// 上書き
    pub const OP_PUT: u16 = 1 << 3;
    /// 論理和
    pub const OP_OR: u16 = 1 << 4;
    /// 論理積
    pub const OP_AND: u16 = 1 << 5;
    /// 排他的論理和
    pub const OP_XOR: u16 = 1 << 6;
    /// 黒で塗りつぶし
    pub const OP_BLACKNESS: u16 = 1 << 7;
    /// 白で塗りつぶし
    pub const OP_WHITENESS: u16 = 1 << 8;
    /// 描画先反転
    pub const OP_INVERS: u16 = 1 << 9;
    /// 結果反転
    pub const INVERS_RES: u16 = 1 << 10;

    /// ビットが立っているか
    pub fn has(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }
}

/// スケーリングモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// 補間
    Interpolate = 0,
    /// 最近傍
    Nearest = 1,
}

impl Default for ScaleMode {
    fn default() -> Self {
        ScaleMode::Interpolate
    }
}

impl ScaleMode {
    /// 設定文字列から変換
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "interpolate" => Some(ScaleMode::Interpolate),
            "nearest" => Some(ScaleMode::Nearest),
            _ => None,
        }
    }
}

/// 塗りつぶしコマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// ブラシ
    pub brush: Brush,
    /// ROP 記述子
    pub rop_descriptor: RopDescriptor,
    /// マスク
    pub mask: QMask,
}

/// コピー/ブレンドコマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyArea {
    /// ソース画像
    pub src_bitmap: Box<Image>,
    /// ソース領域
    pub src_area: Rect,
    /// ROP 記述子
    pub rop_descriptor: RopDescriptor,
    /// スケーリングモード
    pub scale_mode: ScaleMode,
    /// マスク
    pub mask: QMask,
}

/// ブレンドコマンドはコピーと同じ形式
pub type Blend = CopyArea;

/// 不透明描画コマンド（ソースとブラシの合成）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opaque {
    /// ソース画像
    pub src_bitmap: Box<Image>,
    /// ソース領域
    pub src_area: Rect,
    /// ブラシ
    pub brush: Brush,
    /// ROP 記述子
    pub rop_descriptor: RopDescriptor,
    /// スケーリングモード
    pub scale_mode: ScaleMode,
    /// マスク
    pub mask: QMask,
}

/// 透過色描画コマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transparent {
    /// ソース画像
    pub src_bitmap: Box<Image>,
    /// ソース領域
    pub src_area: Rect,
    /// ソース形式での透過色
    pub src_color: u32,
    /// 32ビットでの透過色
    pub true_color: u32,
}

/// アルファブレンドコマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaBlend {
    /// アルファフラグ
    pub alpha_flags: u8,
    /// 全体アルファ
    pub alpha: u8,
    /// ソース画像
    pub src_bitmap: Box<Image>,
    /// ソース領域
    pub src_area: Rect,
}

impl AlphaBlend {
    /// 描画先がアルファを持つ
    pub const DEST_HAS_ALPHA: u8 = 1 << 0;
    /// ソースサーフェスがアルファを持つ
    pub const SRC_SURFACE_HAS_ALPHA: u8 = 1 << 1;

    /// 描画先アルファ指定
    pub fn dest_has_alpha(&self) -> bool {
        self.alpha_flags & Self::DEST_HAS_ALPHA != 0
    }

    /// ソースアルファ指定
    pub fn src_surface_has_alpha(&self) -> bool {
        self.alpha_flags & Self::SRC_SURFACE_HAS_ALPHA != 0
    }
}

/// 3項 ROP コマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rop3 {
    /// ソース画像
    pub src_bitmap: Box<Image>,
    /// ソース領域
    pub src_area: Rect,
    /// ブラシ
    pub brush: Brush,
    /// ROP3 コード
    pub rop3: u8,
    /// スケーリングモード
    pub scale_mode: ScaleMode,
    /// マスク
    pub mask: QMask,
}

/// マスクのみを持つコマンド（黒/白/反転）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blackness {
    /// マスク
    pub mask: QMask,
}

/// 白塗りコマンド
pub type Whiteness = Blackness;

/// 反転コマンド
pub type Invers = Blackness;

/// 16.16 固定小数点のアフィン変換
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    /// 行列要素 (0,0)
    pub t00: u32,
    /// 行列要素 (0,1)
    pub t01: u32,
    /// 行列要素 (0,2)
    pub t02: u32,
    /// 行列要素 (1,0)
    pub t10: u32,
    /// 行列要素 (1,1)
    pub t11: u32,
    /// 行列要素 (1,2)
    pub t12: u32,
}

impl Transform {
    /// 単位行列
    pub const IDENTITY: Transform = Transform {
        t00: 0x10000,
        t01: 0,
        t02: 0,
        t10: 0,
        t11: 0x10000,
        t12: 0,
    };
}

/// 合成フラグ（ビット位置はワイヤ形式と共通）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeFlags(pub u32);

impl CompositeFlags {
    const OP_SHIFT: u32 = 0;
    const SRC_FILTER_SHIFT: u32 = 8;
    const MASK_FILTER_SHIFT: u32 = 11;
    const SRC_REPEAT_SHIFT: u32 = 14;
    const MASK_REPEAT_SHIFT: u32 = 16;
    const COMPONENT_ALPHA_SHIFT: u32 = 18;
    const HAS_MASK_SHIFT: u32 = 19;
    const HAS_SRC_TRANSFORM_SHIFT: u32 = 20;
    const HAS_MASK_TRANSFORM_SHIFT: u32 = 21;
    const SOURCE_OPAQUE_SHIFT: u32 = 22;
    const DEST_OPAQUE_SHIFT: u32 = 23;

    fn extract(&self, lo: u32, hi: u32) -> u32 {
        (self.0 >> lo) & ((1 << (hi - lo)) - 1)
    }

    /// 合成演算子（bit 0..8）
    pub fn op(&self) -> u8 {
        self.extract(Self::OP_SHIFT, Self::SRC_FILTER_SHIFT) as u8
    }

    /// ソースフィルタ（bit 8..11）
    pub fn src_filter(&self) -> u8 {
        self.extract(Self::SRC_FILTER_SHIFT, Self::MASK_FILTER_SHIFT) as u8
    }

    /// マスクフィルタ（bit 11..14）
    pub fn mask_filter(&self) -> u8 {
        self.extract(Self::MASK_FILTER_SHIFT, Self::SRC_REPEAT_SHIFT) as u8
    }

    /// ソース繰り返し（bit 14..16）
    pub fn src_repeat(&self) -> u8 {
        self.extract(Self::SRC_REPEAT_SHIFT, Self::MASK_REPEAT_SHIFT) as u8
    }

    /// マスク繰り返し（bit 16..18）
    pub fn mask_repeat(&self) -> u8 {
        self.extract(Self::MASK_REPEAT_SHIFT, Self::COMPONENT_ALPHA_SHIFT) as u8
    }

    /// 成分ごとのアルファ
    pub fn component_alpha(&self) -> bool {
        self.0 & (1 << Self::COMPONENT_ALPHA_SHIFT) != 0
    }

    /// マスクあり
    pub fn has_mask(&self) -> bool {
        self.0 & (1 << Self::HAS_MASK_SHIFT) != 0
    }

    /// ソース変換あり
    pub fn has_src_transform(&self) -> bool {
        self.0 & (1 << Self::HAS_SRC_TRANSFORM_SHIFT) != 0
    }

    /// マスク変換あり
    pub fn has_mask_transform(&self) -> bool {
        self.0 & (1 << Self::HAS_MASK_TRANSFORM_SHIFT) != 0
    }

    /// ソースを不透明として扱う
    pub fn source_opaque(&self) -> bool {
        self.0 & (1 << Self::SOURCE_OPAQUE_SHIFT) != 0
    }

    /// 描画先を不透明として扱う
    pub fn dest_opaque(&self) -> bool {
        self.0 & (1 << Self::DEST_OPAQUE_SHIFT) != 0
    }

    /// 各フィールドから組み立て
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        op: u8,
        src_filter: u8,
        mask_filter: u8,
        src_repeat: u8,
        mask_repeat: u8,
        component_alpha: bool,
        has_mask: bool,
        source_opaque: bool,
        dest_opaque: bool,
    ) -> Self {
        let mut v = (op as u32) << Self::OP_SHIFT;
        v |= ((src_filter as u32) & 0x7) << Self::SRC_FILTER_SHIFT;
        v |= ((mask_filter as u32) & 0x7) << Self::MASK_FILTER_SHIFT;
        v |= ((src_repeat as u32) & 0x3) << Self::SRC_REPEAT_SHIFT;
        v |= ((mask_repeat as u32) & 0x3) << Self::MASK_REPEAT_SHIFT;
        v |= (component_alpha as u32) << Self::COMPONENT_ALPHA_SHIFT;
        v |= (has_mask as u32) << Self::HAS_MASK_SHIFT;
        v |= (source_opaque as u32) << Self::SOURCE_OPAQUE_SHIFT;
        v |= (dest_opaque as u32) << Self::DEST_OPAQUE_SHIFT;
        CompositeFlags(v)
    }
}

/// 合成コマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composite {
    /// 合成フラグ
    pub flags: CompositeFlags,
    /// ソース画像
    pub src_bitmap: Box<Image>,
    /// マスク画像（`has_mask` 時）
    pub mask_bitmap: Option<Box<Image>>,
    /// ソース変換
    pub src_transform: Option<Transform>,
    /// マスク変換
    pub mask_transform: Option<Transform>,
    /// ソース原点
    pub src_origin: Point16,
    /// マスク原点
    pub mask_origin: Point16,
}

/// 線属性
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAttr {
    /// フラグ
    pub flags: u8,
    /// 破線パターン（28.4 固定小数点）
    pub style: Vec<u32>,
}

impl LineAttr {
    /// 最初のセグメントを空白として開始
    pub const START_WITH_GAP: u8 = 1 << 2;
    /// 破線
    pub const STYLED: u8 = 1 << 3;

    /// 破線指定かどうか
    pub fn is_styled(&self) -> bool {
        self.flags & Self::STYLED != 0
    }

    /// 空白開始かどうか
    pub fn start_with_gap(&self) -> bool {
        self.flags & Self::START_WITH_GAP != 0
    }
}

/// パスセグメント
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSeg {
    /// セグメントフラグ
    pub flags: u32,
    /// 点列
    pub points: Vec<PointFix>,
}

impl PathSeg {
    /// サブパス開始
    pub const BEGIN: u32 = 1 << 0;
    /// サブパス終了
    pub const END: u32 = 1 << 1;
    /// サブパスを閉じる
    pub const CLOSE: u32 = 1 << 3;
    /// ベジェ曲線
    pub const BEZIER: u32 = 1 << 4;

    /// フラグ判定
    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// パス
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    /// セグメント列
    pub segments: Vec<PathSeg>,
}

/// 線描画コマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stroke {
    /// パス
    pub path: Path,
    /// 線属性
    pub attr: LineAttr,
    /// ブラシ
    pub brush: Brush,
    /// 前景 ROP 記述子
    pub fore_mode: RopDescriptor,
    /// 背景 ROP 記述子
    pub back_mode: RopDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_ops() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -5, 20, 5);
        assert_eq!(a.intersect(&b), Rect::new(5, 0, 10, 5));
        assert!(Rect::new(3, 3, 3, 9).is_empty());
        assert!(a.is_same_size(&a.translate(7, -2)));
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 0));
    }

    #[test]
    fn test_composite_flags_bit_positions() {
        let flags = CompositeFlags::build(3, 4, 1, 2, 3, true, true, false, true);
        assert_eq!(flags.op(), 3);
        assert_eq!(flags.src_filter(), 4);
        assert_eq!(flags.mask_filter(), 1);
        assert_eq!(flags.src_repeat(), 2);
        assert_eq!(flags.mask_repeat(), 3);
        assert!(flags.component_alpha());
        assert!(flags.has_mask());
        assert!(!flags.source_opaque());
        assert!(flags.dest_opaque());
        // ワイヤ上の値と一致すること
        assert_eq!(flags.0, 3 | (4 << 8) | (1 << 11) | (2 << 14) | (3 << 16) | (1 << 18) | (1 << 19) | (1 << 23));
    }

    #[test]
    fn test_chunks_linearize() {
        let chunks = Chunks::from_vec(vec![vec![1, 2], vec![], vec![3]]);
        assert_eq!(&*chunks.linearize(), &[1, 2, 3]);
        assert!(chunks.as_single().is_err());

        let single = Chunks::single(vec![9, 8]);
        assert!(matches!(single.linearize(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_image_type_tags() {
        assert_eq!(ImageType::from_u8(108).expect("タグの変換に失敗しました"), ImageType::JpegAlpha);
        assert!(ImageType::from_u8(42).is_err());
        assert!(ImageType::Jpeg.is_lossy());
        assert!(!ImageType::Quic.is_lossy());
    }
}
