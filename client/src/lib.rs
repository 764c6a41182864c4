//! リモートディスプレイクライアント
//!
//! 画像のデコード（LZ・QUIC・JPEG）、画像キャッシュ、描画コマンドを
//! キャンバスへ適用する描画エンジンを提供します。

pub mod display;

pub use display::{
    Canvas, DisplayCaches, DisplayRenderer, DrawCommand, FrameSink, ImageDecoder, ImageSink,
    PixelFormat, Region, Surface,
};

/// ライブラリのバージョン
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
