//! ディスプレイモジュール
//!
//! サーバーから受け取った画像のデコードと、描画コマンドによるキャンバスへの
//! 合成を担当します。
//!
//! - `surface` / `convert`: 画素バッファと形式変換
//! - `cache`: 画像キャッシュとパレットキャッシュ
//! - `quic` / `jpeg` / `decoder`: 画像のデコード
//! - `region` / `rop` / `lines` / `canvas`: 描画エンジン
//! - `trace` / `renderer`: ダンプと画面への反映

pub mod cache;
pub mod canvas;
pub mod convert;
pub mod decoder;
pub mod jpeg;
pub mod lines;
pub mod quic;
pub mod region;
pub mod renderer;
pub mod rop;
pub mod surface;
pub mod trace;

pub use cache::{DisplayCaches, ImageCache, PaletteCache};
pub use canvas::{Canvas, DrawCommand};
pub use decoder::{GlzDecoder, ImageDecoder, SurfaceProvider, SurfaceRegistry};
pub use jpeg::{ImageJpegDecoder, JpegDecoder};
pub use quic::QuicCoder;
pub use region::Region;
pub use renderer::{DisplayRenderer, FrameSink, ImageSink, RenderError};
pub use rop::Rop;
pub use surface::{PixelFormat, Surface};
pub use trace::{FileDumper, ImageDumper};
