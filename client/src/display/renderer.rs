//! 画面反映モジュール
//!
//! キャンバスで変更された領域を表示側（フレームシンク）へ渡します。

use image::RgbaImage;
use log::{debug, trace};
use remote_display_rs_common::protocol::Rect;
use remote_display_rs_common::CommonError;
use thiserror::Error;

use super::canvas::Canvas;
use super::surface::Surface;

/// 反映エラー
#[derive(Error, Debug)]
pub enum RenderError {
    /// フレームの大きさがシンクと合わない
    #[error("フレームサイズが一致しません: {expected:?} に対して {actual:?}")]
    SizeMismatch {
        /// シンク側の大きさ
        expected: (u32, u32),
        /// 渡されたフレームの大きさ
        actual: (u32, u32),
    },

    /// 描画パイプラインのエラー
    #[error("描画エラー: {0}")]
    Display(#[from] CommonError),

    /// その他のエラー
    #[error("反映中に予期しないエラーが発生しました: {0}")]
    Other(String),
}

/// 変更されたフレームの受け取り先
pub trait FrameSink {
    /// `dirty` の矩形内が変わったフレームを受け取る
    fn frame_updated(&mut self, surface: &Surface, dirty: &[Rect]) -> Result<(), RenderError>;
}

/// RGBA 画像に写し取るシンク
#[derive(Debug, Default)]
pub struct ImageSink {
    image: RgbaImage,
    updates: u64,
}

impl ImageSink {
    /// 空のシンクを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 写し取った画像
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// 受け取ったフレーム数
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl FrameSink for ImageSink {
    fn frame_updated(&mut self, surface: &Surface, dirty: &[Rect]) -> Result<(), RenderError> {
        let size = (surface.width() as u32, surface.height() as u32);
        if self.image.dimensions() != size {
            // 大きさが変わったら全体を取り直す
            self.image = surface.to_rgba_image();
        } else {
            let bounds = surface.bounds();
            for rect in dirty {
                let r = rect.intersect(&bounds);
                for y in r.top..r.bottom {
                    for x in r.left..r.right {
                        self.image.put_pixel(x as u32, y as u32, surface.rgba(x, y));
                    }
                }
            }
        }
        self.updates += 1;
        Ok(())
    }
}

/// ディスプレイレンダラー
///
/// キャンバスの変更領域を取り出してシンクへ渡します。
pub struct DisplayRenderer<S: FrameSink> {
    sink: S,
    frames: u64,
}

impl<S: FrameSink> DisplayRenderer<S> {
    /// 新しいレンダラーを作成
    pub fn new(sink: S) -> Self {
        Self { sink, frames: 0 }
    }

    /// 変更があれば反映する（反映したら真）
    pub fn present(&mut self, canvas: &mut Canvas) -> Result<bool, RenderError> {
        let dirty = canvas.take_dirty();
        if dirty.is_empty() {
            trace!("変更領域がないため反映を省略します");
            return Ok(false);
        }
        let rects = dirty.rects();
        self.sink.frame_updated(canvas.surface(), &rects)?;
        self.frames += 1;
        debug!("フレーム {} を反映しました: {} 矩形, 範囲 {:?}", self.frames, rects.len(), dirty.extents());
        Ok(true)
    }

    /// 変更の有無にかかわらず全体を反映する
    pub fn present_full(&mut self, canvas: &mut Canvas) -> Result<(), RenderError> {
        let _ = canvas.take_dirty();
        let bounds = canvas.surface().bounds();
        self.sink.frame_updated(canvas.surface(), &[bounds])?;
        self.frames += 1;
        Ok(())
    }

    /// 反映したフレーム数
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// シンクを参照
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// シンクを可変参照
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// シンクを取り出す
    pub fn into_sink(self) -> S {
        self.sink
    }
}
