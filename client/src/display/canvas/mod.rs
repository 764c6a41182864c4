//! 描画エンジン
//!
//! 描画コマンドをキャンバスのサーフェスに適用します。各コマンドの描画先領域は
//! 外接矩形、キャンバス全体のクリップ（グループ）、コマンドのクリップ指定、
//! マスクの積で、その外側の画素は変更しません。
//!
//! 領域が空になったり演算が描画先を変えない場合でも、参照している画像は
//! キャッシュへの副作用のために「タッチ」します。

mod blit;
mod composite;
mod stroke;

#[cfg(test)]
mod tests;

use std::borrow::Cow;
use std::sync::Arc;

use log::{debug, trace, warn};
use remote_display_rs_common::protocol::{
    AlphaBlend, Blackness, Blend, Brush, Clip, Composite, CopyArea, Fill, Image, ImageData, Invers,
    Opaque, Point, QMask, Rect, Rop3, ScaleMode, Stroke, Transparent, Whiteness,
};
use remote_display_rs_common::{CommonError, DisplayConfig, Result};

pub use blit::Filter;
pub use composite::{composite, filter_from_code, Layer, Operator, Repeat};

use self::blit::{blend, blit, blit_colorkey, blit_rop3, clear_dest_alpha, fill_paint, scale, Paint};
use self::stroke::{stroke_path, StrokeStyle};
use super::cache::DisplayCaches;
use super::convert::{convert_surface, rgb32_to_555, rgb32_to_565, target_format};
use super::decoder::{ImageDecoder, SurfaceProvider};
use super::lines::DEFAULT_ZERO_LINE_BIAS;
use super::region::Region;
use super::rop::{rop_from_descriptor, Rop, RopInput};
use super::surface::{PixelFormat, Surface};

/// 描画コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCommand {
    /// ブラシで塗る
    Fill(Fill),
    /// 画像をコピー
    Copy(CopyArea),
    /// 画像をコピーしてブラシと合成
    Opaque(Opaque),
    /// 画像を ROP で合成
    Blend(Blend),
    /// 透過色以外をコピー
    Transparent(Transparent),
    /// アルファブレンド
    AlphaBlend(AlphaBlend),
    /// 線を描く
    Stroke(Stroke),
    /// 3項 ROP
    Rop3(Rop3),
    /// Porter-Duff 合成
    Composite(Composite),
    /// 黒で塗る
    Blackness(Blackness),
    /// 白で塗る
    Whiteness(Whiteness),
    /// 反転
    Invers(Invers),
    /// キャンバス内の移動（`src_pos` が外接矩形の左上に移る）
    CopyBits {
        /// ソースの左上
        src_pos: Point,
    },
}

impl DrawCommand {
    /// ログ用の名前
    pub fn name(&self) -> &'static str {
        match self {
            DrawCommand::Fill(_) => "FILL",
            DrawCommand::Copy(_) => "COPY",
            DrawCommand::Opaque(_) => "OPAQUE",
            DrawCommand::Blend(_) => "BLEND",
            DrawCommand::Transparent(_) => "TRANSPARENT",
            DrawCommand::AlphaBlend(_) => "ALPHA_BLEND",
            DrawCommand::Stroke(_) => "STROKE",
            DrawCommand::Rop3(_) => "ROP3",
            DrawCommand::Composite(_) => "COMPOSITE",
            DrawCommand::Blackness(_) => "BLACKNESS",
            DrawCommand::Whiteness(_) => "WHITENESS",
            DrawCommand::Invers(_) => "INVERS",
            DrawCommand::CopyBits { .. } => "COPY_BITS",
        }
    }
}

/// キャンバス
pub struct Canvas {
    surface: Surface,
    canvas_region: Region,
    decoder: ImageDecoder,
    surfaces: Option<Arc<dyn SurfaceProvider + Send + Sync>>,
    zero_line_bias: u32,
    put_image_filter: Filter,
    dirty: Region,
}

impl Canvas {
    /// デコーダのキャンバス形式で作成
    pub fn new(width: i32, height: i32, decoder: ImageDecoder) -> Result<Self> {
        let format = decoder.canvas_format();
        if !format.is_canvas_format() {
            return Err(CommonError::unsupported(format!("キャンバスに使えない形式です: {:?}", format)));
        }
        let surface = Surface::new(format, width, height)?;
        let canvas_region = Region::from_rect(&surface.bounds());
        Ok(Self {
            surface,
            canvas_region,
            decoder,
            surfaces: None,
            zero_line_bias: DEFAULT_ZERO_LINE_BIAS,
            put_image_filter: Filter::Bilinear,
            dirty: Region::new(),
        })
    }

    /// 設定から作成
    pub fn from_config(
        config: &DisplayConfig,
        caches: Arc<DisplayCaches>,
        width: i32,
        height: i32,
    ) -> Result<Self> {
        let decoder = ImageDecoder::from_config(config, caches)?;
        let mode = ScaleMode::from_name(&config.canvas.default_scale_mode).ok_or_else(|| {
            CommonError::ConfigError(format!(
                "未知のスケーリングモードです: {}",
                config.canvas.default_scale_mode
            ))
        })?;
        let canvas = Self::new(width, height, decoder)?
            .with_zero_line_bias(config.canvas.zero_line_bias)
            .with_scale_mode(mode);
        debug!(
            "キャンバスを作成しました: {}x{} {:?}",
            width,
            height,
            canvas.surface.format()
        );
        Ok(canvas)
    }

    /// サーフェス参照の取得先を設定
    pub fn with_surfaces(mut self, surfaces: Arc<dyn SurfaceProvider + Send + Sync>) -> Self {
        self.surfaces = Some(surfaces);
        self
    }

    /// ゼロ幅線のバイアスを設定
    pub fn with_zero_line_bias(mut self, bias: u32) -> Self {
        self.zero_line_bias = bias;
        self
    }

    /// `put_image` の拡大縮小方法を設定
    pub fn with_scale_mode(mut self, mode: ScaleMode) -> Self {
        self.put_image_filter = mode.into();
        self
    }

    /// 描画先サーフェス
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// 画像デコーダ
    pub fn decoder_mut(&mut self) -> &mut ImageDecoder {
        &mut self.decoder
    }

    /// ピクセル形式
    pub fn format(&self) -> PixelFormat {
        self.surface.format()
    }

    /// 描画コマンドを実行
    pub fn draw(&mut self, bbox: &Rect, clip: &Clip, command: &DrawCommand) -> Result<()> {
        trace!("描画コマンド {}: {:?}", command.name(), bbox);
        let result = match command {
            DrawCommand::Fill(fill) => self.draw_fill(bbox, clip, fill),
            DrawCommand::Copy(copy) => self.draw_copy(bbox, clip, copy),
            DrawCommand::Opaque(opaque) => self.draw_opaque(bbox, clip, opaque),
            DrawCommand::Blend(blend) => self.draw_blend(bbox, clip, blend),
            DrawCommand::Transparent(transparent) => self.draw_transparent(bbox, clip, transparent),
            DrawCommand::AlphaBlend(alpha_blend) => self.draw_alpha_blend(bbox, clip, alpha_blend),
            DrawCommand::Stroke(stroke) => self.draw_stroke(bbox, clip, stroke),
            DrawCommand::Rop3(rop3) => self.draw_rop3(bbox, clip, rop3),
            DrawCommand::Composite(composite) => self.draw_composite(bbox, clip, composite),
            DrawCommand::Blackness(cmd) => self.draw_solid_mask(bbox, clip, &cmd.mask, 0, Rop::Copy),
            DrawCommand::Whiteness(cmd) => {
                self.draw_solid_mask(bbox, clip, &cmd.mask, 0xffff_ffff, Rop::Copy)
            }
            DrawCommand::Invers(cmd) => self.draw_solid_mask(bbox, clip, &cmd.mask, 0, Rop::Invert),
            DrawCommand::CopyBits { src_pos } => self.copy_bits(bbox, clip, src_pos),
        };
        if let Err(e) = &result {
            warn!("描画コマンドが失敗しました: {}", e.details().with_context(command.name()));
        }
        result
    }

    /// 領域の画素を読み出す
    pub fn read_bits(&self, area: &Rect) -> Result<Surface> {
        if area.is_empty() || !self.surface.bounds().contains_rect(area) {
            return Err(CommonError::InvalidParameterError(format!(
                "読み出し領域がキャンバス外です: {:?}",
                area
            )));
        }
        self.surface.sub_image(area)
    }

    /// 画像を `dest` に書き込む（サイズが違えば拡大縮小）
    pub fn put_image(&mut self, dest: &Rect, src: &Surface, clip: Option<&Region>) -> Result<()> {
        if dest.is_empty() || src.width() <= 0 || src.height() <= 0 {
            return Ok(());
        }
        let src = if src.format() == self.surface.format() {
            Cow::Borrowed(src)
        } else {
            Cow::Owned(convert_surface(src, self.surface.format())?)
        };
        let src = if dest.width() != src.width() || dest.height() != src.height() {
            Cow::Owned(scale(&src, &src.bounds(), dest.width(), dest.height(), self.put_image_filter)?)
        } else {
            src
        };
        let mut region = Region::from_rect(&dest.intersect(&self.surface.bounds()));
        if let Some(clip) = clip {
            region = region.intersect(clip);
        }
        blit(&mut self.surface, &src, &region.rects(), dest.left, dest.top, Rop::Copy)?;
        self.mark_dirty(&region);
        Ok(())
    }

    /// 全体をゼロで塗る
    pub fn clear(&mut self) {
        let bounds = self.surface.bounds();
        self.surface.fill_rect(&bounds, 0);
        self.mark_dirty(&Region::from_rect(&bounds));
    }

    /// キャンバス全体のクリップを `region` に狭める
    pub fn group_start(&mut self, region: &Region) {
        self.canvas_region = region.intersect_rect(&self.surface.bounds());
    }

    /// キャンバス全体のクリップを戻す
    pub fn group_end(&mut self) {
        self.canvas_region = Region::from_rect(&self.surface.bounds());
    }

    /// キャンバスの内容を複製して返す（`force_opaque` ならアルファを無視する形式）
    pub fn get_image(&self, force_opaque: bool) -> Result<Surface> {
        let mut image = self.surface.clone();
        if force_opaque {
            image.relabel(image.format().opaque())?;
        }
        Ok(image)
    }

    /// 前回から変更された領域を取り出す
    pub fn take_dirty(&mut self) -> Region {
        std::mem::take(&mut self.dirty)
    }

    fn mark_dirty(&mut self, region: &Region) {
        if !region.is_empty() {
            self.dirty = self.dirty.union(region);
        }
    }

    /// 外接矩形・グループ・クリップ指定の積
    fn dest_region(&self, bbox: &Rect, clip: &Clip) -> Region {
        let region = self.canvas_region.intersect_rect(bbox);
        match clip {
            Clip::None => region,
            Clip::Rects(rects) => region.intersect(&Region::from_rects(rects)),
        }
    }

    /// マスクの被覆で領域を狭める
    ///
    /// `(x, y)` がマスクの `mask.pos` に対応します。マスクのうち領域に
    /// かかる部分（左端は32画素単位に切り下げ）だけを領域に変換します。
    fn apply_mask(&mut self, region: &mut Region, mask: &QMask, x: i32, y: i32) -> Result<()> {
        let image = match &mask.bitmap {
            Some(image) => image,
            None => return Ok(()),
        };
        let (surface, needs_invert) = self.decoder.get_mask(image, mask.is_inverted())?;
        let (dx, dy) = (mask.pos.x - x, mask.pos.y - y);

        let mut local = region.clone();
        local.translate(dx, dy);
        let extents = local.extents();
        let area = Rect::new(extents.left & !0x1f, extents.top, extents.right, extents.bottom)
            .intersect(&surface.bounds());

        let mut covered = Region::from_mask(&surface, &area);
        if needs_invert {
            covered = covered.inverse(&area);
        }
        covered.translate(-dx, -dy);
        *region = region.intersect(&covered);
        Ok(())
    }

    /// 画像を取得（サーフェス参照は取得先から、それ以外はデコーダから）
    ///
    /// `force_opaque` はサーフェス参照にだけ効きます。
    fn source_raw(&mut self, image: &Image, force_opaque: bool) -> Result<Arc<Surface>> {
        match &image.data {
            ImageData::Surface { surface_id } => {
                let surfaces = self.surfaces.as_ref().ok_or_else(|| {
                    CommonError::unsupported(format!(
                        "サーフェス {} の取得先が設定されていません",
                        surface_id
                    ))
                })?;
                Ok(Arc::new(surfaces.get_image(*surface_id, force_opaque)?))
            }
            _ => self.decoder.get_image(image, false),
        }
    }

    /// キャンバスと同じ深さの画像を取得
    fn source(&mut self, image: &Image, force_opaque: bool) -> Result<Arc<Surface>> {
        let surface = self.source_raw(image, force_opaque)?;
        let canvas = self.surface.format();
        if surface.format().bits_per_pixel() == canvas.bits_per_pixel() {
            return Ok(surface);
        }
        let format = target_format(canvas, surface.format().has_alpha());
        Ok(Arc::new(convert_surface(&surface, format)?))
    }

    fn touch(&mut self, image: &Image) -> Result<()> {
        if matches!(image.data, ImageData::Surface { .. }) {
            return Ok(());
        }
        self.decoder.touch_image(image)
    }

    fn touch_brush(&mut self, brush: &Brush) -> Result<()> {
        if let Brush::Pattern { pat, .. } = brush {
            self.touch(pat)?;
        }
        Ok(())
    }

    fn paint(&mut self, brush: &Brush) -> Result<Paint> {
        Ok(match brush {
            Brush::None => Paint::Solid(0),
            Brush::Solid(color) => Paint::Solid(*color),
            Brush::Pattern { pat, pos } => Paint::Tile {
                surface: self.source(pat, false)?,
                offset_x: pos.x,
                offset_y: pos.y,
            },
        })
    }

    /// ソース画像を描画先領域へ転送（サイズが違えば拡大縮小）
    fn blit_source(
        &mut self,
        region: &Region,
        src: &Surface,
        src_area: &Rect,
        bbox: &Rect,
        filter: Filter,
        rop: Rop,
    ) -> Result<()> {
        let rects = region.rects();
        if bbox.is_same_size(src_area) {
            blit(&mut self.surface, src, &rects, bbox.left - src_area.left, bbox.top - src_area.top, rop)
        } else {
            let scaled = scale(src, src_area, bbox.width(), bbox.height(), filter)?;
            blit(&mut self.surface, &scaled, &rects, bbox.left, bbox.top, rop)
        }
    }

    fn draw_fill(&mut self, bbox: &Rect, clip: &Clip, fill: &Fill) -> Result<()> {
        let mut region = self.dest_region(bbox, clip);
        self.apply_mask(&mut region, &fill.mask, bbox.left, bbox.top)?;
        let rop = rop_from_descriptor(fill.rop_descriptor, RopInput::Brush, RopInput::Dest);
        if region.is_empty() || rop == Rop::Noop {
            return self.touch_brush(&fill.brush);
        }
        let paint = self.paint(&fill.brush)?;
        fill_paint(&mut self.surface, &region.rects(), &paint, rop)?;
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_copy(&mut self, bbox: &Rect, clip: &Clip, copy: &CopyArea) -> Result<()> {
        let mut region = self.dest_region(bbox, clip);
        self.apply_mask(&mut region, &copy.mask, bbox.left, bbox.top)?;
        let rop = rop_from_descriptor(copy.rop_descriptor, RopInput::Src, RopInput::Dest);
        if region.is_empty() || rop == Rop::Noop {
            return self.touch(&copy.src_bitmap);
        }
        let src = self.source(&copy.src_bitmap, false)?;
        self.blit_source(&region, &src, &copy.src_area, bbox, copy.scale_mode.into(), rop)?;
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_opaque(&mut self, bbox: &Rect, clip: &Clip, opaque: &Opaque) -> Result<()> {
        let mut region = self.dest_region(bbox, clip);
        self.apply_mask(&mut region, &opaque.mask, bbox.left, bbox.top)?;
        // ブラシを s、コピーしたソースを d として合成する
        let rop = rop_from_descriptor(opaque.rop_descriptor, RopInput::Brush, RopInput::Src);
        if region.is_empty() || rop == Rop::Noop {
            self.touch(&opaque.src_bitmap)?;
            return self.touch_brush(&opaque.brush);
        }
        let src = self.source(&opaque.src_bitmap, false)?;
        self.blit_source(&region, &src, &opaque.src_area, bbox, opaque.scale_mode.into(), Rop::Copy)?;
        let paint = self.paint(&opaque.brush)?;
        fill_paint(&mut self.surface, &region.rects(), &paint, rop)?;
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_blend(&mut self, bbox: &Rect, clip: &Clip, blend: &Blend) -> Result<()> {
        let mut region = self.dest_region(bbox, clip);
        self.apply_mask(&mut region, &blend.mask, bbox.left, bbox.top)?;
        let rop = rop_from_descriptor(blend.rop_descriptor, RopInput::Src, RopInput::Dest);
        if region.is_empty() || rop == Rop::Noop {
            return self.touch(&blend.src_bitmap);
        }
        let src = self.source(&blend.src_bitmap, false)?;
        self.blit_source(&region, &src, &blend.src_area, bbox, blend.scale_mode.into(), rop)?;
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_transparent(&mut self, bbox: &Rect, clip: &Clip, transparent: &Transparent) -> Result<()> {
        let region = self.dest_region(bbox, clip);
        if region.is_empty() {
            return self.touch(&transparent.src_bitmap);
        }
        let src = self.source(&transparent.src_bitmap, false)?;
        let key = match self.surface.format() {
            PixelFormat::X1R5G5B5 => rgb32_to_555(transparent.true_color) as u32,
            PixelFormat::R5G6B5 => rgb32_to_565(transparent.true_color) as u32,
            _ => transparent.true_color,
        };
        let rects = region.rects();
        let area = &transparent.src_area;
        if bbox.is_same_size(area) {
            blit_colorkey(&mut self.surface, &src, &rects, bbox.left - area.left, bbox.top - area.top, key);
        } else {
            let scaled = scale(&src, area, bbox.width(), bbox.height(), Filter::Nearest)?;
            blit_colorkey(&mut self.surface, &scaled, &rects, bbox.left, bbox.top, key);
        }
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_alpha_blend(&mut self, bbox: &Rect, clip: &Clip, alpha_blend: &AlphaBlend) -> Result<()> {
        let region = self.dest_region(bbox, clip);
        if region.is_empty() || alpha_blend.alpha == 0 {
            return self.touch(&alpha_blend.src_bitmap);
        }
        let src = self.source(&alpha_blend.src_bitmap, !alpha_blend.src_surface_has_alpha())?;
        let rects = region.rects();
        let area = &alpha_blend.src_area;
        if bbox.is_same_size(area) {
            let (dx, dy) = (bbox.left - area.left, bbox.top - area.top);
            blend(&mut self.surface, &src, &rects, dx, dy, alpha_blend.alpha);
        } else {
            let scaled = scale(&src, area, bbox.width(), bbox.height(), Filter::Nearest)?;
            blend(&mut self.surface, &scaled, &rects, bbox.left, bbox.top, alpha_blend.alpha);
        }
        if self.surface.format() == PixelFormat::X8R8G8B8 && !alpha_blend.dest_has_alpha() {
            for rect in &rects {
                clear_dest_alpha(&mut self.surface, rect);
            }
        }
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_stroke(&mut self, bbox: &Rect, clip: &Clip, cmd: &Stroke) -> Result<()> {
        let region = self.dest_region(bbox, clip);
        if region.is_empty() {
            return self.touch_brush(&cmd.brush);
        }
        let style = StrokeStyle {
            attr: &cmd.attr,
            fore_rop: rop_from_descriptor(cmd.fore_mode, RopInput::Brush, RopInput::Dest),
            back_rop: rop_from_descriptor(cmd.back_mode, RopInput::Brush, RopInput::Dest),
            zero_line_bias: self.zero_line_bias,
        };
        let paint = self.paint(&cmd.brush)?;
        stroke_path(&mut self.surface, &region, &cmd.path, &style, &paint)?;
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_rop3(&mut self, bbox: &Rect, clip: &Clip, cmd: &Rop3) -> Result<()> {
        let mut region = self.dest_region(bbox, clip);
        self.apply_mask(&mut region, &cmd.mask, bbox.left, bbox.top)?;
        if region.is_empty() {
            self.touch(&cmd.src_bitmap)?;
            return self.touch_brush(&cmd.brush);
        }
        let (width, height) = (bbox.width(), bbox.height());
        let mut d = self.surface.sub_image(bbox)?;
        let src = self.source(&cmd.src_bitmap, false)?;
        let (src, src_x, src_y) = if bbox.is_same_size(&cmd.src_area) {
            (src, cmd.src_area.left, cmd.src_area.top)
        } else {
            let scaled = scale(&src, &cmd.src_area, width, height, cmd.scale_mode.into())?;
            (Arc::new(scaled), 0, 0)
        };
        // パターンの位相は外接矩形の左上を原点とする座標で表す
        let pattern = match self.paint(&cmd.brush)? {
            Paint::Tile { surface, offset_x, offset_y } => Paint::Tile {
                surface,
                offset_x: offset_x - bbox.left,
                offset_y: offset_y - bbox.top,
            },
            solid => solid,
        };
        blit_rop3(&mut d, &src, src_x, src_y, &pattern, cmd.rop3)?;
        blit(&mut self.surface, &d, &region.rects(), bbox.left, bbox.top, Rop::Copy)?;
        self.mark_dirty(&region);
        Ok(())
    }

    fn draw_composite(&mut self, bbox: &Rect, clip: &Clip, cmd: &Composite) -> Result<()> {
        let region = self.dest_region(bbox, clip);
        let flags = cmd.flags;
        let mask_image = cmd.mask_bitmap.as_deref().filter(|_| flags.has_mask());
        if region.is_empty() {
            self.touch(&cmd.src_bitmap)?;
            if let Some(mask) = mask_image {
                self.touch(mask)?;
            }
            return Ok(());
        }
        let op = Operator::from_code(flags.op())?;

        let canvas_format = self.surface.format();
        let mut d = self.surface.sub_image(bbox)?;
        if flags.dest_opaque() {
            d.relabel(canvas_format.opaque())?;
        }

        let src = self.source(&cmd.src_bitmap, flags.source_opaque())?;
        let src_layer = Layer {
            surface: &src,
            transform: cmd.src_transform.filter(|_| flags.has_src_transform()),
            filter: filter_from_code(flags.src_filter())?,
            repeat: Repeat::from_code(flags.src_repeat())?,
        };
        let mask = match mask_image {
            Some(image) => Some(self.source_raw(image, false)?),
            None => None,
        };
        let mask_layer = match &mask {
            Some(surface) => Some(Layer {
                surface,
                transform: cmd.mask_transform.filter(|_| flags.has_mask_transform()),
                filter: filter_from_code(flags.mask_filter())?,
                repeat: Repeat::from_code(flags.mask_repeat())?,
            }),
            None => None,
        };

        composite(
            op,
            &src_layer,
            mask_layer.as_ref().map(|layer| (layer, flags.component_alpha())),
            &mut d,
            (cmd.src_origin.x as i32, cmd.src_origin.y as i32),
            (cmd.mask_origin.x as i32, cmd.mask_origin.y as i32),
            bbox.width(),
            bbox.height(),
        );

        if d.format() != canvas_format {
            // 不透明扱いにした描画先はアルファを満たして戻す
            d.relabel(canvas_format)?;
            for y in 0..d.height() {
                for x in 0..d.width() {
                    let v = d.pixel(x, y);
                    d.set_pixel(x, y, v | 0xff00_0000);
                }
            }
        }
        blit(&mut self.surface, &d, &region.rects(), bbox.left, bbox.top, Rop::Copy)?;
        self.mark_dirty(&region);
        Ok(())
    }

    /// マスク付きの単色塗り（黒・白・反転）
    fn draw_solid_mask(&mut self, bbox: &Rect, clip: &Clip, mask: &QMask, color: u32, rop: Rop) -> Result<()> {
        let mut region = self.dest_region(bbox, clip);
        self.apply_mask(&mut region, mask, bbox.left, bbox.top)?;
        if region.is_empty() {
            return Ok(());
        }
        fill_paint(&mut self.surface, &region.rects(), &Paint::Solid(color), rop)?;
        self.mark_dirty(&region);
        Ok(())
    }

    fn copy_bits(&mut self, bbox: &Rect, clip: &Clip, src_pos: &Point) -> Result<()> {
        let (dx, dy) = (bbox.left - src_pos.x, bbox.top - src_pos.y);
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        // ソースがキャンバス外にかかる部分は描かない
        let src_bounds = Rect::from_size(dx, dy, self.surface.width(), self.surface.height());
        let region = self.dest_region(bbox, clip).intersect_rect(&src_bounds);
        for rect in region.copy_order(dx, dy) {
            self.surface.copy_within(&rect.translate(-dx, -dy), dx, dy);
        }
        self.mark_dirty(&region);
        Ok(())
    }
}
