//! 画像デコードパイプライン
//!
//! 画像記述子の種別に応じて各コーデックを呼び分け、キャッシュへの登録や
//! 参照、パレットキャッシュの更新、キャンバス形式への変換を行います。
//!
//! デコードに失敗した画像は呼び出し元に `Err` として返します。呼び出し元は
//! その更新だけを破棄し、[`CommonError::is_session_fatal`] が真の場合のみ
//! セッションを終了させます。

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::RwLock;
use remote_display_rs_common::compression::inflate_exact;
use remote_display_rs_common::lz::{LzDecoder, LzImageType};
use remote_display_rs_common::protocol::{
    Bitmap, BitmapFlags, BitmapFormat, Chunks, Image, ImageData, ImageDescriptor, Palette,
};
use remote_display_rs_common::{CommonError, DisplayConfig, Result};

use super::cache::DisplayCaches;
use super::convert::{bitmap_to_surface, convert_surface, target_format};
use super::jpeg::{decode_jpeg, decode_jpeg_alpha, ImageJpegDecoder, JpegDecoder};
use super::quic::{decode_quic, QuicCoder};
use super::surface::{PixelFormat, Surface};
use super::trace::{FileDumper, ImageDumper};

/// グローバル辞書 LZ のデコーダ
///
/// 辞書はセッション全体で共有されるため、実装は外部から渡します。
pub trait GlzDecoder {
    /// 1画像分のストリームを展開する
    fn decode(&mut self, data: &[u8], want_original: bool, canvas: PixelFormat) -> Result<Surface>;
}

/// 別の描画先サーフェスの取得
pub trait SurfaceProvider {
    /// サーフェスの画素を取得（`force_opaque` ならアルファを無視した形式で返す）
    fn get_image(&self, surface_id: u32, force_opaque: bool) -> Result<Surface>;
}

/// ID で登録したサーフェスの一覧
///
/// キャンバスと共有できるよう内部でロックします。
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    surfaces: RwLock<HashMap<u32, Surface>>,
}

impl SurfaceRegistry {
    /// 空の一覧を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// サーフェスを登録（同じIDは置き換え）
    pub fn insert(&self, surface_id: u32, surface: Surface) {
        self.surfaces.write().insert(surface_id, surface);
    }

    /// サーフェスを削除
    pub fn remove(&self, surface_id: u32) -> Option<Surface> {
        self.surfaces.write().remove(&surface_id)
    }
}

impl SurfaceProvider for SurfaceRegistry {
    fn get_image(&self, surface_id: u32, force_opaque: bool) -> Result<Surface> {
        let mut image = self
            .surfaces
            .read()
            .get(&surface_id)
            .cloned()
            .ok_or_else(|| CommonError::protocol(format!("サーフェス {} が存在しません", surface_id)))?;
        if force_opaque {
            image.relabel(image.format().opaque())?;
        }
        Ok(image)
    }
}

/// 画像デコーダ
pub struct ImageDecoder {
    canvas_format: PixelFormat,
    caches: Arc<DisplayCaches>,
    quic: Option<Box<dyn QuicCoder + Send>>,
    jpeg: Box<dyn JpegDecoder + Send>,
    glz: Option<Box<dyn GlzDecoder + Send>>,
    dumper: Option<Box<dyn ImageDumper + Send>>,
    max_lz_pixels: u64,
}

impl ImageDecoder {
    /// キャンバス形式と共有キャッシュを指定して作成
    pub fn new(canvas_format: PixelFormat, caches: Arc<DisplayCaches>) -> Self {
        Self {
            canvas_format,
            caches,
            quic: None,
            jpeg: Box::new(ImageJpegDecoder::new()),
            glz: None,
            dumper: None,
            max_lz_pixels: remote_display_rs_common::lz::LZ_MAX_PIXELS,
        }
    }

    /// 設定から作成
    ///
    /// `decoder.dump_images` が真ならダンプ先ディレクトリに画像を書き出します。
    pub fn from_config(config: &DisplayConfig, caches: Arc<DisplayCaches>) -> Result<Self> {
        let format = PixelFormat::from_name(&config.canvas.format).ok_or_else(|| {
            CommonError::ConfigError(format!("未知のキャンバス形式です: {}", config.canvas.format))
        })?;
        let mut decoder = Self::new(format, caches);
        decoder.max_lz_pixels = config.decoder.max_lz_pixels;
        if config.decoder.dump_images {
            let dumper = FileDumper::new(config.dump_dir())?;
            debug!("画像ダンプを有効化しました: {}", dumper.dir().display());
            decoder.dumper = Some(Box::new(dumper));
        }
        Ok(decoder)
    }

    /// QUIC コーダーを設定
    pub fn with_quic(mut self, coder: Box<dyn QuicCoder + Send>) -> Self {
        self.quic = Some(coder);
        self
    }

    /// JPEG デコーダを差し替え
    pub fn with_jpeg(mut self, decoder: Box<dyn JpegDecoder + Send>) -> Self {
        self.jpeg = decoder;
        self
    }

    /// グローバル辞書 LZ のデコーダを設定
    pub fn with_glz(mut self, decoder: Box<dyn GlzDecoder + Send>) -> Self {
        self.glz = Some(decoder);
        self
    }

    /// ダンプ先を設定
    pub fn with_dumper(mut self, dumper: Box<dyn ImageDumper + Send>) -> Self {
        self.dumper = Some(dumper);
        self
    }

    /// LZ の展開上限を設定
    pub fn with_max_lz_pixels(mut self, max_pixels: u64) -> Self {
        self.max_lz_pixels = max_pixels;
        self
    }

    /// キャンバス形式
    pub fn canvas_format(&self) -> PixelFormat {
        self.canvas_format
    }

    /// 共有キャッシュ
    pub fn caches(&self) -> &Arc<DisplayCaches> {
        &self.caches
    }

    /// 画像をデコード
    ///
    /// `want_original` が偽ならキャンバス向けの形式に変換して返します。
    pub fn get_image(&mut self, image: &Image, want_original: bool) -> Result<Arc<Surface>> {
        self.get_image_internal(image, want_original, true)?
            .ok_or_else(|| CommonError::Other("画像が得られませんでした".to_string()))
    }

    /// 描画はせずにキャッシュへの副作用だけを起こす
    ///
    /// キャッシュ登録の指定、保存すべきパレット、グローバル辞書の更新の
    /// いずれかがある画像だけを実際にデコードします。
    pub fn touch_image(&mut self, image: &Image) -> Result<()> {
        self.get_image_internal(image, true, false).map(|_| ())
    }

    fn get_image_internal(
        &mut self,
        image: &Image,
        want_original: bool,
        real_get: bool,
    ) -> Result<Option<Arc<Surface>>> {
        let descriptor = image.descriptor;
        let flags = descriptor.flags;
        let ty = image.image_type();

        if !real_get
            && !flags.cache_me()
            && !flags.cache_replace_me()
            && !has_palette_to_cache(&image.data)
            && !ty.is_glz()
        {
            return Ok(None);
        }

        let saved_want_original = want_original;
        let want_original = want_original || flags.cache_me() || flags.cache_replace_me();

        let surface = match &image.data {
            ImageData::FromCache => self.caches.images.lock().get(descriptor.id)?,
            ImageData::FromCacheLossless => self.caches.images.lock().get_lossless(descriptor.id)?,
            data => {
                let mut surface = self.decode_data(&descriptor, data, want_original)?;
                if flags.high_bits_set() && surface.format() == PixelFormat::X8R8G8B8 {
                    set_high_bits(&mut surface);
                }
                let surface = Arc::new(surface);

                if flags.cache_me() {
                    let mut images = self.caches.images.lock();
                    if ty.is_lossy() {
                        images.put_lossy(descriptor.id, Arc::clone(&surface));
                    } else {
                        images.put(descriptor.id, Arc::clone(&surface));
                    }
                    drop(images);
                    self.dump(|d| d.dump_surface(&surface, true));
                } else if flags.cache_replace_me() {
                    if ty.is_lossy() {
                        return Err(CommonError::protocol(format!(
                            "非可逆画像 {:?} でキャッシュ置き換えは指定できません",
                            ty
                        )));
                    }
                    self.caches
                        .images
                        .lock()
                        .replace_lossy(descriptor.id, Arc::clone(&surface))?;
                } else {
                    self.dump(|d| d.dump_surface(&surface, false));
                }
                surface
            }
        };

        if !real_get {
            return Ok(None);
        }

        if !saved_want_original && surface.format().is_canvas_format() {
            let wanted = target_format(self.canvas_format, surface.format() == PixelFormat::A8R8G8B8);
            if wanted != surface.format() {
                trace!("画像 {} を {:?} から {:?} に変換", descriptor.id, surface.format(), wanted);
                return Ok(Some(Arc::new(convert_surface(&surface, wanted)?)));
            }
        }
        Ok(Some(surface))
    }

    fn decode_data(
        &mut self,
        descriptor: &ImageDescriptor,
        data: &ImageData,
        want_original: bool,
    ) -> Result<Surface> {
        let canvas = self.canvas_format;
        let result = match data {
            ImageData::Bitmap(bitmap) => self.decode_bitmap(bitmap, want_original),
            ImageData::Quic(chunks) => {
                let coder = self
                    .quic
                    .as_deref_mut()
                    .ok_or_else(|| CommonError::unsupported("QUIC コーダーが設定されていません"))?;
                decode_quic(coder, chunks, descriptor, canvas, want_original, false)
            }
            ImageData::LzRgb(chunks) => self.decode_lz(chunks, None, descriptor, want_original),
            ImageData::LzPlt { flags, palette, palette_id, data } => {
                let pal = self.palette_for(palette.as_ref(), *palette_id, *flags)?;
                let result = self.decode_lz(
                    data,
                    pal.as_ref().map(|p| p.ents.as_slice()),
                    descriptor,
                    want_original,
                );
                if flags.pal_from_cache() {
                    self.caches.palettes.lock().release(*palette_id);
                }
                result
            }
            ImageData::Jpeg(chunks) => {
                if let Ok(bytes) = chunks.as_single() {
                    self.dump(|d| d.dump_jpeg(bytes));
                }
                decode_jpeg(self.jpeg.as_mut(), chunks, descriptor, false)
            }
            ImageData::JpegAlpha { flags, jpeg_size, data } => decode_jpeg_alpha(
                self.jpeg.as_mut(),
                *flags,
                *jpeg_size,
                data,
                descriptor,
                false,
                self.max_lz_pixels,
            ),
            ImageData::GlzRgb(chunks) => {
                let glz = self.glz.as_deref_mut().ok_or_else(|| {
                    CommonError::unsupported("グローバル辞書 LZ のデコーダが設定されていません")
                })?;
                glz.decode(&chunks.linearize(), want_original, canvas)
            }
            ImageData::ZlibGlzRgb { glz_data_size, data } => {
                let glz = self.glz.as_deref_mut().ok_or_else(|| {
                    CommonError::unsupported("グローバル辞書 LZ のデコーダが設定されていません")
                })?;
                let inflated = inflate_exact(data, *glz_data_size as usize)?;
                glz.decode(&inflated, want_original, canvas)
            }
            ImageData::Surface { surface_id } => Err(CommonError::unsupported(format!(
                "サーフェス {} の参照はキャンバスで解決してください",
                surface_id
            ))),
            ImageData::FromCache | ImageData::FromCacheLossless => {
                Err(CommonError::protocol("キャッシュ参照はデコードできません"))
            }
        };
        result.map_err(|e| {
            warn!("画像 {} のデコードに失敗しました: {}", descriptor.id, e);
            e
        })
    }

    fn decode_bitmap(&mut self, bitmap: &Bitmap, want_original: bool) -> Result<Surface> {
        let palette = self.palette_for(bitmap.palette.as_ref(), bitmap.palette_id, bitmap.flags)?;
        self.dump(|d| d.dump_bitmap(bitmap, palette.as_deref()));
        let result = bitmap_to_surface(
            bitmap,
            palette.as_ref().map(|p| p.ents.as_slice()),
            want_original,
            self.canvas_format,
        );
        if bitmap.flags.pal_from_cache() {
            self.caches.palettes.lock().release(bitmap.palette_id);
        }
        result
    }

    /// 画像に使うパレットを決める
    ///
    /// キャッシュから取得したパレットは使い終わったら `release` します。
    fn palette_for(
        &self,
        inline: Option<&Palette>,
        palette_id: u64,
        flags: BitmapFlags,
    ) -> Result<Option<Arc<Palette>>> {
        if flags.pal_from_cache() {
            return Ok(Some(self.caches.palettes.lock().get(palette_id)?));
        }
        let palette = match inline {
            Some(p) => p,
            None => return Ok(None),
        };
        if flags.pal_cache_me() {
            self.caches.palettes.lock().put(palette);
        }
        Ok(Some(Arc::new(palette.clone())))
    }

    fn decode_lz(
        &self,
        chunks: &Chunks,
        palette: Option<&[u32]>,
        descriptor: &ImageDescriptor,
        want_original: bool,
    ) -> Result<Surface> {
        let bytes = chunks.as_single()?;
        let lz = LzDecoder::begin_with_limit(bytes, palette, self.max_lz_pixels)?;
        let header = *lz.header();

        let (as_type, format) = match header.image_type {
            LzImageType::Rgba => (LzImageType::Rgba, PixelFormat::A8R8G8B8),
            LzImageType::Rgb32 | LzImageType::Rgb24 => (LzImageType::Rgb32, PixelFormat::X8R8G8B8),
            LzImageType::A8 => (LzImageType::A8, PixelFormat::A8),
            LzImageType::Rgb16 => {
                if !want_original && self.canvas_format.is_32bit() {
                    (LzImageType::Rgb32, PixelFormat::X8R8G8B8)
                } else {
                    (LzImageType::Rgb16, PixelFormat::X1R5G5B5)
                }
            }
            t if t.is_plt() => {
                if self.canvas_format == PixelFormat::R5G6B5 {
                    return Err(CommonError::unsupported(
                        "r5g6b5 キャンバスではパレット画像を扱えません",
                    ));
                }
                (LzImageType::Rgb32, PixelFormat::X8R8G8B8)
            }
            other => {
                return Err(CommonError::protocol(format!("LZ: 画像種別 {:?} は扱えません", other)));
            }
        };

        if header.width != descriptor.width || header.height != descriptor.height {
            return Err(CommonError::protocol(format!(
                "LZ: サイズが記述子と一致しません（{}x{} != {}x{}）",
                header.width, header.height, descriptor.width, descriptor.height
            )));
        }
        if !header.image_type.is_plt() && header.n_pixels != header.width as u64 * header.height as u64 {
            return Err(CommonError::protocol("LZ: 画素数が幅と高さに一致しません"));
        }

        let mut pixels = vec![0u8; header.output_size(as_type)];
        lz.decode(as_type, &mut pixels)?;

        let mut surface = Surface::new(format, header.width as i32, header.height as i32)?;
        if header.height == 0 {
            return Ok(surface);
        }
        let bpp = as_type.bytes_per_pixel();
        let src_stride = (header.n_pixels / header.height as u64) as usize * bpp;
        let row_bytes = header.width as usize * bpp;
        if src_stride < row_bytes {
            return Err(CommonError::protocol("LZ: 行の画素数が幅より少ないです"));
        }
        let height = header.height as i32;
        for (i, row) in pixels.chunks_exact(src_stride.max(1)).take(height as usize).enumerate() {
            let y = if header.top_down { i as i32 } else { height - 1 - i as i32 };
            surface.row_mut(y)[..row_bytes].copy_from_slice(&row[..row_bytes]);
        }
        Ok(surface)
    }

    /// マスク画像を取得
    ///
    /// 戻り値の真偽値は、呼び出し側でさらに反転が必要かどうかです。
    /// キャッシュしないビットマップはここで反転済みにします。
    pub fn get_mask(&mut self, image: &Image, need_invers: bool) -> Result<(Arc<Surface>, bool)> {
        let descriptor = image.descriptor;
        let cache_me = descriptor.flags.cache_me();
        let (surface, is_invers) = match &image.data {
            ImageData::Bitmap(bitmap) => {
                let is_invers = need_invers && !cache_me;
                (Arc::new(bitmap_mask(bitmap, is_invers)?), is_invers)
            }
            ImageData::FromCache => (self.caches.images.lock().get(descriptor.id)?, false),
            ImageData::FromCacheLossless => {
                (self.caches.images.lock().get_lossless(descriptor.id)?, false)
            }
            other => {
                return Err(CommonError::unsupported(format!(
                    "マスクに使えない画像種別です: {}",
                    image_type_name(other)
                )));
            }
        };
        if cache_me {
            self.caches.images.lock().put(descriptor.id, Arc::clone(&surface));
        }
        Ok((surface, need_invers && !is_invers))
    }

    fn dump<F>(&mut self, f: F)
    where
        F: FnOnce(&mut dyn ImageDumper) -> Result<()>,
    {
        if let Some(dumper) = self.dumper.as_deref_mut() {
            let dumper: &mut dyn ImageDumper = dumper;
            if let Err(e) = f(dumper) {
                warn!("画像のダンプに失敗しました: {}", e);
            }
        }
    }
}

fn image_type_name(data: &ImageData) -> &'static str {
    match data {
        ImageData::Bitmap(_) => "BITMAP",
        ImageData::Quic(_) => "QUIC",
        ImageData::LzRgb(_) => "LZ_RGB",
        ImageData::LzPlt { .. } => "LZ_PLT",
        ImageData::Jpeg(_) => "JPEG",
        ImageData::JpegAlpha { .. } => "JPEG_ALPHA",
        ImageData::GlzRgb(_) => "GLZ_RGB",
        ImageData::ZlibGlzRgb { .. } => "ZLIB_GLZ_RGB",
        ImageData::FromCache => "FROM_CACHE",
        ImageData::FromCacheLossless => "FROM_CACHE_LOSSLESS",
        ImageData::Surface { .. } => "SURFACE",
    }
}

fn has_palette_to_cache(data: &ImageData) -> bool {
    match data {
        ImageData::Bitmap(bitmap) => bitmap.palette.is_some() && bitmap.flags.pal_cache_me(),
        ImageData::LzPlt { flags, palette, .. } => palette.is_some() && flags.pal_cache_me(),
        _ => false,
    }
}

fn set_high_bits(surface: &mut Surface) {
    for px in surface.data_mut().chunks_exact_mut(4) {
        px[3] = 0xff;
    }
}

/// 1ビットビットマップを LSB 先頭の A1 サーフェスにする
fn bitmap_mask(bitmap: &Bitmap, invers: bool) -> Result<Surface> {
    let reverse = match bitmap.format {
        BitmapFormat::OneBitLe => false,
        BitmapFormat::OneBitBe => true,
        other => {
            return Err(CommonError::unsupported(format!("マスクに使えない形式です: {:?}", other)));
        }
    };
    let (width, height) = (bitmap.width as usize, bitmap.height as usize);
    let stride = bitmap.stride as usize;
    let row_bytes = (width + 7) / 8;
    if stride < row_bytes {
        return Err(CommonError::protocol("マスクの stride が不足しています"));
    }
    let data = bitmap.data.linearize();
    let needed = if height == 0 { 0 } else { (height - 1) * stride + row_bytes };
    if data.len() < needed {
        return Err(CommonError::protocol(format!(
            "マスクのデータが不足しています（{} < {}）",
            data.len(),
            needed
        )));
    }

    let mut surface = Surface::new(PixelFormat::A1, width as i32, height as i32)?;
    for y in 0..height {
        let src_y = if bitmap.flags.top_down() { y } else { height - 1 - y };
        let src = &data[src_y * stride..src_y * stride + row_bytes];
        let dest = surface.row_mut(y as i32);
        for (out, &b) in dest.iter_mut().zip(src) {
            let b = if reverse { b.reverse_bits() } else { b };
            *out = if invers { !b } else { b };
        }
    }
    Ok(surface)
}
