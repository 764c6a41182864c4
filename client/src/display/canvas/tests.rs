use std::sync::Arc;

use env_logger::Builder;
use log::LevelFilter;
use remote_display_rs_common::protocol::{
    AlphaBlend, Bitmap, BitmapFlags, BitmapFormat, Blackness, Brush, Chunks, Clip, Composite,
    CompositeFlags, CopyArea, Fill, Image, ImageData, ImageDescriptor, ImageFlags, LineAttr, Opaque,
    Path, PathSeg, Point, Point16, PointFix, QMask, Rect, Rop3, RopDescriptor, ScaleMode, Stroke,
    Transparent,
};
use remote_display_rs_common::CommonError;

use super::*;
use crate::display::cache::DisplayCaches;
use crate::display::decoder::SurfaceRegistry;

fn init_logger() {
    let _ = Builder::new().is_test(true).filter_level(LevelFilter::Trace).try_init();
}

fn canvas(width: i32, height: i32) -> Canvas {
    init_logger();
    let decoder = ImageDecoder::new(PixelFormat::X8R8G8B8, Arc::new(DisplayCaches::new()));
    Canvas::new(width, height, decoder).expect("キャンバスの作成に失敗しました")
}

fn bitmap32(id: u64, flags: u8, width: u32, height: u32, pixels: &[u32]) -> Image {
    Image::bitmap(
        id,
        flags,
        Bitmap {
            format: BitmapFormat::ThirtyTwoBit,
            flags: BitmapFlags(BitmapFlags::TOP_DOWN),
            width,
            height,
            stride: width * 4,
            palette: None,
            palette_id: 0,
            data: Chunks::single(pixels.iter().flat_map(|p| p.to_le_bytes()).collect()),
        },
    )
}

fn mask_image(flags: u8, width: u32, bits: u8) -> Image {
    Image::bitmap(
        9,
        flags,
        Bitmap {
            format: BitmapFormat::OneBitLe,
            flags: BitmapFlags(BitmapFlags::TOP_DOWN),
            width,
            height: 1,
            stride: 1,
            palette: None,
            palette_id: 0,
            data: Chunks::single(vec![bits]),
        },
    )
}

fn row(canvas: &Canvas, y: i32) -> Vec<u32> {
    (0..canvas.surface().width()).map(|x| canvas.surface().pixel(x, y)).collect()
}

fn fill_cmd(brush: Brush, rop: u16) -> DrawCommand {
    DrawCommand::Fill(Fill { brush, rop_descriptor: RopDescriptor(rop), mask: QMask::default() })
}

fn copy_cmd(src: Image, src_area: Rect, mask: QMask) -> DrawCommand {
    DrawCommand::Copy(CopyArea {
        src_bitmap: Box::new(src),
        src_area,
        rop_descriptor: RopDescriptor(RopDescriptor::OP_PUT),
        scale_mode: ScaleMode::Nearest,
        mask,
    })
}

fn paint_all(canvas: &mut Canvas, color: u32) {
    let bounds = canvas.surface().bounds();
    canvas
        .draw(&bounds, &Clip::None, &fill_cmd(Brush::Solid(color), RopDescriptor::OP_PUT))
        .expect("塗りつぶしに失敗しました");
}

#[test]
fn test_fill_each_rop() {
    let d = 0x00f0_f0f0u32;
    let b = 0x000f_0ff0u32;
    let cases: Vec<(u16, u32)> = vec![
        (RopDescriptor::OP_PUT, b),
        (RopDescriptor::OP_OR, b | d),
        (RopDescriptor::OP_AND, b & d),
        (RopDescriptor::OP_XOR, b ^ d),
        (RopDescriptor::OP_PUT | RopDescriptor::INVERS_BRUSH, !b),
        (RopDescriptor::OP_OR | RopDescriptor::INVERS_DEST, b | !d),
        (RopDescriptor::OP_AND | RopDescriptor::INVERS_RES, !(b & d)),
        (RopDescriptor::OP_BLACKNESS, 0),
        (RopDescriptor::OP_WHITENESS, 0xffff_ffff),
        (RopDescriptor::OP_INVERS, !d),
    ];
    for (rop, expected) in cases {
        let mut c = canvas(2, 1);
        paint_all(&mut c, d);
        c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &fill_cmd(Brush::Solid(b), rop))
            .expect("塗りつぶしに失敗しました");
        assert_eq!(row(&c, 0), vec![expected, d], "rop {:#x}", rop);
    }
}

#[test]
fn test_fill_brush_none_with_invert() {
    let mut c = canvas(1, 1);
    paint_all(&mut c, 0x0000_00ff);
    // ブラシなしでも描画先を使う演算は適用する
    c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &fill_cmd(Brush::None, RopDescriptor::OP_INVERS))
        .expect("塗りつぶしに失敗しました");
    assert_eq!(row(&c, 0), vec![0xffff_ff00]);
}

#[test]
fn test_empty_region_still_touches_pattern() {
    let mut c = canvas(2, 2);
    let pattern = bitmap32(42, ImageFlags::CACHE_ME, 1, 1, &[0x0012_3456]);
    let cmd = fill_cmd(
        Brush::Pattern { pat: Box::new(pattern), pos: Point::new(0, 0) },
        RopDescriptor::OP_PUT,
    );
    c.draw(&Rect::new(0, 0, 2, 2), &Clip::Rects(vec![]), &cmd).expect("塗りつぶしに失敗しました");
    assert_eq!(row(&c, 0), vec![0, 0]);
    assert!(c.decoder_mut().caches().images.lock().contains(42));
    assert!(c.take_dirty().is_empty());
}

#[test]
fn test_copy_clipped_by_rects() {
    let mut c = canvas(4, 4);
    let src = bitmap32(0, 0, 4, 4, &[0x0011_2233; 16]);
    let clip = Clip::Rects(vec![Rect::new(0, 0, 2, 1), Rect::new(3, 3, 4, 4)]);
    c.draw(&Rect::new(0, 0, 4, 4), &clip, &copy_cmd(src, Rect::new(0, 0, 4, 4), QMask::default()))
        .expect("コピーに失敗しました");
    assert_eq!(row(&c, 0), vec![0x0011_2233, 0x0011_2233, 0, 0]);
    assert_eq!(row(&c, 1), vec![0; 4]);
    assert_eq!(row(&c, 3), vec![0, 0, 0, 0x0011_2233]);
}

#[test]
fn test_copy_through_mask() {
    let color = 0x00aa_bbcc;
    let src = bitmap32(0, 0, 4, 1, &[color; 4]);

    let mut c = canvas(4, 1);
    let mask = QMask { flags: 0, pos: Point::new(0, 0), bitmap: Some(Box::new(mask_image(0, 4, 0b0101))) };
    c.draw(&Rect::new(0, 0, 4, 1), &Clip::None, &copy_cmd(src.clone(), Rect::new(0, 0, 4, 1), mask))
        .expect("コピーに失敗しました");
    assert_eq!(row(&c, 0), vec![color, 0, color, 0]);

    let mut c = canvas(4, 1);
    let mask = QMask {
        flags: QMask::INVERS,
        pos: Point::new(0, 0),
        bitmap: Some(Box::new(mask_image(0, 4, 0b0101))),
    };
    c.draw(&Rect::new(0, 0, 4, 1), &Clip::None, &copy_cmd(src, Rect::new(0, 0, 4, 1), mask))
        .expect("コピーに失敗しました");
    assert_eq!(row(&c, 0), vec![0, color, 0, color]);
}

#[test]
fn test_mask_origin_and_cached_invert() {
    let color = 0x0000_0001;
    let src = bitmap32(0, 0, 4, 1, &[color; 4]);

    // 描画先 x=2 がマスクの x=1 に対応する
    let mut c = canvas(6, 1);
    let mask = QMask { flags: 0, pos: Point::new(1, 0), bitmap: Some(Box::new(mask_image(0, 4, 0b0101))) };
    c.draw(&Rect::new(2, 0, 6, 1), &Clip::None, &copy_cmd(src.clone(), Rect::new(0, 0, 4, 1), mask))
        .expect("コピーに失敗しました");
    assert_eq!(row(&c, 0), vec![0, 0, 0, color, 0, 0]);

    // キャッシュされるマスクは領域側で反転する（マスク外は描かない）
    let mut c = canvas(6, 1);
    let mask = QMask {
        flags: QMask::INVERS,
        pos: Point::new(1, 0),
        bitmap: Some(Box::new(mask_image(ImageFlags::CACHE_ME, 4, 0b0101))),
    };
    c.draw(&Rect::new(2, 0, 6, 1), &Clip::None, &copy_cmd(src, Rect::new(0, 0, 4, 1), mask))
        .expect("コピーに失敗しました");
    assert_eq!(row(&c, 0), vec![0, 0, color, 0, color, 0]);
}

#[test]
fn test_copy_scaled_nearest() {
    let mut c = canvas(4, 1);
    let src = bitmap32(0, 0, 2, 1, &[1, 2]);
    c.draw(&Rect::new(0, 0, 4, 1), &Clip::None, &copy_cmd(src, Rect::new(0, 0, 2, 1), QMask::default()))
        .expect("コピーに失敗しました");
    assert_eq!(row(&c, 0), vec![1, 1, 2, 2]);
}

#[test]
fn test_opaque_tiled_pattern_phase() {
    let (a, b) = (0x0000_00aa, 0x0000_bb00);
    let mut c = canvas(4, 1);
    let cmd = DrawCommand::Opaque(Opaque {
        src_bitmap: Box::new(bitmap32(0, 0, 4, 1, &[0; 4])),
        src_area: Rect::new(0, 0, 4, 1),
        brush: Brush::Pattern { pat: Box::new(bitmap32(1, 0, 2, 1, &[a, b])), pos: Point::new(1, 0) },
        rop_descriptor: RopDescriptor(RopDescriptor::OP_OR),
        scale_mode: ScaleMode::Nearest,
        mask: QMask::default(),
    });
    c.draw(&Rect::new(0, 0, 4, 1), &Clip::None, &cmd).expect("描画に失敗しました");
    // x=0 はタイルの (0-1) mod 2 = 1
    assert_eq!(row(&c, 0), vec![b, a, b, a]);
}

#[test]
fn test_blackness_whiteness_invers() {
    let mut c = canvas(3, 1);
    paint_all(&mut c, 0x0012_3456);
    let whole = Blackness::default();
    c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &DrawCommand::Blackness(whole.clone()))
        .expect("黒塗りに失敗しました");
    c.draw(&Rect::new(1, 0, 2, 1), &Clip::None, &DrawCommand::Whiteness(whole.clone()))
        .expect("白塗りに失敗しました");
    c.draw(&Rect::new(2, 0, 3, 1), &Clip::None, &DrawCommand::Invers(whole))
        .expect("反転に失敗しました");
    assert_eq!(row(&c, 0), vec![0, 0xffff_ffff, !0x0012_3456]);
}

#[test]
fn test_copy_bits_overlapping_in_every_direction() {
    let (w, h) = (4, 4);
    let mut original = Surface::new(PixelFormat::X8R8G8B8, w, h).expect("サーフェスの作成に失敗しました");
    for y in 0..h {
        for x in 0..w {
            original.set_pixel(x, y, (y * w + x + 1) as u32);
        }
    }
    let directions = [(1, 0), (-1, 0), (0, 1), (0, -1), (1, 1), (-1, -1), (1, -1), (-1, 1), (2, 3)];
    for (dx, dy) in directions {
        let mut c = canvas(w, h);
        c.put_image(&original.bounds(), &original, None).expect("画像の書き込みに失敗しました");
        let bbox = Rect::new(0, 0, w, h).translate(dx, dy);
        c.draw(&bbox, &Clip::None, &DrawCommand::CopyBits { src_pos: Point::new(0, 0) })
            .expect("コピーに失敗しました");
        for y in 0..h {
            for x in 0..w {
                let (sx, sy) = (x - dx, y - dy);
                let expected = if original.bounds().contains(sx, sy) {
                    original.pixel(sx, sy)
                } else {
                    original.pixel(x, y)
                };
                assert_eq!(c.surface().pixel(x, y), expected, "({}, {}) を ({}, {}) 方向に移動", x, y, dx, dy);
            }
        }
    }
}

#[test]
fn test_composite_over_solid_source() {
    let mut c = canvas(2, 1);
    paint_all(&mut c, 0x00ff_ffff);
    let src = Image::bitmap(
        0,
        0,
        Bitmap {
            format: BitmapFormat::Rgba,
            flags: BitmapFlags(BitmapFlags::TOP_DOWN),
            width: 1,
            height: 1,
            stride: 4,
            palette: None,
            palette_id: 0,
            data: Chunks::single(0x8080_0000u32.to_le_bytes().to_vec()),
        },
    );
    let cmd = DrawCommand::Composite(Composite {
        flags: CompositeFlags::build(3, 0, 0, 1, 0, false, false, false, false),
        src_bitmap: Box::new(src),
        mask_bitmap: None,
        src_transform: None,
        mask_transform: None,
        src_origin: Point16::default(),
        mask_origin: Point16::default(),
    });
    c.draw(&Rect::new(0, 0, 2, 1), &Clip::None, &cmd).expect("合成に失敗しました");
    assert_eq!(row(&c, 0), vec![0x00ff_7f7f, 0x00ff_7f7f]);
}

#[test]
fn test_composite_unknown_operator() {
    let mut c = canvas(1, 1);
    let cmd = DrawCommand::Composite(Composite {
        flags: CompositeFlags::build(0x20, 0, 0, 0, 0, false, false, false, false),
        src_bitmap: Box::new(bitmap32(0, 0, 1, 1, &[0])),
        mask_bitmap: None,
        src_transform: None,
        mask_transform: None,
        src_origin: Point16::default(),
        mask_origin: Point16::default(),
    });
    let err = c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &cmd).expect_err("未知の演算子が受理されました");
    assert!(matches!(err, CommonError::UnsupportedFormat(_)));
}

#[test]
fn test_rop3_pattern_negative_phase() {
    let mut c = canvas(4, 1);
    let cmd = DrawCommand::Rop3(Rop3 {
        src_bitmap: Box::new(bitmap32(0, 0, 4, 1, &[0; 4])),
        src_area: Rect::new(0, 0, 4, 1),
        brush: Brush::Pattern { pat: Box::new(bitmap32(1, 0, 3, 1, &[1, 2, 3])), pos: Point::new(1, 0) },
        rop3: 0xf0,
        scale_mode: ScaleMode::Nearest,
        mask: QMask::default(),
    });
    c.draw(&Rect::new(0, 0, 4, 1), &Clip::None, &cmd).expect("ROP3 に失敗しました");
    // (0 - 1) mod 3 = 2 から始まる
    assert_eq!(row(&c, 0), vec![3, 1, 2, 3]);
}

#[test]
fn test_rop3_source_xor_dest() {
    let mut c = canvas(2, 1);
    paint_all(&mut c, 0x0000_ff00);
    let cmd = DrawCommand::Rop3(Rop3 {
        src_bitmap: Box::new(bitmap32(0, 0, 2, 1, &[0x0000_0f0f, 0])),
        src_area: Rect::new(0, 0, 2, 1),
        brush: Brush::Solid(0),
        rop3: 0x66,
        scale_mode: ScaleMode::Nearest,
        mask: QMask::default(),
    });
    c.draw(&Rect::new(0, 0, 2, 1), &Clip::None, &cmd).expect("ROP3 に失敗しました");
    assert_eq!(row(&c, 0), vec![0x0000_f00f, 0x0000_ff00]);
}

#[test]
fn test_transparent_color_key() {
    let mut c = canvas(2, 1);
    paint_all(&mut c, 0x0001_0101);
    let cmd = DrawCommand::Transparent(Transparent {
        src_bitmap: Box::new(bitmap32(0, 0, 2, 1, &[0x00ff_00ff, 0x0012_3456])),
        src_area: Rect::new(0, 0, 2, 1),
        src_color: 0x00ff_00ff,
        true_color: 0xffff_00ff,
    });
    c.draw(&Rect::new(0, 0, 2, 1), &Clip::None, &cmd).expect("透過描画に失敗しました");
    assert_eq!(row(&c, 0), vec![0x0001_0101, 0x0012_3456]);
}

#[test]
fn test_alpha_blend_clears_dest_alpha() {
    let mut c = canvas(1, 1);
    let cmd = DrawCommand::AlphaBlend(AlphaBlend {
        alpha_flags: 0,
        alpha: 0x80,
        src_bitmap: Box::new(bitmap32(0, 0, 1, 1, &[0x00ff_0000])),
        src_area: Rect::new(0, 0, 1, 1),
    });
    c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &cmd).expect("ブレンドに失敗しました");
    assert_eq!(row(&c, 0), vec![0x0080_0000]);
}

#[test]
fn test_alpha_zero_is_noop() {
    let mut c = canvas(1, 1);
    let cmd = DrawCommand::AlphaBlend(AlphaBlend {
        alpha_flags: AlphaBlend::DEST_HAS_ALPHA,
        alpha: 0,
        src_bitmap: Box::new(bitmap32(0, 0, 1, 1, &[0x00ff_0000])),
        src_area: Rect::new(0, 0, 1, 1),
    });
    c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &cmd).expect("ブレンドに失敗しました");
    assert_eq!(row(&c, 0), vec![0]);
}

#[test]
fn test_stroke_horizontal_line() {
    let mut c = canvas(8, 3);
    let cmd = DrawCommand::Stroke(Stroke {
        path: Path {
            segments: vec![PathSeg {
                flags: PathSeg::BEGIN | PathSeg::END,
                points: vec![PointFix::from_int(1, 1), PointFix::from_int(6, 1)],
            }],
        },
        attr: LineAttr::default(),
        brush: Brush::Solid(0x00ff_ffff),
        fore_mode: RopDescriptor(RopDescriptor::OP_PUT),
        back_mode: RopDescriptor(RopDescriptor::OP_PUT),
    });
    c.draw(&Rect::new(0, 0, 8, 3), &Clip::None, &cmd).expect("線の描画に失敗しました");
    let w = 0x00ff_ffff;
    assert_eq!(row(&c, 1), vec![0, w, w, w, w, w, 0, 0]);
    assert_eq!(row(&c, 0), vec![0; 8]);
}

#[test]
fn test_group_clip() {
    let mut c = canvas(2, 1);
    c.group_start(&Region::from_rect(&Rect::new(0, 0, 1, 1)));
    paint_all(&mut c, 5);
    assert_eq!(row(&c, 0), vec![5, 0]);
    c.group_end();
    paint_all(&mut c, 6);
    assert_eq!(row(&c, 0), vec![6, 6]);
}

#[test]
fn test_surface_source() {
    let registry = Arc::new(SurfaceRegistry::new());
    let mut other = Surface::new(PixelFormat::X8R8G8B8, 2, 1).expect("サーフェスの作成に失敗しました");
    other.set_pixel(1, 0, 0x0000_0077);
    registry.insert(3, other);

    let image = Image {
        descriptor: ImageDescriptor { id: 0, flags: ImageFlags(0), width: 2, height: 1 },
        data: ImageData::Surface { surface_id: 3 },
    };
    let mut c = canvas(1, 1);
    let cmd = copy_cmd(image, Rect::new(1, 0, 2, 1), QMask::default());
    let err = c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &cmd).expect_err("取得先なしで成功しました");
    assert!(matches!(err, CommonError::UnsupportedFormat(_)));

    let mut c = canvas(1, 1).with_surfaces(registry);
    c.draw(&Rect::new(0, 0, 1, 1), &Clip::None, &cmd).expect("コピーに失敗しました");
    assert_eq!(row(&c, 0), vec![0x77]);
}

#[test]
fn test_read_bits_and_put_image() {
    let mut c = canvas(4, 2).with_scale_mode(ScaleMode::Nearest);
    let mut src = Surface::new(PixelFormat::X8R8G8B8, 1, 1).expect("サーフェスの作成に失敗しました");
    src.set_pixel(0, 0, 9);
    c.put_image(&Rect::new(0, 0, 2, 2), &src, Some(&Region::from_rect(&Rect::new(0, 0, 4, 1))))
        .expect("画像の書き込みに失敗しました");
    let bits = c.read_bits(&Rect::new(0, 0, 4, 2)).expect("読み出しに失敗しました");
    assert_eq!(bits.pixel(1, 0), 9);
    assert_eq!(bits.pixel(1, 1), 0);
    assert!(c.read_bits(&Rect::new(2, 0, 5, 1)).is_err());
}

#[test]
fn test_dirty_region_tracking() {
    let mut c = canvas(4, 4);
    c.draw(&Rect::new(0, 0, 2, 2), &Clip::None, &fill_cmd(Brush::Solid(1), RopDescriptor::OP_PUT))
        .expect("塗りつぶしに失敗しました");
    c.draw(&Rect::new(3, 3, 4, 4), &Clip::None, &fill_cmd(Brush::Solid(1), RopDescriptor::OP_PUT))
        .expect("塗りつぶしに失敗しました");
    let dirty = c.take_dirty();
    assert_eq!(dirty.extents(), Rect::new(0, 0, 4, 4));
    assert!(dirty.contains_point(3, 3));
    assert!(!dirty.contains_point(2, 2));
    assert!(c.take_dirty().is_empty());

    c.clear();
    assert_eq!(c.take_dirty().extents(), Rect::new(0, 0, 4, 4));
    assert_eq!(row(&c, 0), vec![0; 4]);
}
