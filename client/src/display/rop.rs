//! ラスタ演算
//!
//! ROP 記述子のビット（入力反転・結果反転・演算の種類）を16種類の
//! 標準演算のどれか1つに解決します。反転の組み合わせはド・モルガンの
//! 法則で演算の種類に吸収されます。

use remote_display_rs_common::protocol::RopDescriptor;
use serde::{Deserialize, Serialize};

/// 2項ラスタ演算（s: ソース、d: 描画先）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rop {
    /// 0
    Clear = 0,
    /// s & d
    And = 1,
    /// s & !d
    AndReverse = 2,
    /// s
    Copy = 3,
    /// !s & d
    AndInverted = 4,
    /// d
    Noop = 5,
    /// s ^ d
    Xor = 6,
    /// s | d
    Or = 7,
    /// !(s | d)
    Nor = 8,
    /// !(s ^ d)
    Equiv = 9,
    /// !d
    Invert = 10,
    /// s | !d
    OrReverse = 11,
    /// !s
    CopyInverted = 12,
    /// !s | d
    OrInverted = 13,
    /// !(s & d)
    Nand = 14,
    /// 全ビット1
    Set = 15,
}

impl Rop {
    /// 演算を適用
    pub fn apply(self, s: u32, d: u32) -> u32 {
        match self {
            Rop::Clear => 0,
            Rop::And => s & d,
            Rop::AndReverse => s & !d,
            Rop::Copy => s,
            Rop::AndInverted => !s & d,
            Rop::Noop => d,
            Rop::Xor => s ^ d,
            Rop::Or => s | d,
            Rop::Nor => !(s | d),
            Rop::Equiv => !(s ^ d),
            Rop::Invert => !d,
            Rop::OrReverse => s | !d,
            Rop::CopyInverted => !s,
            Rop::OrInverted => !s | d,
            Rop::Nand => !(s & d),
            Rop::Set => !0,
        }
    }

    /// 同じ画素を2度適用すると結果が変わる演算かどうか
    ///
    /// 線の描画ではこの演算のときだけスパンの重複を取り除きます。
    pub fn is_careful(self) -> bool {
        let r = self as u8;
        (r & 0xc) == 0x8 || (r & 0x3) == 0x2
    }
}

/// 演算の入力の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RopInput {
    /// ソース画像
    Src = 0,
    /// ブラシ
    Brush = 1,
    /// 描画先
    Dest = 2,
}

impl RopInput {
    fn invert_mask(self) -> u16 {
        match self {
            RopInput::Src => RopDescriptor::INVERS_SRC,
            RopInput::Brush => RopDescriptor::INVERS_BRUSH,
            RopInput::Dest => RopDescriptor::INVERS_DEST,
        }
    }
}

/// ROP 記述子を標準演算に解決
///
/// `src_input` と `dest_input` は演算の s と d にどの入力が対応するかを表します。
pub fn rop_from_descriptor(desc: RopDescriptor, src_input: RopInput, dest_input: RopInput) -> Rop {
    let old = desc.0;
    let mut bits = old & !(RopDescriptor::INVERS_SRC | RopDescriptor::INVERS_DEST);
    if old & src_input.invert_mask() != 0 {
        bits |= RopDescriptor::INVERS_SRC;
    }
    if old & dest_input.invert_mask() != 0 {
        bits |= RopDescriptor::INVERS_DEST;
    }
    let desc = RopDescriptor(bits);
    let inv_s = desc.has(RopDescriptor::INVERS_SRC);
    let inv_d = desc.has(RopDescriptor::INVERS_DEST);
    let inv_res = desc.has(RopDescriptor::INVERS_RES);

    if desc.has(RopDescriptor::OP_PUT) {
        if inv_s ^ inv_res {
            Rop::CopyInverted
        } else {
            Rop::Copy
        }
    } else if desc.has(RopDescriptor::OP_OR) {
        match (inv_res, inv_s, inv_d) {
            (true, true, true) => Rop::And,
            (true, true, false) => Rop::AndReverse,
            (true, false, true) => Rop::AndInverted,
            (true, false, false) => Rop::Nor,
            (false, true, true) => Rop::Nand,
            (false, true, false) => Rop::OrInverted,
            (false, false, true) => Rop::OrReverse,
            (false, false, false) => Rop::Or,
        }
    } else if desc.has(RopDescriptor::OP_AND) {
        match (inv_res, inv_s, inv_d) {
            (true, true, true) => Rop::Or,
            (true, true, false) => Rop::OrReverse,
            (true, false, true) => Rop::OrInverted,
            (true, false, false) => Rop::Nand,
            (false, true, true) => Rop::Nor,
            (false, true, false) => Rop::AndInverted,
            (false, false, true) => Rop::AndReverse,
            (false, false, false) => Rop::And,
        }
    } else if desc.has(RopDescriptor::OP_XOR) {
        if inv_res ^ inv_s ^ inv_d {
            Rop::Equiv
        } else {
            Rop::Xor
        }
    } else if desc.has(RopDescriptor::OP_BLACKNESS) {
        Rop::Clear
    } else if desc.has(RopDescriptor::OP_WHITENESS) {
        Rop::Set
    } else if desc.has(RopDescriptor::OP_INVERS) {
        Rop::Invert
    } else {
        Rop::Copy
    }
}

/// 3項ラスタ演算をビットごとに適用
///
/// `code` のビット `(p << 2) | (s << 1) | d` が結果になります
/// （パターン 0xF0、ソース 0xCC、描画先 0xAA）。
pub fn rop3(code: u8, p: u32, s: u32, d: u32) -> u32 {
    let mut out = 0u32;
    for index in 0..8u8 {
        if code & (1 << index) == 0 {
            continue;
        }
        let pm = if index & 4 != 0 { p } else { !p };
        let sm = if index & 2 != 0 { s } else { !s };
        let dm = if index & 1 != 0 { d } else { !d };
        out |= pm & sm & dm;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Rop; 16] = [
        Rop::Clear,
        Rop::And,
        Rop::AndReverse,
        Rop::Copy,
        Rop::AndInverted,
        Rop::Noop,
        Rop::Xor,
        Rop::Or,
        Rop::Nor,
        Rop::Equiv,
        Rop::Invert,
        Rop::OrReverse,
        Rop::CopyInverted,
        Rop::OrInverted,
        Rop::Nand,
        Rop::Set,
    ];

    #[test]
    fn test_descriptor_truth_table() {
        // 反転フラグを実際に適用した結果と一致すること
        let s = 0b1100u32;
        let d = 0b1010u32;
        for op in [RopDescriptor::OP_PUT, RopDescriptor::OP_OR, RopDescriptor::OP_AND, RopDescriptor::OP_XOR] {
            for flags in 0..8u16 {
                let inv_s = flags & 1 != 0;
                let inv_d = flags & 2 != 0;
                let inv_res = flags & 4 != 0;
                let mut bits = op;
                if inv_s {
                    bits |= RopDescriptor::INVERS_SRC;
                }
                if inv_d {
                    bits |= RopDescriptor::INVERS_DEST;
                }
                if inv_res {
                    bits |= RopDescriptor::INVERS_RES;
                }
                let rop = rop_from_descriptor(RopDescriptor(bits), RopInput::Src, RopInput::Dest);

                let ss = if inv_s { !s } else { s };
                let dd = if inv_d { !d } else { d };
                let raw = match op {
                    RopDescriptor::OP_PUT => ss,
                    RopDescriptor::OP_OR => ss | dd,
                    RopDescriptor::OP_AND => ss & dd,
                    _ => ss ^ dd,
                };
                let expected = if inv_res { !raw } else { raw };
                // PUT は描画先反転を使わない
                if op == RopDescriptor::OP_PUT {
                    let put = if inv_s ^ inv_res { !s } else { s };
                    assert_eq!(rop.apply(s, d) & 0xf, put & 0xf);
                } else {
                    assert_eq!(rop.apply(s, d) & 0xf, expected & 0xf, "op={:#x} flags={}", op, flags);
                }
            }
        }
    }

    #[test]
    fn test_flag_independent_ops() {
        let inputs = (RopInput::Brush, RopInput::Dest);
        for extra in [0, RopDescriptor::INVERS_SRC | RopDescriptor::INVERS_RES] {
            assert_eq!(
                rop_from_descriptor(RopDescriptor(RopDescriptor::OP_BLACKNESS | extra), inputs.0, inputs.1),
                Rop::Clear
            );
            assert_eq!(
                rop_from_descriptor(RopDescriptor(RopDescriptor::OP_WHITENESS | extra), inputs.0, inputs.1),
                Rop::Set
            );
            assert_eq!(
                rop_from_descriptor(RopDescriptor(RopDescriptor::OP_INVERS | extra), inputs.0, inputs.1),
                Rop::Invert
            );
        }
        assert_eq!(rop_from_descriptor(RopDescriptor(0), inputs.0, inputs.1), Rop::Copy);
    }

    #[test]
    fn test_input_mapping() {
        // ブラシ反転はブラシが s のときだけ効く
        let desc = RopDescriptor(RopDescriptor::OP_PUT | RopDescriptor::INVERS_BRUSH);
        assert_eq!(rop_from_descriptor(desc, RopInput::Brush, RopInput::Dest), Rop::CopyInverted);
        assert_eq!(rop_from_descriptor(desc, RopInput::Src, RopInput::Dest), Rop::Copy);

        // 不透明描画ではソースが d 側になる
        let desc = RopDescriptor(RopDescriptor::OP_OR | RopDescriptor::INVERS_SRC);
        assert_eq!(rop_from_descriptor(desc, RopInput::Brush, RopInput::Src), Rop::OrReverse);
    }

    #[test]
    fn test_careful_set() {
        let careful: Vec<u8> = ALL.iter().filter(|r| r.is_careful()).map(|&r| r as u8).collect();
        assert_eq!(careful, vec![2, 6, 8, 9, 10, 11, 14]);
    }

    #[test]
    fn test_rop3_basic_codes() {
        let (p, s, d) = (0xF0F0_F0F0u32, 0xCCCC_CCCCu32, 0xAAAA_AAAAu32);
        assert_eq!(rop3(0xCC, p, s, d), s); // SRCCOPY
        assert_eq!(rop3(0xF0, p, s, d), p); // PATCOPY
        assert_eq!(rop3(0xAA, p, s, d), d);
        assert_eq!(rop3(0x66, p, s, d), s ^ d); // SRCINVERT
        assert_eq!(rop3(0x5A, p, s, d), p ^ d); // PATINVERT
        assert_eq!(rop3(0x00, p, s, d), 0);
        assert_eq!(rop3(0xFF, p, s, d), !0);
        // 各コードは 0xF0/0xCC/0xAA 入力の下位8ビットに一致する
        for code in 0..=255u8 {
            assert_eq!(rop3(code, 0xF0, 0xCC, 0xAA) & 0xff, code as u32);
        }
    }
}
