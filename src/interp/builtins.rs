// SPDX-FileCopyrightText: 2024 University of Rochester
//
// SPDX-License-Identifier: MIT

/*! The table of builtins the interpreter understands, keyed by mangled
symbol name. Compatibility is by symbol name only; everything not listed
here is treated as an opaque call.
*/

use lazy_static::lazy_static;

use crate::{CmpOp, FastHashMap, IntBinOp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Builtin {
    IntCmp(CmpOp),
    IntArith(IntBinOp),
    /// `Int.init(_builtinIntegerLiteral:)`
    IntLiteralCtor,
    /// The standard library `assert(_:_:file:line:)`.
    Assert,
    /// `TensorShape.init(arrayLiteral:)`
    ShapeCtor,
    /// The `Tensor.shape` getter.
    ShapeGetter,
    /// The `TensorShape` subscript read accessor.
    ShapeSubscript,
    /// The `Tensor.rank` getter.
    RankGetter,
    /// `TensorShape == TensorShape`
    ShapeEq,
    /// Elementwise shape broadcast.
    Broadcast,
}

lazy_static! {
    pub(crate) static ref BUILTINS: FastHashMap<&'static str, Builtin> = {
        let mut table = FastHashMap::default();
        table.insert("$sSi2eeoiySbSi_SitFZ", Builtin::IntCmp(CmpOp::Eq));
        table.insert("$sSi1goiySbSi_SitFZ", Builtin::IntCmp(CmpOp::Gt));
        table.insert("$sSi2geoiySbSi_SitFZ", Builtin::IntCmp(CmpOp::Ge));
        table.insert("$sSi1loiySbSi_SitFZ", Builtin::IntCmp(CmpOp::Lt));
        table.insert("$sSi2leoiySbSi_SitFZ", Builtin::IntCmp(CmpOp::Le));
        table.insert("$sSi1poiyS2i_SitFZ", Builtin::IntArith(IntBinOp::Add));
        table.insert("$sSi1soiyS2i_SitFZ", Builtin::IntArith(IntBinOp::Sub));
        table.insert("$sSi1moiyS2i_SitFZ", Builtin::IntArith(IntBinOp::Mul));
        table.insert("$sSi1doiyS2i_SitFZ", Builtin::IntArith(IntBinOp::Div));
        table.insert("$sSi22_builtinIntegerLiteralSiBI_tcfC", Builtin::IntLiteralCtor);
        table.insert(
            "$ss6assert__4file4lineySbyXK_SSyXKs12StaticStringVSutF",
            Builtin::Assert,
        );
        table.insert(
            "$s10TensorFlow0A5ShapeV12arrayLiteralACSid_tcfC",
            Builtin::ShapeCtor,
        );
        table.insert("$s10TensorFlow0A0V5shapeAA0A5ShapeVvg", Builtin::ShapeGetter);
        table.insert("$s10TensorFlow0A5ShapeVyS2icir", Builtin::ShapeSubscript);
        table.insert("$s10TensorFlow0A0V4rankSivg", Builtin::RankGetter);
        table.insert(
            "$s10TensorFlow0A5ShapeV2eeoiySbAC_ACtFZ",
            Builtin::ShapeEq,
        );
        table.insert("broadcast", Builtin::Broadcast);
        table
    };
}
