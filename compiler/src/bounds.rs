// bounds.rs — Exact affine image of an iteration box
//
// Given one affine row (the coefficients of a space or time coordinate
// over the source loop variables) and the source box, computes the exact
// min and extent of the row's image. Each coefficient contributes its most
// negative corner to the min and its most positive corner to the max, so
// the image bounds are tight for a full box.
//
// Preconditions: `coeffs`, `mins`, `extents` have equal length.
// Postconditions: for constant inputs the returned (min, extent) covers
//   exactly the set { Σ c_i * x_i : x_i in [min_i, min_i + extent_i) }.
// Failure modes: none.
// Side effects: none.

use crate::expr::{simplify, Expr};

/// Symbolic (min, extent) of `Σ coeffs[i] * x_i` over the box described by
/// `mins`/`extents`. Bounds may be non-constant expressions; the result is
/// simplified but otherwise symbolic.
pub fn box_image(coeffs: &[i64], mins: &[Expr], extents: &[Expr]) -> (Expr, Expr) {
    debug_assert_eq!(coeffs.len(), mins.len());
    debug_assert_eq!(coeffs.len(), extents.len());

    let mut lo = Expr::int(0);
    let mut hi = Expr::int(0);
    for ((&c, min), extent) in coeffs.iter().zip(mins).zip(extents) {
        let last = min.clone() + extent.clone() - Expr::int(1);
        if c < 0 {
            lo = lo + Expr::int(c) * last;
            hi = hi + Expr::int(c) * min.clone();
        } else {
            lo = lo + Expr::int(c) * min.clone();
            hi = hi + Expr::int(c) * last;
        }
    }
    let lo = simplify(&lo);
    let extent = simplify(&(hi - lo.clone() + Expr::int(1)));
    (lo, extent)
}

/// Constant-only convenience wrapper over `box_image`.
pub fn box_image_const(coeffs: &[i64], ranges: &[(i64, i64)]) -> (i64, i64) {
    let mins: Vec<Expr> = ranges.iter().map(|&(m, _)| Expr::int(m)).collect();
    let extents: Vec<Expr> = ranges.iter().map(|&(_, e)| Expr::int(e)).collect();
    let (lo, extent) = box_image(coeffs, &mins, &extents);
    (
        lo.as_const().expect("constant inputs fold"),
        extent.as_const().expect("constant inputs fold"),
    )
}
