//! Flattening agrees with direct evaluation.
//!
//! Random pure affine expressions over two dims and one symbol are
//! evaluated three ways: directly, through their flattened rows (locals
//! computed from their divisions), and after simplification.

use loopnest_ir::affine_expr::floor_div;
use loopnest_ir::{flatten_exprs, simplify_affine_expr, AffineExpr};
use proptest::prelude::*;

fn affine_expr() -> impl Strategy<Value = AffineExpr> {
    let leaf = prop_oneof![
        (0usize..2).prop_map(AffineExpr::dim),
        Just(AffineExpr::symbol(0)),
        (-10i64..10).prop_map(AffineExpr::constant),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a + b),
            (inner.clone(), -4i64..5).prop_map(|(a, c)| a * c),
            (inner.clone(), 1i64..6).prop_map(|(a, c)| a.floor_div_by(c)),
            (inner.clone(), 1i64..6).prop_map(|(a, c)| a.ceil_div_by(c)),
            (inner, 1i64..6).prop_map(|(a, c)| a.modulo_by(c)),
        ]
    })
}

fn eval_row(row: &[i64], values: &[i64]) -> i64 {
    let (coeffs, constant) = row.split_at(row.len() - 1);
    coeffs.iter().zip(values).map(|(c, v)| c * v).sum::<i64>() + constant[0]
}

proptest! {
    #[test]
    fn test_flattened_rows_evaluate_like_expr(
        expr in affine_expr(),
        d0 in -20i64..20,
        d1 in -20i64..20,
        s0 in -20i64..20,
    ) {
        let expected = expr.evaluate(&[d0, d1], &[s0]).unwrap();
        let flat = flatten_exprs(std::slice::from_ref(&expr), 2, 1).unwrap();

        let mut values = vec![d0, d1, s0];
        for local in &flat.locals {
            // later locals have zero coefficients in earlier dividends
            let mut padded = values.clone();
            padded.resize(flat.num_cols() - 1, 0);
            values.push(floor_div(eval_row(&local.dividend, &padded), local.divisor));
        }
        prop_assert_eq!(eval_row(&flat.results[0], &values), expected);
    }

    #[test]
    fn test_simplify_preserves_value(
        expr in affine_expr(),
        d0 in -20i64..20,
        d1 in -20i64..20,
        s0 in -20i64..20,
    ) {
        let simplified = simplify_affine_expr(&expr, 2, 1);
        prop_assert_eq!(
            simplified.evaluate(&[d0, d1], &[s0]),
            expr.evaluate(&[d0, d1], &[s0])
        );
    }
}
