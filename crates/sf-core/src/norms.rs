//! Global vector alias, vector norms, and solution-change measures.

use nalgebra::{DMatrix, DVector};

/// Solution vector type used throughout stepflow.
pub type GlobalVector = DVector<f64>;

/// Dense matrix type for assembled operators and Jacobians.
pub type GlobalMatrix = DMatrix<f64>;

/// Vector norm selection for convergence tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VecNormType {
    Norm1,
    #[default]
    Norm2,
    NormInfinity,
}

/// Compute the requested norm of a vector.
pub fn norm(v: &GlobalVector, norm_type: VecNormType) -> f64 {
    match norm_type {
        VecNormType::Norm1 => v.iter().map(|x| x.abs()).sum(),
        VecNormType::Norm2 => v.norm(),
        VecNormType::NormInfinity => v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs())),
    }
}

/// Relative change of a solution with respect to its previous value,
/// `‖x - x_prev‖ / ‖x‖` in the given norm.
///
/// Returns 0 when both vectors are zero; returns `‖x - x_prev‖` unscaled when
/// only `x` is zero, so that a change away from a zero solution still
/// registers.
pub fn relative_change(x: &GlobalVector, x_prev: &GlobalVector, norm_type: VecNormType) -> f64 {
    let diff_norm = norm(&(x - x_prev), norm_type);
    let x_norm = norm(x, norm_type);
    if x_norm > 0.0 {
        diff_norm / x_norm
    } else {
        diff_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vec3(a: f64, b: f64, c: f64) -> GlobalVector {
        GlobalVector::from_vec(vec![a, b, c])
    }

    #[test]
    fn norms_of_simple_vector() {
        let v = vec3(3.0, -4.0, 0.0);
        assert_eq!(norm(&v, VecNormType::Norm1), 7.0);
        assert_eq!(norm(&v, VecNormType::Norm2), 5.0);
        assert_eq!(norm(&v, VecNormType::NormInfinity), 4.0);
    }

    #[test]
    fn relative_change_of_identical_vectors_is_zero() {
        let v = vec3(1.0, 2.0, 3.0);
        assert_eq!(relative_change(&v, &v, VecNormType::Norm2), 0.0);
    }

    #[test]
    fn relative_change_handles_zero_solution() {
        let zero = vec3(0.0, 0.0, 0.0);
        let prev = vec3(0.0, 1.0, 0.0);
        assert_eq!(relative_change(&zero, &zero, VecNormType::Norm2), 0.0);
        assert_eq!(relative_change(&zero, &prev, VecNormType::Norm2), 1.0);
    }

    proptest! {
        #[test]
        fn norms_are_nonnegative(xs in proptest::collection::vec(-1e6_f64..1e6, 1..8)) {
            let v = GlobalVector::from_vec(xs);
            prop_assert!(norm(&v, VecNormType::Norm1) >= 0.0);
            prop_assert!(norm(&v, VecNormType::Norm2) >= 0.0);
            prop_assert!(norm(&v, VecNormType::NormInfinity) >= 0.0);
        }

        #[test]
        fn infinity_norm_bounded_by_two_norm(xs in proptest::collection::vec(-1e6_f64..1e6, 1..8)) {
            let v = GlobalVector::from_vec(xs);
            prop_assert!(
                norm(&v, VecNormType::NormInfinity) <= norm(&v, VecNormType::Norm2) + 1e-9
            );
        }

        #[test]
        fn relative_change_is_scale_invariant(
            xs in proptest::collection::vec(0.1_f64..1e3, 1..6),
            scale in 0.1_f64..1e3,
        ) {
            let x = GlobalVector::from_vec(xs.clone());
            let x_prev = &x * 0.9;
            let a = relative_change(&x, &x_prev, VecNormType::Norm2);
            let b = relative_change(&(&x * scale), &(&x_prev * scale), VecNormType::Norm2);
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}
