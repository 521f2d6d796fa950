//! Linear algebra helpers built on nalgebra

use nalgebra::allocator::Allocator;
use nalgebra::{
    ComplexField, Const, DefaultAllocator, DimDiff, DimSub, Matrix3, SMatrix, SVector, SymmetricEigen,
    U1,
};

/// Iteration cap for the symmetric eigen solver
const EIGEN_MAX_ITERATIONS: usize = 1000;

/// Mirror the on-and-above diagonal entries onto the lower triangle
pub(crate) fn symmetrize_upper<const D: usize>(matrix: &mut SMatrix<f64, D, D>) {
    matrix.fill_lower_triangle_with_upper_triangle();
}

/// Invert a square matrix, producing NaN entries when it is singular
///
/// A singular normal matrix has no defined inverse; the NaN result is left
/// to propagate into the trial calibration where the field range check
/// rejects it.
pub(crate) fn invert_or_nan<const D: usize>(matrix: SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    matrix
        .try_inverse()
        .unwrap_or_else(|| SMatrix::from_element(f64::NAN))
}

/// Inverse of a symmetric 3x3 matrix, NaN when singular
pub(crate) fn symmetric_inverse(matrix: &Matrix3<f64>) -> Matrix3<f64> {
    let inverse = invert_or_nan(*matrix);
    // Average the transposed pair to keep the result exactly symmetric
    (inverse + inverse.transpose()) * 0.5
}

/// Eigen-decomposition of a real symmetric matrix
///
/// Eigenvalues are unsorted and eigenvectors are the matrix columns, with no
/// sign convention. If the iteration cap is hit every value is NaN.
pub(crate) fn eigen_decompose<const D: usize>(
    matrix: SMatrix<f64, D, D>,
) -> (SVector<f64, D>, SMatrix<f64, D, D>)
where
    Const<D>: DimSub<U1>,
    DefaultAllocator: Allocator<DimDiff<Const<D>, U1>>,
{
    match SymmetricEigen::<f64, Const<D>>::try_new(matrix, f64::EPSILON, EIGEN_MAX_ITERATIONS) {
        Some(eigen) => (eigen.eigenvalues, eigen.eigenvectors),
        None => (
            SVector::<f64, D>::from([f64::NAN; D]),
            SMatrix::<f64, D, D>::from([[f64::NAN; D]; D]),
        ),
    }
}

/// Square root through the nalgebra scalar traits, usable without `std`
pub(crate) fn sqrt(value: f64) -> f64 {
    ComplexField::sqrt(value)
}

pub(crate) fn abs(value: f64) -> f64 {
    ComplexField::abs(value)
}

pub(crate) fn powf(value: f64, exponent: f64) -> f64 {
    ComplexField::powf(value, exponent)
}

/// Index of the smallest eigenvalue (first one wins on ties)
pub(crate) fn smallest_index<const D: usize>(eigenvalues: &SVector<f64, D>) -> usize {
    let mut smallest = 0;
    for i in 1..D {
        if eigenvalues[i] < eigenvalues[smallest] {
            smallest = i;
        }
    }
    smallest
}

/// Principal square root of a symmetric positive-definite 3x3 matrix
///
/// Each eigenvector column is scaled by the fourth root of its eigenvalue
/// magnitude, so `M * M^T = V * sqrt(D) * V^T` is symmetric by construction.
pub(crate) fn symmetric_sqrt(matrix: &Matrix3<f64>) -> Matrix3<f64> {
    let (eigenvalues, mut eigenvectors) = eigen_decompose(*matrix);
    for (j, mut column) in eigenvectors.column_iter_mut().enumerate() {
        column *= sqrt(sqrt(abs(eigenvalues[j])));
    }
    let mut root = eigenvectors * eigenvectors.transpose();
    symmetrize_upper(&mut root);
    root
}
