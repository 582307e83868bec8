use nalgebra::{DMatrix, SVD};
use ndarray::Array2;
use crate::{DualRegError, Result};

/// relative cutoff for small singular values
pub const PINV_RCOND:f64 = 1e-15;

pub(crate) fn to_dmatrix(a:&Array2<f64>) -> DMatrix<f64> {
    let (r,c) = a.dim();
    DMatrix::from_row_iterator(r,c,a.iter().cloned())
}

pub(crate) fn from_dmatrix(m:&DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(),m.ncols()),|(i,j)| m[(i,j)])
}

fn check_non_empty(a:&Array2<f64>) -> Result<()> {
    if a.is_empty() {
        return Err(DualRegError::Empty)
    }
    Ok(())
}

/// Moore-Penrose pseudo-inverse. Singular values below `PINV_RCOND` times the largest one
/// are treated as zero.
pub fn pinv(a:&Array2<f64>) -> Result<Array2<f64>> {
    check_non_empty(a)?;
    let svd = SVD::new(to_dmatrix(a),true,true);
    let max_sv = svd.singular_values.iter().cloned().fold(0.0,f64::max);
    let inv = svd.pseudo_inverse(PINV_RCOND*max_sv).map_err(DualRegError::Svd)?;
    Ok(from_dmatrix(&inv))
}

/// numerical rank, counting singular values above max(sv) * max(rows, cols) * eps
pub fn matrix_rank(a:&Array2<f64>) -> Result<usize> {
    check_non_empty(a)?;
    let (r,c) = a.dim();
    let sv = SVD::new(to_dmatrix(a),false,false).singular_values;
    let max_sv = sv.iter().cloned().fold(0.0,f64::max);
    let tol = max_sv * r.max(c) as f64 * f64::EPSILON;
    Ok(sv.iter().filter(|&&s| s > tol).count())
}

/// a · b with a shape check
pub fn matmul(a:&Array2<f64>,b:&Array2<f64>) -> Result<Array2<f64>> {
    if a.ncols() != b.nrows() {
        return Err(DualRegError::ShapeMismatch { what: "matrix product", left: a.dim(), right: b.dim() })
    }
    Ok(a.dot(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a:&Array2<f64>,b:&Array2<f64>,tol:f64) {
        assert_eq!(a.dim(),b.dim());
        a.iter().zip(b.iter()).for_each(|(x,y)| assert!((x-y).abs() < tol,"{} != {}",x,y));
    }

    #[test]
    fn pinv_of_tall_diagonal() {
        let a = array![[1.0, 0.0], [0.0, 2.0], [0.0, 0.0]];
        let expected = array![[1.0, 0.0, 0.0], [0.0, 0.5, 0.0]];
        assert_close(&pinv(&a).unwrap(),&expected,1e-12);
    }

    #[test]
    fn pinv_of_rank_deficient() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        assert_close(&pinv(&a).unwrap(),&array![[0.25, 0.25], [0.25, 0.25]],1e-12);
        assert_eq!(matrix_rank(&a).unwrap(),1);
    }

    #[test]
    fn pinv_of_wide_matrix_is_right_inverse() {
        let a = array![[1.0, 2.0, 3.0], [0.0, 1.0, 4.0]];
        let p = pinv(&a).unwrap();
        assert_eq!(p.dim(),(3,2));
        assert_close(&a.dot(&p),&Array2::eye(2),1e-10);
    }

    #[test]
    fn empty_and_mismatched_inputs() {
        assert!(matches!(pinv(&Array2::<f64>::zeros((0,3))),Err(DualRegError::Empty)));
        let a = Array2::<f64>::zeros((2,3));
        assert!(matches!(matmul(&a,&a),Err(DualRegError::ShapeMismatch{..})));
    }
}
