use ndarray::Array2;
use crate::{DualRegError, Result};

/// removes the mean of every column and scales it to unit population variance.
/// constant columns are only centred.
pub fn standardize_columns(x:&Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    for mut col in out.columns_mut() {
        let n = col.len() as f64;
        let mean = col.sum() / n;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        let scale = if std < 10.0 * f64::EPSILON { 1.0 } else { std };
        col.mapv_inplace(|v| (v - mean) / scale);
    }
    out
}

/// removes the least-squares line over the sample index from every row
pub fn detrend_rows(x:&Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    let n = x.ncols();
    let k_mean = (n as f64 - 1.0) / 2.0;
    let k_ss:f64 = (0..n).map(|k| (k as f64 - k_mean).powi(2)).sum();
    for mut row in out.rows_mut() {
        let y_mean = row.sum() / n as f64;
        let slope = if k_ss > 0.0 {
            row.iter().enumerate().map(|(k,y)| (k as f64 - k_mean) * (y - y_mean)).sum::<f64>() / k_ss
        } else {
            0.0
        };
        row.iter_mut().enumerate().for_each(|(k,y)| *y -= y_mean + slope * (k as f64 - k_mean));
    }
    out
}

/// demeans every column and scales it to unit L2 norm (sample std times sqrt(n-1)).
/// zero variance columns become zeros.
pub fn normalise_columns(x:&Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    let n = x.nrows();
    for mut col in out.columns_mut() {
        let mean = col.sum() / n as f64;
        col.mapv_inplace(|v| v - mean);
        let norm = col.iter().map(|v| v * v).sum::<f64>().sqrt();
        if n < 2 || !(norm > 0.0) {
            col.fill(0.0);
        } else {
            col.mapv_inplace(|v| v / norm);
        }
    }
    out
}

/// (t, voxels) to standardised, detrended (voxels, t)
pub fn prepare_time_series(ts:&Array2<f64>) -> Result<Array2<f64>> {
    if ts.is_empty() {
        return Err(DualRegError::Empty)
    }
    let voxels_by_time = ts.t().to_owned();
    Ok(detrend_rows(&standardize_columns(&voxels_by_time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a:&Array2<f64>,b:&Array2<f64>) {
        assert_eq!(a.dim(),b.dim());
        a.iter().zip(b.iter()).for_each(|(x,y)| assert!((x-y).abs() < 1e-9,"{} != {}",x,y));
    }

    #[test]
    fn standardize_uses_population_std() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let s = (2.0f64/3.0).sqrt();
        assert_close(&standardize_columns(&x),&array![[-1.0/s, 0.0], [0.0, 0.0], [1.0/s, 0.0]]);
    }

    #[test]
    fn detrend_removes_lines() {
        let x = array![[1.0, 3.0, 5.0, 7.0], [2.0, 2.0, 2.0, 2.0]];
        assert_close(&detrend_rows(&x),&Array2::zeros((2,4)));
        let y = array![[1.0, 0.0, 1.0]];
        assert_close(&detrend_rows(&y),&array![[1.0/3.0, -2.0/3.0, 1.0/3.0]]);
    }

    #[test]
    fn normalise_gives_unit_norm() {
        let x = array![[1.0, 4.0], [2.0, 4.0], [3.0, 4.0]];
        let h = 0.5f64.sqrt();
        assert_close(&normalise_columns(&x),&array![[-h, 0.0], [0.0, 0.0], [h, 0.0]]);
    }

    #[test]
    fn prepared_series_is_voxels_by_time() {
        let a = array![[1.0, 2.0, 0.0], [3.0, 1.0, 0.5], [2.0, 2.0, 4.0], [0.0, 5.0, 1.0]];
        let p = prepare_time_series(&a).unwrap();
        assert_eq!(p.dim(),(3,4));
        // after detrending every voxel's series has zero mean
        p.rows().into_iter().for_each(|r| assert!(r.sum().abs() < 1e-9));
        assert!(matches!(prepare_time_series(&Array2::zeros((0,3))),Err(DualRegError::Empty)));
    }
}
