use log::debug;
use ndarray::{Array1, Array2, Axis};
use crate::linalg::{matmul, matrix_rank, pinv};
use crate::preprocess::{normalise_columns, prepare_time_series};
use crate::{DualRegError, Result};

/// transposes a matrix that has fewer rows than columns
pub fn orient_tall(m:&Array2<f64>) -> Array2<f64> {
    if m.nrows() < m.ncols() {
        m.t().to_owned()
    } else {
        m.clone()
    }
}

/// t-statistics of an ordinary least squares fit of `y` on the regressors `x`.
///
/// `x` is (samples, regressors) and `y` is (samples, targets). The result is
/// (regressors, targets). Entries that are not finite are set to 0.
pub fn fsl_glm(x:&Array2<f64>,y:&Array2<f64>) -> Result<Array2<f64>> {
    if x.nrows() != y.nrows() {
        return Err(DualRegError::ShapeMismatch { what: "regressors and data must share samples", left: x.dim(), right: y.dim() })
    }
    let beta = matmul(&pinv(x)?,y)?;
    let residuals = y - &x.dot(&beta);
    let dof = x.nrows() as f64 - matrix_rank(x)? as f64;
    let sigma_sq:Array1<f64> = residuals.mapv(|r| r * r).sum_axis(Axis(0)) / dof;
    let xtx_inv = pinv(&x.t().dot(x))?;
    let grot = xtx_inv.diag().to_owned();

    let mut t = beta;
    for ((c,v),b) in t.indexed_iter_mut() {
        let val = *b / (grot[c] * sigma_sq[v]).sqrt();
        *b = if val.is_finite() { val } else { 0.0 };
    }
    Ok(t)
}

/// subject specific spatial maps (voxels, components) from group components.
/// both inputs are oriented so voxels run along rows.
pub fn dual_regression(data:&Array2<f64>,group_components:&Array2<f64>) -> Result<Array2<f64>> {
    let data = orient_tall(data);
    let group = orient_tall(group_components);
    if data.nrows() != group.nrows() {
        return Err(DualRegError::ShapeMismatch { what: "data and group components must share voxels", left: data.dim(), right: group.dim() })
    }
    // (components, t)
    let ts = matmul(&pinv(&group)?,&data)?;
    let maps = fsl_glm(&ts.t().to_owned(),&data.t().to_owned())?;
    Ok(maps.t().to_owned())
}

/// correlation of every voxel with the weighted seed time courses. `seeds` is
/// (voxels, components), `data` is (voxels, t) and the result is (voxels, components).
pub fn weighted_seed2voxel(seeds:&Array2<f64>,data:&Array2<f64>) -> Result<Array2<f64>> {
    if seeds.nrows() != data.nrows() {
        return Err(DualRegError::ShapeMismatch { what: "seeds and data must share voxels", left: seeds.dim(), right: data.dim() })
    }
    let ts = matmul(&pinv(seeds)?,data)?;
    let ts_n = normalise_columns(&ts.t().to_owned()).t().to_owned();
    let d_n = normalise_columns(&data.t().to_owned()).t().to_owned();
    let features = matmul(&ts_n,&d_n.t().to_owned())?;
    Ok(features.t().to_owned())
}

/// full feature extraction for one subject: `time_series` is (t, voxels) as read from the
/// masked image. Returns the (components, voxels) connectivity matrix.
pub fn extract_connectivity(time_series:&Array2<f64>,group_components:&Array2<f64>) -> Result<Array2<f64>> {
    let data = prepare_time_series(time_series)?;
    let maps = dual_regression(&data,group_components)?;
    let features = weighted_seed2voxel(&maps,&data)?;
    debug!("connectivity features {:?}",features.dim());
    Ok(features.t().to_owned())
}
