use std::path::Path;
use ndarray::Array2;
use crate::{NiiError, Result};

pub fn write_npy(path:&Path,array:&Array2<f64>) -> Result<()> {
    ndarray_npy::write_npy(path,array).map_err(|source| NiiError::WriteNpy { path: path.to_owned(), source })
}

pub fn read_npy(path:&Path) -> Result<Array2<f64>> {
    ndarray_npy::read_npy(path).map_err(|source| NiiError::ReadNpy { path: path.to_owned(), source })
}
