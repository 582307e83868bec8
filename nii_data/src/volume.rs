use std::path::Path;
use log::{debug, info};
use nalgebra::Matrix4;
use ndarray::{concatenate, Array2, Array4, ArrayD, ArrayView4, Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use crate::{NiiError, Result, AFFINE_TOLERANCE};

/// 4x4 voxel-to-world transform
pub type Affine = Matrix4<f64>;

/// an image volume (3-D or 4-D) with the header it was read from
#[derive(Debug,Clone)]
pub struct NiiVolume {
    pub data:ArrayD<f64>,
    pub header:NiftiHeader,
}

impl NiiVolume {

    pub fn new(data:ArrayD<f64>,header:NiftiHeader) -> Self {
        Self {
            data,
            header,
        }
    }

    /// reads .nii or .nii.gz (compression is chosen from the file extension)
    pub fn open(path:&Path) -> Result<Self> {
        debug!("reading nifti {:?}",path);
        let obj = ReaderOptions::new().read_file(path)
            .map_err(|source| NiiError::Nifti { path: path.to_owned(), source })?;
        let header = obj.header().clone();
        let data = obj.into_volume().into_ndarray::<f64>()
            .map_err(|source| NiiError::Nifti { path: path.to_owned(), source })?;
        Ok(Self::new(data,header))
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn spatial_shape(&self) -> Result<[usize;3]> {
        let s = self.data.shape();
        if s.len() < 3 || s.len() > 4 {
            return Err(NiiError::Dimensionality { expected: "3-D or 4-D", found: s.len() })
        }
        Ok([s[0],s[1],s[2]])
    }

    /// length of the 4th axis, 1 for a 3-D volume
    pub fn n_frames(&self) -> usize {
        match self.data.ndim() {
            4 => self.data.shape()[3],
            _ => 1
        }
    }

    pub fn affine(&self) -> Affine {
        header_affine(&self.header)
    }

    /// views the data as 4-D, adding a singleton time axis to 3-D volumes
    pub fn as_4d(&self) -> Result<ArrayView4<'_,f64>> {
        match self.data.ndim() {
            3 => Ok(self.data.view().into_dimensionality::<Ix3>()?.insert_axis(Axis(3))),
            4 => Ok(self.data.view().into_dimensionality::<Ix4>()?),
            n => Err(NiiError::Dimensionality { expected: "3-D or 4-D", found: n })
        }
    }

    /// reshapes (x,y,z,t) to (t, x*y*z) with voxels flattened in row-major order
    pub fn to_time_series(&self) -> Result<Array2<f64>> {
        let [nx,ny,nz] = self.spatial_shape()?;
        let nt = self.n_frames();
        // (t,x,y,z) in standard layout is (t, V) with voxels in row-major order
        let time_major = self.as_4d()?.permuted_axes([3,0,1,2]).as_standard_layout().into_owned();
        Ok(time_major.into_shape((nt,nx*ny*nz))?)
    }

    pub fn to_file(&self,path:&Path) -> Result<()> {
        write_nifti(path,&self.data,&self.header)
    }
}

/// writes an array to nifti keeping the spatial metadata of the reference header
pub fn write_nifti(path:&Path,data:&ArrayD<f64>,reference:&NiftiHeader) -> Result<()> {
    debug!("writing nifti {:?} with shape {:?}",path,data.shape());
    WriterOptions::new(path)
        .reference_header(reference)
        .write_nifti(data)
        .map_err(|source| NiiError::Nifti { path: path.to_owned(), source })
}

/// voxel-to-world transform from sform, then qform, then voxel sizes
pub fn header_affine(header:&NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let x = header.srow_x;
        let y = header.srow_y;
        let z = header.srow_z;
        return Matrix4::new(
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        )
    }
    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;
    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b*b + c*c + d*d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dz = dz * qfac;
        return Matrix4::new(
            (a*a + b*b - c*c - d*d)*dx, 2.0*(b*c - a*d)*dy, 2.0*(b*d + a*c)*dz, header.quatern_x as f64,
            2.0*(b*c + a*d)*dx, (a*a + c*c - b*b - d*d)*dy, 2.0*(c*d - a*b)*dz, header.quatern_y as f64,
            2.0*(b*d - a*c)*dx, 2.0*(c*d + a*b)*dy, (a*a + d*d - c*c - b*b)*dz, header.quatern_z as f64,
            0.0, 0.0, 0.0, 1.0,
        )
    }
    Matrix4::new(
        dx, 0.0, 0.0, 0.0,
        0.0, dy, 0.0, 0.0,
        0.0, 0.0, dz, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// writes the affine into the sform of a header
pub fn set_header_affine(header:&mut NiftiHeader,affine:&Affine) {
    let row = |r:usize| [affine[(r,0)] as f32, affine[(r,1)] as f32, affine[(r,2)] as f32, affine[(r,3)] as f32];
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header.sform_code = header.sform_code.max(1);
}

pub fn affines_match(a:&Affine,b:&Affine) -> bool {
    (a - b).iter().all(|v| v.abs() <= AFFINE_TOLERANCE)
}

/// stacks volumes along the time axis. 3-D volumes contribute a single frame.
pub fn concat_volumes(volumes:&[NiiVolume]) -> Result<Array4<f64>> {
    let first = volumes.first().ok_or(NiiError::NoVolumes)?;
    let shape = first.spatial_shape()?;
    let affine = first.affine();
    for vol in volumes {
        let s = vol.spatial_shape()?;
        if s != shape {
            return Err(NiiError::ShapeMismatch { left: shape.to_vec(), right: s.to_vec() })
        }
        if !affines_match(&affine,&vol.affine()) {
            return Err(NiiError::AffineMismatch)
        }
    }
    let views = volumes.iter().map(|v| v.as_4d()).collect::<Result<Vec<_>>>()?;
    let stacked = concatenate(Axis(3),&views)?;
    info!("concatenated {} volumes into shape {:?}",volumes.len(),stacked.shape());
    Ok(stacked)
}

/// convenience for writing a 4-D result with a reference header
pub fn write_4d(path:&Path,data:Array4<f64>,reference:&NiftiHeader) -> Result<()> {
    write_nifti(path,&data.into_dyn(),reference)
}
