use log::debug;
use nalgebra::Vector4;
use ndarray::{Array2, Array3, Axis, Ix3, Ix4};
use crate::volume::{affines_match, set_header_affine, Affine, NiiVolume};
use crate::{NiiError, Result};

/// returns the mask as a 3-D array. A 4-D mask with a single frame is accepted.
fn mask_array(mask:&NiiVolume) -> Result<Array3<f64>> {
    match mask.data.ndim() {
        3 => Ok(mask.data.clone().into_dimensionality::<Ix3>()?),
        4 if mask.n_frames() == 1 => {
            let m = mask.data.clone().into_dimensionality::<Ix4>()?;
            Ok(m.index_axis_move(Axis(3),0))
        }
        n => Err(NiiError::Dimensionality { expected: "3-D mask", found: n })
    }
}

/// nearest-neighbour resampling of a volume onto the grid of `target`.
/// voxels that map outside of the source are set to 0.
pub fn resample_nearest(source:&NiiVolume,target:&NiiVolume) -> Result<NiiVolume> {
    let target_shape = target.spatial_shape()?;
    resample_to(source,&target.affine(),target_shape,target)
}

pub fn resample_to(source:&NiiVolume,target_affine:&Affine,target_shape:[usize;3],reference:&NiiVolume) -> Result<NiiVolume> {
    let src = mask_array(source)?;
    let (sx,sy,sz) = src.dim();
    let src_inv = source.affine().try_inverse().ok_or(NiiError::SingularAffine)?;
    let vox_to_vox = src_inv * target_affine;
    debug!("resampling {:?} onto {:?}",src.dim(),target_shape);

    let lookup = |c:f64,n:usize| -> Option<usize> {
        let r = c.round();
        if r < 0.0 || r >= n as f64 { None } else { Some(r as usize) }
    };

    let [nx,ny,nz] = target_shape;
    let resampled = Array3::from_shape_fn((nx,ny,nz),|(i,j,k)| {
        let p = vox_to_vox * Vector4::new(i as f64,j as f64,k as f64,1.0);
        match (lookup(p[0],sx),lookup(p[1],sy),lookup(p[2],sz)) {
            (Some(x),Some(y),Some(z)) => src[[x,y,z]],
            _ => 0.0
        }
    });

    let mut header = reference.header.clone();
    set_header_affine(&mut header,target_affine);
    Ok(NiiVolume::new(resampled.into_dyn(),header))
}

/// row-major indices of the non-zero mask voxels
pub fn mask_indices(mask:&Array3<f64>) -> Vec<[usize;3]> {
    mask.indexed_iter()
        .filter(|(_,v)| **v != 0.0)
        .map(|((x,y,z),_)| [x,y,z])
        .collect()
}

/// extracts the in-mask voxels of every frame, giving a (frames, n_mask_voxels) matrix.
/// the image and mask must share a grid.
pub fn apply_mask(volume:&NiiVolume,mask:&NiiVolume) -> Result<Array2<f64>> {
    let m = mask_array(mask)?;
    let vol_shape = volume.spatial_shape()?;
    let (mx,my,mz) = m.dim();
    if vol_shape != [mx,my,mz] {
        return Err(NiiError::ShapeMismatch { left: vol_shape.to_vec(), right: vec![mx,my,mz] })
    }
    if !affines_match(&volume.affine(),&mask.affine()) {
        return Err(NiiError::AffineMismatch)
    }
    let indices = mask_indices(&m);
    let frames = volume.as_4d()?;
    let nt = frames.dim().3;
    let mut out = Array2::<f64>::zeros((nt,indices.len()));
    for (col,[x,y,z]) in indices.iter().enumerate() {
        for t in 0..nt {
            out[[t,col]] = frames[[*x,*y,*z,t]];
        }
    }
    debug!("masked {:?} to {:?}",volume.shape(),out.dim());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::tests::test_header;
    use ndarray::{Array, Array4, IxDyn};

    fn volume(shape:&[usize],header_vox:f32,offset:[f32;3]) -> NiiVolume {
        let n:usize = shape.iter().product();
        let data = Array::from_shape_vec(IxDyn(shape),(0..n).map(|i| i as f64).collect()).unwrap();
        NiiVolume::new(data,test_header(header_vox,offset))
    }

    #[test]
    fn apply_mask_keeps_nonzero_voxels_in_order() {
        let vol = volume(&[2,2,1,2],1.0,[0.0;3]);
        let mut m = Array3::<f64>::zeros((2,2,1));
        m[[0,1,0]] = 1.0;
        m[[1,1,0]] = 3.0;
        let mask = NiiVolume::new(m.into_dyn(),test_header(1.0,[0.0;3]));

        let masked = apply_mask(&vol,&mask).unwrap();
        assert_eq!(masked.dim(),(2,2));
        assert_eq!(masked[[0,0]],vol.data[[0,1,0,0]]);
        assert_eq!(masked[[0,1]],vol.data[[1,1,0,0]]);
        assert_eq!(masked[[1,1]],vol.data[[1,1,0,1]]);
    }

    #[test]
    fn apply_mask_requires_same_grid() {
        let vol = volume(&[2,2,2,1],1.0,[0.0;3]);
        let small = NiiVolume::new(Array3::<f64>::ones((2,2,1)).into_dyn(),test_header(1.0,[0.0;3]));
        assert!(matches!(apply_mask(&vol,&small),Err(NiiError::ShapeMismatch{..})));
        let moved = NiiVolume::new(Array3::<f64>::ones((2,2,2)).into_dyn(),test_header(1.0,[1.0,0.0,0.0]));
        assert!(matches!(apply_mask(&vol,&moved),Err(NiiError::AffineMismatch)));
    }

    #[test]
    fn resample_identity_grid_is_a_copy() {
        let src = volume(&[3,3,3],1.0,[0.0;3]);
        let out = resample_nearest(&src,&src).unwrap();
        assert_eq!(out.data,src.data);
    }

    #[test]
    fn resample_to_coarser_grid_picks_nearest() {
        // source: 4x4x4 voxels of 1mm, target: 2x2x2 voxels of 2mm on the same origin
        let src = volume(&[4,4,4],1.0,[0.0;3]);
        let target = NiiVolume::new(Array4::<f64>::zeros((2,2,2,5)).into_dyn(),test_header(2.0,[0.0;3]));
        let out = resample_nearest(&src,&target).unwrap();
        assert_eq!(out.shape(),&[2,2,2]);
        // target voxel (1,0,1) sits at world (2,0,2) which is source voxel (2,0,2)
        assert_eq!(out.data[[1,0,1]],src.data[[2,0,2]]);
        assert!(affines_match(&out.affine(),&target.affine()));
    }

    #[test]
    fn resample_outside_source_is_zero() {
        let src = NiiVolume::new(Array3::<f64>::ones((2,2,2)).into_dyn(),test_header(1.0,[0.0;3]));
        let target = NiiVolume::new(Array3::<f64>::zeros((2,2,2)).into_dyn(),test_header(1.0,[1.0,0.0,0.0]));
        let out = resample_nearest(&src,&target).unwrap();
        // target x=0 maps to source x=1, target x=1 maps past the edge
        assert_eq!(out.data[[0,0,0]],1.0);
        assert_eq!(out.data[[1,0,0]],0.0);
    }
}
