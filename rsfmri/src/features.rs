use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use log::{error, info, warn};
use ndarray::Array2;
use dual_reg::extract_connectivity;
use nii_data::{apply_mask, read_npy, write_npy, NiiVolume};
use utils::{subject_prefix, FailureLog};
use crate::masking::{group_ica_output_dir, mask_file_name, MASKED_GROUP_IC_FILE};
use crate::metadata::{parse_subject_file, GestationalAges};
use crate::settings::{FeatureSettings, MaskSettings, ProjectSettings, WholeVolumeSettings};
use crate::{Result, RsfmriError};

/// turns one subject image into a (components, voxels) connectivity matrix
pub trait FeatureExtractor {
    /// file name of the .npy written for a subject file
    fn output_name(&self,file_name:&str) -> Result<String>;
    fn extract(&self,image:&NiiVolume,file_name:&str) -> Result<Array2<f64>>;
    /// non-fatal problems found while loading
    fn warnings(&self) -> &[String] {
        &[]
    }
}

/// picks the mask and group maps matching each subject's gestational age
pub struct AgeMatchedExtractor {
    ages:GestationalAges,
    masks:BTreeMap<u32,NiiVolume>,
    group_maps:BTreeMap<u32,Array2<f64>>,
    suffix:String,
    warnings:Vec<String>,
}

impl AgeMatchedExtractor {

    pub fn load(masks:&MaskSettings,features:&FeatureSettings) -> Result<Self> {
        let ages = GestationalAges::from_tsv(&features.metadata_tsv)?;
        let mut warnings = vec![];

        info!("Loading masks...");
        let mut mask_vols = BTreeMap::new();
        for ga in masks.ga_range() {
            match NiiVolume::open(&masks.out_mask_dir.join(mask_file_name(ga))) {
                Ok(m) => {
                    info!("Shape of mask {}: {:?}",ga,m.shape());
                    mask_vols.insert(ga,m);
                }
                Err(e) => {
                    let msg = format!("Could not load mask for age {}: {}",ga,e);
                    warn!("{}",msg);
                    warnings.push(msg);
                }
            }
        }
        if mask_vols.is_empty() {
            return Err(RsfmriError::NothingLoaded("masks"))
        }
        info!("Successfully loaded masks for the following gestational ages: {:?}",mask_vols.keys().collect::<Vec<_>>());

        info!("Loading group ICA...");
        let mut group_maps = BTreeMap::new();
        for ga in masks.ga_range() {
            let f = group_ica_output_dir(&masks.group_ica_dir,ga).join(MASKED_GROUP_IC_FILE);
            match read_npy(&f) {
                Ok(g) => {
                    info!("Shape of group ICA for gestational age {}: {:?}",ga,g.dim());
                    group_maps.insert(ga,g);
                }
                Err(e) => {
                    let msg = format!("Could not load group ICA map for age {}: {}",ga,e);
                    warn!("{}",msg);
                    warnings.push(msg);
                }
            }
        }
        if group_maps.is_empty() {
            return Err(RsfmriError::NothingLoaded("group ICA maps"))
        }
        info!("Successfully loaded group ICA maps for the following gestational ages: {:?}",group_maps.keys().collect::<Vec<_>>());

        Ok(Self {
            ages,
            masks:mask_vols,
            group_maps,
            suffix:features.output_suffix.clone(),
            warnings,
        })
    }
}

impl FeatureExtractor for AgeMatchedExtractor {

    fn output_name(&self,file_name:&str) -> Result<String> {
        let (subject,session) = parse_subject_file(file_name)?;
        Ok(format!("{}_ses-{}_{}.npy",subject,session,self.suffix))
    }

    fn extract(&self,image:&NiiVolume,file_name:&str) -> Result<Array2<f64>> {
        let (subject,session) = parse_subject_file(file_name)?;
        let ga = self.ages.lookup(&subject,session)?;
        info!("\tUsing files for gestational age {}...",ga);
        let mask = self.masks.get(&ga).ok_or(RsfmriError::NoDataForAge(ga))?;
        let group = self.group_maps.get(&ga).ok_or(RsfmriError::NoDataForAge(ga))?;

        // masks from create-masks are already on the subject grid, a mismatch fails the subject
        info!("\tApplying mask {:?} to image {:?}...",mask.shape(),image.shape());
        let ts = apply_mask(image,mask)?;
        info!("\tShape of masked image: {:?}",ts.dim());
        info!("\tExtracting features...");
        Ok(extract_connectivity(&ts,group)?)
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// uses a single unmasked group ICA volume, every voxel of the image is a feature
pub struct WholeVolumeExtractor {
    group:Array2<f64>,
    suffix:String,
}

impl WholeVolumeExtractor {

    pub fn load(settings:&WholeVolumeSettings) -> Result<Self> {
        info!("Loading group ICA...");
        let vol = NiiVolume::open(&settings.group_ica_file)?;
        info!("Reshaping group ICA with dimensions {:?}...",vol.shape());
        // (x,y,z,c) -> (c, x*y*z)
        let group = vol.to_time_series()?;
        info!("Successfully reshaped group ICA: {:?}",group.dim());
        Ok(Self::new(group,&settings.output_suffix))
    }

    pub fn new(group:Array2<f64>,suffix:&str) -> Self {
        Self {
            group,
            suffix:suffix.to_string(),
        }
    }
}

impl FeatureExtractor for WholeVolumeExtractor {

    fn output_name(&self,file_name:&str) -> Result<String> {
        Ok(format!("{}_{}.npy",subject_prefix(file_name),self.suffix))
    }

    fn extract(&self,image:&NiiVolume,_file_name:&str) -> Result<Array2<f64>> {
        let ts = image.to_time_series()?;
        info!("\tReshaped data successfully from {:?} to {:?}!",image.shape(),ts.dim());
        info!("\tExtracting features...");
        Ok(extract_connectivity(&ts,&self.group)?)
    }
}

/// where subject images come from and where features go
#[derive(Debug,Clone)]
pub struct ExtractionJob {
    pub rs_data_dir:PathBuf,
    pub out_dir:PathBuf,
    pub failure_log:PathBuf,
    pub start_idx:usize,
}

impl ExtractionJob {
    pub fn age_matched(settings:&FeatureSettings,start_idx:usize) -> Self {
        Self {
            rs_data_dir: settings.rs_data_dir.clone(),
            out_dir: settings.out_dir.clone(),
            failure_log: settings.failure_log.clone(),
            start_idx,
        }
    }

    pub fn whole_volume(settings:&WholeVolumeSettings,failure_log:&Path,start_idx:usize) -> Self {
        Self {
            rs_data_dir: settings.rs_data_dir.clone(),
            out_dir: settings.out_dir.clone(),
            failure_log: failure_log.to_owned(),
            start_idx,
        }
    }
}

#[derive(Debug,Default,Clone)]
pub struct ExtractionReport {
    pub processed:Vec<PathBuf>,
    pub skipped:Vec<String>,
    pub failed:Vec<(String,String)>,
    pub warnings:Vec<String>,
}

impl ExtractionReport {
    pub fn log_summary(&self) {
        info!("{} written, {} already present, {} failed",self.processed.len(),self.skipped.len(),self.failed.len());
        if !self.warnings.is_empty() {
            warn!("{} WARNING {}","-".repeat(30),"-".repeat(30));
            for w in &self.warnings {
                warn!("{}",w);
            }
        }
    }
}

enum Outcome {
    Written(PathBuf),
    Exists,
}

fn process_subject<E:FeatureExtractor>(extractor:&E,job:&ExtractionJob,file_name:&str) -> Result<Outcome> {
    let output = job.out_dir.join(extractor.output_name(file_name)?);
    if output.exists() {
        return Ok(Outcome::Exists)
    }
    info!("\tLoading image...");
    let image = NiiVolume::open(&job.rs_data_dir.join(file_name))?;
    let features = extractor.extract(&image,file_name)?;
    info!("\tSaving features...");
    write_npy(&output,&features)?;
    info!("\tSuccess! Features saved to {:?}",output);
    Ok(Outcome::Written(output))
}

/// runs the extractor over the sorted entries of the data directory, starting at `start_idx`.
/// A subject that fails is logged and recorded in the failure log.
pub fn run_extraction<E:FeatureExtractor>(extractor:&E,job:&ExtractionJob) -> Result<ExtractionReport> {
    let mut subjects = utils::list_dir_names(&job.rs_data_dir)?;
    subjects.sort();
    let failure_log = FailureLog::new(&job.failure_log);
    let total = subjects.len();
    let mut report = ExtractionReport::default();

    for (i,sub) in subjects.iter().skip(job.start_idx).enumerate() {
        info!("subject {}/{}: {}",i+1,total,subject_prefix(sub));
        let start = Instant::now();
        match process_subject(extractor,job,sub) {
            Ok(Outcome::Written(p)) => report.processed.push(p),
            Ok(Outcome::Exists) => {
                info!("\tFile already exists!");
                report.skipped.push(sub.clone());
            }
            Err(e) => {
                error!("\tHaving problems in file {}...",sub);
                error!("\tFollowing error occured: {}",e);
                if let Err(log_err) = failure_log.append(sub) {
                    error!("\tcould not record failure: {}",log_err);
                }
                report.failed.push((sub.clone(),e.to_string()));
            }
        }
        info!("\tTime taken to process {}: {:.3?}",subject_prefix(sub),start.elapsed());
    }
    report.warnings = extractor.warnings().to_vec();
    Ok(report)
}

pub fn extract_age_matched(settings:&ProjectSettings,start_idx:usize,assume_yes:bool) -> Result<ExtractionReport> {
    utils::ensure_dir(&settings.features.out_dir,assume_yes)?;
    let extractor = AgeMatchedExtractor::load(&settings.masks,&settings.features)?;
    run_extraction(&extractor,&ExtractionJob::age_matched(&settings.features,start_idx))
}

pub fn extract_whole_volume(settings:&ProjectSettings,start_idx:usize,assume_yes:bool) -> Result<ExtractionReport> {
    utils::ensure_dir(&settings.whole_volume.out_dir,assume_yes)?;
    info!("Data will always be reshaped from (x,y,z,c) to (c, x*y*z)! Make sure that c are the number of independent components...");
    let extractor = WholeVolumeExtractor::load(&settings.whole_volume)?;
    let job = ExtractionJob::whole_volume(&settings.whole_volume,&settings.features.failure_log,start_idx);
    run_extraction(&extractor,&job)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::settings::Config;
    use ndarray::{Array3, Array4, ArrayD};
    use nii_data::{NiftiHeader, NiiError};

    pub fn test_header(voxel_size:f32) -> NiftiHeader {
        let mut h = NiftiHeader::default();
        h.pixdim = [1.0, voxel_size, voxel_size, voxel_size, 1.0, 1.0, 1.0, 1.0];
        h.scl_slope = 1.0;
        h.sform_code = 1;
        h.srow_x = [voxel_size, 0.0, 0.0, 0.0];
        h.srow_y = [0.0, voxel_size, 0.0, 0.0];
        h.srow_z = [0.0, 0.0, voxel_size, 0.0];
        h
    }

    pub fn write_volume(path:&Path,data:ArrayD<f64>,voxel_size:f32) {
        NiiVolume::new(data,test_header(voxel_size)).to_file(path).unwrap();
    }

    fn bold(nt:usize,seed:f64) -> Array4<f64> {
        Array4::from_shape_fn((4,4,4,nt),|(x,y,z,t)| {
            let v = (x + 4*y + 16*z) as f64;
            (v * 1.37 + t as f64 * (0.5 + 0.01*v) + seed).sin() + 0.1*t as f64
        })
    }

    fn mask() -> Array3<f64> {
        Array3::from_shape_fn((4,4,4),|(x,y,z)| if x > 0 && y > 0 && z < 2 { 1.0 } else { 0.0 })
    }

    struct Fixture {
        _dir:tempfile::TempDir,
        settings:ProjectSettings,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut settings = <ProjectSettings as Config>::default();
        settings.masks.out_mask_dir = root.join("ica_masks");
        settings.masks.group_ica_dir = root.join("group");
        settings.features.rs_data_dir = root.join("rs_data");
        settings.features.out_dir = root.join("features");
        settings.features.metadata_tsv = root.join("ga.tsv");
        settings.features.failure_log = root.join("corrupted_files.txt");
        settings.whole_volume.group_ica_file = root.join("melodic_IC.nii.gz");
        settings.whole_volume.rs_data_dir = root.join("rs_data");
        settings.whole_volume.out_dir = root.join("whole");
        std::fs::create_dir_all(&settings.masks.out_mask_dir).unwrap();
        std::fs::create_dir_all(&settings.features.rs_data_dir).unwrap();
        std::fs::create_dir_all(&settings.features.out_dir).unwrap();

        // 18 mask voxels, more than the 8 time points
        write_volume(&settings.masks.out_mask_dir.join(mask_file_name(40)),mask().into_dyn(),1.0);
        let out = group_ica_output_dir(&settings.masks.group_ica_dir,40);
        std::fs::create_dir_all(&out).unwrap();
        let group = Array2::from_shape_fn((2,18),|(c,v)| ((c*18 + v) as f64 * 0.77).cos());
        write_npy(&out.join(MASKED_GROUP_IC_FILE),&group).unwrap();
        let whole = Array4::from_shape_fn((4,4,4,3),|(x,y,z,c)| ((x + 4*y + 16*z) as f64 * (0.3 + c as f64)).sin());
        write_volume(&settings.whole_volume.group_ica_file,whole.into_dyn(),1.0);

        std::fs::write(&settings.features.metadata_tsv,"ses\tid\tga\n1\tsub-CC00001XX01\t40.6\n2\tsub-CC00002XX02\t40.1\n3\tsub-CC00003XX03\t41.2\n").unwrap();
        let rs = &settings.features.rs_data_dir;
        write_volume(&rs.join("sub-CC00001XX01_ses-1_bold.nii.gz"),bold(8,0.0).into_dyn(),1.0);
        write_volume(&rs.join("sub-CC00002XX02_ses-2_bold.nii.gz"),bold(8,1.0).into_dyn(),1.0);
        // no mask for GA 41
        write_volume(&rs.join("sub-CC00003XX03_ses-3_bold.nii.gz"),bold(8,2.0).into_dyn(),1.0);
        std::fs::write(rs.join("sub-CC00004XX04_ses-4_bold.nii.gz"),b"not a nifti").unwrap();
        Fixture { _dir: dir, settings }
    }

    #[test]
    fn output_names() {
        let age = AgeMatchedExtractor {
            ages: GestationalAges::default(),
            masks: BTreeMap::new(),
            group_maps: BTreeMap::new(),
            suffix: "features_7_comps".to_string(),
            warnings: vec![],
        };
        assert_eq!(age.output_name("sub-CC00001XX01_ses-12_bold.nii.gz").unwrap(),"sub-CC00001XX01_ses-12_features_7_comps.npy");
        assert!(age.output_name("bad.nii.gz").is_err());
        let whole = WholeVolumeExtractor::new(Array2::zeros((1,1)),"features_42_comps");
        assert_eq!(whole.output_name("sub-CC00001XX01_ses-12_bold.nii.gz").unwrap(),"sub-CC00001XX01_features_42_comps.npy");
    }

    #[test]
    fn age_matched_extraction_logs_failures_and_skips_existing() {
        let f = fixture();
        let s = &f.settings;
        let extractor = AgeMatchedExtractor::load(&s.masks,&s.features).unwrap();
        // ages 36..=44 without ga 40 could not be loaded
        assert_eq!(extractor.warnings().len(),16);

        let job = ExtractionJob::age_matched(&s.features,0);
        let report = run_extraction(&extractor,&job).unwrap();
        assert_eq!(report.processed.len(),2);
        assert_eq!(report.failed.len(),2);
        assert_eq!(report.warnings.len(),16);

        let features = read_npy(&s.features.out_dir.join("sub-CC00001XX01_ses-1_features_7_comps.npy")).unwrap();
        assert_eq!(features.dim(),(2,18));
        assert!(features.iter().all(|v| v.is_finite() && v.abs() <= 1.0 + 1e-9));

        let failures = FailureLog::new(&s.features.failure_log).entries().unwrap();
        assert_eq!(failures,vec!["sub-CC00003XX03_ses-3_bold.nii.gz".to_string(),"sub-CC00004XX04_ses-4_bold.nii.gz".to_string()]);

        let again = run_extraction(&extractor,&job).unwrap();
        assert_eq!(again.processed.len(),0);
        assert_eq!(again.skipped.len(),2);
    }

    #[test]
    fn start_index_skips_leading_subjects() {
        let f = fixture();
        let s = &f.settings;
        let extractor = AgeMatchedExtractor::load(&s.masks,&s.features).unwrap();
        let report = run_extraction(&extractor,&ExtractionJob::age_matched(&s.features,1)).unwrap();
        assert_eq!(report.processed,vec![s.features.out_dir.join("sub-CC00002XX02_ses-2_features_7_comps.npy")]);
    }

    #[test]
    fn mask_is_applied_on_the_subject_grid() {
        let f = fixture();
        let s = &f.settings;
        let extractor = AgeMatchedExtractor::load(&s.masks,&s.features).unwrap();
        let name = "sub-CC00001XX01_ses-1_bold.nii.gz";

        let coarse = NiiVolume::new(bold(8,0.0).into_dyn(),test_header(2.0));
        assert!(matches!(extractor.extract(&coarse,name),Err(RsfmriError::Nii(NiiError::AffineMismatch))));
        let cropped = NiiVolume::new(Array4::<f64>::zeros((3,4,4,8)).into_dyn(),test_header(1.0));
        assert!(matches!(extractor.extract(&cropped,name),Err(RsfmriError::Nii(NiiError::ShapeMismatch{..}))));

        let matching = NiiVolume::new(bold(8,0.0).into_dyn(),test_header(1.0));
        assert_eq!(extractor.extract(&matching,name).unwrap().dim(),(2,18));
    }

    #[test]
    fn whole_volume_extraction() {
        let f = fixture();
        let report = extract_whole_volume(&f.settings,0,true).unwrap();
        assert_eq!(report.processed.len(),3);
        assert_eq!(report.failed.len(),1);
        let features = read_npy(&f.settings.whole_volume.out_dir.join("sub-CC00002XX02_features_42_comps.npy")).unwrap();
        assert_eq!(features.dim(),(3,64));
    }

    #[test]
    fn nothing_loaded_is_fatal() {
        let f = fixture();
        let mut masks = f.settings.masks.clone();
        masks.out_mask_dir = masks.out_mask_dir.join("empty");
        assert!(matches!(AgeMatchedExtractor::load(&masks,&f.settings.features),Err(RsfmriError::NothingLoaded("masks"))));
    }
}
