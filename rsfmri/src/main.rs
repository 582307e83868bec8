use std::path::{Path, PathBuf};
use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};
use rsfmri::features::{extract_age_matched, extract_whole_volume};
use rsfmri::settings::{Config, ConfigFile, ProjectSettings};
use rsfmri::{concat, masking, melodic, remote};

#[derive(clap::Parser,Debug)]
pub struct RsfmriArgs {
    /// project settings file (see new-project-template). Defaults are used when omitted
    #[clap(long,global=true)]
    settings:Option<PathBuf>,
    /// create missing output directories without asking
    #[clap(long,short,global=true)]
    yes:bool,
    #[command(subcommand)]
    pub action: RsfmriAction,
}

#[derive(clap::Subcommand,Debug)]
pub enum RsfmriAction {
    /// download subject images from the remote host
    Download(DownloadArgs),
    /// concatenate every .nii.gz in a directory along time
    Concat(ConcatArgs),
    /// run MELODIC group ICA on <input_dir>/all_subjects.nii.gz
    GroupIca(GroupIcaArgs),
    /// resample a mask onto a group ICA map and write the masked map as .npy
    MaskIca(MaskIcaArgs),
    /// build masks and masked group maps for every ga_<GA> directory
    CreateMasks(CreateMasksArgs),
    /// dual regression and connectivity features using age matched masks and group maps
    ExtractFeatures(ExtractFeaturesArgs),
    /// dual regression and connectivity features against one unmasked group ICA volume
    ExtractFeaturesWholeVolume(WholeVolumeArgs),
    /// create a new project template to modify for a new cohort
    NewProjectTemplate(TemplateConfigArgs),
}

#[derive(Clone,clap::Args,Debug)]
pub struct DownloadArgs {
    #[clap(long)]
    ssh_alias:Option<String>,
    #[clap(long)]
    subject_ids_file:Option<PathBuf>,
    #[clap(long)]
    remote_folder:Option<PathBuf>,
    #[clap(long)]
    local_folder:Option<PathBuf>,
}

#[derive(Clone,clap::Args,Debug)]
pub struct ConcatArgs {
    directory:PathBuf,
}

#[derive(Clone,clap::Args,Debug)]
pub struct GroupIcaArgs {
    input_dir:PathBuf,
    /// number of independent components
    num_components:usize,
    /// repetition time in seconds
    #[clap(long)]
    tr:Option<f32>,
}

#[derive(Clone,clap::Args,Debug)]
pub struct MaskIcaArgs {
    /// group ICA map created by MELODIC
    #[clap(long,default_value = "output/melodic_IC.nii.gz")]
    input:PathBuf,
    #[clap(long,default_value = "mask.nii.gz")]
    mask:PathBuf,
    /// masked group ICA map (.npy)
    #[clap(long,default_value = "dHCP_groupICA_masked.npy")]
    output:PathBuf,
}

#[derive(Clone,clap::Args,Debug)]
pub struct CreateMasksArgs {
    #[clap(long = "groupICA_dir")]
    group_ica_dir:Option<PathBuf>,
    #[clap(long = "out_maskdir")]
    out_maskdir:Option<PathBuf>,
    #[clap(long)]
    maskdir:Option<PathBuf>,
}

#[derive(Clone,clap::Args,Debug)]
pub struct ExtractFeaturesArgs {
    #[clap(long = "groupICA_dir")]
    group_ica_dir:Option<PathBuf>,
    #[clap(long)]
    outdir:Option<PathBuf>,
    #[clap(long = "start_idx",default_value_t = 0)]
    start_idx:usize,
    /// masks produced by create-masks
    #[clap(long)]
    maskdir:Option<PathBuf>,
    /// tsv file with the subjects' gestational ages
    #[clap(long)]
    metadata:Option<PathBuf>,
    #[clap(long = "rs_data_dir")]
    rs_data_dir:Option<PathBuf>,
    /// name suffix of the output files
    #[clap(long = "rs_output_file")]
    rs_output_file:Option<String>,
}

#[derive(Clone,clap::Args,Debug)]
pub struct WholeVolumeArgs {
    /// group ICA volume with components along the 4th axis
    #[clap(long = "groupICA_file")]
    group_ica_file:Option<PathBuf>,
    #[clap(long)]
    outdir:Option<PathBuf>,
    #[clap(long = "start_idx",default_value_t = 0)]
    start_idx:usize,
    #[clap(long = "rs_data_dir")]
    rs_data_dir:Option<PathBuf>,
    #[clap(long = "rs_output_file")]
    rs_output_file:Option<String>,
}

#[derive(Clone,clap::Args,Debug)]
pub struct TemplateConfigArgs {
    /// path to the new settings file. The extension will be replaced.
    output_config:PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = RsfmriArgs::parse();
    let settings = ProjectSettings::load(args.settings.as_deref())
        .with_context(|| format!("loading settings {:?}",args.settings))?;
    match args.action {
        RsfmriAction::Download(a) => download(settings,a),
        RsfmriAction::Concat(a) => {
            concat::concat_directory(&a.directory).with_context(|| format!("concatenating {:?}",a.directory))?;
            Ok(())
        }
        RsfmriAction::GroupIca(a) => group_ica(settings,a),
        RsfmriAction::MaskIca(a) => {
            masking::mask_group_ica(&a.input,&a.mask,&a.output).with_context(|| format!("masking {:?}",a.input))?;
            Ok(())
        }
        RsfmriAction::CreateMasks(a) => create_masks(settings,a,args.yes),
        RsfmriAction::ExtractFeatures(a) => extract_features(settings,a,args.yes),
        RsfmriAction::ExtractFeaturesWholeVolume(a) => extract_features_whole_volume(settings,a,args.yes),
        RsfmriAction::NewProjectTemplate(a) => new_project_template(&a.output_config),
    }
}

fn new_project_template(output:&Path) -> anyhow::Result<()> {
    let written = <ProjectSettings as Config>::default().to_file(output)?;
    info!("project template written to {:?}",written);
    Ok(())
}

fn download(mut settings:ProjectSettings,args:DownloadArgs) -> anyhow::Result<()> {
    let r = &mut settings.remote;
    if let Some(alias) = args.ssh_alias { r.ssh_alias = alias; }
    if let Some(f) = args.subject_ids_file { r.subject_ids_file = f; }
    if let Some(d) = args.remote_folder { r.remote_image_dir = d; }
    if let Some(d) = args.local_folder { r.local_image_dir = d; }
    let report = remote::download(&settings.remote).context("download failed")?;
    info!("{} downloaded, {} already present, {} without files, {} failed",
        report.downloaded.len(),report.skipped.len(),report.missing.len(),report.failed.len());
    Ok(())
}

fn group_ica(mut settings:ProjectSettings,args:GroupIcaArgs) -> anyhow::Result<()> {
    if let Some(tr) = args.tr { settings.melodic.tr = tr; }
    if args.num_components == 0 {
        bail!("number of components must be positive");
    }
    melodic::run_group_ica(&args.input_dir,args.num_components,&settings.melodic)?;
    Ok(())
}

fn create_masks(mut settings:ProjectSettings,args:CreateMasksArgs,assume_yes:bool) -> anyhow::Result<()> {
    let m = &mut settings.masks;
    if let Some(d) = args.group_ica_dir { m.group_ica_dir = d; }
    if let Some(d) = args.out_maskdir { m.out_mask_dir = d; }
    if let Some(d) = args.maskdir { m.mask_dir = d; }
    let done = masking::create_masks(&settings.masks,assume_yes).context("creating masks")?;
    info!("masks created for gestational ages {:?}",done);
    Ok(())
}

fn extract_features(mut settings:ProjectSettings,args:ExtractFeaturesArgs,assume_yes:bool) -> anyhow::Result<()> {
    if let Some(d) = args.group_ica_dir { settings.masks.group_ica_dir = d; }
    if let Some(d) = args.maskdir { settings.masks.out_mask_dir = d; }
    let f = &mut settings.features;
    if let Some(d) = args.outdir { f.out_dir = d; }
    if let Some(m) = args.metadata { f.metadata_tsv = m; }
    if let Some(d) = args.rs_data_dir { f.rs_data_dir = d; }
    if let Some(s) = args.rs_output_file { f.output_suffix = s; }
    let report = extract_age_matched(&settings,args.start_idx,assume_yes).context("feature extraction failed")?;
    report.log_summary();
    if !report.failed.is_empty() {
        warn!("failed files were appended to {:?}",settings.features.failure_log);
    }
    Ok(())
}

fn extract_features_whole_volume(mut settings:ProjectSettings,args:WholeVolumeArgs,assume_yes:bool) -> anyhow::Result<()> {
    let w = &mut settings.whole_volume;
    if let Some(f) = args.group_ica_file { w.group_ica_file = f; }
    if let Some(d) = args.outdir { w.out_dir = d; }
    if let Some(d) = args.rs_data_dir { w.rs_data_dir = d; }
    if let Some(s) = args.rs_output_file { w.output_suffix = s; }
    let report = extract_whole_volume(&settings,args.start_idx,assume_yes).context("feature extraction failed")?;
    report.log_summary();
    if !report.failed.is_empty() {
        warn!("failed files were appended to {:?}",settings.features.failure_log);
    }
    Ok(())
}
