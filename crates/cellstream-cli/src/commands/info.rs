use std::path::PathBuf;

use anyhow::{Context, Result};
use cellstream_core::io::npy::read_header;
use cellstream_core::io::source::{ChannelSource, NpyDirSource};
use clap::Args;

#[derive(Args)]
pub struct InfoArgs {
    /// Input directory of `fov_NNN_chC.npy` stacks, or a single npy file
    pub path: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    if args.path.is_dir() {
        let source = NpyDirSource::open(&args.path)
            .with_context(|| format!("Failed to open input directory {}", args.path.display()))?;
        let meta = source.metadata();
        let raw_mb = (meta.shape().len() * std::mem::size_of::<u16>() * meta.n_fovs * meta.n_channels)
            as f64
            / (1024.0 * 1024.0);

        println!("Directory:   {}", args.path.display());
        println!("FOVs:        {}", meta.n_fovs);
        println!("Channels:    {}", meta.n_channels);
        println!("Frames:      {}", meta.n_frames);
        println!("Dimensions:  {}x{}", meta.width, meta.height);
        println!("Data size:   {:.1} MB", raw_mb);
        return Ok(());
    }

    let header = read_header(&args.path)
        .with_context(|| format!("Failed to read npy header of {}", args.path.display()))?;
    println!("File:        {}", args.path.display());
    println!("Dtype:       {}", header.descr);
    println!("Shape:       {:?}", header.shape);
    if let Ok(shape) = header.stack_shape() {
        println!("Frames:      {}", shape.frames);
        println!("Dimensions:  {}x{}", shape.width, shape.height);
    }
    let file_mb = std::fs::metadata(&args.path)?.len() as f64 / (1024.0 * 1024.0);
    println!("File size:   {:.1} MB", file_mb);

    Ok(())
}
