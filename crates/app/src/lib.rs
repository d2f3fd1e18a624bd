use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array3;
use serde::Serialize;
use sliceview_cache::StackConfig;
use sliceview_core::{PrerenderSession, SliceImage, SlicePlane, Volume};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(name = "sliceview")]
#[command(about = "Sliceview CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable volume metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Pre-render every slice of a volume and export the stack as PNGs.
    Prerender {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value = "axial")]
        plane: SlicePlane,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        #[arg(long, default_value_t = 256)]
        width: u32,
        #[arg(long, default_value_t = 256)]
        height: u32,
    },
    /// Run the prerender pipeline over a built-in synthetic volume.
    Demo {
        #[arg(long, default_value_t = 32)]
        size: usize,
        #[arg(long, default_value = "axial")]
        plane: SlicePlane,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        #[arg(long, default_value_t = 256)]
        width: u32,
        #[arg(long, default_value_t = 256)]
        height: u32,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    name: String,
    shape: [usize; 3],
    voxel_size: [f64; 3],
    intensity_range: [f32; 2],
    bounds: BoundsOutput,
}

#[derive(Debug, Serialize)]
struct BoundsOutput {
    lo: [f64; 3],
    hi: [f64; 3],
}

#[derive(Debug, Serialize)]
struct PrerenderReport {
    volume: String,
    plane: String,
    slot_count: usize,
    refreshes: u64,
    sync_refreshes: u64,
    ticks: u64,
    elapsed_ms: u64,
    slices_written: usize,
    out_dir: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Prerender { file, plane, out, width, height } => {
            let volume = open_volume(&file)?;
            run_prerender(volume, plane, &out, (width, height))
        }
        Commands::Demo { size, plane, out, width, height } => {
            let volume = synthetic_volume(size)?;
            run_prerender(volume, plane, &out, (width, height))
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    let volume = open_volume(file)?;

    let bounds = volume.bounds();
    let (lo, hi) = volume.intensity_range();
    let payload = InfoOutput {
        path: file.display().to_string(),
        name: volume.name().to_string(),
        shape: volume.shape(),
        voxel_size: volume.voxel_size(),
        intensity_range: [lo, hi],
        bounds: BoundsOutput { lo: bounds.lo, hi: bounds.hi },
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_prerender(volume: Volume, plane: SlicePlane, out: &Path, view: (u32, u32)) -> Result<()> {
    let config = StackConfig::from_env().context("invalid stack configuration")?;
    let name = volume.name().to_string();

    let started = Instant::now();
    let mut session = PrerenderSession::new(volume, config, view);
    if plane != SlicePlane::Axial {
        session.set_plane(plane);
    }
    let pumped = session.pump();
    log::debug!("{name}: stack ready after {pumped} idle tasks");

    fs::create_dir_all(out)
        .with_context(|| format!("failed to create output directory {}", out.display()))?;

    let positions = session.slice_positions();
    for (index, zpos) in positions.iter().enumerate() {
        let image = session.render_slice(*zpos);
        let path = out.join(format!("slice-{index:03}.png"));
        save_png(image, &path)?;
    }

    let (stack, queue) = session.stats();
    let report = PrerenderReport {
        volume: name,
        plane: plane.name().to_string(),
        slot_count: stack.slot_count,
        refreshes: stack.refreshes,
        sync_refreshes: stack.sync_refreshes,
        ticks: queue.executed,
        elapsed_ms: started.elapsed().as_millis() as u64,
        slices_written: positions.len(),
        out_dir: out.display().to_string(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");

    Ok(())
}

fn open_volume(file: &Path) -> Result<Volume> {
    ensure_image_exists(file)?;
    Volume::open(file).with_context(|| format!("failed to open image {}", file.display()))
}

/// A solid sphere centred in a cube, fading to zero at its surface.
/// Every slicing plane of it shows a disc whose size varies with depth.
fn synthetic_volume(size: usize) -> Result<Volume> {
    if size == 0 {
        anyhow::bail!("--size must be >= 1");
    }

    let center = (size as f64 - 1.0) / 2.0;
    let radius = size as f64 / 2.0;
    let data = Array3::from_shape_fn((size, size, size), |(i, j, k)| {
        let dx = i as f64 - center;
        let dy = j as f64 - center;
        let dz = k as f64 - center;
        let dist = (dx * dx + dy * dy + dz * dz).sqrt();
        (radius - dist).max(0.0) as f32
    });

    Ok(Volume::from_array("demo", data, [1.0; 3])?)
}

fn save_png(image: SliceImage, path: &Path) -> Result<()> {
    let buffer = image::RgbaImage::from_raw(image.width, image.height, image.pixels)
        .context("rendered slice has inconsistent dimensions")?;
    buffer
        .save(path)
        .with_context(|| format!("failed to write image to {}", path.display()))?;
    Ok(())
}

fn ensure_image_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
