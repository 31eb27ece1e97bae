use clap::{Args, Parser, Subcommand};
use dehaze_cli::{
    decode_image, determine_output_path, resolve_parameters, save_image, ParameterOverrides,
    StageWriter,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "dehaze")]
#[command(version, about = "Single-image haze removal (dark channel prior)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ParameterArgs {
    /// Parameter preset file (JSON); defaults are scaled to the image size
    #[arg(long, value_name = "FILE")]
    preset: Option<PathBuf>,

    /// Haze coefficient (> 0)
    #[arg(long, value_name = "FLOAT")]
    beta: Option<f32>,

    /// Dark-channel erosion radius
    #[arg(long, value_name = "N")]
    patch: Option<u32>,

    /// Quadtree minimum window size (> 0)
    #[arg(long, value_name = "N")]
    window: Option<u32>,

    /// Transmission floor, in (0, 1)
    #[arg(long, value_name = "FLOAT")]
    t_min: Option<f32>,

    /// Brightest dark-channel fraction averaged into the airlight, in (0, 1]
    #[arg(long, value_name = "FLOAT")]
    percentile: Option<f32>,

    /// Guided-filter window radius (> 0)
    #[arg(long, value_name = "N")]
    refine: Option<u32>,

    /// Guided-filter regularizer (> 0)
    #[arg(long, value_name = "FLOAT")]
    eps: Option<f32>,
}

impl ParameterArgs {
    fn overrides(&self) -> ParameterOverrides {
        ParameterOverrides {
            beta: self.beta,
            patch_radius: self.patch,
            decomposition_size: self.window,
            t_min: self.t_min,
            percentile: self.percentile,
            refine_radius: self.refine,
            eps: self.eps,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Dehaze a single image
    Run {
        /// Input image file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory (default: next to the input)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        #[command(flatten)]
        params: ParameterArgs,

        /// Use the GPU backend, falling back to the CPU on failure
        #[arg(long)]
        gpu: bool,

        /// Write every intermediate stage into this directory
        #[arg(long, value_name = "DIR")]
        save_stages: Option<PathBuf>,

        /// Enable debug output showing intermediate statistics
        #[arg(long)]
        debug: bool,
    },

    /// Dehaze every image in a directory
    Batch {
        /// Input directory
        #[arg(value_name = "DIR")]
        input_dir: PathBuf,

        /// Output directory (default: <input>/result)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        #[command(flatten)]
        params: ParameterArgs,

        /// Use the GPU backend; batch items run sequentially to share the
        /// one device context
        #[arg(long)]
        gpu: bool,

        /// Number of parallel threads (CPU backend only)
        #[arg(short = 'j', long, value_name = "N")]
        threads: Option<usize>,

        /// Enable debug output
        #[arg(long)]
        debug: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            out,
            params,
            gpu,
            save_stages,
            debug,
        } => cmd_run(input, out, params, gpu, save_stages, debug),

        Commands::Batch {
            input_dir,
            out,
            params,
            gpu,
            threads,
            debug,
        } => cmd_batch(input_dir, out, params, gpu, threads, debug),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(
    input: PathBuf,
    out: Option<PathBuf>,
    params: ParameterArgs,
    gpu: bool,
    save_stages: Option<PathBuf>,
    debug: bool,
) -> Result<(), String> {
    println!("Dehazing {}...", input.display());

    let decoded = decode_image(&input)?;
    println!("  Image: {}x{}", decoded.width, decoded.height);

    let resolved = resolve_parameters(
        params.preset.as_deref(),
        &params.overrides(),
        decoded.width,
        decoded.height,
        debug,
    )?;

    let output_path = determine_output_path(&input, &out)?;
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create output directory: {}", e))?;
        }
    }

    let mut stage_writer = match &save_stages {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create stage directory: {}", e))?;
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            Some(StageWriter::new(dir.clone(), stem))
        }
        None => None,
    };

    let dehazed = process(&decoded, &resolved, gpu, stage_writer.as_mut())?;

    if let Some(writer) = &stage_writer {
        for failure in &writer.failures {
            eprintln!("[WARN] stage dump failed: {}", failure);
        }
    }

    save_image(&dehazed, &output_path)?;
    println!("Done! Dehazed image saved to: {}", output_path.display());
    Ok(())
}

fn cmd_batch(
    input_dir: PathBuf,
    out: Option<PathBuf>,
    params: ParameterArgs,
    gpu: bool,
    threads: Option<usize>,
    debug: bool,
) -> Result<(), String> {
    let inputs = collect_image_files(&input_dir)?;
    if inputs.is_empty() {
        return Err(format!("No image files found in {}", input_dir.display()));
    }

    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| format!("Failed to configure thread pool: {}", e))?;
        println!("Using {} threads for parallel processing", num_threads);
    }

    let output_dir = out.unwrap_or_else(|| input_dir.join("result"));
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| format!("Failed to create output directory: {}", e))?;
    }

    println!("Processing {} files...\n", inputs.len());

    let processed_count = AtomicUsize::new(0);
    let total_files = inputs.len();
    let out_for_items = Some(output_dir.clone());

    let process_one = |input: &PathBuf| -> Result<PathBuf, String> {
        let decoded = decode_image(input)?;
        let resolved = resolve_parameters(
            params.preset.as_deref(),
            &params.overrides(),
            decoded.width,
            decoded.height,
            debug,
        )?;
        let output_path = determine_output_path(input, &out_for_items)?;
        let dehazed = process(&decoded, &resolved, gpu, None)?;
        save_image(&dehazed, &output_path)?;

        let count = processed_count.fetch_add(1, Ordering::SeqCst) + 1;
        println!(
            "[{}/{}] Processed: {} -> {}",
            count,
            total_files,
            input.display(),
            output_path.display()
        );
        Ok(output_path)
    };

    // one shared device context: GPU runs stay sequential
    let results: Vec<Result<PathBuf, String>> = if gpu {
        inputs.iter().map(process_one).collect()
    } else {
        inputs.par_iter().map(process_one).collect()
    };

    let mut errors: Vec<(&PathBuf, &String)> = Vec::new();
    for (input, result) in inputs.iter().zip(results.iter()) {
        if let Err(e) = result {
            errors.push((input, e));
        }
    }

    println!("\n========================================");
    println!("BATCH PROCESSING COMPLETE");
    println!("========================================");
    println!("  Successful: {}", inputs.len() - errors.len());
    println!("  Failed:     {}", errors.len());
    println!("  Output dir: {}", output_dir.display());

    if !errors.is_empty() {
        println!("\nErrors:");
        for (path, error) in &errors {
            println!("  {}: {}", path.display(), error);
        }
        return Err(format!("{} files failed to process", errors.len()));
    }
    Ok(())
}

/// Run one image through the selected backend, timing the call. A GPU
/// failure falls back to the reference path with a warning.
fn process(
    image: &dehaze_core::HostImage,
    params: &dehaze_core::Parameters,
    gpu: bool,
    observer: Option<&mut StageWriter>,
) -> Result<dehaze_core::HostImage, String> {
    let started = Instant::now();
    let result = run_backend(image, params, gpu, observer);
    match &result {
        Ok(_) => println!("  Elapsed: {:.3}s", started.elapsed().as_secs_f64()),
        Err(_) => {}
    }
    result
}

#[cfg(feature = "gpu")]
fn run_backend(
    image: &dehaze_core::HostImage,
    params: &dehaze_core::Parameters,
    gpu: bool,
    mut observer: Option<&mut StageWriter>,
) -> Result<dehaze_core::HostImage, String> {
    if gpu {
        if dehaze_core::is_gpu_available() {
            if params.debug {
                if let Some(info) = dehaze_core::gpu_info() {
                    eprintln!("[DEBUG] Using GPU acceleration: {}", info);
                }
            }
            match dehaze_core::remove_haze_gpu_with_observer(
                image,
                params,
                observer
                    .as_mut()
                    .map(|o| &mut **o as &mut dyn dehaze_core::StageObserver),
            ) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    eprintln!("[WARN] GPU processing failed, falling back to CPU: {}", e);
                }
            }
        } else {
            eprintln!("[WARN] GPU requested but not available, using CPU");
        }
    }
    dehaze_core::remove_haze_with_observer(
        image,
        params,
        observer.map(|o| o as &mut dyn dehaze_core::StageObserver),
    )
    .map_err(|e| e.to_string())
}

#[cfg(not(feature = "gpu"))]
fn run_backend(
    image: &dehaze_core::HostImage,
    params: &dehaze_core::Parameters,
    gpu: bool,
    observer: Option<&mut StageWriter>,
) -> Result<dehaze_core::HostImage, String> {
    if gpu {
        eprintln!("[WARN] Built without the gpu feature, using CPU");
    }
    dehaze_core::remove_haze_with_observer(
        image,
        params,
        observer.map(|o| o as &mut dyn dehaze_core::StageObserver),
    )
    .map_err(|e| e.to_string())
}

fn collect_image_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("Failed to read {}: {}", dir.display(), e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}
