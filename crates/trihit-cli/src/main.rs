//! trihit CLI - GPU ray/triangle intersection runs
//!
//! Draws a small random scene, stress-tests the kernel with a large one,
//! validates it against hand-derived cases, or reports the GPU adapter.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

use trihit::plot::{build_figure, write_figure};
use trihit::{
    fixtures, intersect, run_test_cases, seeded_rng, CpuBackend, GpuBackend, HitSummary,
    IntersectionBackend, RunSettings, Scene,
};
use trihit_compute::GpuContext;

mod config;
mod logger;

use config::{BackendKind, RunConfig, RunOverrides};
use logger::LogLevel;

#[derive(Parser)]
#[command(name = "trihit")]
#[command(about = "Brute-force ray/triangle intersections on the GPU", long_about = None)]
struct Cli {
    /// TOML run configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logging level; RUST_LOG directives apply on top
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Where the kernel runs (overrides [dispatch] backend)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Scene RNG seed (overrides the config seed)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Give up waiting for GPU results after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Intersect a small random scene and write a Plotly figure
    Plot {
        /// Output file (.html for a page, anything else for Plotly JSON)
        #[arg(short, long, default_value = "intersections.html")]
        output: PathBuf,
        #[command(flatten)]
        sizes: SizeArgs,
    },
    /// Time a large random scene with many repeated passes
    Stress {
        #[command(flatten)]
        sizes: SizeArgs,
    },
    /// Check the kernel against the built-in test cases
    Test,
    /// Show the GPU adapter and its compute limits
    Info,
}

#[derive(clap::Args)]
struct SizeArgs {
    /// Number of rays
    #[arg(long)]
    rays: Option<usize>,
    /// Number of triangles
    #[arg(long)]
    triangles: Option<usize>,
    /// Repeats of the full intersection loop
    #[arg(long)]
    intersections: Option<u32>,
}

impl From<SizeArgs> for RunOverrides {
    fn from(args: SizeArgs) -> Self {
        RunOverrides {
            ray_count: args.rays,
            triangle_count: args.triangles,
            intersection_count: args.intersections,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.log_level.into());

    let mut config = RunConfig::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.dispatch.backend = backend;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.timeout_secs.is_some() {
        config.dispatch.timeout_secs = cli.timeout_secs;
    }

    match cli.command {
        Commands::Plot { output, sizes } => {
            config.plot = config.plot.merge(sizes.into());
            config.validate()?;
            run_plot(&config, &output)?;
        }
        Commands::Stress { sizes } => {
            config.stress = config.stress.merge(sizes.into());
            config.validate()?;
            run_stress(&config)?;
        }
        Commands::Test => {
            config.validate()?;
            run_tests(&config)?;
        }
        Commands::Info => show_info()?,
    }

    Ok(())
}

fn make_backend(config: &RunConfig) -> Result<Box<dyn IntersectionBackend>> {
    let backend: Box<dyn IntersectionBackend> = match config.dispatch.backend {
        BackendKind::Gpu => Box::new(GpuBackend::new(config.dispatch_options())?),
        BackendKind::Cpu => Box::new(CpuBackend::new()),
    };
    Ok(backend)
}

fn run_scene(config: &RunConfig, settings: RunSettings) -> Result<(Scene, Vec<f32>)> {
    let mut backend = make_backend(config)?;
    let mut rng = seeded_rng(config.seed);
    let scene = Scene::generate(&settings, &mut rng);
    let options = config.kernel_options(settings.intersection_count);

    info!(
        "Running {} rays x {} triangles x {} passes on the {} backend",
        settings.ray_count,
        settings.triangle_count,
        settings.intersection_count,
        backend.name()
    );
    let Some(distances) = intersect(backend.as_mut(), &scene.rays, &scene.triangles, &options)?
    else {
        bail!("Aborted: no compute-capable GPU adapter available");
    };
    Ok((scene, distances))
}

fn run_plot(config: &RunConfig, output: &Path) -> Result<()> {
    let (scene, distances) = run_scene(config, config.plot_settings())?;
    let summary = HitSummary::from_distances(&distances);

    let rays: Vec<_> = scene.rays.iter().copied().zip(distances).collect();
    let mut rng = seeded_rng(config.seed);
    let figure = build_figure(&scene.triangles, &rays, &mut rng);
    write_figure(output, &figure)?;

    println!("{summary}");
    println!("Wrote {}", output.display());
    Ok(())
}

fn run_stress(config: &RunConfig) -> Result<()> {
    let settings = config.stress_settings();
    let start = Instant::now();
    let (_, distances) = run_scene(config, settings)?;
    let elapsed = start.elapsed();

    let tests = settings.ray_count as f64
        * settings.triangle_count as f64
        * f64::from(settings.intersection_count);
    println!("{}", HitSummary::from_distances(&distances));
    println!(
        "{:.0} ray/triangle tests in {:.3}s ({:.3e} tests/s)",
        tests,
        elapsed.as_secs_f64(),
        tests / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

fn run_tests(config: &RunConfig) -> Result<()> {
    let mut backend = make_backend(config)?;
    let report = run_test_cases(backend.as_mut(), &fixtures(), &config.kernel_options(1));
    println!("{}", report.render());

    if !report.all_passed() {
        bail!(
            "{} of {} test cases failed",
            report.total() - report.passed(),
            report.total()
        );
    }
    Ok(())
}

fn show_info() -> Result<()> {
    let Some(ctx) = GpuContext::probe_blocking()? else {
        println!("No compute-capable GPU adapter available");
        return Ok(());
    };

    let adapter = ctx.adapter_info();
    let limits = ctx.limits();
    println!("Adapter:  {}", adapter.name);
    println!("Backend:  {:?}", adapter.backend);
    println!("Type:     {:?}", adapter.device_type);
    println!("Driver:   {} {}", adapter.driver, adapter.driver_info);
    println!();
    println!(
        "Max workgroups per dimension:  {}",
        limits.max_compute_workgroups_per_dimension
    );
    println!(
        "Max workgroup size (x):        {}",
        limits.max_compute_workgroup_size_x
    );
    println!(
        "Max invocations per workgroup: {}",
        limits.max_compute_invocations_per_workgroup
    );
    println!(
        "Max storage buffers per stage: {}",
        limits.max_storage_buffers_per_shader_stage
    );
    println!(
        "Max storage binding size:      {} bytes",
        limits.max_storage_buffer_binding_size
    );
    Ok(())
}
