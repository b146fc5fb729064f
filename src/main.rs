//! domp CLI - relaxes a discrete global grid into an optimized map projection.
//!
//! Loads a hexagonal grid, lays it out by an initial projection and lets the
//! force model settle it, then writes the result as a triangulation file.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use domp::geometry::Landmass;
use domp::grid::{DggridFiles, GridSource, IcosahedralGrid, Topology, TopologyCache};
use domp::projection::tin::write_tin;
use domp::settings::{parse_potential_kinds, InitialProjection, Settings};
use domp::simulation::{run, GeoGrid, GridInputs, StepData};

/// Discretized optimized map projections.
#[derive(Parser)]
#[command(name = "domp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relax a grid until a stop threshold is reached.
    Run {
        /// Settings file to start from; flags below override it.
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Grid resolution (refinement level).
        #[arg(short, long)]
        resolution: Option<u32>,

        /// Fraction of each force that is not applied per step (0-1).
        #[arg(long)]
        damping: Option<f64>,

        /// Stop once the relative max force strength falls below this.
        #[arg(long)]
        max_force: Option<f64>,

        /// Stop once at least this many deficiencies exist.
        #[arg(long)]
        max_deficiencies: Option<u32>,

        /// Stop after this many steps.
        #[arg(long)]
        max_steps: Option<u64>,

        /// Initial projection.
        #[arg(short, long)]
        projection: Option<ProjectionArg>,

        /// Comma-separated potentials to calibrate (e.g. "distance,area").
        #[arg(long)]
        calibrate: Option<String>,

        #[command(flatten)]
        grid: GridArgs,

        /// GeoJSON file with land polygons, for land/ocean weights.
        #[arg(long)]
        landmass: Option<PathBuf>,

        /// Output directory.
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Log step diagnostics every n steps.
        #[arg(long, default_value = "100")]
        log_every: u64,
    },

    /// Display statistics of a grid resolution.
    Info {
        /// Grid resolution (refinement level).
        #[arg(short, long, default_value = "3")]
        resolution: u32,

        #[command(flatten)]
        grid: GridArgs,
    },

    /// Write a settings file with default values.
    Settings {
        /// Output file.
        #[arg(short, long, default_value = "settings.json")]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct GridArgs {
    /// Grid source.
    #[arg(long, default_value = "icosahedral")]
    source: GridSourceArg,

    /// Directory with DGGRID output files (for --source dggrid).
    #[arg(long)]
    dggrid_dir: Option<PathBuf>,

    /// Directory for cached topologies.
    #[arg(long)]
    cache: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GridSourceArg {
    /// Built-in aperture-3 icosahedral grid.
    Icosahedral,
    /// Cell and neighbour files produced by DGGRID.
    Dggrid,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProjectionArg {
    /// Plate carrée in metres.
    Unprojected,
    Sinusoidal,
    /// Cut off at ±85° latitude.
    Mercator,
    Mollweide,
}

impl From<ProjectionArg> for InitialProjection {
    fn from(p: ProjectionArg) -> Self {
        match p {
            ProjectionArg::Unprojected => InitialProjection::Unprojected,
            ProjectionArg::Sinusoidal => InitialProjection::Sinusoidal,
            ProjectionArg::Mercator => InitialProjection::Mercator,
            ProjectionArg::Mollweide => InitialProjection::Mollweide,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            settings,
            resolution,
            damping,
            max_force,
            max_deficiencies,
            max_steps,
            projection,
            calibrate,
            grid,
            landmass,
            output,
            log_every,
        } => {
            let mut s = match settings {
                Some(path) => Settings::load(&path).unwrap_or_else(|e| fail("Error reading settings", e)),
                None => Settings::default(),
            };
            if let Some(r) = resolution {
                s.resolution = r;
            }
            if let Some(d) = damping {
                if !(0.0..1.0).contains(&d) {
                    eprintln!("Error: Damping must be in [0, 1)");
                    std::process::exit(1);
                }
                s.damping_factor = d;
            }
            if let Some(t) = max_force {
                s.stop_threshold_max_force_strength = t;
            }
            if let Some(n) = max_deficiencies {
                s.stop_threshold_count_deficiencies = n;
            }
            if let Some(n) = max_steps {
                s.stop_threshold_max_steps = n;
            }
            if let Some(p) = projection {
                s.initial_projection = p.into();
            }
            if let Some(list) = calibrate {
                let kinds = parse_potential_kinds(&list).unwrap_or_else(|e| fail("Error", e));
                s.calibrated_potentials = kinds.into_iter().collect();
            }
            run_simulation(s, &grid, landmass.as_deref(), &output, log_every);
        }
        Commands::Info { resolution, grid } => run_info(resolution, &grid),
        Commands::Settings { output } => {
            Settings::default()
                .save(&output, false)
                .unwrap_or_else(|e| fail("Error writing settings", e));
            println!("Wrote default settings to {}", output.display());
        }
    }
}

fn fail(context: &str, e: impl std::fmt::Display) -> ! {
    eprintln!("{context}: {e}");
    std::process::exit(1);
}

fn grid_source(args: &GridArgs) -> Arc<dyn GridSource> {
    match args.source {
        GridSourceArg::Icosahedral => Arc::new(IcosahedralGrid::default()),
        GridSourceArg::Dggrid => match &args.dggrid_dir {
            Some(dir) => Arc::new(DggridFiles::new(dir)),
            None => {
                eprintln!("Error: --dggrid-dir is required for --source dggrid");
                std::process::exit(1);
            }
        },
    }
}

fn run_simulation(settings: Settings, grid_args: &GridArgs, landmass: Option<&Path>, output: &Path, log_every: u64) {
    let start = Instant::now();
    let mut inputs = GridInputs::new(grid_source(grid_args));
    if let Some(path) = landmass {
        let land = Landmass::from_geojson_file(path).unwrap_or_else(|e| fail("Error reading landmass", e));
        println!("Loaded {} land polygons", land.len());
        inputs = inputs.with_landmass(Arc::new(land));
    }
    if let Some(dir) = &grid_args.cache {
        std::fs::create_dir_all(dir).unwrap_or_else(|e| fail("Error creating cache directory", e));
        inputs = inputs.with_cache(TopologyCache::new(dir));
    }

    println!("Discretized Optimized Map Projection");
    println!("  Resolution:  {}", settings.resolution);
    println!("  Projection:  {}", settings.initial_projection);
    println!("  Damping:     {}", settings.damping_factor);
    println!();

    let mut grid = GeoGrid::new_with_status(settings, inputs, |stage| println!("{}...", stage))
        .unwrap_or_else(|e| fail("Error", e));

    let log_every = log_every.max(1);
    let last = run(&mut grid, |data: &StepData| {
        if data.step % log_every == 0 {
            println!(
                "  step {:>7}: energy {:.6e}, max force {:.4}, deficiencies {}",
                data.step, data.energy, data.relative_max_force_strength, data.deficiencies
            );
        }
    })
    .unwrap_or_else(|e| fail("Error", e));
    println!(
        "Stopped at step {} ({:?}) after {:.2?}",
        last.step,
        last.stop_reason,
        start.elapsed()
    );

    std::fs::create_dir_all(output).unwrap_or_else(|e| fail("Error creating output directory", e));
    let hash = grid.settings().hash();
    let name = &hash[..12];
    let settings_path = output.join(format!("domp-{name}.settings.json"));
    grid.settings()
        .save(&settings_path, true)
        .unwrap_or_else(|e| fail("Error writing settings", e));
    let tin_path = output.join(format!("domp-{name}.tin.json"));
    write_tin(&grid.tin(), &tin_path).unwrap_or_else(|e| fail("Error writing TIN", e));

    println!("Wrote {}", settings_path.display());
    println!("Wrote {}", tin_path.display());
    println!("Done!");
}

fn run_info(resolution: u32, grid_args: &GridArgs) {
    let source = grid_source(grid_args);
    let raw = source.load(resolution).unwrap_or_else(|e| fail("Error loading grid", e));
    let topology = Topology::build(&raw, source.name(), None).unwrap_or_else(|e| fail("Error building grid", e));
    let active = topology.active_indices().len();
    let pentagons = raw.cells.iter().filter(|c| !c.is_hexagon()).count();

    println!("domp - Grid Info");
    println!("================");
    println!();
    println!("Source:      {}", source.name());
    println!("Resolution:  {}", resolution);
    println!();
    println!("Cells:");
    println!("  Raw:       {:>10}", raw.cells.len());
    println!("  Pentagons: {:>10}", pentagons);
    println!("  Instances: {:>10}", topology.cells.len());
    println!("  Active:    {:>10}", active);
    println!();
    println!("Scales:");
    println!("  Typical distance: {:>12.1} km", topology.stats.typical_distance / 1000.0);
    println!("  Typical area:     {:>12.1} km²", topology.stats.typical_area / 1e6);
}
