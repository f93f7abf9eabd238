//! flsgen command line: solve landscape structures, synthesize terrains and
//! generate fragmented landscape rasters.
//!
//!   flsgen structure targets.json out/structure -n 5
//!   flsgen terrain out/terrain.tif --rows 200 --cols 200 --roughness 0.4
//!   flsgen generate out/structure.json out/landscape --terrain out/terrain.tif --preview
mod preview;
mod raster;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use flsgen_core::cp::SearchStrategy;
use flsgen_core::{
    generate_batch, Connectivity, GenerationBudget, GeneratorConfig, Grid, GrowthStrategy, LandscapeStructure,
    Neighborhood, SolveOutcome, StructureDocument, TargetDocument, Terrain, NO_DATA,
};
use raster::RasterMeta;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "flsgen", version, about = "Fragmented landscape structure and raster generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve landscape structures satisfying a target document
    Structure(StructureArgs),
    /// Generate a fractal terrain raster
    Terrain(TerrainArgs),
    /// Paint landscape rasters from a structure (or target) document
    Generate(GenerateArgs),
}

/// Georeferencing of rasters written without a mask to copy it from.
#[derive(Args, Debug, Clone)]
struct GeoArgs {
    /// X coordinate of the top-left corner
    #[arg(long, default_value = "0")]
    x: f64,

    /// Y coordinate of the top-left corner
    #[arg(long, default_value = "0")]
    y: f64,

    /// Cell size
    #[arg(long, default_value = "1")]
    resolution: f64,

    /// EPSG code of the coordinate reference system
    #[arg(long)]
    epsg: Option<u16>,
}

impl GeoArgs {
    fn meta(&self, nb_rows: usize, nb_cols: usize) -> RasterMeta {
        RasterMeta {
            x_min: self.x,
            y_max: self.y,
            res_x: self.resolution,
            res_y: self.resolution,
            epsg: self.epsg,
            ..RasterMeta::new(nb_cols, nb_rows)
        }
    }
}

/// Structure search settings shared by `structure` and `generate`.
#[derive(Args, Debug, Clone)]
struct SearchArgs {
    /// Search strategy (DEFAULT, RANDOM, DOM_OVER_W_DEG, DOM_OVER_W_DEG_REF,
    /// ACTIVITY_BASED, CONFLICT_HISTORY, MIN_DOM_LB, MIN_DOM_UB)
    #[arg(long, default_value = "DOM_OVER_W_DEG")]
    strategy: SearchStrategy,

    /// Time limit per structure, in seconds (0 = none)
    #[arg(long, default_value = "0")]
    time_limit: u64,
}

impl SearchArgs {
    fn limit(&self) -> Option<Duration> {
        (self.time_limit > 0).then(|| Duration::from_secs(self.time_limit))
    }
}

#[derive(Args, Debug)]
struct StructureArgs {
    /// Target document (JSON)
    targets: PathBuf,

    /// Output prefix: writes <prefix>.json, or <prefix>_<i>.json when -n > 1
    output: PathBuf,

    /// Number of distinct structures to produce
    #[arg(short, default_value = "1")]
    n: usize,

    #[command(flatten)]
    search: SearchArgs,

    /// Seed of the randomized search strategies
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum TerrainMethod {
    /// Diamond-square midpoint displacement
    Ds,
    /// Perlin fractional Brownian motion
    Fbm,
}

#[derive(Args, Debug)]
struct TerrainArgs {
    /// Output GeoTIFF
    output: PathBuf,

    #[arg(long)]
    rows: usize,

    #[arg(long)]
    cols: usize,

    /// Roughness in [0, 1]; for fBm the Hurst exponent is 1 - roughness
    #[arg(long, default_value = "0.5")]
    roughness: f64,

    #[arg(long, value_enum, default_value = "ds")]
    method: TerrainMethod,

    /// Octaves (fBm only)
    #[arg(long, default_value = "6")]
    octaves: u32,

    #[arg(long, default_value = "42")]
    seed: u64,

    #[command(flatten)]
    geo: GeoArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Growth {
    /// Grow from the whole frontier
    All,
    /// Grow from the most recent cell with a free neighbour
    Last,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Structure document, or a target document to solve first
    input: PathBuf,

    /// Output prefix: writes <prefix>.tif, or <prefix>_<i>.tif when -n > 1
    output: PathBuf,

    /// Terrain GeoTIFF guiding patch growth (synthesized when absent)
    #[arg(long)]
    terrain: Option<PathBuf>,

    /// Roughness of the synthesized diamond-square terrain
    #[arg(long, default_value = "0.5")]
    roughness: f64,

    /// 0 = random growth, 1 = always the lowest frontier cell
    #[arg(long, default_value = "0.5")]
    terrain_dependency: f64,

    /// Patch connectivity (4 or 8)
    #[arg(long, default_value = "4")]
    connectivity: u8,

    /// Minimum gap kept between patches of the same class, in cells
    #[arg(long, default_value = "1")]
    buffer: usize,

    /// Draw the same-class gap uniformly in [buffer, buffer-max] per cell
    #[arg(long)]
    buffer_max: Option<usize>,

    /// Gap kept between patches of different classes, in cells (0 = classes may touch)
    #[arg(long, default_value = "1")]
    class_buffer: usize,

    /// Keep the unpainted area in one piece
    #[arg(long)]
    no_holes: bool,

    #[arg(long, value_enum, default_value = "all")]
    growth: Growth,

    /// Full restarts before giving up
    #[arg(long, default_value = "2")]
    max_try: usize,

    /// Attempts per patch before a restart
    #[arg(long, default_value = "10")]
    max_try_patch: usize,

    /// Number of landscapes to generate
    #[arg(short, default_value = "1")]
    n: usize,

    /// Used when the input is a target document
    #[command(flatten)]
    search: SearchArgs,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Also write <output>.png
    #[arg(long)]
    preview: bool,

    #[command(flatten)]
    geo: GeoArgs,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `<prefix>.<ext>` for a single output, `<prefix>_<i>.<ext>` otherwise.
fn numbered(prefix: &Path, i: usize, n: usize, ext: &str) -> PathBuf {
    let stem = prefix.as_os_str().to_string_lossy();
    if n == 1 {
        PathBuf::from(format!("{stem}.{ext}"))
    } else {
        PathBuf::from(format!("{stem}_{i}.{ext}"))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    Ok(())
}

/// Grid of a document: the mask raster when one is referenced, else a full
/// `nb_rows × nb_cols` grid.
fn load_grid(nb_rows: usize, nb_cols: usize, mask: Option<&str>) -> Result<(Grid, Option<RasterMeta>)> {
    let Some(mask) = mask else {
        return Ok((Grid::new(nb_rows, nb_cols), None));
    };
    let (masked, meta) = raster::read_mask(Path::new(mask))?;
    if (meta.height, meta.width) != (nb_rows, nb_cols) {
        bail!("mask {mask} is {}x{}, the document expects {nb_rows}x{nb_cols}", meta.height, meta.width);
    }
    Ok((Grid::with_mask(nb_rows, nb_cols, &masked)?, Some(meta)))
}

fn solve(
    targets: TargetDocument,
    grid: &Grid,
    strategy: SearchStrategy,
    seed: u64,
) -> Result<flsgen_core::StructureSolver> {
    let mut solver = targets.into_solver(grid)?;
    solver.set_search_strategy(strategy);
    solver.set_seed(seed);
    solver.build()?;
    Ok(solver)
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn run_structure(args: StructureArgs) -> Result<()> {
    let json = fs::read_to_string(&args.targets).with_context(|| format!("cannot read {}", args.targets.display()))?;
    let targets = TargetDocument::from_json(&json).with_context(|| format!("invalid targets in {}", args.targets.display()))?;
    let (grid, _) = load_grid(targets.nb_rows, targets.nb_cols, targets.mask_raster_path.as_deref())?;
    let mut solver = solve(targets, &grid, args.search.strategy, args.seed)?;
    let limit = args.search.limit();

    ensure_parent(&args.output)?;
    let mut found = 0;
    for i in 0..args.n {
        let structure = match solver.find_solution(limit)? {
            SolveOutcome::Found(s) => s,
            SolveOutcome::Infeasible if found == 0 => bail!("no structure satisfies the targets"),
            SolveOutcome::TimedOut if found == 0 => bail!("no structure found within {}s", args.search.time_limit),
            outcome => {
                warn!("stopping after {found} structure(s): {outcome:?}");
                break;
            }
        };
        let path = numbered(&args.output, i, args.n, "json");
        fs::write(&path, structure.to_json()?).with_context(|| format!("cannot write {}", path.display()))?;
        eprintln!("  structure {} → {}", i + 1, path.display());
        found += 1;
    }
    info!("{found} structure(s) written");
    Ok(())
}

fn run_terrain(args: TerrainArgs) -> Result<()> {
    let grid = Grid::new(args.rows, args.cols);
    let terrain = match args.method {
        TerrainMethod::Ds => Terrain::diamond_square(&grid, args.roughness, &mut StdRng::seed_from_u64(args.seed))?,
        TerrainMethod::Fbm => Terrain::fbm(&grid, args.seed as u32, (1.0 - args.roughness) as f32, args.octaves),
    };
    ensure_parent(&args.output)?;
    raster::write_f32(&args.output, &args.geo.meta(args.rows, args.cols), &terrain.normalized().data)?;
    eprintln!("  terrain {}x{} → {}", args.rows, args.cols, args.output.display());
    Ok(())
}

/// A structure document has a number under `NP`; a target document a range.
fn is_target_document(json: &str) -> Result<bool> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let classes = value.get("classes").and_then(|c| c.as_array());
    Ok(classes.is_some_and(|cs| cs.iter().any(|c| c.get("NP").is_some_and(|np| np.is_array()))))
}

fn generator_config(args: &GenerateArgs) -> Result<GeneratorConfig> {
    let base = Connectivity::try_from(args.connectivity)?;
    let buffer = match args.buffer_max {
        Some(max) => Neighborhood::variable_width(base, args.buffer, max)?,
        None => Neighborhood::wide(base, args.buffer)?,
    };
    let class_buffer = match args.class_buffer {
        0 => None,
        k => Some(Neighborhood::wide(base, k)?),
    };
    let strategy = match args.growth {
        Growth::All => GrowthStrategy::FromAllPlacedCells,
        Growth::Last => GrowthStrategy::FromLastPossibleCell,
    };
    Ok(GeneratorConfig {
        neighborhood: Neighborhood::Adjacent(base),
        buffer,
        class_buffer,
        no_hole: args.no_holes,
        strategy,
    })
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let json = fs::read_to_string(&args.input).with_context(|| format!("cannot read {}", args.input.display()))?;

    let (structure, grid, mask_meta) = if is_target_document(&json)? {
        let targets = TargetDocument::from_json(&json)?;
        let (grid, meta) = load_grid(targets.nb_rows, targets.nb_cols, targets.mask_raster_path.as_deref())?;
        let mut solver = solve(targets, &grid, args.search.strategy, args.seed)?;
        let structure = match solver.find_solution(args.search.limit())? {
            SolveOutcome::Found(s) => s,
            SolveOutcome::Infeasible => bail!("no structure satisfies the targets in {}", args.input.display()),
            SolveOutcome::TimedOut => bail!("no structure found within {}s", args.search.time_limit),
        };
        (structure, grid, meta)
    } else {
        let doc = StructureDocument::from_json(&json)?;
        let (grid, meta) = load_grid(doc.nb_rows, doc.nb_cols, doc.mask_raster_path.as_deref())?;
        (LandscapeStructure::from_document(&doc, &grid)?, grid, meta)
    };

    let terrain = match &args.terrain {
        Some(path) => {
            let (data, meta) = raster::read_f32(path)?;
            if (meta.height, meta.width) != (grid.nb_rows(), grid.nb_cols()) {
                bail!("terrain {} is {}x{}, expected {}x{}", path.display(), meta.height, meta.width, grid.nb_rows(), grid.nb_cols());
            }
            Terrain::from_elevation(&grid, data)?
        }
        None => Terrain::diamond_square(&grid, args.roughness, &mut StdRng::seed_from_u64(args.seed))?,
    };

    let config = generator_config(&args)?;
    let budget = GenerationBudget {
        terrain_dependency: args.terrain_dependency,
        max_try: args.max_try,
        max_try_patch: args.max_try_patch,
    };
    let n = args.n as u64;
    let landscapes = generate_batch(&structure, &grid, &terrain, &config, &budget, args.seed..args.seed + n)?;

    let meta = RasterMeta {
        nodata: Some(f64::from(NO_DATA)),
        ..mask_meta.unwrap_or_else(|| args.geo.meta(grid.nb_rows(), grid.nb_cols()))
    };
    ensure_parent(&args.output)?;
    let mut written = 0;
    for (i, landscape) in landscapes.iter().enumerate() {
        if !landscape.outcome.success {
            eprintln!("  landscape {} (seed {}): failed after {} tries", i + 1, landscape.seed, landscape.outcome.tries);
            continue;
        }
        let path = numbered(&args.output, i, args.n, "tif");
        raster::write_i32(&path, &meta, &landscape.raster)?;
        if args.preview {
            preview::write_png(&numbered(&args.output, i, args.n, "png"), &landscape.raster, grid.nb_rows(), grid.nb_cols())?;
        }
        eprintln!("  landscape {} (seed {}, {} tries) → {}", i + 1, landscape.seed, landscape.outcome.tries, path.display());
        written += 1;
    }
    if written == 0 {
        bail!("no landscape could be generated within {} tries", args.max_try);
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match Cli::parse().command {
        Command::Structure(args) => run_structure(args),
        Command::Terrain(args) => run_terrain(args),
        Command::Generate(args) => run_generate(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_are_numbered_only_for_batches() {
        assert_eq!(numbered(Path::new("out/s"), 0, 1, "json"), PathBuf::from("out/s.json"));
        assert_eq!(numbered(Path::new("out/s"), 2, 3, "tif"), PathBuf::from("out/s_2.tif"));
    }

    #[test]
    fn document_kinds_are_told_apart() {
        let targets = r#"{"nbRows":5,"nbCols":5,"classes":[{"name":"a","NP":[1,2],"AREA":[1,4]}]}"#;
        let structure = r#"{"nbRows":5,"nbCols":5,"classes":[{"name":"a","NP":2,"AREA":[1,4]}]}"#;
        assert!(is_target_document(targets).unwrap());
        assert!(!is_target_document(structure).unwrap());
    }

    #[test]
    fn cli_flags_map_to_generator_config() {
        let cli = Cli::try_parse_from([
            "flsgen", "generate", "in.json", "out/l", "--connectivity", "8", "--buffer", "2", "--buffer-max", "4",
            "--class-buffer", "3", "--no-holes", "--growth", "last",
        ])
        .unwrap();
        let Command::Generate(args) = cli.command else { panic!("expected generate") };
        let config = generator_config(&args).unwrap();
        assert_eq!(config.neighborhood, Neighborhood::eight());
        assert_eq!(config.buffer.max_width(), 4);
        assert_eq!(config.class_buffer.map(|b| b.max_width()), Some(3));
        assert!(config.no_hole);
        assert_eq!(config.strategy, GrowthStrategy::FromLastPossibleCell);
    }

    #[test]
    fn classes_are_kept_apart_unless_disabled() {
        let cli = Cli::try_parse_from(["flsgen", "generate", "in.json", "out"]).unwrap();
        let Command::Generate(args) = cli.command else { panic!("expected generate") };
        assert_eq!(generator_config(&args).unwrap().class_buffer, Some(Neighborhood::four()));
        assert_eq!(args.search.strategy, SearchStrategy::DomOverWDeg);
        assert_eq!(args.search.limit(), None);

        let cli = Cli::try_parse_from(["flsgen", "generate", "in.json", "out", "--class-buffer", "0"]).unwrap();
        let Command::Generate(args) = cli.command else { panic!("expected generate") };
        assert_eq!(generator_config(&args).unwrap().class_buffer, None);
    }

    #[test]
    fn generate_takes_search_flags() {
        let cli = Cli::try_parse_from([
            "flsgen", "generate", "t.json", "out", "--strategy", "random", "--time-limit", "30", "--growth", "last",
        ])
        .unwrap();
        let Command::Generate(args) = cli.command else { panic!("expected generate") };
        assert_eq!(args.search.strategy, SearchStrategy::Random);
        assert_eq!(args.search.limit(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn bad_connectivity_is_rejected() {
        let cli = Cli::try_parse_from(["flsgen", "generate", "in.json", "out", "--connectivity", "6"]).unwrap();
        let Command::Generate(args) = cli.command else { panic!("expected generate") };
        assert!(generator_config(&args).is_err());
    }

    #[test]
    fn strategy_names_parse() {
        let cli = Cli::try_parse_from(["flsgen", "structure", "t.json", "out", "--strategy", "dom_over_w_deg"]).unwrap();
        let Command::Structure(args) = cli.command else { panic!("expected structure") };
        assert_eq!(args.search.strategy, SearchStrategy::DomOverWDeg);
    }
}
