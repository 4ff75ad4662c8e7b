use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use mapanim::{
    BitmapProvider, CommandTools, CompositeRequest, LoadOpts, ProviderOpts, Region, RenderCmd,
    Rgb8, ToolOpts, TracingSink, provider::view_key,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mapanim", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every frame of an animation plan to PNG files.
    Render(RenderArgs),
    /// Print the cache key of every frame without rendering.
    Keys(KeysArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Animation plan JSON.
    #[arg(long)]
    plan: PathBuf,

    /// Directory receiving `frame_NNNN.png` files.
    #[arg(long)]
    out_dir: PathBuf,

    /// Options JSON (`provider`, `tools` and `load` sections).
    #[arg(long)]
    options: Option<PathBuf>,

    /// Frame width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Concurrent rendering processes.
    #[arg(long)]
    nprocs: Option<usize>,

    /// Background color (`r,g,b`, `r:g:b` or `rrggbb`).
    #[arg(long)]
    bg: Option<Rgb8>,

    /// Re-render even when artifacts are cached.
    #[arg(long)]
    force: bool,

    /// Keep the scratch directory with intermediate renders.
    #[arg(long)]
    keep_scratch: bool,
}

#[derive(Parser, Debug)]
struct KeysArgs {
    /// Animation plan JSON.
    #[arg(long)]
    plan: PathBuf,
}

/// Frames to produce: 2D layer stacks (top layer first) and 3D views.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AnimationPlan {
    stacks: Vec<Vec<RenderCmd>>,
    opacities: Vec<f64>,
    regions: Option<Vec<Option<Region>>>,
    views_3d: Vec<RenderCmd>,
    region_3d: Option<Region>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CliOptions {
    provider: ProviderOpts,
    tools: ToolOpts,
    load: LoadOpts,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Keys(args) => cmd_keys(args),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse {what} JSON '{}'", path.display()))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let plan: AnimationPlan = read_json(&args.plan, "animation plan")?;
    let mut opts: CliOptions = match args.options.as_deref() {
        Some(path) => read_json(path, "options")?,
        None => CliOptions::default(),
    };
    if let Some(w) = args.width {
        opts.provider.size.width = w;
    }
    if let Some(h) = args.height {
        opts.provider.size.height = h;
    }
    if let Some(n) = args.nprocs {
        opts.load.nprocs = n;
    }
    if let Some(bg) = args.bg {
        opts.load.bgcolor = bg;
    }
    opts.load.force |= args.force;

    let tools = Arc::new(CommandTools::new(opts.tools));
    let mut provider = BitmapProvider::new(tools, opts.provider)?;
    if args.keep_scratch {
        provider.keep_scratch_dir();
        tracing::info!(dir = %provider.scratch_dir().display(), "keeping scratch dir");
    }
    provider.set_cmds(plan.stacks, plan.opacities, plan.regions)?;
    provider.set_cmds_3d(plan.views_3d, plan.region_3d)?;

    let stats = provider.load(&opts.load, &mut TracingSink)?;
    if !stats.completed {
        tracing::warn!("load did not complete, missing frames show 'No data'");
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output dir '{}'", args.out_dir.display()))?;
    let keys = provider.frame_keys();
    for (i, key) in keys.iter().enumerate() {
        let path = args.out_dir.join(format!("frame_{i:04}.png"));
        provider.get_bitmap(*key).save_png(&path)?;
    }
    tracing::info!(frames = keys.len(), out_dir = %args.out_dir.display(), "wrote frames");

    provider.unload();
    provider.sweep();
    Ok(())
}

fn cmd_keys(args: KeysArgs) -> anyhow::Result<()> {
    let plan: AnimationPlan = read_json(&args.plan, "animation plan")?;
    let regions = match plan.regions {
        Some(r) => r,
        None => vec![None; plan.stacks.len()],
    };
    anyhow::ensure!(
        regions.len() == plan.stacks.len(),
        "{} stacks but {} regions",
        plan.stacks.len(),
        regions.len()
    );

    let mut i = 0usize;
    for (cmds, region) in plan.stacks.into_iter().zip(regions) {
        let stack = CompositeRequest::new(cmds, plan.opacities.clone(), region)?;
        println!("{i:04} {}", stack.key());
        i += 1;
    }
    for cmd in &plan.views_3d {
        println!("{i:04} {}", view_key(cmd));
        i += 1;
    }
    Ok(())
}
