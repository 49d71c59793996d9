use crate::config::{LayoutConfig, load_config};
use crate::scene::{Scene, SceneDump, run as run_scene};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "colayout",
    version,
    about = "Constraint-based overlap removal and edge routing for rectangle scenes"
)]
pub struct Args {
    /// Scene file (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the JSON dump. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config file (.json or .json5)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Prune X constraints with the neighbour-list heuristic
    #[arg(long = "neighbour-lists")]
    pub neighbour_lists: bool,

    /// Skip the final X re-solve
    #[arg(long = "no-third-pass")]
    pub no_third_pass: bool,

    /// Route the scene's edges after overlap removal
    #[arg(long = "route")]
    pub route: bool,
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = apply_flags(load_config(args.config.as_deref())?, &args);

    let input = read_input(args.input.as_deref())?;
    let scene: Scene = serde_json::from_str(&input).context("failed to parse scene JSON")?;
    let dump = run_scene(&scene, &config, args.route)?;
    write_output(&dump, args.output.as_deref())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn apply_flags(mut config: LayoutConfig, args: &Args) -> LayoutConfig {
    if args.neighbour_lists {
        config.overlap.use_neighbour_lists = true;
    }
    if args.no_third_pass {
        config.overlap.third_pass = false;
    }
    config
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path.filter(|p| *p != Path::new("-")) {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(dump: &SceneDump, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(dump)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
