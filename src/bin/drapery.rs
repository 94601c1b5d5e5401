use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use drapery::{DraperyResult, PipelineConfig, TryOnOutput, TryOnPipeline};

#[derive(Parser, Debug)]
#[command(name = "drapery", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Produce a try-on composite for one person/garment pair.
    Tryon(TryonArgs),
}

#[derive(Parser, Debug)]
struct TryonArgs {
    /// Person image file.
    #[arg(long)]
    person: PathBuf,

    /// Garment image file.
    #[arg(long)]
    cloth: PathBuf,

    /// Directory receiving the output artifact.
    #[arg(long = "out-dir", default_value = "outputs")]
    out_dir: PathBuf,

    /// Pipeline configuration JSON; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base garment width as a fraction of person width.
    #[arg(long)]
    scale: Option<f32>,

    /// Seed forwarded to the external inference command.
    #[arg(long)]
    seed: Option<u64>,

    /// Permit the local fallback composite.
    #[arg(long)]
    placeholder: bool,

    /// External inference command template
    /// (placeholders: {person} {cloth} {output} {seed}).
    #[arg(long = "external-command")]
    external_command: Option<String>,

    /// Permit upscaling the garment.
    #[arg(long = "allow-upscale")]
    allow_upscale: bool,

    /// Fractional horizontal anchor on the person canvas.
    #[arg(long = "pos-x")]
    pos_x: Option<f32>,

    /// Fractional vertical anchor on the person canvas.
    #[arg(long = "pos-y")]
    pos_y: Option<f32>,

    /// Skip garment background removal.
    #[arg(long = "no-remove-background")]
    no_remove_background: bool,

    /// Enable the secondary segmentation-based crop.
    #[arg(long = "auto-crop")]
    auto_crop: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Tryon(args) => cmd_tryon(args),
    };
    match result {
        Ok(out) => {
            match serde_json::to_string_pretty(&out) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{}", out.path.display()),
            }
            ExitCode::SUCCESS
        }
        Err(err) if err.client_facing() => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_tryon(args: TryonArgs) -> DraperyResult<TryOnOutput> {
    let mut cfg = match &args.config {
        Some(path) => read_config(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(scale) = args.scale {
        cfg.cloth_scale = scale;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(pos_x) = args.pos_x {
        cfg.pos_x = pos_x;
    }
    if let Some(pos_y) = args.pos_y {
        cfg.pos_y = pos_y;
    }
    if args.placeholder {
        cfg.placeholder_enabled = true;
    }
    if args.allow_upscale {
        cfg.allow_upscale = true;
    }
    if args.no_remove_background {
        cfg.remove_background = false;
    }
    if args.auto_crop {
        cfg.auto_crop = true;
    }
    if args.external_command.is_some() {
        cfg.external_command = args.external_command;
    }

    TryOnPipeline::new(cfg).generate(&args.person, &args.cloth, &args.out_dir)
}

fn read_config(path: &Path) -> DraperyResult<PipelineConfig> {
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let cfg: PipelineConfig = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse config '{}'", path.display()))?;
    Ok(cfg)
}
