use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use fdpsola::args::{Cli, Commands};
use fdpsola::config::PsolaConfig;
use fdpsola::pipeline;
use fdpsola::pitch::PitchContour;
use std::path::PathBuf;
use std::process;

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(explicit: Option<&str>) -> Result<PsolaConfig> {
    let path = match explicit {
        Some(path) => Some(PathBuf::from(path)),
        None => ProjectDirs::from("org", "fdpsola", "fdpsola")
            .map(|dirs| dirs.config_dir().join("config.kdl"))
            .filter(|path| path.exists()),
    };

    match path {
        Some(path) => {
            log::info!("Loading config from {}", path.display());
            PsolaConfig::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))
        }
        None => {
            log::debug!("No config file found, using defaults");
            Ok(PsolaConfig::default())
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        match command {
            Commands::Contour { input, output } => {
                let text = std::fs::read_to_string(&input)
                    .with_context(|| format!("Failed to read pitch contour: {}", input))?;
                let contour = PitchContour::parse_text(&text)
                    .with_context(|| format!("Failed to parse pitch contour: {}", input))?;
                contour
                    .save(&output)
                    .with_context(|| format!("Failed to write pitch contour: {}", output))?;
                println!("Converted {} F0 frames to {}", contour.f0s.len(), output);
            }
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let args = cli
        .to_synthesis_args()
        .context("No subcommand provided and synthesis arguments are incomplete")?;

    pipeline::synthesize(&args, &config).context("Failed to synthesize audio")?;

    Ok(())
}
