use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use deskpilot::agent_engine::OneShotPredictor;
use deskpilot::config::load_config;
use deskpilot::errors::DeskPilotResult;
use deskpilot::perception::Screenshot;
use deskpilot::protocol::{action, parse_response};

/// DeskPilot -- next-action prediction for screenshot-driven desktop agents.
#[derive(Parser, Debug)]
#[command(name = "deskpilot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Predict the next action for a screenshot
    Predict {
        /// Task instruction given to the agent
        #[arg(long)]
        instruction: String,

        /// Path to the screenshot (PNG or JPEG)
        #[arg(long)]
        screenshot: PathBuf,

        /// Config file (defaults to config.toml next to the binary, then the working directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Parse a raw model reply and print the normalized action
    Parse {
        /// File holding the reply; reads stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    deskpilot::init_tracing("info");

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Predict {
            instruction,
            screenshot,
            config,
        } => predict(&instruction, &screenshot, config.as_deref()).await,
        Commands::Parse { file } => parse(file.as_deref()),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn predict(instruction: &str, screenshot: &Path, config: Option<&Path>) -> DeskPilotResult<()> {
    let (cfg, cfg_path) = load_config(config)?;

    let predictor = OneShotPredictor::from_config(&cfg, cfg_path.parent())?;
    let prediction = predictor.predict(instruction, &Screenshot::load(screenshot)?).await?;

    let out = serde_json::json!({
        "reasoning": prediction.reasoning,
        "action": prediction.action,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn parse(file: Option<&Path>) -> DeskPilotResult<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let parsed = parse_response(&raw);
    let action = action::validate(parsed.require_action()?)?;
    let out = serde_json::json!({
        "reasoning": parsed.reasoning,
        "action": action,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
