//! `vigil-mcp` -- rule authoring over the Model Context Protocol.
//!
//! With no subcommand, serves MCP over stdio. `generate` and `describe`
//! run a single request and print the result; `config` stores API settings.
//!
//! # Environment variables
//!
//! | Variable          | Default                 | Description                          |
//! |-------------------|-------------------------|--------------------------------------|
//! | `GEMINI_API_KEY`  | --                      | API key (`API_KEY` is also accepted) |
//! | `VIGIL_MODEL`     | `gemini-2.5-flash`      | Model identifier                     |
//! | `VIGIL_API_BASE`  | Google endpoint         | Endpoint root, e.g. a proxy          |
//! | `RUST_LOG`        | `vigil_*=info`          | Log filter (logs go to stderr)       |

mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vigil_core::{RuleDocument, RuleLibrary};
use vigil_rulegen::{ImagePayload, RuleGenerationRequest, RuleGenerator};

#[derive(Parser, Debug)]
#[command(name = "vigil-mcp", version, about = "Natural-language monitoring rule authoring")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP over stdio (default)
    Serve,
    /// Generate a standard rule definition and print it
    Generate {
        /// Monitoring intent in natural language
        #[arg(short, long, default_value = "")]
        intent: String,
        /// Reference image showing a positive example
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Describe hazards in a single surveillance frame
    Describe {
        /// JPEG frame
        image: PathBuf,
    },
    /// Store API settings in ~/.vigil/settings.json
    Config {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // stdout carries the MCP transport; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_mcp=info,vigil_rulegen=info,vigil_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = vigil_core::load_settings();
    if !vigil_core::ai_configured(&settings) {
        tracing::warn!("no API key configured; generation requests will fail");
    }

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(model = %settings.model, "starting vigil-mcp v{}", env!("CARGO_PKG_VERSION"));
            let server = server::VigilServer::new(RuleGenerator::new(&settings), RuleLibrary::seeded());
            let service = server
                .serve(rmcp::transport::io::stdio())
                .await
                .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
            service.waiting().await?;
        }
        Command::Generate { intent, image } => {
            let mut request = RuleGenerationRequest::text(intent);
            if let Some(path) = image {
                request = request.with_image(ImagePayload::from_path(&path)?);
            }
            if !request.is_issuable() {
                return Err("provide --intent, --image, or both".into());
            }
            let text = RuleGenerator::new(&settings).generate_or_fallback(&request).await;
            println!("{}", RuleDocument::parse(&text).display_text());
        }
        Command::Describe { image } => {
            let frame = ImagePayload::from_path(&image)?.require_jpeg()?;
            let text = RuleGenerator::new(&settings)
                .describe_frame_or_fallback(&frame.data)
                .await;
            println!("{text}");
        }
        Command::Config {
            api_key,
            model,
            base_url,
        } => {
            let mut stored = vigil_core::read_settings();
            if let Some(key) = api_key {
                stored.api_key = key;
            }
            if let Some(model) = model {
                stored.model = model;
            }
            if let Some(base) = base_url {
                stored.base_url = Some(base).filter(|b| !b.trim().is_empty());
            }
            vigil_core::write_settings(&stored)?;
            eprintln!(
                "Wrote {}",
                vigil_core::vigil_dir().join("settings.json").display()
            );
        }
    }

    Ok(())
}
