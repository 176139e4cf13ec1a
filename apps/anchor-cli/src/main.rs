//! Anchor CLI
//!
//! Canonicalizes documents, anchors findings against them and renders
//! highlighted output. Results go to stdout; logs go to stderr.

use std::path::PathBuf;

use anchor_engine::AnchorEngine;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
#[cfg(test)]
mod tests;

use commands::DocumentInput;

#[derive(Parser, Debug)]
#[command(name = "anchor-cli")]
#[command(version, about = "Anchor review findings to document text")]
struct Args {
    /// Engine configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct DocumentArgs {
    /// Version id of the loaded text
    #[arg(long, default_value = "local")]
    version_id: String,

    /// Plain text file
    #[arg(long)]
    text: Option<PathBuf>,

    /// Rich (HTML) content file; takes precedence over --text
    #[arg(long)]
    rich: Option<PathBuf>,
}

impl From<DocumentArgs> for DocumentInput {
    fn from(args: DocumentArgs) -> Self {
        Self {
            version_id: args.version_id,
            text: args.text,
            rich: args.rich,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the canonical text and hash as JSON
    Canonicalize {
        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Locate findings and print the anchor report as JSON
    Anchor {
        #[command(flatten)]
        document: DocumentArgs,

        /// Findings JSON file
        #[arg(short, long)]
        findings: PathBuf,
    },
    /// Print the document as HTML with highlight markers
    Highlight {
        #[command(flatten)]
        document: DocumentArgs,

        /// Findings JSON file
        #[arg(short, long)]
        findings: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(args.config.as_deref()).await?;
    let engine = AnchorEngine::new(config);

    let output = match args.command {
        Command::Canonicalize { document } => {
            let canonical = commands::load_document(&document.into()).await?;
            commands::canonicalize(&canonical)?
        }
        Command::Anchor { document, findings } => {
            let canonical = commands::load_document(&document.into()).await?;
            let findings = commands::load_findings(&findings).await?;
            commands::anchor(&engine, &canonical, &findings)?
        }
        Command::Highlight { document, findings } => {
            let canonical = commands::load_document(&document.into()).await?;
            let findings = commands::load_findings(&findings).await?;
            commands::highlight(&engine, &canonical, &findings)
        }
    };

    println!("{}", output);
    Ok(())
}
