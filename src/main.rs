use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

use lexbench::config::ToolchainConfig;
use lexbench::harness::Dispatcher;
use lexbench::sink::StdioSink;

/// Run lex/yacc/C request blocks and stream the toolchain output
#[derive(Parser)]
#[command(name = "lexbench")]
#[command(about = "Interactive harness for lex/yacc/C toolchains", version)]
struct Cli {
    /// Request block files, executed in order; `-` reads one block from stdin
    #[arg(value_name = "BLOCK", required = true)]
    blocks: Vec<PathBuf>,

    /// Toolchain configuration file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Directory where sources are written and tools run
    #[arg(short = 'w', long, default_value = ".")]
    workdir: PathBuf,

    /// Remove the files created by this run before exiting
    #[arg(long)]
    clean: bool,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    // Tool output owns stdout; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_writer(std::io::stderr)
        .init();

    debug!("Started with verbosity level: {}", cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ToolchainConfig::load(path).await?,
        None => ToolchainConfig::default(),
    };

    let mut dispatcher = Dispatcher::new(config, &cli.workdir);
    let sink = StdioSink;

    for block in &cli.blocks {
        let code = read_block(block).await?;
        let reply = dispatcher.execute(&code, &sink).await;
        debug!(
            "Request {} handled ({})",
            reply.execution_count,
            block.display()
        );
    }

    if cli.clean {
        dispatcher.cleanup_files();
    }

    Ok(())
}

async fn read_block(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut code = String::new();
        tokio::io::stdin()
            .read_to_string(&mut code)
            .await
            .context("Failed to read block from stdin")?;
        return Ok(code);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read block file {}", path.display()))
}
