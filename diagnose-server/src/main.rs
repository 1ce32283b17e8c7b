//! Diagnosis server - streams repository deployability diagnoses over SSE.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use diagnose::io::config::load_config;
use diagnose::io::openai::OpenAiEngine;
use diagnose::io::repo::LocalPreparer;
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "diagnose-server")]
#[command(about = "Stream deployability diagnoses of local repositories")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Diagnosis config (TOML); defaults apply when the file is missing
    #[arg(long, default_value = "diagnose.toml")]
    config: PathBuf,

    /// Directory holding prepared repositories as <org>/<name>
    #[arg(long, default_value = "repos")]
    repos_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    diagnose::logging::init("diagnose_server=info,diagnose=info");

    let args = Args::parse();

    let config = load_config(&args.config)?;
    let repos_dir = args.repos_dir.canonicalize().unwrap_or(args.repos_dir);
    info!(
        repos_dir = %repos_dir.display(),
        model = %config.engine.model,
        step_ceiling = config.step_ceiling,
        "starting diagnose-server"
    );

    let engine = Arc::new(OpenAiEngine::new(&config.engine)?);
    let preparer = Arc::new(LocalPreparer::new(repos_dir));
    let state = AppState::new(config, engine, preparer)?;

    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
