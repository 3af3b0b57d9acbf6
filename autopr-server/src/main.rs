//! autopr trigger server - starts pipeline runs over HTTP and streams their
//! progress as NDJSON.

mod routes;
mod state;
mod stream;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use autopr::io::config::{DEFAULT_CONFIG_FILE, load_config};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "autopr-server")]
#[command(about = "HTTP trigger interface for autopr runs")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3001")]
    port: u16,

    /// Config file; defaults apply if it does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autopr_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    // Blocking HTTP clients must be created and dropped outside the runtime.
    let state = AppState::from_config(&config)?;
    info!(
        config = %args.config.display(),
        ollama = %config.ollama.base_url,
        "starting autopr-server"
    );

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let app = routes::app(state.clone());
    runtime.block_on(async move {
        info!(addr = %addr, "listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        anyhow::Ok(())
    })?;
    drop(runtime);
    drop(state);

    Ok(())
}
