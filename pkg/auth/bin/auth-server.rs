use std::net::SocketAddr;
use std::sync::Arc;

use auth::{AuthService, AuthStore};
use clap::Parser;

/// Standalone binary for the external auth façade, run independently of the booking
/// cluster it's consumed by.
#[derive(Parser, Debug)]
#[command(name = "auth-server", about = "Runs the external auth façade")]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: SocketAddr,

    /// Path to the JSON file backing the user/session store.
    #[arg(long, default_value = "auth_data.json")]
    data_file: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let store = Arc::new(AuthStore::open(&args.data_file)?);
    let service = AuthService::new(store);

    auth::http::serve(args.addr, service).await?;
    Ok(())
}
