use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use payment::{PaymentService, TransactionStore};

/// Standalone binary for the external payment façade.
#[derive(Parser, Debug)]
#[command(name = "payment-server", about = "Runs the external payment façade")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:6000")]
    addr: SocketAddr,

    #[arg(long, default_value = "payment_data.json")]
    data_file: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let store = Arc::new(TransactionStore::open(&args.data_file)?);
    let service = PaymentService::new(store);

    payment::http::serve(args.addr, service).await?;
    Ok(())
}
