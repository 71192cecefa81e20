use clap::Parser;

use span_translator::cli::{self, Args};

#[tokio::main]
async fn main() {
    span_translator::init_tracing();
    let args = Args::parse();
    if let Err(e) = cli::run(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
