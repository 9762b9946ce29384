//! weft CLI
//!
//! Runs and inspects compiled programs, optionally under the debugger.

use weft_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
