use clap::Parser;
use wuppieaudit::configuration::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Scan { .. } => wuppieaudit::scan::scan(),
    }
}
