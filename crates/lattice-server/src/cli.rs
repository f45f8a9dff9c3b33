use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "lattice-server", about = "Lattice cross-community relay")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/lattice.toml")]
    pub config: String,
}
