use clap::ValueHint;

use std::path::PathBuf;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// By default, calsplit looks for a file named `calsplit.toml` in the
    /// following directories (in order):
    ///
    /// - `./` (the current directory)
    /// - `/etc`
    #[arg(
        short,
        env = "CALSPLIT_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    /// API server address to bind to.
    #[arg(long, env = "CALSPLIT_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Path to the database file.
    #[arg(long, env = "CALSPLIT_DB", value_hint(ValueHint::FilePath))]
    pub db_path: Option<PathBuf>,

    /// Path to the feed list file.
    #[arg(long, env = "CALSPLIT_FEEDS", value_hint(ValueHint::FilePath))]
    pub feeds_path: Option<PathBuf>,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
