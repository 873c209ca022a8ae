pub mod archive;
pub mod download;

use clap::{Parser, Subcommand};

/// Version string shown by `--version`, including the commit the binary was
/// built from.
pub fn version() -> String {
    format!("{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_COMMIT"))
}

#[derive(Debug, Parser)]
#[command(name = "torii")]
#[command(version = version())]
#[command(about = "Download and archive episodes from a streaming catalog")]
pub struct Cli {
    /// Proxy url routing all catalog and media traffic.
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Download(download::Download),
    Archive(archive::Archive),
}

impl Command {
    /// The worker-count override of the invoked subcommand.
    pub fn parallelism(&self) -> Option<usize> {
        match self {
            Command::Download(cmd) => cmd.parallelism,
            Command::Archive(cmd) => cmd.parallelism,
        }
    }
}

pub(crate) fn clap_parse_resolution(
    s: &str,
) -> Result<crate::hls::select::ResolutionFilter, String> {
    s.parse()
}
