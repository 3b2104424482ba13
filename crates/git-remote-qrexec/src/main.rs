mod fetch;
mod helper;

use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use fetch::Remote;
use qgit_transport::RemoteSpec;

/// Remote helper invoked by git for qrexec:// URLs.
///
/// git passes the remote name and the URL; for URL-only remotes both
/// arguments are the URL and the second may be omitted.
#[derive(Parser)]
#[command(
    name = "git-remote-qrexec",
    about = "Fetch signed git tags from a qrexec peer",
    version
)]
struct Cli {
    /// Remote name, or the URL for an anonymous remote
    remote: String,

    /// Remote URL
    url: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("fatal: {e:#}");
        process::exit(128);
    }
}

fn run(cli: Cli) -> Result<()> {
    let url = cli.url.as_deref().unwrap_or(&cli.remote);
    let spec = RemoteSpec::parse(url)?;

    let git_dir = std::env::var_os("GIT_DIR")
        .map(PathBuf::from)
        .context("GIT_DIR is not set")?;

    let mut remote = Remote::new(spec, &git_dir)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    helper::drive(&mut remote, stdin.lock(), stdout.lock())
}
