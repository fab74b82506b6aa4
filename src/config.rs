//! Command line surface for convoy.
//!
//! Everything here is plain argument plumbing plus the configuration
//! file search. The engine gets handed parsed values and never looks
//! at the CLI again.

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Parser)]
#[command(version, author, about = "Run commands and push files across a small SSH fleet.")]
pub struct Config {
    /// Configuration file to use. Searched for if not given.
    #[arg(long = "conf", short = 'f')]
    pub conf: Option<PathBuf>,

    /// What to run: a sequence name from the configuration, a local
    /// script file, or a literal shell command.
    #[arg(long = "script", short = 'c')]
    pub script: Option<String>,

    /// Server to target; repeat for several. Defaults to every server.
    #[arg(long = "server", short = 's')]
    pub server: Vec<String>,

    /// Write a starter configuration file and exit.
    #[arg(long, short)]
    pub build: bool,

    /// Local file to upload; repeat for several.
    #[arg(long = "upload", short = 'u')]
    pub upload: Vec<PathBuf>,

    /// Remote directory for uploads. Defaults to the login user's home.
    #[arg(long)]
    pub dest: Option<String>,

    /// Add a server entry (needs --name and --addr).
    #[arg(long, short)]
    pub add: bool,

    /// Modify a server entry (needs --name).
    #[arg(long = "mod", short = 'm')]
    pub modify: bool,

    /// Delete a server entry (needs --name).
    #[arg(long, short)]
    pub delete: bool,

    /// Print every configured server as JSON.
    #[arg(long, short)]
    pub list: bool,

    /// Server name for --add, --mod and --delete.
    #[arg(long, default_value = "")]
    pub name: String,

    /// Server address, an IP or a hostname.
    #[arg(long, default_value = "")]
    pub addr: String,

    /// SSH port. Defaults to 22.
    #[arg(long, default_value = "")]
    pub port: String,

    /// Login user name.
    #[arg(long, default_value = "")]
    pub user: String,

    /// Login password. Empty falls back to the fleet password, then to
    /// key authentication.
    #[arg(long, default_value = "")]
    pub passwd: String,

    /// Private key path for key authentication.
    #[arg(long, default_value = "")]
    pub key: String,

    /// Server status. "shutdown" excludes it from every dispatch.
    #[arg(long, default_value = "")]
    pub status: String,

    /// Check server keys against ~/.ssh/known_hosts instead of trusting
    /// every host.
    #[arg(long)]
    pub verify_host_keys: bool,

    /// How many hosts to drive at once. Defaults to the CPU count.
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Where the configuration may live, in lookup order: the explicit
/// `--conf` path, `servers.json` in the working directory, a dotfile in
/// the home directory, and `servers.json` next to the executable.
fn candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    paths.push(PathBuf::from("servers.json"));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".convoy_servers.json"));
    }
    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join("servers.json"));
    }
    paths
}

/// Find the first existing configuration file.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    candidates(explicit).into_iter().find(|path| path.is_file())
}
