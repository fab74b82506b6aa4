// Command line arguments and the configuration file search.
mod config;
// The fleet document: servers, defaults, named command sequences.
mod fleet;
// Per-host credential resolution.
mod auth;
// Turning a payload into upload steps and a joined command line.
mod pipeline;
// Byte-at-a-time prompt detection in session output.
mod prompt;
// SSH connections and the interactive session driver.
mod session;
// Bounded fan-out across the fleet.
mod dispatch;
// Tagged output serialization.
mod report;
// Error handling.
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::ConvoyError;
use crate::fleet::{Fleet, Host};
use crate::report::Reporter;
use crate::session::{HostVerification, SshConnector};

/// Apply --add, --mod, --delete or --list to the configuration file.
fn manage(cli: Config, mut fleet: Fleet, path: &Path) -> Result<(), ConvoyError> {
    if cli.list {
        // Listings go to stdout so they can be piped.
        let listing = serde_json::to_string_pretty(&fleet.servers).unwrap_or_default();
        println!("{}", listing);
        return Ok(());
    }

    if cli.name.is_empty() {
        return Err(ConvoyError::NameRequired);
    }

    if cli.delete {
        fleet.remove(&cli.name);
    } else {
        let patch = Host {
            status: cli.status,
            addr: cli.addr,
            port: cli.port,
            user: cli.user,
            passwd: cli.passwd,
            key: cli.key,
        };
        fleet.upsert(&cli.name, patch)?;
    }
    fleet.save(path)
}

async fn run(cli: Config) -> Result<(), ConvoyError> {
    if cli.build {
        let path = cli
            .conf
            .clone()
            .unwrap_or_else(|| PathBuf::from("servers.json"));
        Fleet::template().save(&path)?;
        eprintln!("[convoy] wrote starter configuration to {}", path.display());
        return Ok(());
    }

    let path = config::find_config(cli.conf.as_deref()).ok_or(ConvoyError::ConfigNotFound)?;
    eprintln!("[convoy] use configuration from {}", path.display());
    let fleet = Fleet::load(&path)?;

    if cli.add || cli.modify || cli.delete || cli.list {
        return manage(cli, fleet, &path);
    }

    if cli.script.is_none() && cli.upload.is_empty() {
        return Err(ConvoyError::NothingToDo);
    }

    let (reporter, printer) = Reporter::start();
    let verify = if cli.verify_host_keys {
        HostVerification::KnownHosts
    } else {
        HostVerification::TrustAll
    };
    let connector = Arc::new(SshConnector::new(verify));
    let mut dispatcher = Dispatcher::new(fleet, connector, reporter.clone());
    if let Some(limit) = cli.limit {
        dispatcher = dispatcher.with_limit(limit);
    }

    if !cli.upload.is_empty() {
        dispatcher
            .send_files(&cli.server, &cli.upload, cli.dest.as_deref())
            .await;
    }
    if let Some(script) = &cli.script {
        dispatcher.run_command(&cli.server, script).await;
    }

    // Dropping every sender lets the printer drain and stop.
    drop(dispatcher);
    drop(reporter);
    let _ = printer.await;

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Config::parse();
    if let Err(e) = run(cli).await {
        eprintln!("[convoy] {}", e);
        std::process::exit(1);
    }
}
