use std::path::PathBuf;
use std::sync::Arc;

use colourado::{Color, ColorPalette, PaletteType};
use futures::future::join_all;
use itertools::Itertools;
use tokio::sync::Semaphore;

use crate::auth;
use crate::fleet::{Fleet, Host};
use crate::pipeline::{self, Step};
use crate::report::{HostReporter, Reporter};
use crate::session::{Connection, Connector};

/// Counts for one dispatch round. `completed + failed` is the number of
/// hosts a worker ran for; skipped hosts never get a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Fans one piece of work out across the fleet and waits for every host
/// to finish. Hosts run concurrently up to `limit`; a worker holds its
/// slot from credential resolution until its connection closes.
pub struct Dispatcher {
    fleet: Arc<Fleet>,
    connector: Arc<dyn Connector>,
    reporter: Reporter,
    limit: usize,
}

impl Dispatcher {
    pub fn new(fleet: Fleet, connector: Arc<dyn Connector>, reporter: Reporter) -> Self {
        let limit = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            fleet: Arc::new(fleet),
            connector,
            reporter,
            limit,
        }
    }

    /// Cap the number of hosts driven at once.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Resolve `selection` against the fleet, report names that match
    /// nothing, and split off shutdown hosts with a notice each.
    fn targets(&self, selection: &[String]) -> (Vec<(String, Host)>, usize) {
        let (targets, unknown) = self.fleet.select(selection);
        for name in unknown {
            self.reporter.unknown(&name);
        }

        let mut skipped = 0;
        let mut active = Vec::new();
        for (name, host) in targets {
            if host.is_shutdown() {
                self.reporter.skip(name);
                skipped += 1;
            } else {
                active.push((name.clone(), host.clone()));
            }
        }
        (active, skipped)
    }

    /// Run `payload` (a sequence name or a literal command) on every
    /// selected host and wait for all of them.
    pub async fn run_command(&self, selection: &[String], payload: &str) -> DispatchSummary {
        let (active, skipped) = self.targets(selection);
        let steps = pipeline::command_steps(payload, &self.fleet.defaults.commands);
        let palette = ColorPalette::new(active.len() as u32, PaletteType::Pastel, false);
        let semaphore = Arc::new(Semaphore::new(self.limit));

        let mut workers = Vec::with_capacity(active.len());
        for ((name, host), color) in active.into_iter().zip(palette.colors.into_iter()) {
            let fleet = Arc::clone(&self.fleet);
            let connector = Arc::clone(&self.connector);
            let reporter = self.reporter.clone();
            let steps = steps.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.push(tokio::spawn(async move {
                let _slot = semaphore.acquire_owned().await.expect("Semaphore closed.");
                run_host(
                    &name,
                    &host,
                    &fleet,
                    connector.as_ref(),
                    &reporter,
                    color,
                    &steps,
                )
                .await
            }));
        }

        self.finish(workers, skipped).await
    }

    /// Upload `files` to every selected host, into `dest` if given and
    /// the user's home directory otherwise.
    pub async fn send_files(
        &self,
        selection: &[String],
        files: &[PathBuf],
        dest: Option<&str>,
    ) -> DispatchSummary {
        let (active, skipped) = self.targets(selection);

        // Deduped by base name; sorted so every host uploads in the
        // same order.
        let files: Vec<(String, PathBuf)> = pipeline::valid_files(files)
            .into_iter()
            .sorted()
            .collect();
        let dest = dest
            .map(|d| d.trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|d| !d.is_empty());

        let palette = ColorPalette::new(active.len() as u32, PaletteType::Pastel, false);
        let semaphore = Arc::new(Semaphore::new(self.limit));

        let mut workers = Vec::with_capacity(active.len());
        for ((name, host), color) in active.into_iter().zip(palette.colors.into_iter()) {
            let fleet = Arc::clone(&self.fleet);
            let connector = Arc::clone(&self.connector);
            let reporter = self.reporter.clone();
            let files = files.clone();
            let dest = dest.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.push(tokio::spawn(async move {
                let _slot = semaphore.acquire_owned().await.expect("Semaphore closed.");
                send_host(
                    &name,
                    &host,
                    &fleet,
                    connector.as_ref(),
                    &reporter,
                    color,
                    &files,
                    dest.as_deref(),
                )
                .await
            }));
        }

        self.finish(workers, skipped).await
    }

    /// Join every worker, tally the round, and emit the summary notice.
    async fn finish(
        &self,
        workers: Vec<tokio::task::JoinHandle<bool>>,
        skipped: usize,
    ) -> DispatchSummary {
        let mut completed = 0;
        let mut failed = 0;
        for outcome in join_all(workers).await {
            match outcome {
                Ok(true) => completed += 1,
                _ => failed += 1,
            }
        }

        let summary = DispatchSummary {
            completed,
            failed,
            skipped,
        };
        self.reporter
            .summary(summary.completed, summary.failed, summary.skipped);
        summary
    }
}

/// Resolve credentials and connect, reporting whichever step fails.
async fn open_connection(
    name: &str,
    host: &Host,
    fleet: &Fleet,
    connector: &dyn Connector,
    reporter: &Reporter,
    color: Color,
) -> Option<(Box<dyn Connection>, HostReporter)> {
    let identity = match auth::resolve(host, &fleet.defaults) {
        Ok(identity) => identity,
        Err(e) => {
            reporter.failure(name, &e.to_string());
            return None;
        }
    };

    let host_reporter = reporter.host(name, host, &identity.user, color);
    match connector
        .connect(name, host, &identity, host_reporter.clone())
        .await
    {
        Ok(connection) => Some((connection, host_reporter)),
        Err(e) => {
            host_reporter.failure(&e.to_string());
            None
        }
    }
}

async fn run_host(
    name: &str,
    host: &Host,
    fleet: &Fleet,
    connector: &dyn Connector,
    reporter: &Reporter,
    color: Color,
    steps: &[Step],
) -> bool {
    let Some((connection, host_reporter)) =
        open_connection(name, host, fleet, connector, reporter, color).await
    else {
        return false;
    };

    let mut entries = Vec::with_capacity(steps.len());
    for step in steps {
        match step {
            Step::Run(entry) => entries.push(entry.clone()),
            Step::Upload {
                local,
                remote,
                invoke,
            } => match connection.upload(local, remote).await {
                Ok(()) => entries.push(invoke.clone()),
                // A failed upload drops its entry; the rest still run.
                Err(e) => host_reporter.failure(&e.to_string()),
            },
        }
    }

    let line = pipeline::join_command(name, &entries);
    let result = connection.run(&line).await;
    connection.close().await;

    match result {
        Ok(()) => true,
        Err(e) => {
            host_reporter.failure(&e.to_string());
            false
        }
    }
}

async fn send_host(
    name: &str,
    host: &Host,
    fleet: &Fleet,
    connector: &dyn Connector,
    reporter: &Reporter,
    color: Color,
    files: &[(String, PathBuf)],
    dest: Option<&str>,
) -> bool {
    let Some((connection, host_reporter)) =
        open_connection(name, host, fleet, connector, reporter, color).await
    else {
        return false;
    };

    // The destination directory is created up front with ownership handed
    // to the login user, so the per-file transfers need no privileges.
    let mut prefix = String::new();
    if let Some(dir) = dest {
        let prepare = format!(
            "sudo mkdir -p {} && sudo chown `whoami`:`whoami` {}",
            dir, dir
        );
        if let Err(e) = connection.run(&prepare).await {
            host_reporter.failure(&e.to_string());
            connection.close().await;
            return false;
        }
        prefix = if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{}/", dir)
        };
    }

    let mut ok = true;
    for (base, local) in files {
        let remote = format!("{}{}", prefix, base);
        match connection.upload(local, &remote).await {
            Ok(()) => host_reporter.notice(&format!("send file ({}) success !", local.display())),
            Err(e) => {
                host_reporter.failure(&e.to_string());
                ok = false;
            }
        }
    }

    connection.close().await;
    ok
}
