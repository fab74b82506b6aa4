//! Host-tagged output reporting.
//!
//! Workers run concurrently but lines must never splice mid-line, so all
//! reporting funnels through one flume channel into a single printer task.
//! Remote output goes to stdout tagged `[addr:port] user:`; connection
//! notices, skip notices, failures, and the batch summary go to stderr.
//! The printer exits once every sender has been dropped.

use colored::{ColoredString, Colorize};
use colourado::Color;
use tokio::task::JoinHandle;

use crate::fleet::Host;

#[derive(Debug)]
enum Report {
    Line { tag: ColoredString, text: String },
    Notice { tag: ColoredString, text: String },
    Skip { name: String },
    Unknown { name: String },
    Failure { name: String, message: String },
    Summary { completed: usize, failed: usize, skipped: usize },
}

/// Cloneable handle to the printer task.
#[derive(Clone)]
pub struct Reporter {
    tx: flume::Sender<Report>,
}

impl Reporter {
    /// Start the printer task. It runs until every `Reporter` and every
    /// `HostReporter` derived from one has been dropped.
    pub fn start() -> (Self, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();
        let printer = tokio::spawn(async move {
            while let Ok(report) = rx.recv_async().await {
                match report {
                    Report::Line { tag, text } => println!("{} {}", tag, text),
                    Report::Notice { tag, text } => eprintln!("{} {}", tag, text),
                    Report::Skip { name } => {
                        eprintln!("[convoy] server [{}] configured to shutdown", name)
                    }
                    Report::Unknown { name } => {
                        eprintln!("[convoy] no server named [{}] in the fleet", name)
                    }
                    Report::Failure { name, message } => {
                        eprintln!("[convoy] [{}] {}", name, message)
                    }
                    Report::Summary {
                        completed,
                        failed,
                        skipped,
                    } => eprintln!(
                        "[convoy] done: {} succeeded, {} failed, {} skipped",
                        completed, failed, skipped
                    ),
                }
            }
        });
        (Self { tx }, printer)
    }

    /// Per-host handle carrying the colored `[addr:port] user:` tag.
    pub fn host(&self, name: &str, host: &Host, user: &str, color: Color) -> HostReporter {
        let r = (color.red * 256.0) as u8;
        let g = (color.green * 256.0) as u8;
        let b = (color.blue * 256.0) as u8;
        let tag = format!(
            "[{}:{}] {}:",
            host.addr.trim(),
            host.effective_port(),
            user
        )
        .truecolor(r, g, b);
        HostReporter {
            name: name.to_string(),
            tag,
            tx: self.tx.clone(),
        }
    }

    pub fn skip(&self, name: &str) {
        let _ = self.tx.send(Report::Skip {
            name: name.to_string(),
        });
    }

    pub fn unknown(&self, name: &str) {
        let _ = self.tx.send(Report::Unknown {
            name: name.to_string(),
        });
    }

    /// Failure notice for a host that never got far enough to have a tag.
    pub fn failure(&self, name: &str, message: &str) {
        let _ = self.tx.send(Report::Failure {
            name: name.to_string(),
            message: message.to_string(),
        });
    }

    pub fn summary(&self, completed: usize, failed: usize, skipped: usize) {
        let _ = self.tx.send(Report::Summary {
            completed,
            failed,
            skipped,
        });
    }
}

/// Reporting handle owned by one host's worker.
#[derive(Clone)]
pub struct HostReporter {
    name: String,
    tag: ColoredString,
    tx: flume::Sender<Report>,
}

impl HostReporter {
    /// One line of remote output.
    pub fn line(&self, text: &str) {
        let _ = self.tx.send(Report::Line {
            tag: self.tag.clone(),
            text: text.to_string(),
        });
    }

    /// Host-level status, e.g. connection established or a file delivered.
    pub fn notice(&self, text: &str) {
        let _ = self.tx.send(Report::Notice {
            tag: self.tag.clone(),
            text: text.to_string(),
        });
    }

    pub fn failure(&self, message: &str) {
        let _ = self.tx.send(Report::Failure {
            name: self.name.clone(),
            message: message.to_string(),
        });
    }
}
