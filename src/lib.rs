//! Convoy: run commands and push files across a small SSH fleet.

// Command line arguments and the configuration file search.
pub mod config;
// The fleet document: servers, defaults, named command sequences.
pub mod fleet;
// Per-host credential resolution.
pub mod auth;
// Turning a payload into upload steps and a joined command line.
pub mod pipeline;
// Byte-at-a-time prompt detection in session output.
pub mod prompt;
// SSH connections and the interactive session driver.
pub mod session;
// Bounded fan-out across the fleet.
pub mod dispatch;
// Tagged output serialization.
pub mod report;
// Error handling.
pub mod error;

pub use auth::{resolve, AuthMethod, Identity};
pub use config::{find_config, Config};
pub use dispatch::{DispatchSummary, Dispatcher};
pub use error::ConvoyError;
pub use fleet::{Fleet, FleetDefaults, Host, STATUS_SHUTDOWN};
pub use pipeline::{command_steps, join_command, valid_files, Step};
pub use prompt::{Action, PromptScanner};
pub use report::{HostReporter, Reporter};
pub use session::{Connection, Connector, HostVerification, SshConnector};
