use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvoyError {
    // Configuration problems abort the whole invocation before dispatch.
    #[error("Cannot find a servers.json configuration file. Pass --conf or run --build.")]
    ConfigNotFound,
    #[error("Failed to read configuration file {}: {}", .path.display(), .source)]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {}: {}", .path.display(), .source)]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to write configuration file {}: {}", .path.display(), .source)]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("--add, --mod, and --delete require --name.")]
    NameRequired,
    #[error("Server entry '{0}' needs --addr.")]
    AddrRequired(String),
    #[error("Nothing to do. Pass --script, --upload, or a management flag.")]
    NothingToDo,

    // Everything below is host-local: logged under the host's tag and never
    // fatal to the batch.
    #[error("No password and no private key configured")]
    MissingCredentials,
    #[error("Failed to load private key {}: {}", .path.display(), .source)]
    Key {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },
    #[error("Failed to connect: {0}")]
    Connect(#[source] russh::Error),
    #[error("Authentication rejected for user '{user}'")]
    AuthRejected { user: String },
    #[error("Authentication failed: {0}")]
    Auth(#[source] russh::Error),
    #[error("Failed to set up remote session: {0}")]
    Session(#[source] russh::Error),
    #[error("File transfer failed: {0}")]
    Transfer(String),
}
