//! Credential resolution: merging server-entry identity fields over fleet
//! defaults into the method actually used to authenticate.

use std::path::PathBuf;
use std::sync::Arc;

use russh::keys::{load_secret_key, PrivateKey};

use crate::error::ConvoyError;
use crate::fleet::{pick, FleetDefaults, Host};

/// How a worker authenticates. A non-empty effective password always wins;
/// otherwise the effective key path is loaded up front, so a bad key file
/// fails the host before anything is dialed.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Password(String),
    Key(Arc<PrivateKey>),
}

/// The effective identity for one host after override/default resolution.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: String,
    pub method: AuthMethod,
}

impl Identity {
    /// What gets typed into a privilege-escalation prompt. Empty under key
    /// auth, in which case the driver writes a bare newline.
    pub fn sudo_password(&self) -> &str {
        match &self.method {
            AuthMethod::Password(password) => password,
            AuthMethod::Key(_) => "",
        }
    }
}

/// Resolve the effective identity for `host`. Each field falls back from
/// the server entry to the fleet default to empty.
pub fn resolve(host: &Host, defaults: &FleetDefaults) -> Result<Identity, ConvoyError> {
    let user = pick(&host.user, &defaults.user).to_string();

    let passwd = pick(&host.passwd, &defaults.passwd);
    if !passwd.is_empty() {
        return Ok(Identity {
            user,
            method: AuthMethod::Password(passwd.to_string()),
        });
    }

    let key_path = pick(&host.key, &defaults.key);
    if key_path.is_empty() {
        return Err(ConvoyError::MissingCredentials);
    }
    let key = load_secret_key(key_path, None).map_err(|source| ConvoyError::Key {
        path: PathBuf::from(key_path),
        source,
    })?;
    Ok(Identity {
        user,
        method: AuthMethod::Key(Arc::new(key)),
    })
}
