//! Building command pipelines.
//!
//! A requested payload resolves to an ordered list of steps. Entries that
//! name existing regular local files become upload-then-invoke steps;
//! everything else passes through as a literal shell fragment. Nothing here
//! touches the network: upload steps are data, acted on by the worker that
//! owns the connection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One stage of a host's command pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Literal shell fragment, passed through verbatim.
    Run(String),
    /// Local file staged for upload under its base name, then invoked
    /// remotely by that name. If the upload fails, the whole step is
    /// dropped so the host never invokes a file that is not there.
    Upload {
        local: PathBuf,
        remote: String,
        invoke: String,
    },
}

/// Resolve `payload` against the fleet's named command sequences, then
/// substitute upload steps for entries naming existing local files.
pub fn command_steps(payload: &str, commands: &HashMap<String, Vec<String>>) -> Vec<Step> {
    let entries = match commands.get(payload) {
        Some(sequence) => sequence.clone(),
        None => vec![payload.to_string()],
    };
    entries.into_iter().map(into_step).collect()
}

fn into_step(entry: String) -> Step {
    let path = Path::new(&entry);
    if path.is_file() {
        if let Some(name) = path.file_name() {
            let remote = name.to_string_lossy().into_owned();
            return Step::Upload {
                invoke: format!("bash {}", remote),
                local: path.to_path_buf(),
                remote,
            };
        }
    }
    Step::Run(entry)
}

/// The single shell line a host executes: the fleet member's name exported
/// first, then the surviving entries chained with a short-circuit separator
/// so a failing stage aborts the rest for that host only.
pub fn join_command(server_name: &str, entries: &[String]) -> String {
    format!("export SERVER_NAME={}; {}", server_name, entries.join(" && "))
}

/// Filter an explicit upload request down to existing regular files, keyed
/// by base name. Duplicate base names collapse to the last occurrence.
pub fn valid_files(files: &[PathBuf]) -> HashMap<String, PathBuf> {
    let mut out = HashMap::new();
    for path in files {
        if path.is_file() {
            if let Some(name) = path.file_name() {
                out.insert(name.to_string_lossy().into_owned(), path.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn literal_payload_passes_through() {
        let steps = command_steps("uptime", &HashMap::new());
        assert_eq!(steps, vec![Step::Run("uptime".to_string())]);
    }

    #[test]
    fn named_sequence_substitutes_in_order() {
        let mut commands = HashMap::new();
        commands.insert(
            "test".to_string(),
            vec!["echo hello".to_string(), "uptime".to_string()],
        );
        let steps = command_steps("test", &commands);
        assert_eq!(
            steps,
            vec![
                Step::Run("echo hello".to_string()),
                Step::Run("uptime".to_string()),
            ]
        );
    }

    #[test]
    fn file_entry_becomes_upload_step() {
        let mut script = tempfile::NamedTempFile::new().unwrap();
        script.write_all(b"echo hi\n").unwrap();
        let path = script.path().to_str().unwrap().to_string();
        let base = script.path().file_name().unwrap().to_str().unwrap();

        let steps = command_steps(&path, &HashMap::new());
        assert_eq!(steps.len(), 1);
        match &steps[0] {
            Step::Upload {
                local,
                remote,
                invoke,
            } => {
                assert_eq!(local.to_str().unwrap(), path);
                assert_eq!(remote, base);
                assert_eq!(invoke, &format!("bash {}", base));
            }
            Step::Run(_) => panic!("expected an upload step"),
        }
    }

    #[test]
    fn named_sequence_mixes_files_and_literals() {
        let mut script = tempfile::NamedTempFile::new().unwrap();
        script.write_all(b"echo hi\n").unwrap();
        let path = script.path().to_str().unwrap().to_string();

        let mut commands = HashMap::new();
        commands.insert(
            "deploy".to_string(),
            vec![path, "echo done".to_string()],
        );
        let steps = command_steps("deploy", &commands);
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0], Step::Upload { .. }));
        assert_eq!(steps[1], Step::Run("echo done".to_string()));
    }

    #[test]
    fn directory_entry_stays_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        let steps = command_steps(&path, &HashMap::new());
        assert_eq!(steps, vec![Step::Run(path)]);
    }

    #[test]
    fn join_exports_server_name_and_chains_entries() {
        assert_eq!(
            join_command("web1", &["uptime".to_string()]),
            "export SERVER_NAME=web1; uptime"
        );
        assert_eq!(
            join_command("web1", &["a".to_string(), "b".to_string()]),
            "export SERVER_NAME=web1; a && b"
        );
    }

    #[test]
    fn valid_files_drops_missing_paths_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("deploy.sh");
        std::fs::write(&real, "echo hi\n").unwrap();

        let files = vec![
            real.clone(),
            dir.path().join("missing.sh"),
            dir.path().to_path_buf(),
        ];
        let valid = valid_files(&files);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid["deploy.sh"], real);
    }

    #[test]
    fn valid_files_dedups_by_base_name() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = dir_a.path().join("same.txt");
        let b = dir_b.path().join("same.txt");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let valid = valid_files(&[a, b.clone()]);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid["same.txt"], b);
    }
}
