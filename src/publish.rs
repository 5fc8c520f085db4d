//! Atomic Publisher: stages a full generation of zone files and the
//! server-config fragment, then swaps it into place with a single rename
//! so the DNS backend never observes a half-written generation. Modeled on
//! the Kubernetes ConfigMap volume convention of an atomically-swapped
//! `..data` symlink.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use slog::{error, info, warn, Logger};

use crate::error::GslbError;
use crate::synth::SynthesisOutput;

const COREFILE_NAME: &str = "Corefile";
const DATA_LINK: &str = "..data";
const DATA_LINK_TMP: &str = "..data_tmp";

pub struct Publisher {
    config_dir: PathBuf,
    dns_pid_file: Option<PathBuf>,
    log: Logger,
    generation: u64,
    last_hash: Option<[u8; 32]>,
}

impl Publisher {
    pub fn new(config_dir: PathBuf, dns_pid_file: Option<PathBuf>, log: Logger) -> Self {
        Self {
            config_dir,
            dns_pid_file,
            log,
            generation: 0,
            last_hash: None,
        }
    }

    /// The generation number of the most recently published (or attempted)
    /// bundle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stages and, if the bundle's content changed, swaps in a new
    /// generation. Returns whether a new generation was actually published.
    pub fn publish(&mut self, output: &SynthesisOutput) -> Result<bool, GslbError> {
        let hash = bundle_hash(output);
        if self.last_hash == Some(hash) {
            return Ok(false);
        }

        self.generation += 1;
        let generation_name = format!("gen-{}", self.generation);
        let generation_dir = self.config_dir.join(&generation_name);

        self.stage(&generation_dir, output)?;
        self.swap_in(&generation_name)?;
        self.last_hash = Some(hash);
        self.reload_dns();
        self.prune_stale(&generation_name)?;

        info!(self.log, "published new generation";
            "generation" => &generation_name, "zones" => output.zone_files.len());
        Ok(true)
    }

    fn stage(&self, generation_dir: &Path, output: &SynthesisOutput) -> Result<(), GslbError> {
        fs::create_dir_all(generation_dir).map_err(|e| GslbError::Publish {
            generation: self.generation,
            reason: format!("failed to create generation directory: {e}"),
        })?;

        for (name, contents) in &output.zone_files {
            write_and_sync(&generation_dir.join(name), contents).map_err(|e| GslbError::Publish {
                generation: self.generation,
                reason: format!("failed to stage zone file {name}: {e}"),
            })?;
        }
        write_and_sync(&generation_dir.join(COREFILE_NAME), &output.corefile).map_err(|e| {
            GslbError::Publish {
                generation: self.generation,
                reason: format!("failed to stage {COREFILE_NAME}: {e}"),
            }
        })?;

        sync_dir(generation_dir).map_err(|e| GslbError::Publish {
            generation: self.generation,
            reason: format!("failed to fsync generation directory: {e}"),
        })?;
        Ok(())
    }

    /// Points `..data` at the new generation by creating a fresh symlink
    /// under a temporary name and renaming it over the live one — `rename`
    /// is atomic within the same directory, so readers never see a
    /// dangling or partially-updated target.
    fn swap_in(&self, generation_name: &str) -> Result<(), GslbError> {
        let tmp_link = self.config_dir.join(DATA_LINK_TMP);
        let _ = fs::remove_file(&tmp_link);
        symlink(generation_name, &tmp_link).map_err(|e| GslbError::Publish {
            generation: self.generation,
            reason: format!("failed to create staging symlink: {e}"),
        })?;
        fs::rename(&tmp_link, self.config_dir.join(DATA_LINK)).map_err(|e| GslbError::Publish {
            generation: self.generation,
            reason: format!("failed to swap in new generation: {e}"),
        })?;
        sync_dir(&self.config_dir).map_err(|e| GslbError::Publish {
            generation: self.generation,
            reason: format!("failed to fsync config directory after swap: {e}"),
        })
    }

    /// Removes every `gen-*` directory except the one just published.
    /// Best-effort: a leftover stale generation wastes disk, not correctness.
    fn prune_stale(&self, keep: &str) -> Result<(), GslbError> {
        let entries = fs::read_dir(&self.config_dir).map_err(|e| GslbError::Publish {
            generation: self.generation,
            reason: format!("failed to list config directory: {e}"),
        })?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("gen-") && name != keep {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!(self.log, "failed to remove stale generation"; "generation" => %name, "error" => %e);
                }
            }
        }
        Ok(())
    }

    /// Best-effort SIGHUP to the configured DNS backend pid, so it reloads
    /// the newly-swapped config without a restart. A failure here does not
    /// fail the publish: the backend will still pick up the new generation
    /// on its own reload schedule, if any.
    fn reload_dns(&self) {
        let Some(pid_file) = &self.dns_pid_file else {
            return;
        };
        if let Err(e) = send_sighup(pid_file) {
            error!(self.log, "failed to signal DNS backend to reload";
                "pid_file" => %pid_file.display(), "error" => %e);
        }
    }
}

fn write_and_sync(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

fn send_sighup(pid_file: &Path) -> Result<(), GslbError> {
    let contents = fs::read_to_string(pid_file).map_err(|e| GslbError::ReloadSignal {
        reason: format!("failed to read pid file {}: {e}", pid_file.display()),
    })?;
    let pid: i32 = contents.trim().parse().map_err(|e| GslbError::ReloadSignal {
        reason: format!("pid file {} has invalid contents: {e}", pid_file.display()),
    })?;
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGHUP)
        .map_err(|e| GslbError::ReloadSignal {
            reason: format!("kill(SIGHUP, {pid}) failed: {e}"),
        })
}

fn bundle_hash(output: &SynthesisOutput) -> [u8; 32] {
    let mut names: Vec<&String> = output.zone_files.keys().collect();
    names.sort();
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(output.zone_files[name].as_bytes());
    }
    hasher.update(output.corefile.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_logger() -> Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn sample_output() -> SynthesisOutput {
        let mut zone_files = HashMap::new();
        zone_files.insert("cloud.example.com.default.zone".to_string(), "$ORIGIN cloud.example.com.\n".to_string());
        SynthesisOutput {
            zone_files,
            corefile: "cloud.example.com {\n}\n".to_string(),
            errors: Vec::new(),
            synthesized: Vec::new(),
        }
    }

    #[test]
    fn first_publish_creates_data_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = Publisher::new(dir.path().to_path_buf(), None, test_logger());

        let published = publisher.publish(&sample_output()).unwrap();
        assert!(published);

        let data_link = dir.path().join(DATA_LINK);
        assert!(data_link.symlink_metadata().unwrap().file_type().is_symlink());
        let target = fs::read_link(&data_link).unwrap();
        assert_eq!(target, Path::new("gen-1"));
        assert!(dir.path().join("gen-1").join(COREFILE_NAME).exists());
    }

    #[test]
    fn unchanged_bundle_skips_publish() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = Publisher::new(dir.path().to_path_buf(), None, test_logger());

        assert!(publisher.publish(&sample_output()).unwrap());
        assert!(!publisher.publish(&sample_output()).unwrap());
    }

    #[test]
    fn changed_bundle_publishes_new_generation_and_prunes_old() {
        let dir = tempfile::tempdir().unwrap();
        let mut publisher = Publisher::new(dir.path().to_path_buf(), None, test_logger());
        publisher.publish(&sample_output()).unwrap();

        let mut changed = sample_output();
        changed.corefile.push_str("# changed\n");
        assert!(publisher.publish(&changed).unwrap());

        assert!(!dir.path().join("gen-1").exists());
        assert!(dir.path().join("gen-2").exists());
        let target = fs::read_link(dir.path().join(DATA_LINK)).unwrap();
        assert_eq!(target, Path::new("gen-2"));
    }
}
