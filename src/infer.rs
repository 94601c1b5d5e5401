//! External inference as an injected capability.
//!
//! The real garment-transfer model is an opaque external process; its whole
//! contract is "write an image file at the output path and exit 0". A
//! [`CommandBackend`] instantiates a user-supplied command template and runs
//! it as a single blocking process. Tests substitute their own backend.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;

use crate::error::{DraperyError, DraperyResult};

/// Pluggable garment-transfer invocation.
pub trait InferenceBackend {
    /// Produce a try-on image at `output` from the person and (processed)
    /// garment files. A clean return without an artifact is the caller's
    /// problem to detect.
    fn generate(
        &self,
        person: &Path,
        cloth: &Path,
        output: &Path,
        seed: u64,
    ) -> DraperyResult<()>;
}

/// Runs a command template through `sh -c`.
///
/// The template may reference `{person}`, `{cloth}`, `{output}` and `{seed}`;
/// path placeholders are shell-quoted on substitution. The call blocks with
/// no timeout: a hung model process hangs the invocation, by contract.
pub struct CommandBackend {
    template: String,
}

impl CommandBackend {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    fn instantiate(&self, person: &Path, cloth: &Path, output: &Path, seed: u64) -> String {
        self.template
            .replace("{person}", &shell_quote(person))
            .replace("{cloth}", &shell_quote(cloth))
            .replace("{output}", &shell_quote(output))
            .replace("{seed}", &seed.to_string())
    }
}

impl InferenceBackend for CommandBackend {
    fn generate(
        &self,
        person: &Path,
        cloth: &Path,
        output: &Path,
        seed: u64,
    ) -> DraperyResult<()> {
        let cmd = self.instantiate(person, cloth, output, seed);
        tracing::debug!(command = %cmd, "running external inference");

        let status = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .status()
            .with_context(|| format!("spawn inference command '{cmd}'"))?;
        if !status.success() {
            return Err(DraperyError::external_process(format!(
                "inference command exited with {status}"
            )));
        }
        Ok(())
    }
}

/// Output artifact path derived from the person input's name: a `_person`
/// marker becomes `_tryon` and the extension is forced to `.png`.
///
/// A leading dot does not count as an extension separator, so a dotfile name
/// like `.hidden_person` keeps its full name and becomes `.hidden_tryon.png`.
pub fn output_path_for(person_path: &Path, outputs_dir: &Path) -> PathBuf {
    let name = person_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "person".to_string());
    let swapped = name.replace("_person", "_tryon");
    let stem = match swapped.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => swapped,
    };
    outputs_dir.join(format!("{stem}.png"))
}

/// POSIX single-quote escaping, so template substitution survives paths with
/// spaces or shell metacharacters.
fn shell_quote(path: &Path) -> String {
    let s = path.to_string_lossy();
    let safe = !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/'));
    if safe {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
