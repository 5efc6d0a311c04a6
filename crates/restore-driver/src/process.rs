use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::RestoreError;
use crate::Result;

// ─── RestoreInvocation ────────────────────────────────────────────────────

/// Arguments for one run of the restore tool.
///
/// Renders to `<program> --oauth2-token <token> [--catalog <id>] <server> <artifact>`.
#[derive(Clone)]
pub struct RestoreInvocation {
    pub credential: String,
    pub catalog_id: Option<i64>,
    pub server: String,
    pub artifact: PathBuf,
}

impl RestoreInvocation {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["--oauth2-token".to_string(), self.credential.clone()];
        if let Some(id) = self.catalog_id {
            args.push("--catalog".to_string());
            args.push(id.to_string());
        }
        args.push(self.server.clone());
        args.push(self.artifact.to_string_lossy().into_owned());
        args
    }
}

impl std::fmt::Debug for RestoreInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreInvocation")
            .field("credential", &"<redacted>")
            .field("catalog_id", &self.catalog_id)
            .field("server", &self.server)
            .field("artifact", &self.artifact)
            .finish()
    }
}

// ─── RestoreTool ──────────────────────────────────────────────────────────

/// Handle on the restore tool executable.
#[derive(Debug, Clone)]
pub struct RestoreTool {
    program: PathBuf,
}

impl RestoreTool {
    /// Locate `program` on `PATH` (or accept it as-is when it is a path).
    pub fn locate(program: &str) -> Result<Self> {
        let candidate = Path::new(program);
        if candidate.components().count() > 1 {
            if candidate.exists() {
                return Ok(Self::at(candidate));
            }
            return Err(RestoreError::NotInstalled(program.to_string()));
        }
        which::which(program)
            .map(|program| Self { program })
            .map_err(|_| RestoreError::NotInstalled(program.to_string()))
    }

    /// Use the executable at `program` without any lookup.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool to completion and return its combined output
    /// (stderr first, then stdout).
    ///
    /// The exit status is not interpreted; the output markers are the only
    /// success signal the tool provides.
    pub fn run(&self, invocation: &RestoreInvocation) -> Result<String> {
        tracing::debug!(
            program = %self.program.display(),
            server = %invocation.server,
            catalog_id = ?invocation.catalog_id,
            "running restore tool"
        );
        let output = Command::new(&self.program)
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(RestoreError::Spawn)?;

        let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(exit = ?output.status.code(), "restore tool exited");
        Ok(combined)
    }
}
