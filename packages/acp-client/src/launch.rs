use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Common install locations that GUI-launched host applications do not pick
/// up, because they never source a login shell.
const EXTRA_PATH_DIRS: [&str; 2] = ["/opt/homebrew/bin", "/usr/local/bin"];

/// How to start one agent subprocess. Two specs with the same program and
/// argument list share one cached process.
#[derive(Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Backend-specific secret injection. Values go into the subprocess
    /// environment only and are never logged.
    pub env: HashMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// Cache key for the process-per-(binary, arguments) table.
    pub fn cache_key(&self) -> String {
        let mut key = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            key.push(':');
            key.push_str(arg);
        }
        key
    }

    /// The PATH value the subprocess should see: the host PATH widened with
    /// common local install directories that are missing from it.
    pub fn widened_path(&self) -> String {
        let current = std::env::var("PATH").unwrap_or_default();
        let mut parts: Vec<&str> = EXTRA_PATH_DIRS
            .iter()
            .copied()
            .filter(|dir| !current.split(':').any(|existing| existing == *dir))
            .collect();
        if parts.is_empty() {
            return current;
        }
        parts.push(&current);
        parts.join(":")
    }
}

impl fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Env values may hold API keys; show keys only.
        f.debug_struct("LaunchSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}
