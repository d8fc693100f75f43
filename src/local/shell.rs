//! Shell resolution
//!
//! Picks the executable a local session runs: explicit override, then the
//! user's/platform default, then a fallback that is always present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A shell executable plus the arguments it is started with
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellInfo {
    /// Identifier derived from the file name (e.g. "zsh", "bash", "pwsh")
    pub id: String,
    pub label: String,
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl ShellInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            path: path.into(),
            args: vec![],
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Build from a bare path or command name
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let id = shell_id(path);
        let label = capitalize_first(&id);
        let args = default_args_for_shell(&id);
        Self::new(id, label, path).with_args(args)
    }
}

#[cfg(target_os = "macos")]
const DEFAULT_SHELL_PATH: &str = "/bin/zsh";
#[cfg(all(unix, not(target_os = "macos")))]
const DEFAULT_SHELL_PATH: &str = "/bin/bash";
#[cfg(windows)]
const DEFAULT_SHELL_PATH: &str = "powershell.exe";

#[cfg(unix)]
const FALLBACK_SHELL_PATH: &str = "/bin/sh";
#[cfg(windows)]
const FALLBACK_SHELL_PATH: &str = "cmd.exe";

/// `$SHELL` when it exists on disk (Unix), otherwise the platform default
pub fn default_shell() -> ShellInfo {
    #[cfg(unix)]
    if let Ok(shell_path) = std::env::var("SHELL") {
        let path = PathBuf::from(&shell_path);
        if path.exists() {
            return ShellInfo::from_path(path);
        }
    }

    ShellInfo::from_path(DEFAULT_SHELL_PATH)
}

/// Shell used when the resolved one fails to spawn
pub fn fallback_shell() -> ShellInfo {
    ShellInfo::new(shell_id(Path::new(FALLBACK_SHELL_PATH)), "Fallback", FALLBACK_SHELL_PATH)
}

/// Explicit override wins; blank overrides are ignored
pub fn resolve_shell(override_path: Option<&str>) -> ShellInfo {
    match override_path.map(str::trim) {
        Some(path) if !path.is_empty() => ShellInfo::from_path(path),
        _ => default_shell(),
    }
}

fn shell_id(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("shell");
    name.strip_suffix(".exe").unwrap_or(name).to_string()
}

fn default_args_for_shell(shell_id: &str) -> Vec<String> {
    match shell_id {
        "zsh" | "bash" | "fish" => vec!["--login".to_string()],
        "pwsh" | "powershell" => vec!["-NoLogo".to_string()],
        _ => vec![],
    }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shell_exists() {
        let shell = default_shell();
        assert!(!shell.id.is_empty());
        assert!(!shell.label.is_empty());
    }

    #[test]
    fn test_override_wins() {
        let shell = resolve_shell(Some("/usr/bin/fish"));
        assert_eq!(shell.id, "fish");
        assert_eq!(shell.path, PathBuf::from("/usr/bin/fish"));
        assert_eq!(shell.args, vec!["--login".to_string()]);
    }

    #[test]
    fn test_blank_override_uses_default() {
        assert_eq!(resolve_shell(Some("  ")), default_shell());
        assert_eq!(resolve_shell(None), default_shell());
    }

    #[test]
    fn test_exe_suffix_is_stripped() {
        assert_eq!(ShellInfo::from_path("powershell.exe").id, "powershell");
    }

    #[test]
    fn test_fallback_takes_no_args() {
        assert!(fallback_shell().args.is_empty());
    }

    #[test]
    fn test_capitalize_first() {
        assert_eq!(capitalize_first("zsh"), "Zsh");
        assert_eq!(capitalize_first(""), "");
    }
}
