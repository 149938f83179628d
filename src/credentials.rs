use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::config::home;

/// An API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Credential(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where the reasoning engine's secret comes from
pub trait CredentialSource: Send + Sync {
    /// Name reported when the credential is missing
    fn name(&self) -> &str;

    fn credential(&self) -> Option<Credential>;
}

/// Environment variable first, then a `secrets.toml` table keyed by the same name.
/// The file is read once, on first lookup.
pub struct EnvCredentials {
    var: String,
    secrets_file: Option<PathBuf>,
    from_file: OnceCell<Option<Credential>>,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        EnvCredentials {
            var: var.into(),
            secrets_file: None,
            from_file: OnceCell::new(),
        }
    }

    pub fn with_secrets_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.secrets_file = Some(path.into());
        self
    }

    /// `var` from the environment or `~/.webagent/secrets.toml`
    pub fn with_default_secrets(var: impl Into<String>) -> Self {
        Self::new(var).with_secrets_file(home().join("secrets.toml"))
    }
}

impl CredentialSource for EnvCredentials {
    fn name(&self) -> &str {
        &self.var
    }

    fn credential(&self) -> Option<Credential> {
        if let Ok(value) = std::env::var(&self.var) {
            if !value.trim().is_empty() {
                return Some(Credential::new(value.trim()));
            }
        }

        self.from_file
            .get_or_init(|| {
                self.secrets_file
                    .as_deref()
                    .and_then(|path| read_secret(path, &self.var))
            })
            .clone()
    }
}

fn read_secret(path: &Path, key: &str) -> Option<Credential> {
    let content = fs::read_to_string(path).ok()?;
    let table: HashMap<String, toml::Value> = match toml::from_str(&content) {
        Ok(table) => table,
        Err(e) => {
            log::warn!("ignoring unreadable secrets file {}: {}", path.display(), e);
            return None;
        }
    };

    table
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Credential::new)
}

/// A fixed credential, for hosts that manage secrets themselves
pub struct StaticCredentials {
    var: String,
    value: Option<Credential>,
}

impl StaticCredentials {
    pub fn new(var: impl Into<String>, value: Option<Credential>) -> Self {
        StaticCredentials {
            var: var.into(),
            value,
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn name(&self) -> &str {
        &self.var
    }

    fn credential(&self) -> Option<Credential> {
        self.value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_the_secret() {
        let credential = Credential::new("sk-very-secret");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
        assert_eq!(credential.expose(), "sk-very-secret");
    }

    #[test]
    fn environment_variable_wins() {
        let var = "WEBAGENT_TEST_KEY_ENV_WINS";
        std::env::set_var(var, " sk-env ");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, format!("{} = \"sk-file\"\n", var)).unwrap();

        let source = EnvCredentials::new(var).with_secrets_file(&path);
        assert_eq!(source.credential().unwrap().expose(), "sk-env");
        std::env::remove_var(var);
    }

    #[test]
    fn falls_back_to_secrets_file() {
        let var = "WEBAGENT_TEST_KEY_FILE_FALLBACK";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, format!("OTHER = \"x\"\n{} = \"sk-file\"\n", var)).unwrap();

        let source = EnvCredentials::new(var).with_secrets_file(&path);
        assert_eq!(source.credential().unwrap().expose(), "sk-file");
        assert_eq!(source.name(), var);
    }

    #[test]
    fn secrets_file_is_read_once() {
        let var = "WEBAGENT_TEST_KEY_READ_ONCE";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, format!("{} = \"sk-first\"\n", var)).unwrap();

        let source = EnvCredentials::new(var).with_secrets_file(&path);
        assert_eq!(source.credential().unwrap().expose(), "sk-first");

        fs::write(&path, format!("{} = \"sk-second\"\n", var)).unwrap();
        assert_eq!(source.credential().unwrap().expose(), "sk-first");
        fs::remove_file(&path).unwrap();
        assert_eq!(source.credential().unwrap().expose(), "sk-first");
    }

    #[test]
    fn absent_everywhere_is_none() {
        let var = "WEBAGENT_TEST_KEY_ABSENT";
        let dir = tempfile::tempdir().unwrap();
        let source = EnvCredentials::new(var).with_secrets_file(dir.path().join("missing.toml"));
        assert!(source.credential().is_none());
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let var = "WEBAGENT_TEST_KEY_BLANK";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, format!("{} = \"  \"\n", var)).unwrap();

        let source = EnvCredentials::new(var).with_secrets_file(&path);
        assert!(source.credential().is_none());
    }
}
