//! Settings loaded from `.patchup.toml`.
//!
//! Every field has a default matching the Android Studio mirror, so an empty
//! or missing file is a working configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::remap::{ReferenceRule, ReferenceTable};
use crate::{display_path, Error, Result};

/// File name looked up in the repository root.
pub const PROJECT_CONFIG_FILE: &str = ".patchup.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where upstream commits come from.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// How patch envelopes are built and applied.
    #[serde(default)]
    pub patch: PatchConfig,
    /// Build-reference substitutions.
    #[serde(default)]
    pub remap: RemapConfig,
    /// Settings for the `git` executable.
    #[serde(default)]
    pub git: GitConfig,
    /// Log verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream mirror settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Fetch URL of the upstream mirror.
    #[serde(default = "default_remote_url")]
    pub remote: String,
    /// Local name of the upstream remote.
    #[serde(default = "default_remote_name")]
    pub remote_name: String,
    /// Upstream branch to track.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Directory of the upstream tree that maps onto the downstream root.
    #[serde(default = "default_subtree")]
    pub subtree: String,
    /// Code-browser URL prefix; the commit id is appended.
    #[serde(default = "default_browse_url")]
    pub browse_url: String,
    /// Register and fetch the remote before picking.
    #[serde(default = "default_true")]
    pub fetch: bool,
}

/// Patch envelope and apply settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Fixed author identity written into every envelope.
    #[serde(default = "default_author")]
    pub author: String,
    /// Trailer key recording the upstream commit id.
    #[serde(default = "default_trailer_key")]
    pub trailer_key: String,
    /// Generated file whose local modifications are discarded before
    /// resuming a partial apply in either mode.
    #[serde(default = "default_lock_file")]
    pub lock_file: Option<String>,
    /// Suffix of reject artifacts.
    #[serde(default = "default_reject_suffix")]
    pub reject_suffix: String,
}

/// Extra substitution rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapConfig {
    /// Start from the built-in table.
    #[serde(default = "default_true")]
    pub include_defaults: bool,
    /// Rules appended after the built-in table.
    #[serde(default)]
    pub rules: Vec<ReferenceRule>,
}

/// `git` executable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitConfig {
    /// Program to run.
    #[serde(default = "default_git_binary")]
    pub binary: String,
    /// Timeout in seconds for git queries. Fetching and applying are not
    /// bounded.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            remote: default_remote_url(),
            remote_name: default_remote_name(),
            branch: default_branch(),
            subtree: default_subtree(),
            browse_url: default_browse_url(),
            fetch: true,
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            author: default_author(),
            trailer_key: default_trailer_key(),
            lock_file: default_lock_file(),
            reject_suffix: default_reject_suffix(),
        }
    }
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            include_defaults: true,
            rules: Vec::new(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_remote_url() -> String {
    "https://android.googlesource.com/platform/tools/adt/idea".into()
}
fn default_remote_name() -> String {
    "aosp".into()
}
fn default_branch() -> String {
    "mirror-goog-studio-main".into()
}
fn default_subtree() -> String {
    "aswb".into()
}
fn default_browse_url() -> String {
    "https://cs.android.com/android-studio/platform/tools/adt/idea/+/".into()
}
const fn default_true() -> bool {
    true
}
fn default_author() -> String {
    "Googler <intellij-github@google.com>".into()
}
fn default_trailer_key() -> String {
    "AOSP".into()
}
#[allow(clippy::unnecessary_wraps)]
fn default_lock_file() -> Option<String> {
    Some("MODULE.bazel.lock".into())
}
fn default_reject_suffix() -> String {
    ".rej".into()
}
fn default_git_binary() -> String {
    "git".into()
}
const fn default_timeout_secs() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the text is not valid TOML for this
    /// schema or fails [`Config::validate`].
    pub fn from_toml(text: &str, origin: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| Error::Config {
            path: origin.to_owned(),
            reason: err.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Load the project file under `repo_root`, then overlay `explicit` on
    /// top of it. Keys absent from both fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if an explicit file cannot be read and
    /// [`Error::Config`] if any layer fails to parse or validate.
    pub fn load(repo_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut origin = String::from("<defaults>");

        let project = repo_root.join(PROJECT_CONFIG_FILE);
        if project.is_file() {
            merge_toml_values(&mut merged, load_toml_value(&project)?);
            origin = display_path(&project);
        }
        if let Some(path) = explicit {
            merge_toml_values(&mut merged, load_toml_value(path)?);
            origin = display_path(path);
        }

        let config: Self = merged.try_into().map_err(|err: toml::de::Error| Error::Config {
            path: origin.clone(),
            reason: err.to_string(),
        })?;
        config.validate(&origin)?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field, or the
    /// table error when `remap.rules` is invalid.
    pub fn validate(&self, origin: &str) -> Result<()> {
        let required = [
            ("upstream.remote", &self.upstream.remote),
            ("upstream.remote_name", &self.upstream.remote_name),
            ("upstream.branch", &self.upstream.branch),
            ("upstream.subtree", &self.upstream.subtree),
            ("patch.author", &self.patch.author),
            ("patch.trailer_key", &self.patch.trailer_key),
            ("patch.reject_suffix", &self.patch.reject_suffix),
            ("git.binary", &self.git.binary),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config {
                    path: origin.to_owned(),
                    reason: format!("`{field}` must not be empty"),
                });
            }
        }
        if self.patch.trailer_key.contains(':') {
            return Err(Error::Config {
                path: origin.to_owned(),
                reason: "`patch.trailer_key` must not contain ':'".into(),
            });
        }
        if self.git.timeout_secs == 0 {
            return Err(Error::Config {
                path: origin.to_owned(),
                reason: "`git.timeout_secs` must be positive".into(),
            });
        }
        self.reference_table().map(|_| ())
    }

    /// Substitution table: the built-in rules (unless disabled) followed by
    /// the configured ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] or [`Error::DuplicateRule`] for a bad
    /// configured rule.
    pub fn reference_table(&self) -> Result<ReferenceTable> {
        let base = if self.remap.include_defaults {
            ReferenceTable::aosp_defaults()
        } else {
            ReferenceTable::default()
        };
        base.extend(self.remap.rules.iter().cloned())
    }

    /// `<remote_name>/<branch>`.
    #[must_use]
    pub fn upstream_ref(&self) -> String {
        format!("{}/{}", self.upstream.remote_name, self.upstream.branch)
    }

    /// Timeout applied to each `git` invocation.
    #[must_use]
    pub const fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git.timeout_secs)
    }
}

fn load_toml_value(path: &Path) -> Result<toml::Value> {
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: display_path(path),
        source,
    })?;
    content.parse::<toml::Value>().map_err(|err| Error::Config {
        path: display_path(path),
        reason: err.to_string(),
    })
}

/// Deep-merge `overlay` into `base`; tables merge key by key, anything else
/// is replaced.
fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_toml_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
