use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;

pub const ENV_PROJECT_ID: &str = "SANITY_PROJECT_ID";
pub const ENV_DATASET: &str = "SANITY_DATASET";
pub const ENV_API_VERSION: &str = "SANITY_API_VERSION";
pub const ENV_TOKEN: &str = "SANITY_API_TOKEN";

/// Store connection settings as written in a config file or the environment.
///
/// Every field is optional so layers can be stacked; see
/// [`StoreSettings::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub project_id: Option<String>,
    pub dataset: Option<String>,
    pub api_version: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub use_cdn: Option<bool>,
}

impl StoreSettings {
    /// Fields set in `top` win over fields set in `self`.
    #[must_use]
    pub fn overlay(self, top: Self) -> Self {
        Self {
            project_id: top.project_id.or(self.project_id),
            dataset: top.dataset.or(self.dataset),
            api_version: top.api_version.or(self.api_version),
            token: top.token.or(self.token),
            use_cdn: top.use_cdn.or(self.use_cdn),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no store project id configured")]
    MissingProjectId,
    #[error("writing requires an API token")]
    MissingToken,
}

/// Resolved connection settings for the hosted store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub use_cdn: bool,
}

impl StoreConfig {
    /// Fill defaults and check the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingProjectId`] when no layer set a project id.
    pub fn resolve(settings: StoreSettings) -> Result<Self, ConfigError> {
        let project_id = settings
            .project_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingProjectId)?;
        Ok(Self {
            project_id,
            dataset: settings.dataset.unwrap_or_else(default_dataset),
            api_version: settings
                .api_version
                .map(|v| v.trim_start_matches('v').to_string())
                .unwrap_or_else(default_api_version),
            token: settings.token.filter(|t| !t.is_empty()),
            use_cdn: settings.use_cdn.unwrap_or(false),
        })
    }

    /// The token, for requests that write.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingToken`] if none is configured.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or(ConfigError::MissingToken)
    }

    /// Project id with all but the last four characters hidden, for logs.
    #[must_use]
    pub fn redacted_project_id(&self) -> String {
        redact(&self.project_id)
    }
}

fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("***{tail}")
}

/// Apply `SANITY_*` variables on top of file settings. Empty values are
/// ignored.
pub fn apply_env_overrides<F>(settings: StoreSettings, lookup: F) -> StoreSettings
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    settings.overlay(StoreSettings {
        project_id: get(ENV_PROJECT_ID),
        dataset: get(ENV_DATASET),
        api_version: get(ENV_API_VERSION),
        token: get(ENV_TOKEN),
        use_cdn: None,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub store: StoreSettings,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(".promptlib/config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir)
}

fn load_user_config_from(config_dir: &Path) -> Result<UserConfig> {
    let path = config_dir.join("promptlib/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Stack user file, project file and environment, and pick the output mode.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let store = apply_env_overrides(user.store.overlay(project.store), |key| env::var(key).ok());
    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        store,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_dataset() -> String {
    "production".to_string()
}

fn default_api_version() -> String {
    "2023-05-03".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(project_id: &str) -> StoreSettings {
        StoreSettings {
            project_id: Some(project_id.to_string()),
            ..StoreSettings::default()
        }
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.store, StoreSettings::default());
    }

    #[test]
    fn project_config_parses_store_section() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(root.path().join(".promptlib")).expect("mkdir");
        std::fs::write(
            root.path().join(".promptlib/config.toml"),
            "[store]\nproject_id = \"abc123xy\"\ndataset = \"staging\"\nuse_cdn = true\n",
        )
        .expect("write");

        let cfg = load_project_config(root.path()).expect("load");
        let store = StoreConfig::resolve(cfg.store).expect("resolve");
        assert_eq!(store.project_id, "abc123xy");
        assert_eq!(store.dataset, "staging");
        assert_eq!(store.api_version, "2023-05-03");
        assert!(store.use_cdn);
        assert!(store.token.is_none());
    }

    #[test]
    fn broken_project_config_reports_path() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(root.path().join(".promptlib")).expect("mkdir");
        std::fs::write(root.path().join(".promptlib/config.toml"), "[store\n").expect("write");

        let err = load_project_config(root.path()).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn user_config_parses_output_and_store() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(dir.path().join("promptlib")).expect("mkdir");
        std::fs::write(
            dir.path().join("promptlib/config.toml"),
            "output = \"json\"\n\n[store]\ntoken = \"sk-user\"\n",
        )
        .expect("write");

        let cfg = load_user_config_from(dir.path()).expect("load");
        assert_eq!(cfg.output.as_deref(), Some("json"));
        assert_eq!(cfg.store.token.as_deref(), Some("sk-user"));
    }

    #[test]
    fn project_layer_overrides_user_layer() {
        let user = StoreSettings {
            dataset: Some("user-ds".into()),
            token: Some("user-token".into()),
            ..settings("user-project")
        };
        let project = StoreSettings {
            dataset: Some("project-ds".into()),
            ..StoreSettings::default()
        };
        let merged = user.overlay(project);
        assert_eq!(merged.project_id.as_deref(), Some("user-project"));
        assert_eq!(merged.dataset.as_deref(), Some("project-ds"));
        assert_eq!(merged.token.as_deref(), Some("user-token"));
    }

    #[test]
    fn env_overrides_file_settings() {
        let env: HashMap<&str, &str> = [
            (ENV_PROJECT_ID, "envproj"),
            (ENV_TOKEN, "env-token"),
            (ENV_DATASET, "  "),
        ]
        .into_iter()
        .collect();
        let base = StoreSettings {
            dataset: Some("file-ds".into()),
            ..settings("fileproj")
        };

        let merged = apply_env_overrides(base, |key| env.get(key).map(ToString::to_string));
        assert_eq!(merged.project_id.as_deref(), Some("envproj"));
        assert_eq!(merged.token.as_deref(), Some("env-token"));
        assert_eq!(merged.dataset.as_deref(), Some("file-ds"));
    }

    #[test]
    fn missing_project_id_is_an_error() {
        assert_eq!(
            StoreConfig::resolve(StoreSettings::default()),
            Err(ConfigError::MissingProjectId)
        );
        assert_eq!(
            StoreConfig::resolve(settings("  ")),
            Err(ConfigError::MissingProjectId)
        );
    }

    #[test]
    fn token_is_required_for_writes_and_never_serialized() {
        let read_only = StoreConfig::resolve(settings("proj")).expect("resolve");
        assert_eq!(read_only.require_token(), Err(ConfigError::MissingToken));

        let with_token = StoreConfig::resolve(StoreSettings {
            token: Some("secret".into()),
            ..settings("proj")
        })
        .expect("resolve");
        assert_eq!(with_token.require_token(), Ok("secret"));
        let json = serde_json::to_string(&with_token).expect("serialize");
        assert!(!json.contains("secret"));
    }

    #[test]
    fn api_version_accepts_v_prefix() {
        let cfg = StoreConfig::resolve(StoreSettings {
            api_version: Some("v2024-01-01".into()),
            ..settings("proj")
        })
        .expect("resolve");
        assert_eq!(cfg.api_version, "2024-01-01");
    }

    #[test]
    fn project_id_is_redacted_for_logs() {
        let cfg = StoreConfig::resolve(settings("abcd1234")).expect("resolve");
        assert_eq!(cfg.redacted_project_id(), "***1234");
        assert_eq!(redact("ab"), "***ab");
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        let output = resolve_output(true, Some("pretty"), Some("text"));
        assert_eq!(output, "json");
    }

    #[test]
    fn env_format_beats_user_output() {
        let output = resolve_output(false, Some("json"), Some("human"));
        assert_eq!(output, "pretty");
    }
}
