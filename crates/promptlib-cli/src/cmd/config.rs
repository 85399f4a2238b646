//! `pl config` - inspect and edit connection and output settings.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand, ValueEnum};
use promptlib_core::config::{EffectiveConfig, StoreSettings, resolve_config};
use serde::Serialize;
use std::path::{Path, PathBuf};
use toml::Value;

use crate::output::OutputMode;

const REDACTED: &str = "***";

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show resolved or raw configuration
    Show(ShowArgs),
    /// Set a configuration key in project or user scope
    Set(SetArgs),
    /// Unset a configuration key in project or user scope
    Unset(UnsetArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show raw project config only
    #[arg(long, conflicts_with = "user")]
    project: bool,

    /// Show raw user config only
    #[arg(long)]
    user: bool,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. store.project_id, user.output)
    key: String,

    /// New value
    value: String,
}

#[derive(Args, Debug)]
struct UnsetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. store.token, user.output)
    key: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ConfigScope {
    Project,
    User,
}

/// Where a key lives inside its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyPath<'a> {
    Section(&'a str, &'a str),
    TopLevel(&'a str),
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
        ConfigCommand::Set(set) => run_set(set, project_root, output),
        ConfigCommand::Unset(unset) => run_unset(unset, project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project {
        let mut value = load_toml_table(&project_config_path(project_root))?;
        redact_token(&mut value);
        print_toml_or_json(&value, output)?;
        return Ok(());
    }

    if args.user {
        let mut value = load_toml_table(&user_config_path()?)?;
        redact_token(&mut value);
        print_toml_or_json(&value, output)?;
        return Ok(());
    }

    let effective = resolve_config(project_root, output.is_json())?;
    print_effective(&effective, output)?;
    Ok(())
}

fn run_set(args: &SetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = config_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_set(&mut value, args.scope, &args.key, &args.value)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "set", scope_label(args.scope), &args.key)?;
    Ok(())
}

fn run_unset(args: &UnsetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = config_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_unset(&mut value, args.scope, &args.key)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "unset", scope_label(args.scope), &args.key)?;
    Ok(())
}

fn apply_set(root: &mut Value, scope: ConfigScope, key: &str, raw: &str) -> Result<()> {
    let parsed = parse_value(scope, key, raw)?;
    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    match split_known_key(scope, key)? {
        KeyPath::TopLevel(leaf) => {
            table.insert(leaf.to_string(), parsed);
        }
        KeyPath::Section(section, leaf) => {
            let section_table = table
                .entry(section.to_string())
                .or_insert_with(|| Value::Table(toml::map::Map::new()))
                .as_table_mut()
                .ok_or_else(|| anyhow!("Section {section} must be a TOML table"))?;
            section_table.insert(leaf.to_string(), parsed);
        }
    }
    Ok(())
}

fn apply_unset(root: &mut Value, scope: ConfigScope, key: &str) -> Result<()> {
    let path = split_known_key(scope, key)?;
    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    match path {
        KeyPath::TopLevel(leaf) => {
            table.remove(leaf);
        }
        KeyPath::Section(section, leaf) => {
            if let Some(section_entry) = table.get_mut(section)
                && let Some(section_table) = section_entry.as_table_mut()
            {
                section_table.remove(leaf);
                if section_table.is_empty() {
                    table.remove(section);
                }
            }
        }
    }
    Ok(())
}

fn split_known_key(scope: ConfigScope, key: &str) -> Result<KeyPath<'_>> {
    let (section, leaf) = key
        .split_once('.')
        .ok_or_else(|| anyhow!("Key must use section.key format"))?;

    match (scope, section, leaf) {
        (_, "store", "project_id" | "dataset" | "api_version" | "token" | "use_cdn") => {
            Ok(KeyPath::Section(section, leaf))
        }
        // The user file keeps its output preference at the top level.
        (ConfigScope::User, "user", "output") => Ok(KeyPath::TopLevel(leaf)),
        _ => bail!("Unsupported key `{key}` for {} scope", scope_label(scope)),
    }
}

fn parse_value(scope: ConfigScope, key: &str, raw: &str) -> Result<Value> {
    match split_known_key(scope, key)? {
        KeyPath::Section("store", "use_cdn") => {
            let value: bool = raw
                .parse()
                .with_context(|| format!("{key} expects true or false"))?;
            Ok(Value::Boolean(value))
        }
        KeyPath::TopLevel("output") => match raw.trim().to_ascii_lowercase().as_str() {
            mode @ ("pretty" | "text" | "json") => Ok(Value::String(mode.to_string())),
            _ => bail!("{key} expects pretty, text or json"),
        },
        _ => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                bail!("{key} cannot be empty");
            }
            Ok(Value::String(trimmed.to_string()))
        }
    }
}

fn redact_token(root: &mut Value) {
    if let Some(token) = root
        .get_mut("store")
        .and_then(Value::as_table_mut)
        .and_then(|store| store.get_mut("token"))
    {
        *token = Value::String(REDACTED.to_string());
    }
}

fn load_toml_table(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Table(toml::map::Map::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if !value.is_table() {
        bail!("{} must contain a top-level TOML table", path.display());
    }

    Ok(value)
}

fn write_toml_table(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let serialized = toml::to_string_pretty(value)?;
    std::fs::write(path, serialized).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_toml_or_json(value: &Value, output: OutputMode) -> Result<()> {
    match output {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputMode::Text | OutputMode::Pretty => println!("{}", toml::to_string_pretty(value)?),
    }
    Ok(())
}

#[derive(Serialize)]
struct ShownConfig<'a> {
    #[serde(flatten)]
    effective: &'a EffectiveConfig,
    token_configured: bool,
}

fn opt(value: Option<&String>) -> &str {
    value.map_or("-", String::as_str)
}

const fn token_state(store: &StoreSettings) -> &'static str {
    if store.token.is_some() { "set" } else { "unset" }
}

fn print_effective(value: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let store = &value.store;
    match output {
        OutputMode::Json => {
            let shown = ShownConfig {
                effective: value,
                token_configured: store.token.is_some(),
            };
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        OutputMode::Text => {
            println!("resolved_output={}", value.resolved_output);
            println!("store.project_id={}", opt(store.project_id.as_ref()));
            println!("store.dataset={}", opt(store.dataset.as_ref()));
            println!("store.api_version={}", opt(store.api_version.as_ref()));
            println!("store.token={}", token_state(store));
            println!("store.use_cdn={}", store.use_cdn.unwrap_or(false));
        }
        OutputMode::Pretty => {
            println!("resolved_output = \"{}\"", value.resolved_output);
            println!();
            println!("[store]");
            println!("project_id = \"{}\"", opt(store.project_id.as_ref()));
            println!("dataset = \"{}\"", opt(store.dataset.as_ref()));
            println!("api_version = \"{}\"", opt(store.api_version.as_ref()));
            println!("token = {}", token_state(store));
            println!("use_cdn = {}", store.use_cdn.unwrap_or(false));
        }
    }
    Ok(())
}

fn render_mutation(output: OutputMode, action: &str, scope: &str, key: &str) -> Result<()> {
    match output {
        OutputMode::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "ok": true,
                    "action": action,
                    "scope": scope,
                    "key": key,
                }))?
            );
        }
        OutputMode::Text => {
            println!("ok=true action={action} scope={scope} key={key}");
        }
        OutputMode::Pretty => {
            println!("{} {} in {} config", action_to_title(action), key, scope);
        }
    }
    Ok(())
}

fn action_to_title(action: &str) -> &'static str {
    match action {
        "set" => "Set",
        "unset" => "Unset",
        _ => "Updated",
    }
}

fn config_path(scope: ConfigScope, project_root: &Path) -> Result<PathBuf> {
    match scope {
        ConfigScope::Project => Ok(project_config_path(project_root)),
        ConfigScope::User => user_config_path(),
    }
}

fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".promptlib/config.toml")
}

fn user_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to resolve user config directory"))?;
    Ok(config_dir.join("promptlib/config.toml"))
}

const fn scope_label(scope: ConfigScope) -> &'static str {
    match scope {
        ConfigScope::Project => "project",
        ConfigScope::User => "user",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Value {
        Value::Table(toml::map::Map::new())
    }

    #[test]
    fn store_keys_are_valid_in_both_scopes() {
        for scope in [ConfigScope::Project, ConfigScope::User] {
            assert_eq!(
                split_known_key(scope, "store.dataset").unwrap(),
                KeyPath::Section("store", "dataset")
            );
        }
    }

    #[test]
    fn output_key_is_user_scope_only() {
        assert_eq!(
            split_known_key(ConfigScope::User, "user.output").unwrap(),
            KeyPath::TopLevel("output")
        );
        assert!(split_known_key(ConfigScope::Project, "user.output").is_err());
        assert!(split_known_key(ConfigScope::Project, "store.nope").is_err());
        assert!(split_known_key(ConfigScope::Project, "dataset").is_err());
    }

    #[test]
    fn set_then_unset_removes_empty_section() {
        let mut root = empty();
        apply_set(&mut root, ConfigScope::Project, "store.use_cdn", "true").unwrap();
        assert_eq!(root["store"]["use_cdn"], Value::Boolean(true));

        apply_unset(&mut root, ConfigScope::Project, "store.use_cdn").unwrap();
        assert!(root.get("store").is_none());
    }

    #[test]
    fn user_output_is_written_top_level() {
        let mut root = empty();
        apply_set(&mut root, ConfigScope::User, "user.output", "JSON").unwrap();
        assert_eq!(root["output"], Value::String("json".into()));
        assert!(apply_set(&mut root, ConfigScope::User, "user.output", "loud").is_err());
    }

    #[test]
    fn bad_bool_is_rejected() {
        let mut root = empty();
        let err = apply_set(&mut root, ConfigScope::Project, "store.use_cdn", "maybe").unwrap_err();
        assert!(err.to_string().contains("true or false"));
    }

    #[test]
    fn token_is_redacted_in_raw_view() {
        let mut root = empty();
        apply_set(&mut root, ConfigScope::User, "store.token", "sk-secret").unwrap();
        redact_token(&mut root);
        assert_eq!(root["store"]["token"], Value::String(REDACTED.into()));
    }
}
