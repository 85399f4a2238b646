pub mod add;
pub mod completions;
pub mod config;
pub mod favorite;
pub mod list;
pub mod show;
pub mod watch;

use anyhow::{Result, anyhow};
use promptlib_core::config::{StoreConfig, resolve_config};
use promptlib_core::store::PromptStore;
use promptlib_core::{ErrorCode, LibraryError, PromptLibrary};
use std::path::Path;
use std::sync::Arc;

use crate::output::{CliError, OutputMode, render_error};
use crate::remote::HttpStore;

/// Whether a command writes, and so needs a token before anything is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Render `error` and turn it into the command's failure.
pub fn fail(output: OutputMode, error: CliError) -> anyhow::Error {
    if let Err(render) = render_error(output, &error) {
        return render;
    }
    anyhow!("{}", error.message)
}

pub fn fail_library(output: OutputMode, error: &LibraryError) -> anyhow::Error {
    fail(output, CliError::from(error))
}

/// Resolve connection settings and build the hosted store client.
///
/// # Errors
///
/// Fails with a rendered `E1001`/`E1002`/`E1003` error when the settings are
/// unusable for `access`.
pub fn connect(project_root: &Path, output: OutputMode, access: Access) -> Result<Arc<dyn PromptStore>> {
    let effective = resolve_config(project_root, output.is_json())
        .map_err(|err| fail(output, CliError::from_code(ErrorCode::ConfigParseError, format!("{err:#}"))))?;
    let config = StoreConfig::resolve(effective.store)
        .map_err(|err| fail(output, CliError::from_code(ErrorCode::ConfigMissing, err.to_string())))?;
    if access == Access::Write {
        config
            .require_token()
            .map_err(|err| fail(output, CliError::from_code(ErrorCode::TokenRequired, err.to_string())))?;
    }
    let store = HttpStore::new(config)
        .map_err(|err| fail(output, CliError::from_code(ErrorCode::InternalUnexpected, err.to_string())))?;
    Ok(Arc::new(store))
}

/// Open a live session over `store`.
///
/// # Errors
///
/// Fails with a rendered error if the initial read fails.
pub async fn open_library(store: Arc<dyn PromptStore>, output: OutputMode) -> Result<PromptLibrary> {
    PromptLibrary::open(store)
        .await
        .map_err(|err| fail_library(output, &err))
}
