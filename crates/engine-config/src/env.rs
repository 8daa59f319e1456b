use crate::error::SettingsError;
use std::{collections::HashMap, path::Path};
use tracing::debug;

/// Snapshot of configuration variables, passed explicitly to whatever needs it.
#[derive(Debug, Clone, Default)]
pub struct EnvContext {
    vars: HashMap<String, String>,
}

impl EnvContext {
    /// Captures the process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Captures the process environment, filling gaps from a `.env` file.
    /// Process variables win over file entries; a missing file is not an error.
    pub fn from_process_and_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let mut ctx = Self::from_process();
        let path = path.as_ref();
        if !path.exists() {
            return Ok(ctx);
        }

        let env_file_error = |message: String| SettingsError::EnvFile {
            path: path.display().to_string(),
            message,
        };
        let iter = dotenvy::from_path_iter(path).map_err(|e| env_file_error(e.to_string()))?;
        let mut loaded = 0;
        for item in iter {
            let (key, value) = item.map_err(|e| env_file_error(e.to_string()))?;
            if !ctx.vars.contains_key(&key) {
                ctx.vars.insert(key, value);
                loaded += 1;
            }
        }
        debug!(path = %path.display(), loaded, "Loaded env file");
        Ok(ctx)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Value of `key`; blank values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, SettingsError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| SettingsError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("'{raw}': {e}"),
                })
            })
            .transpose()
    }
}
