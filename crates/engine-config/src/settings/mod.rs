//! Typed view over the environment.
//!
//! Nothing here fails because a credential is absent: sources check their own
//! credentials when they are resolved for a run, via [`require`].

use crate::{env::EnvContext, error::SettingsError};
use engine_core::error::ConfigError;
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_CLIENT_ID: &str = "713";
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub state_dir: PathBuf,
    pub client_id: String,
    pub run_timeout: Duration,
    pub everflow: EverflowSettings,
    pub redtrack: RedtrackSettings,
    pub posthog: PosthogSettings,
    pub mautic: MauticSettings,
    pub file_drop: FileDropSettings,
}

#[derive(Debug, Clone)]
pub struct EverflowSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Keep only rows for this advertiser.
    pub advertiser_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RedtrackSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Pause between the per-day report requests.
    pub request_spacing: Duration,
}

#[derive(Debug, Clone)]
pub struct PosthogSettings {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct MauticSettings {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileDropSettings {
    pub root: Option<PathBuf>,
    pub prefixes: Vec<String>,
    pub max_batches: Option<usize>,
}

impl Settings {
    pub fn from_env(env: &EnvContext) -> Result<Self, SettingsError> {
        let state_dir = match env.get("MARKETSYNC_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or(SettingsError::NoHomeDir)?
                .join(".marketsync")
                .join("state"),
        };

        let run_timeout = env
            .parse::<u64>("MARKETSYNC_RUN_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RUN_TIMEOUT);

        let spacing_ms = env.parse::<u64>("REDTRACK_REQUEST_SPACING_MS")?.unwrap_or(1000);

        Ok(Settings {
            database_url: database_url(env)?,
            state_dir,
            client_id: env.get_or("MARKETSYNC_CLIENT_ID", DEFAULT_CLIENT_ID),
            run_timeout,
            everflow: EverflowSettings {
                api_key: env.get("EVERFLOW_API_KEY"),
                base_url: trim_url(env.get_or("EVERFLOW_BASE_URL", "https://api.eflow.team")),
                advertiser_id: env.parse::<i64>("EVERFLOW_ADVERTISER_ID")?,
            },
            redtrack: RedtrackSettings {
                api_key: env.get("REDTRACK_API_KEY"),
                base_url: trim_url(env.get_or("REDTRACK_BASE_URL", "https://api.redtrack.io")),
                request_spacing: Duration::from_millis(spacing_ms),
            },
            posthog: PosthogSettings {
                api_key: env.get("POSTHOG_API_KEY"),
                project_id: env.get("POSTHOG_PROJECT_ID"),
                host: trim_url(env.get_or("POSTHOG_HOST", "https://app.posthog.com")),
            },
            mautic: MauticSettings {
                base_url: env.get("MAUTIC_BASE_URL").map(trim_url),
                client_id: env.get("MAUTIC_CLIENT_ID"),
                client_secret: env.get("MAUTIC_CLIENT_SECRET"),
            },
            file_drop: FileDropSettings {
                root: env.get("FILE_DROP_ROOT").map(PathBuf::from),
                prefixes: env
                    .get("FILE_DROP_PREFIXES")
                    .map(|raw| {
                        raw.split(',')
                            .map(|p| p.trim().trim_matches('/').to_string())
                            .filter(|p| !p.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                max_batches: env.parse::<usize>("FILE_DROP_MAX_BATCHES")?,
            },
        })
    }
}

/// `DATABASE_URL`, or a URL assembled from the `SUPABASE_DB_*` parts when a host is set.
fn database_url(env: &EnvContext) -> Result<Option<String>, SettingsError> {
    if let Some(url) = env.get("DATABASE_URL") {
        return Ok(Some(url));
    }
    let Some(host) = env.get("SUPABASE_DB_HOST") else {
        return Ok(None);
    };
    let port = env.parse::<u16>("SUPABASE_DB_PORT")?.unwrap_or(5432);
    let name = env.get_or("SUPABASE_DB_NAME", "postgres");
    let user = env.get_or("SUPABASE_DB_USER", "postgres");
    let password = env.get_or("SUPABASE_DB_PASSWORD", "");
    Ok(Some(format!(
        "host={host} port={port} dbname={name} user={user} password={password} sslmode=prefer"
    )))
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Returns the configured value or a configuration error naming the source
/// and the environment key that is missing.
pub fn require(value: &Option<String>, source_name: &str, field: &str) -> Result<String, ConfigError> {
    value.clone().ok_or_else(|| ConfigError::MissingCredential {
        source_name: source_name.to_string(),
        field: field.to_string(),
    })
}
