use crate::{
    api::{everflow::EverflowSource, mautic::MauticSource, posthog::PosthogSource, redtrack::RedtrackSource},
    file::drop::FileDropSource,
    http::{
        HttpTransport,
        transport::{DEFAULT_TIMEOUT, ReqwestTransport},
    },
};
use engine_config::settings::Settings;
use engine_core::{error::ConfigError, source::Source};
use std::sync::Arc;

/// Every integration shipped with the binary, configured from `settings`.
///
/// Credentials are not checked here: a source with missing keys is still
/// listed and fails with a configuration error only when it is run.
pub fn builtin_sources(settings: &Settings, transport: Arc<dyn HttpTransport>) -> Vec<Arc<dyn Source>> {
    vec![
        Arc::new(EverflowSource::new(settings.everflow.clone(), transport.clone())),
        Arc::new(RedtrackSource::new(settings.redtrack.clone(), transport.clone())),
        Arc::new(PosthogSource::new(settings.posthog.clone(), transport.clone())),
        Arc::new(MauticSource::new(settings.mautic.clone(), transport)),
        Arc::new(FileDropSource::new(settings.file_drop.clone())),
    ]
}

pub fn http_transport() -> Result<Arc<dyn HttpTransport>, ConfigError> {
    let transport = ReqwestTransport::new(DEFAULT_TIMEOUT)
        .map_err(|e| ConfigError::InvalidValue {
            key: "http".to_string(),
            reason: e.message,
        })?;
    Ok(Arc::new(transport))
}
