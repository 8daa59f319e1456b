use connectors::{builtin::builtin_sources, http::HttpTransport};
use engine_config::settings::Settings;
use engine_core::{error::ConfigError, source::Source};
use model::source::descriptor::SourceDescriptor;
use std::{collections::BTreeMap, sync::Arc};

/// Lookup table from source name to its integration.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in integration.
    pub fn builtin(settings: &Settings, transport: Arc<dyn HttpTransport>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for source in builtin_sources(settings, transport) {
            registry.register(source)?;
        }
        Ok(registry)
    }

    /// Adds a source after validating its descriptor. Names must be unique.
    pub fn register(&mut self, source: Arc<dyn Source>) -> Result<(), ConfigError> {
        let descriptor = source.descriptor();
        descriptor
            .validate()
            .map_err(|e| ConfigError::Descriptor(e.to_string()))?;
        if self.sources.contains_key(&descriptor.name) {
            return Err(ConfigError::Descriptor(format!(
                "source '{}' is registered twice",
                descriptor.name
            )));
        }
        self.sources.insert(descriptor.name.clone(), source);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Source>, ConfigError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.values().map(|s| s.descriptor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::source::{ExtractRequest, Extractor, StaticExtractor};
    use model::{
        cursor::marker::Marker,
        source::descriptor::{ExtractionKind, ResourceDescriptor},
    };

    struct Fixed(SourceDescriptor);

    impl Source for Fixed {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.0
        }

        fn extractor(
            &self,
            _: &ResourceDescriptor,
            _: Marker,
            _: &ExtractRequest,
        ) -> Result<Box<dyn Extractor>, ConfigError> {
            Ok(Box::new(StaticExtractor::new(vec![])))
        }
    }

    fn source(name: &str) -> Arc<dyn Source> {
        let resource = ResourceDescriptor::new("items", ExtractionKind::ApiPaginated).primary_key(&["id"]);
        Arc::new(Fixed(SourceDescriptor::new(name, vec![resource])))
    }

    #[test]
    fn resolves_registered_sources() {
        let mut registry = SourceRegistry::new();
        registry.register(source("orders")).unwrap();
        registry.register(source("spend")).unwrap();

        assert_eq!(registry.names(), vec!["orders", "spend"]);
        assert_eq!(registry.get("spend").unwrap().descriptor().name, "spend");
    }

    #[test]
    fn unknown_source_is_config_error() {
        let registry = SourceRegistry::new();
        let err = registry.get("doesnotexist").err().unwrap();
        assert_eq!(err, ConfigError::UnknownSource("doesnotexist".into()));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = SourceRegistry::new();
        registry.register(source("orders")).unwrap();
        assert!(matches!(
            registry.register(source("orders")),
            Err(ConfigError::Descriptor(_))
        ));
    }
}
