//! Process-wide model registry.
//!
//! Maps model ids to their [`ModelConfig`]. Every read returns an owned
//! copy, so callers never hold the lock or observe a half-applied update.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::{EndpointPatch, ModelConfig, ProviderType};

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    models: RwLock<HashMap<String, ModelConfig>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry already holding `models`.
    pub fn with_models(models: impl IntoIterator<Item = ModelConfig>) -> Self {
        let registry = Self::new();
        registry.register(models);
        registry
    }

    /// Replace the whole table.
    ///
    /// The new table is built before the lock is taken; readers see either
    /// the old table or the new one.
    pub fn register(&self, models: impl IntoIterator<Item = ModelConfig>) {
        let table: HashMap<String, ModelConfig> = models
            .into_iter()
            .map(|config| (config.model_id.clone(), config))
            .collect();
        let count = table.len();
        *self.models.write() = table;
        info!(models = count, "Registered models");
    }

    pub fn get_type(&self, model_id: &str) -> Option<ProviderType> {
        self.models
            .read()
            .get(model_id)
            .map(|config| config.provider_type)
    }

    pub fn get_config(&self, model_id: &str) -> Option<ModelConfig> {
        self.models.read().get(model_id).cloned()
    }

    /// Merge runtime-discovered fields into a model's config.
    ///
    /// The patched record replaces the old one under a single write lock.
    /// Returns `false` if the model is not registered.
    pub fn update_endpoints(&self, model_id: &str, patch: &EndpointPatch) -> bool {
        let mut models = self.models.write();
        let Some(current) = models.get(model_id) else {
            return false;
        };
        let next = current.patched(patch);
        models.insert(model_id.to_string(), next);
        debug!(model = %model_id, base_url = ?patch.base_url, "Updated model endpoints");
        true
    }

    /// Drop a model. Returns its last config.
    pub fn remove(&self, model_id: &str) -> Option<ModelConfig> {
        self.models.write().remove(model_id)
    }

    /// Sorted model ids.
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.models.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every config, sorted by id.
    pub fn configs(&self) -> Vec<ModelConfig> {
        let mut configs: Vec<ModelConfig> = self.models.read().values().cloned().collect();
        configs.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        configs
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn engine(id: &str) -> ModelConfig {
        ModelConfig::new(id, ProviderType::Engine, "served-name")
    }

    #[test]
    fn test_register_replaces_table() {
        let registry = ProviderRegistry::with_models([engine("a"), engine("b")]);
        assert_eq!(registry.model_ids(), vec!["a", "b"]);

        registry.register([engine("c")]);
        assert_eq!(registry.model_ids(), vec!["c"]);
        assert!(registry.get_config("a").is_none());
    }

    #[test]
    fn test_lookups_return_copies() {
        let registry = ProviderRegistry::with_models([engine("a")]);
        let mut copy = registry.get_config("a").unwrap();
        copy.native_model_name = "mutated".into();

        assert_eq!(registry.get_config("a").unwrap().native_model_name, "served-name");
        assert_eq!(registry.get_type("a"), Some(ProviderType::Engine));
        assert_eq!(registry.get_type("missing"), None);
    }

    #[test]
    fn test_update_endpoints() {
        let registry = ProviderRegistry::with_models([engine("a")]);

        assert!(registry.update_endpoints("a", &EndpointPatch::base_url("http://127.0.0.1:1234")));
        assert_eq!(
            registry.get_config("a").unwrap().base_url.as_deref(),
            Some("http://127.0.0.1:1234")
        );
        assert!(!registry.update_endpoints("missing", &EndpointPatch::default()));
    }

    #[test]
    fn test_concurrent_updates_and_reads() {
        let registry = Arc::new(ProviderRegistry::with_models([engine("a")]));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let url = format!("http://127.0.0.1:{}", 9000 + i);
                    registry.update_endpoints("a", &EndpointPatch::base_url(url));
                    registry.get_config("a").unwrap()
                })
            })
            .collect();

        for handle in handles {
            let seen = handle.join().unwrap();
            assert_eq!(seen.native_model_name, "served-name");
            assert!(seen.base_url.unwrap().starts_with("http://127.0.0.1:90"));
        }
    }

    #[test]
    fn test_remove() {
        let registry = ProviderRegistry::with_models([engine("a")]);
        assert!(registry.remove("a").is_some());
        assert!(registry.is_empty());
        assert!(registry.remove("a").is_none());
    }
}
