//! Skinned character model loading

use std::sync::Arc;

use crate::animation::skinned::{SkinnedAsset, decode_model};
use crate::core::config::LoaderConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::streaming::asset_loader::{AssetKind, AssetLoader};
use crate::streaming::cache::{KeyedCache, Loaded};
use crate::streaming::fetch::Fetch;
use crate::streaming::offload::{DecodeFn, Offload};

/// JSON character models
pub struct ModelKind;

impl AssetKind for ModelKind {
    type Asset = SkinnedAsset;
    const NAME: &'static str = "skinned model";
    const DECODE: DecodeFn<Vec<u8>, SkinnedAsset> = decode_model;
}

/// Reject names that are empty or would leave the model directory
pub fn validate_model_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidModelName(name.to_string()))
    }
}

/// Path of a model file relative to the model base
pub fn model_file(name: &str) -> String {
    format!("{name}/default/{name}.json")
}

/// Loads and caches skinned models by name
#[derive(Clone)]
pub struct SkinnedObjectLoader {
    models: AssetLoader<ModelKind>,
}

impl SkinnedObjectLoader {
    /// Create a loader
    ///
    /// # Arguments
    /// * `config` - Base URL, capacity and retry budget for models
    /// * `fetcher` - Transport for model files
    /// * `offload` - Where decodes run
    pub fn new(config: &LoaderConfig, fetcher: Arc<dyn Fetch>, offload: &impl Offload) -> Self {
        Self {
            models: AssetLoader::new(config, fetcher, offload),
        }
    }

    /// Full URL of the model called `name`
    ///
    /// # Errors
    /// [`Error::InvalidModelName`] for names that would leave the model directory
    pub fn url_for(&self, name: &str) -> Result<String> {
        validate_model_name(name)?;
        Ok(self.models.url_for(&model_file(name)))
    }

    /// Load the model called `name`
    ///
    /// # Returns
    /// The decoded asset, skinned when the file carries bones
    ///
    /// # Errors
    /// [`Error::InvalidModelName`] without fetching, otherwise the fetch or
    /// decode error
    pub async fn load(&self, name: &str) -> Result<Loaded<SkinnedAsset>> {
        validate_model_name(name)?;
        self.models.load(name, &model_file(name)).await
    }

    /// Ready model called `name`, if any
    pub fn get(&self, name: &str) -> Option<Arc<SkinnedAsset>> {
        self.models.cache().get(name)
    }

    /// Drop a cached model, returning whether it was present
    pub fn release(&self, name: &str) -> bool {
        self.models.cache().invalidate(name)
    }

    pub fn cache(&self) -> &KeyedCache<SkinnedAsset> {
        self.models.cache()
    }

    pub fn loader(&self) -> &AssetLoader<ModelKind> {
        &self.models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::fetch::MemoryFetcher;
    use crate::streaming::offload::InlineOffload;
    use serde_json::json;

    fn config() -> LoaderConfig {
        LoaderConfig {
            base_url: "models".to_string(),
            retry_backoff_ms: 0,
            ..LoaderConfig::models()
        }
    }

    fn warrior() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "vertices": [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            "indices": [0, 1, 2],
            "bones": [{ "name": "hips", "parent": -1 }],
            "skinIndices": [0, 0, 0, 0, 0, 0],
            "skinWeights": [1.0, 0.0, 1.0, 0.0, 1.0, 0.0]
        }))
        .unwrap()
    }

    fn crate_prop() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "vertices": [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            "indices": [0, 1, 2],
            "materials": [{ "name": "wood" }]
        }))
        .unwrap()
    }

    fn setup() -> (Arc<MemoryFetcher>, SkinnedObjectLoader) {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("models/warrior/default/warrior.json", warrior());
        fetcher.insert("models/crate/default/crate.json", crate_prop());
        let loader = SkinnedObjectLoader::new(&config(), fetcher.clone(), &InlineOffload);
        (fetcher, loader)
    }

    #[tokio::test]
    async fn test_warrior_is_cached_on_second_load() {
        let (fetcher, loader) = setup();

        let first = loader.load("warrior").await.unwrap();
        assert!(!first.cached);
        assert!(first.item.is_skinned());

        let second = loader.load("warrior").await.unwrap();
        assert!(second.cached);
        assert!(Arc::ptr_eq(&first.item, &second.item));
        assert_eq!(fetcher.request_count("models/warrior/default/warrior.json"), 1);
    }

    #[tokio::test]
    async fn test_static_model_shape() {
        let (_, loader) = setup();
        let loaded = loader.load("crate").await.unwrap();

        let model = loaded.item.model().expect("expected a static model");
        assert_eq!(model.material.name, "wood");
    }

    #[test]
    fn test_url_layout() {
        let (_, loader) = setup();
        assert_eq!(loader.url_for("warrior").unwrap(), "models/warrior/default/warrior.json");
    }

    #[tokio::test]
    async fn test_invalid_names_rejected_without_fetch() {
        let (fetcher, loader) = setup();

        for name in ["", ".", "..", "../secrets", "a/b", "a\\b"] {
            let err = loader.load(name).await.unwrap_err();
            assert!(matches!(err, Error::InvalidModelName(_)), "{name:?} accepted");
        }
        assert_eq!(fetcher.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_is_fifteen() {
        let (fetcher, loader) = setup();
        fetcher.fail_transiently("models/warrior/default/warrior.json", 14);

        let loaded = loader.load("warrior").await.unwrap();
        assert!(!loaded.cached);
        assert_eq!(fetcher.request_count("models/warrior/default/warrior.json"), 15);
    }

    #[tokio::test]
    async fn test_release() {
        let (_, loader) = setup();
        loader.load("warrior").await.unwrap();
        assert!(loader.get("warrior").is_some());

        assert!(loader.release("warrior"));
        assert!(loader.get("warrior").is_none());
    }
}
