//! Provider and model configuration records plus the merged model catalog.
//!
//! Model lists come from three sources, applied in order: the provider's own listing,
//! manually declared models (which replace listed entries with the same id), and local
//! per-model overrides layered on top.
//!
//! ```rust
//! use tprovider::{AvailableModel, ManualModel, ModelOverride, merge_model_catalog};
//!
//! let merged = merge_model_catalog(
//!     "openai",
//!     vec![AvailableModel::new("gpt-4o"), AvailableModel::new("gpt-4o-mini")],
//!     &[ManualModel::new("openai", "gpt-4o").with_display_name("GPT-4o (pinned)")],
//!     &[ModelOverride::new("openai", "gpt-4o-mini").disabled()],
//! );
//!
//! assert_eq!(merged.len(), 2);
//! assert!(merged.iter().any(|m| m.display_name == "GPT-4o (pinned)"));
//! assert!(!merged.iter().find(|m| m.model_id == "gpt-4o-mini").unwrap().enabled);
//! ```

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ModelProvider, ProviderError, ProviderKind};

/// A model as reported by a provider's listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableModel {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub context_window: Option<u32>,
}

impl AvailableModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            context_window: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub display_name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            kind,
            base_url: None,
            enabled: true,
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCapabilities {
    pub streaming: bool,
    pub tools: bool,
    pub images: bool,
    pub reasoning: bool,
    pub web_search: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            tools: true,
            images: false,
            reasoning: false,
            web_search: false,
        }
    }
}

/// Which request protocol a model is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    #[default]
    ChatCompletions,
    Responses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Api,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub provider_id: String,
    pub model_id: String,
}

impl ModelKey {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }

    /// Parses `provider/model`; the model part may itself contain slashes.
    pub fn parse(value: &str) -> Option<Self> {
        let (provider, model) = value.split_once('/')?;
        (!provider.is_empty() && !model.is_empty()).then(|| Self::new(provider, model))
    }
}

impl Display for ModelKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider_id: String,
    pub model_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub sort_order: i32,
    pub capabilities: ModelCapabilities,
    pub protocol: ProtocolKind,
    #[serde(default)]
    pub context_window: Option<u32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub extra_params: Map<String, Value>,
    pub source: ModelSource,
}

impl ModelConfig {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            provider_id: provider_id.into(),
            display_name: model_id.clone(),
            model_id,
            enabled: true,
            sort_order: 0,
            capabilities: ModelCapabilities::default(),
            protocol: ProtocolKind::default(),
            context_window: None,
            max_output_tokens: None,
            extra_params: Map::new(),
            source: ModelSource::Manual,
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.provider_id.clone(), self.model_id.clone())
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    fn from_api(provider_id: &str, model: AvailableModel) -> Self {
        let mut config = Self::new(provider_id, model.id);
        if let Some(display_name) = model.display_name {
            config.display_name = display_name;
        }
        config.context_window = model.context_window;
        config.source = ModelSource::Api;
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualModel {
    pub provider_id: String,
    pub model_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    #[serde(default)]
    pub protocol: ProtocolKind,
    #[serde(default)]
    pub context_window: Option<u32>,
}

impl ManualModel {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            display_name: None,
            capabilities: ModelCapabilities::default(),
            protocol: ProtocolKind::default(),
            context_window: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    fn into_config(self) -> ModelConfig {
        let mut config = ModelConfig::new(self.provider_id, self.model_id);
        if let Some(display_name) = self.display_name {
            config.display_name = display_name;
        }
        config.capabilities = self.capabilities;
        config.protocol = self.protocol;
        config.context_window = self.context_window;
        config
    }
}

/// Local per-model settings layered over listed and manual models.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOverride {
    pub provider_id: String,
    pub model_id: String,
    pub enabled: Option<bool>,
    pub sort_order: Option<i32>,
    pub display_name: Option<String>,
    pub capabilities: Option<ModelCapabilities>,
    pub protocol: Option<ProtocolKind>,
    pub context_window: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub extra_params: Map<String, Value>,
}

impl ModelOverride {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = Some(protocol);
        self
    }

    fn apply(&self, config: &mut ModelConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(sort_order) = self.sort_order {
            config.sort_order = sort_order;
        }
        if let Some(display_name) = &self.display_name {
            config.display_name = display_name.clone();
        }
        if let Some(capabilities) = self.capabilities {
            config.capabilities = capabilities;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if self.context_window.is_some() {
            config.context_window = self.context_window;
        }
        if self.max_output_tokens.is_some() {
            config.max_output_tokens = self.max_output_tokens;
        }
        config.extra_params.extend(self.extra_params.clone());
    }
}

/// Merges one provider's model sources into display order.
pub fn merge_model_catalog(
    provider_id: &str,
    api_models: Vec<AvailableModel>,
    manual_models: &[ManualModel],
    overrides: &[ModelOverride],
) -> Vec<ModelConfig> {
    let manual = manual_models
        .iter()
        .filter(|model| model.provider_id == provider_id)
        .cloned()
        .collect::<Vec<_>>();
    let manual_ids = manual
        .iter()
        .map(|model| model.model_id.clone())
        .collect::<HashSet<_>>();

    let mut seen = HashSet::new();
    let mut merged = api_models
        .into_iter()
        .filter(|model| !manual_ids.contains(&model.id))
        .filter(|model| seen.insert(model.id.clone()))
        .map(|model| ModelConfig::from_api(provider_id, model))
        .chain(manual.into_iter().map(ManualModel::into_config))
        .collect::<Vec<_>>();

    for config in &mut merged {
        let model_id = config.model_id.clone();
        overrides
            .iter()
            .filter(|item| item.provider_id == provider_id && item.model_id == model_id)
            .for_each(|item| item.apply(config));
    }

    merged.sort_by(|left, right| {
        left.sort_order
            .cmp(&right.sort_order)
            .then_with(|| left.display_name.cmp(&right.display_name))
    });
    merged
}

fn enabled_by_default() -> bool {
    true
}

/// Resolved configuration for one send.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub provider: ProviderConfig,
    pub model: ModelConfig,
}

/// Lists `source`'s live models and merges them with the manual and override layers.
pub async fn fetch_model_catalog(
    provider_id: &str,
    source: &dyn ModelProvider,
    manual_models: &[ManualModel],
    overrides: &[ModelOverride],
) -> Result<Vec<ModelConfig>, ProviderError> {
    let listed = source.list_models().await?;
    Ok(merge_model_catalog(provider_id, listed, manual_models, overrides))
}

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    providers: Vec<ProviderConfig>,
    models: Vec<ModelConfig>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_provider(&mut self, provider: ProviderConfig) {
        match self.providers.iter_mut().find(|item| item.id == provider.id) {
            Some(existing) => *existing = provider,
            None => self.providers.push(provider),
        }
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.upsert_provider(provider);
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.models
            .retain(|item| !(item.provider_id == model.provider_id && item.model_id == model.model_id));
        self.models.push(model);
        self
    }

    /// Replaces every model of `provider_id` with a freshly merged list.
    pub fn replace_models(&mut self, provider_id: &str, models: Vec<ModelConfig>) {
        self.models.retain(|item| item.provider_id != provider_id);
        self.models.extend(models);
    }

    /// Re-lists `provider`'s models from `source` and replaces its entries. Returns the new count.
    ///
    /// A failed listing leaves the catalog untouched.
    pub async fn refresh_provider(
        &mut self,
        provider: &ProviderConfig,
        source: &dyn ModelProvider,
        manual_models: &[ManualModel],
        overrides: &[ModelOverride],
    ) -> Result<usize, ProviderError> {
        let models = fetch_model_catalog(&provider.id, source, manual_models, overrides).await?;
        let count = models.len();
        self.upsert_provider(provider.clone());
        self.replace_models(&provider.id, models);
        Ok(count)
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn provider(&self, provider_id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|item| item.id == provider_id)
    }

    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    pub fn enabled_models(&self) -> Vec<&ModelConfig> {
        self.models
            .iter()
            .filter(|model| {
                model.enabled
                    && self
                        .provider(&model.provider_id)
                        .is_some_and(|provider| provider.enabled)
            })
            .collect()
    }

    /// Looks up a model for sending, rejecting unknown or disabled entries.
    pub fn resolve(&self, key: &ModelKey) -> Result<ResolvedModel, ProviderError> {
        let provider = self.provider(&key.provider_id).ok_or_else(|| {
            ProviderError::invalid_request(format!("unknown provider '{}'", key.provider_id))
        })?;
        if !provider.enabled {
            return Err(ProviderError::invalid_request(format!(
                "provider '{}' is disabled",
                key.provider_id
            )));
        }

        let model = self
            .models
            .iter()
            .find(|item| item.provider_id == key.provider_id && item.model_id == key.model_id)
            .ok_or_else(|| ProviderError::invalid_request(format!("unknown model '{key}'")))?;
        if !model.enabled {
            return Err(ProviderError::invalid_request(format!(
                "model '{key}' is disabled"
            )));
        }

        Ok(ResolvedModel {
            provider: provider.clone(),
            model: model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_models_suppress_listed_models_with_same_id() {
        let merged = merge_model_catalog(
            "p",
            vec![
                AvailableModel::new("a").with_display_name("Listed A"),
                AvailableModel::new("b"),
            ],
            &[ManualModel::new("p", "a").with_display_name("Manual A")],
            &[],
        );

        let a = merged
            .iter()
            .filter(|item| item.model_id == "a")
            .collect::<Vec<_>>();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].display_name, "Manual A");
        assert_eq!(a[0].source, ModelSource::Manual);
    }

    #[test]
    fn overrides_layer_on_top_and_drive_ordering() {
        let merged = merge_model_catalog(
            "p",
            vec![AvailableModel::new("zeta"), AvailableModel::new("alpha")],
            &[ManualModel::new("other", "ignored")],
            &[
                ModelOverride::new("p", "zeta")
                    .with_sort_order(-1)
                    .with_protocol(ProtocolKind::Responses),
                ModelOverride::new("p", "alpha").disabled(),
            ],
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].model_id, "zeta");
        assert_eq!(merged[0].protocol, ProtocolKind::Responses);
        assert!(!merged[1].enabled);
    }

    #[test]
    fn overrides_apply_to_the_matching_listed_model() {
        let merged = merge_model_catalog(
            "p",
            vec![AvailableModel::new("a"), AvailableModel::new("b")],
            &[],
            &[ModelOverride::new("p", "b").disabled(), ModelOverride::new("q", "a").disabled()],
        );

        let a = merged.iter().find(|item| item.model_id == "a").expect("a listed");
        let b = merged.iter().find(|item| item.model_id == "b").expect("b listed");
        assert!(a.enabled);
        assert!(!b.enabled);
    }

    struct ListingProvider {
        models: Result<Vec<AvailableModel>, ProviderError>,
    }

    impl ModelProvider for ListingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAiCompatible
        }

        fn list_models<'a>(
            &'a self,
        ) -> crate::ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
            let models = self.models.clone();
            Box::pin(async move { models })
        }

        fn complete<'a>(
            &'a self,
            _request: crate::ModelRequest,
        ) -> crate::ProviderFuture<'a, Result<crate::ModelResponse, ProviderError>> {
            Box::pin(async { Err(ProviderError::unsupported("listing only")) })
        }

        fn stream<'a>(
            &'a self,
            _request: crate::ModelRequest,
        ) -> crate::ProviderFuture<'a, Result<crate::BoxedEventStream<'a>, ProviderError>> {
            Box::pin(async { Err(ProviderError::unsupported("listing only")) })
        }
    }

    #[tokio::test]
    async fn refresh_provider_merges_live_listing_with_manual_and_overrides() {
        let provider = ProviderConfig::new("p", ProviderKind::OpenAiCompatible);
        let source = ListingProvider {
            models: Ok(vec![
                AvailableModel::new("shared").with_display_name("Listed"),
                AvailableModel::new("retired"),
                AvailableModel::new("fresh"),
            ]),
        };
        let mut catalog = ModelCatalog::new()
            .with_provider(provider.clone())
            .with_model(ModelConfig::new("p", "stale"))
            .with_model(ModelConfig::new("other", "kept"));

        let count = catalog
            .refresh_provider(
                &provider,
                &source,
                &[ManualModel::new("p", "shared").with_display_name("Pinned")],
                &[ModelOverride::new("p", "retired").disabled()],
            )
            .await
            .expect("listing succeeds");

        assert_eq!(count, 3);
        let ids = catalog
            .models()
            .iter()
            .filter(|item| item.provider_id == "p")
            .map(|item| item.model_id.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(ids, HashSet::from(["shared", "retired", "fresh"]));

        let shared = catalog.resolve(&ModelKey::new("p", "shared")).expect("shared resolves");
        assert_eq!(shared.model.display_name, "Pinned");
        assert_eq!(shared.model.source, ModelSource::Manual);
        assert!(catalog.resolve(&ModelKey::new("p", "retired")).is_err());
        assert!(catalog.resolve(&ModelKey::new("p", "fresh")).is_ok());
        assert!(catalog.resolve(&ModelKey::new("other", "kept")).is_err());
        assert_eq!(catalog.models().len(), 4);
    }

    #[tokio::test]
    async fn failed_listing_leaves_catalog_untouched() {
        let provider = ProviderConfig::new("p", ProviderKind::OpenAiCompatible);
        let source = ListingProvider {
            models: Err(ProviderError::unsupported("offline")),
        };
        let mut catalog = ModelCatalog::new()
            .with_provider(provider.clone())
            .with_model(ModelConfig::new("p", "cached"));

        assert!(catalog.refresh_provider(&provider, &source, &[], &[]).await.is_err());
        assert!(catalog.resolve(&ModelKey::new("p", "cached")).is_ok());
    }

    #[test]
    fn resolve_rejects_unknown_and_disabled_models() {
        let catalog = ModelCatalog::new()
            .with_provider(ProviderConfig::new("openai", ProviderKind::OpenAi))
            .with_model(ModelConfig::new("openai", "gpt-4o"))
            .with_model({
                let mut model = ModelConfig::new("openai", "old");
                model.enabled = false;
                model
            });

        assert!(catalog.resolve(&ModelKey::new("openai", "gpt-4o")).is_ok());
        assert!(catalog.resolve(&ModelKey::new("openai", "old")).is_err());
        assert!(catalog.resolve(&ModelKey::new("openai", "missing")).is_err());
        assert!(catalog.resolve(&ModelKey::new("nope", "gpt-4o")).is_err());
        assert_eq!(catalog.enabled_models().len(), 1);
    }

    #[test]
    fn model_key_round_trips_through_display() {
        let key = ModelKey::parse("ollama/library/llama3").expect("key should parse");
        assert_eq!(key.provider_id, "ollama");
        assert_eq!(key.model_id, "library/llama3");
        assert_eq!(key.to_string(), "ollama/library/llama3");
        assert!(ModelKey::parse("missing-slash").is_none());
    }

    #[test]
    fn provider_config_never_serializes_api_key() {
        let config = ProviderConfig::new("openai", ProviderKind::OpenAi).with_api_key("sk-secret");
        let json = serde_json::to_string(&config).expect("config should serialize");
        assert!(!json.contains("sk-secret"));
    }
}
