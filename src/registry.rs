//! Static provider catalog.
//!
//! Providers are loaded once from configuration into immutable records; the
//! dispatcher only ever iterates them in declaration order. Transient
//! per-model failures live in the dispatcher's session state, never here.

use crate::config::{AuthScheme, ProviderConfig};

/// Immutable description of one remote provider.
#[derive(Debug, Clone)]
pub struct Provider {
    pub id: String,
    pub base_url: String,
    pub auth_scheme: AuthScheme,
    /// Ordered model list; index 0 is the primary model.
    pub models: Vec<String>,
    pub enabled: bool,
}

impl Provider {
    pub fn has_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// Load-time catalog of providers.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    pub fn from_config(configs: &[ProviderConfig]) -> Self {
        let providers = configs
            .iter()
            .map(|c| Provider {
                id: c.id.clone(),
                base_url: c.base_url.trim_end_matches('/').to_string(),
                auth_scheme: c.auth_scheme,
                models: c.models.clone(),
                enabled: c.enabled,
            })
            .collect();
        Self { providers }
    }

    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Enabled providers in declaration order.
    pub fn iter_enabled(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter().filter(|p| p.enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, enabled: bool) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            base_url: "https://api.example.com/v1/".to_string(),
            auth_scheme: AuthScheme::Bearer,
            models: vec!["m1".to_string(), "m2".to_string()],
            api_keys: vec!["k".to_string()],
            enabled,
        }
    }

    #[test]
    fn test_registry_preserves_order_and_filters_disabled() {
        let registry = ProviderRegistry::from_config(&[
            config("p1", true),
            config("p2", false),
            config("p3", true),
        ]);
        let enabled: Vec<&str> = registry.iter_enabled().map(|p| p.id.as_str()).collect();
        assert_eq!(enabled, vec!["p1", "p3"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_base_url_is_normalized() {
        let registry = ProviderRegistry::from_config(&[config("p1", true)]);
        assert_eq!(
            registry.get("p1").unwrap().base_url,
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn test_has_model() {
        let registry = ProviderRegistry::from_config(&[config("p1", true)]);
        let provider = registry.get("p1").unwrap();
        assert!(provider.has_model("m2"));
        assert!(!provider.has_model("m9"));
    }
}
