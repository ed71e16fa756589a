//! Identity model shared by providers, stores and the resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Free-form JSON object used for provider data and token/session payloads.
pub type JsonMap = Map<String, JsonValue>;

/// Minimal identity produced by exactly one provider for one request.
///
/// Never persisted as-is. `provider_data` may carry a decoded token so that the
/// same request can escalate without verifying it twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIdentity {
    pub provider: String,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<JsonMap>,
}

impl ProviderIdentity {
    pub fn new(provider: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            provider_id: provider_id.into(),
            provider_data: None,
        }
    }

    pub fn with_data(mut self, data: JsonMap) -> Self {
        self.provider_data = Some(data);
        self
    }

    /// Debug tag `"{provider}:{provider_id}"`.
    pub fn ident(&self) -> String {
        format!("{}:{}", self.provider, self.provider_id)
    }

    pub fn data(&self, key: &str) -> Option<&JsonValue> {
        self.provider_data.as_ref().and_then(|d| d.get(key))
    }
}

/// Durable principal a provider identity escalates to.
///
/// `(provider, provider_id)` is unique across identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub user_type: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub source: ProviderIdentity,
}

impl Identity {
    pub fn provider(&self) -> &str {
        &self.source.provider
    }

    pub fn provider_id(&self) -> &str {
        &self.source.provider_id
    }

    /// Debug tag `"{type}:{user_id}"`.
    pub fn ident(&self) -> String {
        format!("{}:{}", self.user_type, self.user_id)
    }
}

/// Optional profile enrichment a provider may expose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: JsonMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ident_tags() {
        let pi = ProviderIdentity::new("local", "alice@example.com");
        assert_eq!(pi.ident(), "local:alice@example.com");

        let identity = Identity {
            id: "i-1".into(),
            user_id: "u-1".into(),
            user_type: "customer".into(),
            disabled: false,
            created_at: Utc::now(),
            source: pi,
        };
        assert_eq!(identity.ident(), "customer:u-1");
        assert_eq!(identity.provider(), "local");
    }

    #[test]
    fn identity_serializes_flat_with_type_field() {
        let identity = Identity {
            id: "i-1".into(),
            user_id: "u-1".into(),
            user_type: "admin".into(),
            disabled: true,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
            source: ProviderIdentity::new("google", "g-42"),
        };

        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["type"], json!("admin"));
        assert_eq!(value["provider"], json!("google"));
        assert_eq!(value["providerId"], json!("g-42"));
        assert_eq!(value["userId"], json!("u-1"));
        assert!(value.get("providerData").is_none());

        let back: Identity = serde_json::from_value(value).unwrap();
        assert_eq!(back, identity);
    }
}
