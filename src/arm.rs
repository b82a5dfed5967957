//! Tenant and subscription listing against Azure Resource Manager.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cloud::Cloud;
use crate::identity::{AuthError, TokenCredential};

pub const API_VERSION: &str = "2022-12-01";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to acquire a token to {context}: {source}")]
    Auth {
        context: String,
        #[source]
        source: AuthError,
    },
    #[error("request to {context} failed: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context} returned {status}: {body}")]
    Status {
        context: String,
        status: StatusCode,
        body: String,
    },
}

impl DirectoryError {
    /// True when the underlying failure only goes away with another login.
    pub fn requires_login(&self) -> bool {
        matches!(self, DirectoryError::Auth { source, .. } if source.requires_login())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    pub tenant_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub default_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub subscription_id: String,
    pub display_name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// The two directory listings discovery needs.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Tenants visible to the identity behind `credential`.
    async fn list_tenants(
        &self,
        credential: &dyn TokenCredential,
    ) -> Result<Vec<TenantInfo>, DirectoryError>;

    /// Subscriptions visible through the tenant `credential` is scoped to.
    async fn list_subscriptions(
        &self,
        credential: &dyn TokenCredential,
    ) -> Result<Vec<SubscriptionInfo>, DirectoryError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default)]
    next_link: Option<String>,
}

pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    scope: String,
}

impl ArmClient {
    pub fn new(cloud: &Cloud) -> Self {
        Self::with_endpoint(cloud.resource_manager, cloud.resource_manager_scope)
    }

    pub fn with_endpoint(endpoint: &str, scope: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            scope: scope.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}?api-version={API_VERSION}", self.endpoint)
    }

    async fn list_all<T: DeserializeOwned>(
        &self,
        credential: &dyn TokenCredential,
        path: &str,
        context: &str,
    ) -> Result<Vec<T>, DirectoryError> {
        let token = credential
            .get_token(&[self.scope.as_str()])
            .await
            .map_err(|source| DirectoryError::Auth {
                context: context.to_string(),
                source,
            })?;

        let mut items = Vec::new();
        let mut next = Some(self.url(path));
        while let Some(url) = next.take() {
            debug!(%url, "GET");
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token.token)
                .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
                .send()
                .await
                .map_err(|source| DirectoryError::Http {
                    context: context.to_string(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DirectoryError::Status {
                    context: context.to_string(),
                    status,
                    body,
                });
            }

            let page: Page<T> = response.json().await.map_err(|source| DirectoryError::Http {
                context: context.to_string(),
                source,
            })?;
            items.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }
        Ok(items)
    }
}

#[async_trait]
impl ResourceDirectory for ArmClient {
    async fn list_tenants(
        &self,
        credential: &dyn TokenCredential,
    ) -> Result<Vec<TenantInfo>, DirectoryError> {
        self.list_all(credential, "/tenants", "list tenants").await
    }

    async fn list_subscriptions(
        &self,
        credential: &dyn TokenCredential,
    ) -> Result<Vec<SubscriptionInfo>, DirectoryError> {
        self.list_all(credential, "/subscriptions", "list subscriptions")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::AZURE_PUBLIC;
    use crate::identity::AccessToken;
    use chrono::Utc;
    use httpmock::prelude::*;
    use serde_json::json;

    const SCOPE: &str = "https://management.core.windows.net//.default";

    struct StaticToken;

    #[async_trait]
    impl TokenCredential for StaticToken {
        async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError> {
            assert_eq!(scopes, [SCOPE]);
            Ok(AccessToken {
                token: "arm-token".into(),
                expires_on: Utc::now() + chrono::Duration::hours(1),
            })
        }
    }

    #[tokio::test]
    async fn listing_follows_next_link() {
        let server = MockServer::start();
        let next_link = format!("{}/subscriptions/page/2", server.base_url());
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/subscriptions")
                .query_param("api-version", API_VERSION)
                .header("authorization", "Bearer arm-token")
                .header_exists("x-ms-client-request-id");
            then.status(200).json_body(json!({
                "value": [{"subscriptionId": "s1", "displayName": "Prod", "state": "Enabled", "tenantId": "t1"}],
                "nextLink": next_link,
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/subscriptions/page/2")
                .header("authorization", "Bearer arm-token");
            then.status(200).json_body(json!({
                "value": [{"subscriptionId": "s2", "displayName": "Dev", "state": "Disabled", "tenantId": "t1"}],
                "nextLink": "",
            }));
        });

        let client = ArmClient::with_endpoint(&server.base_url(), SCOPE);
        let subscriptions = client.list_subscriptions(&StaticToken).await.unwrap();

        first.assert();
        second.assert();
        let ids: Vec<&str> = subscriptions.iter().map(|s| s.subscription_id.as_str()).collect();
        assert_eq!(ids, ["s1", "s2"]);
        assert_eq!(subscriptions[1].state.as_deref(), Some("Disabled"));
    }

    #[tokio::test]
    async fn error_status_is_reported_with_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/tenants");
            then.status(403).body("AuthorizationFailed");
        });

        let client = ArmClient::with_endpoint(&server.base_url(), SCOPE);
        let err = client.list_tenants(&StaticToken).await.unwrap_err();
        match &err {
            DirectoryError::Status { context, status, body } => {
                assert_eq!(context, "list tenants");
                assert_eq!(*status, StatusCode::FORBIDDEN);
                assert_eq!(body, "AuthorizationFailed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.requires_login());
    }

    #[test]
    fn tenant_page_parses() {
        let page: Page<TenantInfo> = serde_json::from_value(serde_json::json!({
            "value": [{
                "id": "/tenants/t1",
                "tenantId": "t1",
                "displayName": "Contoso",
                "defaultDomain": "contoso.onmicrosoft.com",
                "tenantCategory": "Home",
            }],
            "nextLink": "https://management.azure.com/tenants?page=2",
        }))
        .unwrap();
        assert_eq!(page.value[0].tenant_id, "t1");
        assert_eq!(page.value[0].default_domain.as_deref(), Some("contoso.onmicrosoft.com"));
        assert!(page.next_link.is_some());
    }

    #[test]
    fn subscription_page_without_next_link() {
        let page: Page<SubscriptionInfo> = serde_json::from_value(serde_json::json!({
            "value": [{
                "id": "/subscriptions/s1",
                "subscriptionId": "s1",
                "displayName": "Prod",
                "state": "Enabled",
                "tenantId": "t1",
            }],
        }))
        .unwrap();
        assert_eq!(page.value[0].state.as_deref(), Some("Enabled"));
        assert!(page.next_link.is_none());
    }

    #[test]
    fn empty_page_has_no_values() {
        let page: Page<SubscriptionInfo> = serde_json::from_str("{}").unwrap();
        assert!(page.value.is_empty());
    }

    #[test]
    fn url_carries_api_version() {
        let client = ArmClient::new(&AZURE_PUBLIC);
        assert_eq!(
            client.url("/tenants"),
            "https://management.azure.com/tenants?api-version=2022-12-01"
        );
    }

    #[test]
    fn auth_failures_bubble_login_hint() {
        let err = DirectoryError::Auth {
            context: "list subscriptions".into(),
            source: AuthError::silent("t1", "no cached refresh token"),
        };
        assert!(err.requires_login());
        assert!(err.to_string().contains("no cached refresh token"));
    }
}
