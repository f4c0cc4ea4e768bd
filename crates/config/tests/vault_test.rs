//! Integration tests for the vault secret backend
//!
//! The token endpoint and the Key Vault data plane are both served by wiremock.

use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certbeam_config::secrets::{AzureCredential, SecretBackend, VaultSecret, DEFAULT_SECRET_NAME};
use certbeam_config::{ConfigError, ProcessEnv};

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "vault-access-token"
        })))
        .mount(server)
        .await;
}

fn service_principal(server: &MockServer) -> AzureCredential {
    let env = ProcessEnv::from_vars([
        ("AZURE_TENANT_ID", "tenant".to_string()),
        ("AZURE_CLIENT_ID", "client".to_string()),
        ("AZURE_CLIENT_SECRET", "secret".to_string()),
        ("AZURE_AUTHORITY_HOST", server.uri()),
    ])
    .unwrap();
    AzureCredential::from_env(&env).unwrap()
}

fn vault_secret(server: &MockServer, credential: AzureCredential) -> SecretBackend {
    let vault = Url::parse(&server.uri()).unwrap();
    SecretBackend::Vault(VaultSecret::new(vault, DEFAULT_SECRET_NAME, credential))
}

mod service_principal {
    use super::*;

    #[tokio::test]
    async fn test_fetch_secret_strips_newline() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;

        Mock::given(method("GET"))
            .and(path("/secrets/do-auth-token"))
            .and(query_param("api-version", "7.4"))
            .and(header("authorization", "Bearer vault-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "do-token\n",
                "id": "https://example.vault.azure.net/secrets/do-auth-token/1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = vault_secret(&server, service_principal(&server));
        let token = backend.fetch(&reqwest::Client::new()).await.unwrap();

        assert_eq!(token, "do-token");
    }

    #[tokio::test]
    async fn test_secret_not_found() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;

        Mock::given(method("GET"))
            .and(path("/secrets/do-auth-token"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "code": "SecretNotFound" }
            })))
            .mount(&server)
            .await;

        let backend = vault_secret(&server, service_principal(&server));
        let err = backend.fetch(&reqwest::Client::new()).await.unwrap_err();

        match err {
            ConfigError::NotFound { secret_name, .. } => assert_eq!(secret_name, "do-auth-token"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_access_denied() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;

        Mock::given(method("GET"))
            .and(path("/secrets/do-auth-token"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let backend = vault_secret(&server, service_principal(&server));
        let err = backend.fetch(&reqwest::Client::new()).await.unwrap_err();

        assert!(matches!(err, ConfigError::Auth(_)));
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;

        Mock::given(method("GET"))
            .and(path("/secrets/do-auth-token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = vault_secret(&server, service_principal(&server));
        let err = backend.fetch(&reqwest::Client::new()).await.unwrap_err();

        assert!(matches!(err, ConfigError::VaultRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_secret() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;

        Mock::given(method("GET"))
            .and(path("/secrets/do-auth-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": "\n" })),
            )
            .mount(&server)
            .await;

        let backend = vault_secret(&server, service_principal(&server));
        let err = backend.fetch(&reqwest::Client::new()).await.unwrap_err();

        assert!(matches!(err, ConfigError::EmptyConfig { .. }));
    }

    #[tokio::test]
    async fn test_rejected_client_secret() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;

        // The secret must never be requested without a token
        Mock::given(method("GET"))
            .and(path("/secrets/do-auth-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let backend = vault_secret(&server, service_principal(&server));
        let err = backend.fetch(&reqwest::Client::new()).await.unwrap_err();

        assert!(matches!(err, ConfigError::Auth(_)));
    }
}

mod managed_identity {
    use super::*;

    #[tokio::test]
    async fn test_app_service_identity() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(query_param("resource", "https://vault.azure.net"))
            .and(header("x-identity-header", "identity-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "msi-token",
                "expires_on": "1700000000"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/secrets/custom-secret"))
            .and(header("authorization", "Bearer msi-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": "abc" })),
            )
            .mount(&server)
            .await;

        let env = ProcessEnv::from_vars([
            ("IDENTITY_ENDPOINT", format!("{}/msi/token", server.uri())),
            ("IDENTITY_HEADER", "identity-secret".to_string()),
        ])
        .unwrap();
        let credential = AzureCredential::from_env(&env).unwrap();
        let vault = Url::parse(&server.uri()).unwrap();
        let backend = SecretBackend::Vault(VaultSecret::new(vault, "custom-secret", credential));

        let token = backend.fetch(&reqwest::Client::new()).await.unwrap();
        assert_eq!(token, "abc");
    }
}
