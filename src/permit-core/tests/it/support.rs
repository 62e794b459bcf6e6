//! Shared fixtures for the integration tests.

use std::sync::Arc;
use std::time::Duration;

use permit_core::{
    PermitConfig, PermitEngine, RetryPolicy, ServiceClient, ServiceEndpoint, StaticTokenSource,
    TokenProvider, UpstreamService,
};
use permit_crypto::{DigestSigner, P384Signer};
use permit_keyring::MemorySecretStore;
use wiremock::MockServer;

pub const NEUTRAL_HWID: &str = "86C520323CEA3056B5ED7000F98814CB";
pub const MANUFACTURER_ID: &str = "J0K1L2";
pub const MANUFACTURER_KEY: &str = "0123456789ABCDEF0123456789ABCDEF";
pub const PLAIN_KEY: &str = "FEDCBA9876543210FEDCBA9876543210";
pub const SCENARIO_UPN: &str = "EF1C61C926BD9F18F44897CA1A5214BE06F92FF8J0K1L2";
pub const TOKEN: &str = "test-token";

/// Retry policy with a short backoff base; the first retry still waits 1s.
pub fn fast_retry(retry_count: u32) -> RetryPolicy {
    RetryPolicy {
        retry_count,
        sleep_duration_base: 0.01,
    }
}

pub fn config(base_url: &str, retry_count: u32) -> PermitConfig {
    PermitConfig {
        holdings_service: ServiceEndpoint::new(base_url, "holdings"),
        user_permit_service: ServiceEndpoint::new(base_url, "userpermits"),
        product_key_service: ServiceEndpoint::new(base_url, "productkeys"),
        retry: fast_retry(retry_count),
        request_timeout_secs: 5,
        manufacturer_neutral_hardware_id: NEUTRAL_HWID.into(),
        ..PermitConfig::default()
    }
}

pub fn service_client(
    server: &MockServer,
    origin: UpstreamService,
    retry_count: u32,
    token: &str,
) -> ServiceClient {
    let tokens = Arc::new(TokenProvider::new(
        Arc::new(StaticTokenSource::new(token, Duration::from_secs(3600))),
        Duration::from_secs(60),
    ));
    let client = permit_core::https::build_http_client(Duration::from_secs(5)).unwrap();
    ServiceClient::new(
        client,
        &ServiceEndpoint::new(server.uri(), "svc"),
        origin,
        tokens,
        fast_retry(retry_count),
    )
}

pub struct Harness {
    pub server: MockServer,
    pub engine: PermitEngine,
    pub public_key: Vec<u8>,
}

pub async fn harness(retry_count: u32) -> Harness {
    let server = MockServer::start().await;
    let config = config(&server.uri(), retry_count);

    let signer = P384Signer::random();
    let public_key = signer.public_key().unwrap();
    let store = MemorySecretStore::new()
        .with_secret(MANUFACTURER_ID, MANUFACTURER_KEY)
        .with_secret(
            config.signing_key_secret_name.as_str(),
            signer.to_base64().unwrap().as_str(),
        )
        .with_certificate(config.certificate_secret_name.as_str(), vec![0x30, 0x82, 0x01, 0x0A]);

    let engine = PermitEngine::from_config(
        config,
        Arc::new(store),
        Arc::new(StaticTokenSource::new(TOKEN, Duration::from_secs(3600))),
    )
    .unwrap();

    Harness {
        server,
        engine,
        public_key,
    }
}

/// Product key as the key service issues it.
pub fn issued_key() -> String {
    permit_crypto::encrypt(PLAIN_KEY, NEUTRAL_HWID).unwrap()
}

/// Key expected in the permit for a user with `upn`.
pub fn expected_permit_key(upn: &str) -> String {
    let hardware_id = permit_crypto::decrypt(&upn[..32], MANUFACTURER_KEY).unwrap();
    permit_crypto::encrypt(PLAIN_KEY, &hardware_id).unwrap()
}
