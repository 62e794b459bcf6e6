//! Upstream client behaviour: headers, classification, retry, cancellation.

use std::time::{Duration, Instant};

use permit_core::{ErrorResponse, PermitError, RequestContext, UpstreamService, CORRELATION_ID_HEADER};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{service_client, TOKEN};

#[tokio::test]
async fn test_sends_bearer_and_correlation_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .and(header(CORRELATION_ID_HEADER, "corr-h"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 0, TOKEN);
    let body: Option<serde_json::Value> = client
        .get_json("/ping", &RequestContext::new("corr-h"))
        .await
        .unwrap();
    assert_eq!(body, Some(json!({"ok": true})));
}

#[tokio::test]
async fn test_empty_token_sends_no_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 0, "");
    let _: Option<Vec<u32>> = client
        .get_json("/ping", &RequestContext::new("corr-e"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_empty_and_null_bodies_are_none() {
    let server = MockServer::start().await;
    Mock::given(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/null"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 0, TOKEN);
    let ctx = RequestContext::new("corr-n");
    let empty: Option<Vec<u32>> = client.get_json("/empty", &ctx).await.unwrap();
    let null: Option<Vec<u32>> = client.get_json("/null", &ctx).await.unwrap();
    assert!(empty.is_none());
    assert!(null.is_none());
}

#[tokio::test]
async fn test_bad_request_is_domain_failure_with_body() {
    let server = MockServer::start().await;
    Mock::given(path("/userpermits/7/s100"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "correlationId": "upstream-corr",
            "errors": [{"source": "licenceId", "description": "Licence not valid"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::UserPermitService, 3, TOKEN);
    let err = client
        .get_json::<serde_json::Value>("/userpermits/7/s100", &RequestContext::new("corr-400"))
        .await
        .unwrap_err();

    let PermitError::UpstreamDomain { origin, status, detail } = &err else {
        panic!("expected domain failure, got {err:?}");
    };
    assert_eq!(*origin, UpstreamService::UserPermitService);
    assert_eq!(*status, 400);
    assert_eq!(detail.errors[0].source, "licenceId");
    assert_eq!(detail.origin.as_deref(), Some("UserPermitService"));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_not_found_without_json_body() {
    let server = MockServer::start().await;
    Mock::given(path("/holdings/9/s100"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such licence"))
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 3, TOKEN);
    let err = client
        .get_json::<serde_json::Value>("/holdings/9/s100", &RequestContext::new("corr-404"))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 404);
    assert_eq!(err.origin(), Some(UpstreamService::Holdings));
    let response: ErrorResponse = err.to_response("corr-404");
    assert_eq!(response.correlation_id.as_deref(), Some("corr-404"));
    assert_eq!(response.origin.as_deref(), Some("Holdings"));
    assert_eq!(response.errors[0].description, "no such licence");
}

#[tokio::test]
async fn test_server_error_is_generic_failure_without_retry() {
    let server = MockServer::start().await;
    Mock::given(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::ProductKeyService, 3, TOKEN);
    let err = client
        .post_json::<_, serde_json::Value>("/keys/s100", &json!([]), &RequestContext::new("corr-500"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PermitError::UpstreamFailure {
            origin: UpstreamService::ProductKeyService,
            status: 500
        }
    ));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_unavailable_with_no_retries_left() {
    let server = MockServer::start().await;
    Mock::given(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::ProductKeyService, 0, TOKEN);
    let err = client
        .post_json::<_, serde_json::Value>("/keys/s100", &json!([]), &RequestContext::new("corr-503"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PermitError::RetriesExhausted {
            status: 503,
            attempts: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_too_many_requests_is_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/holdings/1/s100"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "10"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/holdings/1/s100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 1, TOKEN);
    let body: Option<Vec<u32>> = client
        .get_json("/holdings/1/s100", &RequestContext::new("corr-429"))
        .await
        .unwrap();
    assert_eq!(body, Some(vec![1, 2]));
}

#[tokio::test]
async fn test_unparseable_success_body() {
    let server = MockServer::start().await;
    Mock::given(path("/holdings/1/s100"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 0, TOKEN);
    let err = client
        .get_json::<Vec<u32>>("/holdings/1/s100", &RequestContext::new("corr-bad"))
        .await
        .unwrap_err();
    assert!(matches!(err, PermitError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_cancelled_context_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(path("/holdings/1/s100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 0, TOKEN);
    let ctx = RequestContext::new("corr-cancel");
    ctx.cancellation.cancel();

    let err = client
        .get_json::<Vec<u32>>("/holdings/1/s100", &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, PermitError::Cancelled));
}

#[tokio::test]
async fn test_unavailable_until_retries_run_out() {
    let server = MockServer::start().await;
    Mock::given(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::ProductKeyService, 2, TOKEN);
    let err = client
        .post_json::<_, serde_json::Value>("/keys/s100", &json!([]), &RequestContext::new("corr-exhaust"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PermitError::RetriesExhausted {
            origin: UpstreamService::ProductKeyService,
            status: 503,
            attempts: 3,
        }
    ));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_retry_after_is_waited_before_backoff() {
    let server = MockServer::start().await;
    Mock::given(path("/holdings/1/s100"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "800"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/holdings/1/s100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([7])))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 1, TOKEN);
    let started = Instant::now();
    let body: Option<Vec<u32>> = client
        .get_json("/holdings/1/s100", &RequestContext::new("corr-retry-after"))
        .await
        .unwrap();

    assert_eq!(body, Some(vec![7]));
    // 800ms Retry-After plus the 1s first backoff
    assert!(started.elapsed() >= Duration::from_millis(1800));
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let server = MockServer::start().await;
    Mock::given(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::ProductKeyService, 3, TOKEN);
    let ctx = RequestContext::new("corr-cancel-backoff");
    let token = ctx.cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = client
        .post_json::<_, serde_json::Value>("/keys/s100", &json!([]), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, PermitError::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn test_cancel_during_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(path("/holdings/1/s100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([1]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = service_client(&server, UpstreamService::Holdings, 0, TOKEN);
    let ctx = RequestContext::new("corr-cancel-flight");
    let token = ctx.cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = client
        .get_json::<Vec<u32>>("/holdings/1/s100", &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, PermitError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
}
