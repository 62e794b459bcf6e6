//! End-to-end pipeline runs against mocked upstream services.

use permit_core::signature::read_signature_value;
use permit_core::{PermitError, PermitOutcome, RequestContext, SignatureProvider, UpstreamService};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{expected_permit_key, harness, issued_key, SCENARIO_UPN};

async fn mount_user_permits(server: &MockServer, licence_id: i64, upn: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/userpermits/{licence_id}/s100")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "licenceId": licence_id,
            "userPermits": [{"title": "Vessel One", "upn": upn}]
        })))
        .mount(server)
        .await;
}

async fn mount_holdings(server: &MockServer, licence_id: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/holdings/{licence_id}/s100")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "productCode": "P1",
            "productTitle": "Chart Product",
            "expiryDate": "2026-01-31T00:00:00Z",
            "cells": [{
                "cellCode": "101GB004",
                "cellTitle": "Approaches",
                "latestEditionNumber": 1,
                "latestUpdateNumber": 0
            }]
        }])))
        .mount(server)
        .await;
}

fn keys_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!([{
        "productName": "101GB004",
        "edition": "1",
        "key": issued_key()
    }]))
}

#[tokio::test]
async fn test_single_user_single_cell() {
    let h = harness(3).await;
    mount_user_permits(&h.server, 1, SCENARIO_UPN).await;
    mount_holdings(&h.server, 1).await;
    Mock::given(method("POST"))
        .and(path("/keys/s100"))
        .and(body_json(json!([{"productName": "101GB004", "edition": "1"}])))
        .respond_with(keys_response())
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h
        .engine
        .generate(1, &RequestContext::new("corr-a"))
        .await
        .unwrap();
    assert_eq!(outcome.status_code(), 200);

    let permits = outcome.permits().unwrap();
    assert_eq!(permits.len(), 1);
    let permit = &permits["Vessel One"];

    assert_eq!(permit.xml.matches("<S100SE:product id=").count(), 1);
    assert!(permit.xml.contains(r#"<S100SE:product id="S-101">"#));
    assert_eq!(permit.xml.matches("<S100SE:datasetPermit>").count(), 1);
    assert!(permit.xml.contains("<S100SE:filename>101GB004</S100SE:filename>"));
    assert!(permit.xml.contains("<S100SE:editionNumber>1</S100SE:editionNumber>"));
    assert!(permit.xml.contains("<S100SE:expiry>2026-01-31</S100SE:expiry>"));
    assert!(permit.xml.contains(&format!("<S100SE:userpermit>{SCENARIO_UPN}</S100SE:userpermit>")));
    assert!(permit.xml.contains(&format!(
        "<S100SE:encryptedKey>{}</S100SE:encryptedKey>",
        expected_permit_key(SCENARIO_UPN)
    )));
    assert!(h.engine.schema().is_valid(&permit.xml));

    let signature = read_signature_value(&permit.signature_xml).unwrap();
    assert_eq!(signature, permit.signature);
    assert!(SignatureProvider::verify(&permit.xml, &signature, &h.public_key).unwrap());
}

#[tokio::test]
async fn test_empty_user_permits_skip_downstream() {
    let h = harness(3).await;
    Mock::given(path("/userpermits/2/s100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "licenceId": 2,
            "userPermits": []
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(path("/holdings/2/s100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;
    Mock::given(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let outcome = h
        .engine
        .generate(2, &RequestContext::new("corr-b"))
        .await
        .unwrap();
    assert_eq!(outcome, PermitOutcome::NoContent);
    assert_eq!(outcome.status_code(), 204);
}

#[tokio::test]
async fn test_empty_holdings_body_is_no_content() {
    let h = harness(3).await;
    mount_user_permits(&h.server, 5, SCENARIO_UPN).await;
    Mock::given(path("/holdings/5/s100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let outcome = h
        .engine
        .generate(5, &RequestContext::new("corr-b2"))
        .await
        .unwrap();
    assert_eq!(outcome, PermitOutcome::NoContent);
}

#[tokio::test]
async fn test_key_service_recovers_after_two_unavailable() {
    let h = harness(2).await;
    mount_user_permits(&h.server, 3, SCENARIO_UPN).await;
    mount_holdings(&h.server, 3).await;
    Mock::given(method("POST"))
        .and(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/keys/s100"))
        .respond_with(keys_response())
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h
        .engine
        .generate(3, &RequestContext::new("corr-c"))
        .await
        .unwrap();
    assert_eq!(outcome.permits().unwrap().len(), 1);

    let key_calls = h
        .server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/keys/s100")
        .count();
    assert_eq!(key_calls, 3);
}

#[tokio::test]
async fn test_short_upn_fails_before_holdings() {
    let h = harness(3).await;
    mount_user_permits(&h.server, 4, &SCENARIO_UPN[..45]).await;
    Mock::given(path("/holdings/4/s100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .engine
        .generate(4, &RequestContext::new("corr-d"))
        .await
        .unwrap_err();
    let PermitError::Validation { errors } = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "userPermits[0].upn");
    assert!(errors[0].message.contains("must be 46 characters"));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_holdings_not_found_carries_origin() {
    let h = harness(3).await;
    mount_user_permits(&h.server, 6, SCENARIO_UPN).await;
    Mock::given(path("/holdings/6/s100"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{"source": "licenceId", "description": "Licence not found"}]
        })))
        .mount(&h.server)
        .await;

    let err = h
        .engine
        .generate(6, &RequestContext::new("corr-404"))
        .await
        .unwrap_err();
    assert_eq!(err.origin(), Some(UpstreamService::Holdings));
    assert_eq!(err.status_code(), 404);

    let response = err.to_response("corr-404");
    assert_eq!(response.origin.as_deref(), Some("Holdings"));
    assert_eq!(response.errors[0].description, "Licence not found");
}

#[tokio::test]
async fn test_key_service_failure_is_generic() {
    let h = harness(3).await;
    mount_user_permits(&h.server, 7, SCENARIO_UPN).await;
    mount_holdings(&h.server, 7).await;
    Mock::given(path("/keys/s100"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let err = h
        .engine
        .generate(7, &RequestContext::new("corr-401"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PermitError::UpstreamFailure {
            origin: UpstreamService::ProductKeyService,
            status: 401
        }
    ));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_unknown_manufacturer_fails() {
    let h = harness(3).await;
    let hardware_id = &SCENARIO_UPN[..32];
    let upn = permit_core::upn::Upn::compose(hardware_id, "ZZZZZZ").unwrap();
    mount_user_permits(&h.server, 8, upn.as_str()).await;
    mount_holdings(&h.server, 8).await;
    Mock::given(path("/keys/s100"))
        .respond_with(keys_response())
        .mount(&h.server)
        .await;

    let err = h
        .engine
        .generate(8, &RequestContext::new("corr-mfr"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PermitError::ManufacturerKeyNotFound { ref manufacturer_id } if manufacturer_id == "ZZZZZZ"
    ));
}
