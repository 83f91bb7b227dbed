mod common;

use axum::{
    body::Body,
    extract::Request,
    http::{header, Method, StatusCode},
};
use chrono::Utc;
use common::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use report_server::auth::{Audience, Claims, FileCertificateRegistry, Grant, ISSUER};
use serde_json::json;
use std::sync::Arc;

fn token_text(body: &axum::body::Bytes) -> String {
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn certificate_exchange_issues_application_token() {
    let ctx = TestContext::new();
    let (status, body) = ctx
        .send(Method::POST, "/token", None, Some(json!({ "mssCert": APP_CERT })))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let claims = ctx.tokens.validate(&token_text(&body)).unwrap();
    assert_eq!(claims.aud, Audience::Application);
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(
        claims.grant,
        Grant::Application {
            certificate: APP_CERT.to_string()
        }
    );
}

#[tokio::test]
async fn developer_exchange_issues_developer_token() {
    let ctx = TestContext::new();
    let (status, body) = ctx
        .send(
            Method::PUT,
            "/token",
            None,
            Some(json!({ "ghUser": DEV_USER, "ghToken": DEV_TOKEN })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let claims = ctx.tokens.validate(&token_text(&body)).unwrap();
    assert_eq!(claims.aud, Audience::Developer);
    assert!(matches!(claims.grant, Grant::Developer { ref username, .. } if username == DEV_USER));
}

#[tokio::test]
async fn mixing_credential_kinds_is_rejected() {
    let ctx = TestContext::new();
    for body in [
        json!({ "mssCert": APP_CERT, "ghUser": DEV_USER }),
        json!({ "mssCert": APP_CERT, "ghToken": DEV_TOKEN }),
        json!({ "mssCert": APP_CERT, "ghUser": DEV_USER, "ghToken": DEV_TOKEN }),
    ] {
        let (status, body) = ctx.send(Method::POST, "/token", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json(&body)["description"],
            "Supply an application certificate or a GitHub user + OAuth token. Not both."
        );
    }
}

#[tokio::test]
async fn incomplete_developer_credentials_are_rejected() {
    let ctx = TestContext::new();
    for body in [
        json!({ "ghUser": DEV_USER }),
        json!({ "ghToken": DEV_TOKEN }),
        json!({}),
    ] {
        let (status, body) = ctx.send(Method::POST, "/token", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let envelope = json(&body);
        assert_eq!(envelope["code"], 400);
        assert_eq!(
            envelope["description"],
            "Authentication requires a GitHub username and OAuth token"
        );
    }
}

#[tokio::test]
async fn malformed_token_request_is_bad_request() {
    let ctx = TestContext::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/token")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = ctx.send_request(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["description"], "JSON format error");
}

#[tokio::test]
async fn unknown_certificate_is_unauthorized() {
    let ctx = TestContext::new();
    let (status, body) = ctx
        .send(Method::POST, "/token", None, Some(json!({ "mssCert": "nope" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["status"], "Unauthorized");
}

#[tokio::test]
async fn developer_login_must_match_the_token_owner() {
    let ctx = TestContext::new();
    let (status, _) = ctx
        .send(
            Method::POST,
            "/token",
            None,
            Some(json!({ "ghUser": "OctoCat", "ghToken": DEV_TOKEN })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_provider_failure_is_service_unavailable() {
    let ctx = TestContext::with_options(TestOptions {
        verifier: VerifierMode::Unavailable,
        ..Default::default()
    });
    let (status, body) = ctx
        .send(
            Method::POST,
            "/token",
            None,
            Some(json!({ "ghUser": DEV_USER, "ghToken": DEV_TOKEN })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["code"], 503);
}

#[tokio::test]
async fn slow_identity_provider_times_out() {
    let ctx = TestContext::with_options(TestOptions {
        verifier: VerifierMode::Hang,
        ..Default::default()
    });
    let (status, _) = ctx
        .send(
            Method::POST,
            "/token",
            None,
            Some(json!({ "ghUser": DEV_USER, "ghToken": DEV_TOKEN })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

/// A directory cannot be read as a certificate list
fn unreadable_registry(dir: &tempfile::TempDir) -> TestOptions {
    TestOptions {
        registry: Some(Arc::new(FileCertificateRegistry::new(dir.path()))),
        ..Default::default()
    }
}

#[tokio::test]
async fn registry_failure_during_exchange_is_service_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::with_options(unreadable_registry(&dir));
    let (status, body) = ctx
        .send(Method::POST, "/token", None, Some(json!({ "mssCert": APP_CERT })))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["code"], 503);
}

#[tokio::test]
async fn registry_failure_during_recheck_is_service_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = TestContext::with_options(unreadable_registry(&dir));
    let token = ctx.application_token(APP_CERT);
    let (status, body) = ctx
        .send(
            Method::POST,
            "/report",
            Some(&token),
            Some(json!({ "gid": "app", "severity": 1, "content": {} })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["code"], 503);
    assert!(ctx.store.all_keys().await.is_empty());
}

#[tokio::test]
async fn application_tokens_cannot_reach_developer_routes() {
    let ctx = TestContext::new();
    let token = ctx.application_token(APP_CERT);

    for (method, uri) in [
        (Method::GET, "/report"),
        (Method::GET, "/report/group/app"),
        (Method::GET, "/report/severity/crash"),
        (Method::GET, "/report/key/app/abc.json"),
        (Method::DELETE, "/report/group/app"),
        (Method::DELETE, "/report/key/app/abc.json"),
        (Method::POST, "/certificate/new-cert"),
        (Method::DELETE, "/certificate/new-cert"),
    ] {
        let (status, _) = ctx.send(method.clone(), uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn missing_or_foreign_tokens_are_unauthorized() {
    let ctx = TestContext::new();
    let (status, _) = ctx.send(Method::GET, "/report", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let now = Utc::now().timestamp();
    let claims = Claims {
        aud: Audience::Developer,
        iss: ISSUER.to_string(),
        iat: now,
        nbf: now,
        exp: now + 3600,
        grant: Grant::Developer {
            username: DEV_USER.to_string(),
            github_token: DEV_TOKEN.to_string(),
        },
    };
    let forged = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    let (status, _) = ctx.send(Method::GET, "/report", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = encode(
        &Header::new(Algorithm::HS512),
        &Claims {
            iat: now - 7200,
            nbf: now - 7200,
            exp: now - 3600,
            ..claims.clone()
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    let (status, _) = ctx.send(Method::GET, "/report", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong_issuer = encode(
        &Header::new(Algorithm::HS512),
        &Claims {
            iss: "someone-else".to_string(),
            ..claims
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    let (status, _) = ctx
        .send(Method::GET, "/report", Some(&wrong_issuer), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn jwt_cookie_is_accepted() {
    let ctx = TestContext::new();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/report/key/app/missing.json")
        .header(header::COOKIE, format!("jwt={}", ctx.developer_token()))
        .body(Body::empty())
        .unwrap();
    let (status, _) = ctx.send_request(request).await;
    // authenticated, the key just does not exist
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn certificate_lifecycle_through_the_api() {
    let ctx = TestContext::new();
    let developer = ctx.developer_token();

    let (status, _) = ctx
        .send(Method::POST, "/certificate/fresh-cert", Some(&developer), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // adding twice is tolerated
    let (status, _) = ctx
        .send(Method::POST, "/certificate/fresh-cert", Some(&developer), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = ctx
        .send(Method::POST, "/token", None, Some(json!({ "mssCert": "fresh-cert" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let app_token = token_text(&body);

    let report = json!({ "gid": "app", "severity": 1, "content": {} });
    let (status, _) = ctx
        .send(Method::POST, "/report", Some(&app_token), Some(report.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = ctx
        .send(Method::DELETE, "/certificate/fresh-cert", Some(&developer), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // removing an absent certificate is a no-op
    let (status, _) = ctx
        .send(Method::DELETE, "/certificate/fresh-cert", Some(&developer), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx
        .send(Method::POST, "/token", None, Some(json!({ "mssCert": "fresh-cert" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // tokens minted before the removal stop working too
    let (status, _) = ctx
        .send(Method::POST, "/report", Some(&app_token), Some(report))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_certificate_tokens_survive_without_recheck() {
    let ctx = TestContext::with_options(TestOptions {
        cert_recheck: false,
        ..Default::default()
    });
    let token = ctx.application_token("revoked-cert");

    let (status, _) = ctx
        .send(
            Method::POST,
            "/report",
            Some(&token),
            Some(json!({ "gid": "app", "content": {} })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}
