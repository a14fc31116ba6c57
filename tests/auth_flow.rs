mod common;

use anyhow::Result;
use axum::http::{header::LOCATION, StatusCode};
use common::{app, body_string, can_bind_localhost, get, set_cookies};
use malproxy::config::ProxyConfig;
use serde_json::json;
use std::collections::HashMap;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> Result<ProxyConfig> {
    ProxyConfig::new(Some("client-123".to_string()))
}

fn query_of(location: &str) -> Result<HashMap<String, String>> {
    Ok(Url::parse(location)?.query_pairs().into_owned().collect())
}

fn cookie_value<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
    cookies.iter().find_map(|cookie| {
        cookie
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|rest| rest.split(';').next())
    })
}

#[tokio::test]
async fn start_redirects_with_pending_cookies() -> Result<()> {
    let response = get(
        app(config()?)?,
        "/auth/start",
        &[("host", "anime.example.com")],
    )
    .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(location.starts_with("https://myanimelist.net/v1/oauth2/authorize?"));

    let params = query_of(&location)?;
    assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
    assert_eq!(params.get("client_id").map(String::as_str), Some("client-123"));
    assert_eq!(
        params.get("redirect_uri").map(String::as_str),
        Some("https://anime.example.com/auth/callback")
    );
    assert_eq!(
        params.get("code_challenge_method").map(String::as_str),
        Some("plain")
    );

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies
        .iter()
        .all(|c| c.contains("Max-Age=600") && c.contains("HttpOnly")));
    assert_eq!(
        cookie_value(&cookies, "oauth_state"),
        params.get("state").map(String::as_str)
    );
    assert_eq!(
        cookie_value(&cookies, "pkce_verifier"),
        params.get("code_challenge").map(String::as_str)
    );
    Ok(())
}

#[tokio::test]
async fn start_honors_forwarded_headers_and_alias_path() -> Result<()> {
    let response = get(
        app(config()?)?,
        "/.netlify/functions/auth-start",
        &[
            ("host", "internal:9999"),
            ("x-forwarded-host", "anime.example.com"),
            ("x-forwarded-proto", "http"),
        ],
    )
    .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(
        query_of(&location)?.get("redirect_uri").map(String::as_str),
        Some("http://anime.example.com/auth/callback")
    );
    Ok(())
}

#[tokio::test]
async fn start_without_client_id_is_server_error() -> Result<()> {
    let response = get(app(ProxyConfig::new(None)?)?, "/auth/start", &[]).await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_string(response).await?, "Missing MAL_CLIENT_ID");
    Ok(())
}

#[tokio::test]
async fn callback_rejects_bad_requests_without_calling_provider() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = config()?.with_token_url(Url::parse(&format!("{}/token", server.uri()))?);

    let cases = [
        ("/auth/callback?state=s", "oauth_state=s; pkce_verifier=v", "Missing code/state"),
        ("/auth/callback?code=c", "oauth_state=s; pkce_verifier=v", "Missing code/state"),
        ("/auth/callback?code=c&state=s", "oauth_state=other; pkce_verifier=v", "State mismatch"),
        ("/auth/callback?code=c&state=s", "pkce_verifier=v", "State mismatch"),
        ("/auth/callback?code=c&state=s", "oauth_state=s", "Missing PKCE verifier"),
    ];

    for (uri, cookie, expected) in cases {
        let response = get(app(config.clone())?, uri, &[("cookie", cookie)]).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri} with {cookie}");
        assert!(set_cookies(&response).is_empty());
        assert_eq!(body_string(response).await?, expected);
    }
    Ok(())
}

#[tokio::test]
async fn callback_exchanges_code_and_sets_session() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("code_verifier=verifier-abc"))
        .and(body_string_contains(
            "redirect_uri=https%3A%2F%2Fanime.example.com%2Fauth%2Fcallback",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "access-xyz",
            "refresh_token": "refresh-xyz",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config =
        config()?.with_token_url(Url::parse(&format!("{}/v1/oauth2/token", server.uri()))?);

    let response = get(
        app(config)?,
        "/auth/callback?code=the-code&state=state-abc",
        &[
            ("host", "anime.example.com"),
            ("cookie", "oauth_state=state-abc; pkce_verifier=verifier-abc"),
        ],
    )
    .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
        Some("/")
    );

    let cookies = set_cookies(&response);
    assert_eq!(cookie_value(&cookies, "mal_access"), Some("access-xyz"));
    assert_eq!(cookie_value(&cookies, "mal_refresh"), Some("refresh-xyz"));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("mal_access=") && c.contains("Max-Age=3540")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("mal_refresh=") && c.contains("Max-Age=2592000")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("pkce_verifier=;") && c.contains("Max-Age=0")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("oauth_state=;") && c.contains("Max-Age=0")));
    Ok(())
}

#[tokio::test]
async fn callback_relays_token_endpoint_failure() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config()?.with_token_url(Url::parse(&format!("{}/token", server.uri()))?);

    let response = get(
        app(config)?,
        "/.netlify/functions/auth-callback?code=c&state=s",
        &[("cookie", "oauth_state=s; pkce_verifier=v")],
    )
    .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_string(response).await?, "Token error: invalid_grant");
    Ok(())
}

#[tokio::test]
async fn callback_is_served_on_configured_path() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("redirect_uri=https%3A%2F%2Flocalhost%2Foauth%2Fdone"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = config()?
        .with_token_url(Url::parse(&format!("{}/token", server.uri()))?)
        .with_callback_path("/oauth/done".to_string());

    let response = get(
        app(config)?,
        "/oauth/done?code=c&state=s",
        &[("cookie", "oauth_state=s; pkce_verifier=v")],
    )
    .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("mal_access=a;") && c.contains("Max-Age=3540")));
    assert!(!cookies.iter().any(|c| c.starts_with("mal_refresh=")));
    Ok(())
}

#[tokio::test]
async fn start_then_callback_echoes_state_and_verifier() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    let config = config()?.with_token_url(Url::parse(&format!("{}/token", server.uri()))?);

    let start = get(
        app(config.clone())?,
        "/auth/start",
        &[("host", "anime.example.com")],
    )
    .await?;
    assert_eq!(start.status(), StatusCode::FOUND);

    let location = start
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let params = query_of(&location)?;
    let pending = set_cookies(&start);
    let state = cookie_value(&pending, "oauth_state").unwrap_or_default().to_string();
    let verifier = cookie_value(&pending, "pkce_verifier")
        .unwrap_or_default()
        .to_string();
    assert!(!state.is_empty());
    assert_eq!(params.get("state"), Some(&state));
    assert!(verifier.len() >= 43);

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(format!("code_verifier={verifier}")))
        .and(body_string_contains(
            "redirect_uri=https%3A%2F%2Fanime.example.com%2Fauth%2Fcallback",
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "round-trip" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cookie = format!("oauth_state={state}; pkce_verifier={verifier}");
    let callback = get(
        app(config)?,
        &format!("/auth/callback?code=the-code&state={state}"),
        &[("host", "anime.example.com"), ("cookie", cookie.as_str())],
    )
    .await?;

    assert_eq!(callback.status(), StatusCode::FOUND);
    assert_eq!(
        cookie_value(&set_cookies(&callback), "mal_access"),
        Some("round-trip")
    );
    Ok(())
}

#[tokio::test]
async fn callback_survives_huge_expires_in() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "expires_in": i64::MAX
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config()?.with_token_url(Url::parse(&format!("{}/token", server.uri()))?);

    let response = get(
        app(config)?,
        "/auth/callback?code=c&state=s",
        &[("cookie", "oauth_state=s; pkce_verifier=v")],
    )
    .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("mal_access=a;")
        && c.contains(&format!("Max-Age={}", i64::MAX - 60))));
    Ok(())
}

#[tokio::test]
async fn callback_with_repeated_code_is_missing_parameter() -> Result<()> {
    let response = get(
        app(config()?)?,
        "/auth/callback?code=a&code=b&state=s",
        &[("cookie", "oauth_state=s; pkce_verifier=v")],
    )
    .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_string(response).await?, "Missing code/state");
    Ok(())
}
