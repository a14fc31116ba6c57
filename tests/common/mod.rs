#![allow(dead_code)]

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header::SET_COOKIE, Request, Response},
    Router,
};
use malproxy::{api, config::ProxyConfig, upstream::UpstreamClient};
use std::{net::TcpListener, sync::Arc};
use tower::ServiceExt;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn app(config: ProxyConfig) -> Result<Router> {
    let upstream = UpstreamClient::new(&config)?;
    Ok(api::router(Arc::new(config), upstream))
}

pub async fn get(app: Router, uri: &str, headers: &[(&str, &str)]) -> Result<Response<Body>> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    Ok(app.oneshot(builder.body(Body::empty())?).await?)
}

pub async fn body_string(response: Response<Body>) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(ToString::to_string)
        .collect()
}
