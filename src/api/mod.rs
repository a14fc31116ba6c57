use crate::{
    api::handlers::{auth, health, proxy},
    config::ProxyConfig,
    upstream::UpstreamClient,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;

pub mod handlers;
pub mod routes;

const DEFAULT_START_PATHS: [&str; 2] = ["/auth/start", "/.netlify/functions/auth-start"];
const DEFAULT_CALLBACK_PATHS: [&str; 2] = ["/auth/callback", "/.netlify/functions/auth-callback"];

/// Build the application router.
///
/// Auth and health routes are explicit; every other path goes to the proxy dispatcher, which
/// owns its own route table and 404 body.
#[must_use]
pub fn router(config: Arc<ProxyConfig>, upstream: UpstreamClient) -> Router {
    let mut app = Router::new().route("/health", get(health::health));

    for path in DEFAULT_START_PATHS {
        app = app.route(path, get(auth::start));
    }

    let mut callback_paths: Vec<&str> = DEFAULT_CALLBACK_PATHS.to_vec();
    if !callback_paths.contains(&config.callback_path()) {
        callback_paths.push(config.callback_path());
    }
    for path in callback_paths {
        app = app.route(path, get(auth::callback));
    }

    app.fallback(proxy::dispatch)
        .layer(Extension(config))
        .layer(Extension(upstream))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, config: ProxyConfig) -> Result<()> {
    let upstream = UpstreamClient::new(&config)?;

    let app = router(Arc::new(config), upstream).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gracefully shutdown");

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!("Failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
