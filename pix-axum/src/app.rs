use axum::handler::Handler;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use pix_blob::ImageCoordinator;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::middlewares::MultipartConfig;
use crate::rest;
use crate::{PixAxumState, ServerConfig};

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
pub struct AxumApp {
    pub images: ImageCoordinator,
    pub router: Router<()>,
}

impl AxumApp {
    pub fn new(images: ImageCoordinator) -> Self {
        Self {
            images,
            router: Router::new(),
        }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    /// Mount a plain GET handler at `path`
    pub fn service<H, T>(mut self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        self.router = self.router.route(path, get(handler));
        self
    }

    /// Mount the image routes at `path`
    pub fn use_images(self, path: &str, multipart: MultipartConfig) -> Self {
        let state = PixAxumState::new(self.images.clone(), multipart);
        let router = rest::images_router(state);
        self.use_router(path, router)
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

/// Assemble the full application: image routes, health check and middleware
pub fn build(config: &ServerConfig, images: ImageCoordinator) -> anyhow::Result<AxumApp> {
    let multipart = MultipartConfig::new().max_file_size(config.max_upload_bytes);

    let mut ax = AxumApp::new(images)
        .use_images("/api/images", multipart)
        .service("/health", || async { "ok" });

    let cors = match &config.frontend_url {
        Some(origin) => CorsLayer::new().allow_origin(origin.parse::<HeaderValue>()?),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let body_limit = config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
        .try_into()
        .unwrap_or(usize::MAX);

    ax.router = ax.router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(
                |req: &axum::extract::Request| {
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        method = %req.method(),
                        uri = %req.uri(),
                        request_id = %request_id,
                    )
                },
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors)
            .layer(MapResponseBodyLayer::new(axum::body::Body::new))
            .layer(RequestBodyLimitLayer::new(body_limit)),
    );

    Ok(ax)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
