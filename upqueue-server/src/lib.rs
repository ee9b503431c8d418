mod auth;
mod config;
mod context;
mod docs;
mod errors;
mod schemas;
mod serialized;
mod streams;

use std::net::{Ipv6Addr, SocketAddr};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use auth::SIGN_IN_SECRET_HEADER;
pub use config::*;
pub use context::*;
pub use errors::*;

pub type Router = axum::Router<ServerContext>;

/// Builds the complete router, with the API under /v1
pub fn router(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .merge(auth::router())
        .merge(streams::router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context)
}

/// Starts the upqueue server
pub async fn run_server(port: u16, context: ServerContext) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(context)).await
}
