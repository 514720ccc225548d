use std::net::SocketAddr;

use agora_api::{AuthToken, Uuid};
use anyhow::Context;
use axum::routing::{get, post};
use structopt::StructOpt;
use tower_http::trace::TraceLayer;

mod directory;
mod error;
mod extractors;
mod feeds;
mod handlers;
mod store;

pub use error::Error;
use extractors::AppState;

#[derive(StructOpt)]
#[structopt(about = "Reference realtime store service")]
struct Opt {
    /// Address to listen on
    #[structopt(short, long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

fn admin_token() -> anyhow::Result<Option<AuthToken>> {
    match std::env::var("ADMIN_TOKEN") {
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).context("retrieving ADMIN_TOKEN environment variable"),
        Ok(tok) => Ok(Some(AuthToken(
            Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?,
        ))),
    }
}

pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/fetch-users", get(handlers::fetch_users))
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route(
            "/api/store/*path",
            get(handlers::store_read)
                .put(handlers::store_write)
                .patch(handlers::store_update)
                .delete(handlers::store_remove),
        )
        .route("/api/store-cas/*path", post(handlers::store_cas))
        .route("/ws/change-feed", get(handlers::change_feed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    let admin_token = admin_token()?;
    if admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, the admin API will be unreachable");
    }

    let app = app(AppState::new(admin_token));

    tracing::info!("listening on {}", opt.bind);
    axum::Server::bind(&opt.bind)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
