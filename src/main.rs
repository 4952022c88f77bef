use astacala_map::api::{self, AppState};
use astacala_map::config::Config;
use astacala_map::feeds::{FeedClient, FeedTarget, RetryPolicy};
use astacala_map::store::PointStore;
use astacala_map::template_engine::TemplateEngine;
use axum::{
    http::Request,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::load()?;
    let thread_count = config.thread_count.unwrap_or_else(num_cpus::get);

    info!("starting server with {} threads", thread_count);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(thread_count)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn log_request_response(req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    info!("incoming request: {} {}", method, path);
    let response = next.run(req).await;
    info!("request result: {} for {} {}", response.status(), method, path);
    response
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let template_engine = TemplateEngine::new(config.template_dir.clone())?;
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("astacala-map/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let feed_client = FeedClient::new(http_client, RetryPolicy::from(&config.fetch));

    let store = Arc::new(PointStore::new(
        feed_client.clone(),
        FeedTarget::from_config(&config),
        config.static_points.clone(),
    ));
    store
        .clone()
        .spawn_revalidation(config.revalidate.interval(), config.revalidate.retry());

    let listen = config.listen.clone();
    let state = Arc::new(AppState {
        config,
        store,
        feed_client,
        template_engine,
    });

    let app = api::router(state).layer(middleware::from_fn(log_request_response));

    info!("listening on {}", listen);
    let listener = TcpListener::bind(&listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
