//! HTTP routes serving points, popups and composed map styles.

use crate::config::Config;
use crate::feeds::FeedClient;
use crate::popup::build_popup;
use crate::session::SessionOptions;
use crate::store::PointStore;
use crate::style::{compose_style, StyleRequest};
use crate::template_engine::TemplateEngine;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

pub struct AppState {
    pub config: Config,
    pub store: Arc<PointStore>,
    pub feed_client: FeedClient,
    pub template_engine: TemplateEngine,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/points", get(get_points))
        .route("/api/status", get(get_status))
        .route("/api/style", get(get_style))
        .route("/api/popup/{source}/{id}", get(get_popup))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn get_points(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.store.snapshot().await;
    Json(snapshot.points.to_feature_collection()).into_response()
}

async fn get_status(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.store.snapshot().await;
    Json(json!({
        "points": snapshot.points.len(),
        "by_division": snapshot.points.count_by_division(),
        "report": snapshot.report,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct StyleQuery {
    style: Option<String>,
    #[serde(default)]
    terrain: bool,
    hide: Option<String>,
    #[serde(default)]
    astacala_only: bool,
}

async fn get_style(State(state): State<Arc<AppState>>, Query(query): Query<StyleQuery>) -> Response {
    let options = SessionOptions::from_config(&state.config.map);
    let name = query.style.clone().unwrap_or_else(|| options.initial_style.clone());
    if !options.styles.contains(&name) {
        return (StatusCode::BAD_REQUEST, format!("unknown style `{}`", name)).into_response();
    }

    let base_url = options.urls.style_url(&name);
    let base = match state.feed_client.fetch_json(&base_url).await {
        Ok(base) => base,
        Err(e) => {
            error!("style fetch error for {}: {}", name, e);
            return (StatusCode::BAD_GATEWAY, "map style provider error").into_response();
        }
    };

    let request = StyleRequest {
        style: Some(name),
        terrain: query.terrain,
        hidden: query.hide.as_deref().map(StyleRequest::parse_hidden).unwrap_or_default(),
        astacala_only: query.astacala_only,
    };
    let points = state.store.snapshot().await.points;
    match compose_style(options, points, base, &request) {
        Ok(style) => Json(style).into_response(),
        Err(e) => {
            error!("style compose error: {}", e);
            (StatusCode::BAD_GATEWAY, format!("error composing style: {}", e)).into_response()
        }
    }
}

#[derive(Deserialize)]
struct PopupQuery {
    format: Option<String>,
}

async fn get_popup(
    State(state): State<Arc<AppState>>,
    Path((source, id)): Path<(String, String)>,
    Query(query): Query<PopupQuery>,
) -> Response {
    let snapshot = state.store.snapshot().await;
    let Some(point) = snapshot.points.find(&format!("{}:{}", source, id)) else {
        return (StatusCode::NOT_FOUND, "point not found").into_response();
    };
    let view = build_popup(point);

    match query.format.as_deref() {
        Some("json") => Json(view).into_response(),
        None | Some("html") => match state.template_engine.render_popup(&view) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!("popup render error ({}): {}", view.point_id, e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("error rendering popup: {}", e)).into_response()
            }
        },
        Some(other) => (StatusCode::BAD_REQUEST, format!("unsupported format `{}`", other)).into_response(),
    }
}
