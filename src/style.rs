use crate::models::{Division, PointSet};
use crate::session::{MapSession, SessionOptions};
use crate::style_doc::{PrefetchedStyles, StyleDocument};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use url::form_urlencoded::byte_serialize;

/// Tile-provider URL templates with `{style}` and `{key}` placeholders.
#[derive(Debug, Clone)]
pub struct StyleUrls {
    pub style_template: String,
    pub terrain_template: String,
    pub api_key: String,
}

impl StyleUrls {
    pub fn style_url(&self, style: &str) -> String {
        self.style_template
            .replace("{style}", &encode(style))
            .replace("{key}", &encode(&self.api_key))
    }

    pub fn terrain_url(&self) -> String {
        self.terrain_template.replace("{key}", &encode(&self.api_key))
    }
}

/// Options for a composed style, as sent by the map page.
#[derive(Debug, Clone, Default)]
pub struct StyleRequest {
    pub style: Option<String>,
    pub terrain: bool,
    pub hidden: Vec<Division>,
    pub astacala_only: bool,
}

impl StyleRequest {
    /// Reads a comma-separated list of division keys to hide.
    pub fn parse_hidden(list: &str) -> Vec<Division> {
        list.split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(Division::from)
            .collect()
    }
}

/// Runs a map session over `base` and returns the style with the point
/// source, layer, filter and terrain written into it.
pub fn compose_style(
    options: SessionOptions,
    points: Arc<PointSet>,
    base: Value,
    request: &StyleRequest,
) -> Result<Value> {
    let name = request
        .style
        .clone()
        .unwrap_or_else(|| options.initial_style.clone());
    let url = options.urls.style_url(&name);
    let viewport = options.initial_viewport;

    let mut session = MapSession::new(options, points);
    session.change_style(&name)?;
    session.set_3d(request.terrain)?;
    for division in &request.hidden {
        session.set_filter(division, false)?;
    }
    if request.astacala_only {
        session.toggle_astacala_only()?;
    }

    session.mount(StyleDocument::new(PrefetchedStyles::new().with(url, base), viewport))?;
    session.pump()?;
    session
        .into_engine()
        .map(StyleDocument::into_style_json)
        .ok_or_else(|| anyhow::anyhow!("map session has no engine"))
}

fn encode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}
