//! A [`MapEngine`] backed by an in-memory MapLibre style document.
//!
//! Custom sources, layers and terrain are written straight into the style
//! JSON, so the composed document can be handed to any MapLibre client.
//! Filters are evaluated locally, which also lets callers ask which features
//! a layer currently renders.

use crate::engine::{EngineEvent, HandlerId, MapEngine, PointerEvent, Viewport};
use crate::models::LngLat;
use anyhow::Result;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

pub trait StyleLoader: Send {
    fn load(&mut self, url: &str) -> Result<Value>;
}

/// Serves an empty style for any URL.
pub struct BlankStyle;

impl StyleLoader for BlankStyle {
    fn load(&mut self, url: &str) -> Result<Value> {
        Ok(json!({ "version": 8, "name": url, "sources": {}, "layers": [] }))
    }
}

/// Styles fetched ahead of time, keyed by URL.
#[derive(Default)]
pub struct PrefetchedStyles {
    styles: HashMap<String, Value>,
}

impl PrefetchedStyles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, style: Value) -> Self {
        self.styles.insert(url.into(), style);
        self
    }
}

impl StyleLoader for PrefetchedStyles {
    fn load(&mut self, url: &str) -> Result<Value> {
        self.styles
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("style {} is not available", url))
    }
}

pub struct StyleDocument {
    loader: Box<dyn StyleLoader>,
    style_url: Option<String>,
    style: Value,
    viewport: Viewport,
    handlers: BTreeMap<HandlerId, (PointerEvent, String)>,
    next_handler: u64,
    events: VecDeque<EngineEvent>,
    loaded_once: bool,
    cursor: String,
    removed: bool,
}

impl StyleDocument {
    pub fn new(loader: impl StyleLoader + 'static, viewport: Viewport) -> Self {
        Self {
            loader: Box::new(loader),
            style_url: None,
            style: json!({ "version": 8, "sources": {}, "layers": [] }),
            viewport,
            handlers: BTreeMap::new(),
            next_handler: 1,
            events: VecDeque::new(),
            loaded_once: false,
            cursor: String::new(),
            removed: false,
        }
    }

    pub fn style(&self) -> &Value {
        &self.style
    }

    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn source_count(&self) -> usize {
        self.style["sources"].as_object().map_or(0, Map::len)
    }

    pub fn layer_count(&self) -> usize {
        self.layers().len()
    }

    pub fn layer(&self, id: &str) -> Option<&Value> {
        self.layers().iter().find(|l| l["id"] == id)
    }

    /// Features of the layer's GeoJSON source that pass its filter.
    pub fn rendered_features(&self, layer_id: &str) -> Vec<&Value> {
        let Some(layer) = self.layer(layer_id) else {
            return Vec::new();
        };
        let Some(source_id) = layer["source"].as_str() else {
            return Vec::new();
        };
        let features = self.style["sources"][source_id]["data"]["features"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let filter = layer.get("filter");
        features
            .iter()
            .filter(|f| {
                let empty = Map::new();
                let props = f["properties"].as_object().unwrap_or(&empty);
                filter.map_or(true, |expr| matches_filter(expr, props))
            })
            .collect()
    }

    /// Simulates a click on a rendered feature, delivered only when a click
    /// handler is registered on the layer.
    pub fn click_feature(&mut self, layer_id: &str, feature_id: &str) -> bool {
        let properties = self
            .rendered_features(layer_id)
            .into_iter()
            .find(|f| f["properties"]["id"] == feature_id)
            .map(|f| f["properties"].clone());
        match properties {
            Some(props) => self.dispatch(PointerEvent::Click, layer_id, Some(props)),
            None => false,
        }
    }

    pub fn hover(&mut self, layer_id: &str, entered: bool) -> bool {
        let event = if entered { PointerEvent::MouseEnter } else { PointerEvent::MouseLeave };
        self.dispatch(event, layer_id, None)
    }

    fn dispatch(&mut self, event: PointerEvent, layer: &str, properties: Option<Value>) -> bool {
        if self.removed || !self.handlers.values().any(|(e, l)| *e == event && l == layer) {
            return false;
        }
        self.events.push_back(EngineEvent::Pointer {
            event,
            layer: layer.to_string(),
            properties,
        });
        true
    }

    /// The composed style with the current camera written to its root.
    pub fn into_style_json(mut self) -> Value {
        let vp = self.viewport;
        if let Some(root) = self.style.as_object_mut() {
            root.insert("center".into(), json!([vp.center.lng, vp.center.lat]));
            root.insert("zoom".into(), json!(vp.zoom));
            root.insert("pitch".into(), json!(vp.pitch));
            root.insert("bearing".into(), json!(vp.bearing));
        }
        self.style
    }

    fn layers(&self) -> &[Value] {
        self.style["layers"].as_array().map(Vec::as_slice).unwrap_or(&[])
    }

    fn layers_mut(&mut self) -> Result<&mut Vec<Value>> {
        self.style
            .get_mut("layers")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| anyhow::anyhow!("style has no layers array"))
    }

    fn sources_mut(&mut self) -> Result<&mut Map<String, Value>> {
        self.style
            .get_mut("sources")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow::anyhow!("style has no sources object"))
    }

    fn install(&mut self, mut doc: Value) -> Result<()> {
        let root = doc
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("invalid style object"))?;
        if !root.get("sources").is_some_and(Value::is_object) {
            root.insert("sources".to_string(), json!({}));
        }
        if !root.get("layers").is_some_and(Value::is_array) {
            root.insert("layers".to_string(), json!([]));
        }
        if let Some(center) = root.get("center").and_then(|c| serde_json::from_value::<LngLat>(c.clone()).ok()) {
            self.viewport.center = center;
        }
        if let Some(zoom) = root.get("zoom").and_then(Value::as_f64) {
            self.viewport.zoom = zoom;
        }
        if let Some(pitch) = root.get("pitch").and_then(Value::as_f64) {
            self.viewport.pitch = pitch;
        }
        if let Some(bearing) = root.get("bearing").and_then(Value::as_f64) {
            self.viewport.bearing = bearing;
        }
        self.style = doc;
        Ok(())
    }
}

impl MapEngine for StyleDocument {
    fn set_style(&mut self, url: &str) {
        if self.removed {
            return;
        }
        match self.loader.load(url).and_then(|doc| self.install(doc)) {
            Ok(()) => {
                debug!("style loaded: {}", url);
                self.style_url = Some(url.to_string());
                let event = if self.loaded_once { EngineEvent::StyleLoaded } else { EngineEvent::Load };
                self.loaded_once = true;
                self.events.push_back(event);
            }
            Err(e) => self.events.push_back(EngineEvent::StyleError(e.to_string())),
        }
    }

    fn style_url(&self) -> Option<&str> {
        self.style_url.as_deref()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn jump_to(&mut self, viewport: &Viewport) {
        self.viewport = *viewport;
    }

    fn has_source(&self, id: &str) -> bool {
        self.style["sources"].get(id).is_some()
    }

    fn add_source(&mut self, id: &str, spec: Value) -> Result<()> {
        if self.has_source(id) {
            anyhow::bail!("there is already a source with id `{}`", id);
        }
        self.sources_mut()?.insert(id.to_string(), spec);
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: Value) -> Result<()> {
        let source = self
            .sources_mut()?
            .get_mut(id)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow::anyhow!("no source with id `{}`", id))?;
        source.insert("data".to_string(), data);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<()> {
        if self.layers().iter().any(|l| l["source"] == id) {
            anyhow::bail!("source `{}` is still used by a layer", id);
        }
        if self.style["terrain"]["source"] == id {
            anyhow::bail!("source `{}` is still used by terrain", id);
        }
        self.sources_mut()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("no source with id `{}`", id))
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    fn add_layer(&mut self, layer: Value) -> Result<()> {
        let id = layer["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("layer without id"))?
            .to_string();
        if self.has_layer(&id) {
            anyhow::bail!("there is already a layer with id `{}`", id);
        }
        if let Some(source) = layer["source"].as_str() {
            if !self.has_source(source) {
                anyhow::bail!("layer `{}` refers to missing source `{}`", id, source);
            }
        }
        self.layers_mut()?.push(layer);
        Ok(())
    }

    fn set_filter(&mut self, layer_id: &str, filter: Value) -> Result<()> {
        let layer = self
            .layers_mut()?
            .iter_mut()
            .find(|l| l["id"] == layer_id)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow::anyhow!("no layer with id `{}`", layer_id))?;
        if filter.is_null() {
            layer.remove("filter");
        } else {
            layer.insert("filter".to_string(), filter);
        }
        Ok(())
    }

    fn set_terrain(&mut self, terrain: Option<Value>) {
        if let Some(root) = self.style.as_object_mut() {
            match terrain {
                Some(t) => {
                    root.insert("terrain".to_string(), t);
                }
                None => {
                    root.remove("terrain");
                }
            }
        }
    }

    fn terrain(&self) -> Option<&Value> {
        self.style.get("terrain")
    }

    fn on(&mut self, event: PointerEvent, layer: &str) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.insert(id, (event, layer.to_string()));
        id
    }

    fn has_handler(&self, id: HandlerId) -> bool {
        self.handlers.contains_key(&id)
    }

    fn off(&mut self, id: HandlerId) {
        self.handlers.remove(&id);
    }

    fn set_cursor(&mut self, cursor: &str) {
        self.cursor = cursor.to_string();
    }

    fn poll_event(&mut self) -> Option<EngineEvent> {
        if self.removed {
            return None;
        }
        self.events.pop_front()
    }

    fn remove(&mut self) {
        self.removed = true;
        self.handlers.clear();
        self.events.clear();
    }
}

/// Evaluates the subset of MapLibre expressions used by point filters.
pub fn evaluate(expr: &Value, props: &Map<String, Value>) -> Value {
    let Value::Array(items) = expr else {
        return expr.clone();
    };
    let Some(op) = items.first().and_then(Value::as_str) else {
        return expr.clone();
    };
    let arg = |i: usize| items.get(i).map_or(Value::Null, |e| evaluate(e, props));
    match op {
        "get" => items
            .get(1)
            .and_then(Value::as_str)
            .and_then(|key| props.get(key))
            .cloned()
            .unwrap_or(Value::Null),
        "literal" => items.get(1).cloned().unwrap_or(Value::Null),
        "all" => Value::Bool(items[1..].iter().all(|e| truthy(&evaluate(e, props)))),
        "any" => Value::Bool(items[1..].iter().any(|e| truthy(&evaluate(e, props)))),
        "!" => Value::Bool(!truthy(&arg(1))),
        "==" => Value::Bool(arg(1) == arg(2)),
        "!=" => Value::Bool(arg(1) != arg(2)),
        "in" => {
            let needle = arg(1);
            let found = match arg(2) {
                Value::Array(haystack) => haystack.contains(&needle),
                Value::String(haystack) => needle.as_str().is_some_and(|n| haystack.contains(n)),
                _ => false,
            };
            Value::Bool(found)
        }
        _ => Value::Null,
    }
}

pub fn matches_filter(filter: &Value, props: &Map<String, Value>) -> bool {
    truthy(&evaluate(filter, props))
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}
