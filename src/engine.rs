//! Contract between the map session and a map rendering engine.
//!
//! Mirrors the subset of the MapLibre API the session relies on. A style
//! swap is destructive: custom sources, layers and terrain are gone once the
//! new style has loaded.

use crate::models::LngLat;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: LngLat,
    pub zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Viewport {
    pub fn approx_eq(&self, other: &Viewport) -> bool {
        const EPS: f64 = 1e-9;
        (self.center.lng - other.center.lng).abs() < EPS
            && (self.center.lat - other.center.lat).abs() < EPS
            && (self.zoom - other.zoom).abs() < EPS
            && (self.pitch - other.pitch).abs() < EPS
            && (self.bearing - other.bearing).abs() < EPS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEvent {
    Click,
    MouseEnter,
    MouseLeave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// First style load after creation.
    Load,
    /// A later `set_style` finished loading.
    StyleLoaded,
    StyleError(String),
    Pointer {
        event: PointerEvent,
        layer: String,
        /// Properties of the feature under the pointer, if any.
        properties: Option<Value>,
    },
}

pub trait MapEngine {
    /// Starts loading a style; completion is reported through `poll_event`.
    fn set_style(&mut self, url: &str);
    fn style_url(&self) -> Option<&str>;

    fn viewport(&self) -> Viewport;
    fn jump_to(&mut self, viewport: &Viewport);

    fn has_source(&self, id: &str) -> bool;
    /// Fails when a source with this id already exists.
    fn add_source(&mut self, id: &str, spec: Value) -> Result<()>;
    fn set_source_data(&mut self, id: &str, data: Value) -> Result<()>;
    fn remove_source(&mut self, id: &str) -> Result<()>;

    fn has_layer(&self, id: &str) -> bool;
    /// Fails when a layer with the same id already exists or its source is
    /// missing.
    fn add_layer(&mut self, layer: Value) -> Result<()>;
    fn set_filter(&mut self, layer_id: &str, filter: Value) -> Result<()>;

    /// `None` turns terrain mode off.
    fn set_terrain(&mut self, terrain: Option<Value>);
    fn terrain(&self) -> Option<&Value>;

    fn on(&mut self, event: PointerEvent, layer: &str) -> HandlerId;
    fn has_handler(&self, id: HandlerId) -> bool;
    fn off(&mut self, id: HandlerId);

    fn set_cursor(&mut self, cursor: &str);

    fn poll_event(&mut self) -> Option<EngineEvent>;

    /// Releases the engine; no events are produced afterwards.
    fn remove(&mut self);
}
