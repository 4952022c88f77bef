//! Map session controller.
//!
//! Everything the map should show is derived from one state record by
//! [`desired_state`] and pushed into the engine by [`reconcile`], which checks
//! before it adds. The same reconcile runs after the first load, after every
//! style swap and after a failed swap, so running it twice never duplicates
//! a source, layer or handler.

use crate::catalog::circle_color_expression;
use crate::config::MapConfig;
use crate::engine::{EngineEvent, HandlerId, MapEngine, PointerEvent, Viewport};
use crate::models::{Division, LngLat, PointSet};
use crate::popup::{build_popup, PopupView};
use crate::style::StyleUrls;
use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const POINTS_SOURCE: &str = "activities-points";
pub const POINTS_LAYER: &str = "points-layer";
pub const TERRAIN_SOURCE: &str = "terrain";

const HANDLED_EVENTS: [PointerEvent; 3] = [PointerEvent::Click, PointerEvent::MouseEnter, PointerEvent::MouseLeave];

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub urls: StyleUrls,
    pub styles: Vec<String>,
    pub initial_style: String,
    pub initial_viewport: Viewport,
    pub circle_radius: f64,
    pub terrain_exaggeration: f64,
}

impl SessionOptions {
    pub fn from_config(map: &MapConfig) -> Self {
        Self {
            urls: StyleUrls {
                style_template: map.style_url.clone(),
                terrain_template: map.terrain_url.clone(),
                api_key: map.api_key.clone(),
            },
            styles: map.styles.clone(),
            initial_style: map.default_style.clone(),
            initial_viewport: Viewport {
                center: LngLat::from(map.center),
                zoom: map.zoom,
                pitch: map.pitch,
                bearing: map.bearing,
            },
            circle_radius: map.circle_radius,
            terrain_exaggeration: map.terrain_exaggeration,
        }
    }
}

/// Visibility switches. Points of divisions missing from the catalog share
/// the `other` switch.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    divisions: BTreeMap<Division, bool>,
    other: bool,
    astacala_only: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            divisions: Division::KNOWN.iter().cloned().map(|d| (d, true)).collect(),
            other: true,
            astacala_only: false,
        }
    }
}

impl FilterState {
    pub fn is_active(&self, division: &Division) -> bool {
        if division.is_known() {
            self.divisions.get(division).copied().unwrap_or(false)
        } else {
            self.other
        }
    }

    pub fn set(&mut self, division: &Division, on: bool) {
        if division.is_known() {
            self.divisions.insert(division.clone(), on);
        } else {
            self.other = on;
        }
    }

    pub fn toggle(&mut self, division: &Division) {
        let on = self.is_active(division);
        self.set(division, !on);
    }

    /// The master switch: on iff every individual switch is on.
    pub fn all(&self) -> bool {
        self.other && self.divisions.values().all(|on| *on)
    }

    pub fn set_all(&mut self, on: bool) {
        for value in self.divisions.values_mut() {
            *value = on;
        }
        self.other = on;
    }

    pub fn toggle_all(&mut self) {
        let on = self.all();
        self.set_all(!on);
    }

    pub fn astacala_only(&self) -> bool {
        self.astacala_only
    }

    pub fn toggle_astacala_only(&mut self) {
        self.astacala_only = !self.astacala_only;
    }

    pub fn active_divisions(&self) -> Vec<&Division> {
        self.divisions.iter().filter(|(_, on)| **on).map(|(d, _)| d).collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.other && self.active_divisions().is_empty()
    }

    /// Layer filter expression for the current switches.
    pub fn expression(&self) -> Value {
        if self.is_empty() {
            return json!(["==", ["get", "division"], "__none__"]);
        }
        let mut clauses = vec![json!("any")];
        for division in self.active_divisions() {
            clauses.push(json!(["==", ["get", "division"], division.as_str()]));
        }
        if self.other {
            let known: Vec<&str> = Division::KNOWN.iter().map(Division::as_str).collect();
            clauses.push(json!(["!", ["in", ["get", "division"], ["literal", known]]]));
        }
        let by_division = Value::Array(clauses);
        if self.astacala_only {
            json!(["all", by_division, [
                "any",
                ["==", ["get", "source"], "astacala"],
                ["==", ["get", "source"], "static"]
            ]])
        } else {
            by_division
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSpec {
    pub source: Value,
    pub terrain: Value,
}

/// What the engine should hold after a reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    /// Camera to restore, if any.
    pub viewport: Option<Viewport>,
    pub terrain: Option<TerrainSpec>,
    pub data: Value,
    pub layer: Value,
    pub filter: Value,
}

pub fn desired_state(
    points: &PointSet,
    filters: &FilterState,
    terrain: bool,
    viewport: Option<Viewport>,
    options: &SessionOptions,
) -> DesiredState {
    let terrain = terrain.then(|| TerrainSpec {
        source: json!({
            "type": "raster-dem",
            "url": options.urls.terrain_url(),
            "tileSize": 256,
        }),
        terrain: json!({ "source": TERRAIN_SOURCE, "exaggeration": options.terrain_exaggeration }),
    });
    DesiredState {
        viewport,
        terrain,
        data: points.to_feature_collection(),
        layer: json!({
            "id": POINTS_LAYER,
            "type": "circle",
            "source": POINTS_SOURCE,
            "paint": {
                "circle-radius": options.circle_radius,
                "circle-color": circle_color_expression(),
                "circle-stroke-width": 2,
                "circle-stroke-color": "#fff",
            },
        }),
        filter: filters.expression(),
    }
}

/// Brings the engine in line with `desired`. Safe to call repeatedly.
pub fn reconcile<E: MapEngine + ?Sized>(
    engine: &mut E,
    desired: &DesiredState,
    handlers: &mut HashMap<PointerEvent, HandlerId>,
) -> Result<()> {
    if let Some(viewport) = &desired.viewport {
        if !engine.viewport().approx_eq(viewport) {
            engine.jump_to(viewport);
        }
    }

    match &desired.terrain {
        Some(spec) => {
            if !engine.has_source(TERRAIN_SOURCE) {
                engine.add_source(TERRAIN_SOURCE, spec.source.clone())?;
            }
            if engine.terrain() != Some(&spec.terrain) {
                engine.set_terrain(Some(spec.terrain.clone()));
            }
        }
        None => {
            if engine.terrain().is_some() {
                engine.set_terrain(None);
            }
            if engine.has_source(TERRAIN_SOURCE) {
                engine.remove_source(TERRAIN_SOURCE)?;
            }
        }
    }

    if engine.has_source(POINTS_SOURCE) {
        engine.set_source_data(POINTS_SOURCE, desired.data.clone())?;
    } else {
        engine.add_source(POINTS_SOURCE, json!({ "type": "geojson", "data": desired.data }))?;
    }
    if !engine.has_layer(POINTS_LAYER) {
        engine.add_layer(desired.layer.clone())?;
    }

    if engine.has_layer(POINTS_LAYER) {
        engine.set_filter(POINTS_LAYER, desired.filter.clone())?;
    }

    for event in HANDLED_EVENTS {
        let registered = handlers.get(&event).is_some_and(|id| engine.has_handler(*id));
        if !registered {
            handlers.insert(event, engine.on(event, POINTS_LAYER));
        }
    }
    Ok(())
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    /// Waiting for the first style.
    Loading,
    Ready,
    /// A style swap is in flight.
    Reloading,
    Unmounted,
}

pub struct MapSession<E: MapEngine> {
    options: SessionOptions,
    engine: Option<E>,
    phase: Phase,
    /// Most recently requested style.
    style: String,
    /// Style the engine last finished loading.
    last_good_style: Option<String>,
    /// Styles handed to the engine whose load has not been reported yet.
    requested_styles: VecDeque<String>,
    is_3d: bool,
    filters: FilterState,
    points: Arc<PointSet>,
    pending_viewport: Option<Viewport>,
    handlers: HashMap<PointerEvent, HandlerId>,
    selected: Option<PopupView>,
    last_error: Option<String>,
}

impl<E: MapEngine> MapSession<E> {
    pub fn new(options: SessionOptions, points: Arc<PointSet>) -> Self {
        let style = options.initial_style.clone();
        Self {
            options,
            engine: None,
            phase: Phase::Uninitialized,
            last_good_style: None,
            requested_styles: VecDeque::new(),
            style,
            is_3d: false,
            filters: FilterState::default(),
            points,
            pending_viewport: None,
            handlers: HashMap::new(),
            selected: None,
            last_error: None,
        }
    }

    pub fn mount(&mut self, mut engine: E) -> Result<()> {
        if self.phase != Phase::Uninitialized {
            anyhow::bail!("session is already mounted");
        }
        let viewport = self.options.initial_viewport;
        engine.jump_to(&viewport);
        engine.set_style(&self.options.urls.style_url(&self.style));
        self.requested_styles.push_back(self.style.clone());
        self.pending_viewport = Some(viewport);
        self.engine = Some(engine);
        self.phase = Phase::Loading;
        info!("map session mounted with style {}", self.style);
        Ok(())
    }

    /// Applies one engine event. Clicks on a point return its popup.
    pub fn handle_event(&mut self, event: EngineEvent) -> Result<Option<PopupView>> {
        if self.phase == Phase::Unmounted {
            return Ok(None);
        }
        match event {
            EngineEvent::Load | EngineEvent::StyleLoaded => {
                let loaded = self.requested_styles.pop_front().unwrap_or_else(|| self.style.clone());
                self.last_good_style = Some(loaded.clone());
                if !self.requested_styles.is_empty() {
                    // A later request will replace this style; reconcile then.
                    debug!("style {} loaded but already superseded", loaded);
                    self.phase = Phase::Reloading;
                    return Ok(None);
                }
                self.phase = Phase::Ready;
                self.last_error = None;
                self.sync()?;
                debug!("style {} ready", self.style);
                Ok(None)
            }
            EngineEvent::StyleError(message) => {
                let failed = self.requested_styles.pop_front().unwrap_or_else(|| self.style.clone());
                warn!("style {} failed to load: {}", failed, message);
                self.last_error = Some(message.clone());
                if self.requested_styles.is_empty() {
                    match self.last_good_style.clone() {
                        Some(good) => {
                            self.style = good;
                            self.phase = Phase::Ready;
                            self.sync()?;
                        }
                        None => self.style = self.options.initial_style.clone(),
                    }
                }
                Err(anyhow::anyhow!("style {} failed to load: {}", failed, message))
            }
            EngineEvent::Pointer { event, layer, properties } => {
                if layer != POINTS_LAYER {
                    return Ok(None);
                }
                Ok(self.handle_pointer(event, properties))
            }
        }
    }

    /// Drains queued engine events.
    pub fn pump(&mut self) -> Result<Vec<PopupView>> {
        let mut popups = Vec::new();
        while let Some(event) = self.engine.as_mut().and_then(|e| e.poll_event()) {
            if let Some(popup) = self.handle_event(event)? {
                popups.push(popup);
            }
        }
        Ok(popups)
    }

    pub fn change_style(&mut self, name: &str) -> Result<()> {
        if !self.options.styles.iter().any(|s| s == name) {
            anyhow::bail!("unknown style `{}`", name);
        }
        let Some(engine) = self.engine.as_mut() else {
            if self.phase == Phase::Uninitialized {
                self.style = name.to_string();
                return Ok(());
            }
            anyhow::bail!("session has no engine");
        };
        match self.phase {
            Phase::Unmounted => anyhow::bail!("session is unmounted"),
            Phase::Ready => {
                self.pending_viewport = Some(engine.viewport());
                self.phase = Phase::Reloading;
            }
            Phase::Uninitialized | Phase::Loading | Phase::Reloading => {}
        }
        info!("switching style {} -> {}", self.style, name);
        self.style = name.to_string();
        engine.set_style(&self.options.urls.style_url(name));
        self.requested_styles.push_back(self.style.clone());
        Ok(())
    }

    pub fn toggle_filter(&mut self, division: &Division) -> Result<()> {
        self.filters.toggle(division);
        self.push_filter()
    }

    pub fn set_filter(&mut self, division: &Division, on: bool) -> Result<()> {
        self.filters.set(division, on);
        self.push_filter()
    }

    pub fn set_all_filters(&mut self, on: bool) -> Result<()> {
        self.filters.set_all(on);
        self.push_filter()
    }

    pub fn toggle_all_filters(&mut self) -> Result<()> {
        self.filters.toggle_all();
        self.push_filter()
    }

    pub fn toggle_astacala_only(&mut self) -> Result<()> {
        self.filters.toggle_astacala_only();
        self.push_filter()
    }

    pub fn toggle_3d(&mut self) -> Result<()> {
        self.set_3d(!self.is_3d)
    }

    /// Takes effect now when ready, otherwise on the next load.
    pub fn set_3d(&mut self, on: bool) -> Result<()> {
        self.is_3d = on;
        if self.phase == Phase::Ready {
            self.sync()?;
        }
        Ok(())
    }

    /// Replaces the points and pushes them into the existing source.
    pub fn set_points(&mut self, points: Arc<PointSet>) -> Result<()> {
        self.points = points;
        if self.selected.as_ref().is_some_and(|p| self.points.find(&p.point_id).is_none()) {
            self.selected = None;
        }
        if self.phase != Phase::Ready {
            return Ok(());
        }
        let data = self.points.to_feature_collection();
        match self.engine.as_mut() {
            Some(engine) if engine.has_source(POINTS_SOURCE) => engine.set_source_data(POINTS_SOURCE, data),
            Some(_) => self.sync(),
            None => Ok(()),
        }
    }

    pub fn close_popup(&mut self) {
        self.selected = None;
    }

    /// Detaches handlers and releases the engine. Later events are ignored.
    pub fn unmount(&mut self) {
        if self.phase == Phase::Unmounted {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            for (_, id) in self.handlers.drain() {
                engine.off(id);
            }
            engine.remove();
        }
        self.selected = None;
        self.phase = Phase::Unmounted;
        info!("map session unmounted");
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    /// The style the engine currently holds, if any load has succeeded.
    pub fn loaded_style(&self) -> Option<&str> {
        self.last_good_style.as_deref()
    }

    pub fn is_3d(&self) -> bool {
        self.is_3d
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn selected_popup(&self) -> Option<&PopupView> {
        self.selected.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    pub fn into_engine(self) -> Option<E> {
        self.engine
    }

    fn handle_pointer(&mut self, event: PointerEvent, properties: Option<Value>) -> Option<PopupView> {
        match event {
            PointerEvent::Click => {
                let id = properties.as_ref().and_then(|p| p["id"].as_str())?;
                let Some(point) = self.points.find(id) else {
                    debug!("click on unknown point {}", id);
                    return None;
                };
                let view = build_popup(point);
                self.selected = Some(view.clone());
                Some(view)
            }
            PointerEvent::MouseEnter => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_cursor("pointer");
                }
                None
            }
            PointerEvent::MouseLeave => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_cursor("");
                }
                None
            }
        }
    }

    fn push_filter(&mut self) -> Result<()> {
        if self.phase != Phase::Ready {
            return Ok(());
        }
        let filter = self.filters.expression();
        match self.engine.as_mut() {
            Some(engine) if engine.has_layer(POINTS_LAYER) => engine.set_filter(POINTS_LAYER, filter),
            _ => Ok(()),
        }
    }

    fn sync(&mut self) -> Result<()> {
        let desired = desired_state(
            &self.points,
            &self.filters,
            self.is_3d,
            self.pending_viewport.take(),
            &self.options,
        );
        match self.engine.as_mut() {
            Some(engine) => reconcile(engine, &desired, &mut self.handlers),
            None => Ok(()),
        }
    }
}
