//! Category metadata. Every place that needs a division's color, label,
//! popup layout or attribute schema reads it from [`DIVISIONS`].

use crate::models::{AttrKey, Division, Source};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PopupTemplate {
    Caving,
    Climbing,
    Basic,
    Generic,
}

impl PopupTemplate {
    pub fn template_name(self) -> &'static str {
        match self {
            PopupTemplate::Caving => "popup/caving.html",
            PopupTemplate::Climbing => "popup/climbing.html",
            PopupTemplate::Basic => "popup/basic.html",
            PopupTemplate::Generic => "popup/generic.html",
        }
    }
}

#[derive(Debug)]
pub struct DivisionInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub badge: &'static str,
    pub color: &'static str,
    pub badge_dark_text: bool,
    pub template: PopupTemplate,
    /// Attributes the normalizer always materializes for this division.
    pub attributes: &'static [AttrKey],
}

const CAVING_ATTRS: &[AttrKey] = &[
    AttrKey::Kota,
    AttrKey::Provinsi,
    AttrKey::Kegiatan,
    AttrKey::WaktuKegiatan,
    AttrKey::LinkRop,
    AttrKey::Kedalaman,
    AttrKey::TotalKedalaman,
    AttrKey::TotalPanjang,
    AttrKey::ElevasiMulutGua,
    AttrKey::KarakterLorong,
    AttrKey::StatusExplore,
    AttrKey::Sinonim,
];

const CLIMBING_ATTRS: &[AttrKey] = &[
    AttrKey::Kota,
    AttrKey::Provinsi,
    AttrKey::Kegiatan,
    AttrKey::WaktuKegiatan,
    AttrKey::LinkRop,
    AttrKey::Ketinggian,
];

const BASIC_ATTRS: &[AttrKey] = &[AttrKey::Kota, AttrKey::Provinsi, AttrKey::Lokasi];

pub const DIVISIONS: &[DivisionInfo] = &[
    DivisionInfo {
        key: "pendaki",
        label: "Divisi Pendakian",
        badge: "PENDAKIAN",
        color: "#ff3333",
        badge_dark_text: false,
        template: PopupTemplate::Basic,
        attributes: BASIC_ATTRS,
    },
    DivisionInfo {
        key: "panjatTebing",
        label: "Divisi Panjat Tebing",
        badge: "ROCK CLIMBING",
        color: "#33ff33",
        badge_dark_text: true,
        template: PopupTemplate::Climbing,
        attributes: CLIMBING_ATTRS,
    },
    DivisionInfo {
        key: "paralayang",
        label: "Divisi Paralayang",
        badge: "PARALAYANG",
        color: "#3333ff",
        badge_dark_text: false,
        template: PopupTemplate::Basic,
        attributes: BASIC_ATTRS,
    },
    DivisionInfo {
        key: "caving",
        label: "Divisi Caving",
        badge: "CAVING",
        color: "#ffcc00",
        badge_dark_text: true,
        template: PopupTemplate::Caving,
        attributes: CAVING_ATTRS,
    },
    DivisionInfo {
        key: "diving",
        label: "Divisi Diving",
        badge: "DIVING",
        color: "#00ccff",
        badge_dark_text: false,
        template: PopupTemplate::Basic,
        attributes: BASIC_ATTRS,
    },
];

pub static DEFAULT_DIVISION: DivisionInfo = DivisionInfo {
    key: "other",
    label: "Divisi Lainnya",
    badge: "LAINNYA",
    color: "#cccccc",
    badge_dark_text: true,
    template: PopupTemplate::Generic,
    attributes: BASIC_ATTRS,
};

pub fn division_info(division: &Division) -> &'static DivisionInfo {
    DIVISIONS
        .iter()
        .find(|info| info.key == division.as_str())
        .unwrap_or(&DEFAULT_DIVISION)
}

/// `circle-color` paint expression keyed on the `division` property.
pub fn circle_color_expression() -> Value {
    let mut expr = vec![json!("match"), json!(["get", "division"])];
    for info in DIVISIONS {
        expr.push(json!(info.key));
        expr.push(json!(info.color));
    }
    expr.push(json!(DEFAULT_DIVISION.color));
    Value::Array(expr)
}

const SOURCE_LABELS: &[(&str, &str)] = &[
    ("astacala", "Data Kegiatan Astacala"),
    ("external", "Data Klapanunggal"),
    ("static", "Data Statis"),
    ("iss_data", "Data ISS Karst"),
    ("bankdata_api", "Data Bank Data Astacala"),
];

pub fn source_label(source: &Source) -> &'static str {
    SOURCE_LABELS
        .iter()
        .find(|(key, _)| *key == source.as_str())
        .map(|(_, label)| *label)
        .unwrap_or("Sumber Tidak Diketahui")
}
