//! Popup view models. The layout is chosen from the division's row in the
//! catalog; unknown divisions get the generic layout.

use crate::catalog::{division_info, source_label, PopupTemplate};
use crate::models::{AttrKey, LngLat, Point};
use serde::Serialize;
use url::Url;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    Depth,
    Height,
    Path,
    Description,
    Calendar,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DetailRow {
    pub label: &'static str,
    /// `-` when the attribute is not available.
    pub value: String,
    pub icon: Icon,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Badge {
    pub text: &'static str,
    pub color: &'static str,
    pub dark_text: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PopupAction {
    pub label: &'static str,
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PopupView {
    pub point_id: String,
    pub template: PopupTemplate,
    pub title: String,
    pub location: String,
    pub division_label: &'static str,
    pub badge: Badge,
    pub source_label: &'static str,
    pub description: Option<String>,
    pub details: Vec<DetailRow>,
    pub actions: Vec<PopupAction>,
    pub coordinates: LngLat,
}

pub fn build_popup(point: &Point) -> PopupView {
    let info = division_info(&point.division);
    let description = Some(point.description.trim())
        .filter(|d| !d.is_empty() && *d != point.name)
        .map(str::to_string);

    let details = match info.template {
        PopupTemplate::Caving => caving_details(point),
        PopupTemplate::Climbing => climbing_details(point),
        PopupTemplate::Basic | PopupTemplate::Generic => Vec::new(),
    };

    PopupView {
        point_id: point.global_id(),
        template: info.template,
        title: point.name.clone(),
        location: location_line(point),
        division_label: info.label,
        badge: Badge {
            text: info.badge,
            color: info.color,
            dark_text: info.badge_dark_text,
        },
        source_label: source_label(&point.source),
        description,
        details,
        actions: actions(point),
        coordinates: point.coordinates,
    }
}

fn row(point: &Point, label: &'static str, key: AttrKey, unit: Option<&str>, icon: Icon) -> DetailRow {
    DetailRow {
        label,
        value: point
            .attributes
            .get(key)
            .display_with_unit(unit)
            .unwrap_or_else(|| "-".to_string()),
        icon,
    }
}

/// Rows that only appear when the feed supplied a value.
fn optional_row(point: &Point, label: &'static str, key: AttrKey, icon: Icon) -> Option<DetailRow> {
    point
        .attributes
        .get(key)
        .is_available()
        .then(|| row(point, label, key, None, icon))
}

fn caving_details(point: &Point) -> Vec<DetailRow> {
    let depth_key = if point.attributes.get(AttrKey::TotalKedalaman).is_available() {
        AttrKey::TotalKedalaman
    } else {
        AttrKey::Kedalaman
    };
    let mut rows = vec![
        row(point, "Kedalaman", depth_key, Some("m"), Icon::Depth),
        row(point, "Elevasi", AttrKey::ElevasiMulutGua, Some("m"), Icon::Height),
        row(point, "Panjang Lorong", AttrKey::TotalPanjang, Some("m"), Icon::Path),
        row(point, "Karakter", AttrKey::KarakterLorong, None, Icon::Description),
        row(point, "Status", AttrKey::StatusExplore, None, Icon::Description),
    ];
    rows.extend(
        [
            optional_row(point, "Kegiatan", AttrKey::Kegiatan, Icon::Calendar),
            optional_row(point, "Waktu Kegiatan", AttrKey::WaktuKegiatan, Icon::Calendar),
            optional_row(point, "Nama Lain", AttrKey::Sinonim, Icon::Description),
            optional_row(point, "Sumber", AttrKey::SumberData, Icon::Description),
            optional_row(point, "Jenis", AttrKey::JenisPotensiKarst, Icon::Description),
            optional_row(point, "Tipe Gua", AttrKey::TypeGua, Icon::Description),
            optional_row(point, "Status Pemetaan", AttrKey::StatusPemetaanGua, Icon::Description),
        ]
        .into_iter()
        .flatten(),
    );
    rows
}

fn climbing_details(point: &Point) -> Vec<DetailRow> {
    let mut rows = vec![
        row(point, "Ketinggian", AttrKey::Ketinggian, Some("m"), Icon::Height),
        row(point, "Kegiatan", AttrKey::Kegiatan, None, Icon::Calendar),
    ];
    rows.extend(optional_row(point, "Waktu Kegiatan", AttrKey::WaktuKegiatan, Icon::Calendar));
    rows
}

fn location_line(point: &Point) -> String {
    if let Some(place) = point.attributes.get(AttrKey::Lokasi).as_text() {
        return place.to_string();
    }
    let kota = point.attributes.get(AttrKey::Kota).as_text().unwrap_or("Lokasi");
    let provinsi = point.attributes.get(AttrKey::Provinsi).as_text().unwrap_or("Indonesia");
    format!("{}, {}", kota, provinsi)
}

fn actions(point: &Point) -> Vec<PopupAction> {
    let mut actions = Vec::new();
    let query = format!("{},{}", point.coordinates.lat, point.coordinates.lng);
    if let Ok(url) = Url::parse_with_params(
        "https://www.google.com/maps/search/",
        &[("api", "1"), ("query", query.as_str())],
    ) {
        actions.push(PopupAction {
            label: "Navigate",
            url: url.into(),
        });
    }
    let report = point
        .attributes
        .get(AttrKey::LinkRop)
        .as_text()
        .and_then(|link| Url::parse(link).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"));
    if let Some(url) = report {
        actions.push(PopupAction {
            label: "ROP",
            url: url.into(),
        });
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttrValue, Attributes, Division, Source};

    fn point(division: Division) -> Point {
        Point {
            id: "9".into(),
            name: "Gua Jatijajar".into(),
            description: "Gua indah dengan stalaktit dan stalagmit.".into(),
            coordinates: LngLat::new(109.8503, -7.7419),
            division,
            source: Source::Astacala,
            attributes: Attributes::new(),
        }
    }

    #[test]
    fn caving_layout_has_fixed_rows_with_placeholders() {
        let mut p = point(Division::Caving);
        p.attributes.insert(AttrKey::Kedalaman, AttrValue::Number(35.0));
        p.attributes.insert(AttrKey::TotalKedalaman, AttrValue::Number(48.5));
        p.attributes.insert(AttrKey::Kota, AttrValue::Text("Kebumen".into()));
        p.attributes.insert(AttrKey::Sinonim, AttrValue::Text("Gua Jati".into()));

        let view = build_popup(&p);
        assert_eq!(view.template, PopupTemplate::Caving);
        assert_eq!(view.location, "Kebumen, Indonesia");
        assert_eq!(view.details[0].value, "48.5 m");
        assert_eq!(view.details[1].value, "-");
        assert!(view.details.iter().any(|r| r.label == "Nama Lain" && r.value == "Gua Jati"));
        assert!(!view.details.iter().any(|r| r.label == "Kegiatan"));
        assert_eq!(view.badge.text, "CAVING");
        assert_eq!(view.source_label, "Data Kegiatan Astacala");
    }

    #[test]
    fn climbing_layout_shows_height() {
        let mut p = point(Division::PanjatTebing);
        p.attributes.insert(AttrKey::Ketinggian, AttrValue::Text("120".into()));
        let view = build_popup(&p);
        assert_eq!(view.template, PopupTemplate::Climbing);
        assert_eq!(view.details[0].value, "120 m");
        assert_eq!(view.details[1].value, "-");
    }

    #[test]
    fn unknown_division_renders_generic_layout() {
        let view = build_popup(&point(Division::Other("arungJeram".into())));
        assert_eq!(view.template, PopupTemplate::Generic);
        assert_eq!(view.division_label, "Divisi Lainnya");
        assert!(view.details.is_empty());
        assert!(view.description.is_some());
    }

    #[test]
    fn actions_include_navigation_and_valid_report_link() {
        let mut p = point(Division::Paralayang);
        p.attributes.insert(AttrKey::LinkRop, AttrValue::Text("https://drive.google.com/file/d/abc".into()));
        let view = build_popup(&p);
        assert_eq!(view.actions.len(), 2);
        assert!(view.actions[0].url.starts_with("https://www.google.com/maps/search/?api=1&query=-7.7419"));
        assert_eq!(view.actions[1].label, "ROP");

        p.attributes.insert(AttrKey::LinkRop, AttrValue::Text("lihat di drive".into()));
        assert_eq!(build_popup(&p).actions.len(), 1);
    }

    #[test]
    fn description_equal_to_name_is_omitted() {
        let mut p = point(Division::Caving);
        p.description = p.name.clone();
        assert_eq!(build_popup(&p).description, None);
    }
}
