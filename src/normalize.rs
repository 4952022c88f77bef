//! Normalizes upstream records into [`Point`] values.
//!
//! Each feed is described by a [`FeedSchema`] mapping its field names onto
//! the point model, so one code path handles GeoJSON feature collections and
//! `{ "data": [...] }` envelopes alike.

use crate::catalog::division_info;
use crate::coords;
use crate::models::{AttrKey, AttrValue, Attributes, Division, LngLat, Point, Source};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const NO_DESCRIPTION: &str = "Tidak ada deskripsi";

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy)]
pub enum CoordinateRule {
    /// `geometry.coordinates`, already `[lng, lat]`.
    GeoJsonGeometry,
    /// A text field in any grammar understood by [`coords::parse`].
    Text(&'static str),
    /// Separate numeric fields.
    LatLon { lat: &'static str, lon: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub enum DescriptionRule {
    Field(&'static str),
    SameAsName,
    /// Synonym, entrance elevation and exploration status, one per line.
    CaveSummary,
}

#[derive(Debug)]
pub struct FeedSchema {
    pub name_field: &'static str,
    pub fallback_name: &'static str,
    pub description: DescriptionRule,
    pub coordinates: CoordinateRule,
    pub division: Division,
    pub source: Source,
    pub fields: &'static [(&'static str, AttrKey)],
}

pub static BANKDATA_CAVES: FeedSchema = FeedSchema {
    name_field: "nama_gua",
    fallback_name: "Gua Tanpa Nama",
    description: DescriptionRule::SameAsName,
    coordinates: CoordinateRule::GeoJsonGeometry,
    division: Division::Caving,
    source: Source::BankData,
    fields: &[
        ("elevasi", AttrKey::ElevasiMulutGua),
        ("kedalaman", AttrKey::Kedalaman),
        ("panjang", AttrKey::TotalPanjang),
        ("karakter_lorong", AttrKey::KarakterLorong),
        ("status_explore", AttrKey::StatusExplore),
        ("kota", AttrKey::Kota),
        ("provinsi", AttrKey::Provinsi),
        ("sinonim", AttrKey::Sinonim),
    ],
};

pub static ISS_CAVES: FeedSchema = FeedSchema {
    name_field: "nama_potensi_karst",
    fallback_name: "Gua Tanpa Nama",
    description: DescriptionRule::Field("deskripsi"),
    coordinates: CoordinateRule::LatLon { lat: "lat", lon: "long" },
    division: Division::Caving,
    source: Source::IssData,
    fields: &[
        ("sumber_data", AttrKey::SumberData),
        ("jenis_potensi_karst", AttrKey::JenisPotensiKarst),
        ("type_gua", AttrKey::TypeGua),
        ("status_pemetaan_gua", AttrKey::StatusPemetaanGua),
        ("code", AttrKey::Code),
    ],
};

pub static ASTACALA_CAVES: FeedSchema = FeedSchema {
    name_field: "nama_gua",
    fallback_name: "Gua Tanpa Nama",
    description: DescriptionRule::Field("deskripsi"),
    coordinates: CoordinateRule::Text("titik_koordinat"),
    division: Division::Caving,
    source: Source::Astacala,
    fields: &[
        ("kegiatan", AttrKey::Kegiatan),
        ("kota", AttrKey::Kota),
        ("provinsi", AttrKey::Provinsi),
        ("kedalaman", AttrKey::Kedalaman),
        ("karakter_lorong", AttrKey::KarakterLorong),
        ("waktu_kegiatan", AttrKey::WaktuKegiatan),
        ("link_rop", AttrKey::LinkRop),
    ],
};

pub static KLAPANUNGGAL_CAVES: FeedSchema = FeedSchema {
    name_field: "nama_gua",
    fallback_name: "Gua Tanpa Nama",
    description: DescriptionRule::CaveSummary,
    coordinates: CoordinateRule::Text("titik_koordinat"),
    division: Division::Caving,
    source: Source::External,
    fields: &[
        ("karakter_lorong", AttrKey::KarakterLorong),
        ("total_kedalaman", AttrKey::TotalKedalaman),
        ("total_panjang", AttrKey::TotalPanjang),
        ("elevasi_mulut_gua", AttrKey::ElevasiMulutGua),
        ("status_explore", AttrKey::StatusExplore),
        ("sinonim", AttrKey::Sinonim),
    ],
};

pub static ASTACALA_CLIMBING: FeedSchema = FeedSchema {
    name_field: "nama_lokasi",
    fallback_name: "Lokasi Tanpa Nama",
    description: DescriptionRule::Field("deskripsi"),
    coordinates: CoordinateRule::Text("titik_koordinat"),
    division: Division::PanjatTebing,
    source: Source::Astacala,
    fields: &[
        ("kegiatan", AttrKey::Kegiatan),
        ("kota", AttrKey::Kota),
        ("provinsi", AttrKey::Provinsi),
        ("ketinggian", AttrKey::Ketinggian),
        ("waktu_kegiatan", AttrKey::WaktuKegiatan),
        ("link_rop", AttrKey::LinkRop),
    ],
};

/// Yields the record list of either upstream shape.
pub fn records(body: &Value) -> &[Value] {
    let list = if body.get("type").and_then(Value::as_str) == Some("FeatureCollection") {
        body.get("features")
    } else if body.is_array() {
        Some(body)
    } else {
        body.get("data")
    };
    list.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

pub fn normalize_feed(body: &Value, schema: &FeedSchema) -> Vec<Point> {
    let records = records(body);
    let points: Vec<Point> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| normalize_record(record, schema, index))
        .collect();
    if points.len() < records.len() {
        debug!(
            "{}: dropped {} of {} records",
            schema.source,
            records.len() - points.len(),
            records.len()
        );
    }
    points
}

/// Normalizes one record, or `None` when it carries no usable position.
pub fn normalize_record(record: &Value, schema: &FeedSchema, index: usize) -> Option<Point> {
    let props = match schema.coordinates {
        CoordinateRule::GeoJsonGeometry => record.get("properties").unwrap_or(&NULL),
        _ => record,
    };

    let Some(coordinates) = extract_coordinates(record, props, schema.coordinates) else {
        debug!("{}: record {} has no usable coordinates", schema.source, index);
        return None;
    };

    let name = text_field(props, schema.name_field).unwrap_or_else(|| schema.fallback_name.to_string());
    let description = match schema.description {
        DescriptionRule::Field(field) => text_field(props, field).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        DescriptionRule::SameAsName => name.clone(),
        DescriptionRule::CaveSummary => cave_summary(props),
    };
    let id = props
        .get("id")
        .and_then(scalar_text)
        .unwrap_or_else(|| format!("unknown-{}", index));

    let mut attributes = Attributes::new();
    for (field, key) in schema.fields {
        attributes.insert(*key, attr_value(props.get(*field)));
    }
    for key in division_info(&schema.division).attributes {
        attributes.ensure(*key);
    }

    Some(Point {
        id,
        name,
        description,
        coordinates,
        division: schema.division.clone(),
        source: schema.source.clone(),
        attributes,
    })
}

fn extract_coordinates(record: &Value, props: &Value, rule: CoordinateRule) -> Option<LngLat> {
    let coordinates = match rule {
        CoordinateRule::GeoJsonGeometry => {
            let pair = record.get("geometry")?.get("coordinates")?.as_array()?;
            match pair.as_slice() {
                [lng, lat, ..] => LngLat::new(number(lng)?, number(lat)?),
                _ => return None,
            }
        }
        CoordinateRule::Text(field) => coords::parse_opt(props.get(field).and_then(Value::as_str)).ok()?,
        CoordinateRule::LatLon { lat, lon } => LngLat::new(number(props.get(lon)?)?, number(props.get(lat)?)?),
    };
    coordinates.is_in_range().then_some(coordinates)
}

fn cave_summary(props: &Value) -> String {
    let mut lines = Vec::new();
    if let Some(sinonim) = text_field(props, "sinonim") {
        lines.push(format!("Sinonim: {}", sinonim));
    }
    let elevation = props.get("elevasi_mulut_gua").and_then(scalar_text);
    lines.push(format!("Elevasi: {} m", elevation.as_deref().unwrap_or("N/A")));
    let status = text_field(props, "status_explore");
    lines.push(format!("Status: {}", status.as_deref().unwrap_or("N/A")));
    lines.join("\n")
}

fn text_field(props: &Value, field: &str) -> Option<String> {
    props.get(field).and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    let n: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

fn attr_value(value: Option<&Value>) -> AttrValue {
    match value {
        Some(Value::Number(n)) => n.as_f64().map_or(AttrValue::NotAvailable, AttrValue::Number),
        Some(Value::Bool(b)) => AttrValue::Text(if *b { "Ya" } else { "Tidak" }.to_string()),
        Some(other) => scalar_text(other).map_or(AttrValue::NotAvailable, AttrValue::Text),
        None => AttrValue::NotAvailable,
    }
}

fn optional_text(value: Option<&str>) -> AttrValue {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or(AttrValue::NotAvailable, |s| AttrValue::Text(s.to_string()))
}

/// A hand-maintained point from configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct StaticPoint {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub coordinates: String,
    pub division: String,
    #[serde(default)]
    pub kota: Option<String>,
    #[serde(default)]
    pub provinsi: Option<String>,
}

pub fn normalize_static(points: &[StaticPoint]) -> Vec<Point> {
    points
        .iter()
        .enumerate()
        .filter_map(|(index, sp)| {
            let coordinates = coords::parse(&sp.coordinates).ok().filter(LngLat::is_in_range);
            let Some(coordinates) = coordinates else {
                debug!("static point `{}` has unusable coordinates `{}`", sp.name, sp.coordinates);
                return None;
            };
            let division = Division::from(sp.division.as_str());
            let mut attributes = Attributes::new();
            attributes.insert(AttrKey::Kota, optional_text(sp.kota.as_deref()));
            attributes.insert(AttrKey::Provinsi, optional_text(sp.provinsi.as_deref()));
            for key in division_info(&division).attributes {
                attributes.ensure(*key);
            }
            Some(Point {
                id: sp.id.clone().unwrap_or_else(|| format!("static-{}", index)),
                name: sp.name.clone(),
                description: sp.description.clone().unwrap_or_else(|| NO_DESCRIPTION.to_string()),
                coordinates,
                division,
                source: Source::Static,
                attributes,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn geojson_caves_keep_geometry_order() {
        let body = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [106.95931, -6.46966] },
                    "properties": { "id": 12, "nama_gua": "Gua Cikaray", "kedalaman": 35, "kota": "Bogor" }
                },
                { "type": "Feature", "geometry": null, "properties": { "id": 13 } }
            ]
        });
        let points = normalize_feed(&body, &BANKDATA_CAVES);
        assert_eq!(points.len(), 1);
        let p = &points[0];
        assert_eq!(p.coordinates, LngLat::new(106.95931, -6.46966));
        assert_eq!(p.global_id(), "bankdata_api:12");
        assert_eq!(p.description, "Gua Cikaray");
        assert_eq!(p.attributes.get(AttrKey::Kedalaman), &AttrValue::Number(35.0));
        assert_eq!(p.attributes.get(AttrKey::Kota), &AttrValue::Text("Bogor".into()));
        // schema keys are materialized even when upstream omits them
        assert!(p.attributes.contains(AttrKey::Sinonim));
        assert!(p.attributes.contains(AttrKey::LinkRop));
        assert!(!p.attributes.get(AttrKey::LinkRop).is_available());
    }

    #[test]
    fn envelope_records_with_dms_text() {
        let body = json!({ "data": [
            { "id": "a1", "nama_gua": "Gua Lalay", "titik_koordinat": "6°50'59\"S 107°24'10\"E", "link_rop": "" },
            { "id": "a2", "nama_gua": "Gua Rusak", "titik_koordinat": "di dekat sungai" },
            { "id": "a3", "titik_koordinat": null }
        ]});
        let points = normalize_feed(&body, &ASTACALA_CAVES);
        assert_eq!(points.len(), 1);
        assert!((points[0].coordinates.lat + 6.84972).abs() < 1e-4);
        assert_eq!(points[0].description, NO_DESCRIPTION);
        assert_eq!(points[0].attributes.get(AttrKey::LinkRop), &AttrValue::NotAvailable);
    }

    #[test]
    fn iss_records_use_numeric_fields_and_drop_out_of_range() {
        let body = json!({ "data": [
            { "id": 1, "lat": -6.5, "long": 106.8, "nama_potensi_karst": "Leuwi Hejo" },
            { "id": 2, "lat": -6.5 },
            { "id": 3, "lat": 120.0, "long": 106.8 },
            { "id": 4, "lat": "-6.7", "long": "106.9" }
        ]});
        let points = normalize_feed(&body, &ISS_CAVES);
        let ids: Vec<_> = points.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["1", "4"]);
        assert_eq!(points[0].coordinates, LngLat::new(106.8, -6.5));
    }

    #[test]
    fn klapanunggal_description_is_composed() {
        let body = json!({ "data": [
            { "id": 5, "nama_gua": "Gua Cibeureum", "titik_koordinat": "-6.45, 106.95",
              "sinonim": "Gua Merah", "elevasi_mulut_gua": 210 }
        ]});
        let points = normalize_feed(&body, &KLAPANUNGGAL_CAVES);
        assert_eq!(points[0].description, "Sinonim: Gua Merah\nElevasi: 210 m\nStatus: N/A");
        assert_eq!(points[0].source, Source::External);
    }

    #[test]
    fn climbing_points_get_division_and_fallback_name() {
        let body = json!({ "data": [ { "titik_koordinat": "6.7462°S 107.3456°E", "ketinggian": "120" } ] });
        let points = normalize_feed(&body, &ASTACALA_CLIMBING);
        assert_eq!(points[0].division, Division::PanjatTebing);
        assert_eq!(points[0].name, "Lokasi Tanpa Nama");
        assert_eq!(points[0].id, "unknown-0");
        assert_eq!(points[0].attributes.get(AttrKey::Ketinggian), &AttrValue::Text("120".into()));
    }

    #[test]
    fn unexpected_body_shapes_yield_nothing() {
        assert!(normalize_feed(&json!({ "errors": [] }), &ISS_CAVES).is_empty());
        assert!(normalize_feed(&json!("oops"), &ISS_CAVES).is_empty());
        assert!(normalize_feed(&json!({ "type": "FeatureCollection" }), &BANKDATA_CAVES).is_empty());
    }

    #[test]
    fn static_points_keep_unknown_divisions() {
        let points = normalize_static(&[
            StaticPoint {
                id: None,
                name: "Gunung Banyak".into(),
                description: Some("Lokasi populer paralayang di Jawa Timur.".into()),
                coordinates: "-7.8822, 112.5191".into(),
                division: "paralayang".into(),
                kota: Some("Batu".into()),
                provinsi: None,
            },
            StaticPoint {
                id: Some("sungai".into()),
                name: "Citarik".into(),
                description: None,
                coordinates: "6.9°S 106.5°E".into(),
                division: "arungJeram".into(),
                kota: None,
                provinsi: None,
            },
            StaticPoint {
                id: None,
                name: "Rusak".into(),
                description: None,
                coordinates: "?".into(),
                division: "pendaki".into(),
                kota: None,
                provinsi: None,
            },
        ]);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].global_id(), "static:static-0");
        assert_eq!(points[1].division, Division::Other("arungJeram".into()));
        assert!(points[1].attributes.contains(AttrKey::Lokasi));
    }
}
