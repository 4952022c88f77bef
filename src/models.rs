use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }

    pub fn is_in_range(&self) -> bool {
        self.is_finite() && (-180.0..=180.0).contains(&self.lng) && (-90.0..=90.0).contains(&self.lat)
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(c: LngLat) -> Self {
        [c.lng, c.lat]
    }
}

/// Activity category of a point. Unknown wire keys are kept as `Other`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(from = "String", into = "String")]
pub enum Division {
    Pendaki,
    PanjatTebing,
    Paralayang,
    Caving,
    Diving,
    Other(String),
}

impl Division {
    pub const KNOWN: [Division; 5] = [
        Division::Pendaki,
        Division::PanjatTebing,
        Division::Paralayang,
        Division::Caving,
        Division::Diving,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Division::Pendaki => "pendaki",
            Division::PanjatTebing => "panjatTebing",
            Division::Paralayang => "paralayang",
            Division::Caving => "caving",
            Division::Diving => "diving",
            Division::Other(key) => key,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Division::Other(_))
    }
}

impl From<&str> for Division {
    fn from(key: &str) -> Self {
        match key {
            "pendaki" => Division::Pendaki,
            "panjatTebing" => Division::PanjatTebing,
            "paralayang" => Division::Paralayang,
            "caving" => Division::Caving,
            "diving" => Division::Diving,
            other => Division::Other(other.to_string()),
        }
    }
}

impl From<String> for Division {
    fn from(key: String) -> Self {
        Division::from(key.as_str())
    }
}

impl From<Division> for String {
    fn from(d: Division) -> Self {
        d.as_str().to_string()
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream feed a point came from.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Astacala,
    External,
    Static,
    IssData,
    BankData,
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Astacala => "astacala",
            Source::External => "external",
            Source::Static => "static",
            Source::IssData => "iss_data",
            Source::BankData => "bankdata_api",
            Source::Other(key) => key,
        }
    }
}

impl From<&str> for Source {
    fn from(key: &str) -> Self {
        match key {
            "astacala" => Source::Astacala,
            "external" => Source::External,
            "static" => Source::Static,
            "iss_data" => Source::IssData,
            "bankdata_api" => Source::BankData,
            other => Source::Other(other.to_string()),
        }
    }
}

impl From<String> for Source {
    fn from(key: String) -> Self {
        Source::from(key.as_str())
    }
}

impl From<Source> for String {
    fn from(s: Source) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum AttrKey {
    Kegiatan,
    Kota,
    Provinsi,
    LinkRop,
    WaktuKegiatan,
    KarakterLorong,
    Kedalaman,
    TotalKedalaman,
    TotalPanjang,
    ElevasiMulutGua,
    StatusExplore,
    Sinonim,
    Ketinggian,
    SumberData,
    JenisPotensiKarst,
    TypeGua,
    StatusPemetaanGua,
    Code,
    Lokasi,
}

impl AttrKey {
    /// Property name used in GeoJSON features.
    pub fn wire_key(self) -> &'static str {
        match self {
            AttrKey::Kegiatan => "kegiatan",
            AttrKey::Kota => "kota",
            AttrKey::Provinsi => "provinsi",
            AttrKey::LinkRop => "linkRop",
            AttrKey::WaktuKegiatan => "waktuKegiatan",
            AttrKey::KarakterLorong => "karakterLorong",
            AttrKey::Kedalaman => "kedalaman",
            AttrKey::TotalKedalaman => "totalKedalaman",
            AttrKey::TotalPanjang => "totalPanjang",
            AttrKey::ElevasiMulutGua => "elevasiMulutGua",
            AttrKey::StatusExplore => "statusExplore",
            AttrKey::Sinonim => "sinonim",
            AttrKey::Ketinggian => "ketinggian",
            AttrKey::SumberData => "sumberData",
            AttrKey::JenisPotensiKarst => "jenisPotensiKarst",
            AttrKey::TypeGua => "typeGua",
            AttrKey::StatusPemetaanGua => "statusPemetaanGua",
            AttrKey::Code => "code",
            AttrKey::Lokasi => "lokasi",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
    #[default]
    NotAvailable,
}

impl AttrValue {
    pub fn is_available(&self) -> bool {
        !matches!(self, AttrValue::NotAvailable)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Display form, with `unit` appended to numbers and numeric text.
    pub fn display_with_unit(&self, unit: Option<&str>) -> Option<String> {
        let plain = match self {
            AttrValue::NotAvailable => return None,
            AttrValue::Number(n) => format_number(*n),
            AttrValue::Text(s) => s.clone(),
        };
        match unit {
            Some(unit) if self.looks_numeric() => Some(format!("{} {}", plain, unit)),
            _ => Some(plain),
        }
    }

    fn looks_numeric(&self) -> bool {
        match self {
            AttrValue::Number(_) => true,
            AttrValue::Text(s) => s.trim().parse::<f64>().is_ok(),
            AttrValue::NotAvailable => false,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            AttrValue::Number(n) => json!(n),
            AttrValue::Text(s) => json!(s),
            AttrValue::NotAvailable => Value::Null,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

static NOT_AVAILABLE: AttrValue = AttrValue::NotAvailable;

/// Category-specific optional fields. Reading a key that was never set
/// yields `NotAvailable`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Attributes(BTreeMap<AttrKey, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: AttrKey) -> &AttrValue {
        self.0.get(&key).unwrap_or(&NOT_AVAILABLE)
    }

    pub fn insert(&mut self, key: AttrKey, value: AttrValue) {
        self.0.insert(key, value);
    }

    /// Marks `key` as not available unless a value is already present.
    pub fn ensure(&mut self, key: AttrKey) {
        self.0.entry(key).or_default();
    }

    pub fn contains(&self, key: AttrKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttrKey, &AttrValue)> {
        self.0.iter()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub name: String,
    pub description: String,
    pub coordinates: LngLat,
    pub division: Division,
    pub source: Source,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Point {
    /// `source:id`, unique across feeds.
    pub fn global_id(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }

    pub fn to_feature(&self) -> Value {
        let mut props = Map::new();
        props.insert("id".into(), json!(self.global_id()));
        props.insert("name".into(), json!(self.name));
        props.insert("description".into(), json!(self.description));
        props.insert("division".into(), json!(self.division.as_str()));
        props.insert("source".into(), json!(self.source.as_str()));
        for (key, value) in self.attributes.iter() {
            props.insert(key.wire_key().into(), value.to_json());
        }
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [self.coordinates.lng, self.coordinates.lat] },
            "properties": props,
        })
    }
}

/// Normalized points ready for rendering, unique by global id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    points: Vec<Point>,
}

impl PointSet {
    pub fn new(points: impl IntoIterator<Item = Point>) -> Self {
        let mut set = Self::default();
        set.extend(points);
        set
    }

    /// Appends points, skipping any whose global id is already present.
    pub fn extend(&mut self, points: impl IntoIterator<Item = Point>) {
        let mut seen: HashSet<String> = self.points.iter().map(Point::global_id).collect();
        for point in points {
            let key = point.global_id();
            if seen.insert(key.clone()) {
                self.points.push(point);
            } else {
                tracing::debug!("duplicate point {} ignored", key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    pub fn find(&self, global_id: &str) -> Option<&Point> {
        self.points.iter().find(|p| p.global_id() == global_id)
    }

    pub fn count_by_division(&self) -> BTreeMap<Division, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.points {
            *counts.entry(p.division.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_feature_collection(&self) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": self.points.iter().map(Point::to_feature).collect::<Vec<_>>(),
        })
    }
}

impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, source: Source) -> Point {
        Point {
            id: id.into(),
            name: "Gua Buni Ayu".into(),
            description: "-".into(),
            coordinates: LngLat::new(106.95, -6.46),
            division: Division::Caving,
            source,
            attributes: Attributes::new(),
        }
    }

    #[test]
    fn division_keys_round_trip_and_unknown_is_kept() {
        for d in Division::KNOWN {
            assert_eq!(Division::from(d.as_str()), d);
        }
        let other = Division::from("arungJeram");
        assert_eq!(other, Division::Other("arungJeram".into()));
        assert!(!other.is_known());
        assert_eq!(serde_json::to_value(&other).unwrap(), json!("arungJeram"));
    }

    #[test]
    fn coordinates_serialize_as_lng_lat_array() {
        let c = LngLat::new(107.4, -6.8);
        assert_eq!(serde_json::to_value(c).unwrap(), json!([107.4, -6.8]));
        assert!(c.is_in_range());
        assert!(!LngLat::new(200.0, 0.0).is_in_range());
        assert!(!LngLat::new(0.0, f64::NAN).is_in_range());
    }

    #[test]
    fn missing_attribute_reads_as_not_available() {
        let mut attrs = Attributes::new();
        assert_eq!(attrs.get(AttrKey::Kedalaman), &AttrValue::NotAvailable);
        attrs.insert(AttrKey::Kedalaman, AttrValue::Number(42.0));
        attrs.ensure(AttrKey::Kedalaman);
        attrs.ensure(AttrKey::Sinonim);
        assert_eq!(attrs.get(AttrKey::Kedalaman), &AttrValue::Number(42.0));
        assert!(attrs.contains(AttrKey::Sinonim));
        assert_eq!(
            attrs.get(AttrKey::Kedalaman).display_with_unit(Some("m")).as_deref(),
            Some("42 m")
        );
        assert_eq!(
            AttrValue::Text("vertikal".into()).display_with_unit(Some("m")).as_deref(),
            Some("vertikal")
        );
    }

    #[test]
    fn feature_properties_carry_global_id_and_nulls() {
        let mut p = point("7", Source::Astacala);
        p.attributes.ensure(AttrKey::Kota);
        let f = p.to_feature();
        assert_eq!(f["properties"]["id"], json!("astacala:7"));
        assert_eq!(f["properties"]["kota"], Value::Null);
        assert_eq!(f["geometry"]["coordinates"], json!([106.95, -6.46]));
    }

    #[test]
    fn point_set_dedupes_by_global_id_only() {
        let set = PointSet::new([
            point("1", Source::Astacala),
            point("1", Source::External),
            point("1", Source::Astacala),
        ]);
        assert_eq!(set.len(), 2);
        assert!(set.find("external:1").is_some());
        assert_eq!(set.count_by_division()[&Division::Caving], 2);
    }
}
