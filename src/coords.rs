//! Coordinate text parsing.
//!
//! Upstream feeds encode positions in three ways:
//!
//! - comma-decimal: `"-6.826774, 107.443921"` (latitude first)
//! - cardinal-decimal: `"6.46966°S 106.95931°E"`
//! - degrees-minutes-seconds: `"6°50'59\"S 107°24'10\"E"`
//!
//! The grammar is sniffed, not tagged. Every grammar yields `[lng, lat]`.

use crate::models::LngLat;
use once_cell::sync::Lazy;
use regex::Regex;

static DMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(\d+)\s*°\s*(\d+)\s*['′’]\s*(\d+)\s*["″”]\s*([NS])\s+(\d+)\s*°\s*(\d+)\s*['′’]\s*(\d+)\s*["″”]\s*([EW])\s*$"#,
    )
    .expect("DMS pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedCoordinate {
    Parsed(LngLat),
    Unparseable,
}

impl ParsedCoordinate {
    pub fn ok(self) -> Option<LngLat> {
        match self {
            ParsedCoordinate::Parsed(c) => Some(c),
            ParsedCoordinate::Unparseable => None,
        }
    }
}

impl From<Option<LngLat>> for ParsedCoordinate {
    fn from(value: Option<LngLat>) -> Self {
        value.map_or(ParsedCoordinate::Unparseable, ParsedCoordinate::Parsed)
    }
}

type Grammar = fn(&str) -> Option<LngLat>;

/// Tried in order. DMS text would otherwise be half-read by the looser
/// cardinal grammar.
const GRAMMARS: [Grammar; 3] = [parse_dms, parse_comma_decimal, parse_cardinal_decimal];

pub fn parse(input: &str) -> ParsedCoordinate {
    let input = input.trim();
    if input.is_empty() {
        return ParsedCoordinate::Unparseable;
    }
    GRAMMARS.iter().find_map(|grammar| grammar(input)).into()
}

pub fn parse_opt(input: Option<&str>) -> ParsedCoordinate {
    input.map_or(ParsedCoordinate::Unparseable, parse)
}

pub fn parse_comma_decimal(input: &str) -> Option<LngLat> {
    let (lat, lng) = input.split_once(',')?;
    let lat = parse_float(lat)?;
    let lng = parse_float(lng)?;
    Some(LngLat::new(lng, lat))
}

pub fn parse_cardinal_decimal(input: &str) -> Option<LngLat> {
    let mut tokens = input.split_whitespace();
    let lat = signed_magnitude(tokens.next()?, 'N', 'S')?;
    let lng = signed_magnitude(tokens.next()?, 'E', 'W')?;
    if tokens.next().is_some() {
        return None;
    }
    Some(LngLat::new(lng, lat))
}

pub fn parse_dms(input: &str) -> Option<LngLat> {
    let caps = DMS.captures(input)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let lat = dms_to_decimal(part(1)?, part(2)?, part(3)?)?;
    let lng = dms_to_decimal(part(5)?, part(6)?, part(7)?)?;
    let lat = if &caps[4] == "S" { -lat } else { lat };
    let lng = if &caps[8] == "W" { -lng } else { lng };
    Some(LngLat::new(lng, lat))
}

fn dms_to_decimal(degrees: u32, minutes: u32, seconds: u32) -> Option<f64> {
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(f64::from(degrees) + f64::from(minutes) / 60.0 + f64::from(seconds) / 3600.0)
}

fn signed_magnitude(token: &str, positive: char, negative: char) -> Option<f64> {
    let hemisphere = token.chars().last()?;
    let sign = if hemisphere == positive {
        1.0
    } else if hemisphere == negative {
        -1.0
    } else {
        return None;
    };
    let magnitude = token[..token.len() - hemisphere.len_utf8()].trim_end_matches('°');
    Some(sign * parse_float(magnitude)?)
}

fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: LngLat, lng: f64, lat: f64, tol: f64) -> bool {
        (a.lng - lng).abs() <= tol && (a.lat - lat).abs() <= tol
    }

    #[test]
    fn comma_decimal_is_lat_then_lng() {
        let c = parse("-6.826774, 107.443921").ok().unwrap();
        assert!(close(c, 107.443921, -6.826774, 1e-9));

        let c = parse("-6.826774033660179,107.4439211531441").ok().unwrap();
        assert!(close(c, 107.4439211531441, -6.826774033660179, 1e-12));
    }

    #[test]
    fn comma_decimal_grid_keeps_values() {
        for (lat, lng) in [(-6.5, 106.25), (0.0, 0.0), (12.125, -77.0625), (-89.999, 179.999)] {
            let c = parse(&format!("{lat}, {lng}")).ok().unwrap();
            assert!(close(c, lng, lat, 1e-9), "{lat}, {lng}");
        }
    }

    #[test]
    fn cardinal_decimal_applies_hemisphere_sign() {
        let c = parse("6.46966°S 106.95931°E").ok().unwrap();
        assert!(close(c, 106.95931, -6.46966, 1e-12));

        let n = parse("6.46966°N 106.95931°E").ok().unwrap();
        assert_eq!(n.lng, c.lng);
        assert_eq!(n.lat, -c.lat);

        let w = parse("6.46966S 106.95931W").ok().unwrap();
        assert!(close(w, -106.95931, -6.46966, 1e-12));
    }

    #[test]
    fn dms_converts_to_decimal_degrees() {
        let c = parse("6°50'59\"S 107°24'10\"E").ok().unwrap();
        assert!(close(c, 107.40278, -6.84972, 1e-4));

        let typographic = parse("6°50′59″S 107°24′10″E").ok().unwrap();
        assert!(close(typographic, c.lng, c.lat, 1e-12));
    }

    #[test]
    fn dms_rejects_minutes_or_seconds_out_of_range() {
        assert_eq!(parse("6°60'00\"S 107°24'10\"E"), ParsedCoordinate::Unparseable);
        assert_eq!(parse_dms("6°10'75\"S 107°24'10\"E"), None);
    }

    #[test]
    fn missing_or_garbage_input_is_unparseable() {
        assert_eq!(parse_opt(None), ParsedCoordinate::Unparseable);
        assert_eq!(parse(""), ParsedCoordinate::Unparseable);
        assert_eq!(parse("   "), ParsedCoordinate::Unparseable);
        assert_eq!(parse("Gunung Parang"), ParsedCoordinate::Unparseable);
        assert_eq!(parse("abc, def"), ParsedCoordinate::Unparseable);
        assert_eq!(parse("6.4 106.9"), ParsedCoordinate::Unparseable);
        assert_eq!(parse("6.4°S 106.9°E 12"), ParsedCoordinate::Unparseable);
        assert_eq!(parse("1, 2, 3"), ParsedCoordinate::Unparseable);
    }

    #[test]
    fn out_of_range_values_are_still_returned() {
        let c = parse("95.0, 200.0").ok().unwrap();
        assert!(!c.is_in_range());
    }
}
