//! Geo link translation
//!
//! Map-service links embedded in articles are turned into `geo:` URIs the
//! reading device can hand to any map application. Two upstream shapes are
//! recognized: `poimap2.php?lat=..&lon=..` and geohack's packed
//! `?params=48.85825_N_2.2945_E_type:landmark` format (decimal,
//! semicolon-paired, or degree/minute/second).

use url::Url;

/// DMS positional divisors: degrees, minutes, seconds.
const DMS_FACTORS: [f64; 3] = [1.0, 60.0, 3600.0];

/// Translates a map-service href into a `geo:` URI
///
/// Returns `None` for anything that is not a recognizable geo link; the
/// caller leaves such hrefs untouched.
pub fn translate_geo_link(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;

    if href.contains("poimap2.php") {
        return translate_poimap(&url);
    }
    if href.contains("geohack.php") {
        return translate_geohack(&url);
    }
    None
}

fn format_geo(lat: f64, lon: f64) -> Option<String> {
    if lat.is_finite() && lon.is_finite() {
        Some(format!("geo:{},{}", lat, lon))
    } else {
        None
    }
}

/// `poimap2.php?lat=48.8&lon=2.3&...` carries the pair directly
fn translate_poimap(url: &Url) -> Option<String> {
    let mut lat = None;
    let mut lon = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "lat" => lat = value.parse::<f64>().ok(),
            "lon" => lon = value.parse::<f64>().ok(),
            _ => {}
        }
    }
    format_geo(lat?, lon?)
}

/// geohack packs everything into `?params=`
fn translate_geohack(url: &Url) -> Option<String> {
    // The parameter may repeat; the first value leading with a digit wins.
    let params: Vec<String> = url
        .query_pairs()
        .filter(|(key, _)| key == "params")
        .map(|(_, value)| value.into_owned())
        .collect();

    let packed = params
        .iter()
        .find(|v| v.chars().next().map_or(false, |c| c.is_ascii_digit()))?;

    let segments: Vec<&str> = packed.split('_').collect();

    // Semicolon form: "48.858;2.2945_type:landmark"
    if let Some((lat_str, lon_str)) = segments.first()?.split_once(';') {
        let lat = lat_str.parse::<f64>().ok()?;
        let lon = lon_str.parse::<f64>().ok()?;
        return format_geo(lat, lon);
    }

    parse_dms(&segments)
}

/// Decimal or degree/minute/second sequences with hemisphere letters
///
/// Numbers accumulate until a hemisphere letter closes a coordinate: the
/// first of `N`/`S` fixes the latitude, the first of `E`/`W`/`O` the
/// longitude. `S` and `W` negate; `O` (Ost) is an eastern longitude.
fn parse_dms(segments: &[&str]) -> Option<String> {
    let mut pending: Vec<f64> = Vec::new();
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for segment in segments {
        if let Ok(number) = segment.parse::<f64>() {
            if pending.len() < DMS_FACTORS.len() {
                pending.push(number);
            }
            continue;
        }

        let sign = match *segment {
            "N" | "E" | "O" => 1.0,
            "S" | "W" => -1.0,
            // First non-coordinate token ends the packed section.
            _ => break,
        };

        let mut value = 0.0;
        for (i, part) in pending.iter().enumerate() {
            value += part / DMS_FACTORS[i];
        }
        pending.clear();

        match *segment {
            "N" | "S" if lat.is_none() => lat = Some(sign * value),
            "E" | "W" | "O" if lon.is_none() => lon = Some(sign * value),
            _ => {}
        }

        if lat.is_some() && lon.is_some() {
            break;
        }
    }

    format_geo(lat?, lon?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geohack_decimal() {
        let href = "http://tools.wmflabs.org/geohack/geohack.php?params=48.85825_N_2.2945_E_type:landmark";
        assert_eq!(
            translate_geo_link(href).as_deref(),
            Some("geo:48.85825,2.2945")
        );
    }

    #[test]
    fn test_geohack_semicolon() {
        let href =
            "http://tools.wmflabs.org/geohack/geohack.php?params=48.858;2.2945_type:landmark";
        assert_eq!(translate_geo_link(href).as_deref(), Some("geo:48.858,2.2945"));
    }

    #[test]
    fn test_geohack_south_west_negates() {
        let href = "http://tools.wmflabs.org/geohack/geohack.php?params=33.865_S_151.2094_W";
        assert_eq!(
            translate_geo_link(href).as_deref(),
            Some("geo:-33.865,-151.2094")
        );
    }

    #[test]
    fn test_geohack_dms() {
        let href = "http://tools.wmflabs.org/geohack/geohack.php?params=48_51_29_N_2_17_40_E_type:landmark";
        let geo = translate_geo_link(href).unwrap();
        let rest = geo.strip_prefix("geo:").unwrap();
        let (lat, lon) = rest.split_once(',').unwrap();
        let lat: f64 = lat.parse().unwrap();
        let lon: f64 = lon.parse().unwrap();
        assert!((lat - (48.0 + 51.0 / 60.0 + 29.0 / 3600.0)).abs() < 1e-9);
        assert!((lon - (2.0 + 17.0 / 60.0 + 40.0 / 3600.0)).abs() < 1e-9);
    }

    #[test]
    fn test_geohack_ost_is_positive_longitude() {
        let href = "http://tools.wmflabs.org/geohack/geohack.php?params=52.5_N_13.4_O_region:DE";
        assert_eq!(translate_geo_link(href).as_deref(), Some("geo:52.5,13.4"));
    }

    #[test]
    fn test_poimap() {
        let href = "http://example.org/poimap2.php?lat=48.8&lon=2.3&zoom=12";
        assert_eq!(translate_geo_link(href).as_deref(), Some("geo:48.8,2.3"));
    }

    #[test]
    fn test_poimap_missing_lon() {
        let href = "http://example.org/poimap2.php?lat=48.8";
        assert_eq!(translate_geo_link(href), None);
    }

    #[test]
    fn test_ordinary_link_untouched() {
        assert_eq!(translate_geo_link("https://example.org/wiki/Paris"), None);
    }

    #[test]
    fn test_malformed_href() {
        assert_eq!(translate_geo_link("not a url at all"), None);
        assert_eq!(translate_geo_link(""), None);
    }

    #[test]
    fn test_geohack_junk_params() {
        let href = "http://tools.wmflabs.org/geohack/geohack.php?params=type:landmark";
        assert_eq!(translate_geo_link(href), None);
    }
}
