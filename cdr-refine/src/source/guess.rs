//! Latitude/longitude column guessing from header names

use crate::headers::canonicalize;
use serde::Serialize;

/// Best-scoring raw headers for each coordinate, if any scored above zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinateGuess {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

pub fn score_latitude_header(header: &str) -> u32 {
    let norm = canonicalize(header);
    match norm.as_str() {
        "lat" | "latitude" => 100,
        n if n.contains("latitude") => 90,
        n if n.starts_with("lat_") || n.ends_with("_lat") => 80,
        "y" | "y_coord" | "y_coordinate" => 70,
        n if n.contains("lat") => 50,
        _ => 0,
    }
}

pub fn score_longitude_header(header: &str) -> u32 {
    let norm = canonicalize(header);
    match norm.as_str() {
        "lon" | "long" | "longitude" => 100,
        n if n.contains("longitude") => 90,
        n if ["lon_", "long_"].iter().any(|p| n.starts_with(p))
            || ["_lon", "_long"].iter().any(|s| n.ends_with(s)) =>
        {
            80
        }
        "x" | "x_coord" | "x_coordinate" => 70,
        n if n.contains("lon") => 50,
        _ => 0,
    }
}

fn best<S: AsRef<str>>(headers: &[S], score: fn(&str) -> u32) -> Option<String> {
    let mut choice: Option<(u32, &str)> = None;
    for header in headers {
        let header = header.as_ref();
        let s = score(header);
        // First header wins ties
        if s > 0 && choice.map_or(true, |(top, _)| s > top) {
            choice = Some((s, header));
        }
    }
    choice.map(|(_, header)| header.to_string())
}

/// Pick the most likely latitude and longitude headers
pub fn guess_lat_lon<S: AsRef<str>>(headers: &[S]) -> CoordinateGuess {
    CoordinateGuess {
        latitude: best(headers, score_latitude_header),
        longitude: best(headers, score_longitude_header),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores() {
        assert_eq!(score_latitude_header("Latitude"), 100);
        assert_eq!(score_latitude_header("GPS Latitude"), 90);
        assert_eq!(score_latitude_header("Crash Lat"), 80);
        assert_eq!(score_latitude_header("Y"), 70);
        assert_eq!(score_latitude_header("Relation"), 50);
        assert_eq!(score_latitude_header("City"), 0);

        assert_eq!(score_longitude_header("LONG"), 100);
        assert_eq!(score_longitude_header("Longitude (deg)"), 90);
        assert_eq!(score_longitude_header("gps_lon"), 80);
        assert_eq!(score_longitude_header("x_coord"), 70);
    }

    #[test]
    fn test_guess_prefers_highest_score() {
        let guess = guess_lat_lon(&["Crash ID", "Y", "GPS Latitude", "Longitude", "X"]);
        assert_eq!(guess.latitude.as_deref(), Some("GPS Latitude"));
        assert_eq!(guess.longitude.as_deref(), Some("Longitude"));
    }

    #[test]
    fn test_guess_none_when_nothing_matches() {
        let guess = guess_lat_lon(&["Crash ID", "City"]);
        assert_eq!(guess, CoordinateGuess::default());
    }
}
