use super::{PolygonSource, SourceError};
use crate::boundary::{GeoPoint, Polygon};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// KMZ archive (or bare KML document) holding one boundary polygon
#[derive(Debug, Clone)]
pub struct KmzSource {
    path: PathBuf,
}

impl KmzSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn kml_text(&self) -> Result<String, SourceError> {
        let is_kml = self
            .path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("kml"));
        if is_kml {
            return Ok(std::fs::read_to_string(&self.path)?);
        }

        let file = File::open(&self.path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| SourceError::Kmz(format!("cannot open KMZ archive: {e}")))?;

        let mut kml_index = None;
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| SourceError::Kmz(format!("cannot read archive entry: {e}")))?;
            if entry.name().to_ascii_lowercase().ends_with(".kml") {
                kml_index = Some(i);
                break;
            }
        }
        let index =
            kml_index.ok_or_else(|| SourceError::Kmz("KMZ does not contain a KML file".to_string()))?;

        let mut entry = archive
            .by_index(index)
            .map_err(|e| SourceError::Kmz(format!("cannot read archive entry: {e}")))?;
        let mut text = String::new();
        entry.read_to_string(&mut text)?;
        Ok(text)
    }
}

impl PolygonSource for KmzSource {
    fn load(&self) -> Result<Polygon, SourceError> {
        parse_kml(&self.kml_text()?)
    }
}

/// Extract the single polygon's outer ring from a KML document
///
/// Polygons with inner rings (holes) are rejected. Polygons with an empty
/// outer ring are skipped.
pub fn parse_kml(text: &str) -> Result<Polygon, SourceError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut rings: Vec<Vec<GeoPoint>> = Vec::new();
    let mut holes = 0usize;
    let mut in_polygon = false;
    let mut in_outer = false;
    let mut in_coordinates = false;
    let mut current: Option<Vec<GeoPoint>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Polygon" => {
                    in_polygon = true;
                    current = Some(Vec::new());
                }
                b"outerBoundaryIs" if in_polygon => in_outer = true,
                b"innerBoundaryIs" if in_polygon => holes += 1,
                b"coordinates" => in_coordinates = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_polygon && in_outer && in_coordinates => {
                let text = e
                    .unescape()
                    .map_err(|err| SourceError::Xml(err.to_string()))?;
                if let Some(ring) = current.as_mut() {
                    ring.extend(parse_coordinates(&text));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"Polygon" => {
                    in_polygon = false;
                    if let Some(ring) = current.take() {
                        if !ring.is_empty() {
                            rings.push(ring);
                        }
                    }
                }
                b"outerBoundaryIs" => in_outer = false,
                b"coordinates" => in_coordinates = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SourceError::Xml(format!(
                    "parse error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if holes > 0 {
        return Err(SourceError::Kmz(format!(
            "boundary polygon has {holes} inner ring(s); polygons with holes are not supported"
        )));
    }

    match rings.len() {
        0 => Err(SourceError::Kmz("no polygon found in boundary file".to_string())),
        1 => {
            let ring = rings.pop().unwrap_or_default();
            Polygon::new(ring).map_err(|e| SourceError::Kmz(e.to_string()))
        }
        n => Err(SourceError::Kmz(format!(
            "boundary file contains {n} polygons; only one is supported"
        ))),
    }
}

/// `lon,lat[,alt]` tuples separated by whitespace; malformed tuples skipped
fn parse_coordinates(text: &str) -> Vec<GeoPoint> {
    text.split_whitespace()
        .filter_map(|token| {
            let mut parts = token.split(',');
            let lon = parts.next()?.trim().parse::<f64>().ok()?;
            let lat = parts.next()?.trim().parse::<f64>().ok()?;
            Some(GeoPoint::new(lat, lon))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn kml(polygons: &[&str]) -> String {
        let placemarks: String = polygons
            .iter()
            .map(|coords| {
                format!(
                    "<Placemark><Polygon><outerBoundaryIs><LinearRing><coordinates>{coords}</coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><kml xmlns="http://www.opengis.net/kml/2.2"><Document>{placemarks}</Document></kml>"#
        )
    }

    const SQUARE: &str = "-90,40,0 -89,40,0\n -89,41,0 -90,41,0 -90,40,0";

    #[test]
    fn test_parses_single_polygon() {
        let polygon = parse_kml(&kml(&[SQUARE])).unwrap();
        assert_eq!(polygon.vertex_count(), 4);
        assert_eq!(polygon.vertices()[0], GeoPoint::new(40.0, -90.0));
    }

    #[test]
    fn test_zero_or_many_polygons_rejected() {
        assert!(matches!(parse_kml(&kml(&[])), Err(SourceError::Kmz(_))));
        assert!(matches!(parse_kml(&kml(&[SQUARE, SQUARE])), Err(SourceError::Kmz(_))));
    }

    #[test]
    fn test_polygon_with_hole_rejected() {
        let text = r#"<kml><Placemark><Polygon>
            <outerBoundaryIs><LinearRing><coordinates>-90,40 -89,40 -89,41 -90,41</coordinates></LinearRing></outerBoundaryIs>
            <innerBoundaryIs><LinearRing><coordinates>-89.6,40.4 -89.4,40.4 -89.4,40.6 -89.6,40.6</coordinates></LinearRing></innerBoundaryIs>
            </Polygon></Placemark></kml>"#;
        match parse_kml(text) {
            Err(SourceError::Kmz(message)) => assert!(message.contains("inner ring")),
            other => panic!("expected a boundary error, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        assert!(parse_kml(&kml(&["-90,40 -89,40"])).is_err());
    }

    #[test]
    fn test_reads_kml_inside_kmz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary.kmz");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("doc.kml", SimpleFileOptions::default()).unwrap();
        zip.write_all(kml(&[SQUARE]).as_bytes()).unwrap();
        zip.finish().unwrap();

        let polygon = KmzSource::new(&path).load().unwrap();
        assert_eq!(polygon.vertex_count(), 4);
    }

    #[test]
    fn test_kmz_without_kml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.kmz");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"nothing").unwrap();
        zip.finish().unwrap();

        assert!(matches!(KmzSource::new(&path).load(), Err(SourceError::Kmz(_))));
    }
}
