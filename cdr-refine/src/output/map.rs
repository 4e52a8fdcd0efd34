//! Standalone Leaflet map report

use super::OutputError;
use crate::boundary::Polygon;
use crate::model::{IndexedRow, Value};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapCounts {
    pub included: usize,
    pub excluded: usize,
    pub invalid: usize,
}

#[derive(Serialize)]
struct Payload {
    /// Leaflet rings of `[lat, lon]`
    polygon: Vec<Vec<[f64; 2]>>,
    points: Vec<[f64; 2]>,
    counts: MapCounts,
}

fn payload(
    polygon: &Polygon,
    rows: &[IndexedRow],
    lat_key: &str,
    lon_key: &str,
    counts: MapCounts,
) -> Payload {
    let ring = polygon.vertices().iter().map(|v| [v.lat, v.lon]).collect();
    let points = rows
        .iter()
        .filter_map(|indexed| {
            let lat = indexed.row.get(lat_key).and_then(Value::as_f64)?;
            let lon = indexed.row.get(lon_key).and_then(Value::as_f64)?;
            Some([lat, lon])
        })
        .collect();
    Payload {
        polygon: vec![ring],
        points,
        counts,
    }
}

/// Write the HTML report embedding the boundary, kept points and counts
pub fn write_map_report(
    path: &Path,
    polygon: &Polygon,
    rows: &[IndexedRow],
    lat_key: &str,
    lon_key: &str,
    counts: MapCounts,
) -> Result<(), OutputError> {
    let data = serde_json::to_string(&payload(polygon, rows, lat_key, lon_key, counts))?;
    // Keep the JSON from closing the script element early
    let data = data.replace("</", "<\\/");
    std::fs::write(path, TEMPLATE.replace("__PAYLOAD__", &data))?;
    Ok(())
}

const TEMPLATE: &str = r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Crash Data Refiner Map Report</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" crossorigin="">
  <style>
    html, body { margin: 0; height: 100%; background: #0d1117; color: #e6edf3; font-family: "Segoe UI", sans-serif; }
    .header { padding: 18px 24px; background: #111827; border-bottom: 1px solid #24384b; }
    .title { font-size: 20px; font-weight: 600; margin: 0 0 8px; }
    .summary { display: flex; gap: 18px; font-size: 14px; flex-wrap: wrap; }
    .summary span { background: #0c2d50; color: #58a6ff; padding: 4px 10px; border-radius: 999px; }
    #map { height: calc(100% - 82px); }
  </style>
</head>
<body>
  <div class="header">
    <div class="title">Crash Data Refiner - Map Report</div>
    <div class="summary">
      <span>Included: <strong id="included-count"></strong></span>
      <span>Excluded: <strong id="excluded-count"></strong></span>
      <span>Invalid Lat/Long: <strong id="invalid-count"></strong></span>
    </div>
  </div>
  <div id="map"></div>
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" crossorigin=""></script>
  <script>
    const payload = __PAYLOAD__;
    document.getElementById("included-count").textContent = payload.counts.included;
    document.getElementById("excluded-count").textContent = payload.counts.excluded;
    document.getElementById("invalid-count").textContent = payload.counts.invalid;

    const map = L.map("map");
    const streets = L.tileLayer("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", {
      maxZoom: 19,
      attribution: "&copy; OpenStreetMap contributors",
    }).addTo(map);
    const imagery = L.tileLayer(
      "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
      { maxZoom: 19, attribution: "Tiles &copy; Esri" }
    );

    const boundary = L.polygon(payload.polygon, {
      color: "#58a6ff", weight: 3, fillColor: "#0c2d50", fillOpacity: 0.2,
    }).addTo(map);

    const markers = L.layerGroup();
    payload.points.forEach((point) => {
      L.circleMarker(point, {
        radius: 3, color: "#2ea043", fillColor: "#2ea043", fillOpacity: 0.8, weight: 1,
      }).addTo(markers);
    });
    markers.addTo(map);

    L.control.layers({ "Streets": streets, "Imagery": imagery }, { "Included Crashes": markers }).addTo(map);
    map.fitBounds(boundary.getBounds(), { padding: [20, 20] });
  </script>
</body>
</html>
"##;
