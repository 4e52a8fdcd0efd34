//! KMZ crash markers
//!
//! One numbered placemark per kept row. The description bubble shows four
//! summary lines (weather, road surface, primary factor, collision type)
//! followed by the narrative; missing lines are backfilled from the row's
//! other non-blank values.

use super::OutputError;
use crate::config::LabelOrder;
use crate::model::{IndexedRow, Row, Value};
use quick_xml::escape::escape;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const SUMMARY_FIELDS: [&[&str]; 4] = [
    &["weather", "weather_condition", "weather_conditions"],
    &[
        "road_surface",
        "road_surface_condition",
        "surface_condition",
        "roadway_surface",
    ],
    &[
        "primary_factor",
        "contributing_factor",
        "contributing_factors",
        "primary_cause",
        "cause",
    ],
    &[
        "collision_type",
        "manner_of_collision",
        "crash_type",
        "collision_manner",
    ],
];

const NARRATIVE_FIELDS: &[&str] = &[
    "narrative",
    "crash_narrative",
    "crash_narrative_text",
    "crash_report_narrative",
    "report_narrative",
    "narrative_text",
    "description",
    "summary",
    "remarks",
    "notes",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Placemark {
    pub lat: f64,
    pub lon: f64,
    pub description: String,
}

fn text_of(value: &Value) -> String {
    value.to_string().trim().to_string()
}

fn first_nonempty<'r>(row: &'r Row, candidates: &[&str]) -> Option<(&'r str, String)> {
    candidates.iter().find_map(|key| {
        row.iter()
            .find(|(name, _)| name == key)
            .map(|(name, value)| (name, text_of(value)))
            .filter(|(_, text)| !text.is_empty())
    })
}

fn first_containing<'r>(row: &'r Row, needles: &[&str]) -> Option<(&'r str, String)> {
    needles.iter().find_map(|needle| {
        row.iter()
            .filter(|(name, _)| name.contains(*needle))
            .map(|(name, value)| (name, text_of(value)))
            .find(|(_, text)| !text.is_empty())
    })
}

fn line(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "<br/>")
}

/// Build the popup text for one row
pub fn describe(row: &Row, lat_key: &str, lon_key: &str) -> String {
    let mut used: Vec<&str> = vec![lat_key, lon_key];
    let mut summary: Vec<String> = Vec::with_capacity(SUMMARY_FIELDS.len());
    for candidates in SUMMARY_FIELDS {
        match first_nonempty(row, candidates) {
            Some((key, text)) => {
                used.push(key);
                summary.push(text);
            }
            None => summary.push(String::new()),
        }
    }

    let mut narrative = String::new();
    if let Some((key, text)) = first_nonempty(row, NARRATIVE_FIELDS)
        .or_else(|| first_containing(row, &["narrative", "description"]))
    {
        used.push(key);
        narrative = text;
    }

    let mut remaining = row
        .iter()
        .filter(|(name, _)| !used.contains(name))
        .map(|(_, value)| text_of(value))
        .filter(|text| !text.is_empty());

    for slot in summary.iter_mut().filter(|s| s.is_empty()) {
        match remaining.next() {
            Some(text) => *slot = text,
            None => break,
        }
    }
    if narrative.is_empty() {
        narrative = remaining.next().unwrap_or_default();
    }

    summary
        .iter()
        .chain(std::iter::once(&narrative))
        .map(|s| line(s))
        .collect::<Vec<_>>()
        .join("<br/>")
}

/// Placemarks for rows with usable coordinates, ordered for labelling
pub fn placemarks(
    rows: &[IndexedRow],
    lat_key: &str,
    lon_key: &str,
    order: LabelOrder,
) -> Vec<Placemark> {
    let mut marks: Vec<Placemark> = rows
        .iter()
        .filter_map(|indexed| {
            let row = &indexed.row;
            let lat = row.get(lat_key).and_then(Value::as_f64)?;
            let lon = row.get(lon_key).and_then(Value::as_f64)?;
            Some(Placemark {
                lat,
                lon,
                description: describe(row, lat_key, lon_key),
            })
        })
        .collect();

    match order {
        LabelOrder::Source => {}
        LabelOrder::WestToEast => {
            marks.sort_by(|a, b| a.lon.total_cmp(&b.lon).then(a.lat.total_cmp(&b.lat)))
        }
        LabelOrder::SouthToNorth => {
            marks.sort_by(|a, b| a.lat.total_cmp(&b.lat).then(a.lon.total_cmp(&b.lon)))
        }
    }
    marks
}

fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn render_kml(document_name: &str, marks: &[Placemark]) -> String {
    let mut body = String::new();
    for (i, mark) in marks.iter().enumerate() {
        let number = i + 1;
        let style = if number % 2 == 1 { "#crash_odd" } else { "#crash_even" };
        body.push_str(&format!(
            r#"    <Placemark>
      <name>{number}</name>
      <Snippet maxLines="0"></Snippet>
      <description>{description}</description>
      <LookAt>
        <longitude>{lon}</longitude>
        <latitude>{lat}</latitude>
        <altitude>0</altitude>
        <range>1000</range>
        <altitudeMode>relativeToGround</altitudeMode>
      </LookAt>
      <styleUrl>{style}</styleUrl>
      <Point>
        <coordinates>{lon},{lat},0</coordinates>
      </Point>
    </Placemark>
"#,
            description = cdata(&mark.description),
            lat = mark.lat,
            lon = mark.lon,
        ));
    }

    let style = |id: &str, icon: &str| {
        format!(
            r#"  <Style id="{id}">
    <IconStyle>
      <Icon>
        <href>http://maps.google.com/mapfiles/kml/paddle/{icon}</href>
      </Icon>
    </IconStyle>
    <BalloonStyle>
      <text>$[description]</text>
    </BalloonStyle>
  </Style>
"#
        )
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
<Document>
  <name>{name}</name>
{odd}{even}  <Folder>
    <name>Crash Data</name>
{body}  </Folder>
</Document>
</kml>
"#,
        name = escape(document_name),
        odd = style("crash_odd", "red-circle.png"),
        even = style("crash_even", "orange-circle.png"),
    )
}

/// Write the marker KMZ; returns the placemark count
pub fn write_markers(
    path: &Path,
    rows: &[IndexedRow],
    lat_key: &str,
    lon_key: &str,
    order: LabelOrder,
) -> Result<usize, OutputError> {
    let marks = placemarks(rows, lat_key, lon_key, order);
    let document_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut zip = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("doc.kml", options)?;
    zip.write_all(render_kml(&document_name, &marks).as_bytes())?;
    zip.finish()?;

    Ok(marks.len())
}
