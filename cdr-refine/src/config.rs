//! Refinement configuration
//!
//! `RefinementConfig` is what users write (TOML, JSON or CLI flags) and uses
//! raw column spellings. `ResolvedConfig` is the validated, canonicalized form
//! the engine runs against: one `ColumnSpec` per configured column, typed
//! defaults, and canonical coordinate column names.

use crate::coerce::{coerce, BoolTokens, CoercionKind};
use crate::error::RefineError;
use crate::headers::canonicalize;
use crate::model::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Ordering of crash markers in the KMZ output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelOrder {
    /// Source row order
    #[default]
    Source,
    WestToEast,
    SouthToNorth,
}

/// User-facing refinement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub required_columns: Vec<String>,
    pub date_columns: Vec<String>,
    pub integer_columns: Vec<String>,
    pub float_columns: Vec<String>,
    pub boolean_columns: Vec<String>,
    pub dedupe_on: Vec<String>,
    /// Column → default text, coerced once with the column's kind
    pub fill_defaults: BTreeMap<String, String>,
    pub latitude_column: String,
    pub longitude_column: String,
    pub bool_tokens: BoolTokens,
    pub label_order: LabelOrder,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            required_columns: Vec::new(),
            date_columns: Vec::new(),
            integer_columns: Vec::new(),
            float_columns: Vec::new(),
            boolean_columns: Vec::new(),
            dedupe_on: Vec::new(),
            fill_defaults: BTreeMap::new(),
            latitude_column: "latitude".to_string(),
            longitude_column: "longitude".to_string(),
            bool_tokens: BoolTokens::default(),
            label_order: LabelOrder::Source,
        }
    }
}

impl RefinementConfig {
    /// Load from a `.json` file, otherwise parse as TOML
    pub fn from_path(path: &Path) -> Result<Self, RefineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RefineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content)
                .map_err(|e| RefineError::Config(format!("invalid JSON in {}: {}", path.display(), e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| RefineError::Config(format!("invalid TOML in {}: {}", path.display(), e)))
        }
    }

    /// Copy with the coordinate columns replaced
    pub fn with_coordinates(mut self, latitude: &str, longitude: &str) -> Self {
        self.latitude_column = latitude.to_string();
        self.longitude_column = longitude.to_string();
        self
    }

    /// Validate and canonicalize
    pub fn resolve(&self) -> Result<ResolvedConfig, RefineError> {
        let latitude = canonicalize(&self.latitude_column);
        let longitude = canonicalize(&self.longitude_column);
        if latitude.is_empty() || longitude.is_empty() {
            return Err(RefineError::Config(
                "latitude and longitude columns must be named".to_string(),
            ));
        }

        let mut kinds: BTreeMap<String, CoercionKind> = BTreeMap::new();
        let typed_sets = [
            (CoercionKind::Date, &self.date_columns),
            (CoercionKind::Int, &self.integer_columns),
            (CoercionKind::Float, &self.float_columns),
            (CoercionKind::Bool, &self.boolean_columns),
        ];
        for (kind, columns) in typed_sets {
            for raw in columns {
                let name = canonicalize(raw);
                if name.is_empty() {
                    continue;
                }
                if let Some(existing) = kinds.insert(name.clone(), kind) {
                    if existing != kind {
                        return Err(RefineError::Config(format!(
                            "column '{}' is configured as both {:?} and {:?}",
                            name, existing, kind
                        )));
                    }
                }
            }
        }

        // Coordinates are always read as floats
        for coord in [&latitude, &longitude] {
            match kinds.get(coord) {
                None | Some(CoercionKind::Float) => {
                    kinds.insert(coord.clone(), CoercionKind::Float);
                }
                Some(other) => {
                    return Err(RefineError::Config(format!(
                        "coordinate column '{}' cannot be coerced as {:?}",
                        coord, other
                    )));
                }
            }
        }

        let required: Vec<String> = unique_canonical(&self.required_columns);
        let mut specs: Vec<ColumnSpec> = kinds
            .iter()
            .map(|(name, kind)| ColumnSpec {
                name: name.clone(),
                kind: *kind,
                required: required.contains(name),
            })
            .collect();
        for name in &required {
            if !kinds.contains_key(name) {
                specs.push(ColumnSpec {
                    name: name.clone(),
                    kind: CoercionKind::None,
                    required: true,
                });
            }
        }

        let mut defaults = Vec::with_capacity(self.fill_defaults.len());
        for (raw_column, raw_value) in &self.fill_defaults {
            let column = canonicalize(raw_column);
            if column.is_empty() {
                continue;
            }
            let kind = kinds.get(&column).copied().unwrap_or(CoercionKind::None);
            let value = coerce(kind, raw_value, &self.bool_tokens).map_err(|e| {
                RefineError::Config(format!("default for '{}' is invalid: {}", column, e))
            })?;
            defaults.push((column, value));
        }

        Ok(ResolvedConfig {
            specs,
            dedupe_on: unique_canonical(&self.dedupe_on),
            defaults,
            latitude,
            longitude,
            bool_tokens: self.bool_tokens.clone(),
            label_order: self.label_order,
        })
    }
}

fn unique_canonical(columns: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(columns.len());
    for raw in columns {
        let name = canonicalize(raw);
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// One configured column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: CoercionKind,
    pub required: bool,
}

/// Validated configuration with canonical names
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Unique by name; sorted typed columns first, then untyped required ones
    pub specs: Vec<ColumnSpec>,
    pub dedupe_on: Vec<String>,
    pub defaults: Vec<(String, Value)>,
    pub latitude: String,
    pub longitude: String,
    pub bool_tokens: BoolTokens,
    pub label_order: LabelOrder,
}

impl ResolvedConfig {
    pub fn kind_of(&self, column: &str) -> CoercionKind {
        self.specs
            .iter()
            .find(|s| s.name == column)
            .map_or(CoercionKind::None, |s| s.kind)
    }

    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().filter(|s| s.required).map(|s| s.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_canonicalizes_names() {
        let config = RefinementConfig {
            required_columns: vec!["Crash ID".into(), "crash id".into()],
            date_columns: vec!["Crash Date".into()],
            dedupe_on: vec!["Crash ID".into()],
            latitude_column: "Lat".into(),
            longitude_column: "Lon".into(),
            ..RefinementConfig::default()
        };
        let resolved = config.resolve().unwrap();

        assert_eq!(resolved.latitude, "lat");
        assert_eq!(resolved.longitude, "lon");
        assert_eq!(resolved.dedupe_on, vec!["crash_id"]);
        assert_eq!(resolved.kind_of("crash_date"), CoercionKind::Date);
        assert_eq!(resolved.kind_of("lat"), CoercionKind::Float);
        assert_eq!(resolved.required().collect::<Vec<_>>(), vec!["crash_id"]);

        let mut names: Vec<&str> = resolved.specs.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), resolved.specs.len());
    }

    #[test]
    fn test_conflicting_kinds_rejected() {
        let config = RefinementConfig {
            date_columns: vec!["Fatalities".into()],
            integer_columns: vec!["fatalities".into()],
            ..RefinementConfig::default()
        };
        assert!(matches!(config.resolve(), Err(RefineError::Config(_))));
    }

    #[test]
    fn test_coordinate_with_wrong_kind_rejected() {
        let config = RefinementConfig {
            date_columns: vec!["Latitude".into()],
            ..RefinementConfig::default()
        };
        assert!(matches!(config.resolve(), Err(RefineError::Config(_))));
    }

    #[test]
    fn test_defaults_are_typed() {
        let mut fill = BTreeMap::new();
        fill.insert("City".to_string(), "Unknown".to_string());
        fill.insert("Fatalities".to_string(), "0".to_string());
        let config = RefinementConfig {
            integer_columns: vec!["Fatalities".into()],
            fill_defaults: fill,
            ..RefinementConfig::default()
        };
        let resolved = config.resolve().unwrap();

        assert!(resolved.defaults.contains(&("city".to_string(), Value::Text("Unknown".into()))));
        assert!(resolved.defaults.contains(&("fatalities".to_string(), Value::Int(0))));
    }

    #[test]
    fn test_invalid_default_rejected() {
        let mut fill = BTreeMap::new();
        fill.insert("Fatalities".to_string(), "none".to_string());
        let config = RefinementConfig {
            integer_columns: vec!["Fatalities".into()],
            fill_defaults: fill,
            ..RefinementConfig::default()
        };
        assert!(matches!(config.resolve(), Err(RefineError::Config(_))));
    }

    #[test]
    fn test_parses_from_toml() {
        let config: RefinementConfig = toml::from_str(
            r#"
            required_columns = ["Crash ID"]
            latitude_column = "GPS Lat"
            longitude_column = "GPS Long"
            label_order = "west_to_east"

            [fill_defaults]
            City = "Unknown"
            "#,
        )
        .unwrap();
        assert_eq!(config.label_order, LabelOrder::WestToEast);
        assert_eq!(config.latitude_column, "GPS Lat");
        assert_eq!(config.bool_tokens, BoolTokens::default());
        assert_eq!(config.fill_defaults.get("City").map(String::as_str), Some("Unknown"));
    }
}
