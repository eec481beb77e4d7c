use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A user-supplied tool parameter value.
///
/// Serializes untagged, so presets and pipeline files carry plain JSON
/// scalars. Integer-valued JSON numbers deserialize as `Int`, the rest as
/// `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl ParamValue {
    /// Integer view: exact ints, whole floats, and parseable strings
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            ParamValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view: numbers and parseable strings
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// One backend stage descriptor, the unit the executor interprets.
///
/// Serializes to the persisted pipeline shape, tagged by stage type:
/// `{"type": "filters.range", "limits": "Classification![7:7]"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageConfig {
    #[serde(rename = "readers.las")]
    LasReader { filename: String },

    #[serde(rename = "readers.pgpointcloud")]
    PgPointcloudReader {
        connection: String,
        schema: String,
        table: String,
        column: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        r#where: String,
    },

    #[serde(rename = "filters.decimation")]
    Decimation { step: u64 },

    #[serde(rename = "filters.range")]
    Range { limits: String },

    #[serde(rename = "filters.crop")]
    Crop { bounds: String },

    #[serde(rename = "filters.outlier")]
    Outlier {
        method: String,
        mean_k: usize,
        multiplier: f64,
    },

    #[serde(rename = "filters.elm")]
    Elm { cell: f64, class: u8, threshold: f64 },

    #[serde(rename = "filters.smrf")]
    Smrf {
        cell: f64,
        slope: f64,
        window: f64,
        threshold: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        ignore: Option<String>,
    },

    #[serde(rename = "filters.cluster")]
    Cluster { min_points: usize, tolerance: f64 },

    #[serde(rename = "filters.reprojection")]
    Reprojection {
        #[serde(skip_serializing_if = "Option::is_none")]
        in_srs: Option<String>,
        out_srs: String,
    },

    #[serde(rename = "filters.merge")]
    Merge,

    #[serde(rename = "writers.las")]
    LasWriter { filename: String },

    #[serde(rename = "writers.pgpointcloud")]
    PgPointcloudWriter {
        connection: String,
        schema: String,
        table: String,
        column: String,
        srid: u32,
        compression: String,
        capacity: usize,
    },

    #[serde(rename = "writers.gdal")]
    GdalWriter {
        filename: String,
        resolution: f64,
        output_type: String,
        radius: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        power: Option<f64>,
    },
}

impl StageConfig {
    /// The stage's type tag, as it appears in serialized pipelines
    pub fn kind(&self) -> &'static str {
        match self {
            StageConfig::LasReader { .. } => "readers.las",
            StageConfig::PgPointcloudReader { .. } => "readers.pgpointcloud",
            StageConfig::Decimation { .. } => "filters.decimation",
            StageConfig::Range { .. } => "filters.range",
            StageConfig::Crop { .. } => "filters.crop",
            StageConfig::Outlier { .. } => "filters.outlier",
            StageConfig::Elm { .. } => "filters.elm",
            StageConfig::Smrf { .. } => "filters.smrf",
            StageConfig::Cluster { .. } => "filters.cluster",
            StageConfig::Reprojection { .. } => "filters.reprojection",
            StageConfig::Merge => "filters.merge",
            StageConfig::LasWriter { .. } => "writers.las",
            StageConfig::PgPointcloudWriter { .. } => "writers.pgpointcloud",
            StageConfig::GdalWriter { .. } => "writers.gdal",
        }
    }

    pub fn is_reader(&self) -> bool {
        matches!(
            self,
            StageConfig::LasReader { .. } | StageConfig::PgPointcloudReader { .. }
        )
    }

    pub fn is_writer(&self) -> bool {
        matches!(
            self,
            StageConfig::LasWriter { .. }
                | StageConfig::PgPointcloudWriter { .. }
                | StageConfig::GdalWriter { .. }
        )
    }
}

/// One logical transformation step attached to a layer.
///
/// A stage keeps the user-facing tool name and parameters alongside the
/// backend configs the tool expanded to; one stage may expand to several
/// configs that always travel together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    pub params: BTreeMap<String, ParamValue>,
    pub configs: Vec<StageConfig>,
    pub is_active: bool,
}

impl PipelineStage {
    pub fn new(
        name: impl Into<String>,
        params: BTreeMap<String, ParamValue>,
        configs: Vec<StageConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            configs,
            is_active: true,
        }
    }

    /// `Name (key:value, key:value)` as shown in the stage tree and logs
    pub fn display_text(&self) -> String {
        let summary = self.param_summary();
        if summary.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, summary)
        }
    }

    /// Comma-joined `key:value` list of the stage's parameters
    pub fn param_summary(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_value_coercion() {
        assert_eq!(ParamValue::Int(10).as_int(), Some(10));
        assert_eq!(ParamValue::Float(10.0).as_int(), Some(10));
        assert_eq!(ParamValue::Float(10.5).as_int(), None);
        assert_eq!(ParamValue::Str("42".to_string()).as_int(), Some(42));
        assert_eq!(ParamValue::Bool(true).as_int(), None);

        assert_eq!(ParamValue::Int(3).as_float(), Some(3.0));
        assert_eq!(ParamValue::Str("2.5".to_string()).as_float(), Some(2.5));
        assert_eq!(ParamValue::Str("abc".to_string()).as_float(), None);
    }

    #[test]
    fn test_param_value_untagged_json() {
        let json = r#"{"step": 10, "multiplier": 2.2, "limits": "Z[0:100]", "flag": true}"#;
        let params: BTreeMap<String, ParamValue> = serde_json::from_str(json).unwrap();
        assert_eq!(params["step"], ParamValue::Int(10));
        assert_eq!(params["multiplier"], ParamValue::Float(2.2));
        assert_eq!(params["limits"], ParamValue::Str("Z[0:100]".to_string()));
        assert_eq!(params["flag"], ParamValue::Bool(true));
    }

    #[test]
    fn test_stage_config_serialization() {
        let config = StageConfig::Range {
            limits: "Classification![7:7]".to_string(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "filters.range");
        assert_eq!(json["limits"], "Classification![7:7]");

        let back: StageConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_merge_config_serialization() {
        let json = serde_json::to_value(StageConfig::Merge).unwrap();
        assert_eq!(json, serde_json::json!({"type": "filters.merge"}));
    }

    #[test]
    fn test_pg_reader_where_clause_optional() {
        let json = serde_json::json!({
            "type": "readers.pgpointcloud",
            "connection": "host=localhost dbname=points",
            "schema": "public",
            "table": "lidar",
            "column": "patch"
        });
        let config: StageConfig = serde_json::from_value(json.clone()).unwrap();
        match &config {
            StageConfig::PgPointcloudReader { r#where, .. } => assert!(r#where.is_empty()),
            other => panic!("unexpected config: {:?}", other),
        }
        // empty predicate is skipped on the way back out
        let out = serde_json::to_value(&config).unwrap();
        assert!(out.get("where").is_none());
    }

    #[test]
    fn test_display_text() {
        let mut params = BTreeMap::new();
        params.insert("step".to_string(), ParamValue::Int(10));
        let stage = PipelineStage::new(
            "Decimation",
            params,
            vec![StageConfig::Decimation { step: 10 }],
        );
        assert_eq!(stage.display_text(), "Decimation (step:10)");
        assert!(stage.is_active);

        let bare = PipelineStage::new("Merge", BTreeMap::new(), vec![StageConfig::Merge]);
        assert_eq!(bare.display_text(), "Merge");
    }

    #[test]
    fn test_stage_kind() {
        assert_eq!(
            StageConfig::Decimation { step: 4 }.kind(),
            "filters.decimation"
        );
        assert!(StageConfig::LasReader {
            filename: "a.las".to_string()
        }
        .is_reader());
        assert!(StageConfig::GdalWriter {
            filename: "dtm.asc".to_string(),
            resolution: 1.0,
            output_type: "idw".to_string(),
            radius: 1.414,
            power: Some(2.0),
        }
        .is_writer());
    }
}
