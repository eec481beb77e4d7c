//! Tool registry: the static catalog of pipeline tools.
//!
//! Each tool maps a user-facing name and parameter set to one or more
//! backend stage configs. Parameter validation happens here, at build
//! time, so a bad value never reaches a worker: a tool either yields a
//! complete stage or an error naming the offending parameter.

use std::collections::BTreeMap;

use crate::error::{CloudbenchError, Result};
use crate::models::{ParamValue, PipelineStage, StageConfig};

type Params = BTreeMap<String, ParamValue>;

/// A registry entry: how a tool names itself, its defaults, and how it
/// expands user parameters into backend stage configs.
pub struct ToolDescriptor {
    pub name: &'static str,
    /// Menu group the host shows the tool under
    pub group: &'static str,
    /// Single-shot tools (crop and friends) are excluded from batch
    /// composition and presets.
    pub batchable: bool,
    defaults: fn() -> Params,
    builder: fn(&Params) -> Result<Vec<StageConfig>>,
}

impl ToolDescriptor {
    /// Fresh copy of the default parameters; callers may mutate freely
    pub fn default_params(&self) -> Params {
        (self.defaults)()
    }

    /// Expand `params` into this tool's backend configs
    pub fn build(&self, params: &Params) -> Result<Vec<StageConfig>> {
        (self.builder)(params)
    }
}

/// The tool catalog, keyed by tool name
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry preloaded with the built-in tool table
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for tool in builtin_tools() {
            registry
                .register(tool)
                .expect("builtin tool names are unique");
        }
        registry
    }

    /// Add a tool, failing loudly on a name collision
    pub fn register(&mut self, tool: ToolDescriptor) -> Result<()> {
        if self.tools.contains_key(tool.name) {
            return Err(CloudbenchError::ToolAlreadyRegistered {
                name: tool.name.to_string(),
            });
        }
        self.tools.insert(tool.name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ToolDescriptor> {
        self.tools
            .get(name)
            .ok_or_else(|| CloudbenchError::ToolNotFound {
                name: name.to_string(),
            })
    }

    /// Default parameters for a tool, ready for the host to edit
    pub fn default_params(&self, name: &str) -> Result<Params> {
        Ok(self.get(name)?.default_params())
    }

    /// All tool names, sorted
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Validate `params` against the named tool and produce a ready stage
    pub fn build_stage(&self, name: &str, params: &Params) -> Result<PipelineStage> {
        let tool = self.get(name)?;
        let configs = tool.build(params)?;
        Ok(PipelineStage::new(tool.name, params.clone(), configs))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "Decimation",
            group: "Reduce",
            batchable: true,
            defaults: || params([("step", ParamValue::Int(10))]),
            builder: build_decimation,
        },
        ToolDescriptor {
            name: "Range Filter",
            group: "Filter",
            batchable: true,
            defaults: || params([("limits", ParamValue::from("Z[0:100]"))]),
            builder: build_range,
        },
        ToolDescriptor {
            name: "Crop",
            group: "Filter",
            batchable: false,
            defaults: || params([("bounds", ParamValue::from("([0,100],[0,100])"))]),
            builder: build_crop,
        },
        ToolDescriptor {
            name: "Outlier Filter",
            group: "Clean",
            batchable: true,
            defaults: || {
                params([
                    ("mean_k", ParamValue::Int(8)),
                    ("multiplier", ParamValue::Float(3.0)),
                ])
            },
            builder: build_outlier,
        },
        ToolDescriptor {
            name: "Outlier Removal",
            group: "Clean",
            batchable: true,
            defaults: || {
                params([
                    ("mean_k", ParamValue::Int(8)),
                    ("multiplier", ParamValue::Float(3.0)),
                ])
            },
            builder: build_outlier_removal,
        },
        ToolDescriptor {
            name: "ELM",
            group: "Clean",
            batchable: true,
            defaults: || {
                params([
                    ("cell", ParamValue::Float(20.0)),
                    ("threshold", ParamValue::Float(1.0)),
                ])
            },
            builder: build_elm,
        },
        ToolDescriptor {
            name: "Ground Classification",
            group: "Classify",
            batchable: true,
            defaults: || {
                params([
                    ("cell", ParamValue::Float(1.0)),
                    ("slope", ParamValue::Float(0.15)),
                    ("window", ParamValue::Float(18.0)),
                    ("threshold", ParamValue::Float(0.5)),
                ])
            },
            builder: build_ground,
        },
        ToolDescriptor {
            name: "Cluster",
            group: "Classify",
            batchable: true,
            defaults: || {
                params([
                    ("min_points", ParamValue::Int(10)),
                    ("tolerance", ParamValue::Float(1.0)),
                ])
            },
            builder: build_cluster,
        },
        ToolDescriptor {
            name: "Reprojection",
            group: "Transform",
            batchable: true,
            defaults: || params([("out_srs", ParamValue::from("EPSG:3857"))]),
            builder: build_reprojection,
        },
    ]
}

fn params<const N: usize>(entries: [(&str, ParamValue); N]) -> Params {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

// Parameter coercion helpers. Every failure names the tool and the key so
// the host can point at the offending field.

fn require_int(tool: &str, params: &Params, key: &str) -> Result<i64> {
    let value = params
        .get(key)
        .ok_or_else(|| CloudbenchError::MissingParameter {
            tool: tool.to_string(),
            key: key.to_string(),
        })?;
    value
        .as_int()
        .ok_or_else(|| CloudbenchError::InvalidParameter {
            tool: tool.to_string(),
            key: key.to_string(),
            reason: format!("expected an integer, got '{}'", value),
        })
}

fn require_float(tool: &str, params: &Params, key: &str) -> Result<f64> {
    let value = params
        .get(key)
        .ok_or_else(|| CloudbenchError::MissingParameter {
            tool: tool.to_string(),
            key: key.to_string(),
        })?;
    value
        .as_float()
        .ok_or_else(|| CloudbenchError::InvalidParameter {
            tool: tool.to_string(),
            key: key.to_string(),
            reason: format!("expected a number, got '{}'", value),
        })
}

fn require_str(tool: &str, params: &Params, key: &str) -> Result<String> {
    let value = params
        .get(key)
        .ok_or_else(|| CloudbenchError::MissingParameter {
            tool: tool.to_string(),
            key: key.to_string(),
        })?;
    let text = value.to_string();
    if text.trim().is_empty() {
        return Err(CloudbenchError::InvalidParameter {
            tool: tool.to_string(),
            key: key.to_string(),
            reason: "value must not be empty".to_string(),
        });
    }
    Ok(text)
}

fn check_at_least(tool: &str, key: &str, value: i64, minimum: i64) -> Result<()> {
    if value < minimum {
        return Err(CloudbenchError::InvalidParameter {
            tool: tool.to_string(),
            key: key.to_string(),
            reason: format!("must be at least {}", minimum),
        });
    }
    Ok(())
}

fn check_positive(tool: &str, key: &str, value: f64) -> Result<()> {
    if !(value > 0.0) {
        return Err(CloudbenchError::InvalidParameter {
            tool: tool.to_string(),
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

// Stage builders

fn build_decimation(params: &Params) -> Result<Vec<StageConfig>> {
    let step = require_int("Decimation", params, "step")?;
    check_at_least("Decimation", "step", step, 1)?;
    Ok(vec![StageConfig::Decimation { step: step as u64 }])
}

fn build_range(params: &Params) -> Result<Vec<StageConfig>> {
    let limits = require_str("Range Filter", params, "limits")?;
    Ok(vec![StageConfig::Range { limits }])
}

fn build_crop(params: &Params) -> Result<Vec<StageConfig>> {
    let bounds = require_str("Crop", params, "bounds")?;
    Ok(vec![StageConfig::Crop { bounds }])
}

fn outlier_config(tool: &str, params: &Params) -> Result<StageConfig> {
    let mean_k = require_int(tool, params, "mean_k")?;
    check_at_least(tool, "mean_k", mean_k, 1)?;
    let multiplier = require_float(tool, params, "multiplier")?;
    check_positive(tool, "multiplier", multiplier)?;
    Ok(StageConfig::Outlier {
        method: "statistical".to_string(),
        mean_k: mean_k as usize,
        multiplier,
    })
}

fn build_outlier(params: &Params) -> Result<Vec<StageConfig>> {
    Ok(vec![outlier_config("Outlier Filter", params)?])
}

/// Outlier Removal flags noise and then drops it in one stage: the
/// statistical pass marks class 7, the trailing range excludes it.
fn build_outlier_removal(params: &Params) -> Result<Vec<StageConfig>> {
    Ok(vec![
        outlier_config("Outlier Removal", params)?,
        StageConfig::Range {
            limits: "Classification![7:7]".to_string(),
        },
    ])
}

fn build_elm(params: &Params) -> Result<Vec<StageConfig>> {
    let cell = require_float("ELM", params, "cell")?;
    check_positive("ELM", "cell", cell)?;
    let threshold = require_float("ELM", params, "threshold")?;
    check_positive("ELM", "threshold", threshold)?;
    Ok(vec![StageConfig::Elm {
        cell,
        class: 7,
        threshold,
    }])
}

fn build_ground(params: &Params) -> Result<Vec<StageConfig>> {
    let tool = "Ground Classification";
    let cell = require_float(tool, params, "cell")?;
    check_positive(tool, "cell", cell)?;
    let slope = require_float(tool, params, "slope")?;
    let window = require_float(tool, params, "window")?;
    check_positive(tool, "window", window)?;
    let threshold = require_float(tool, params, "threshold")?;
    check_positive(tool, "threshold", threshold)?;
    Ok(vec![StageConfig::Smrf {
        cell,
        slope,
        window,
        threshold,
        // already-flagged noise must not seed the ground surface
        ignore: Some("Classification[7:7]".to_string()),
    }])
}

fn build_cluster(params: &Params) -> Result<Vec<StageConfig>> {
    let min_points = require_int("Cluster", params, "min_points")?;
    check_at_least("Cluster", "min_points", min_points, 1)?;
    let tolerance = require_float("Cluster", params, "tolerance")?;
    check_positive("Cluster", "tolerance", tolerance)?;
    Ok(vec![StageConfig::Cluster {
        min_points: min_points as usize,
        tolerance,
    }])
}

fn build_reprojection(params: &Params) -> Result<Vec<StageConfig>> {
    let out_srs = require_str("Reprojection", params, "out_srs")?;
    let in_srs = match params.get("in_srs") {
        Some(_) => Some(require_str("Reprojection", params, "in_srs")?),
        None => None,
    };
    Ok(vec![StageConfig::Reprojection { in_srs, out_srs }])
}
