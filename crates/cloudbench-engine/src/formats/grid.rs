//! Elevation-grid raster writer
//!
//! Rasterizes point elevations onto a regular grid and writes an ESRI
//! ASCII grid (`.asc`). A cell aggregates every point within `radius` of
//! its center; the default radius is `resolution * sqrt(2)` so the search
//! disc covers the cell diagonal. `min` yields a terrain model, `max` a
//! surface model.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};

pub const NODATA: f64 = -9999.0;

/// Per-cell aggregation applied to elevations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridOutput {
    Max,
    Min,
    Mean,
    Idw,
    Count,
    Stdev,
}

impl GridOutput {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridOutput::Max => "max",
            GridOutput::Min => "min",
            GridOutput::Mean => "mean",
            GridOutput::Idw => "idw",
            GridOutput::Count => "count",
            GridOutput::Stdev => "stdev",
        }
    }
}

impl FromStr for GridOutput {
    type Err = CloudbenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(GridOutput::Max),
            "min" => Ok(GridOutput::Min),
            "mean" => Ok(GridOutput::Mean),
            "idw" => Ok(GridOutput::Idw),
            "count" => Ok(GridOutput::Count),
            "stdev" => Ok(GridOutput::Stdev),
            other => Err(CloudbenchError::InvalidStageConfig {
                reason: format!("unknown grid output type '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElevationGridWriter {
    resolution: f64,
    output: GridOutput,
    radius: f64,
    power: f64,
}

impl ElevationGridWriter {
    /// `radius` defaults to `resolution * sqrt(2)`; IDW uses `power` 2.
    pub fn new(resolution: f64, output: GridOutput) -> Self {
        Self {
            resolution,
            output,
            radius: resolution * std::f64::consts::SQRT_2,
            power: 2.0,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Rasterize `points` and write the grid to `path`.
    /// Returns the path written and the number of points aggregated.
    pub fn write(&self, path: &Path, points: &PointBuffers) -> Result<(PathBuf, u64)> {
        if self.resolution <= 0.0 {
            return Err(invalid(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if self.radius <= 0.0 {
            return Err(invalid(format!("radius must be positive, got {}", self.radius)));
        }
        let Some(bounds) = points.bounds() else {
            return Err(CloudbenchError::EmptyResult);
        };

        let ncols = cells_across(bounds.minx, bounds.maxx, self.resolution);
        let nrows = cells_across(bounds.miny, bounds.maxy, self.resolution);
        if ncols.saturating_mul(nrows) > 100_000_000 {
            return Err(invalid(format!(
                "resolution {} produces a {}x{} grid over this extent",
                self.resolution, ncols, nrows
            )));
        }

        let mut cells = vec![CellAccumulator::new(); ncols * nrows];
        let reach = (self.radius / self.resolution).ceil() as i64;

        for i in 0..points.len() {
            let (px, py, pz) = (points.x[i], points.y[i], points.z[i]);
            let col = ((px - bounds.minx) / self.resolution).floor() as i64;
            let row = ((py - bounds.miny) / self.resolution).floor() as i64;
            for dc in -reach..=reach {
                for dr in -reach..=reach {
                    let (c, r) = (col + dc, row + dr);
                    if c < 0 || r < 0 || c >= ncols as i64 || r >= nrows as i64 {
                        continue;
                    }
                    let center_x = bounds.minx + (c as f64 + 0.5) * self.resolution;
                    let center_y = bounds.miny + (r as f64 + 0.5) * self.resolution;
                    let dx = px - center_x;
                    let dy = py - center_y;
                    let distance = (dx * dx + dy * dy).sqrt();
                    if distance <= self.radius {
                        cells[r as usize * ncols + c as usize].add(pz, distance, self.power);
                    }
                }
            }
        }

        let mut body = String::new();
        let _ = writeln!(body, "ncols {}", ncols);
        let _ = writeln!(body, "nrows {}", nrows);
        let _ = writeln!(body, "xllcorner {}", bounds.minx);
        let _ = writeln!(body, "yllcorner {}", bounds.miny);
        let _ = writeln!(body, "cellsize {}", self.resolution);
        let _ = writeln!(body, "NODATA_value {}", NODATA);
        // ASCII grids run north to south
        for row in (0..nrows).rev() {
            let line: Vec<String> = (0..ncols)
                .map(|col| format_value(cells[row * ncols + col].value(self.output)))
                .collect();
            let _ = writeln!(body, "{}", line.join(" "));
        }

        let path = ensure_asc_suffix(path);
        fs::write(&path, body).map_err(|e| CloudbenchError::WriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            path = %path.display(),
            output = self.output.as_str(),
            ncols,
            nrows,
            "wrote elevation grid"
        );
        Ok((path, points.len() as u64))
    }
}

fn cells_across(min: f64, max: f64, resolution: f64) -> usize {
    (((max - min) / resolution).ceil() as usize).max(1)
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => format!("{}", NODATA),
    }
}

fn ensure_asc_suffix(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        return path.to_path_buf();
    }
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".asc");
    path.with_file_name(name)
}

fn invalid(reason: String) -> CloudbenchError {
    CloudbenchError::InvalidStageConfig { reason }
}

#[derive(Debug, Clone, Copy)]
struct CellAccumulator {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
    weight: f64,
    weighted: f64,
    exact: Option<f64>,
}

impl CellAccumulator {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            weight: 0.0,
            weighted: 0.0,
            exact: None,
        }
    }

    fn add(&mut self, z: f64, distance: f64, power: f64) {
        self.count += 1;
        self.sum += z;
        self.sum_sq += z * z;
        self.min = self.min.min(z);
        self.max = self.max.max(z);
        if distance == 0.0 {
            self.exact = Some(z);
        } else {
            let weight = 1.0 / distance.powf(power);
            self.weight += weight;
            self.weighted += weight * z;
        }
    }

    fn value(&self, output: GridOutput) -> Option<f64> {
        if self.count == 0 {
            return if output == GridOutput::Count {
                Some(0.0)
            } else {
                None
            };
        }
        let n = self.count as f64;
        match output {
            GridOutput::Max => Some(self.max),
            GridOutput::Min => Some(self.min),
            GridOutput::Mean => Some(self.sum / n),
            GridOutput::Count => Some(n),
            GridOutput::Stdev => {
                let mean = self.sum / n;
                Some((self.sum_sq / n - mean * mean).max(0.0).sqrt())
            }
            GridOutput::Idw => match self.exact {
                Some(z) => Some(z),
                None if self.weight > 0.0 => Some(self.weighted / self.weight),
                None => None,
            },
        }
    }
}
