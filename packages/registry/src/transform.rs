//! Projected → WGS84 coordinate transforms.
//!
//! Provider listings carry projected coordinates. The registry never does
//! projection math itself; it asks a [`CoordinateTransform`] and validates
//! every result against a [`BoundingBox`].

use std::io::Write as _;
use std::process::{Command, Stdio};

use drought_risk_station_models::GeoPoint;
use serde::Deserialize;

/// Errors from running a coordinate transform.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The external program could not be started or talked to.
    #[error("Failed to run {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },

    /// The external program exited unsuccessfully.
    #[error("{program} failed: {stderr}")]
    Failed { program: String, stderr: String },

    /// The external program did not answer every input point.
    #[error("{program} returned {got} points for {expected} inputs")]
    CountMismatch {
        program: String,
        expected: usize,
        got: usize,
    },
}

/// Converts projected `(x, y)` points to WGS84.
pub trait CoordinateTransform: Send + Sync {
    /// Short identifier stored on every location this transform produces.
    fn id(&self) -> &str;

    /// Monotonic version; a location is only replaced by an equal or
    /// newer version.
    fn version(&self) -> u32;

    /// Transforms a batch. The output is aligned with the input; points
    /// the transform cannot handle are `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transform as a whole fails.
    fn transform(&self, points: &[(f64, f64)]) -> Result<Vec<Option<GeoPoint>>, TransformError>;
}

/// Accepted area for transformed locations (exclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_latitude: 46.4,
            max_latitude: 49.0,
            min_longitude: 9.5,
            max_longitude: 17.2,
        }
    }
}

impl BoundingBox {
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.latitude > self.min_latitude
            && point.latitude < self.max_latitude
            && point.longitude > self.min_longitude
            && point.longitude < self.max_longitude
    }
}

/// Affine approximation of the provider grid around a reference origin.
///
/// Accurate to a few kilometres; superseded by [`ExternalCommand`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinearApproximation {
    pub version: u32,
    pub origin_x: f64,
    pub origin_y: f64,
    pub origin_latitude: f64,
    pub origin_longitude: f64,
    pub metres_per_degree_latitude: f64,
    pub metres_per_degree_longitude: f64,
}

impl Default for LinearApproximation {
    fn default() -> Self {
        Self {
            version: 1,
            origin_x: 100_000.0,
            origin_y: 150_000.0,
            origin_latitude: 46.0,
            origin_longitude: 9.0,
            metres_per_degree_latitude: 111_000.0,
            metres_per_degree_longitude: 75_000.0,
        }
    }
}

impl CoordinateTransform for LinearApproximation {
    fn id(&self) -> &str {
        "linear"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn transform(&self, points: &[(f64, f64)]) -> Result<Vec<Option<GeoPoint>>, TransformError> {
        Ok(points
            .iter()
            .map(|&(x, y)| {
                Some(GeoPoint::new(
                    self.origin_latitude + (y - self.origin_y) / self.metres_per_degree_latitude,
                    self.origin_longitude + (x - self.origin_x) / self.metres_per_degree_longitude,
                ))
            })
            .collect())
    }
}

/// Pipes points through a PROJ `cs2cs`-compatible program.
///
/// One `a b` line is written per point and one `c d ...` line is read
/// back; a `*` in the output marks a point the program could not
/// transform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExternalCommand {
    pub version: u32,
    pub program: String,
    pub source_crs: String,
    pub target_crs: String,
    /// Write points as `y x` (the source CRS lists northing first).
    pub input_northing_first: bool,
    /// Read results as `lat lon` (the target CRS lists latitude first).
    pub output_latitude_first: bool,
}

impl Default for ExternalCommand {
    fn default() -> Self {
        Self {
            version: 2,
            program: "cs2cs".to_string(),
            source_crs: "EPSG:31287".to_string(),
            target_crs: "EPSG:4326".to_string(),
            input_northing_first: true,
            output_latitude_first: true,
        }
    }
}

impl ExternalCommand {
    fn parse_output(&self, stdout: &str) -> Vec<Option<GeoPoint>> {
        stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let mut fields = line.split_whitespace();
                let a = fields.next()?.parse::<f64>().ok()?;
                let b = fields.next()?.parse::<f64>().ok()?;
                let point = if self.output_latitude_first {
                    GeoPoint::new(a, b)
                } else {
                    GeoPoint::new(b, a)
                };
                (point.latitude.is_finite() && point.longitude.is_finite()).then_some(point)
            })
            .collect()
    }
}

impl CoordinateTransform for ExternalCommand {
    fn id(&self) -> &str {
        "cs2cs"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn transform(&self, points: &[(f64, f64)]) -> Result<Vec<Option<GeoPoint>>, TransformError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let io_err = |source| TransformError::Io {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(["-f", "%.6f", self.source_crs.as_str(), self.target_crs.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(io_err)?;

        let input: String = points
            .iter()
            .map(|&(x, y)| {
                if self.input_northing_first {
                    format!("{y} {x}\n")
                } else {
                    format!("{x} {y}\n")
                }
            })
            .collect();

        // Feed stdin from a separate thread so a full stdout pipe cannot
        // stall the writer.
        let mut stdin = child.stdin.take().ok_or_else(|| {
            io_err(std::io::Error::other("stdin was not captured"))
        })?;
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output().map_err(io_err)?;
        writer
            .join()
            .map_err(|_| io_err(std::io::Error::other("stdin writer panicked")))?
            .map_err(io_err)?;

        if !output.status.success() {
            return Err(TransformError::Failed {
                program: self.program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let results = self.parse_output(&String::from_utf8_lossy(&output.stdout));
        if results.len() != points.len() {
            return Err(TransformError::CountMismatch {
                program: self.program.clone(),
                expected: points.len(),
                got: results.len(),
            });
        }

        log::debug!("{} transformed {} points", self.program, points.len());
        Ok(results)
    }
}

/// Transform selection, tagged by `type` in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    Linear(LinearApproximation),
    ExternalCommand(ExternalCommand),
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self::Linear(LinearApproximation::default())
    }
}

impl TransformConfig {
    #[must_use]
    pub fn build(&self) -> Box<dyn CoordinateTransform> {
        match self {
            Self::Linear(t) => Box::new(t.clone()),
            Self::ExternalCommand(t) => Box::new(t.clone()),
        }
    }
}
