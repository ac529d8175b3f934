use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;


/// Polarization channels of a backscatter product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl FromStr for Polarization {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(SarError::InvalidFormat(format!("Invalid polarization: {}", s))),
        }
    }
}

/// One band of the filtered intensity raster.
///
/// Derived bands are carried in the raster upstream but never take part in
/// the bimodality refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IntensityBand {
    Backscatter(Polarization),
    Ratio,
    Coherence,
    Span,
}

impl IntensityBand {
    pub fn polarization(&self) -> Option<Polarization> {
        match self {
            IntensityBand::Backscatter(pol) => Some(*pol),
            _ => None,
        }
    }

    pub fn is_backscatter(&self) -> bool {
        self.polarization().is_some()
    }
}

impl std::fmt::Display for IntensityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntensityBand::Backscatter(pol) => write!(f, "{}", pol),
            IntensityBand::Ratio => write!(f, "ratio"),
            IntensityBand::Coherence => write!(f, "coherence"),
            IntensityBand::Span => write!(f, "span"),
        }
    }
}

impl FromStr for IntensityBand {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ratio" => Ok(IntensityBand::Ratio),
            "coherence" => Ok(IntensityBand::Coherence),
            "span" => Ok(IntensityBand::Span),
            _ => s.parse::<Polarization>().map(IntensityBand::Backscatter),
        }
    }
}

impl TryFrom<String> for IntensityBand {
    type Error = SarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IntensityBand> for String {
    fn from(band: IntensityBand) -> Self {
        band.to_string()
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
    }
}

/// Grid description shared by every raster of one refinement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMeta {
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
    /// Projection as WKT
    pub projection: String,
}

impl RasterMeta {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            geo_transform: GeoTransform::default(),
            projection: String::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Error types for SAR processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing ancillary file: {}", .0.display())]
    MissingAncillaryFile(PathBuf),

    #[error("Degenerate ancillary data: {0}")]
    DegenerateAncillaryData(String),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
