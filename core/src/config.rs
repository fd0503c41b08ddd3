//! Serializable configuration for the localization stack.
//!
//! A [`LocalizationConfig`] describes everything needed to build a filter except the hardware handles
//! themselves: the filter parameters, the field geometry, the odometry noise model and the list of
//! mounted sensors. It can be stored as JSON, YAML or TOML through [`ConfigFile`], whose
//! [`ConfigFile::to_file`] and [`ConfigFile::from_file`] pick the format from the file extension.
//!
//! ```yaml
//! filter:
//!   num_particles: 100
//!   distance_threshold: 0.0254
//!   time_threshold: 0.5
//!   seed: 42
//! field:
//!   bounds: { min_x: -1.8288, min_y: -1.8288, max_x: 1.8288, max_y: 1.8288 }
//!   line_offsets: [0.0]
//! sensors:
//!   - type: distance
//!     offset: { x: 0.1, y: 0.0, heading: 0.0 }
//!   - type: gps
//!   - type: line
//!     offset: [0.0, 0.0]
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::LocalizationError;
use crate::field::FieldGeometry;
use crate::measurements::{DistanceSensorConfig, GpsSensorConfig, LineSensorConfig};
use crate::odometry::{OdometryNoise, OdometryNoiseConfig};
use crate::particle::{FilterConfig, HeadingSource, ParticleFilter};

/// One mounted sensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorConfig {
    Distance(DistanceSensorConfig),
    Gps(GpsSensorConfig),
    Line(LineSensorConfig),
}
impl SensorConfig {
    pub fn name(&self) -> &'static str {
        match self {
            SensorConfig::Distance(_) => "distance",
            SensorConfig::Gps(_) => "gps",
            SensorConfig::Line(_) => "line",
        }
    }
}

/// Complete localization configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizationConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub field: FieldGeometry,
    #[serde(default)]
    pub odometry: OdometryNoiseConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

impl LocalizationConfig {
    /// Validate the field geometry and return it ready to share with sensor models.
    pub fn shared_field(&self) -> Result<Arc<FieldGeometry>, LocalizationError> {
        self.field.validate()?;
        Ok(Arc::new(self.field.clone()))
    }
    /// Build a filter without sensors over the given shared field.
    pub fn build_filter<S: HeadingSource + 'static>(
        &self,
        field: Arc<FieldGeometry>,
        heading_source: S,
    ) -> Result<ParticleFilter, LocalizationError> {
        ParticleFilter::new(self.filter.clone(), field, heading_source)
    }
    pub fn build_odometry_noise(&self) -> Result<OdometryNoise, LocalizationError> {
        OdometryNoise::new(&self.odometry)
    }
    /// The first configured GPS, if any
    pub fn gps(&self) -> Option<&GpsSensorConfig> {
        self.sensors.iter().find_map(|sensor| match sensor {
            SensorConfig::Gps(config) => Some(config),
            _ => None,
        })
    }
}

/// File persistence for configuration types.
///
/// Every method has a default implementation; implementors only opt in.
pub trait ConfigFile: Serialize + DeserializeOwned {
    /// Write the configuration to a JSON file (pretty-printed).
    fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        File::open(path)?.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }
}

impl ConfigFile for LocalizationConfig {}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported_extension(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("unsupported file extension: {}", path.display()),
    )
}
