//! Hardware collaborator contracts.
//!
//! The sensor models never talk to device registers themselves. Each wraps exactly one handle
//! implementing one of the traits below, reads it once per correction cycle and caches the result.
//! Reads are expected to return within the driver's own bounded latency; a failed read is reported as a
//! [`HardwareError`] and the sensor model treats it as "no information" for that cycle.
//!
//! Blanket implementations for `Arc<T>` let a single device be shared, e.g. a GPS used both as a
//! position sensor and as the filter's heading source.

use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("device is not installed")]
    NotInstalled,
    #[error("device read timed out")]
    Timeout,
    #[error("device read failed: {0}")]
    ReadFailed(String),
}

/// Time-of-flight range sensor
pub trait RangeHardware: Send {
    /// Distance to the detected object in millimeters. The driver reports a sentinel value
    /// ([`crate::measurements::NO_OBJECT_MM`]) when nothing is in view.
    fn distance_mm(&self) -> Result<u32, HardwareError>;
    /// Apparent size of the detected object (driver units, larger is a stronger return)
    fn object_size(&self) -> Result<u32, HardwareError>;
    /// Confidence of the reading, 0 to 63
    fn confidence(&self) -> Result<u32, HardwareError>;
}

/// Absolute positioning sensor reporting a field position and yaw in its own frame
pub trait GpsHardware: Send {
    fn is_installed(&self) -> bool;
    /// Reported position in the sensor's frame (m)
    fn position(&self) -> Result<(f64, f64), HardwareError>;
    /// Reported position error metric (m)
    fn error(&self) -> Result<f64, HardwareError>;
    /// Reported yaw (degrees, clockwise positive)
    fn yaw(&self) -> Result<f64, HardwareError>;
}

/// Analog reflectance sensor pointed at the floor
pub trait ReflectanceHardware: Send {
    /// Raw reflectance reading, 0 to 4095
    fn reflectance(&self) -> Result<u32, HardwareError>;
}

impl<T: RangeHardware + Sync + ?Sized> RangeHardware for Arc<T> {
    fn distance_mm(&self) -> Result<u32, HardwareError> {
        (**self).distance_mm()
    }
    fn object_size(&self) -> Result<u32, HardwareError> {
        (**self).object_size()
    }
    fn confidence(&self) -> Result<u32, HardwareError> {
        (**self).confidence()
    }
}

impl<T: GpsHardware + Sync + ?Sized> GpsHardware for Arc<T> {
    fn is_installed(&self) -> bool {
        (**self).is_installed()
    }
    fn position(&self) -> Result<(f64, f64), HardwareError> {
        (**self).position()
    }
    fn error(&self) -> Result<f64, HardwareError> {
        (**self).error()
    }
    fn yaw(&self) -> Result<f64, HardwareError> {
        (**self).yaw()
    }
}

impl<T: ReflectanceHardware + Sync + ?Sized> ReflectanceHardware for Arc<T> {
    fn reflectance(&self) -> Result<u32, HardwareError> {
        (**self).reflectance()
    }
}
