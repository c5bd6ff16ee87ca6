//! # Axis Filter and Stepper Configuration
//!
//! This module defines the TOML configuration for per-axis resonance
//! compensation and per-stepper kinematics, and turns it into position engines.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [axis.x]
//! type = "shaper"
//! shaper = "mzv"
//! frequency = 42.0
//! damping = 0.1
//!
//! [axis.y]
//! type = "smoother"
//! smoother = "quartic"
//! smooth_time = 0.02
//!
//! [steppers.stepper_a]
//! type = "corexy"
//! sign = "plus"
//!
//! [steppers.extruder]
//! type = "extruder"
//! pressure_advance_smooth_time = 0.04
//! ```
//!
//! - Each axis (x, y, z) takes at most one filter: a shaper or a smoother.
//! - Axis filters apply to every non-extruder stepper.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::motion::engine::{AxisFilter, EngineError, PositionEngine};
use crate::motion::kinematics::{
    CartesianStepper, CoreXYSign, CoreXYStepper, DeltaStepper, ExtruderStepper, GeometryError,
    PolarAxis, PolarStepper, StepperKinematics, WinchStepper,
};
use crate::motion::shaper::{init_shaper, ShaperError, ShaperType, DEFAULT_DAMPING_RATIO};
use crate::motion::smoother::{init_smoother, SmootherError, SmootherType};
use crate::motion::trapq::{Axis, Coord};

/// Shaper frequencies above this are accepted but almost certainly a typo.
const SUSPICIOUS_SHAPER_FREQ: f64 = 500.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Smoother error: {0}")]
    Smoother(#[from] SmootherError),
    #[error("Shaper error: {0}")]
    Shaper(#[from] ShaperError),
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Main configuration: axis filters plus the named steppers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub axis: AxisConfig,
    #[serde(default)]
    pub steppers: HashMap<String, StepperConfig>,
}

/// Per-axis filter sections (`[axis.x]`, `[axis.y]`, `[axis.z]`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AxisConfig {
    #[serde(default)]
    pub x: Option<AxisFilterConfig>,
    #[serde(default)]
    pub y: Option<AxisFilterConfig>,
    #[serde(default)]
    pub z: Option<AxisFilterConfig>,
}

impl AxisConfig {
    pub fn get(&self, axis: Axis) -> Option<&AxisFilterConfig> {
        match axis {
            Axis::X => self.x.as_ref(),
            Axis::Y => self.y.as_ref(),
            Axis::Z => self.z.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AxisFilterConfig {
    None,
    Shaper {
        shaper: ShaperType,
        frequency: f64,
        #[serde(default = "default_damping")]
        damping: f64,
    },
    Smoother {
        smoother: SmootherType,
        smooth_time: f64,
    },
    CustomShaper {
        a: Vec<f64>,
        t: Vec<f64>,
    },
    CustomSmoother {
        coeffs: Vec<f64>,
        smooth_time: f64,
    },
}

impl AxisFilterConfig {
    pub fn build(&self) -> Result<AxisFilter, ConfigError> {
        Ok(match self {
            AxisFilterConfig::None => AxisFilter::None,
            AxisFilterConfig::Shaper { shaper, frequency, damping } => {
                if *frequency > SUSPICIOUS_SHAPER_FREQ {
                    tracing::warn!("Shaper frequency {:.1}Hz is unusually high", frequency);
                }
                AxisFilter::Shape(shaper.build(*frequency, *damping)?)
            }
            AxisFilterConfig::Smoother { smoother, smooth_time } => {
                AxisFilter::Smooth(smoother.build(*smooth_time)?)
            }
            AxisFilterConfig::CustomShaper { a, t } => AxisFilter::Shape(init_shaper(a, t)?),
            AxisFilterConfig::CustomSmoother { coeffs, smooth_time } => {
                AxisFilter::Smooth(init_smoother(coeffs, *smooth_time)?)
            }
        })
    }
}

/// Stepper kinematics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepperConfig {
    Cartesian {
        axis: Axis,
    },
    #[serde(rename = "corexy")]
    CoreXY {
        sign: CoreXYSign,
    },
    Delta {
        arm_length: f64,
        tower_x: f64,
        tower_y: f64,
    },
    Polar {
        axis: PolarAxis,
    },
    Winch {
        anchor: [f64; 3],
    },
    Extruder {
        #[serde(default)]
        pressure_advance_smooth_time: f64,
    },
}

impl StepperConfig {
    pub fn build(&self) -> Result<StepperKinematics, ConfigError> {
        Ok(match self {
            StepperConfig::Cartesian { axis } => StepperKinematics::Cartesian(CartesianStepper::new(*axis)),
            StepperConfig::CoreXY { sign } => StepperKinematics::CoreXY(CoreXYStepper::new(*sign)),
            StepperConfig::Delta { arm_length, tower_x, tower_y } => {
                StepperKinematics::Delta(DeltaStepper::new(*arm_length, *tower_x, *tower_y)?)
            }
            StepperConfig::Polar { axis } => StepperKinematics::Polar(PolarStepper::new(*axis)),
            StepperConfig::Winch { anchor } => {
                StepperKinematics::Winch(WinchStepper::new(Coord::new(anchor[0], anchor[1], anchor[2]))?)
            }
            StepperConfig::Extruder { pressure_advance_smooth_time } => {
                StepperKinematics::Extruder(ExtruderStepper::new(*pressure_advance_smooth_time)?)
            }
        })
    }
}

impl Config {
    /// Check that every filter and stepper can be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steppers.keys().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid("stepper names must not be empty".to_string()));
        }
        self.build_engines().map(|_| ())
    }

    /// One position engine per configured stepper, keyed by stepper name.
    /// Axis filters are installed on every stepper except extruders.
    pub fn build_engines(&self) -> Result<HashMap<String, PositionEngine>, ConfigError> {
        let mut filters = Vec::new();
        for axis in Axis::ALL {
            if let Some(cfg) = self.axis.get(axis) {
                filters.push((axis, cfg.build()?));
            }
        }
        let mut engines = HashMap::with_capacity(self.steppers.len());
        for (name, stepper) in &self.steppers {
            let kinematics = match stepper.build() {
                Ok(k) => k,
                Err(e) => {
                    tracing::error!("Stepper '{}': {}", name, e);
                    return Err(e);
                }
            };
            let mut engine = PositionEngine::new(kinematics);
            if !matches!(stepper, StepperConfig::Extruder { .. }) {
                for (axis, filter) in &filters {
                    engine.set_filter(*axis, filter.clone())?;
                }
            }
            engines.insert(name.clone(), engine);
        }
        Ok(engines)
    }
}

fn default_damping() -> f64 { DEFAULT_DAMPING_RATIO }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config '{}' with {} steppers", path, config.steppers.len());
                Ok(config)
            }
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const EXAMPLE: &str = r#"
        [axis.x]
        type = "shaper"
        shaper = "mzv"
        frequency = 42.0

        [axis.y]
        type = "smoother"
        smoother = "quartic"
        smooth_time = 0.02

        [steppers.stepper_a]
        type = "corexy"
        sign = "plus"

        [steppers.tower_a]
        type = "delta"
        arm_length = 250.0
        tower_x = 0.0
        tower_y = 130.0

        [steppers.extruder]
        type = "extruder"
        pressure_advance_smooth_time = 0.04
    "#;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert!(config.steppers.is_empty());
        assert!(config.axis.x.is_none());
        assert!(config.build_engines().unwrap().is_empty());
    }

    #[test]
    fn test_axis_and_stepper_parsing() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(
            config.axis.x,
            Some(AxisFilterConfig::Shaper { shaper: ShaperType::Mzv, frequency: 42.0, damping: 0.1 })
        );
        assert_eq!(config.steppers["stepper_a"], StepperConfig::CoreXY { sign: CoreXYSign::Plus });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_engines_skips_filters_on_extruder() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        let engines = config.build_engines().unwrap();
        assert_eq!(engines.len(), 3);
        assert!(engines["extruder"].filter(Axis::X).is_none());
        assert!(matches!(engines["stepper_a"].filter(Axis::X), AxisFilter::Shape(_)));
        assert!(matches!(engines["tower_a"].filter(Axis::Y), AxisFilter::Smooth(_)));
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let toml = r#"
        [steppers.tower_a]
        type = "delta"
        arm_length = -1.0
        tower_x = 0.0
        tower_y = 0.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Geometry(_))));
    }

    #[test]
    fn test_invalid_damping_rejected() {
        let toml = r#"
        [axis.x]
        type = "shaper"
        shaper = "zv"
        frequency = 40.0
        damping = 1.5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Shaper(_))));
    }

    #[test]
    fn test_custom_filters() {
        let toml = r#"
        [axis.x]
        type = "custom_shaper"
        a = [1.0, 1.0]
        t = [0.0, 0.01]

        [axis.z]
        type = "custom_smoother"
        coeffs = [1.0, 0.0, -4.0]
        smooth_time = 0.03

        [steppers.winch_a]
        type = "winch"
        anchor = [0.0, 0.0, 300.0]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let engines = config.build_engines().unwrap();
        assert!(matches!(engines["winch_a"].filter(Axis::X), AxisFilter::Shape(_)));
        assert!(matches!(engines["winch_a"].filter(Axis::Z), AxisFilter::Smooth(_)));
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[steppers.stepper_x]\ntype = 'cartesian'\naxis = 'x'").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.steppers["stepper_x"], StepperConfig::Cartesian { axis: Axis::X });
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }
}
