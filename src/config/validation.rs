//! Configuration validation.

use crate::axis::AxisId;
use crate::error::{ConfigError, Error, Result};

use super::{AxisConfig, MachineConfig};

/// Validate a machine configuration.
///
/// Checks:
/// - Z and X axes are present
/// - Axis geometry and speeds are positive and consistent
/// - Encoder and interpolation parameters are usable
pub fn validate_config(config: &MachineConfig) -> Result<()> {
    if config.encoder.steps_per_revolution == 0 {
        return Err(Error::Config(ConfigError::InvalidEncoderSteps(
            config.encoder.steps_per_revolution,
        )));
    }

    if config.command.interpolation_precision <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidInterpolationPrecision(
            config.command.interpolation_precision,
        )));
    }

    for id in [AxisId::Z, AxisId::X] {
        if config.axis(id).is_none() {
            return Err(Error::Config(ConfigError::MissingAxis(id)));
        }
    }

    for id in AxisId::ALL {
        if let Some(axis) = config.axis(id) {
            validate_axis(id, axis)?;
        }
    }

    Ok(())
}

fn validate_axis(id: AxisId, axis: &AxisConfig) -> Result<()> {
    if axis.motor_steps == 0 {
        return Err(Error::Config(ConfigError::InvalidMotorSteps {
            axis: id,
            value: axis.motor_steps,
        }));
    }

    if axis.screw_pitch.0 <= 0 {
        return Err(Error::Config(ConfigError::InvalidScrewPitch {
            axis: id,
            value: axis.screw_pitch.0,
        }));
    }

    if axis.speed_start <= 0.0 || axis.speed_start > axis.speed_manual_move {
        return Err(Error::Config(ConfigError::InvalidSpeeds {
            axis: id,
            start: axis.speed_start,
            manual: axis.speed_manual_move,
        }));
    }

    if axis.acceleration <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidAcceleration {
            axis: id,
            value: axis.acceleration,
        }));
    }

    if axis.max_travel_mm <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidTravel {
            axis: id,
            value: axis.max_travel_mm,
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::units::DeciMicrons;

    #[test]
    fn test_stock_config_is_valid() {
        assert!(validate_config(&MachineConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_pitch() {
        let mut config = MachineConfig::default();
        if let Some(z) = config.axis_mut(AxisId::Z) {
            z.screw_pitch = DeciMicrons(0);
        }
        assert!(matches!(
            validate_config(&config),
            Err(Error::Config(ConfigError::InvalidScrewPitch { axis: AxisId::Z, .. }))
        ));
    }

    #[test]
    fn test_rejects_start_above_manual() {
        let mut config = MachineConfig::default();
        if let Some(x) = config.axis_mut(AxisId::X) {
            x.speed_start = x.speed_manual_move + 1.0;
        }
        assert!(matches!(
            validate_config(&config),
            Err(Error::Config(ConfigError::InvalidSpeeds { axis: AxisId::X, .. }))
        ));
    }

    #[test]
    fn test_rejects_missing_cross_axis() {
        let mut config = MachineConfig::default();
        let mut axes = heapless::FnvIndexMap::new();
        let _ = axes.insert(
            heapless::String::try_from("z").unwrap(),
            AxisConfig::stock_z(),
        );
        config.axes = axes;
        assert_eq!(
            validate_config(&config),
            Err(Error::Config(ConfigError::MissingAxis(AxisId::X)))
        );
    }

    #[test]
    fn test_rejects_zero_encoder() {
        let mut config = MachineConfig::default();
        config.encoder.steps_per_revolution = 0;
        assert!(validate_config(&config).is_err());
    }
}
