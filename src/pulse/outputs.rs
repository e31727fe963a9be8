//! Physical step, direction and enable lines.
//!
//! Generic over embedded-hal 1.0 pin types.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::axis::AxisId;
use crate::config::{AxisConfig, TimingConfig};
use crate::error::{AxisError, Error, Result};

/// Step/direction/enable outputs of one axis driver.
pub trait StepOutputs {
    /// Drive the direction line and hold it for the settle time.
    fn set_direction(&mut self, forward: bool) -> Result<()>;

    /// Emit one step pulse.
    fn step(&mut self) -> Result<()>;

    /// Drive the enable line.
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
}

impl<T: StepOutputs + ?Sized> StepOutputs for Box<T> {
    fn set_direction(&mut self, forward: bool) -> Result<()> {
        (**self).set_direction(forward)
    }

    fn step(&mut self) -> Result<()> {
        (**self).step()
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        (**self).set_enabled(enabled)
    }
}

/// Outputs for an axis with no driver wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconnected;

impl StepOutputs for Unconnected {
    fn set_direction(&mut self, _forward: bool) -> Result<()> {
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_enabled(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }
}

/// Stepper driver wired to three GPIO lines.
///
/// Generic over:
/// - `STEP`: STEP pin type (must implement `OutputPin`)
/// - `DIR`: DIR pin type (must implement `OutputPin`)
/// - `ENA`: ENABLE pin type (must implement `OutputPin`)
/// - `DELAY`: Delay provider (must implement `DelayNs`)
pub struct StepperPins<STEP, DIR, ENA, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    ENA: OutputPin,
    DELAY: DelayNs,
{
    axis: AxisId,
    step_pin: STEP,
    dir_pin: DIR,
    enable_pin: ENA,
    delay: DELAY,
    invert_direction: bool,
    invert_enable: bool,
    direction_setup_us: u32,
    step_pulse_us: u32,
}

impl<STEP, DIR, ENA, DELAY> StepperPins<STEP, DIR, ENA, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    ENA: OutputPin,
    DELAY: DelayNs,
{
    /// Wire a driver using the axis polarity and the machine timing.
    pub fn new(
        axis: AxisId,
        config: &AxisConfig,
        timing: &TimingConfig,
        step_pin: STEP,
        dir_pin: DIR,
        enable_pin: ENA,
        delay: DELAY,
    ) -> Self {
        Self {
            axis,
            step_pin,
            dir_pin,
            enable_pin,
            delay,
            invert_direction: config.invert_direction,
            invert_enable: config.invert_enable,
            direction_setup_us: timing.direction_setup_us,
            step_pulse_us: timing.step_pulse_us,
        }
    }

    /// Release the pins.
    pub fn release(self) -> (STEP, DIR, ENA, DELAY) {
        (self.step_pin, self.dir_pin, self.enable_pin, self.delay)
    }

    fn pin_error(&self) -> Error {
        Error::Axis(AxisError::PinError(self.axis))
    }
}

impl<STEP, DIR, ENA, DELAY> StepOutputs for StepperPins<STEP, DIR, ENA, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    ENA: OutputPin,
    DELAY: DelayNs,
{
    fn set_direction(&mut self, forward: bool) -> Result<()> {
        let result = if forward ^ self.invert_direction {
            self.dir_pin.set_high()
        } else {
            self.dir_pin.set_low()
        };
        result.map_err(|_| self.pin_error())?;
        self.delay.delay_us(self.direction_setup_us);
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        self.step_pin.set_high().map_err(|_| self.pin_error())?;
        self.delay.delay_us(self.step_pulse_us);
        self.step_pin.set_low().map_err(|_| self.pin_error())?;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let result = if enabled ^ self.invert_enable {
            self.enable_pin.set_high()
        } else {
            self.enable_pin.set_low()
        };
        result.map_err(|_| self.pin_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[test]
    fn test_inverted_direction_and_enable() {
        let mut step = PinMock::new(&[Transaction::set(State::High), Transaction::set(State::Low)]);
        let mut dir = PinMock::new(&[Transaction::set(State::Low)]);
        let mut ena = PinMock::new(&[Transaction::set(State::Low)]);

        // Stock Z inverts both direction and enable.
        let mut pins = StepperPins::new(
            AxisId::Z,
            &AxisConfig::stock_z(),
            &TimingConfig::default(),
            step.clone(),
            dir.clone(),
            ena.clone(),
            NoopDelay::new(),
        );
        pins.set_enabled(true).unwrap();
        pins.set_direction(true).unwrap();
        pins.step().unwrap();

        step.done();
        dir.done();
        ena.done();
    }
}
