//! Machine configuration - root configuration structure.

use heapless::{FnvIndexMap, String};
use serde::Deserialize;

use super::axis::AxisConfig;
use super::units::DeciMicrons;
use crate::axis::AxisId;

/// Root configuration structure from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    /// Spindle encoder parameters.
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Output and scheduling timing constants.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Multi-pass operation limits.
    #[serde(default)]
    pub operation: OperationConfig,

    /// Machine command execution parameters.
    #[serde(default)]
    pub command: CommandConfig,

    /// Manual pulse generators.
    #[serde(default)]
    pub handwheel: HandwheelConfig,

    /// Axes keyed by lowercase letter (`z`, `x`, `c`).
    pub axes: FnvIndexMap<String<8>, AxisConfig, 4>,
}

/// Spindle rotary encoder.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// Encoder ticks per spindle revolution.
    #[serde(default = "default_encoder_steps")]
    pub steps_per_revolution: u32,

    /// Ticks the encoder can issue without the spindle moving.
    #[serde(default)]
    pub backlash: u32,
}

/// Timing constants for outputs and locking.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Direction level must be stable this long before the next step.
    #[serde(default = "default_direction_setup_us")]
    pub direction_setup_us: u32,

    /// Driver must be enabled this long before the first step.
    #[serde(default = "default_enable_lead_ms")]
    pub enable_lead_ms: u32,

    /// Width of the step pulse.
    #[serde(default = "default_step_pulse_us")]
    pub step_pulse_us: u32,

    /// Scheduling jitter absorbed when deciding whether a step is due.
    #[serde(default = "default_step_slack_us")]
    pub step_slack_us: u32,

    /// Bounded wait for a per-axis lock.
    #[serde(default = "default_axis_lock_us")]
    pub axis_lock_timeout_us: u32,

    /// Bounded wait for the global motion lock.
    #[serde(default = "default_motion_lock_us")]
    pub motion_lock_timeout_us: u32,

    /// Time one fine manual step should take.
    #[serde(default = "default_manual_step_time_ms")]
    pub manual_step_time_ms: u32,

    /// Pause between fine manual steps.
    #[serde(default = "default_manual_step_pause_ms")]
    pub manual_step_pause_ms: u32,
}

/// Multi-pass operation limits.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
    /// Cross axis retract distance between passes.
    #[serde(default = "default_safe_distance", rename = "safe_distance_du")]
    pub safe_distance: DeciMicrons,

    /// Largest accepted pitch magnitude.
    #[serde(default = "default_pitch_max", rename = "pitch_max_du")]
    pub pitch_max: DeciMicrons,

    /// Largest accepted multi-start count.
    #[serde(default = "default_starts_max")]
    pub starts_max: u32,

    /// Largest accepted pass count.
    #[serde(default = "default_passes_max")]
    pub passes_max: u32,
}

/// Machine command execution parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Feed used until a command sets one, in du per second.
    #[serde(default = "default_feed", rename = "feed_default_du_per_sec")]
    pub feed_default: f32,

    /// Slowest accepted feed, in du per second.
    #[serde(default = "default_feed_min", rename = "feed_min_du_per_sec")]
    pub feed_min: f32,

    /// Interpolation chunks per step of the longest axis delta.
    #[serde(default = "default_interpolation_precision")]
    pub interpolation_precision: f32,

    /// Pending steps below which the next chunk may be issued.
    #[serde(default = "default_wait_epsilon")]
    pub wait_epsilon_steps: i64,
}

/// Manual pulse generator (handwheel) wiring.
#[derive(Debug, Clone, Deserialize)]
pub struct HandwheelConfig {
    /// Pulses per handwheel revolution.
    #[serde(default = "default_pulses_per_revolution")]
    pub pulses_per_revolution: f32,

    /// Counts held back to suppress spurious reversals.
    #[serde(default = "default_half_backlash")]
    pub half_backlash: i32,

    /// Axis driven by the first handwheel.
    #[serde(default)]
    pub first: Option<AxisId>,

    /// Axis driven by the second handwheel.
    #[serde(default)]
    pub second: Option<AxisId>,
}

fn default_encoder_steps() -> u32 {
    1024
}

fn default_direction_setup_us() -> u32 {
    5
}

fn default_enable_lead_ms() -> u32 {
    100
}

fn default_step_pulse_us() -> u32 {
    2
}

fn default_step_slack_us() -> u32 {
    5
}

fn default_axis_lock_us() -> u32 {
    10_000
}

fn default_motion_lock_us() -> u32 {
    1_000
}

fn default_manual_step_time_ms() -> u32 {
    500
}

fn default_manual_step_pause_ms() -> u32 {
    80
}

fn default_safe_distance() -> DeciMicrons {
    DeciMicrons(5000)
}

fn default_pitch_max() -> DeciMicrons {
    DeciMicrons(254_000)
}

fn default_starts_max() -> u32 {
    124
}

fn default_passes_max() -> u32 {
    999
}

fn default_feed() -> f32 {
    20_000.0
}

fn default_feed_min() -> f32 {
    167.0
}

fn default_interpolation_precision() -> f32 {
    0.1
}

fn default_wait_epsilon() -> i64 {
    10
}

fn default_pulses_per_revolution() -> f32 {
    100.0
}

fn default_half_backlash() -> i32 {
    2
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            steps_per_revolution: default_encoder_steps(),
            backlash: 0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            direction_setup_us: default_direction_setup_us(),
            enable_lead_ms: default_enable_lead_ms(),
            step_pulse_us: default_step_pulse_us(),
            step_slack_us: default_step_slack_us(),
            axis_lock_timeout_us: default_axis_lock_us(),
            motion_lock_timeout_us: default_motion_lock_us(),
            manual_step_time_ms: default_manual_step_time_ms(),
            manual_step_pause_ms: default_manual_step_pause_ms(),
        }
    }
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            safe_distance: default_safe_distance(),
            pitch_max: default_pitch_max(),
            starts_max: default_starts_max(),
            passes_max: default_passes_max(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            feed_default: default_feed(),
            feed_min: default_feed_min(),
            interpolation_precision: default_interpolation_precision(),
            wait_epsilon_steps: default_wait_epsilon(),
        }
    }
}

impl Default for HandwheelConfig {
    fn default() -> Self {
        Self {
            pulses_per_revolution: default_pulses_per_revolution(),
            half_backlash: default_half_backlash(),
            first: None,
            second: None,
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        let mut axes = FnvIndexMap::new();
        for (id, axis) in [
            (AxisId::Z, AxisConfig::stock_z()),
            (AxisId::X, AxisConfig::stock_x()),
            (AxisId::C, AxisConfig::stock_c()),
        ] {
            // Capacity is 4, three entries always fit.
            let _ = axes.insert(String::try_from(id.key()).unwrap_or_default(), axis);
        }
        Self {
            encoder: EncoderConfig::default(),
            timing: TimingConfig::default(),
            operation: OperationConfig::default(),
            command: CommandConfig::default(),
            handwheel: HandwheelConfig::default(),
            axes,
        }
    }
}

impl MachineConfig {
    /// Get an axis configuration.
    pub fn axis(&self, id: AxisId) -> Option<&AxisConfig> {
        self.axes
            .iter()
            .find(|(k, _)| k.as_str() == id.key())
            .map(|(_, v)| v)
    }

    /// Get a mutable axis configuration.
    pub fn axis_mut(&mut self, id: AxisId) -> Option<&mut AxisConfig> {
        self.axes
            .iter_mut()
            .find(|(k, _)| k.as_str() == id.key())
            .map(|(_, v)| v)
    }

    /// Handwheel slot (0 or 1) wired to `id`, if any.
    pub fn handwheel_for(&self, id: AxisId) -> Option<usize> {
        if self.handwheel.first == Some(id) {
            Some(0)
        } else if self.handwheel.second == Some(id) {
            Some(1)
        } else {
            None
        }
    }
}
