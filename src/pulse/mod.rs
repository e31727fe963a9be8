//! Step pulse generation.
//!
//! [`PulseScheduler`] walks an axis toward its pending target under an
//! acceleration ramp; [`AsyncGenerator`] steps at a constant rate. Both emit
//! through [`StepOutputs`].

mod async_gen;
mod outputs;
mod scheduler;

pub use async_gen::AsyncGenerator;
pub use outputs::{StepOutputs, StepperPins, Unconnected};
pub use scheduler::PulseScheduler;

#[cfg(test)]
pub(crate) use scheduler::tests::Recorder;
