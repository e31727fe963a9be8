//! Threads that run the machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::axis::AxisId;
use crate::clock::Clock;
use crate::control::ControlLoop;
use crate::machine::Machine;
use crate::manual::{JogInput, ManualMover};
use crate::pulse::StepOutputs;
use crate::settings::SettingsHandle;

/// Control loop and manual movers, each on its own thread.
#[derive(Debug)]
pub struct MotionRuntime {
    machine: Arc<Machine>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl MotionRuntime {
    /// Start the control loop and a manual mover for every active axis.
    ///
    /// `outputs` and `jogs` are in Z, X, C order.
    pub fn spawn<O, C, J>(
        machine: Arc<Machine>,
        outputs: [O; 3],
        clock: C,
        jogs: [J; 3],
    ) -> (Self, SettingsHandle)
    where
        O: StepOutputs + Send + 'static,
        C: Clock + Send + 'static,
        J: JogInput + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (mut control, settings) = ControlLoop::new(Arc::clone(&machine), outputs, clock);
        let mut handles = Vec::with_capacity(4);

        let flag = Arc::clone(&shutdown);
        handles.push(thread::spawn(move || control.run(&flag)));

        for (id, jog) in AxisId::ALL.into_iter().zip(jogs) {
            if !machine.axis(id).params().active {
                continue;
            }
            let mut mover = ManualMover::new(id, settings.clone(), jog);
            let flag = Arc::clone(&shutdown);
            handles.push(thread::spawn(move || mover.run(&flag)));
        }
        tracing::info!(threads = handles.len(), "motion runtime started");

        let runtime = Self {
            machine,
            shutdown,
            handles,
        };
        (runtime, settings)
    }

    /// Shared machine.
    #[inline]
    pub fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    /// All threads still running.
    pub fn is_running(&self) -> bool {
        self.handles.iter().all(|h| !h.is_finished())
    }

    /// Ask every thread to stop and wait for them.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("motion thread panicked");
            }
        }
    }
}

impl Drop for MotionRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
