//! Persisted machine state.
//!
//! The record is flattened into top-level keys of a [`KeyValueStore`]. Every
//! field has a default, so a store with missing keys still restores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use toml::Value;

use crate::axis::{AxisId, Stops};
use crate::config::{DeciMicrons, MeasureUnit};
use crate::error::{Error, PersistError, Result};
use crate::machine::{Machine, DEFAULT_TURN_PASSES};
use crate::modes::Mode;

/// Bumped whenever the meaning of a stored key changes.
pub const PERSIST_VERSION: i64 = 1;

const VERSION_KEY: &str = "version";

/// Backing store for persisted values.
pub trait KeyValueStore {
    /// Value under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the value under `key`.
    fn put(&mut self, key: &str, value: Value) -> Result<()>;

    /// Drop every key.
    fn clear(&mut self) -> Result<()>;
}

/// Store that lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// No keys held.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.values.clear();
        Ok(())
    }
}

/// Stored part of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedAxis {
    /// Tool position.
    pub pos: i64,
    /// Origin offset.
    pub origin_pos: i64,
    /// Origin-independent position.
    pub pos_global: i64,
    /// Motor position.
    pub motor_pos: i64,
    /// Left stop, absent when unconstrained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_stop: Option<i64>,
    /// Right stop, absent when unconstrained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_stop: Option<i64>,
    /// Operator switched the axis off.
    pub disabled: bool,
}

/// Everything that survives a power cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    /// Z axis.
    pub z: PersistedAxis,
    /// X axis.
    pub x: PersistedAxis,
    /// C axis.
    pub c: PersistedAxis,
    /// Pitch in deci-microns.
    pub pitch: i64,
    /// Thread starts.
    pub starts: u32,
    /// Spindle position.
    pub spindle_pos: i64,
    /// Backlash-filtered spindle position.
    pub spindle_avg: i64,
    /// Pending phase catch-up.
    pub spindle_sync: i64,
    /// Angle within the revolution.
    pub spindle_global: i64,
    /// Operating mode.
    pub mode: Mode,
    /// Display unit.
    pub measure: MeasureUnit,
    /// Cone ratio.
    pub cone_ratio: f32,
    /// Pass count.
    pub turn_passes: u32,
    /// Cross axis direction.
    pub aux_forward: bool,
    /// Manual move step.
    pub move_step: DeciMicrons,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            z: PersistedAxis::default(),
            x: PersistedAxis::default(),
            c: PersistedAxis::default(),
            pitch: 0,
            starts: 1,
            spindle_pos: 0,
            spindle_avg: 0,
            spindle_sync: 0,
            spindle_global: 0,
            mode: Mode::Normal,
            measure: MeasureUnit::Metric,
            cone_ratio: 1.0,
            turn_passes: DEFAULT_TURN_PASSES,
            aux_forward: true,
            move_step: MeasureUnit::Metric.coarse_move_step(),
        }
    }
}

impl PersistedState {
    /// Copy the persisted part of the machine.
    pub fn capture(machine: &Machine) -> Self {
        let motion = machine.motion();
        let axis = |id: AxisId| {
            let state = machine.axis(id).snapshot();
            let stops = state.stops();
            PersistedAxis {
                pos: state.pos(),
                origin_pos: state.origin_pos(),
                pos_global: state.pos_global(),
                motor_pos: state.motor_pos(),
                left_stop: stops.left,
                right_stop: stops.right,
                disabled: state.disabled(),
            }
        };
        let spindle = motion.spindle();
        Self {
            z: axis(AxisId::Z),
            x: axis(AxisId::X),
            c: axis(AxisId::C),
            pitch: motion.pitch,
            starts: motion.starts,
            spindle_pos: spindle.pos(),
            spindle_avg: spindle.avg(),
            spindle_sync: spindle.sync(),
            spindle_global: spindle.global(),
            mode: motion.mode,
            measure: motion.measure,
            cone_ratio: motion.cone_ratio,
            turn_passes: motion.turn_passes,
            aux_forward: motion.aux_forward,
            move_step: motion.move_step,
        }
    }

    /// Write this state into a stopped machine.
    pub fn restore(&self, machine: &Machine) {
        let limits = &machine.config().operation;
        let mut motion = machine.motion();
        machine.set_running(&mut motion, false);

        for (id, saved) in [(AxisId::Z, &self.z), (AxisId::X, &self.x), (AxisId::C, &self.c)] {
            let mut state = machine.axis(id).state();
            state.pos = saved.pos;
            state.origin_pos = saved.origin_pos;
            state.pos_global = saved.pos_global;
            state.motor_pos = saved.motor_pos;
            state.pending_pos = 0;
            state.stops = Stops {
                left: saved.left_stop,
                right: saved.right_stop,
            };
            state.set_disabled(saved.disabled);
        }

        motion.mode = self.mode;
        motion.pitch = self.pitch;
        motion.starts = self.starts.clamp(1, limits.starts_max.max(1));
        motion.cone_ratio = self.cone_ratio;
        motion.turn_passes = self.turn_passes.min(limits.passes_max);
        motion.aux_forward = self.aux_forward;
        motion.measure = self.measure;
        motion.move_step = self.move_step;
        motion.spindle.restore(
            self.spindle_pos,
            self.spindle_avg,
            self.spindle_sync,
            self.spindle_global,
        );
        if motion.mode.is_async() {
            machine.configure_async(&mut motion);
        }
        tracing::info!(mode = ?motion.mode, pitch = motion.pitch, "state restored");
    }

    /// Write every field, plus the version key, to `store`.
    pub fn save(&self, store: &mut impl KeyValueStore) -> Result<()> {
        let Value::Table(table) = Value::try_from(self).map_err(store_error)? else {
            return Err(store_error("state is not a table"));
        };
        for (key, value) in table {
            store.put(&key, value)?;
        }
        store.put(VERSION_KEY, Value::Integer(PERSIST_VERSION))
    }

    /// Read the stored state, filling absent keys with defaults.
    ///
    /// A store written under another version is wiped and read as empty.
    pub fn load(store: &mut impl KeyValueStore) -> Result<Self> {
        match store.get(VERSION_KEY)? {
            Some(Value::Integer(PERSIST_VERSION)) => {}
            None => return Ok(Self::default()),
            Some(other) => {
                tracing::warn!(stored = %other, expected = PERSIST_VERSION, "discarding stored state");
                store.clear()?;
                return Ok(Self::default());
            }
        }
        let mut table = toml::Table::new();
        for key in Self::KEYS {
            if let Some(value) = store.get(key)? {
                table.insert((*key).to_owned(), value);
            }
        }
        Value::Table(table).try_into().map_err(store_error)
    }

    const KEYS: &'static [&'static str] = &[
        "z",
        "x",
        "c",
        "pitch",
        "starts",
        "spindle_pos",
        "spindle_avg",
        "spindle_sync",
        "spindle_global",
        "mode",
        "measure",
        "cone_ratio",
        "turn_passes",
        "aux_forward",
        "move_step",
    ];
}

/// Saves the machine state when it changed since the last save.
#[derive(Debug, Default)]
pub struct StateSaver {
    last: Option<PersistedState>,
}

impl StateSaver {
    /// Saver that writes on the first call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saver that treats `state` as already stored.
    pub fn with_saved(state: PersistedState) -> Self {
        Self { last: Some(state) }
    }

    /// Capture the machine and write it if it differs from the last save.
    /// Returns `true` if the store was written.
    pub fn save_if_changed(
        &mut self,
        machine: &Machine,
        store: &mut impl KeyValueStore,
    ) -> Result<bool> {
        let current = PersistedState::capture(machine);
        if self.last.as_ref() == Some(&current) {
            return Ok(false);
        }
        current.save(store)?;
        tracing::debug!("state saved");
        self.last = Some(current);
        Ok(true)
    }
}

fn store_error(e: impl core::fmt::Display) -> Error {
    use core::fmt::Write;
    let mut msg = heapless::String::<64>::new();
    // Overlong messages are cut off.
    let _ = write!(msg, "{}", e);
    Error::Persist(PersistError::Store(msg))
}
