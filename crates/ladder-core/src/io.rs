//! I/O boundary between the scan loop and the outside world.
//!
//! The scheduler only sees [`IoAdapter`]. [`SimulatedIo`] stands in for
//! physical pins: inputs come from an injected image that a
//! [`SimulationHandle`] can drive from another thread, and outputs land in an
//! output image instead of on hardware.

use crate::error::{LadderError, Result};
use crate::loader::{read_description, validate_tag_name};
use crate::tags::{is_system_tag, TagStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// IoAdapter
// ---------------------------------------------------------------------------

pub trait IoAdapter: Send {
    /// Latch input points into `store`, applying inversion.
    fn read_inputs(&mut self, store: &TagStore) -> Result<()>;

    /// Drive output points from `store`, applying inversion.
    fn write_outputs(&mut self, store: &TagStore) -> Result<()>;

    /// Drive every output to its off state and release resources. Must be
    /// safe to call more than once.
    fn cleanup(&mut self) -> Result<()>;

    fn is_simulated(&self) -> bool;

    fn status(&self) -> IoStatus;

    /// Injection handle for simulated inputs, if this adapter supports it.
    fn simulation(&self) -> Option<SimulationHandle> {
        None
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoPoint {
    pub tag: String,
    pub pin: u32,
    #[serde(default)]
    pub invert: bool,
}

impl IoPoint {
    /// Convert between a tag value and a pin level.
    fn apply(&self, value: bool) -> bool {
        value != self.invert
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoConfig {
    #[serde(default)]
    pub inputs: Vec<IoPoint>,
    #[serde(default)]
    pub outputs: Vec<IoPoint>,
}

impl IoConfig {
    /// Load a JSON or YAML I/O configuration and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let config: IoConfig = read_description(path).map_err(|e| match e {
            LadderError::ProgramLoad(msg) => LadderError::IoConfig(msg),
            LadderError::Json(err) => LadderError::IoConfig(format!("{}: {err}", path.display())),
            LadderError::Yaml(err) => LadderError::IoConfig(format!("{}: {err}", path.display())),
            other => other,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Every tag is a valid name, no tag is bound twice in the same
    /// direction, no pin is used twice, and inputs never target `_SYSTEM`.
    pub fn validate(&self) -> Result<()> {
        let mut pins = HashSet::new();
        for (direction, points) in [("input", &self.inputs), ("output", &self.outputs)] {
            let mut tags = HashSet::new();
            for point in points {
                validate_tag_name(&point.tag)?;
                if !tags.insert(point.tag.as_str()) {
                    return Err(LadderError::IoConfig(format!(
                        "{direction} tag '{}' is bound more than once",
                        point.tag
                    )));
                }
                if !pins.insert(point.pin) {
                    return Err(LadderError::IoConfig(format!(
                        "pin {} is bound more than once",
                        point.pin
                    )));
                }
            }
        }
        if let Some(point) = self.inputs.iter().find(|p| is_system_tag(&p.tag)) {
            return Err(LadderError::ReservedTag(point.tag.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    Simulation,
    /// Reserved for a physical pin adapter; `SimulatedIo` never reports it.
    Hardware,
}

impl std::fmt::Display for IoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoMode::Simulation => f.write_str("simulation"),
            IoMode::Hardware => f.write_str("hardware"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointStatus {
    pub tag: String,
    pub pin: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoStatus {
    pub mode: IoMode,
    pub inputs: Vec<PointStatus>,
    pub outputs: Vec<PointStatus>,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PinImage {
    /// Injected input pin levels, keyed by tag.
    inputs: BTreeMap<String, bool>,
    /// Last written output pin levels, keyed by tag.
    outputs: BTreeMap<String, bool>,
}

/// Cloneable control surface for a [`SimulatedIo`]. Safe to use from a
/// thread other than the scan loop.
#[derive(Debug, Clone, Default)]
pub struct SimulationHandle {
    image: Arc<Mutex<PinImage>>,
}

impl SimulationHandle {
    fn lock(&self) -> MutexGuard<'_, PinImage> {
        self.image.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the pin level of a configured input. Returns false, and changes
    /// nothing, when `tag` is not a configured input.
    pub fn set_input(&self, tag: &str, value: bool) -> bool {
        let mut image = self.lock();
        match image.inputs.get_mut(tag) {
            Some(level) => {
                *level = value;
                tracing::info!(tag, value, "simulated input set");
                true
            }
            None => {
                tracing::warn!(tag, "not a configured input; ignored");
                false
            }
        }
    }

    /// Flip a configured input. Returns the new level, or `None` when `tag`
    /// is not a configured input.
    pub fn toggle_input(&self, tag: &str) -> Option<bool> {
        let mut image = self.lock();
        let level = image.inputs.get_mut(tag)?;
        *level = !*level;
        let value = *level;
        tracing::info!(tag, value, "simulated input toggled");
        Some(value)
    }

    pub fn inputs(&self) -> BTreeMap<String, bool> {
        self.lock().inputs.clone()
    }

    pub fn outputs(&self) -> BTreeMap<String, bool> {
        self.lock().outputs.clone()
    }
}

/// Adapter that reads inputs from and writes outputs to in-memory pin
/// images.
#[derive(Debug)]
pub struct SimulatedIo {
    config: IoConfig,
    handle: SimulationHandle,
}

impl SimulatedIo {
    pub fn new(config: IoConfig) -> Self {
        let handle = SimulationHandle::default();
        {
            let mut image = handle.lock();
            for point in &config.inputs {
                image.inputs.insert(point.tag.clone(), false);
            }
            for point in &config.outputs {
                image.outputs.insert(point.tag.clone(), false);
            }
        }
        tracing::info!(
            inputs = config.inputs.len(),
            outputs = config.outputs.len(),
            "simulated I/O configured"
        );
        Self { config, handle }
    }

    pub fn handle(&self) -> SimulationHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }
}

impl IoAdapter for SimulatedIo {
    fn read_inputs(&mut self, store: &TagStore) -> Result<()> {
        let image = self.handle.lock();
        for point in &self.config.inputs {
            let level = image.inputs.get(&point.tag).copied().unwrap_or(false);
            store.set(&point.tag, point.apply(level));
        }
        Ok(())
    }

    fn write_outputs(&mut self, store: &TagStore) -> Result<()> {
        let mut image = self.handle.lock();
        for point in &self.config.outputs {
            let value = store.get_bool(&point.tag, false);
            image.outputs.insert(point.tag.clone(), point.apply(value));
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut image = self.handle.lock();
        for level in image.outputs.values_mut() {
            *level = false;
        }
        tracing::info!("simulated outputs driven off");
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn status(&self) -> IoStatus {
        let points = |points: &[IoPoint]| {
            points
                .iter()
                .map(|p| PointStatus {
                    tag: p.tag.clone(),
                    pin: p.pin,
                })
                .collect()
        };
        IoStatus {
            mode: IoMode::Simulation,
            inputs: points(&self.config.inputs),
            outputs: points(&self.config.outputs),
        }
    }

    fn simulation(&self) -> Option<SimulationHandle> {
        Some(self.handle.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
