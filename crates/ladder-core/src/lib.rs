pub mod clock;
pub mod config;
pub mod error;
pub mod instruction;
pub mod io;
pub mod loader;
pub mod program;
pub mod scheduler;
pub mod snapshot;
pub mod tags;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{CadenceMode, RuntimeConfig};
pub use error::{LadderError, Result};
pub use instruction::{Instruction, InstructionKind, ScanContext};
pub use io::{IoAdapter, IoConfig, IoPoint, IoStatus, SimulatedIo, SimulationHandle};
pub use loader::{load_program, parse_program, DescriptionFormat};
pub use program::{Program, Rung};
pub use scheduler::{ScanScheduler, ScanStats, SchedulerState};
pub use tags::{TagStore, TagValue};
