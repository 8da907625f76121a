//! storyfork Simulator
//!
//! Drives the mutation service the way many editors would and checks what
//! subscribers get to see.
//!
//! - [`simulator`]: random concurrent mutations with invariant monitoring
//! - [`scenario`]: scripted fork, edit, extend, delete and collapse session

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod scenario;
pub mod simulator;

pub use scenario::{run_scenario, ScenarioStep};
pub use simulator::{
    run_simulator, InvariantMonitor, SimulatedOperation, SimulatorConfig, SimulatorReport,
    SimulatorStats, Violation,
};
