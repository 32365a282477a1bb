mod capture;
mod process;
mod state;
mod supervisor;

pub use capture::{allocate_output, CaptureCommand, OutputLocation, RECORDING_PREFIX};
pub use process::{ProcessController, SystemProcesses};
pub use state::SourceState;
pub use supervisor::{CycleReport, ReapReport, Supervisor};
