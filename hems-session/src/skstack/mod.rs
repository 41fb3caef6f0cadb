//! SKSTACK command set of the BP35C0/BP35C2 dongle

pub mod command;
pub mod engine;
pub mod line;
pub mod scan;
pub mod statistics;

pub use command::SkCommand;
pub use engine::{CommandEngine, Flow};
pub use line::{event, Line, ScanKey};
pub use scan::ScanAccumulator;
pub use statistics::EngineStatistics;
