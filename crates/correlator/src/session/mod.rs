//! Session windowing: grouping alerts into incidents and closing them.

pub mod monitor;
pub mod window;

pub use monitor::{ClosePolicy, IncidentOutcome, MonitorConfig, SessionMonitor};
pub use window::{DrainedSession, IngestOutcome, SessionSnapshot, SessionWindow};
