pub mod commands;
pub mod remote;
pub mod response;
pub mod telemetry;

pub use commands::{Operation, TimeoutClass};
pub use remote::RemoteCommand;
pub use response::{DeadlineAction, Outcome, Verdict, classify};
pub use telemetry::TemperaturePanel;
