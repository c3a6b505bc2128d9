pub mod agent;
pub mod config;
pub mod emergency;
pub mod remote;
pub mod store;
pub mod task;
pub mod telegram;
pub mod trigger;
pub mod watch;

pub use agent::{
    AgentInvocation, CommandBuilder, InvocationResult, NativeBuilder, Outcome, WslBridgeBuilder,
    builder_for, invoke,
};
pub use config::{Config, TelegramConfig};
pub use emergency::{
    AlertKind, EmergencyAlert, Severity, Snapshot, check_conditions, recommendation,
};
pub use remote::{MonitorClient, SosClient};
pub use store::{StoreError, TaskBook, book_path};
pub use task::{SosRequest, SosStatus, Task, TripTask};
pub use trigger::{Due, due_trips, format_countdown, in_window, time_until_window};
pub use watch::{
    CancelToken, SosWatcher, TripWatcher, Watcher, run_loop, run_once, sleep_interruptible,
};
