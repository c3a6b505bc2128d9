//! Agent dispatch: command composition and bounded process invocation.

pub mod command;
pub mod invoke;

pub use command::{
    AgentInvocation, CommandBuilder, NativeBuilder, WslBridgeBuilder, builder_for,
    AUTO_APPROVE_ENV,
};
pub use invoke::{InvocationResult, Outcome, excerpt, invoke};
