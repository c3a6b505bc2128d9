//! Command composition for agent dispatch.
//!
//! Builders turn an agent profile plus a free-form instruction into an
//! executable program + argument vector. Payload fields (locations, ids)
//! are interpolated into the instruction text upstream, so the composed
//! command is never a single concatenated shell string - the only shell
//! layer is the one a cross-environment bridge cannot avoid, and there the
//! instruction is quoted for it explicitly.

use crate::config::AgentConfig;

/// Environment flag instructing the invoked agent to run non-interactively
/// and approve its own tool calls. Nobody is watching the poll loop to
/// click through confirmations.
pub const AUTO_APPROVE_ENV: &str = "AGENT_AUTO_APPROVE";

/// A fully composed invocation, ready for the process invoker.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<String>,
}

/// Strategy for composing the invocation in a given execution environment.
pub trait CommandBuilder {
    /// Name of the target environment, for logs.
    fn name(&self) -> &str;

    /// Compose the invocation for one agent profile and instruction. Step
    /// ordering inside the instruction must survive composition verbatim.
    fn build(&self, profile: &str, instruction: &str) -> AgentInvocation;
}

/// Select the builder for the configured environment.
pub fn builder_for(config: &AgentConfig) -> Box<dyn CommandBuilder> {
    match &config.bridge {
        Some(bridge) => Box::new(WslBridgeBuilder {
            bridge_command: bridge.command.clone(),
            agent_path: bridge.agent_path.clone(),
            working_dir: config.working_dir.clone(),
        }),
        None => Box::new(NativeBuilder {
            command: config.command.clone(),
            working_dir: config.working_dir.clone(),
        }),
    }
}

/// Runs the agent binary directly on the local PATH.
pub struct NativeBuilder {
    pub command: String,
    pub working_dir: Option<String>,
}

impl CommandBuilder for NativeBuilder {
    fn name(&self) -> &str {
        "native"
    }

    fn build(&self, profile: &str, instruction: &str) -> AgentInvocation {
        AgentInvocation {
            program: self.command.clone(),
            args: vec![
                "chat".to_string(),
                "--agent".to_string(),
                profile.to_string(),
                "--no-interactive".to_string(),
                "--trust-all-tools".to_string(),
                instruction.to_string(),
            ],
            env: vec![(AUTO_APPROVE_ENV.to_string(), "true".to_string())],
            working_dir: self.working_dir.clone(),
        }
    }
}

/// Runs the agent through a WSL bridge: the watcher lives on Windows, the
/// agent binary inside the Linux environment. The instruction crosses one
/// intermediate `bash -lc` layer (login shell, so the agent is on PATH)
/// and must be quoted for it; the working directory is translated to the
/// `/mnt/<drive>/` convention.
pub struct WslBridgeBuilder {
    pub bridge_command: String,
    pub agent_path: String,
    pub working_dir: Option<String>,
}

impl CommandBuilder for WslBridgeBuilder {
    fn name(&self) -> &str {
        "wsl-bridge"
    }

    fn build(&self, profile: &str, instruction: &str) -> AgentInvocation {
        let escaped = escape_single_quotes(instruction);

        let mut script = String::new();
        if let Some(dir) = &self.working_dir {
            script.push_str(&format!("cd {} && ", to_bridge_path(dir)));
        }
        script.push_str(&format!(
            "{} chat --agent {} --no-interactive --trust-all-tools '{}'",
            self.agent_path, profile, escaped
        ));

        AgentInvocation {
            program: self.bridge_command.clone(),
            args: vec!["bash".to_string(), "-lc".to_string(), script],
            env: vec![(AUTO_APPROVE_ENV.to_string(), "true".to_string())],
            working_dir: None,
        }
    }
}

/// Escape embedded single quotes for a single-quoted POSIX shell string:
/// close the quote, emit an escaped quote, reopen.
fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', "'\\''")
}

/// Translate a Windows path to the bridged environment's convention:
/// `C:\Users\guard\app` becomes `/mnt/c/Users/guard/app`. Paths that are
/// already POSIX-style pass through unchanged.
fn to_bridge_path(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = bytes[0].to_ascii_lowercase() as char;
        let rest = path[2..].replace('\\', "/");
        format!("/mnt/{}{}", drive, rest)
    } else {
        path.replace('\\', "/")
    }
}
