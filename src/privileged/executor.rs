use std::sync::Arc;

use log::{debug, warn};

use super::{CommandOutput, CommandRunner, Invocation};

/// pkexec's exit codes for a dismissed or refused authentication dialog
const HELPER_DISMISSED: i32 = 126;
const HELPER_NOT_AUTHORIZED: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    User,
    Elevated,
}

/// A named lifecycle step: one command run with or without elevation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub invocation: Invocation,
    pub privilege: Privilege,
}

impl Step {
    pub fn user(name: &str, invocation: Invocation) -> Self {
        Self {
            name: name.to_string(),
            invocation,
            privilege: Privilege::User,
        }
    }

    pub fn elevated(name: &str, invocation: Invocation) -> Self {
        Self {
            name: name.to_string(),
            invocation,
            privilege: Privilege::Elevated,
        }
    }
}

/**
 * Runs lifecycle steps, wrapping elevated ones in the elevation helper.
 *
 * Each elevated invocation may pop up an authentication prompt, so callers
 * batch what they can into a single script via [`run_elevated_script`]. When
 * no helper is configured (we're already root, or the user opted out)
 * elevated steps run directly.
 *
 * [`run_elevated_script`]: PrivilegedExecutor::run_elevated_script
 */
pub struct PrivilegedExecutor {
    helper: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl PrivilegedExecutor {
    pub fn new(helper: Option<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { helper, runner }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// The invocation that is actually executed for a step.
    pub fn wrap(&self, step: &Step) -> Invocation {
        match (step.privilege, &self.helper) {
            (Privilege::Elevated, Some(helper)) => {
                let mut wrapped = Invocation::new(helper.as_str())
                    .arg(step.invocation.program.clone())
                    .args(step.invocation.args.iter().cloned());
                wrapped.env = step.invocation.env.clone();
                wrapped.cwd = step.invocation.cwd.clone();
                wrapped
            }
            _ => step.invocation.clone(),
        }
    }

    pub fn run(&self, step: &Step) -> std::io::Result<CommandOutput> {
        let invocation = self.wrap(step);
        debug!("[{}] {}", step.name, invocation);
        let output = self.runner.run(&invocation)?;
        if step.privilege == Privilege::Elevated && self.helper.is_some() {
            match output.code {
                Some(HELPER_DISMISSED) => {
                    warn!("[{}] authentication was dismissed", step.name)
                }
                Some(HELPER_NOT_AUTHORIZED) => {
                    warn!("[{}] not authorized to elevate", step.name)
                }
                _ => {}
            }
        }
        Ok(output)
    }

    /// Runs a shell script with a single elevation.
    pub fn run_elevated_script(
        &self,
        name: &str,
        script: &str,
    ) -> std::io::Result<CommandOutput> {
        self.run(&Step::elevated(
            name,
            Invocation::new("sh").arg("-c").arg(script),
        ))
    }
}
