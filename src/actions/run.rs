use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde_json::{Value, json};
use std::path::Path;

use super::common::{
    ambient_env, environment_manager, executable_path, follow, working_dir_for,
};
use crate::config::Config;
use crate::environment::MountState;
use crate::launch::{
    ExecutionTarget, HostFacts, boosters, build_env, loader_chain, sync_enabled,
    tool_available,
};
use crate::supervisor::{ProcessSupervisor, SessionReport, SupervisorSettings};
use crate::util::{ensure_dir, expand_tilde_path, normalize_path, set_json_output};
use crate::worker::spawn_session;

pub fn run(
    config: &Config,
    prefix: Option<&Path>,
    loader: &[String],
    exe: &Path,
    work_dir: Option<&Path>,
) -> Result<()> {
    let exe = executable_path(exe)?;
    let report = match prefix {
        Some(prefix) => {
            let prefix = normalize_path(&expand_tilde_path(prefix)?)?;
            run_target(config, &prefix, &exe, loader, None)?
        }
        None => {
            let working_dir = working_dir_for(&exe, work_dir)?;
            let status = environment_manager(config).inspect(&working_dir)?;
            if status.mount_state != MountState::Mounted {
                return Err(anyhow!(
                    "No overlay prefix is mounted at {}, create one first",
                    status.merged_dir.display()
                ));
            }
            run_target(config, &status.merged_dir, &exe, loader, Some(&working_dir))?
        }
    };
    check_report(&report)
}

pub(super) fn check_report(report: &SessionReport) -> Result<()> {
    if report.success() {
        return Ok(());
    }
    match report.exit_code {
        Some(code) => Err(anyhow!("Program exited with code {}", code)),
        None => Err(anyhow!("Program was stopped before it started")),
    }
}

fn supervisor_settings(config: &Config) -> SupervisorSettings {
    SupervisorSettings {
        capture: config.capture,
        poll_interval: config.poll_interval,
        batch_interval: config.batch_interval,
        batch_bytes: config.batch_bytes,
        grace_timeout: config.grace_timeout,
    }
}

/**
 * Runs `exe` against `prefix` under supervision and waits for it. With a
 * `working_dir` the session is bound to that overlay so it can't be deleted
 * underneath the program. Ctrl-C stops the program.
 */
pub(super) fn run_target(
    config: &Config,
    prefix: &Path,
    exe: &Path,
    loader: &[String],
    working_dir: Option<&Path>,
) -> Result<SessionReport> {
    let facts = HostFacts::gather();
    let env = build_env(&ambient_env(), prefix, &facts, config.tuning);
    let boosters = if config.boosters {
        boosters(&facts, tool_available)
    } else {
        vec![]
    };
    let target = ExecutionTarget::in_own_directory(
        exe,
        loader_chain(&boosters, &config.runtime, loader),
    )?;
    debug!("Prefix: {}", prefix.display());

    let supervisor = ProcessSupervisor::new(supervisor_settings(config));
    let mut session = supervisor.session()?;
    if let Some(working_dir) = working_dir {
        ensure_dir(&config.runtime_dir)?;
        session.bind(&config.runtime_dir, working_dir);
    }

    let handle = session.handle();
    if let Err(e) = ctrlc::set_handler(move || handle.stop()) {
        warn!("Failed to install signal handler: {}", e);
    }

    let worker = spawn_session(
        session,
        target,
        env,
        sync_enabled(&facts, config.tuning),
    )
    .context("Failed to start worker")?;
    let report = follow(worker)??;

    set_json_output("exit_code", json!(report.exit_code));
    set_json_output("missing_dependencies", json!(report.missing_dependencies));
    set_json_output(
        "report_file",
        report
            .report_file
            .as_ref()
            .map_or(Value::Null, |p| Value::String(p.display().to_string())),
    );
    Ok(report)
}
