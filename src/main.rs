#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::result_map_unit_fn,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::use_debug,
    clippy::used_underscore_binding,
    clippy::used_underscore_items
)]

mod actions;
mod config;
mod environment;
mod launch;
mod logger;
mod mount;
mod privileged;
mod supervisor;
mod util;
mod worker;

use anyhow::{Context, Result, anyhow};
use config::{cli, resolve_config};

use environment::EnvError;
use log::Log;
use serde_json::Value;
use supervisor::SessionError;
use util::{print_json_output, set_json_output, set_should_print_output};

use clap::Parser;

/// Machine-readable name of whatever went wrong, for `--json` consumers.
fn error_kind(error: &anyhow::Error) -> &'static str {
    if let Some(e) = error.downcast_ref::<EnvError>() {
        e.kind()
    } else if let Some(e) = error.downcast_ref::<SessionError>() {
        e.kind()
    } else {
        "other"
    }
}

pub fn main() -> Result<()> {
    let logger = logger::PrefixboxLogger::new(log::LevelFilter::Trace)
        .init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let cli: cli::Args = cli::Args::parse();

    logger.set_level(cli.log_level.unwrap_or(log::LevelFilter::Info));

    let config = match resolve_config(&cli).context("Resolving config") {
        Ok(config) => config,
        Err(e) => {
            logger.print_deferred();
            return Err(e);
        }
    };

    // The config may carry its own log level, so anything logged while it
    // was being loaded is only printed now.
    logger.set_level(config.log_level);
    logger.print_deferred();

    set_should_print_output(!cli.json);

    let work_dir = cli.work_dir.as_deref();
    let result = match &cli.action {
        cli::Action::Config { keys } => actions::config(&config, keys.clone()),
        cli::Action::Create { base, exe } => {
            actions::create(&config, base.as_deref(), exe, work_dir)
        }
        cli::Action::Delete { base, exe } => {
            actions::delete(&config, base.as_deref(), exe, work_dir)
        }
        cli::Action::Run {
            prefix,
            loader,
            exe,
        } => actions::run(&config, prefix.as_deref(), loader, exe, work_dir),
        cli::Action::Session { base, loader, exe } => {
            actions::session(&config, base.as_deref(), loader, exe, work_dir)
        }
        cli::Action::Status { exe } => actions::status(&config, exe, work_dir),
        cli::Action::Detect { path } => actions::detect(path),
        cli::Action::BaseInit { path } => actions::base_init(&config, path),
        cli::Action::Winetricks { base, args } => {
            actions::winetricks(&config, base.as_deref(), args)
        }
    };

    if cli.json {
        match &result {
            Ok(()) => {
                set_json_output("status", Value::String("success".to_string()));
            }
            Err(e) => {
                set_json_output("status", Value::String("error".to_string()));
                set_json_output("error", Value::String(format!("{:#}", e)));
                set_json_output("error_kind", Value::String(error_kind(e).to_string()));
            }
        }
        print_json_output()?;
        if result.is_err() {
            logger.flush();
            std::process::exit(1);
        }
    }
    logger.flush();
    result
}
