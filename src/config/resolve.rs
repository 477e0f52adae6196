use super::cli::Args;
use super::{CaptureMode, Config, PartialConfig, TuningProfile};
use crate::util::{expand_tilde_path, home_dir};
use anyhow::{Context, Result, anyhow};
use log::trace;
use nix::unistd::{AccessFlags, access, getuid};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RUNTIME: &str = "wine";
pub const DEFAULT_ELEVATION_HELPER: &str = "pkexec";

pub fn resolve_config(cli: &Args) -> Result<Config> {
    let (mut partial_config, mut sources) = load_partial(cli.no_config)?;

    // Override with environment variables if set
    apply_environment(&mut partial_config, &mut sources, &|key| {
        std::env::var(key).ok()
    })?;

    // Override with CLI args if provided (highest precedence)
    override_with(
        &mut partial_config.log_level,
        cli.log_level,
        "log_level",
        "cli",
        &mut sources,
    );
    override_with(
        &mut partial_config.runtime,
        cli.runtime.clone(),
        "runtime",
        "cli",
        &mut sources,
    );
    override_with(
        &mut partial_config.elevation_helper,
        cli.elevation_helper.clone(),
        "elevation_helper",
        "cli",
        &mut sources,
    );
    override_with(
        &mut partial_config.capture,
        cli.capture,
        "capture",
        "cli",
        &mut sources,
    );
    override_with(
        &mut partial_config.tuning,
        cli.tuning,
        "tuning",
        "cli",
        &mut sources,
    );

    let config = Config {
        log_level: or_default(
            partial_config.log_level,
            log::LevelFilter::Info,
            "log_level",
            &mut sources,
        ),
        base: partial_config.base,
        runtime: or_default(
            partial_config.runtime,
            DEFAULT_RUNTIME.to_string(),
            "runtime",
            &mut sources,
        ),
        elevation_helper: or_default(
            partial_config.elevation_helper,
            DEFAULT_ELEVATION_HELPER.to_string(),
            "elevation_helper",
            &mut sources,
        ),
        capture: or_default(
            partial_config.capture,
            CaptureMode::Pty,
            "capture",
            &mut sources,
        ),
        tuning: or_default(
            partial_config.tuning,
            TuningProfile::Performance,
            "tuning",
            &mut sources,
        ),
        boosters: or_default(
            partial_config.boosters,
            true,
            "boosters",
            &mut sources,
        ),
        mount_fallback: or_default(
            partial_config.mount_fallback,
            false,
            "mount_fallback",
            &mut sources,
        ),
        grace_timeout: Duration::from_millis(or_default(
            partial_config.grace_timeout_ms,
            2000,
            "grace_timeout_ms",
            &mut sources,
        )),
        poll_interval: Duration::from_millis(or_default(
            partial_config.poll_interval_ms,
            50,
            "poll_interval_ms",
            &mut sources,
        )),
        batch_interval: Duration::from_millis(or_default(
            partial_config.batch_interval_ms,
            200,
            "batch_interval_ms",
            &mut sources,
        )),
        batch_bytes: or_default(
            partial_config.batch_bytes,
            16 * 1024,
            "batch_bytes",
            &mut sources,
        ),
        runtime_dir: or_default(
            partial_config.runtime_dir,
            default_runtime_dir(),
            "runtime_dir",
            &mut sources,
        ),
        sources,
    };

    validate_config(&config)?;

    trace!("Runtime: {}", config.runtime);
    trace!("Runtime dir: {}", config.runtime_dir.display());

    Ok(config)
}

fn override_with<T>(
    field: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &str,
    sources: &mut HashMap<String, String>,
) {
    if let Some(value) = value {
        *field = Some(value);
        sources.insert(key.into(), source.into());
    }
}

fn or_default<T>(
    value: Option<T>,
    default: T,
    key: &str,
    sources: &mut HashMap<String, String>,
) -> T {
    match value {
        Some(value) => value,
        None => {
            sources.insert(key.into(), "default".into());
            default
        }
    }
}

/// `$XDG_RUNTIME_DIR/prefixbox`, or a per-user directory in /tmp.
pub fn default_runtime_dir() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR").filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir).join("prefixbox"),
        None => PathBuf::from(format!("/tmp/prefixbox-{}", getuid())),
    }
}

fn from_environment<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    field: &mut Option<T>,
    sources: &mut HashMap<String, String>,
) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    let var = format!("PREFIXBOX_{}", key.to_uppercase());
    if let Some(value) = lookup(&var).filter(|value| !value.is_empty()) {
        let parsed = value
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {}: {}", var, e))?;
        *field = Some(parsed);
        sources.insert(key.into(), "environment".into());
    }
    Ok(())
}

/// `PREFIXBOX_<KEY>` variables override config files.
pub fn apply_environment(
    config: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<()> {
    from_environment(lookup, "log_level", &mut config.log_level, sources)?;
    from_environment(lookup, "base", &mut config.base, sources)?;
    from_environment(lookup, "runtime", &mut config.runtime, sources)?;
    from_environment(
        lookup,
        "elevation_helper",
        &mut config.elevation_helper,
        sources,
    )?;
    from_environment(lookup, "capture", &mut config.capture, sources)?;
    from_environment(lookup, "tuning", &mut config.tuning, sources)?;
    from_environment(lookup, "boosters", &mut config.boosters, sources)?;
    from_environment(lookup, "mount_fallback", &mut config.mount_fallback, sources)?;
    from_environment(
        lookup,
        "grace_timeout_ms",
        &mut config.grace_timeout_ms,
        sources,
    )?;
    from_environment(
        lookup,
        "poll_interval_ms",
        &mut config.poll_interval_ms,
        sources,
    )?;
    from_environment(
        lookup,
        "batch_interval_ms",
        &mut config.batch_interval_ms,
        sources,
    )?;
    from_environment(lookup, "batch_bytes", &mut config.batch_bytes, sources)?;
    from_environment(lookup, "runtime_dir", &mut config.runtime_dir, sources)?;

    for path in [&mut config.base, &mut config.runtime_dir]
        .into_iter()
        .flatten()
    {
        *path = expand_tilde_path(path)?;
    }
    Ok(())
}

pub fn load_partial(
    no_config: bool,
) -> Result<(PartialConfig, HashMap<String, String>)> {
    let config_paths = if no_config {
        vec![]
    } else {
        find_config_files()?
    };
    let mut sources = HashMap::new();
    if config_paths.is_empty() {
        trace!("No config files found, using default config");
        return Ok((PartialConfig::default(), sources));
    }

    let mut merged_config = PartialConfig::default();
    for path in config_paths.iter() {
        let config_str = std::fs::read_to_string(path).context(format!(
            "Failed to read config file {}",
            path.display()
        ))?;

        let config: PartialConfig = toml::from_str(&config_str).context(
            format!("Failed to parse config file {}", path.display()),
        )?;

        merge_configs(
            &mut merged_config,
            &mut sources,
            config,
            &path.to_string_lossy(),
        );
        trace!("Loaded config file: {}", path.display());
    }

    Ok((merged_config, sources))
}

/** Returns all readable config files, lowest precedence first */
fn find_config_files() -> Result<Vec<PathBuf>> {
    let home = home_dir().ok();
    let mut paths_to_check = Vec::new();

    // Any project specific files
    let mut current_dir = std::env::current_dir()?;
    loop {
        paths_to_check.push(current_dir.join(".prefixbox.toml"));
        if Some(&current_dir) == home.as_ref() || !current_dir.pop() {
            break;
        }
    }

    if let Some(home) = &home {
        paths_to_check.push(home.join(".config/prefixbox/config.toml"));
    }

    paths_to_check.push(PathBuf::from("/etc/prefixbox.toml"));

    // Finally reverse them so we can process them in order nicely
    paths_to_check.reverse();

    Ok(paths_to_check
        .into_iter()
        .filter(|path| path.is_file() && access(path, AccessFlags::R_OK).is_ok())
        .collect())
}

fn merge_configs(
    base: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    override_config: PartialConfig,
    source: &str,
) {
    let o = override_config;
    override_with(&mut base.log_level, o.log_level, "log_level", source, sources);
    override_with(&mut base.base, o.base, "base", source, sources);
    override_with(&mut base.runtime, o.runtime, "runtime", source, sources);
    override_with(
        &mut base.elevation_helper,
        o.elevation_helper,
        "elevation_helper",
        source,
        sources,
    );
    override_with(&mut base.capture, o.capture, "capture", source, sources);
    override_with(&mut base.tuning, o.tuning, "tuning", source, sources);
    override_with(&mut base.boosters, o.boosters, "boosters", source, sources);
    override_with(
        &mut base.mount_fallback,
        o.mount_fallback,
        "mount_fallback",
        source,
        sources,
    );
    override_with(
        &mut base.grace_timeout_ms,
        o.grace_timeout_ms,
        "grace_timeout_ms",
        source,
        sources,
    );
    override_with(
        &mut base.poll_interval_ms,
        o.poll_interval_ms,
        "poll_interval_ms",
        source,
        sources,
    );
    override_with(
        &mut base.batch_interval_ms,
        o.batch_interval_ms,
        "batch_interval_ms",
        source,
        sources,
    );
    override_with(&mut base.batch_bytes, o.batch_bytes, "batch_bytes", source, sources);
    override_with(&mut base.runtime_dir, o.runtime_dir, "runtime_dir", source, sources);
}

fn validate_config(config: &Config) -> Result<()> {
    if config.runtime.trim().is_empty() {
        return Err(anyhow!("runtime must not be empty"));
    }
    if config.poll_interval.is_zero() {
        return Err(anyhow!("poll_interval_ms must be greater than 0"));
    }
    if config.batch_bytes == 0 {
        return Err(anyhow!("batch_bytes must be greater than 0"));
    }
    if !config.runtime_dir.is_absolute() {
        return Err(anyhow!(
            "runtime_dir must be an absolute path: {}",
            config.runtime_dir.display()
        ));
    }
    Ok(())
}
