mod fixtures;

use anyhow::Result;
use fixtures::*;
use rstest::*;

#[rstest]
fn test_cli(mut prefixbox: PrefixboxManager) -> Result<()> {
    assert!(prefixbox.pass(&["--version"]));
    assert!(prefixbox.pass(&["--help"]));
    assert!(prefixbox.xfail(&["--bad-option"]));
    // an action is required
    assert!(prefixbox.xfail(&[]));
    assert!(prefixbox.xfail(&["run"]));

    assert!(prefixbox.pass(&["--capture=pipe", "config", "capture"]));
    assert_eq!(prefixbox.last_stdout, "pipe\n");
    assert!(prefixbox.pass(&["--capture=pty", "config", "capture"]));
    assert_eq!(prefixbox.last_stdout, "pty\n");
    assert!(prefixbox.xfail(&["--capture=bogus", "config"]));

    assert!(prefixbox.pass(&["--tuning=none", "config", "tuning"]));
    assert_eq!(prefixbox.last_stdout, "none\n");
    assert!(prefixbox.pass(&["--runtime=wine-staging", "config", "runtime"]));
    assert_eq!(prefixbox.last_stdout, "wine-staging\n");

    assert!(prefixbox.xfail(&["config", "no_such_key"]));
    assert!(prefixbox.last_stderr.contains("Unknown key"));
    Ok(())
}

#[rstest]
fn test_cli_defaults(mut prefixbox: PrefixboxManager) -> Result<()> {
    assert!(prefixbox.pass(&["config"]));
    let stdout = prefixbox.last_stdout.clone();
    assert!(stdout.contains("runtime=wine\n"));
    assert!(stdout.contains("elevation_helper=pkexec\n"));
    assert!(stdout.contains("tuning=performance\n"));
    assert!(stdout.contains("mount_fallback=false\n"));
    assert!(stdout.contains("grace_timeout_ms=2000\n"));
    assert!(stdout.contains("batch_interval_ms=200\n"));
    assert!(stdout.contains("batch_bytes=16384\n"));
    // set by the fixture through the environment
    assert!(stdout.contains("boosters=false\n"));
    assert!(stdout.contains("capture=pipe\n"));
    assert!(stdout.contains(&format!("runtime_dir={}\n", prefixbox.arg("run"))));

    // dashes are accepted in key names
    assert!(prefixbox.pass(&["config", "grace-timeout-ms"]));
    assert_eq!(prefixbox.last_stdout, "2000\n");
    Ok(())
}

#[rstest]
fn test_cli_environment_overrides(mut prefixbox: PrefixboxManager) -> Result<()> {
    prefixbox.set_env("PREFIXBOX_TUNING", "none");
    prefixbox.set_env("PREFIXBOX_GRACE_TIMEOUT_MS", "750");
    assert!(prefixbox.pass(&["config", "tuning", "grace_timeout_ms"]));
    assert!(prefixbox.last_stdout.contains("tuning=none\n"));
    assert!(prefixbox.last_stdout.contains("grace_timeout_ms=750\n"));

    // the command line wins over the environment
    assert!(prefixbox.pass(&["--tuning=performance", "config", "tuning"]));
    assert_eq!(prefixbox.last_stdout, "performance\n");

    prefixbox.set_env("PREFIXBOX_BATCH_BYTES", "lots");
    assert!(prefixbox.xfail(&["config"]));
    assert!(prefixbox.last_stderr.contains("PREFIXBOX_BATCH_BYTES"));
    Ok(())
}

#[rstest]
fn test_cli_with_config(mut prefixbox: PrefixboxManager) -> Result<()> {
    let user_config = r#"
    runtime = "wine-staging"
    capture = "pipe"
    grace_timeout_ms = 1500
    "#;
    let project_config = r#"
    runtime = "wine-ge"
    "#;
    std::fs::create_dir_all(prefixbox.path(".config/prefixbox"))?;
    std::fs::create_dir_all(prefixbox.path("project/sub"))?;
    std::fs::write(prefixbox.path(".config/prefixbox/config.toml"), user_config)?;
    std::fs::write(prefixbox.path("project/.prefixbox.toml"), project_config)?;

    prefixbox.no_default_options = true;
    let home = prefixbox.arg("");
    prefixbox.set_env("HOME", &home);
    prefixbox.cwd = Some(prefixbox.path("project/sub"));

    assert!(prefixbox.pass(&["-v", "config", "runtime", "capture", "grace_timeout_ms"]));
    assert!(prefixbox.last_stdout.contains("runtime=wine-ge\n"));
    assert!(prefixbox.last_stdout.contains("capture=pipe\n"));
    assert!(prefixbox.last_stdout.contains("grace_timeout_ms=1500\n"));
    // provenance is logged
    assert!(prefixbox.last_stderr.contains("project/.prefixbox.toml"));

    // --no-config skips every file
    assert!(prefixbox.pass(&["--no-config", "config", "runtime"]));
    assert_eq!(prefixbox.last_stdout, "wine\n");

    std::fs::write(prefixbox.path("project/.prefixbox.toml"), "unknown_key = 1\n")?;
    assert!(prefixbox.xfail(&["config"]));
    Ok(())
}
