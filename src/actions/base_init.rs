use anyhow::Result;
use serde_json::Value;
use std::path::Path;

use super::common::environment_manager;
use crate::config::Config;
use crate::outln;
use crate::util::{expand_tilde_path, set_json_output};

pub fn base_init(config: &Config, path: &Path) -> Result<()> {
    let path = environment_manager(config).init_base(&expand_tilde_path(path)?)?;
    set_json_output("base", Value::String(path.display().to_string()));
    outln!("{}", path.display());
    Ok(())
}
