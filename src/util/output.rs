use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::{LazyLock, Mutex};

/// What the user sees on stdout. In `--json` mode plain lines are suppressed
/// and results are collected into one object printed at exit.
struct OutputState {
    plain: bool,
    json: Map<String, Value>,
}

static OUTPUT: LazyLock<Mutex<OutputState>> = LazyLock::new(|| {
    Mutex::new(OutputState {
        plain: true,
        json: Map::new(),
    })
});

pub fn set_should_print_output(should_print: bool) {
    OUTPUT.lock().expect("Failed to lock OUTPUT").plain = should_print;
}

/// Prints one line of program output. A closed stdout is ignored so a
/// `prefixbox run ... | head` doesn't take the session down with it.
pub fn print_output(printed_output: &str) {
    if OUTPUT.lock().expect("Failed to lock OUTPUT").plain {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", printed_output);
        let _ = stdout.flush();
    }
}

pub fn set_json_output(key: &str, value: Value) {
    OUTPUT
        .lock()
        .expect("Failed to lock OUTPUT")
        .json
        .insert(key.to_string(), value);
}

/// Appends to a JSON array entry, creating it on first use.
pub fn push_json_output(key: &str, value: Value) {
    let json = &mut OUTPUT.lock().expect("Failed to lock OUTPUT").json;
    match json.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            json.insert(key.to_string(), Value::Array(vec![value]));
        }
    }
}

#[macro_export]
macro_rules! outln {
    ( $fmt:expr $(, $args:expr)*) => {
        $crate::util::print_output(&format!($fmt $(, $args)*))
    };
}

pub fn print_json_output() -> Result<()> {
    let json = std::mem::take(&mut OUTPUT.lock().expect("Failed to lock OUTPUT").json);
    let rendered = serde_json::to_string_pretty(&Value::Object(json))
        .context("Error serializing JSON")?;
    writeln!(std::io::stdout().lock(), "{}", rendered)
        .context("Failed to write JSON output")?;
    Ok(())
}
