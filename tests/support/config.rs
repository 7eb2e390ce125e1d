use std::fs;
use std::path::{Path, PathBuf};

pub const CONTROLLER: &str = r#"
[controller]
address = "10.0.0.1"
username = "ops@example.com"
password = "secret"

[run]
suites = ["nightly"]
"#;

/// One `[[tests]]` entry for a throughput test on simusers.
pub fn test_entry(name: &str, suite: &str, run_order: u32) -> String {
    format!(
        r#"
[[tests]]
name = "{name}"
id = "id-{name}"
type = "http_throughput"
load_type = "simusers"
run_order = {run_order}
suite = "{suite}"
start_load = 10
incr_low = 10
incr_med = 20
incr_high = 40
low_threshold = 5
med_threshold = 2
high_threshold = 0.5
duration = 100
startup = 5
rampup = 10
rampdown = 10
shutdown = 5
capacity_adj = 1
"#
    )
}

pub fn config_toml(entries: &[String]) -> String {
    format!("{CONTROLLER}{}", entries.concat())
}

pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, content).unwrap();
    path
}
