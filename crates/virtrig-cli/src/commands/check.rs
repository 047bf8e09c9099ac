use super::{json_pretty, load_config, EXIT_DIRTY, EXIT_FAILURE, EXIT_SUCCESS};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;
use virtrig_core::StateRegistry;
use virtrig_probe::HostRunner;

/// One-shot verification: backup, run a command (or wait for the operator),
/// then check and optionally recover.
pub fn run(
    config_path: &Path,
    command: Option<&str>,
    no_recover: bool,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let mut registry = StateRegistry::from_config(&config).map_err(|e| e.to_string())?;
    registry.backup().map_err(|e| e.to_string())?;

    match command {
        Some(command) => {
            let runner = HostRunner::new(
                config.suite.root_dir.as_ref().map(PathBuf::from),
                Duration::from_secs(config.suite.timeout_secs),
            );
            let output = runner.run_shell(command).map_err(|e| e.to_string())?;
            if !output.success() {
                eprintln!("command exited with status {}", output.status);
            }
        }
        None => {
            println!("snapshot taken; press Enter to check the host state");
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| e.to_string())?;
        }
    }

    let report = registry.check(!no_recover);

    if json {
        println!("{}", json_pretty(&report)?);
    } else if report.is_clean() {
        println!("host state is clean");
    } else {
        for finding in &report.findings {
            for line in finding.message.lines() {
                println!("DIFF|{line}");
            }
        }
        for kind in &report.compromised {
            println!("could not derive current {kind} state");
        }
    }

    if !report.compromised.is_empty() {
        Ok(EXIT_FAILURE)
    } else if report.dirty {
        Ok(EXIT_DIRTY)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
