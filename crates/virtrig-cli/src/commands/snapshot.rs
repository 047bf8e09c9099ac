use super::{json_pretty, load_config, EXIT_SUCCESS};
use std::path::Path;
use virtrig_core::StateRegistry;

/// Take and print one snapshot of every tracked kind, for probe debugging.
pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let mut registry = StateRegistry::from_config(&config).map_err(|e| e.to_string())?;
    let all = registry.snapshot_all().map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&all)?);
    } else {
        for (kind, snapshot) in &all {
            println!("{kind} ({}):", snapshot.len());
            for (name, record) in &snapshot.0 {
                println!("  {name}");
                for (key, value) in record.iter() {
                    println!("    {key}: {}", value.shape());
                }
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
