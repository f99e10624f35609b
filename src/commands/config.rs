//! Config command handlers: show effective configuration.

use crate::ProcessExit;
use crate::app::config_manager::ResolvedConfig;

/// Prints the config file location followed by every effective setting.
pub(crate) fn run_config_show_command(resolved: &ResolvedConfig) -> ProcessExit {
    let resolved_path = resolved.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("# config_path = {resolved_path}");
    println!(
        "# config_file = {}",
        if resolved.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    print!("{}", resolved.config);
    ProcessExit::Success
}
