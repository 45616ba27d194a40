use super::{colorize_status, json_pretty, CliError, EXIT_SUCCESS};
use distrobox_runtime::ContainerEngine;

pub fn run(engine: &dyn ContainerEngine, json: bool) -> Result<u8, CliError> {
    let containers = engine.list()?;
    if json {
        println!("{}", json_pretty(&containers)?);
    } else if containers.is_empty() {
        println!("no distrobox containers found");
    } else {
        println!("{:<14} {:<20} {:<24} IMAGE", "ID", "NAME", "STATUS");
        for c in &containers {
            println!(
                "{:<14} {:<20} {:<24} {}",
                c.id,
                c.name,
                colorize_status(c),
                c.image
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
