use super::{CliError, EXIT_SUCCESS};
use distrobox_runtime::ContainerEngine;
use distrobox_schema::ContainerName;

pub fn run(
    engine: &dyn ContainerEngine,
    name: &ContainerName,
    force: bool,
) -> Result<u8, CliError> {
    engine.remove(name.as_str(), force)?;
    println!("removed {name}");
    Ok(EXIT_SUCCESS)
}
