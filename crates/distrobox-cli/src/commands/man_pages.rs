use super::{CliError, EXIT_FAILURE, EXIT_SUCCESS};
use clap::CommandFactory;
use std::path::Path;

fn render(cmd: clap::Command, path: &Path) -> Result<(), CliError> {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd)
        .render(&mut buf)
        .map_err(|e| CliError::new(EXIT_FAILURE, format!("man page render failed: {e}")))?;
    std::fs::write(path, &buf).map_err(|e| {
        CliError::new(
            EXIT_FAILURE,
            format!("failed to write {}: {e}", path.display()),
        )
    })
}

pub fn run<C: CommandFactory>(dir: &Path) -> Result<u8, CliError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CliError::new(EXIT_FAILURE, format!("failed to create dir: {e}")))?;
    let cmd = C::command();
    render(cmd.clone(), &dir.join("distrobox.1"))?;
    for sub in cmd.get_subcommands() {
        let path = dir.join(format!("distrobox-{}.1", sub.get_name()));
        render(sub.clone(), &path)?;
    }
    println!("man pages written to {}", dir.display());
    Ok(EXIT_SUCCESS)
}
