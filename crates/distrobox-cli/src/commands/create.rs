use super::{
    refuse_inside_container, spin_fail, spin_ok, spinner, CliError, EXIT_FAILURE, EXIT_SUCCESS,
};
use dialoguer::Confirm;
use distrobox_runtime::{
    build_create_command, ContainerEngine, ContainerState, CreateOptions, HostEnvironment,
    RuntimeError,
};
use distrobox_schema::{ContainerIdentity, Settings, UserIdentity};
use std::io::{stderr, stdin, IsTerminal};
use std::path::Path;
use tracing::info;

pub fn run(engine: &dyn ContainerEngine, settings: &Settings, yes: bool) -> Result<u8, CliError> {
    refuse_inside_container(Path::new("/"), "distrobox create")?;
    let is_tty = stdin().is_terminal() && stderr().is_terminal();
    ensure_image(engine, settings.image.as_str(), yes, is_tty)?;

    let user = UserIdentity::from_host()?;
    let host = HostEnvironment::probe(&user)?;
    create_container(engine, settings, user, &host)?;

    let name = settings.name.as_str();
    println!("distrobox '{name}' created. To enter, run:\n\n  distrobox enter {name}");
    Ok(EXIT_SUCCESS)
}

/// Make sure `image` exists locally, pulling it after confirmation.
pub fn ensure_image(
    engine: &dyn ContainerEngine,
    image: &str,
    yes: bool,
    is_tty: bool,
) -> Result<(), CliError> {
    if engine.image_exists(image)? {
        return Ok(());
    }
    if !yes {
        if !is_tty {
            return Err(CliError::new(
                EXIT_FAILURE,
                format!("image {image} not found locally (pass --yes to pull it)"),
            ));
        }
        let pull = Confirm::new()
            .with_prompt(format!("image {image} not found, pull it now?"))
            .default(true)
            .interact()
            .map_err(|e| CliError::new(EXIT_FAILURE, format!("prompt failed: {e}")))?;
        if !pull {
            return Err(RuntimeError::Aborted(format!("image {image} was not pulled")).into());
        }
    }
    info!("pulling {image}");
    engine.pull(image)?;
    Ok(())
}

pub fn create_container(
    engine: &dyn ContainerEngine,
    settings: &Settings,
    user: UserIdentity,
    host: &HostEnvironment,
) -> Result<(), CliError> {
    let name = settings.name.as_str();
    if engine.state(name)? != ContainerState::Missing {
        return Err(RuntimeError::ContainerExists(name.to_owned()).into());
    }
    let identity = ContainerIdentity::new(settings.name.clone(), settings.image.clone(), user)?;
    let command = build_create_command(&CreateOptions {
        kind: engine.kind(),
        identity: &identity,
        host,
        additional_flags: &settings.additional_flags,
    });

    let pb = spinner(&format!("creating {name}"));
    match engine.create(&command) {
        Ok(()) => {
            spin_ok(&pb, &format!("created {name}"));
            Ok(())
        }
        Err(e) => {
            spin_fail(&pb, &format!("failed to create {name}"));
            Err(e.into())
        }
    }
}
