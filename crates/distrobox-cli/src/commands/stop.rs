use super::{CliError, EXIT_SUCCESS};
use distrobox_runtime::{ContainerEngine, ContainerState, RuntimeError};
use distrobox_schema::ContainerName;

pub fn run(engine: &dyn ContainerEngine, name: &ContainerName) -> Result<u8, CliError> {
    let name = name.as_str();
    match engine.state(name)? {
        ContainerState::Missing => {
            return Err(RuntimeError::ContainerNotFound(name.to_owned()).into());
        }
        ContainerState::Stopped(status) => {
            println!("{name} is not running ({status})");
            return Ok(EXIT_SUCCESS);
        }
        ContainerState::Running => {}
    }
    engine.stop(name)?;
    println!("stopped {name}");
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use distrobox_runtime::mock::MockEngine;

    #[test]
    fn stops_a_running_container() {
        let engine = MockEngine::new().with_container("devbox", ContainerState::Running);
        let name = ContainerName::new("devbox").unwrap();
        assert_eq!(run(&engine, &name).unwrap(), EXIT_SUCCESS);
        assert!(!engine.state("devbox").unwrap().is_running());
    }

    #[test]
    fn unknown_container_is_an_error() {
        let engine = MockEngine::new();
        let name = ContainerName::new("ghost").unwrap();
        let err = run(&engine, &name).unwrap_err();
        assert!(err.message.contains("ghost"));
    }
}
