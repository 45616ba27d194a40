mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{open_engine, resolve_settings, CliError};
use distrobox_runtime::install_signal_handler;
use distrobox_schema::{ContainerName, EngineChoice, Overrides};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "distrobox",
    version,
    about = "Use any Linux distribution inside your terminal, tightly integrated with the host"
)]
struct Cli {
    /// Container engine to use: podman, docker or autodetect.
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a new distrobox for the current user.
    Create {
        /// Container name.
        #[arg(short, long)]
        name: Option<String>,
        /// Image to create the container from.
        #[arg(short, long)]
        image: Option<String>,
        /// Pull a missing image without asking.
        #[arg(short = 'Y', long, default_value_t = false)]
        yes: bool,
        /// Extra argument passed to the engine's create command (repeatable).
        #[arg(short = 'a', long = "additional-flags", allow_hyphen_values = true)]
        additional_flags: Vec<String>,
    },
    /// Enter a distrobox (use -- to run a command instead of a login shell).
    Enter {
        /// Container name.
        name: Option<String>,
        /// Command to run inside the container (after --).
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// List distrobox containers.
    List {
        /// Output results as structured JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Stop a running distrobox.
    Stop {
        /// Container name.
        name: String,
    },
    /// Remove a distrobox.
    Rm {
        /// Container name.
        name: String,
        /// Remove the container even when it is running.
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn overrides(engine: Option<&str>) -> Result<Overrides, CliError> {
    let engine = engine.map(str::parse::<EngineChoice>).transpose()?;
    Ok(Overrides {
        engine,
        ..Overrides::default()
    })
}

fn execute(cli: Cli) -> Result<u8, CliError> {
    let base = overrides(cli.engine.as_deref())?;
    match cli.command {
        Commands::Create {
            name,
            image,
            yes,
            additional_flags,
        } => {
            let settings = resolve_settings(Overrides {
                name,
                image,
                additional_flags,
                ..base
            })?;
            let engine = open_engine(&settings)?;
            commands::create::run(engine.as_ref(), &settings, yes)
        }
        Commands::Enter { name, command } => {
            let settings = resolve_settings(Overrides { name, ..base })?;
            let engine = open_engine(&settings)?;
            commands::enter::run(engine.as_ref(), &settings, &command)
        }
        Commands::List { json } => {
            let settings = resolve_settings(base)?;
            let engine = open_engine(&settings)?;
            commands::list::run(engine.as_ref(), json)
        }
        Commands::Stop { name } => {
            let name = ContainerName::new(name)?;
            let settings = resolve_settings(base)?;
            let engine = open_engine(&settings)?;
            commands::stop::run(engine.as_ref(), &name)
        }
        Commands::Rm { name, force } => {
            let name = ContainerName::new(name)?;
            let settings = resolve_settings(base)?;
            let engine = open_engine(&settings)?;
            commands::rm::run(engine.as_ref(), &name, force)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DISTROBOX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    match execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.code)
        }
    }
}
