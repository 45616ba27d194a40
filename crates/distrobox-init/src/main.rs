use clap::Parser;
use distrobox_init::{signal_ready, Bootstrap, HostSystem, InitError, Supervisor};
use distrobox_schema::UserIdentity;
use std::path::PathBuf;
use std::process::ExitCode;

/// Container entrypoint: reconcile the container with the host user, then
/// stay alive until stopped.
#[derive(Debug, Parser)]
#[command(name = "distrobox-init", version)]
struct Args {
    /// Name of the user to create.
    #[arg(long)]
    name: String,

    #[arg(long)]
    uid: u32,

    #[arg(long)]
    gid: u32,

    /// Home directory, bind-mounted from the host.
    #[arg(long)]
    home: PathBuf,

    /// Login shell.
    #[arg(long)]
    shell: PathBuf,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Filesystem root to operate on.
    #[arg(long, env = "DISTROBOX_SYSROOT", default_value = "/", hide = true)]
    sysroot: PathBuf,
}

fn run(args: Args) -> Result<(), InitError> {
    let user = UserIdentity::new(args.name, args.uid, args.gid, args.home, args.shell)?;
    let system = HostSystem::new(&args.sysroot);
    let supervisor = Supervisor::install()?;

    Bootstrap::new(&system, args.sysroot, user).run()?;
    signal_ready(&mut std::io::stdout())?;
    supervisor.wait();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DISTROBOX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_level(false)
        .with_target(false)
        .without_time()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("An error occurred");
            ExitCode::from(e.exit_code())
        }
    }
}
