use clap::{ArgGroup, Parser};
use distrobox_export::{run, ExportContext, ExportError, ExportRequest};
use distrobox_schema::is_inside_container;
use std::path::PathBuf;
use std::process::ExitCode;

/// Export a binary, an application or a service from this distrobox to the
/// host.
#[derive(Debug, Parser)]
#[command(name = "distrobox-export", version)]
#[command(group(ArgGroup::new("artifact").required(true).args(["bin", "app", "service"])))]
struct Args {
    /// Path of a binary to export.
    #[arg(long, requires = "export_path")]
    bin: Option<PathBuf>,

    /// Name of an application to export.
    #[arg(long)]
    app: Option<String>,

    /// Name of a systemd service to export.
    #[arg(long)]
    service: Option<String>,

    /// Directory the exported binary wrapper is written to.
    #[arg(long)]
    export_path: Option<PathBuf>,

    /// Flags appended to the exported command.
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    extra_flags: String,

    /// Remove a previous export instead of creating one.
    #[arg(short, long, default_value_t = false)]
    delete: bool,

    /// Run the exported command with sudo inside the container.
    #[arg(short = 'S', long, default_value_t = false)]
    sudo: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(long, env = "DISTROBOX_SYSROOT", default_value = "/", hide = true)]
    sysroot: PathBuf,
}

impl Args {
    fn request(&self) -> Result<ExportRequest, ExportError> {
        if let Some(path) = &self.bin {
            let export_dir = self.export_path.clone().ok_or_else(|| {
                ExportError::Usage("--bin requires --export-path".to_owned())
            })?;
            return Ok(ExportRequest::Binary {
                path: path.clone(),
                export_dir,
            });
        }
        if let Some(name) = &self.app {
            return Ok(ExportRequest::Application { name: name.clone() });
        }
        if let Some(name) = &self.service {
            return Ok(ExportRequest::Service { name: name.clone() });
        }
        Err(ExportError::Usage(
            "one of --bin, --app or --service is required".to_owned(),
        ))
    }
}

fn execute(args: &Args) -> Result<(), ExportError> {
    let request = args.request()?;
    if !is_inside_container(&args.sysroot) {
        return Err(ExportError::NotInContainer);
    }
    let ctx = ExportContext::from_env(
        &args.sysroot,
        |key| std::env::var(key).ok(),
        &args.extra_flags,
        args.sudo,
    )?;
    let outcome = run(&ctx, &request, args.delete)?;
    println!("{outcome}");
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
        .with_target(false)
        .without_time()
        .init();

    match execute(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("An error occurred");
            ExitCode::from(e.exit_code())
        }
    }
}
