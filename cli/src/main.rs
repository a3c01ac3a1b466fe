use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use layerjail::{
    errors::{PullError, FATAL_EXIT_CODE},
    registry::{Backoff, DefaultRegistry},
    ImageReference, Platform, Puller, RegistryClient, Sandbox, SandboxRoot,
};
use std::{path::PathBuf, process};
use tempfile::TempDir;

/// Pull a container image and run one command inside it
#[derive(Parser, Debug)]
#[command(name = "layerjail", version, about)]
struct Args {
    /// Log filter, used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: String,

    /// Assemble the root filesystem here instead of in a new temporary directory
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Retry failed requests after exactly the nominal delay
    #[arg(long)]
    no_jitter: bool,

    /// Attempts per request, including the first
    #[arg(long, value_name = "N", default_value_t = 5)]
    max_retries: u32,

    /// Assemble the root filesystem, print its path, and exit
    #[arg(long)]
    pull_only: bool,

    /// Registry server base URL
    #[arg(long, value_name = "URL", requires = "auth_realm")]
    registry: Option<String>,

    /// Token endpoint URL for the registry
    #[arg(long, value_name = "URL", requires = "registry")]
    auth_realm: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command in an image
    Run {
        /// Image reference, `name[:tag]` or `name@digest`
        image: String,

        /// Command to run inside the image
        command: String,

        /// Arguments for the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    let args = Args::parse();
    Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    let Command::Run {
        image,
        command,
        args: run_args,
    } = &args.command;

    let (root, scratch) = match pull(&args, image) {
        Ok(pulled) => pulled,
        Err(err) => {
            log::error!("{}", err);
            process::exit(FATAL_EXIT_CODE);
        }
    };

    if args.pull_only {
        if !run_args.is_empty() {
            log::warn!("pull-only mode, run arguments are being ignored")
        }
        // the assembled root is the result, keep it
        if let Some(dir) = scratch {
            dir.into_path();
        }
        println!("{}", root.path().display());
        return;
    }

    let sandbox = match Sandbox::new(root.path()).change_root() {
        Ok(sandbox) => {
            // unreachable from inside the new root
            if let Some(dir) = scratch {
                dir.into_path();
            }
            sandbox
        }
        Err(err) => {
            log::error!("{}", err);
            drop(scratch);
            process::exit(err.exit_code());
        }
    };

    let result = sandbox
        .isolate_pids()
        .and_then(|sandbox| sandbox.run(command, run_args))
        .and_then(|output| output.report());
    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            log::error!("{}", err);
            process::exit(err.exit_code());
        }
    }
}

/// Assemble the root filesystem, along with the temporary directory that
/// holds it when `--root` wasn't given
///
/// Dropping the [TempDir] removes the root, which is what happens when any
/// step fails.
fn pull(args: &Args, image: &str) -> Result<(SandboxRoot, Option<TempDir>), PullError> {
    let image: ImageReference = image.parse()?;

    let (root, scratch) = match &args.root {
        Some(dir) => (SandboxRoot::create(dir)?, None),
        None => {
            let dir = tempfile::Builder::new().prefix("layerjail-").tempdir()?;
            (SandboxRoot::create(dir.path())?, Some(dir))
        }
    };

    let mut client = RegistryClient::builder().backoff(Backoff {
        max_retries: args.max_retries,
        jitter: !args.no_jitter,
        ..Backoff::default()
    });
    if let (Some(registry), Some(auth_realm)) = (&args.registry, &args.auth_realm) {
        client = client.registry(&DefaultRegistry::with_endpoints(registry, auth_realm)?);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut puller = Puller::new(client.build()?, Platform::resolve());
    runtime.block_on(puller.pull(&image, &root))?;
    Ok((root, scratch))
}
