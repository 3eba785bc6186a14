//! CLI for poking at a bench: list the inventory, run commands on a device.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use consolebench::step::{Grade, TearDown, TestContext, TestStep};
use consolebench::{DeviceRegistry, Inventory};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "consolebench")]
#[command(author, version, about = "Drive test bench consoles", long_about = None)]
struct Args {
    /// Bench inventory (TOML)
    #[arg(short, long, default_value = "bench.toml")]
    inventory: PathBuf,

    /// Mirror console traffic to the log
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the devices in the inventory
    Devices,

    /// Run commands on one device and print their output
    Run {
        /// Accessor name of the device
        device: String,

        /// Per-command timeout in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Commands, run in order
        #[arg(required = true)]
        commands: Vec<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --debug
    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut inventory = Inventory::load(&args.inventory)?;
    inventory.run.debug |= args.debug;

    match args.command {
        Command::Devices => {
            inventory.validate()?;
            for device in &inventory.devices {
                println!(
                    "{:<16} {:<14} {:<8} {}",
                    device.name,
                    device.role,
                    device.transport,
                    device.location.as_deref().unwrap_or("-")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            device,
            timeout,
            commands,
        } => {
            let timeout = timeout
                .map(Duration::try_from_secs_f64)
                .transpose()
                .map_err(|e| anyhow::anyhow!("invalid --timeout: {e}"))?;
            let registry = DeviceRegistry::from_inventory(&inventory)?;
            let handle = registry.accessor(&device);
            let handle = &handle;
            let ctx = TestContext::with_config("cli", inventory.run.clone());

            let mut step = TestStep::new(&ctx, format!("run on {device}"), "Test");
            let outcome = step.scope(|s| {
                for cmd in &commands {
                    let output =
                        s.call(cmd.as_str(), move || Ok(handle.run_command(cmd, timeout)?))?;
                    println!("{output}");
                }
                Ok(())
            });

            let mut teardown = TearDown::new(&ctx, "close devices");
            teardown.scope(|t| {
                for h in registry.handles() {
                    t.call(format!("close {h}"), move || Ok(h.close()?))?;
                }
                Ok(())
            })?;

            outcome?;
            Ok(match teardown.grade() {
                Grade::Ok => ExitCode::SUCCESS,
                Grade::Fail => ExitCode::FAILURE,
            })
        }
    }
}
