use beacon::{mac::SYSFS_NET_ROOT, Args, BeaconError, ClientConfig, DhcpClient, MacAddr};
use clap::Parser;
use std::{error::Error as StdError, path::Path, process::ExitCode};
use tracing_subscriber::EnvFilter;

fn init_logging(default_level: &str) {
    // RUST_LOG takes priority over the -v flags.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn run(args: &Args) -> Result<(), BeaconError> {
    let mac_addr = match args.mac {
        Some(mac) => mac,
        None => MacAddr::discover(Path::new(SYSFS_NET_ROOT), args.interface.as_deref())?,
    };
    println!("Using MAC address: {mac_addr}");

    let config = ClientConfig::from_args(args, mac_addr)?;
    if let Some(interface) = &config.interface {
        tracing::info!(
            "Binding to interface '{}' and port {}",
            interface,
            config.client_port
        );
    }
    let client = DhcpClient::new(config)?;

    let lease = client.run().await?;
    println!("{lease}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level());

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(&format!(": {cause}"));
                source = cause.source();
            }
            tracing::error!("{}", message);
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
