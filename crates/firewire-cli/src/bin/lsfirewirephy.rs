//! `lsfirewirephy` — list the PHYs on a FireWire bus.
//!
//! Reads the vendor and product identifiers of every PHY on the bus via
//! remote access to register page 1 and prints one line per PHY:
//!
//! ```text
//! 0.0: 080028:000001
//! 0.1: 080046:204673
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use firewire_bus::{scan_phy_registers, DeviceStream, FwError, NodeDirectory, TransactionEngine};
use firewire_cli::parse_int;

#[derive(Parser)]
#[command(
    name = "lsfirewirephy",
    about = "List the PHYs on a FireWire bus",
    version
)]
struct Cli {
    /// List all PHYs on all buses.
    #[arg(short, long)]
    all: bool,

    /// Device file of the local node on the bus.
    #[arg(short, long, value_name = "file", default_value = "/dev/fw0")]
    device: String,

    /// List only this PHY.
    #[arg(short, long = "phy-id", value_name = "nr", allow_hyphen_values = true)]
    phy_id: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let phy_id = match cli.phy_id.as_deref() {
        Some(arg) => match parse_int(arg) {
            Some(id) if id <= 62 => Some(id),
            _ => bail!("phy-id must be between 0 and 62"),
        },
        None => None,
    };

    if cli.all {
        list_all_buses()
    } else {
        list_bus(&cli.device, phy_id)
    }
}

fn list_bus(device: &str, only: Option<u32>) -> Result<()> {
    let stream = DeviceStream::open(device)?;
    stream.require_local()?;
    let card = stream.card();
    let root_phy = stream.root_phy_id();
    let mut engine = TransactionEngine::new(stream);

    match only {
        Some(phy_id) => list_phy(&mut engine, card, phy_id),
        None => list_phys(&mut engine, card, root_phy),
    }
}

fn list_phys(
    engine: &mut TransactionEngine<DeviceStream>,
    card: u32,
    root_phy: u32,
) -> Result<()> {
    for phy_id in 0..=root_phy {
        list_phy(engine, card, phy_id)?;
    }
    Ok(())
}

/// Prints one PHY's identifiers. A scan timeout is reported and skipped so
/// the remaining PHYs still get listed.
fn list_phy(engine: &mut TransactionEngine<DeviceStream>, card: u32, phy_id: u32) -> Result<()> {
    match scan_phy_registers(engine, phy_id) {
        Ok(regs) => {
            println!(
                "{card}.{phy_id}: {:02x}{:02x}{:02x}:{:02x}{:02x}{:02x}",
                regs[0], regs[1], regs[2], regs[3], regs[4], regs[5]
            );
            Ok(())
        }
        Err(err) if err.is_timeout() => {
            eprintln!("timeout");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn list_all_buses() -> Result<()> {
    let directory = match NodeDirectory::discover() {
        Ok(directory) => directory,
        Err(FwError::NoDevicesFound) => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    for node in directory.nodes().iter().filter(|node| node.is_local()) {
        let stream = match DeviceStream::open(&node.path) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!("{}: {err}", node.path.display());
                continue;
            }
        };
        let card = stream.card();
        let root_phy = stream.root_phy_id();
        let mut engine = TransactionEngine::new(stream);
        list_phys(&mut engine, card, root_phy)?;
    }
    Ok(())
}
