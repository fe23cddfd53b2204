//! `firewire-request` — send asynchronous transactions on a FireWire bus.
//!
//! ```text
//! USAGE:
//!   firewire-request <dev> read <addr> [<length>]
//!   firewire-request <dev> write <addr> <data>
//!   firewire-request <dev> broadcast <addr> <data>
//!   firewire-request <dev> <locktype> <addr> <data> [<data>]
//!   firewire-request <dev> fcp <data>
//!   firewire-request <dev> reset|long_reset
//! ```
//!
//! Addresses are hex or register names (`-D` lists them); the read length
//! defaults to the named register's size, or four bytes. Lock types are
//! mask_swap, compare_swap, add, add_little, bounded_add and wrap_add.

use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use firewire_bus::{BusResetKind, DeviceStream, LockOp, TransactionEngine};
use firewire_cli::{
    format_data, format_register_table, parse_address, parse_data, parse_length, Address,
};

#[derive(Parser)]
#[command(
    name = "firewire-request",
    about = "Send asynchronous requests on a FireWire bus",
    version
)]
struct Cli {
    /// Print the known register names and exit.
    #[arg(short = 'D', long)]
    dump_register_names: bool,

    /// List hidden registers too.
    #[arg(short, long)]
    verbose: bool,

    /// Device file of a node on the bus (/dev/fwX).
    #[arg(required_unless_present = "dump_register_names")]
    device: Option<String>,

    /// Command and its parameters.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

enum Request {
    Read {
        offset: u64,
        length: u32,
    },
    Write {
        offset: u64,
        data: Bytes,
    },
    Broadcast {
        offset: u64,
        data: Bytes,
    },
    Lock {
        op: LockOp,
        offset: u64,
        operands: Vec<Bytes>,
    },
    Fcp {
        command: Bytes,
    },
    Reset(BusResetKind),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    if cli.dump_register_names {
        print!("{}", format_register_table(cli.verbose));
        return Ok(());
    }
    let Some(device) = cli.device.as_deref() else {
        bail!("missing device name");
    };

    let mut params = cli.args.iter().map(String::as_str);
    let Some(command) = params.next() else {
        bail!("missing command");
    };
    let request = build_request(command, &mut params)?;
    if let Some(extra) = params.next() {
        bail!("superfluous parameter: `{extra}'");
    }

    tracing::debug!("running {command} on {device}");
    run(device, request)
}

fn build_request<'a>(
    command: &str,
    params: &mut impl Iterator<Item = &'a str>,
) -> Result<Request> {
    match command.to_ascii_lowercase().as_str() {
        "read" => {
            let addr = address(params)?;
            let length = match params.next() {
                Some(arg) => parse_length(arg)?,
                None => addr.register_size.unwrap_or(4),
            };
            Ok(Request::Read {
                offset: addr.offset,
                length,
            })
        }
        "write" => {
            let (addr, data) = address_and_data(params)?;
            Ok(Request::Write {
                offset: addr.offset,
                data,
            })
        }
        "broadcast" => {
            let (addr, data) = address_and_data(params)?;
            Ok(Request::Broadcast {
                offset: addr.offset,
                data,
            })
        }
        "mask_swap" => lock_request(LockOp::MaskSwap, params),
        "compare_swap" => lock_request(LockOp::CompareSwap, params),
        "add" | "add_big" => lock_request(LockOp::FetchAdd, params),
        "add_little" => lock_request(LockOp::LittleAdd, params),
        "bounded_add" | "bounded_add_big" => lock_request(LockOp::BoundedAdd, params),
        "wrap_add" | "wrap_add_big" => lock_request(LockOp::WrapAdd, params),
        "fcp" => {
            let arg = params.next().ok_or_else(|| anyhow!("missing data"))?;
            Ok(Request::Fcp {
                command: parse_data(arg, None)?,
            })
        }
        "reset" => Ok(Request::Reset(BusResetKind::Short)),
        "long_reset" => Ok(Request::Reset(BusResetKind::Long)),
        _ => bail!("unknown command: `{command}'"),
    }
}

fn address<'a>(params: &mut impl Iterator<Item = &'a str>) -> Result<Address> {
    let arg = params.next().ok_or_else(|| anyhow!("missing address"))?;
    parse_address(arg)
}

fn address_and_data<'a>(
    params: &mut impl Iterator<Item = &'a str>,
) -> Result<(Address, Bytes)> {
    let addr = address(params)?;
    let arg = params.next().ok_or_else(|| anyhow!("missing data"))?;
    Ok((addr, parse_data(arg, addr.register_size)?))
}

fn lock_request<'a>(op: LockOp, params: &mut impl Iterator<Item = &'a str>) -> Result<Request> {
    let addr = address(params)?;
    let mut operands = Vec::with_capacity(op.operand_count());
    for _ in 0..op.operand_count() {
        let arg = params.next().ok_or_else(|| anyhow!("missing data"))?;
        operands.push(parse_data(arg, addr.register_size)?);
    }
    Ok(Request::Lock {
        op,
        offset: addr.offset,
        operands,
    })
}

fn run(device: &str, request: Request) -> Result<()> {
    let stream = DeviceStream::open(device)?;
    match request {
        Request::Read { offset, length } => {
            let mut engine = TransactionEngine::new(stream);
            let data = engine.read(offset, length)?;
            print!(
                "{}",
                format_data("result: ", &data, data.len() == length as usize)
            );
        }
        Request::Write { offset, data } => {
            let mut engine = TransactionEngine::new(stream);
            engine.write(offset, data)?;
        }
        Request::Broadcast { offset, data } => {
            let mut engine = TransactionEngine::new(stream);
            engine.broadcast(offset, data)?;
        }
        Request::Lock {
            op,
            offset,
            operands,
        } => {
            let mut engine = TransactionEngine::new(stream);
            let old = engine.lock(op, offset, &operands)?;
            print!("{}", format_data("old: ", &old, true));
        }
        Request::Fcp { command } => {
            let mut engine = TransactionEngine::new(stream);
            let response = engine.fcp(command)?;
            print!("{}", format_data("response: ", &response, false));
        }
        Request::Reset(kind) => {
            let mut stream = stream;
            stream.initiate_bus_reset(kind)?;
        }
    }
    Ok(())
}
