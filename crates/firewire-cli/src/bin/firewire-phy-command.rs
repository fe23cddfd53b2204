//! `firewire-phy-command` — send PHY packets on a FireWire bus.
//!
//! ```text
//! USAGE:
//!   firewire-phy-command [-b BUS] config [root <node>] [gapcount <count>]
//!   firewire-phy-command [-b BUS] ping <node>
//!   firewire-phy-command [-b BUS] read <node> <register>
//!   firewire-phy-command [-b BUS] read <node> <page> <port> <register>
//!   firewire-phy-command [-b BUS] <portcmd> <node> <port>
//!   firewire-phy-command [-b BUS] resume
//!   firewire-phy-command [-b BUS] linkon <node>
//!   firewire-phy-command [-b BUS] versaphy <quadlet0> <quadlet1>
//!   firewire-phy-command [-b BUS] reset
//! ```
//!
//! `<node>` is a PHY id, or a device file whose bus is then used. Port
//! commands are nop, disable, suspend, clear, enable, resume, standby and
//! restore; `resume` without parameters resumes all ports of the local
//! PHY.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use firewire_bus::{BusResetKind, DeviceStream, NodeDirectory, NodeInfo, TransactionEngine};
use firewire_cli::{format_ping_reply, parse_int};
use firewire_proto::phy::{self, PhyPacket, RemoteCommand};
use firewire_proto::self_id::SelfId;

#[derive(Parser)]
#[command(
    name = "firewire-phy-command",
    about = "Send PHY packets on a FireWire bus",
    version
)]
struct Cli {
    /// Bus to use: a card number, or a device file of any node on it.
    #[arg(short, long, value_name = "bus")]
    bus: Option<String>,

    /// Command and its parameters.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

enum Verb {
    Config,
    Ping,
    Read,
    Port(RemoteCommand),
    Resume,
    LinkOn,
    VersaPhy,
    Reset,
}

/// Node directory plus the local node picked by `--bus`. Commands that
/// name their target by device file switch to that device's bus.
struct Session<'a> {
    directory: &'a NodeDirectory,
    local: &'a NodeInfo,
}

impl Session<'_> {
    fn target(&self, spec: &str) -> Result<(u32, &NodeInfo)> {
        let target = self.directory.resolve_target(spec)?;
        let local = match target.card {
            Some(card) if card != self.local.card => self.directory.local_node_for_card(card)?,
            _ => self.local,
        };
        Ok((target.phy_id, local))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let Some((command, params)) = cli.args.split_first() else {
        bail!("missing command");
    };
    let verb = match command.as_str() {
        "config" => Verb::Config,
        "ping" => Verb::Ping,
        "read" => Verb::Read,
        "nop" => Verb::Port(RemoteCommand::Nop),
        "disable" => Verb::Port(RemoteCommand::Disable),
        "suspend" => Verb::Port(RemoteCommand::Suspend),
        "clear" => Verb::Port(RemoteCommand::Clear),
        "enable" => Verb::Port(RemoteCommand::Enable),
        "resume" => Verb::Resume,
        "standby" => Verb::Port(RemoteCommand::Standby),
        "restore" => Verb::Port(RemoteCommand::Restore),
        "linkon" | "link-on" | "link_on" => Verb::LinkOn,
        "versaphy" => Verb::VersaPhy,
        "reset" => Verb::Reset,
        _ => bail!("unknown command `{command}'"),
    };

    let directory = NodeDirectory::discover()?;
    let local = directory.local_node(cli.bus.as_deref())?;
    let session = Session {
        directory: &directory,
        local,
    };
    tracing::debug!("local node {} on card {}", local.path.display(), local.card);

    match verb {
        Verb::Config => cmd_config(&session, params),
        Verb::Ping => cmd_ping(&session, params),
        Verb::Read => cmd_read(&session, params),
        Verb::Port(command) => cmd_port(&session, command, params),
        Verb::Resume => cmd_resume(&session, params),
        Verb::LinkOn => cmd_linkon(&session, params),
        Verb::VersaPhy => cmd_versaphy(&session, params),
        Verb::Reset => cmd_reset(&session, params),
    }
}

fn cmd_config(session: &Session<'_>, params: &[String]) -> Result<()> {
    if params.is_empty() {
        bail!("missing configuration parameter");
    }

    let mut local = session.local;
    let mut root = None;
    let mut gap_count = None;
    let mut words = params.iter();
    while let Some(word) = words.next() {
        match word.as_str() {
            "root" => {
                let Some(spec) = words.next() else {
                    bail!("no root node specified");
                };
                let (phy_id, picked) = session.target(spec)?;
                root = Some(phy_id);
                local = picked;
            }
            "gapcount" => {
                let Some(arg) = words.next() else {
                    bail!("no gap count specified");
                };
                let Some(gap) = parse_int(arg) else {
                    bail!("gap count is not a number");
                };
                if gap > 63 {
                    bail!("gap count out of range");
                }
                gap_count = Some(gap);
            }
            other => bail!("unknown configuration parameter `{other}'"),
        }
    }

    let mut engine = open_engine(local)?;
    phy_result(engine.send_phy(PhyPacket::symmetric(phy::config(root, gap_count))))
}

fn cmd_ping(session: &Session<'_>, params: &[String]) -> Result<()> {
    let (phy_id, local, rest) = node_param(session, params)?;
    expect_no_more(rest)?;

    let mut engine = open_engine(local)?;
    let reply = phy_result(engine.exchange_phy(
        PhyPacket::symmetric(phy::ping(phy_id)),
        phy::PING_REPLY_MASK,
        phy::ping_reply_bits(phy_id),
    ))?;
    let id = SelfId::decode(&reply.self_ids)
        .ok_or_else(|| anyhow!("malformed self ID from phy {phy_id}"))?;
    println!(
        "{}",
        format_ping_reply(reply.roundtrip_ticks.unwrap_or(0), &id)
    );
    Ok(())
}

fn cmd_read(session: &Session<'_>, params: &[String]) -> Result<()> {
    let (phy_id, local, rest) = node_param(session, params)?;

    let packet = match rest {
        [] | [_, _] => bail!("missing register number"),
        [reg] => {
            let Some(reg) = parse_int(reg) else {
                bail!("invalid register number");
            };
            if reg > 7 {
                bail!("register number out of range");
            }
            phy::remote_access(phy_id, reg)
        }
        [page, port, reg, extra @ ..] => {
            let Some(page) = parse_int(page) else {
                bail!("invalid page number");
            };
            if page > 7 {
                bail!("page number out of range");
            }
            let Some(port) = parse_int(port) else {
                bail!("invalid port number");
            };
            if port > 15 {
                bail!("port number out of range");
            }
            let Some(reg) = parse_int(reg) else {
                bail!("invalid register number");
            };
            if !(8..=15).contains(&reg) {
                bail!("register number out of range");
            }
            expect_no_more(extra)?;
            phy::remote_access_paged(phy_id, page, port, reg)
        }
    };

    let mut engine = open_engine(local)?;
    let reply = phy_result(engine.exchange_phy(
        PhyPacket::symmetric(packet),
        phy::REMOTE_REPLY_MASK,
        phy::remote_reply_bits(packet),
    ))?;
    println!("value: 0x{:02x}", phy::reply_value(reply.response));
    Ok(())
}

fn cmd_port(session: &Session<'_>, command: RemoteCommand, params: &[String]) -> Result<()> {
    let (phy_id, local, rest) = node_param(session, params)?;
    let Some(port_arg) = rest.first() else {
        bail!("missing port number");
    };
    let Some(port) = parse_int(port_arg) else {
        bail!("invalid port number");
    };
    if port > 15 {
        bail!("port number out of range");
    }
    expect_no_more(&rest[1..])?;

    let mut engine = open_engine(local)?;
    let reply = phy_result(engine.exchange_phy(
        PhyPacket::symmetric(phy::remote_command(phy_id, port, command)),
        phy::REMOTE_CONFIRMATION_MASK,
        phy::remote_confirmation_bits(phy_id, port, command),
    ))?;
    print_port_status(reply.response);
    Ok(())
}

fn cmd_resume(session: &Session<'_>, params: &[String]) -> Result<()> {
    if params.is_empty() {
        let mut engine = open_engine(session.local)?;
        return phy_result(
            engine.send_phy(PhyPacket::symmetric(phy::resume_all(
                session.local.phy_id(),
            ))),
        );
    }
    cmd_port(session, RemoteCommand::Resume, params)
}

fn cmd_linkon(session: &Session<'_>, params: &[String]) -> Result<()> {
    let (phy_id, local, rest) = node_param(session, params)?;
    expect_no_more(rest)?;

    let mut engine = open_engine(local)?;
    phy_result(engine.send_phy(PhyPacket::symmetric(phy::link_on(phy_id))))
}

fn cmd_versaphy(session: &Session<'_>, params: &[String]) -> Result<()> {
    let (Some(first), Some(second)) = (params.first(), params.get(1)) else {
        bail!("missing data");
    };
    let q0 = parse_quadlet(first)?;
    let q1 = parse_quadlet(second)?;
    if !phy::is_versaphy(q0) {
        bail!("not a VersaPHY packet");
    }
    expect_no_more(&params[2..])?;

    let mut engine = open_engine(session.local)?;
    phy_result(engine.send_phy(PhyPacket::raw(q0, q1)))
}

fn cmd_reset(session: &Session<'_>, params: &[String]) -> Result<()> {
    expect_no_more(params)?;
    let mut stream = DeviceStream::open(&session.local.path)?;
    stream.initiate_bus_reset(BusResetKind::Short)?;
    Ok(())
}

fn node_param<'s>(
    session: &'s Session<'_>,
    params: &'s [String],
) -> Result<(u32, &'s NodeInfo, &'s [String])> {
    let Some((spec, rest)) = params.split_first() else {
        bail!("missing destination node");
    };
    let (phy_id, local) = session.target(spec)?;
    Ok((phy_id, local, rest))
}

fn expect_no_more(rest: &[String]) -> Result<()> {
    if let Some(extra) = rest.first() {
        bail!("unexpected parameter `{extra}'");
    }
    Ok(())
}

fn open_engine(node: &NodeInfo) -> Result<TransactionEngine<DeviceStream>> {
    Ok(TransactionEngine::new(DeviceStream::open(&node.path)?))
}

/// PHY exchanges report any expiry as a bare timeout.
fn phy_result<T>(result: firewire_bus::Result<T>) -> Result<T> {
    result.map_err(|err| {
        if err.is_timeout() {
            anyhow!("timeout")
        } else {
            err.into()
        }
    })
}

fn parse_quadlet(arg: &str) -> Result<u32> {
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    u32::from_str_radix(digits, 16).map_err(|_| anyhow!("invalid data quadlet"))
}

fn print_port_status(response: u32) {
    use firewire_proto::phy::port_status;

    if response & port_status::OK == 0 {
        println!("command rejected");
    } else if response & port_status::CONDITIONS == 0 {
        println!("port status: ok");
    } else {
        println!(
            "port status:{}{}{}{}{}",
            flag(response, port_status::DISABLED, " disabled"),
            flag(response, port_status::BIAS, " bias"),
            flag(response, port_status::CONNECTED, " connected"),
            flag(response, port_status::FAULT, " fault"),
            flag(response, port_status::STANDBY_FAULT, " standby_fault"),
        );
    }
}

fn flag(response: u32, bit: u32, label: &'static str) -> &'static str {
    if response & bit != 0 {
        label
    } else {
        ""
    }
}
