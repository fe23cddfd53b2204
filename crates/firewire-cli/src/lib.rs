//! Shared plumbing for the FireWire command-line tools: argument parsing
//! for addresses, lengths and hex data, plus the output formats the tools
//! have in common.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

use anyhow::{bail, Result};
use bytes::Bytes;
use firewire_proto::csr;
use firewire_proto::phy;
use firewire_proto::self_id::SelfId;

/// An address argument: the bus offset plus, when the argument was given
/// by register name, that register's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    /// 48-bit bus address.
    pub offset: u64,
    /// Register width in bytes when the address came from the name table.
    pub register_size: Option<u32>,
}

/// Parses an address argument: hex digits, or a register name from the
/// CSR table (matched case-insensitively).
pub fn parse_address(arg: &str) -> Result<Address> {
    if let Some(offset) = parse_hex(arg) {
        return Ok(Address {
            offset,
            register_size: None,
        });
    }
    if let Some(reg) = csr::lookup(arg) {
        return Ok(Address {
            offset: reg.address,
            register_size: Some(reg.size),
        });
    }
    bail!("invalid address: `{arg}'");
}

/// Parses a transfer length argument, in hex.
pub fn parse_length(arg: &str) -> Result<u32> {
    match parse_hex(arg).and_then(|l| u32::try_from(l).ok()) {
        Some(length) => Ok(length),
        None => bail!("invalid length: `{arg}'"),
    }
}

/// Parses an integer argument with `strtol`-style base detection: `0x`
/// means hex, a leading zero octal, anything else decimal. `None` on any
/// stray character; the caller supplies the diagnostic.
pub fn parse_int(arg: &str) -> Option<u32> {
    if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if arg.len() > 1 && arg.starts_with('0') {
        u32::from_str_radix(&arg[1..], 8).ok()
    } else {
        arg.parse().ok()
    }
}

fn parse_hex(arg: &str) -> Option<u64> {
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    u64::from_str_radix(digits, 16).ok()
}

/// Parses a hex data argument into bytes. A leading `0x` is ignored, and
/// whitespace or `_` may separate digits. When the transaction targets a
/// named register of up to eight bytes, the data must match its size
/// exactly.
pub fn parse_data(arg: &str, register_size: Option<u32>) -> Result<Bytes> {
    let mut digits = arg.trim_start();
    if let Some(rest) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        digits = rest;
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2 + 1);
    let mut high: Option<u8> = None;
    for c in digits.chars() {
        if c.is_whitespace() || c == '_' {
            continue;
        }
        let Some(nibble) = c.to_digit(16) else {
            bail!("invalid character in data: `{c}'");
        };
        match high.take() {
            None => high = Some((nibble as u8) << 4),
            Some(h) => bytes.push(h | nibble as u8),
        }
    }
    if high.is_some() {
        bail!("data ends in a half byte");
    }
    if let Some(size) = register_size {
        if size <= 8 && bytes.len() != size as usize {
            bail!("data for this register must have {} bits", size * 8);
        }
    }
    Ok(Bytes::from(bytes))
}

/// Formats payload bytes the way the tools print them. With `allow_value`,
/// 32- and 64-bit payloads render as one big-endian hex number; everything
/// else renders as a hex dump, 16 bytes per line with an ASCII gutter, the
/// prefix repeated on every line. Lines end in `\n`; empty data formats as
/// the empty string.
pub fn format_data(prefix: &str, data: &[u8], allow_value: bool) -> String {
    if allow_value && data.len() == 4 {
        let value = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        return format!("{prefix}{value:08x}\n");
    }
    if allow_value && data.len() == 8 {
        let hi = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let lo = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        return format!("{prefix}{hi:08x}{lo:08x}\n");
    }

    let mut out = String::new();
    for (line, chunk) in data.chunks(16).enumerate() {
        out.push_str(&format!("{prefix}{:03x}:", line * 16));
        for byte in chunk {
            out.push_str(&format!(" {byte:02x}"));
        }
        out.push_str(&" ".repeat(1 + (16 - chunk.len()) * 3));
        for &byte in chunk {
            out.push(if (32..127).contains(&byte) {
                char::from(byte)
            } else {
                '.'
            });
        }
        out.push('\n');
    }
    out
}

/// Renders the register-name table: address, size in hex and name, one row
/// per register. Unless `verbose`, 64-bit registers collapse with their
/// `_hi`/`_lo` quadlet halves into a single row and hidden registers are
/// left out.
pub fn format_register_table(verbose: bool) -> String {
    let names = &csr::REGISTER_NAMES;
    let mut out = String::from("address    length name\n");
    let mut i = 0;
    while i < names.len() {
        let reg = &names[i];
        if reg.hidden && !verbose {
            i += 1;
            continue;
        }
        let folded = !verbose && i + 2 < names.len() && names[i].address == names[i + 1].address;
        out.push_str(&format!(
            "{:012x} {:4x} {}{}\n",
            reg.address,
            reg.size,
            reg.name,
            if folded { "[_hi|_lo]" } else { "" },
        ));
        i += if folded { 3 } else { 1 };
    }
    out
}

/// Renders a ping result: the round-trip time in PHY clock ticks and
/// nanoseconds, followed by the decoded Self-ID fields and port states.
pub fn format_ping_reply(ticks: u32, id: &SelfId) -> String {
    let ports: String = id.ports.iter().map(|p| p.symbol()).collect();
    format!(
        "time: {ticks} ticks ({} ns), selfID: phy {} {} gc={} {} {}{}{} [{ports}]",
        phy::ping_ticks_to_nanos(ticks),
        id.phy_id,
        id.speed,
        id.gap_count,
        id.power,
        if id.link_active { "L" } else { "" },
        if id.contender { "c" } else { "" },
        if id.initiated_reset { "i" } else { "" },
    )
}
