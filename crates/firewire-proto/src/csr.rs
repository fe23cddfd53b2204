//! Control and status register map.
//!
//! Well-known addresses in the IEEE-1212 initial register space, as used by
//! the serial bus. Command-line tools accept these names in place of raw
//! addresses; entries marked hidden are resolvable by name but left out of
//! help listings.

/// Base of the initial register space.
pub const REGISTER_BASE: u64 = 0xffff_f000_0000;

/// FCP command frame region (target side).
pub const FCP_COMMAND: u64 = 0xffff_f000_0b00;
/// FCP response frame region (controller side).
pub const FCP_RESPONSE: u64 = 0xffff_f000_0d00;
/// Length of the FCP response region, in bytes.
pub const FCP_RESPONSE_LENGTH: u32 = 0x200;

/// One named register: bus address, width in bytes and listing visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterName {
    /// 48-bit bus address.
    pub address: u64,
    /// Register width in bytes.
    pub size: u32,
    /// Lower-case name accepted on the command line.
    pub name: &'static str,
    /// Excluded from help listings.
    pub hidden: bool,
}

const fn reg(address: u64, size: u32, name: &'static str) -> RegisterName {
    RegisterName { address, size, name, hidden: false }
}

const fn hidden(address: u64, size: u32, name: &'static str) -> RegisterName {
    RegisterName { address, size, name, hidden: true }
}

/// Named registers, ordered by address. 64-bit registers are listed both
/// whole and as `_hi`/`_lo` quadlet halves.
pub static REGISTER_NAMES: [RegisterName; 105] = [
    reg(0xffff_f000_0000, 4, "state_clear"),
    reg(0xffff_f000_0004, 4, "state_set"),
    reg(0xffff_f000_0008, 4, "node_ids"),
    reg(0xffff_f000_000c, 4, "reset_start"),
    reg(0xffff_f000_0018, 8, "split_timeout"),
    reg(0xffff_f000_0018, 4, "split_timeout_hi"),
    reg(0xffff_f000_001c, 4, "split_timeout_lo"),
    hidden(0xffff_f000_0020, 8, "argument"),
    hidden(0xffff_f000_0020, 4, "argument_hi"),
    hidden(0xffff_f000_0024, 4, "argument_lo"),
    hidden(0xffff_f000_0028, 4, "test_start"),
    hidden(0xffff_f000_002c, 4, "test_status"),
    hidden(0xffff_f000_0050, 4, "interrupt_target"),
    hidden(0xffff_f000_0054, 4, "interrupt_mask"),
    reg(0xffff_f000_0080, 64, "message_request"),
    reg(0xffff_f000_00c0, 64, "message_response"),
    hidden(0xffff_f000_0180, 128, "error_log_buffer"),
    reg(0xffff_f000_0200, 4, "cycle_time"),
    reg(0xffff_f000_0204, 4, "bus_time"),
    hidden(0xffff_f000_0208, 4, "power_fail_imminent"),
    hidden(0xffff_f000_020c, 4, "power_source"),
    reg(0xffff_f000_0210, 4, "busy_timeout"),
    hidden(0xffff_f000_0214, 4, "quarantine"),
    reg(0xffff_f000_0218, 4, "priority_budget"),
    reg(0xffff_f000_021c, 4, "bus_manager_id"),
    reg(0xffff_f000_0220, 4, "bandwidth_available"),
    reg(0xffff_f000_0224, 8, "channels_available"),
    reg(0xffff_f000_0224, 4, "channels_available_hi"),
    reg(0xffff_f000_0228, 4, "channels_available_lo"),
    hidden(0xffff_f000_022c, 4, "maint_control"),
    reg(0xffff_f000_0230, 4, "maint_utility"),
    reg(0xffff_f000_0234, 4, "broadcast_channel"),
    reg(0xffff_f000_0400, 0x400, "config_rom"),
    reg(0xffff_f000_0900, 4, "output_master_plug"),
    reg(0xffff_f000_0904, 4, "output_plug0"),
    hidden(0xffff_f000_0908, 4, "output_plug1"),
    hidden(0xffff_f000_090c, 4, "output_plug2"),
    hidden(0xffff_f000_0910, 4, "output_plug3"),
    hidden(0xffff_f000_0914, 4, "output_plug4"),
    hidden(0xffff_f000_0918, 4, "output_plug5"),
    hidden(0xffff_f000_091c, 4, "output_plug6"),
    hidden(0xffff_f000_0920, 4, "output_plug7"),
    hidden(0xffff_f000_0924, 4, "output_plug8"),
    hidden(0xffff_f000_0928, 4, "output_plug9"),
    hidden(0xffff_f000_092c, 4, "output_plug10"),
    hidden(0xffff_f000_0930, 4, "output_plug11"),
    hidden(0xffff_f000_0934, 4, "output_plug12"),
    hidden(0xffff_f000_0938, 4, "output_plug13"),
    hidden(0xffff_f000_093c, 4, "output_plug14"),
    hidden(0xffff_f000_0940, 4, "output_plug15"),
    hidden(0xffff_f000_0944, 4, "output_plug16"),
    hidden(0xffff_f000_0948, 4, "output_plug17"),
    hidden(0xffff_f000_094c, 4, "output_plug18"),
    hidden(0xffff_f000_0950, 4, "output_plug19"),
    hidden(0xffff_f000_0954, 4, "output_plug20"),
    hidden(0xffff_f000_0958, 4, "output_plug21"),
    hidden(0xffff_f000_095c, 4, "output_plug22"),
    hidden(0xffff_f000_0960, 4, "output_plug23"),
    hidden(0xffff_f000_0964, 4, "output_plug24"),
    hidden(0xffff_f000_0968, 4, "output_plug25"),
    hidden(0xffff_f000_096c, 4, "output_plug26"),
    hidden(0xffff_f000_0970, 4, "output_plug27"),
    hidden(0xffff_f000_0974, 4, "output_plug28"),
    hidden(0xffff_f000_0978, 4, "output_plug29"),
    reg(0xffff_f000_097c, 4, "output_plug30"),
    reg(0xffff_f000_0980, 4, "input_master_plug"),
    reg(0xffff_f000_0984, 4, "input_plug0"),
    hidden(0xffff_f000_0988, 4, "input_plug1"),
    hidden(0xffff_f000_098c, 4, "input_plug2"),
    hidden(0xffff_f000_0990, 4, "input_plug3"),
    hidden(0xffff_f000_0994, 4, "input_plug4"),
    hidden(0xffff_f000_0998, 4, "input_plug5"),
    hidden(0xffff_f000_099c, 4, "input_plug6"),
    hidden(0xffff_f000_09a0, 4, "input_plug7"),
    hidden(0xffff_f000_09a4, 4, "input_plug8"),
    hidden(0xffff_f000_09a8, 4, "input_plug9"),
    hidden(0xffff_f000_09ac, 4, "input_plug10"),
    hidden(0xffff_f000_09b0, 4, "input_plug11"),
    hidden(0xffff_f000_09b4, 4, "input_plug12"),
    hidden(0xffff_f000_09b8, 4, "input_plug13"),
    hidden(0xffff_f000_09bc, 4, "input_plug14"),
    hidden(0xffff_f000_09c0, 4, "input_plug15"),
    hidden(0xffff_f000_09c4, 4, "input_plug16"),
    hidden(0xffff_f000_09c8, 4, "input_plug17"),
    hidden(0xffff_f000_09cc, 4, "input_plug18"),
    hidden(0xffff_f000_09d0, 4, "input_plug19"),
    hidden(0xffff_f000_09d4, 4, "input_plug20"),
    hidden(0xffff_f000_09d8, 4, "input_plug21"),
    hidden(0xffff_f000_09dc, 4, "input_plug22"),
    hidden(0xffff_f000_09e0, 4, "input_plug23"),
    hidden(0xffff_f000_09e4, 4, "input_plug24"),
    hidden(0xffff_f000_09e8, 4, "input_plug25"),
    hidden(0xffff_f000_09ec, 4, "input_plug26"),
    hidden(0xffff_f000_09f0, 4, "input_plug27"),
    hidden(0xffff_f000_09f4, 4, "input_plug28"),
    hidden(0xffff_f000_09f8, 4, "input_plug29"),
    reg(0xffff_f000_09fc, 4, "input_plug30"),
    reg(0xffff_f000_0b00, 0x200, "fcp_command"),
    reg(0xffff_f000_0d00, 0x200, "fcp_response"),
    reg(0xffff_f000_1000, 0x400, "topology_map"),
    hidden(0xffff_f000_1c00, 0x200, "virtual_id_map"),
    hidden(0xffff_f000_1e00, 0x100, "route_map"),
    hidden(0xffff_f000_1f00, 8, "clan_eui_64"),
    hidden(0xffff_f000_1f08, 4, "clan_info"),
    hidden(0xffff_f000_2000, 0x1000, "speed_map"),
];

/// Resolves a register by name, case-insensitively. Hidden registers
/// resolve too.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static RegisterName> {
    REGISTER_NAMES
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let r = lookup("Split_Timeout").unwrap();
        assert_eq!(r.address, 0xffff_f000_0018);
        assert_eq!(r.size, 8);
    }

    #[test]
    fn lookup_finds_hidden_registers() {
        let r = lookup("speed_map").unwrap();
        assert!(r.hidden);
        assert_eq!(r.size, 0x1000);
    }

    #[test]
    fn lookup_rejects_unknown_names() {
        assert!(lookup("bogus_register").is_none());
    }

    #[test]
    fn table_is_ordered_by_address() {
        assert!(REGISTER_NAMES.windows(2).all(|w| w[0].address <= w[1].address));
    }

    #[test]
    fn fcp_constants_match_table() {
        assert_eq!(lookup("fcp_command").unwrap().address, FCP_COMMAND);
        let response = lookup("fcp_response").unwrap();
        assert_eq!(response.address, FCP_RESPONSE);
        assert_eq!(response.size, FCP_RESPONSE_LENGTH);
    }

    #[test]
    fn all_registers_sit_above_the_base() {
        assert!(REGISTER_NAMES.iter().all(|r| r.address >= REGISTER_BASE));
    }
}
