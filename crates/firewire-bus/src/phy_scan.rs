//! Remote PHY register scanning.

use std::time::Duration;

use firewire_proto::phy::{self, PhyPacket};

use crate::engine::TransactionEngine;
use crate::error::{FwError, Result};
use crate::event::Event;
use crate::stream::EventSource;

/// Poll deadline while collecting scan replies.
const SCAN_POLL: Duration = Duration::from_millis(123);

/// Bit set for registers 2 through 7.
const ALL_REGISTERS: u32 = 0xfc;

/// Reads page-1 registers 2 through 7 of `phy_id`: the six bytes of the
/// vendor OUI and product id.
///
/// All six requests go out back to back; replies are collected in whatever
/// order they come. A PHY that stays silent runs the collection into a
/// `Timeout`, which callers scanning a whole bus treat as that node's
/// result rather than a fatal condition.
pub fn scan_phy_registers<S: EventSource>(
    engine: &mut TransactionEngine<S>,
    phy_id: u32,
) -> Result<[u8; 6]> {
    engine.ensure_phy_listening()?;
    for register in 2..=7 {
        let request = phy::remote_access_paged(phy_id, 1, 0, register);
        engine.submit_phy(PhyPacket::symmetric(request))?;
    }

    let reply_bits = phy::remote_reply_paged(phy_id, 1, 0);
    let mut values = [0u8; 6];
    let mut collected = 0u32;
    while collected != ALL_REGISTERS {
        let Some(event) = engine.next_event(SCAN_POLL)? else {
            return Err(FwError::Timeout {
                waiting: "PHY register replies",
            });
        };
        match event {
            Event::BusReset(reset) => {
                engine.record_bus_reset(reset.generation);
                // TODO: restart the interrupted scan instead of giving up
                return Err(FwError::BusReset);
            }
            Event::PhyPacketSent(sent) => {
                if !sent.rcode.is_complete() {
                    return Err(FwError::PhySendFailed { rcode: sent.rcode });
                }
            }
            Event::PhyPacketReceived(received) => {
                if received.quadlets.len() == 2
                    && received.quadlets[0] & phy::SCAN_REPLY_MASK == reply_bits
                {
                    let register = phy::reply_register(received.quadlets[0]);
                    if register >= 2 {
                        values[register as usize - 2] = phy::reply_value(received.quadlets[0]);
                        collected |= 1 << register;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PhyPacketEvent;
    use crate::testing::{ScriptedStream, Submission};
    use firewire_proto::rcode::Rcode;

    fn reply(phy_id: u32, register: u32, value: u8) -> Event {
        let q = phy::remote_reply_paged(phy_id, 1, 0) | (register << 8) | u32::from(value);
        Event::PhyPacketReceived(PhyPacketEvent {
            rcode: Rcode::Complete,
            quadlets: vec![q, !q],
        })
    }

    fn sent(rcode: Rcode) -> Event {
        Event::PhyPacketSent(PhyPacketEvent {
            rcode,
            quadlets: vec![],
        })
    }

    #[test]
    fn collects_all_six_registers_in_any_order() {
        let mut stream = ScriptedStream::new(3);
        for _ in 0..6 {
            stream = stream.with_event(sent(Rcode::Complete));
        }
        for (register, value) in [(7, 0x66), (2, 0x11), (5, 0x44), (3, 0x22), (6, 0x55), (4, 0x33)]
        {
            stream = stream.with_event(reply(9, register, value));
        }
        let mut engine = TransactionEngine::new(stream);
        let values = scan_phy_registers(&mut engine, 9).unwrap();
        assert_eq!(values, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    }

    #[test]
    fn submits_one_read_per_register() {
        let mut stream = ScriptedStream::new(3);
        for register in 2..=7 {
            stream = stream
                .with_event(sent(Rcode::Complete))
                .with_event(reply(4, register, register as u8));
        }
        let mut engine = TransactionEngine::new(stream);
        scan_phy_registers(&mut engine, 4).unwrap();

        let submissions = engine.source().submissions();
        assert!(matches!(submissions[0], Submission::ListenPhy));
        for (i, register) in (2..=7).enumerate() {
            match &submissions[i + 1] {
                Submission::Phy { d0, generation, .. } => {
                    assert_eq!(*d0, phy::remote_access_paged(4, 1, 0, register));
                    assert_eq!(*generation, 3);
                }
                other => panic!("unexpected submission {other:?}"),
            }
        }
    }

    #[test]
    fn missing_register_times_out() {
        let mut stream = ScriptedStream::new(3);
        for register in 2..=6 {
            stream = stream.with_event(reply(9, register, 0xaa));
        }
        let mut engine = TransactionEngine::new(stream);
        let err = scan_phy_registers(&mut engine, 9).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn failed_send_is_fatal() {
        let stream = ScriptedStream::new(3).with_event(sent(Rcode::Busy));
        let mut engine = TransactionEngine::new(stream);
        let err = scan_phy_registers(&mut engine, 9).unwrap_err();
        assert_eq!(err.to_string(), "PHY packet failed: rcode 18");
    }

    #[test]
    fn replies_from_other_nodes_are_ignored() {
        let mut stream = ScriptedStream::new(3);
        for register in 2..=7 {
            stream = stream.with_event(reply(8, register, 0xff));
        }
        let mut engine = TransactionEngine::new(stream);
        let err = scan_phy_registers(&mut engine, 9).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn bus_reset_aborts_the_scan() {
        let stream = ScriptedStream::new(3).with_event(Event::BusReset(crate::event::BusResetEvent {
            node_id: 0xffc0,
            local_node_id: 0xffc0,
            root_node_id: 0xffc1,
            generation: 4,
        }));
        let mut engine = TransactionEngine::new(stream);
        let err = scan_phy_registers(&mut engine, 9).unwrap_err();
        assert_eq!(err.to_string(), "bus reset");
        assert_eq!(engine.generation(), 4);
    }
}
