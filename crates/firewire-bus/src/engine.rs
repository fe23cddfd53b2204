//! Transaction sequencing.
//!
//! [`TransactionEngine`] owns an event source and tracks the bus generation
//! across resets. Async transactions are stamped with the current generation
//! and resubmitted when the response says they raced a reset; PHY exchanges
//! are matched against a `(mask, bits)` reply pattern.

use std::time::Duration;

use bytes::Bytes;
use firewire_proto::csr;
use firewire_proto::phy::PhyPacket;
use firewire_proto::rcode::Rcode;
use firewire_proto::self_id::{self, SelfIdChain};
use firewire_proto::tcode;

use crate::error::{FwError, Result};
use crate::event::{Event, ResponseEvent};
use crate::lock::{encode_operands, LockOp};
use crate::stream::EventSource;

/// Poll deadline for PHY packet exchanges.
const PHY_POLL: Duration = Duration::from_millis(100);
/// Poll deadline for async transactions.
const ASYNC_POLL: Duration = Duration::from_millis(123);

/// One outbound async request, ready for submission.
#[derive(Debug, Clone)]
pub struct AsyncRequest {
    /// Transaction code, plain or extended lock.
    pub tcode: u32,
    /// 48-bit destination offset.
    pub offset: u64,
    /// Request payload; empty for reads.
    pub data: Bytes,
    /// Payload length, or the expected response length for reads.
    pub length: u32,
    /// Bus generation stamp.
    pub generation: u32,
    /// Send to the broadcast node id instead of the target's.
    pub broadcast: bool,
}

/// Outcome of a PHY exchange that waited for a reply.
#[derive(Debug, Clone)]
pub struct PhyReply {
    /// Last reply quadlet that matched the pattern.
    pub response: u32,
    /// Round-trip time in PHY clock ticks, when the card reports one.
    pub roundtrip_ticks: Option<u32>,
    /// Self-ID packets accumulated when the reply was a Self-ID burst.
    pub self_ids: SelfIdChain,
}

/// Sequences transactions over an [`EventSource`].
#[derive(Debug)]
pub struct TransactionEngine<S> {
    source: S,
    generation: u32,
    phy_listening: bool,
}

impl<S: EventSource> TransactionEngine<S> {
    /// Wraps an event source, adopting its generation.
    pub fn new(source: S) -> Self {
        let generation = source.initial_generation();
        Self {
            source,
            generation,
            phy_listening: false,
        }
    }

    /// Bus generation the engine currently stamps requests with.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    // ── PHY packets ──────────────────────────────────────────────────────────

    /// Sends a PHY packet and waits for the bus to acknowledge it. No reply
    /// is expected.
    pub fn send_phy(&mut self, packet: PhyPacket) -> Result<()> {
        self.phy_exchange(packet, None).map(drop)
    }

    /// Sends a PHY packet and waits for both the acknowledgment and a reply
    /// quadlet `q` with `q & mask == bits`. A Self-ID reply is collected to
    /// the end of its chain.
    pub fn exchange_phy(&mut self, packet: PhyPacket, mask: u32, bits: u32) -> Result<PhyReply> {
        self.phy_exchange(packet, Some((mask, bits)))
    }

    fn phy_exchange(
        &mut self,
        packet: PhyPacket,
        matcher: Option<(u32, u32)>,
    ) -> Result<PhyReply> {
        if matcher.is_some() {
            self.ensure_phy_listening()?;
        }
        self.source.submit_phy(packet, self.generation)?;

        let mut awaiting_ack = true;
        let mut awaiting_reply = matcher.is_some();
        let mut response = 0;
        let mut roundtrip_ticks = None;
        let mut self_ids = SelfIdChain::new();

        while awaiting_ack || awaiting_reply {
            let Some(event) = self.source.next_event(PHY_POLL)? else {
                return Err(FwError::Timeout {
                    waiting: if awaiting_ack {
                        "acknowledgment"
                    } else {
                        "PHY response"
                    },
                });
            };
            match event {
                Event::BusReset(reset) => {
                    self.generation = reset.generation;
                    return Err(FwError::BusReset);
                }
                Event::PhyPacketSent(sent) => {
                    awaiting_ack = false;
                    if let Some(&ticks) = sent.quadlets.first() {
                        roundtrip_ticks = Some(ticks);
                    }
                }
                Event::PhyPacketReceived(received) if awaiting_reply => {
                    let Some((mask, bits)) = matcher else { break };
                    let Some(&q) = received.quadlets.first() else {
                        continue;
                    };
                    if q & mask == bits {
                        response = q;
                        awaiting_reply = if self_id::is_self_id(q) {
                            self_ids.push(q)
                        } else {
                            false
                        };
                    }
                }
                _ => {}
            }
        }

        Ok(PhyReply {
            response,
            roundtrip_ticks,
            self_ids,
        })
    }

    // ── Async transactions ───────────────────────────────────────────────────

    /// Reads `length` bytes from `offset`, picking the quadlet or block
    /// tcode by size and alignment.
    ///
    /// # Errors
    ///
    /// `Remote` carries the peer's response code when it is not COMPLETE.
    pub fn read(&mut self, offset: u64, length: u32) -> Result<Bytes> {
        let tcode = tcode::read_tcode(offset, length as usize);
        let response = self.transact(tcode, offset, Bytes::new(), length, false)?;
        Ok(Self::completed(response)?.data)
    }

    /// Writes `data` to `offset`.
    pub fn write(&mut self, offset: u64, data: Bytes) -> Result<()> {
        self.write_request(offset, data, false)
    }

    /// Writes `data` to `offset` on every node at once. Only the local
    /// bus's acknowledgment is reported; broadcast writes draw no response.
    pub fn broadcast(&mut self, offset: u64, data: Bytes) -> Result<()> {
        self.write_request(offset, data, true)
    }

    fn write_request(&mut self, offset: u64, data: Bytes, broadcast: bool) -> Result<()> {
        let tcode = tcode::write_tcode(offset, data.len());
        let length = payload_length(&data)?;
        let response = self.transact(tcode, offset, data, length, broadcast)?;
        Self::completed(response).map(drop)
    }

    /// Runs a lock transaction and returns the previous value at `offset`.
    pub fn lock(&mut self, op: LockOp, offset: u64, operands: &[Bytes]) -> Result<Bytes> {
        let payload = encode_operands(op, operands)?;
        let length = payload_length(&payload)?;
        let response = self.transact(op.tcode(), offset, payload, length, false)?;
        Ok(Self::completed(response)?.data)
    }

    /// Sends one FCP command frame to the target's command register and
    /// collects the response frame the target writes back, answering that
    /// write on the bus. Returns the response frame.
    pub fn fcp(&mut self, command: Bytes) -> Result<Bytes> {
        self.source
            .allocate_range(csr::FCP_RESPONSE, csr::FCP_RESPONSE_LENGTH)?;

        let length = payload_length(&command)?;
        let request = AsyncRequest {
            tcode: tcode::write_tcode(csr::FCP_COMMAND, command.len()),
            offset: csr::FCP_COMMAND,
            data: command,
            length,
            generation: self.generation,
            broadcast: false,
        };
        self.source.submit_async(&request)?;

        let mut acknowledged = false;
        let mut reply: Option<Bytes> = None;
        loop {
            if acknowledged {
                if let Some(data) = reply.take() {
                    return Ok(data);
                }
            }
            let Some(event) = self.source.next_event(ASYNC_POLL)? else {
                return Err(FwError::Timeout {
                    waiting: if acknowledged { "no response" } else { "no ack" },
                });
            };
            match event {
                Event::BusReset(reset) => {
                    self.generation = reset.generation;
                    return Err(FwError::BusReset);
                }
                Event::Response(response) => {
                    if !response.rcode.is_complete() {
                        return Err(FwError::Remote {
                            rcode: response.rcode,
                        });
                    }
                    acknowledged = true;
                }
                Event::Request(request) => {
                    self.source
                        .submit_response(request.handle, Rcode::Complete.as_raw())?;
                    reply = Some(request.data);
                }
                _ => {}
            }
        }
    }

    /// Submits a request and waits out its response, restamping and
    /// resubmitting when the bus generation moved underneath it.
    fn transact(
        &mut self,
        tcode: u32,
        offset: u64,
        data: Bytes,
        length: u32,
        broadcast: bool,
    ) -> Result<ResponseEvent> {
        let mut request = AsyncRequest {
            tcode,
            offset,
            data,
            length,
            generation: self.generation,
            broadcast,
        };
        loop {
            self.source.submit_async(&request)?;
            let response = self.wait_for_response()?;
            if response.rcode == Rcode::Generation {
                tracing::debug!(
                    generation = self.generation,
                    "request raced a bus reset, resubmitting"
                );
                request.generation = self.generation;
                continue;
            }
            return Ok(response);
        }
    }

    fn wait_for_response(&mut self) -> Result<ResponseEvent> {
        loop {
            let Some(event) = self.source.next_event(ASYNC_POLL)? else {
                return Err(FwError::Timeout { waiting: "no ack" });
            };
            match event {
                Event::Response(response) => return Ok(response),
                Event::BusReset(reset) => {
                    self.generation = reset.generation;
                    tracing::debug!(generation = reset.generation, "bus reset while waiting");
                }
                _ => {}
            }
        }
    }

    fn completed(response: ResponseEvent) -> Result<ResponseEvent> {
        if response.rcode.is_complete() {
            Ok(response)
        } else {
            Err(FwError::Remote {
                rcode: response.rcode,
            })
        }
    }

    // ── Scan plumbing ────────────────────────────────────────────────────────

    pub(crate) fn ensure_phy_listening(&mut self) -> Result<()> {
        if !self.phy_listening {
            self.source.listen_phy()?;
            self.phy_listening = true;
        }
        Ok(())
    }

    pub(crate) fn submit_phy(&mut self, packet: PhyPacket) -> Result<()> {
        self.source.submit_phy(packet, self.generation)
    }

    pub(crate) fn next_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        self.source.next_event(timeout)
    }

    pub(crate) fn record_bus_reset(&mut self, generation: u32) {
        self.generation = generation;
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }
}

fn payload_length(data: &Bytes) -> Result<u32> {
    u32::try_from(data.len()).map_err(|_| FwError::invalid_argument("data too long"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BusResetEvent, PhyPacketEvent, RequestEvent, ResponseEvent};
    use crate::testing::{ScriptedStream, Submission};
    use firewire_proto::phy;

    fn response(rcode: Rcode, data: &'static [u8]) -> Event {
        Event::Response(ResponseEvent {
            rcode,
            data: Bytes::from_static(data),
        })
    }

    fn bus_reset(generation: u32) -> Event {
        Event::BusReset(BusResetEvent {
            node_id: 0xffc0,
            local_node_id: 0xffc0,
            root_node_id: 0xffc1,
            generation,
        })
    }

    fn phy_sent(quadlets: &[u32]) -> Event {
        Event::PhyPacketSent(PhyPacketEvent {
            rcode: Rcode::Complete,
            quadlets: quadlets.to_vec(),
        })
    }

    fn phy_received(quadlets: &[u32]) -> Event {
        Event::PhyPacketReceived(PhyPacketEvent {
            rcode: Rcode::Complete,
            quadlets: quadlets.to_vec(),
        })
    }

    #[test]
    fn read_completes_on_first_response() {
        let stream = ScriptedStream::new(5)
            .with_event(response(Rcode::Complete, &[0xde, 0xad, 0xbe, 0xef]));
        let mut engine = TransactionEngine::new(stream);
        let data = engine.read(0xffff_f000_0404, 4).unwrap();
        assert_eq!(&data[..], &[0xde, 0xad, 0xbe, 0xef]);

        let submissions = engine.source().submissions();
        assert_eq!(submissions.len(), 1);
        match &submissions[0] {
            Submission::Async {
                tcode, generation, ..
            } => {
                assert_eq!(*tcode, tcode::READ_QUADLET_REQUEST);
                assert_eq!(*generation, 5);
            }
            other => panic!("unexpected submission {other:?}"),
        }
    }

    #[test]
    fn generation_mismatch_resubmits_with_new_stamp() {
        let stream = ScriptedStream::new(5)
            .with_event(bus_reset(6))
            .with_event(response(Rcode::Generation, &[]))
            .with_event(response(Rcode::Generation, &[]))
            .with_event(bus_reset(7))
            .with_event(response(Rcode::Complete, &[0, 0, 0, 1]));
        let mut engine = TransactionEngine::new(stream);
        let data = engine.read(0xffff_f000_0000, 4).unwrap();
        assert_eq!(&data[..], &[0, 0, 0, 1]);

        let stamps: Vec<u32> = engine
            .source
            .submissions()
            .iter()
            .map(|s| match s {
                Submission::Async { generation, .. } => *generation,
                other => panic!("unexpected submission {other:?}"),
            })
            .collect();
        assert_eq!(stamps, [5, 6, 7]);
    }

    #[test]
    fn busy_response_is_an_error_without_retry() {
        let stream = ScriptedStream::new(1).with_event(response(Rcode::Busy, &[]));
        let mut engine = TransactionEngine::new(stream);
        let err = engine
            .write(0xffff_f000_0008, Bytes::from_static(&[0; 4]))
            .unwrap_err();
        assert_eq!(err.to_string(), "error: busy");
        assert_eq!(engine.source().submissions().len(), 1);
    }

    #[test]
    fn empty_queue_times_out() {
        let stream = ScriptedStream::new(1);
        let mut engine = TransactionEngine::new(stream);
        let err = engine.read(0xffff_f000_0000, 4).unwrap_err();
        assert_eq!(err.to_string(), "timeout (no ack)");
    }

    #[test]
    fn write_uses_block_tcode_for_long_payloads() {
        let stream = ScriptedStream::new(1).with_event(response(Rcode::Complete, &[]));
        let mut engine = TransactionEngine::new(stream);
        engine
            .write(0xffff_f000_0400, Bytes::from_static(&[0; 12]))
            .unwrap();
        match &engine.source().submissions()[0] {
            Submission::Async { tcode, length, .. } => {
                assert_eq!(*tcode, tcode::WRITE_BLOCK_REQUEST);
                assert_eq!(*length, 12);
            }
            other => panic!("unexpected submission {other:?}"),
        }
    }

    #[test]
    fn broadcast_goes_out_as_broadcast() {
        let stream = ScriptedStream::new(1).with_event(response(Rcode::Complete, &[]));
        let mut engine = TransactionEngine::new(stream);
        engine
            .broadcast(0xffff_f000_0f00, Bytes::from_static(&[1, 2, 3, 4]))
            .unwrap();
        match &engine.source().submissions()[0] {
            Submission::Async { broadcast, .. } => assert!(broadcast),
            other => panic!("unexpected submission {other:?}"),
        }
    }

    #[test]
    fn lock_returns_previous_value() {
        let stream =
            ScriptedStream::new(1).with_event(response(Rcode::Complete, &[0xca, 0xfe, 0, 1]));
        let mut engine = TransactionEngine::new(stream);
        let old = engine
            .lock(
                LockOp::CompareSwap,
                0xffff_f000_021c,
                &[
                    Bytes::from_static(&[0xca, 0xfe, 0, 1]),
                    Bytes::from_static(&[0, 0, 0, 2]),
                ],
            )
            .unwrap();
        assert_eq!(&old[..], &[0xca, 0xfe, 0, 1]);
        match &engine.source().submissions()[0] {
            Submission::Async { tcode, length, .. } => {
                assert_eq!(*tcode, tcode::LOCK_COMPARE_SWAP);
                assert_eq!(*length, 8);
            }
            other => panic!("unexpected submission {other:?}"),
        }
    }

    #[test]
    fn phy_exchange_listens_then_sends() {
        let ping = phy::ping(3);
        let stream = ScriptedStream::new(2)
            .with_event(phy_sent(&[42]))
            .with_event(phy_received(&[phy::ping_reply_bits(3) | 0x01c0_0000]));
        let mut engine = TransactionEngine::new(stream);
        let reply = engine
            .exchange_phy(
                PhyPacket::symmetric(ping),
                phy::PING_REPLY_MASK,
                phy::ping_reply_bits(3),
            )
            .unwrap();
        assert_eq!(reply.roundtrip_ticks, Some(42));
        assert_eq!(reply.self_ids.words().len(), 1);

        let submissions = engine.source().submissions();
        assert!(matches!(submissions[0], Submission::ListenPhy));
        match &submissions[1] {
            Submission::Phy { d0, d1, generation } => {
                assert_eq!(*d0, ping);
                assert_eq!(*d1, !ping);
                assert_eq!(*generation, 2);
            }
            other => panic!("unexpected submission {other:?}"),
        }
    }

    #[test]
    fn self_id_reply_is_collected_to_chain_end() {
        let first = phy::ping_reply_bits(1) | 1;
        let more = 0x8180_0001;
        let last = 0x81a0_0000;
        let stream = ScriptedStream::new(2)
            .with_event(phy_sent(&[7]))
            .with_event(phy_received(&[first]))
            .with_event(phy_received(&[0x4000_0000]))
            .with_event(phy_received(&[more]))
            .with_event(phy_received(&[last]));
        let mut engine = TransactionEngine::new(stream);
        let reply = engine
            .exchange_phy(
                PhyPacket::symmetric(phy::ping(1)),
                phy::PING_REPLY_MASK,
                phy::ping_reply_bits(1),
            )
            .unwrap();
        assert_eq!(reply.self_ids.words(), &[first, more, last]);
        assert_eq!(reply.response, last);
    }

    #[test]
    fn send_only_exchange_does_not_listen() {
        let stream = ScriptedStream::new(2).with_event(phy_sent(&[]));
        let mut engine = TransactionEngine::new(stream);
        engine
            .send_phy(PhyPacket::symmetric(phy::config(Some(2), None)))
            .unwrap();
        let submissions = engine.source().submissions();
        assert_eq!(submissions.len(), 1);
        assert!(matches!(submissions[0], Submission::Phy { .. }));
    }

    #[test]
    fn bus_reset_aborts_phy_exchange() {
        let stream = ScriptedStream::new(2).with_event(bus_reset(3));
        let mut engine = TransactionEngine::new(stream);
        let err = engine
            .send_phy(PhyPacket::symmetric(phy::link_on(4)))
            .unwrap_err();
        assert_eq!(err.to_string(), "bus reset");
        assert_eq!(engine.generation(), 3);
    }

    #[test]
    fn fcp_waits_for_both_ack_and_response() {
        let frame = Bytes::from_static(&[0x01, 0xff, 0x29, 0x00]);
        // Response frame lands before the write acknowledgment.
        let stream = ScriptedStream::new(4)
            .with_event(Event::Request(RequestEvent {
                tcode: tcode::WRITE_BLOCK_REQUEST,
                offset: csr::FCP_RESPONSE,
                handle: 99,
                data: Bytes::from_static(&[0x03, 0xff, 0x29, 0x00]),
            }))
            .with_event(response(Rcode::Complete, &[]));
        let mut engine = TransactionEngine::new(stream);
        let reply = engine.fcp(frame).unwrap();
        assert_eq!(&reply[..], &[0x03, 0xff, 0x29, 0x00]);

        let submissions = engine.source().submissions();
        assert!(matches!(
            submissions[0],
            Submission::Allocate {
                offset: csr::FCP_RESPONSE,
                length: csr::FCP_RESPONSE_LENGTH,
            }
        ));
        assert!(matches!(submissions[1], Submission::Async { .. }));
        assert!(matches!(
            submissions[2],
            Submission::Response {
                handle: 99,
                rcode: 0,
            }
        ));
    }

    #[test]
    fn fcp_ack_first_still_waits_for_response() {
        let stream = ScriptedStream::new(4)
            .with_event(response(Rcode::Complete, &[]))
            .with_event(Event::Request(RequestEvent {
                tcode: tcode::WRITE_QUADLET_REQUEST,
                offset: csr::FCP_RESPONSE,
                handle: 7,
                data: Bytes::from_static(&[0x0c, 0xff, 0x00, 0x00]),
            }));
        let mut engine = TransactionEngine::new(stream);
        let reply = engine.fcp(Bytes::from_static(&[0x00, 0xff, 0x00, 0x00])).unwrap();
        assert_eq!(&reply[..], &[0x0c, 0xff, 0x00, 0x00]);
    }

    #[test]
    fn fcp_rejected_command_is_an_error() {
        let stream = ScriptedStream::new(4).with_event(response(Rcode::AddressError, &[]));
        let mut engine = TransactionEngine::new(stream);
        let err = engine
            .fcp(Bytes::from_static(&[0x00, 0xff, 0x00, 0x00]))
            .unwrap_err();
        assert_eq!(err.to_string(), "address error");
    }
}
