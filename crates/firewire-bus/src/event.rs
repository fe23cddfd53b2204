//! Typed decode of the kernel's event records.
//!
//! Each `read(2)` on the device delivers exactly one event: an 8-byte
//! closure, a 4-byte type code, then type-specific fields and an optional
//! payload. The records are in host byte order; payload bytes pass through
//! untouched (async payloads are bus data, PHY payloads are host-order
//! quadlets).

use bytes::Bytes;
use firewire_proto::rcode::Rcode;

use crate::cdev;
use crate::error::{FwError, Result};

/// One event from the device's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The bus reconfigured; every node id and the generation may have
    /// changed.
    BusReset(BusResetEvent),
    /// Completion of one of our outbound async requests.
    Response(ResponseEvent),
    /// An inbound request addressed to a range we allocated.
    Request(RequestEvent),
    /// Completion of one of our outbound PHY packets.
    PhyPacketSent(PhyPacketEvent),
    /// An inbound PHY packet.
    PhyPacketReceived(PhyPacketEvent),
    /// Any event type the tools have no use for (isochronous machinery).
    Other {
        /// Raw event type code.
        kind: u32,
    },
}

/// Bus state after a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusResetEvent {
    /// Node id of the device this handle talks to.
    pub node_id: u32,
    /// Node id of the bus's local node.
    pub local_node_id: u32,
    /// Node id of the root node.
    pub root_node_id: u32,
    /// New bus generation.
    pub generation: u32,
}

/// Response to an async request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEvent {
    /// Response code from the peer (or synthesized by the kernel).
    pub rcode: Rcode,
    /// Response payload; empty for writes.
    pub data: Bytes,
}

/// Inbound async request (both the legacy and the current record form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    /// Transaction code of the inbound request.
    pub tcode: u32,
    /// Target address within our allocated range.
    pub offset: u64,
    /// Handle to answer through `SEND_RESPONSE`.
    pub handle: u32,
    /// Request payload.
    pub data: Bytes,
}

/// Sent/received PHY packet. The kernel reports outbound completion with an
/// rcode and, for pings, the round-trip time as a payload quadlet; inbound
/// packets carry their two quadlets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyPacketEvent {
    /// COMPLETE unless the packet failed on the bus.
    pub rcode: Rcode,
    /// Host-order payload quadlets.
    pub quadlets: Vec<u32>,
}

impl Event {
    /// Decodes one event record as delivered by `read(2)`.
    ///
    /// # Errors
    ///
    /// [`FwError::ShortEvent`] when the buffer is smaller than the claimed
    /// type's fixed fields or declared payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let r = Reader { buf };
        let kind = r.u32_at(8)?; // closure u64, then type
        match kind {
            cdev::EVENT_BUS_RESET => Ok(Self::BusReset(BusResetEvent {
                node_id: r.u32_at(12)?,
                local_node_id: r.u32_at(16)?,
                root_node_id: r.u32_at(28)?,
                generation: r.u32_at(32)?,
            })),
            cdev::EVENT_RESPONSE => {
                let length = r.u32_at(16)? as usize;
                Ok(Self::Response(ResponseEvent {
                    rcode: Rcode::from_raw(r.u32_at(12)?),
                    data: r.bytes_at(20, length)?,
                }))
            }
            cdev::EVENT_REQUEST => {
                let length = r.u32_at(28)? as usize;
                Ok(Self::Request(RequestEvent {
                    tcode: r.u32_at(12)?,
                    offset: r.u64_at(16)?,
                    handle: r.u32_at(24)?,
                    data: r.bytes_at(32, length)?,
                }))
            }
            cdev::EVENT_REQUEST2 => {
                let length = r.u32_at(44)? as usize;
                Ok(Self::Request(RequestEvent {
                    tcode: r.u32_at(12)?,
                    offset: r.u64_at(16)?,
                    handle: r.u32_at(40)?,
                    data: r.bytes_at(48, length)?,
                }))
            }
            cdev::EVENT_PHY_PACKET_SENT => Ok(Self::PhyPacketSent(r.phy_packet()?)),
            cdev::EVENT_PHY_PACKET_RECEIVED => Ok(Self::PhyPacketReceived(r.phy_packet()?)),
            _ => Ok(Self::Other { kind }),
        }
    }
}

/// Bounds-checked field access into one event record.
struct Reader<'a> {
    buf: &'a [u8],
}

impl Reader<'_> {
    fn short(&self) -> FwError {
        FwError::ShortEvent {
            length: self.buf.len(),
        }
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        match self.buf.get(offset..offset + 4) {
            Some(b) => Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
            None => Err(self.short()),
        }
    }

    fn u64_at(&self, offset: usize) -> Result<u64> {
        match self.buf.get(offset..offset + 8) {
            Some(b) => Ok(u64::from_ne_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ])),
            None => Err(self.short()),
        }
    }

    fn bytes_at(&self, offset: usize, length: usize) -> Result<Bytes> {
        self.buf
            .get(offset..offset + length)
            .map(Bytes::copy_from_slice)
            .ok_or_else(|| self.short())
    }

    /// Fields shared by the sent/received PHY packet events.
    fn phy_packet(&self) -> Result<PhyPacketEvent> {
        let length = self.u32_at(16)? as usize;
        let data = self.bytes_at(20, length)?;
        let quadlets = data
            .chunks_exact(4)
            .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(PhyPacketEvent {
            rcode: Rcode::from_raw(self.u32_at(12)?),
            quadlets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u32, words: &[u32]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u64.to_ne_bytes()); // closure
        buf.extend_from_slice(&kind.to_ne_bytes());
        for w in words {
            buf.extend_from_slice(&w.to_ne_bytes());
        }
        buf
    }

    #[test]
    fn decodes_bus_reset() {
        let buf = record(
            cdev::EVENT_BUS_RESET,
            &[0xffc2, 0xffc0, 0, 0, 0xffc2, 0x2b],
        );
        let event = Event::decode(&buf).unwrap();
        assert_eq!(
            event,
            Event::BusReset(BusResetEvent {
                node_id: 0xffc2,
                local_node_id: 0xffc0,
                root_node_id: 0xffc2,
                generation: 0x2b,
            })
        );
    }

    #[test]
    fn decodes_response_with_payload() {
        let mut buf = record(cdev::EVENT_RESPONSE, &[0x10, 4]);
        buf.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let event = Event::decode(&buf).unwrap();
        assert_eq!(
            event,
            Event::Response(ResponseEvent {
                rcode: Rcode::SendError,
                data: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            })
        );
    }

    #[test]
    fn decodes_legacy_request() {
        let mut buf = record(cdev::EVENT_REQUEST, &[0x1]); // tcode
        buf.extend_from_slice(&0xffff_f000_0d00u64.to_ne_bytes());
        buf.extend_from_slice(&7u32.to_ne_bytes()); // handle
        buf.extend_from_slice(&2u32.to_ne_bytes()); // length
        buf.extend_from_slice(&[0xab, 0xcd]);
        let event = Event::decode(&buf).unwrap();
        assert_eq!(
            event,
            Event::Request(RequestEvent {
                tcode: 0x1,
                offset: 0xffff_f000_0d00,
                handle: 7,
                data: Bytes::from_static(&[0xab, 0xcd]),
            })
        );
    }

    #[test]
    fn decodes_request2() {
        let mut buf = record(cdev::EVENT_REQUEST2, &[0x6]); // tcode
        buf.extend_from_slice(&0xffff_f000_0b00u64.to_ne_bytes());
        for w in [0xffc1u32, 0xffc0, 0, 0x2b, 9, 4] {
            // src, dst, card, generation, handle, length
            buf.extend_from_slice(&w.to_ne_bytes());
        }
        buf.extend_from_slice(&[1, 2, 3, 4]);
        let event = Event::decode(&buf).unwrap();
        assert_eq!(
            event,
            Event::Request(RequestEvent {
                tcode: 0x6,
                offset: 0xffff_f000_0b00,
                handle: 9,
                data: Bytes::from_static(&[1, 2, 3, 4]),
            })
        );
    }

    #[test]
    fn decodes_phy_packet_events() {
        let mut buf = record(cdev::EVENT_PHY_PACKET_RECEIVED, &[0, 8]);
        buf.extend_from_slice(&0x8040_00c8u32.to_ne_bytes());
        buf.extend_from_slice(&(!0x8040_00c8u32).to_ne_bytes());
        let event = Event::decode(&buf).unwrap();
        assert_eq!(
            event,
            Event::PhyPacketReceived(PhyPacketEvent {
                rcode: Rcode::Complete,
                quadlets: vec![0x8040_00c8, !0x8040_00c8],
            })
        );

        let buf = record(cdev::EVENT_PHY_PACKET_SENT, &[0, 0]);
        assert_eq!(
            Event::decode(&buf).unwrap(),
            Event::PhyPacketSent(PhyPacketEvent {
                rcode: Rcode::Complete,
                quadlets: vec![],
            })
        );
    }

    #[test]
    fn unknown_kind_is_other() {
        let buf = record(0x03, &[0, 0, 0]);
        assert_eq!(Event::decode(&buf).unwrap(), Event::Other { kind: 0x03 });
    }

    #[test]
    fn short_buffer_is_rejected() {
        let buf = record(cdev::EVENT_RESPONSE, &[0x0, 16]); // claims 16 payload bytes
        assert!(matches!(
            Event::decode(&buf),
            Err(FwError::ShortEvent { length }) if length == 20
        ));
        assert!(matches!(
            Event::decode(&[0u8; 10]),
            Err(FwError::ShortEvent { .. })
        ));
    }
}
