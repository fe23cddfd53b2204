//! Scripted event sources for tests.
//!
//! [`ScriptedStream`] plays back a fixed event sequence and records every
//! submission, letting transaction logic run against bus conditions that
//! are hard to arrange for real: generation races, reply reordering,
//! silent nodes.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use firewire_proto::phy::PhyPacket;

use crate::engine::AsyncRequest;
use crate::error::Result;
use crate::event::Event;
use crate::stream::EventSource;

/// One recorded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A PHY packet send.
    Phy {
        /// First quadlet.
        d0: u32,
        /// Second quadlet.
        d1: u32,
        /// Generation stamp.
        generation: u32,
    },
    /// An async request send.
    Async {
        /// Transaction code.
        tcode: u32,
        /// Destination offset.
        offset: u64,
        /// Declared payload or response length.
        length: u32,
        /// Request payload.
        data: Bytes,
        /// Generation stamp.
        generation: u32,
        /// Broadcast rather than unicast.
        broadcast: bool,
    },
    /// A response to an inbound request.
    Response {
        /// Kernel handle of the request being answered.
        handle: u32,
        /// Response code sent back.
        rcode: u32,
    },
    /// An address range allocation.
    Allocate {
        /// Start of the range.
        offset: u64,
        /// Length of the range.
        length: u32,
    },
    /// Enabling inbound PHY packet delivery.
    ListenPhy,
}

/// An [`EventSource`] that replays a scripted event queue.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    generation: u32,
    events: VecDeque<Event>,
    submissions: Vec<Submission>,
}

impl ScriptedStream {
    /// A stream whose bus sits at `generation`, with nothing queued.
    #[must_use]
    pub fn new(generation: u32) -> Self {
        Self {
            generation,
            events: VecDeque::new(),
            submissions: Vec::new(),
        }
    }

    /// Appends an event to the playback queue.
    #[must_use]
    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push_back(event);
        self
    }

    /// Everything submitted so far, in order.
    #[must_use]
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }
}

impl EventSource for ScriptedStream {
    fn initial_generation(&self) -> u32 {
        self.generation
    }

    fn submit_phy(&mut self, packet: PhyPacket, generation: u32) -> Result<()> {
        self.submissions.push(Submission::Phy {
            d0: packet.d0,
            d1: packet.d1,
            generation,
        });
        Ok(())
    }

    fn submit_async(&mut self, request: &AsyncRequest) -> Result<()> {
        self.submissions.push(Submission::Async {
            tcode: request.tcode,
            offset: request.offset,
            length: request.length,
            data: request.data.clone(),
            generation: request.generation,
            broadcast: request.broadcast,
        });
        Ok(())
    }

    fn submit_response(&mut self, handle: u32, rcode: u32) -> Result<()> {
        self.submissions.push(Submission::Response { handle, rcode });
        Ok(())
    }

    fn listen_phy(&mut self) -> Result<()> {
        self.submissions.push(Submission::ListenPhy);
        Ok(())
    }

    fn allocate_range(&mut self, offset: u64, length: u32) -> Result<()> {
        self.submissions.push(Submission::Allocate { offset, length });
        Ok(())
    }

    fn next_event(&mut self, _timeout: Duration) -> Result<Option<Event>> {
        Ok(self.events.pop_front())
    }
}
