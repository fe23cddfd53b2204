//! Self-ID packets.
//!
//! After a bus reset (and in reply to a ping) every PHY broadcasts one to
//! three chained Self-ID packets describing its configuration. The first
//! word carries identity, speed, gap count, power class and three port
//! states; each continuation word carries eight more port states. Bit 0 of
//! every word flags that another word follows.

use std::fmt;

/// Tag bits (31–30) marking a PHY packet word as Self-ID (`0b10`).
const TAG_MASK: u32 = 0xc000_0000;
const TAG_SELF_ID: u32 = 0x8000_0000;
/// Continuation flag: another Self-ID word follows.
const MORE_PACKETS: u32 = 1;
/// Marks a continuation (extended) word.
const EXTENDED: u32 = 1 << 23;

/// Longest permitted chain, in words.
pub const MAX_CHAIN: usize = 3;

/// Port-state slots in the first word / in each continuation word.
const FIRST_WORD_PORTS: usize = 3;
const EXTENDED_WORD_PORTS: usize = 8;

/// `true` when `q` carries the Self-ID tag.
#[must_use]
pub const fn is_self_id(q: u32) -> bool {
    q & TAG_MASK == TAG_SELF_ID
}

/// Accumulator for a chained Self-ID burst.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfIdChain {
    words: Vec<u32>,
}

impl SelfIdChain {
    /// Empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Appends one received word. Returns `true` while the burst is still
    /// incomplete — the word's continuation bit is set and the chain can
    /// grow further.
    pub fn push(&mut self, word: u32) -> bool {
        if self.words.len() < MAX_CHAIN {
            self.words.push(word);
        }
        self.words.len() < MAX_CHAIN && word & MORE_PACKETS != 0
    }

    /// Received words, in arrival order.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// `true` if nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl From<Vec<u32>> for SelfIdChain {
    fn from(words: Vec<u32>) -> Self {
        Self { words }
    }
}

/// State of one PHY port as reported in a Self-ID packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Port not present.
    None,
    /// Present, nothing attached.
    NotConnected,
    /// Connected to the parent node.
    Parent,
    /// Connected to a child node.
    Child,
}

impl PortState {
    const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::None,
            1 => Self::NotConnected,
            2 => Self::Parent,
            _ => Self::Child,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::NotConnected => 1,
            Self::Parent => 2,
            Self::Child => 3,
        }
    }

    /// One-character rendering used in Self-ID listings; absent ports print
    /// as nothing.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::None => "",
            Self::NotConnected => "-",
            Self::Parent => "p",
            Self::Child => "c",
        }
    }
}

/// Link speed advertised in a Self-ID packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhySpeed {
    /// 98.304 Mb/s.
    S100,
    /// 196.608 Mb/s.
    S200,
    /// 393.216 Mb/s.
    S400,
    /// 1394b beta-mode signalling.
    Beta,
}

impl PhySpeed {
    const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::S100,
            1 => Self::S200,
            2 => Self::S400,
            _ => Self::Beta,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::S100 => 0,
            Self::S200 => 1,
            Self::S400 => 2,
            Self::Beta => 3,
        }
    }
}

impl fmt::Display for PhySpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::S100 => "S100",
            Self::S200 => "S200",
            Self::S400 => "S400",
            Self::Beta => "beta",
        })
    }
}

/// Power class (3-bit field; positive classes source bus power, negative
/// ones consume it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerClass(u8);

impl PowerClass {
    const LABELS: [&'static str; 8] = [
        "+0W", "+15W", "+30W", "+45W", "-3W", " ?W", "-3..-6W", "-3..-10W",
    ];

    /// Builds from the 3-bit field value.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self((bits & 7) as u8)
    }

    const fn bits(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for PowerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::LABELS[self.0 as usize])
    }
}

/// Decoded Self-ID fields for one PHY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfId {
    /// PHY id (0–63).
    pub phy_id: u32,
    /// Link layer active.
    pub link_active: bool,
    /// Arbitration gap count.
    pub gap_count: u32,
    /// Advertised speed.
    pub speed: PhySpeed,
    /// Contends for bus/isochronous-resource management.
    pub contender: bool,
    /// Power class.
    pub power: PowerClass,
    /// This PHY initiated the bus reset.
    pub initiated_reset: bool,
    /// Port states: 3 slots for a one-word chain, 11 for two words, 19 for
    /// three.
    pub ports: Vec<PortState>,
}

impl SelfId {
    /// Decodes an accumulated chain. Returns `None` when the chain is empty
    /// or its first word is not Self-ID tagged. Consumption stops at the
    /// first word whose continuation bit is clear, even if more words were
    /// captured.
    #[must_use]
    pub fn decode(chain: &SelfIdChain) -> Option<Self> {
        let words = chain.words();
        let first = *words.first()?;
        if !is_self_id(first) {
            return None;
        }

        let mut ports = Vec::with_capacity(FIRST_WORD_PORTS);
        for shift in [6, 4, 2] {
            ports.push(PortState::from_bits(first >> shift));
        }
        if first & MORE_PACKETS != 0 {
            for &word in words.iter().skip(1).take(MAX_CHAIN - 1) {
                for shift in [16, 14, 12, 10, 8, 6, 4, 2] {
                    ports.push(PortState::from_bits(word >> shift));
                }
                if word & MORE_PACKETS == 0 {
                    break;
                }
            }
        }

        Some(Self {
            phy_id: (first >> 24) & 0x3f,
            link_active: first & (1 << 22) != 0,
            gap_count: (first >> 16) & 0x3f,
            speed: PhySpeed::from_bits(first >> 14),
            contender: first & (1 << 11) != 0,
            power: PowerClass::from_bits(first >> 8),
            initiated_reset: first & (1 << 1) != 0,
            ports,
        })
    }

    /// Encodes back into chain words — the inverse of [`SelfId::decode`] for
    /// chains of 3, 11 or 19 ports (other counts are padded with absent
    /// ports up to the next word boundary). Continuation words get the
    /// extended flag and a sequence number, as on a real bus.
    #[must_use]
    pub fn encode(&self) -> SelfIdChain {
        let extra = self.ports.len().saturating_sub(FIRST_WORD_PORTS);
        let extended_words = extra.div_ceil(EXTENDED_WORD_PORTS).min(MAX_CHAIN - 1);

        let mut first = TAG_SELF_ID
            | (self.phy_id & 0x3f) << 24
            | (self.gap_count & 0x3f) << 16
            | self.speed.bits() << 14
            | self.power.bits() << 8;
        if self.link_active {
            first |= 1 << 22;
        }
        if self.contender {
            first |= 1 << 11;
        }
        if self.initiated_reset {
            first |= 1 << 1;
        }
        for (slot, shift) in [6, 4, 2].into_iter().enumerate() {
            first |= self.port_bits(slot) << shift;
        }
        if extended_words > 0 {
            first |= MORE_PACKETS;
        }

        let mut words = vec![first];
        for seq in 0..extended_words {
            let mut word =
                TAG_SELF_ID | (self.phy_id & 0x3f) << 24 | EXTENDED | ((seq as u32) << 20);
            let base = FIRST_WORD_PORTS + seq * EXTENDED_WORD_PORTS;
            for (slot, shift) in [16, 14, 12, 10, 8, 6, 4, 2].into_iter().enumerate() {
                word |= self.port_bits(base + slot) << shift;
            }
            if seq + 1 < extended_words {
                word |= MORE_PACKETS;
            }
            words.push(word);
        }
        SelfIdChain::from(words)
    }

    fn port_bits(&self, slot: usize) -> u32 {
        self.ports.get(slot).copied().unwrap_or(PortState::None).bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_follows_continuation_bits() {
        let mut chain = SelfIdChain::new();
        assert!(chain.push(0x8200_0001));
        assert!(chain.push(0x8280_0001));
        assert!(!chain.push(0x8290_0000));
        assert_eq!(chain.words().len(), 3);
    }

    #[test]
    fn chain_stops_on_clear_bit() {
        let mut chain = SelfIdChain::new();
        assert!(!chain.push(0x8200_0000));
        assert_eq!(chain.words().len(), 1);
    }

    #[test]
    fn chain_caps_at_three_words() {
        let mut chain = SelfIdChain::new();
        chain.push(0x8200_0001);
        chain.push(0x8280_0001);
        // Continuation bit still set, but the chain is full.
        assert!(!chain.push(0x8290_0001));
        assert!(!chain.push(0x82a0_0001));
        assert_eq!(chain.words().len(), 3);
    }

    #[test]
    fn decode_single_word() {
        // PHY 2, link active, gap 0x20, S400, contender, +15W, ports c p -.
        let word = 0x8000_0000
            | (2 << 24)
            | (1 << 22)
            | (0x20 << 16)
            | (2 << 14)
            | (1 << 11)
            | (1 << 8)
            | (3 << 6)
            | (2 << 4)
            | (1 << 2);
        let id = SelfId::decode(&SelfIdChain::from(vec![word])).unwrap();
        assert_eq!(id.phy_id, 2);
        assert!(id.link_active);
        assert_eq!(id.gap_count, 0x20);
        assert_eq!(id.speed, PhySpeed::S400);
        assert!(id.contender);
        assert_eq!(id.power, PowerClass::from_bits(1));
        assert!(!id.initiated_reset);
        assert_eq!(
            id.ports,
            vec![PortState::Child, PortState::Parent, PortState::NotConnected]
        );
    }

    #[test]
    fn decode_rejects_non_self_id() {
        assert!(SelfId::decode(&SelfIdChain::new()).is_none());
        assert!(SelfId::decode(&SelfIdChain::from(vec![0x0500_0000])).is_none());
        assert!(SelfId::decode(&SelfIdChain::from(vec![0xc500_0000])).is_none());
    }

    #[test]
    fn decode_stops_at_clear_continuation_bit() {
        // Second word ends the chain; a stale third word must be ignored.
        let id = SelfId::decode(&SelfIdChain::from(vec![
            0x8100_0001,
            0x8180_0000,
            0x8190_5555,
        ]))
        .unwrap();
        assert_eq!(id.ports.len(), 11);
    }

    #[test]
    fn round_trip_full_chain() {
        let states = [
            PortState::Child,
            PortState::Parent,
            PortState::NotConnected,
            PortState::Child,
        ];
        let fields = SelfId {
            phy_id: 0x21,
            link_active: true,
            gap_count: 0x3f,
            speed: PhySpeed::Beta,
            contender: false,
            power: PowerClass::from_bits(6),
            initiated_reset: true,
            ports: (0..19).map(|i| states[i % states.len()]).collect(),
        };
        let chain = fields.encode();
        assert_eq!(chain.words().len(), 3);
        assert_eq!(SelfId::decode(&chain).unwrap(), fields);
    }

    #[test]
    fn encode_single_word_has_no_continuation() {
        let fields = SelfId {
            phy_id: 0,
            link_active: false,
            gap_count: 0,
            speed: PhySpeed::S100,
            contender: false,
            power: PowerClass::from_bits(0),
            initiated_reset: false,
            ports: vec![PortState::NotConnected; 3],
        };
        let chain = fields.encode();
        assert_eq!(chain.words().len(), 1);
        assert_eq!(chain.words()[0] & 1, 0);
        assert!(is_self_id(chain.words()[0]));
    }

    #[test]
    fn port_symbols() {
        assert_eq!(PortState::None.symbol(), "");
        assert_eq!(PortState::NotConnected.symbol(), "-");
        assert_eq!(PortState::Parent.symbol(), "p");
        assert_eq!(PortState::Child.symbol(), "c");
    }
}
