//! Packaging allocation for card shipments
//!
//! Partitions a lot group's card count into an ordered sequence of shipping
//! units. Small residual counts travel in envelopes, everything else in
//! packets sized to the destination subsidiary's capacity.

use serde::{Deserialize, Serialize};

use crate::error::{LotError, Result};

/// Maximum number of cards an envelope may hold
pub const ENVELOPE_MAX: u32 = 150;

/// Packet capacity for the one subsidiary shipped in small packets
pub const SENEGAL_PACKET_CAPACITY: u32 = 249;

/// Packet capacity for every other subsidiary
pub const DEFAULT_PACKET_CAPACITY: u32 = 500;

/// Kind of shipping unit produced by an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    #[serde(rename = "Enveloppe")]
    Envelope,
    #[serde(rename = "Paquet")]
    Packet,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Envelope => "Enveloppe",
            UnitKind::Packet => "Paquet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Enveloppe" => Some(UnitKind::Envelope),
            "Paquet" => Some(UnitKind::Packet),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One allocated shipping unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingUnit {
    pub unit_kind: UnitKind,
    pub card_count: u32,
}

/// Packet capacity for a subsidiary.
///
/// Sénégal ships in 249-card packets; all other subsidiaries use 500. A fixed
/// business rule with a single special case, not a per-region table.
pub fn packet_capacity(subsidiary: &str) -> u32 {
    if subsidiary.trim().to_lowercase() == "sénégal" {
        SENEGAL_PACKET_CAPACITY
    } else {
        DEFAULT_PACKET_CAPACITY
    }
}

/// Allocate `total_quantity` cards into an ordered sequence of shipping units.
///
/// Greedy left-to-right: while more than [`ENVELOPE_MAX`] cards remain, fill a
/// packet to the subsidiary's capacity; a residual of at most
/// [`ENVELOPE_MAX`] goes into a single final envelope. Unit order is
/// allocation order.
///
/// A zero quantity is not a valid allocation request.
pub fn allocate(total_quantity: u32, subsidiary: &str) -> Result<Vec<ShippingUnit>> {
    if total_quantity == 0 {
        return Err(LotError::InvalidQuantity(total_quantity));
    }

    let capacity = packet_capacity(subsidiary);
    let mut units = Vec::new();
    let mut remaining = total_quantity;

    while remaining > 0 {
        if remaining <= ENVELOPE_MAX {
            units.push(ShippingUnit {
                unit_kind: UnitKind::Envelope,
                card_count: remaining,
            });
            break;
        }
        let packed = capacity.min(remaining);
        units.push(ShippingUnit {
            unit_kind: UnitKind::Packet,
            card_count: packed,
        });
        remaining -= packed;
    }

    Ok(units)
}

/// VIP packs to prepare for an Ordinary lot group.
///
/// Each declared VISA GOLD or VISA INFINITE card travels as its own pack in a
/// large-format envelope.
pub fn vip_pack_count(gold: u32, infinite: u32) -> u32 {
    gold + infinite
}
