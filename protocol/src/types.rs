//! # Core Identifiers
//!
//! Every agreement in Covenant is addressed by an [`EntityId`] handed out by
//! the [`Registry`](crate::registry::Registry), every participant by a
//! [`PartyId`], and every pooled value by an [`AssetKind`] tag. Amounts are
//! plain `u64` in the asset's smallest unit; unique items always move with
//! an amount of exactly one.

use serde::{Deserialize, Serialize};

use crate::config::ESCROW_PARTY;

/// Value in the smallest unit of its asset. No floats, no decimals.
pub type Amount = u64;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Sequential identifier of an agreement within one registry.
///
/// Ids start at zero, are never reused, and are assigned exactly once at
/// creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Big-endian bytes, used as salt when drawing from an entropy seed.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PartyId
// ---------------------------------------------------------------------------

/// Opaque address of a participant (creator, contributor, counterparty).
///
/// The engine never interprets the string; it only compares it. The one
/// reserved value is the escrow account that holds pooled funds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The account every agreement pulls contributions into.
    pub fn escrow() -> Self {
        Self(ESCROW_PARTY.to_string())
    }

    pub fn is_escrow(&self) -> bool {
        self.0 == ESCROW_PARTY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PartyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// AssetKind
// ---------------------------------------------------------------------------

/// What an agreement pools or exchanges.
///
/// Native-value and token variants of the same agreement share one code
/// path; only this tag differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetKind {
    /// The host platform's native value.
    Native,
    /// A fungible token, referenced by its contract/symbol identifier.
    Token(String),
    /// A unique item (NFT): always transferred with amount 1.
    Item {
        /// Collection the item belongs to.
        collection: String,
        /// Item identifier within the collection.
        item_id: u64,
    },
}

impl AssetKind {
    pub fn token(id: impl Into<String>) -> Self {
        AssetKind::Token(id.into())
    }

    pub fn item(collection: impl Into<String>, item_id: u64) -> Self {
        AssetKind::Item {
            collection: collection.into(),
            item_id,
        }
    }

    /// `true` for non-fungible items.
    pub fn is_unique(&self) -> bool {
        matches!(self, AssetKind::Item { .. })
    }

    /// `true` for native value and tokens, which can be pooled.
    pub fn is_fungible(&self) -> bool {
        !self.is_unique()
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Native => write!(f, "native"),
            AssetKind::Token(id) => write!(f, "token:{}", id),
            AssetKind::Item {
                collection,
                item_id,
            } => write!(f, "item:{}/{}", collection, item_id),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Which agreement family an entity belongs to. Used for logging, events
/// and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Fundraiser,
    Lottery,
    Auction,
    Staking,
    Vesting,
    Swap,
    Listing,
    ExchangeOffer,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Fundraiser => "fundraiser",
            EntityKind::Lottery => "lottery",
            EntityKind::Auction => "auction",
            EntityKind::Staking => "staking",
            EntityKind::Vesting => "vesting",
            EntityKind::Swap => "swap",
            EntityKind::Listing => "listing",
            EntityKind::ExchangeOffer => "exchange_offer",
        };
        f.write_str(name)
    }
}
