//! # Fixed-Price Listing
//!
//! The seller escrows a unique item at a fixed price until an expiry. A buyer
//! paying exactly the price before expiry receives the item while the seller
//! receives the payment, in one atomic exchange. Until then the seller may
//! cancel; after expiry the seller reclaims the unsold item.
//!
//! The item is the entity's pool: the seller's deposit of one unit is its
//! only ledger entry.

use chrono::{DateTime, Utc};
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, PayoutPath, Registry, Schedule, TransferOrder, VoidReason,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingParams {
    pub item: AssetKind,
    pub payment: AssetKind,
    /// Exact price a buyer pays. Must be non-zero.
    pub price: Amount,
    /// Last instant the item can be bought.
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingOutcome {
    Sold { buyer: PartyId, price: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    Active,
    Sold { buyer: PartyId },
    Cancelled,
    Reclaimed,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingStatus::Active => write!(f, "active"),
            ListingStatus::Sold { buyer } => write!(f, "sold to {}", buyer),
            ListingStatus::Cancelled => write!(f, "cancelled"),
            ListingStatus::Reclaimed => write!(f, "reclaimed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Pool holds the escrowed item.
    pub core: EntityCore<ListingOutcome>,
    pub payment: AssetKind,
    pub price: Amount,
    pub status: ListingStatus,
}

impl Listing {
    pub fn seller(&self) -> &PartyId {
        &self.core.creator
    }

    fn ensure_active(&self) -> ContractResult<()> {
        if self.status != ListingStatus::Active {
            return Err(ContractError::ListingClosed {
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}

pub struct ListingBook {
    ctx: ContractContext,
    registry: Registry<Listing>,
}

impl ListingBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::Listing);
        Self { ctx, registry }
    }

    /// Escrows the item from `seller` and lists it.
    pub fn list(&self, seller: &PartyId, params: ListingParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if !params.item.is_unique() {
            return Err(CovenantError::InvalidParameters("listings sell unique items".into()).into());
        }
        if !params.payment.is_fungible() {
            return Err(CovenantError::InvalidParameters(
                "listings are paid in a fungible asset".into(),
            )
            .into());
        }
        if params.price == 0 {
            return Err(CovenantError::InvalidParameters("price must be non-zero".into()).into());
        }
        let schedule = Schedule::new(now, params.expiry);
        schedule.validate(now)?;

        let id = self.registry.create_with(seller, |id| {
            let mut core = EntityCore::new(
                id,
                EntityKind::Listing,
                seller.clone(),
                params.item.clone(),
                schedule,
                ContributionPolicy::SingleTicket { price: 1 },
            );
            self.ctx.settlement.accept(&mut core, now, seller, 1)?;
            Ok::<_, ContractError>(Listing {
                core,
                payment: params.payment.clone(),
                price: params.price,
                status: ListingStatus::Active,
            })
        })?;

        info!(entity_id = id.0, item = %params.item, price = params.price, "item listed");
        Ok(id)
    }

    /// Buys the item for exactly the listed price.
    pub fn buy(&self, id: EntityId, buyer: &PartyId, amount: Amount) -> ContractResult<()> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |listing| {
            listing.ensure_active()?;
            self.ctx
                .exclude(buyer, &listing.core.creator, "buy their own listing")?;
            listing.core.ensure_open(now)?;
            if amount != listing.price {
                return Err(CovenantError::InvalidAmount {
                    expected: listing.price,
                    got: amount,
                }
                .into());
            }

            let orders = [
                TransferOrder::new(
                    listing.core.asset.clone(),
                    self.ctx.settlement.escrow(),
                    buyer.clone(),
                    1,
                ),
                TransferOrder::new(
                    listing.payment.clone(),
                    buyer.clone(),
                    listing.core.creator.clone(),
                    listing.price,
                ),
            ];
            self.ctx
                .settlement
                .release_with(&mut listing.core, 1, &orders)?;
            self.ctx.settlement.conclude(
                &mut listing.core,
                now,
                ListingOutcome::Sold {
                    buyer: buyer.clone(),
                    price: listing.price,
                },
            )?;
            listing.status = ListingStatus::Sold {
                buyer: buyer.clone(),
            };
            info!(entity_id = id.0, buyer = %buyer, price = listing.price, "listing sold");
            Ok(())
        })
    }

    /// Seller withdraws an unsold item before expiry.
    pub fn cancel(&self, id: EntityId, caller: &PartyId) -> ContractResult<()> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |listing| {
            self.ctx
                .authorize(caller, &listing.core.creator, "cancel the listing")?;
            listing.ensure_active()?;
            listing.core.ensure_open(now)?;

            self.ctx
                .settlement
                .release(&mut listing.core, caller, 1, PayoutPath::Refund)?;
            self.ctx
                .settlement
                .void(&mut listing.core, now, VoidReason::Cancelled);
            listing.status = ListingStatus::Cancelled;
            Ok(())
        })
    }

    /// Seller takes back an item that did not sell before expiry.
    ///
    /// # Errors
    ///
    /// `ResolutionNotReady` while the listing has not expired.
    pub fn reclaim(&self, id: EntityId, caller: &PartyId) -> ContractResult<()> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |listing| {
            self.ctx
                .authorize(caller, &listing.core.creator, "reclaim the listed item")?;
            listing.ensure_active()?;
            if listing.core.schedule.accepts_contributions(now) {
                return Err(CovenantError::ResolutionNotReady {
                    ready_at: listing.core.schedule.deadline,
                    now,
                }
                .into());
            }

            self.ctx
                .settlement
                .release(&mut listing.core, caller, 1, PayoutPath::Refund)?;
            self.ctx
                .settlement
                .void(&mut listing.core, now, VoidReason::Expired);
            listing.status = ListingStatus::Reclaimed;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<Listing> {
        self.registry.get(id)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    pub fn status(&self, id: EntityId) -> Option<ListingStatus> {
        self.get(id).map(|l| l.status)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
