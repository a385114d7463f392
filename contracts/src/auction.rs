//! # English Auction
//!
//! The seller escrows a unique item at creation. Bidders accumulate bids in
//! the payment asset; each bid must lift the bidder's total strictly above the
//! current highest bid. Outbid bidders may withdraw their balance at any time
//! (pending returns), the current highest bidder may not.
//!
//! After the deadline the auction resolves to:
//!
//! - `Sold { winner, price }` if a highest bid meets the reserve. The seller
//!   claims the winning bid, the winner claims the item, each once.
//! - `NoSale` otherwise. Every bidder withdraws, the seller reclaims the item.

use chrono::{DateTime, Utc};
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, PayoutPath, Phase, Registry, Resolution, Schedule,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionParams {
    /// The unique item on sale.
    pub item: AssetKind,
    /// What bids are paid in.
    pub payment: AssetKind,
    /// Lowest winning bid. Must be non-zero.
    pub reserve_price: Amount,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionOutcome {
    Sold { winner: PartyId, price: Amount },
    NoSale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    /// Pool of bids, denominated in the payment asset.
    pub core: EntityCore<AuctionOutcome>,
    pub item: AssetKind,
    pub reserve_price: Amount,
    pub highest_bidder: Option<PartyId>,
    pub highest_bid: Amount,
    /// Set once the item has left escrow (to the winner or back to the seller).
    pub item_delivered: bool,
}

impl Auction {
    pub fn seller(&self) -> &PartyId {
        &self.core.creator
    }
}

pub struct AuctionBook {
    ctx: ContractContext,
    registry: Registry<Auction>,
}

impl AuctionBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::Auction);
        Self { ctx, registry }
    }

    /// Escrows the item from `seller` and opens the auction.
    pub fn create(&self, seller: &PartyId, params: AuctionParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if !params.item.is_unique() {
            return Err(CovenantError::InvalidParameters("auctions sell unique items".into()).into());
        }
        if !params.payment.is_fungible() {
            return Err(CovenantError::InvalidParameters(
                "bids must be in a fungible asset".into(),
            )
            .into());
        }
        if params.reserve_price == 0 {
            return Err(
                CovenantError::InvalidParameters("reserve price must be non-zero".into()).into(),
            );
        }
        let schedule = Schedule::new(now, params.deadline);
        schedule.validate(now)?;

        let id = self.registry.create_with(seller, |id| {
            self.ctx.settlement.collect(id, &params.item, seller, 1)?;
            Ok::<_, ContractError>(Auction {
                core: EntityCore::new(
                    id,
                    EntityKind::Auction,
                    seller.clone(),
                    params.payment.clone(),
                    schedule,
                    ContributionPolicy::Accumulate,
                ),
                item: params.item.clone(),
                reserve_price: params.reserve_price,
                highest_bidder: None,
                highest_bid: 0,
                item_delivered: false,
            })
        })?;

        info!(entity_id = id.0, item = %params.item, reserve = params.reserve_price, "auction opened");
        Ok(id)
    }

    /// Adds `amount` to `bidder`'s total bid. Returns the new total.
    ///
    /// # Errors
    ///
    /// [`ContractError::BidTooLow`] unless the new total exceeds the highest bid.
    pub fn bid(&self, id: EntityId, bidder: &PartyId, amount: Amount) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |auction| {
            self.ctx
                .exclude(bidder, &auction.core.creator, "bid on their own auction")?;
            auction.core.check_contribution(now, bidder, amount)?;

            let total = auction
                .core
                .amount_of(bidder)
                .checked_add(amount)
                .ok_or(CovenantError::AmountOverflow)?;
            if total <= auction.highest_bid {
                return Err(ContractError::BidTooLow {
                    total,
                    highest: auction.highest_bid,
                });
            }

            let total = self
                .ctx
                .settlement
                .accept(&mut auction.core, now, bidder, amount)?;
            auction.highest_bidder = Some(bidder.clone());
            auction.highest_bid = total;
            info!(entity_id = id.0, bidder = %bidder, total, "new highest bid");
            Ok(total)
        })
    }

    /// Returns an outbid (or, after a no-sale, any) bidder's balance.
    pub fn withdraw(&self, id: EntityId, bidder: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |auction| {
            let locked = match self.outcome_if_resolvable(auction, now)? {
                Some(AuctionOutcome::Sold { winner, .. }) => &winner == bidder,
                Some(AuctionOutcome::NoSale) => false,
                None => auction.highest_bidder.as_ref() == Some(bidder),
            };
            if locked {
                return Err(ContractError::HighestBidderLocked);
            }
            let refunded = self.ctx.settlement.refund(&mut auction.core, bidder)?;
            Ok(refunded)
        })
    }

    /// Decides the outcome once the deadline has passed. Idempotent.
    pub fn resolve(&self, id: EntityId) -> ContractResult<AuctionOutcome> {
        let now = self.ctx.now();
        self.registry
            .with_entity(id, |auction| self.resolve_in(auction, now))
    }

    /// Seller collects the winning bid, once.
    pub fn claim_proceeds(&self, id: EntityId, caller: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |auction| {
            self.ctx
                .authorize(caller, &auction.core.creator, "claim the auction proceeds")?;
            match self.resolve_in(auction, now)? {
                AuctionOutcome::NoSale => Err(ContractError::NoSale),
                AuctionOutcome::Sold { winner, .. } => {
                    let paid = self.ctx.settlement.pay_entry(
                        &mut auction.core,
                        &winner,
                        caller,
                        0,
                        PayoutPath::Primary,
                    )?;
                    info!(entity_id = id.0, seller = %caller, amount = paid, "auction proceeds claimed");
                    Ok(paid)
                }
            }
        })
    }

    /// Hands the item to the winner, or back to the seller after a no-sale.
    pub fn claim_item(&self, id: EntityId, caller: &PartyId) -> ContractResult<AssetKind> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |auction| {
            let (recipient, path) = match self.resolve_in(auction, now)? {
                AuctionOutcome::Sold { winner, .. } => (winner, PayoutPath::Primary),
                AuctionOutcome::NoSale => (auction.core.creator.clone(), PayoutPath::Refund),
            };
            self.ctx.authorize(caller, &recipient, "claim the auctioned item")?;
            if auction.item_delivered {
                return Err(CovenantError::AlreadyClaimed { party: caller.clone() }.into());
            }

            auction.item_delivered = true;
            if let Err(err) = self
                .ctx
                .settlement
                .deliver(id, &auction.item, caller, 1, path)
            {
                auction.item_delivered = false;
                return Err(err.into());
            }
            Ok(auction.item.clone())
        })
    }

    fn outcome_if_resolvable(&self, auction: &mut Auction, now: DateTime<Utc>) -> ContractResult<Option<AuctionOutcome>> {
        auction.core.observe(now);
        if !auction.core.schedule.is_resolvable(now) {
            return Ok(None);
        }
        self.resolve_in(auction, now).map(Some)
    }

    fn resolve_in(&self, auction: &mut Auction, now: DateTime<Utc>) -> ContractResult<AuctionOutcome> {
        let reserve = auction.reserve_price;
        let highest = auction.highest_bidder.clone().map(|b| (b, auction.highest_bid));
        let resolution = self.ctx.settlement.resolve(&mut auction.core, now, |_| {
            Ok(Resolution::Decided(match highest {
                Some((winner, price)) if price >= reserve => AuctionOutcome::Sold { winner, price },
                _ => AuctionOutcome::NoSale,
            }))
        })?;
        match resolution {
            Resolution::Decided(outcome) => Ok(outcome),
            Resolution::Voided(_) => Err(CovenantError::InvalidState {
                current: Phase::Voided,
                expected: "Resolved",
            }
            .into()),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<Auction> {
        self.registry.get(id)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    /// `bidder`'s committed, unwithdrawn bid total.
    pub fn amount_of(&self, id: EntityId, bidder: &PartyId) -> Amount {
        self.get(id).map_or(0, |a| a.core.amount_of(bidder))
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
