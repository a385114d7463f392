//! # Fixed-Rate Token Exchange
//!
//! A maker escrows `sell_amount` of a token and quotes a fixed rate in the
//! payment asset, scaled by [`PRECISION`]:
//!
//! ```text
//! cost(amount) = amount * rate / PRECISION   (rounded down)
//! ```
//!
//! Until the deadline, takers buy any amount up to the remainder. Each
//! purchase is one atomic exchange: the tokens go to the taker and the
//! payment goes straight to the maker. The maker reclaims the unsold
//! remainder once, either by cancelling early or after the deadline.

use chrono::{DateTime, Utc};
use covenant_protocol::config::PRECISION;
use covenant_protocol::settlement::pro_rata;
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, PayoutPath, Registry, Schedule, TransferOrder, VoidReason,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeParams {
    pub sell_asset: AssetKind,
    /// Escrowed from the maker at creation. Must be non-zero.
    pub sell_amount: Amount,
    pub payment: AssetKind,
    /// Payment units per sold unit, scaled by `PRECISION`.
    pub rate: u128,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOutcome {
    SoldOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOffer {
    /// Pool holds the unsold remainder.
    pub core: EntityCore<ExchangeOutcome>,
    pub payment: AssetKind,
    pub rate: u128,
    pub sold: Amount,
    /// Total payment routed to the maker.
    pub proceeds: Amount,
}

impl ExchangeOffer {
    pub fn maker(&self) -> &PartyId {
        &self.core.creator
    }

    pub fn remaining(&self) -> Amount {
        self.core.pool()
    }

    /// What buying `amount` costs at this offer's rate.
    pub fn quote(&self, amount: Amount) -> ContractResult<Amount> {
        let cost = pro_rata::scale(amount, self.rate)?;
        if cost == 0 {
            return Err(ContractError::PurchaseTooSmall { amount });
        }
        Ok(cost)
    }
}

pub struct ExchangeBook {
    ctx: ContractContext,
    registry: Registry<ExchangeOffer>,
}

impl ExchangeBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::ExchangeOffer);
        Self { ctx, registry }
    }

    /// Escrows the tokens from `maker` and opens the offer.
    pub fn create(&self, maker: &PartyId, params: ExchangeParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if !params.sell_asset.is_fungible() || !params.payment.is_fungible() {
            return Err(CovenantError::InvalidParameters(
                "exchange offers trade fungible assets".into(),
            )
            .into());
        }
        if params.sell_asset == params.payment {
            return Err(CovenantError::InvalidParameters(
                "cannot exchange an asset for itself".into(),
            )
            .into());
        }
        if params.sell_amount == 0 || params.rate == 0 {
            return Err(CovenantError::InvalidParameters(
                "amount and rate must be non-zero".into(),
            )
            .into());
        }
        let schedule = Schedule::new(now, params.deadline);
        schedule.validate(now)?;

        let id = self.registry.create_with(maker, |id| {
            let mut core = EntityCore::new(
                id,
                EntityKind::ExchangeOffer,
                maker.clone(),
                params.sell_asset.clone(),
                schedule,
                ContributionPolicy::Accumulate,
            );
            self.ctx
                .settlement
                .accept(&mut core, now, maker, params.sell_amount)?;
            Ok::<_, ContractError>(ExchangeOffer {
                core,
                payment: params.payment.clone(),
                rate: params.rate,
                sold: 0,
                proceeds: 0,
            })
        })?;

        info!(
            entity_id = id.0,
            sell_amount = params.sell_amount,
            rate = %format_rate(params.rate),
            "exchange offer opened"
        );
        Ok(id)
    }

    /// Buys `amount` of the offered token. Returns what the taker paid.
    ///
    /// # Errors
    ///
    /// [`ContractError::ExceedsRemaining`] beyond the unsold remainder,
    /// [`ContractError::PurchaseTooSmall`] if the cost rounds to zero.
    pub fn buy(&self, id: EntityId, taker: &PartyId, amount: Amount) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |offer| {
            self.ctx
                .exclude(taker, &offer.core.creator, "buy from their own offer")?;
            offer.core.ensure_open(now)?;
            if amount == 0 {
                return Err(CovenantError::ZeroAmount.into());
            }
            if amount > offer.remaining() {
                return Err(ContractError::ExceedsRemaining {
                    requested: amount,
                    remaining: offer.remaining(),
                });
            }
            let cost = offer.quote(amount)?;

            let orders = [
                TransferOrder::new(
                    offer.core.asset.clone(),
                    self.ctx.settlement.escrow(),
                    taker.clone(),
                    amount,
                ),
                TransferOrder::new(
                    offer.payment.clone(),
                    taker.clone(),
                    offer.core.creator.clone(),
                    cost,
                ),
            ];
            self.ctx
                .settlement
                .release_with(&mut offer.core, amount, &orders)?;
            offer.sold += amount;
            offer.proceeds += cost;

            if offer.remaining() == 0 {
                self.ctx
                    .settlement
                    .conclude(&mut offer.core, now, ExchangeOutcome::SoldOut)?;
            }
            info!(entity_id = id.0, taker = %taker, amount, cost, remaining = offer.remaining(), "tokens bought");
            Ok(cost)
        })
    }

    /// Maker takes back the unsold remainder and closes the offer. Once.
    pub fn reclaim(&self, id: EntityId, caller: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |offer| {
            self.ctx
                .authorize(caller, &offer.core.creator, "reclaim the offer")?;
            let remaining = offer.remaining();
            if remaining == 0 {
                return Err(ContractError::NothingToRelease);
            }

            let reason = if offer.core.schedule.accepts_contributions(now) {
                VoidReason::Cancelled
            } else {
                VoidReason::Expired
            };
            self.ctx
                .settlement
                .release(&mut offer.core, caller, remaining, PayoutPath::Refund)?;
            self.ctx.settlement.void(&mut offer.core, now, reason);
            info!(entity_id = id.0, remaining, %reason, "exchange offer closed");
            Ok(remaining)
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<ExchangeOffer> {
        self.registry.get(id)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    pub fn remaining(&self, id: EntityId) -> Amount {
        self.get(id).map_or(0, |o| o.remaining())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

/// Renders a scaled rate as a decimal for logs.
fn format_rate(rate: u128) -> String {
    format!("{}.{:018}", rate / PRECISION, rate % PRECISION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_renders_as_decimal() {
        assert_eq!(format_rate(PRECISION / 2), "0.500000000000000000");
        assert_eq!(format_rate(3 * PRECISION), "3.000000000000000000");
    }
}
