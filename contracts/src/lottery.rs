//! # Lottery
//!
//! Fixed-price, one ticket per party, winner takes the pool.
//!
//! ## Lifecycle
//!
//! ```text
//! buy_ticket (now <= deadline)
//!   → draw   (now > deadline + resolution_delay, entropy readable)
//!   → claim  (winner only, within the claim window)
//! ```
//!
//! The winner is drawn from an entropy unit scheduled at creation. If that
//! unit falls out of the source's lookback before anyone draws, or the winner
//! lets the claim window lapse, the lottery is voided and every ticket holder
//! refunds their own ticket. A lottery with no tickets voids with nothing to
//! refund.
//!
//! The creator may not buy tickets.

use chrono::{DateTime, Duration, Utc};
use covenant_protocol::entropy::{draw_index, EntropyHandle, EntropyState};
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, Registry, Resolution, Schedule, VoidReason,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

/// Creation parameters. Unset durations fall back to the engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryParams {
    pub asset: AssetKind,
    /// Exact price of the single ticket each party may buy.
    pub ticket_price: Amount,
    /// Last instant tickets are sold.
    pub deadline: DateTime<Utc>,
    pub resolution_delay: Option<Duration>,
    pub claim_window: Option<Duration>,
}

/// The drawn winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryOutcome {
    pub winner: PartyId,
    /// Position of the winner in ticket-purchase order.
    pub winning_index: usize,
    pub prize: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lottery {
    pub core: EntityCore<LotteryOutcome>,
    pub ticket_price: Amount,
    pub entropy: EntropyHandle,
}

pub struct LotteryBook {
    ctx: ContractContext,
    registry: Registry<Lottery>,
}

impl LotteryBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::Lottery);
        Self { ctx, registry }
    }

    /// Opens a lottery and schedules the entropy unit it will draw from.
    pub fn create(&self, creator: &PartyId, params: LotteryParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if params.ticket_price == 0 {
            return Err(
                CovenantError::InvalidParameters("ticket price must be non-zero".into()).into(),
            );
        }
        if !params.asset.is_fungible() {
            return Err(CovenantError::InvalidParameters(
                "tickets must be priced in a fungible asset".into(),
            )
            .into());
        }

        let config = &self.ctx.config;
        let schedule = Schedule::new(now, params.deadline)
            .with_resolution_delay(
                params
                    .resolution_delay
                    .unwrap_or_else(|| Duration::seconds(config.resolution_delay_secs)),
            )
            .with_claim_window(
                params
                    .claim_window
                    .unwrap_or_else(|| Duration::seconds(config.claim_window_secs)),
            );
        schedule.validate(now)?;

        let entropy = EntropyHandle::schedule(
            self.ctx.entropy.as_ref(),
            now,
            schedule.resolvable_at(),
            config.unit_time_secs,
            config.entropy_lookback,
        );

        let id = self.registry.create_with(creator, |id| {
            Ok::<_, ContractError>(Lottery {
                core: EntityCore::new(
                    id,
                    EntityKind::Lottery,
                    creator.clone(),
                    params.asset.clone(),
                    schedule,
                    ContributionPolicy::SingleTicket {
                        price: params.ticket_price,
                    },
                ),
                ticket_price: params.ticket_price,
                entropy,
            })
        })?;

        info!(
            entity_id = id.0,
            ticket_price = params.ticket_price,
            entropy_target = entropy.target_unit,
            "lottery opened"
        );
        Ok(id)
    }

    /// Buys `party`'s single ticket at the exact ticket price.
    pub fn buy_ticket(&self, id: EntityId, party: &PartyId, amount: Amount) -> ContractResult<()> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |lottery| {
            self.ctx
                .exclude(party, &lottery.core.creator, "buy a ticket in their own lottery")?;
            self.ctx
                .settlement
                .accept(&mut lottery.core, now, party, amount)?;
            Ok(())
        })
    }

    /// Draws the winner, or voids the lottery. Idempotent once it succeeds.
    ///
    /// # Errors
    ///
    /// `ResolutionNotReady` before `deadline + resolution_delay`,
    /// `EntropyPending` while the scheduled unit has not been produced.
    pub fn draw(&self, id: EntityId) -> ContractResult<Resolution<LotteryOutcome>> {
        let now = self.ctx.now();
        self.registry
            .with_entity(id, |lottery| self.draw_in(lottery, now))
    }

    /// Pays the pool to the winner, once.
    pub fn claim(&self, id: EntityId, caller: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |lottery| {
            self.draw_in(lottery, now)?;
            let outcome = lottery.core.require_outcome()?.clone();
            if lottery.core.payout_done() {
                return Err(CovenantError::AlreadyClaimed { party: caller.clone() }.into());
            }
            self.ctx
                .authorize(caller, &outcome.winner, "claim the lottery prize")?;
            let paid = self
                .ctx
                .settlement
                .pay_primary(&mut lottery.core, caller, outcome.prize)?;
            info!(entity_id = id.0, winner = %caller, prize = paid, "lottery prize claimed");
            Ok(paid)
        })
    }

    /// Refunds `party`'s ticket from a voided lottery, once.
    pub fn refund(&self, id: EntityId, party: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |lottery| {
            self.draw_in(lottery, now)?;
            lottery.core.require_voided()?;
            let refunded = self.ctx.settlement.refund(&mut lottery.core, party)?;
            Ok(refunded)
        })
    }

    fn draw_in(&self, lottery: &mut Lottery, now: DateTime<Utc>) -> ContractResult<Resolution<LotteryOutcome>> {
        let handle = lottery.entropy;
        let source = self.ctx.entropy.as_ref();
        let resolution = self.ctx.settlement.resolve(&mut lottery.core, now, |core| {
            let tickets = core.ledger().participants();
            if tickets.is_empty() {
                return Ok(Resolution::Voided(VoidReason::NoParticipants));
            }
            match handle.poll(source) {
                EntropyState::Pending { target, current } => {
                    Err(CovenantError::EntropyPending { target, current })
                }
                EntropyState::Expired => Ok(Resolution::Voided(VoidReason::EntropyExpired)),
                EntropyState::Readable(seed) => {
                    let index = draw_index(&seed, core.id, tickets.len()).ok_or(
                        CovenantError::InvalidState {
                            current: core.phase(),
                            expected: "at least one ticket",
                        },
                    )?;
                    Ok(Resolution::Decided(LotteryOutcome {
                        winner: tickets[index].clone(),
                        winning_index: index,
                        prize: core.pool(),
                    }))
                }
            }
        })?;
        Ok(resolution)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<Lottery> {
        self.registry.get(id)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    /// What `party` paid for a still-refundable ticket.
    pub fn amount_of(&self, id: EntityId, party: &PartyId) -> Amount {
        self.get(id).map_or(0, |l| l.core.amount_of(party))
    }

    pub fn has_ticket(&self, id: EntityId, party: &PartyId) -> bool {
        self.get(id)
            .map_or(false, |l| l.core.ledger().has_contributed(party))
    }

    pub fn ticket_count(&self, id: EntityId) -> usize {
        self.get(id)
            .map_or(0, |l| l.core.ledger().participant_count())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
