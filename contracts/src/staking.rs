//! # Fixed-Reward Staking Period
//!
//! The creator deposits a reward pool up front. Stakers lock value until the
//! stake deadline (inclusive); once the period end has passed (exclusive),
//! each staker claims their stake plus a pro-rata share of the reward:
//!
//! ```text
//! payout = stake + stake * reward_per_unit / PRECISION
//! reward_per_unit = reward_pool * PRECISION / total_stake
//! ```
//!
//! Shares round down. Once every staker has claimed, the creator sweeps the
//! rounding dust. If nobody staked, the creator reclaims the whole reward.

use chrono::{DateTime, Utc};
use covenant_protocol::settlement::pro_rata;
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, PayoutPath, Registry, Resolution, Schedule, VoidReason,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingParams {
    /// Asset staked and paid out as reward.
    pub asset: AssetKind,
    /// Reward deposited by the creator at creation. Must be non-zero.
    pub reward_pool: Amount,
    /// Last instant stakes are accepted.
    pub stake_deadline: DateTime<Utc>,
    /// Claims open strictly after this instant.
    pub period_end: DateTime<Utc>,
}

/// Frozen at resolution so every claim uses the same rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingOutcome {
    pub total_stake: Amount,
    pub reward_per_unit: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingPeriod {
    /// Pool of stakes.
    pub core: EntityCore<StakingOutcome>,
    /// Reward held in escrow alongside the stakes.
    pub reward_pool: Amount,
    pub rewards_paid: Amount,
    pub dust_swept: bool,
}

impl StakingPeriod {
    /// Reward still held in escrow.
    pub fn reward_remaining(&self) -> Amount {
        self.reward_pool - self.rewards_paid
    }
}

pub struct StakingBook {
    ctx: ContractContext,
    registry: Registry<StakingPeriod>,
}

impl StakingBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::Staking);
        Self { ctx, registry }
    }

    /// Collects the reward pool from `creator` and opens the staking period.
    pub fn create(&self, creator: &PartyId, params: StakingParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if params.reward_pool == 0 {
            return Err(
                CovenantError::InvalidParameters("reward pool must be non-zero".into()).into(),
            );
        }
        if !params.asset.is_fungible() {
            return Err(CovenantError::InvalidParameters("stakes must be fungible".into()).into());
        }
        if params.period_end <= params.stake_deadline {
            return Err(CovenantError::InvalidParameters(
                "period end must follow the stake deadline".into(),
            )
            .into());
        }
        let schedule = Schedule::new(now, params.stake_deadline)
            .with_resolution_delay(params.period_end - params.stake_deadline);
        schedule.validate(now)?;

        let id = self.registry.create_with(creator, |id| {
            self.ctx
                .settlement
                .collect(id, &params.asset, creator, params.reward_pool)?;
            Ok::<_, ContractError>(StakingPeriod {
                core: EntityCore::new(
                    id,
                    EntityKind::Staking,
                    creator.clone(),
                    params.asset.clone(),
                    schedule,
                    ContributionPolicy::Accumulate,
                ),
                reward_pool: params.reward_pool,
                rewards_paid: 0,
                dust_swept: false,
            })
        })?;

        info!(entity_id = id.0, reward_pool = params.reward_pool, "staking period opened");
        Ok(id)
    }

    /// Adds `amount` to `staker`'s stake. Returns the new stake.
    pub fn stake(&self, id: EntityId, staker: &PartyId, amount: Amount) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |period| {
            self.ctx
                .exclude(staker, &period.core.creator, "stake in their own reward period")?;
            let total = self
                .ctx
                .settlement
                .accept(&mut period.core, now, staker, amount)?;
            Ok(total)
        })
    }

    /// Pays `staker` their stake plus reward share, once.
    pub fn claim(&self, id: EntityId, staker: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |period| {
            let outcome = match self.resolve_in(period, now)? {
                Resolution::Decided(outcome) => outcome,
                Resolution::Voided(_) => {
                    return Err(CovenantError::NoContribution {
                        party: staker.clone(),
                    }
                    .into())
                }
            };

            let stake = period.core.amount_of(staker);
            let reward = pro_rata::share(stake, outcome.reward_per_unit)?;
            if reward > period.reward_remaining() {
                return Err(CovenantError::InsufficientPool {
                    requested: reward,
                    available: period.reward_remaining(),
                }
                .into());
            }

            let paid = self.ctx.settlement.pay_entry(
                &mut period.core,
                staker,
                staker,
                reward,
                PayoutPath::Primary,
            )?;
            period.rewards_paid += reward;
            info!(entity_id = id.0, staker = %staker, stake, reward, "stake claimed");
            Ok(paid)
        })
    }

    /// Creator collects the unpaid reward: rounding dust after every staker
    /// has claimed, or the whole reward if nobody staked. Once.
    pub fn sweep(&self, id: EntityId, caller: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |period| {
            self.ctx
                .authorize(caller, &period.core.creator, "sweep the reward pool")?;
            if let Resolution::Decided(_) = self.resolve_in(period, now)? {
                let remaining = period.core.ledger().outstanding();
                if remaining > 0 {
                    return Err(ContractError::StakesOutstanding { remaining });
                }
            }
            if period.dust_swept {
                return Err(CovenantError::AlreadyClaimed { party: caller.clone() }.into());
            }
            let amount = period.reward_remaining();
            if amount == 0 {
                return Err(ContractError::NothingToRelease);
            }

            period.dust_swept = true;
            period.rewards_paid += amount;
            if let Err(err) = self.ctx.settlement.deliver(
                id,
                &period.core.asset,
                caller,
                amount,
                PayoutPath::Release,
            ) {
                period.dust_swept = false;
                period.rewards_paid -= amount;
                return Err(err.into());
            }
            info!(entity_id = id.0, amount, "reward remainder swept");
            Ok(amount)
        })
    }

    fn resolve_in(&self, period: &mut StakingPeriod, now: DateTime<Utc>) -> ContractResult<Resolution<StakingOutcome>> {
        let reward_pool = period.reward_pool;
        let resolution = self.ctx.settlement.resolve(&mut period.core, now, |core| {
            let total_stake = core.ledger().total_recorded();
            if total_stake == 0 {
                return Ok(Resolution::Voided(VoidReason::NoParticipants));
            }
            Ok(Resolution::Decided(StakingOutcome {
                total_stake,
                reward_per_unit: pro_rata::reward_per_unit(reward_pool, total_stake)?,
            }))
        })?;
        Ok(resolution)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<StakingPeriod> {
        self.registry.get(id)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    /// `staker`'s unclaimed stake.
    pub fn amount_of(&self, id: EntityId, staker: &PartyId) -> Amount {
        self.get(id).map_or(0, |p| p.core.amount_of(staker))
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
