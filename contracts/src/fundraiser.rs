//! # Fundraiser
//!
//! All-or-nothing crowdfunding. Donors pool value toward a goal until the
//! deadline; afterwards exactly one of two things happens:
//!
//! - **goal met**: the beneficiary (creator) withdraws the whole pool once;
//! - **goal not met**: every donor refunds their own donation once.
//!
//! Native-value and token fundraisers are the same entity with a different
//! [`AssetKind`]. An optional per-donor cap bounds each donor's total.

use chrono::{DateTime, Utc};
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, Phase, Registry, Resolution, Schedule,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Creation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundraiserParams {
    /// What donors contribute.
    pub asset: AssetKind,
    /// Minimum total for the beneficiary to collect. Must be non-zero.
    pub goal: Amount,
    /// Last instant donations are accepted.
    pub deadline: DateTime<Utc>,
    /// Optional ceiling on any one donor's total.
    pub per_donor_cap: Option<Amount>,
}

/// How the fundraiser ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundraiserOutcome {
    GoalMet { raised: Amount },
    GoalNotMet { raised: Amount },
}

impl FundraiserOutcome {
    pub fn goal_met(&self) -> bool {
        matches!(self, FundraiserOutcome::GoalMet { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fundraiser {
    pub core: EntityCore<FundraiserOutcome>,
    pub goal: Amount,
}

impl Fundraiser {
    pub fn beneficiary(&self) -> &PartyId {
        &self.core.creator
    }

    pub fn raised(&self) -> Amount {
        self.core.ledger().total_recorded()
    }
}

// ---------------------------------------------------------------------------
// FundraiserBook
// ---------------------------------------------------------------------------

/// Registry of fundraisers and the operations on them.
pub struct FundraiserBook {
    ctx: ContractContext,
    registry: Registry<Fundraiser>,
}

impl FundraiserBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::Fundraiser);
        Self { ctx, registry }
    }

    /// Opens a fundraiser with `creator` as beneficiary.
    ///
    /// # Errors
    ///
    /// [`CovenantError::InvalidParameters`] for a zero goal or cap, a unique
    /// item as the asset, or a deadline not in the future.
    pub fn create(&self, creator: &PartyId, params: FundraiserParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if params.goal == 0 {
            return Err(CovenantError::InvalidParameters("goal must be non-zero".into()).into());
        }
        if !params.asset.is_fungible() {
            return Err(CovenantError::InvalidParameters(
                "fundraisers pool fungible assets only".into(),
            )
            .into());
        }
        let policy = match params.per_donor_cap {
            Some(0) => {
                return Err(
                    CovenantError::InvalidParameters("per-donor cap must be non-zero".into()).into(),
                )
            }
            Some(cap) => ContributionPolicy::Capped { per_party: cap },
            None => ContributionPolicy::Accumulate,
        };
        let schedule = Schedule::new(now, params.deadline);
        schedule.validate(now)?;

        let id = self.registry.create_with(creator, |id| {
            Ok::<_, ContractError>(Fundraiser {
                core: EntityCore::new(
                    id,
                    EntityKind::Fundraiser,
                    creator.clone(),
                    params.asset.clone(),
                    schedule,
                    policy,
                ),
                goal: params.goal,
            })
        })?;

        info!(entity_id = id.0, goal = params.goal, asset = %params.asset, "fundraiser opened");
        Ok(id)
    }

    /// Pulls `amount` from `donor` into the pool. Returns the donor's total.
    pub fn donate(&self, id: EntityId, donor: &PartyId, amount: Amount) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |fundraiser| {
            self.ctx
                .exclude(donor, &fundraiser.core.creator, "donate to their own fundraiser")?;
            let total = self
                .ctx
                .settlement
                .accept(&mut fundraiser.core, now, donor, amount)?;
            Ok(total)
        })
    }

    /// Decides goal met / not met. Idempotent.
    pub fn resolve(&self, id: EntityId) -> ContractResult<FundraiserOutcome> {
        let now = self.ctx.now();
        self.registry
            .with_entity(id, |fundraiser| self.resolve_in(fundraiser, now))
    }

    /// Beneficiary collects the whole pool, once, if the goal was met.
    ///
    /// # Errors
    ///
    /// [`ContractError::GoalNotMet`] if it was not, `NotAuthorized` for anyone
    /// but the beneficiary, `AlreadyClaimed` on a second call.
    pub fn withdraw(&self, id: EntityId, caller: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |fundraiser| {
            self.ctx
                .authorize(caller, &fundraiser.core.creator, "withdraw the raised funds")?;
            match self.resolve_in(fundraiser, now)? {
                FundraiserOutcome::GoalNotMet { raised } => Err(ContractError::GoalNotMet {
                    goal: fundraiser.goal,
                    raised,
                }),
                FundraiserOutcome::GoalMet { .. } => {
                    let pool = fundraiser.core.pool();
                    let paid = self
                        .ctx
                        .settlement
                        .pay_primary(&mut fundraiser.core, caller, pool)?;
                    info!(entity_id = id.0, beneficiary = %caller, amount = paid, "fundraiser withdrawn");
                    Ok(paid)
                }
            }
        })
    }

    /// Donor takes back their donation, once, if the goal was not met.
    pub fn refund(&self, id: EntityId, donor: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |fundraiser| {
            if self.resolve_in(fundraiser, now)?.goal_met() {
                return Err(ContractError::RefundsClosed);
            }
            let refunded = self.ctx.settlement.refund(&mut fundraiser.core, donor)?;
            Ok(refunded)
        })
    }

    fn resolve_in(&self, fundraiser: &mut Fundraiser, now: DateTime<Utc>) -> ContractResult<FundraiserOutcome> {
        let goal = fundraiser.goal;
        let resolution = self
            .ctx
            .settlement
            .resolve(&mut fundraiser.core, now, |core| {
                let raised = core.ledger().total_recorded();
                Ok(Resolution::Decided(if raised >= goal {
                    FundraiserOutcome::GoalMet { raised }
                } else {
                    FundraiserOutcome::GoalNotMet { raised }
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

    pub fn get(&self, id: EntityId) -> Option<Fundraiser> {
        self.registry.get(id)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    /// `donor`'s unrefunded donation; zero for strangers.
    pub fn amount_of(&self, id: EntityId, donor: &PartyId) -> Amount {
        self.get(id).map_or(0, |f| f.core.amount_of(donor))
    }

    pub fn donor_count(&self, id: EntityId) -> usize {
        self.get(id)
            .map_or(0, |f| f.core.ledger().participant_count())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
