//! # Linear Vesting
//!
//! The creator funds the full amount at creation. It vests linearly from
//! `start` to `end`, with nothing vested before `cliff`:
//!
//! ```text
//! vested(t) = 0                                   t < cliff
//!           = total * (t - start) / (end - start)  cliff <= t < end
//!           = total                               t >= end
//! ```
//!
//! The beneficiary releases whatever has vested but not yet been released.
//! The creator may revoke while anything is still unvested: vesting freezes
//! at the revocation instant, the unvested part returns to the creator, and
//! the vested part stays releasable by the beneficiary.

use chrono::{DateTime, Utc};
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, PayoutPath, Registry, Schedule,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingParams {
    pub beneficiary: PartyId,
    pub asset: AssetKind,
    /// Funded by the creator at creation. Must be non-zero.
    pub total: Amount,
    pub start: DateTime<Utc>,
    pub cliff: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Vesting has no decided outcome beyond "fully paid out".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingCompleted;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingSchedule {
    /// Pool holds the funded amount not yet released or revoked.
    pub core: EntityCore<VestingCompleted>,
    pub beneficiary: PartyId,
    pub total: Amount,
    pub start: DateTime<Utc>,
    pub cliff: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub released: Amount,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl VestingSchedule {
    /// Amount vested at `at`, frozen at the revocation instant if revoked.
    pub fn vested_at(&self, at: DateTime<Utc>) -> Amount {
        let at = match self.revoked_at {
            Some(revoked) if revoked < at => revoked,
            _ => at,
        };
        if at < self.cliff {
            return 0;
        }
        if at >= self.end {
            return self.total;
        }
        let elapsed = (at - self.start).num_seconds().max(0) as u128;
        let span = (self.end - self.start).num_seconds().max(1) as u128;
        // elapsed < span, so the result is below `total` and fits.
        (u128::from(self.total) * elapsed / span) as Amount
    }

    /// Vested and not yet released.
    pub fn releasable_at(&self, at: DateTime<Utc>) -> Amount {
        self.vested_at(at).saturating_sub(self.released)
    }
}

pub struct VestingBook {
    ctx: ContractContext,
    registry: Registry<VestingSchedule>,
}

impl VestingBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::Vesting);
        Self { ctx, registry }
    }

    /// Pulls `total` from `creator` and starts the schedule.
    pub fn create(&self, creator: &PartyId, params: VestingParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if params.total == 0 {
            return Err(
                CovenantError::InvalidParameters("vesting total must be non-zero".into()).into(),
            );
        }
        if !params.asset.is_fungible() {
            return Err(CovenantError::InvalidParameters("vesting needs a fungible asset".into()).into());
        }
        if !(params.start <= params.cliff && params.cliff <= params.end && params.start < params.end) {
            return Err(CovenantError::InvalidParameters(
                "expected start <= cliff <= end and start < end".into(),
            )
            .into());
        }
        let schedule = Schedule::new(now, params.end);
        schedule.validate(now)?;

        let id = self.registry.create_with(creator, |id| {
            let mut core = EntityCore::new(
                id,
                EntityKind::Vesting,
                creator.clone(),
                params.asset.clone(),
                schedule,
                ContributionPolicy::Accumulate,
            );
            self.ctx
                .settlement
                .accept(&mut core, now, creator, params.total)?;
            Ok::<_, ContractError>(VestingSchedule {
                core,
                beneficiary: params.beneficiary.clone(),
                total: params.total,
                start: params.start,
                cliff: params.cliff,
                end: params.end,
                released: 0,
                revoked_at: None,
            })
        })?;

        info!(
            entity_id = id.0,
            beneficiary = %params.beneficiary,
            total = params.total,
            "vesting schedule funded"
        );
        Ok(id)
    }

    /// Pays the beneficiary everything vested and not yet released.
    pub fn release(&self, id: EntityId, caller: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |vesting| {
            self.ctx
                .authorize(caller, &vesting.beneficiary, "release vested funds")?;
            self.ctx.settlement.observe(&mut vesting.core, now);
            let amount = vesting.releasable_at(now);
            if amount == 0 {
                return Err(ContractError::NothingToRelease);
            }

            vesting.released += amount;
            if let Err(err) = self.ctx.settlement.release(
                &mut vesting.core,
                caller,
                amount,
                PayoutPath::Primary,
            ) {
                vesting.released -= amount;
                return Err(err.into());
            }
            self.complete_if_drained(vesting, now)?;
            info!(entity_id = id.0, amount, released = vesting.released, "vested funds released");
            Ok(amount)
        })
    }

    /// Creator takes back the unvested remainder and freezes vesting.
    pub fn revoke(&self, id: EntityId, caller: &PartyId) -> ContractResult<Amount> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |vesting| {
            self.ctx
                .authorize(caller, &vesting.core.creator, "revoke the vesting schedule")?;
            if vesting.revoked_at.is_some() {
                return Err(ContractError::AlreadyRevoked);
            }
            let unvested = vesting.total - vesting.vested_at(now);
            if unvested == 0 {
                return Err(ContractError::NothingToRelease);
            }

            vesting.revoked_at = Some(now);
            if let Err(err) = self.ctx.settlement.release(
                &mut vesting.core,
                caller,
                unvested,
                PayoutPath::Refund,
            ) {
                vesting.revoked_at = None;
                return Err(err.into());
            }
            self.complete_if_drained(vesting, now)?;
            info!(entity_id = id.0, unvested, "vesting revoked");
            Ok(unvested)
        })
    }

    fn complete_if_drained(&self, vesting: &mut VestingSchedule, now: DateTime<Utc>) -> ContractResult<()> {
        if vesting.core.pool() == 0 && vesting.core.outcome().is_none() {
            self.ctx
                .settlement
                .conclude(&mut vesting.core, now, VestingCompleted)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<VestingSchedule> {
        self.registry.get(id)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    /// What the beneficiary could release right now.
    pub fn releasable(&self, id: EntityId) -> Amount {
        let now = self.ctx.now();
        self.get(id).map_or(0, |v| v.releasable_at(now))
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
