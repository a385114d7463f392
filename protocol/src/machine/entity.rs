//! # Entity Core
//!
//! [`EntityCore`] is the shape every agreement shares: identity, creator,
//! pooled asset, schedule, pool balance, contribution ledger, and the
//! memoized outcome. Agreement variants embed it and add their own fields.
//!
//! Phase transitions are lazy. There is no timer: every entry point calls
//! [`EntityCore::observe`] with the current time, and the entity catches up
//! (Open → Locked after the deadline, Resolved → Voided after an unclaimed
//! claim window) before the operation is checked.
//!
//! The pool is only ever changed by [`record_contribution`](EntityCore::record_contribution)
//! (up) and the settlement engine (down, with rollback). Conservation,
//! `pool + paid_out == ledger.total_recorded()`, holds after every call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::{Phase, Resolution, VoidReason};
use super::schedule::Schedule;
use crate::error::{CovenantError, Result};
use crate::ledger::{ContributionLedger, ContributionPolicy};
use crate::types::{Amount, AssetKind, EntityId, EntityKind, PartyId};

/// When and why an entity was voided, and what the pool held at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidRecord {
    pub reason: VoidReason,
    pub at: DateTime<Utc>,
    pub pool_at_void: Amount,
}

/// The lifecycle state shared by every agreement variant.
///
/// `O` is the variant's outcome type (winner, goal-met flag, clearing price...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCore<O> {
    /// Assigned by the registry; never changes.
    pub id: EntityId,
    pub kind: EntityKind,
    pub creator: PartyId,
    /// What the pool is denominated in.
    pub asset: AssetKind,
    pub schedule: Schedule,
    pool: Amount,
    paid_out: Amount,
    phase: Phase,
    outcome: Option<O>,
    payout_done: bool,
    resolved_at: Option<DateTime<Utc>>,
    void: Option<VoidRecord>,
    ledger: ContributionLedger,
}

impl<O: Clone> EntityCore<O> {
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        creator: PartyId,
        asset: AssetKind,
        schedule: Schedule,
        policy: ContributionPolicy,
    ) -> Self {
        Self {
            id,
            kind,
            creator,
            asset,
            schedule,
            pool: 0,
            paid_out: 0,
            phase: Phase::Open,
            outcome: None,
            payout_done: false,
            resolved_at: None,
            void: None,
            ledger: ContributionLedger::new(policy),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Phase as of the last observation. Call [`observe`](Self::observe)
    /// first for the phase as of a given time.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pool(&self) -> Amount {
        self.pool
    }

    /// Total that has left the pool through any payout path.
    pub fn paid_out(&self) -> Amount {
        self.paid_out
    }

    pub fn outcome(&self) -> Option<&O> {
        self.outcome.as_ref()
    }

    pub fn payout_done(&self) -> bool {
        self.payout_done
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn void_record(&self) -> Option<&VoidRecord> {
        self.void.as_ref()
    }

    pub fn ledger(&self) -> &ContributionLedger {
        &self.ledger
    }

    pub fn amount_of(&self, party: &PartyId) -> Amount {
        self.ledger.amount_of(party)
    }

    /// The memoized resolution, if one exists.
    ///
    /// A void wins over an earlier outcome: a decided winner who let the
    /// claim window lapse no longer has a claim.
    pub fn resolution(&self) -> Option<Resolution<O>> {
        if let Some(record) = &self.void {
            return Some(Resolution::Voided(record.reason));
        }
        self.outcome.clone().map(Resolution::Decided)
    }

    /// `pool + paid_out == total recorded`.
    pub fn is_conserved(&self) -> bool {
        self.pool
            .checked_add(self.paid_out)
            .map_or(false, |sum| sum == self.ledger.total_recorded())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Applies every transition that time alone triggers and returns the
    /// resulting phase.
    pub fn observe(&mut self, now: DateTime<Utc>) -> Phase {
        if self.phase == Phase::Open && !self.schedule.accepts_contributions(now) {
            self.phase = Phase::Locked;
        }
        if self.phase == Phase::Resolved
            && !self.payout_done
            && self.schedule.claim_window_lapsed(now)
        {
            self.void(now, VoidReason::ClaimWindowLapsed);
        }
        self.phase
    }

    /// # Errors
    ///
    /// [`CovenantError::DeadlinePassed`] after the deadline,
    /// [`CovenantError::InvalidState`] if the entity left Open early
    /// (cancelled).
    pub fn ensure_open(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.observe(now) {
            Phase::Open => Ok(()),
            _ if now > self.schedule.deadline => Err(CovenantError::DeadlinePassed {
                deadline: self.schedule.deadline,
                now,
            }),
            current => Err(CovenantError::InvalidState {
                current,
                expected: "Open",
            }),
        }
    }

    /// Checks every precondition of a contribution without changing anything
    /// except the lazily observed phase.
    pub fn check_contribution(&mut self, now: DateTime<Utc>, party: &PartyId, amount: Amount) -> Result<()> {
        self.ensure_open(now)?;
        self.ledger.check(party, amount)?;
        self.pool
            .checked_add(amount)
            .ok_or(CovenantError::AmountOverflow)?;
        Ok(())
    }

    /// Records a contribution and grows the pool. Returns the party's new
    /// total. The value itself must already have been pulled into escrow.
    pub fn record_contribution(&mut self, now: DateTime<Utc>, party: &PartyId, amount: Amount) -> Result<Amount> {
        self.check_contribution(now, party, amount)?;
        let total = self.ledger.record(party, amount, now)?;
        self.pool += amount;
        Ok(total)
    }

    /// # Errors
    ///
    /// [`CovenantError::ResolutionNotReady`] until `deadline + resolution_delay`
    /// has passed.
    pub fn ensure_resolvable(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.observe(now);
        if !self.schedule.is_resolvable(now) {
            return Err(CovenantError::ResolutionNotReady {
                ready_at: self.schedule.resolvable_at(),
                now,
            });
        }
        Ok(())
    }

    /// Computes the outcome once and memoizes it.
    ///
    /// If a resolution already exists it is returned unchanged and `decide`
    /// is not called, so recomputing at a different time cannot change the
    /// result. A first resolution made after the claim window has already
    /// lapsed voids in the same call.
    pub fn resolve_with<F>(&mut self, now: DateTime<Utc>, decide: F) -> Result<Resolution<O>>
    where
        F: FnOnce(&Self) -> Result<Resolution<O>>,
    {
        self.observe(now);
        if let Some(existing) = self.resolution() {
            return Ok(existing);
        }

        self.ensure_resolvable(now)?;

        let resolution = decide(self)?;
        match &resolution {
            Resolution::Decided(outcome) => {
                self.outcome = Some(outcome.clone());
                self.phase = Phase::Resolved;
                self.resolved_at = Some(now);
                self.refresh_settled();
                self.observe(now);
            }
            Resolution::Voided(reason) => self.void(now, *reason),
        }
        Ok(self.resolution().unwrap_or(resolution))
    }

    /// Records an outcome reached by the parties themselves (a purchase, an
    /// executed swap) rather than by time. Only valid while no resolution
    /// exists.
    pub fn conclude(&mut self, now: DateTime<Utc>, outcome: O) -> Result<()> {
        if self.outcome.is_some() || self.phase.is_terminal() {
            return Err(CovenantError::InvalidState {
                current: self.phase,
                expected: "Open or Locked",
            });
        }
        self.outcome = Some(outcome);
        self.phase = Phase::Resolved;
        self.resolved_at = Some(now);
        self.refresh_settled();
        Ok(())
    }

    /// Moves the entity to Voided. No-op once terminal.
    pub fn void(&mut self, now: DateTime<Utc>, reason: VoidReason) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = Phase::Voided;
        self.void = Some(VoidRecord {
            reason,
            at: now,
            pool_at_void: self.pool,
        });
    }

    /// Resolved entities whose pool is drained become Settled.
    pub fn refresh_settled(&mut self) {
        if self.phase == Phase::Resolved && self.pool == 0 {
            self.phase = Phase::Settled;
        }
    }

    /// The decided outcome.
    ///
    /// # Errors
    ///
    /// [`CovenantError::InvalidState`] if none exists (not resolved yet, or voided).
    pub fn require_outcome(&self) -> Result<&O> {
        match &self.outcome {
            Some(outcome) if self.phase != Phase::Voided => Ok(outcome),
            _ => Err(CovenantError::InvalidState {
                current: self.phase,
                expected: "Resolved",
            }),
        }
    }

    /// # Errors
    ///
    /// [`CovenantError::InvalidState`] unless the entity is Voided.
    pub fn require_voided(&self) -> Result<()> {
        if self.phase != Phase::Voided {
            return Err(CovenantError::InvalidState {
                current: self.phase,
                expected: "Voided",
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Settlement hooks (two-phase payout)
    // -----------------------------------------------------------------------

    pub(crate) fn debit_pool(&mut self, amount: Amount) -> Result<()> {
        if amount > self.pool {
            return Err(CovenantError::InsufficientPool {
                requested: amount,
                available: self.pool,
            });
        }
        self.pool -= amount;
        self.paid_out += amount;
        Ok(())
    }

    pub(crate) fn credit_back(&mut self, amount: Amount) {
        self.pool += amount;
        self.paid_out -= amount;
    }

    pub(crate) fn set_payout_done(&mut self, done: bool) {
        self.payout_done = done;
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut ContributionLedger {
        &mut self.ledger
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
