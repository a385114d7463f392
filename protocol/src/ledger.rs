//! # Contribution Ledger
//!
//! Per-entity record of who put how much into the pool. The ledger is the
//! source of truth for refunds and pro-rata payouts, and it is where the
//! per-party participation rules live:
//!
//! - **Single ticket**: one fixed-price contribution per party (lotteries).
//! - **Accumulate**: unlimited top-ups (donations, stakes, bids).
//! - **Capped**: top-ups up to a per-party ceiling.
//!
//! ## Bookkeeping
//!
//! `total_recorded` only grows. `total_claimed` grows when an entry is paid
//! out (refunded, consumed by a winning bid, unstaked) and shrinks only when
//! a failed transfer rolls the claim back. At every observation point
//! `total_recorded - total_claimed` equals the sum of unclaimed entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CovenantError, Result};
use crate::types::{Amount, PartyId};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Participation rule applied by [`ContributionLedger::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributionPolicy {
    /// Exactly one contribution of exactly `price` per party.
    SingleTicket { price: Amount },
    /// Any number of contributions of any size.
    Accumulate,
    /// Any number of contributions while the party's total stays within `per_party`.
    Capped { per_party: Amount },
}

// ---------------------------------------------------------------------------
// Contribution
// ---------------------------------------------------------------------------

/// One party's position in an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Current (unclaimed or last-claimed) amount.
    pub amount: Amount,
    /// Set once the amount has been paid out. Flipped before the transfer
    /// and back again only if the transfer fails.
    pub claimed: bool,
    /// When the party first contributed.
    pub first_contributed_at: DateTime<Utc>,
    /// Position in first-contribution order.
    pub index: usize,
}

// ---------------------------------------------------------------------------
// ContributionLedger
// ---------------------------------------------------------------------------

/// Contributions of every party to a single entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionLedger {
    policy: ContributionPolicy,
    entries: BTreeMap<PartyId, Contribution>,
    order: Vec<PartyId>,
    total_recorded: Amount,
    total_claimed: Amount,
}

impl ContributionLedger {
    pub fn new(policy: ContributionPolicy) -> Self {
        Self {
            policy,
            entries: BTreeMap::new(),
            order: Vec::new(),
            total_recorded: 0,
            total_claimed: 0,
        }
    }

    pub fn policy(&self) -> ContributionPolicy {
        self.policy
    }

    /// Checks whether `record(party, amount)` would succeed, without
    /// changing anything.
    ///
    /// # Errors
    ///
    /// [`CovenantError::ZeroAmount`], [`CovenantError::AlreadyContributed`],
    /// [`CovenantError::InvalidAmount`], [`CovenantError::ContributionCapExceeded`]
    /// or [`CovenantError::AmountOverflow`].
    pub fn check(&self, party: &PartyId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(CovenantError::ZeroAmount);
        }

        match self.policy {
            ContributionPolicy::SingleTicket { price } => {
                if self.entries.contains_key(party) {
                    return Err(CovenantError::AlreadyContributed {
                        party: party.clone(),
                    });
                }
                if amount != price {
                    return Err(CovenantError::InvalidAmount {
                        expected: price,
                        got: amount,
                    });
                }
            }
            ContributionPolicy::Accumulate => {}
            ContributionPolicy::Capped { per_party } => {
                let attempted = self
                    .amount_of(party)
                    .checked_add(amount)
                    .ok_or(CovenantError::AmountOverflow)?;
                if attempted > per_party {
                    return Err(CovenantError::ContributionCapExceeded {
                        cap: per_party,
                        attempted,
                    });
                }
            }
        }

        self.amount_of(party)
            .checked_add(amount)
            .ok_or(CovenantError::AmountOverflow)?;
        self.total_recorded
            .checked_add(amount)
            .ok_or(CovenantError::AmountOverflow)?;
        Ok(())
    }

    /// Records a contribution and returns the party's new unclaimed total.
    ///
    /// A party whose earlier position was already paid out starts a fresh
    /// position (accumulating policies only; single tickets stay rejected).
    pub fn record(&mut self, party: &PartyId, amount: Amount, at: DateTime<Utc>) -> Result<Amount> {
        self.check(party, amount)?;

        if !self.entries.contains_key(party) {
            self.order.push(party.clone());
        }

        let index = self.order.len() - 1;
        let entry = self.entries.entry(party.clone()).or_insert_with(|| Contribution {
            amount: 0,
            claimed: false,
            first_contributed_at: at,
            index,
        });

        if entry.claimed {
            entry.amount = 0;
            entry.claimed = false;
        }
        entry.amount += amount;
        self.total_recorded += amount;
        Ok(entry.amount)
    }

    /// Unclaimed amount for `party`; zero if unknown or already paid out.
    pub fn amount_of(&self, party: &PartyId) -> Amount {
        self.entries
            .get(party)
            .filter(|c| !c.claimed)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    pub fn contribution(&self, party: &PartyId) -> Option<&Contribution> {
        self.entries.get(party)
    }

    pub fn has_contributed(&self, party: &PartyId) -> bool {
        self.entries.contains_key(party)
    }

    /// Parties in the order they first contributed.
    pub fn participants(&self) -> &[PartyId] {
        &self.order
    }

    pub fn participant_count(&self) -> usize {
        self.order.len()
    }

    /// Reserves `party`'s amount for payout and returns it.
    ///
    /// # Errors
    ///
    /// [`CovenantError::NoContribution`] if the party never contributed,
    /// [`CovenantError::AlreadyClaimed`] if it was already paid out.
    pub fn mark_claimed(&mut self, party: &PartyId) -> Result<Amount> {
        let entry = self
            .entries
            .get_mut(party)
            .ok_or_else(|| CovenantError::NoContribution {
                party: party.clone(),
            })?;

        if entry.claimed {
            return Err(CovenantError::AlreadyClaimed {
                party: party.clone(),
            });
        }

        entry.claimed = true;
        self.total_claimed += entry.amount;
        Ok(entry.amount)
    }

    /// Undoes [`mark_claimed`](Self::mark_claimed) after a failed transfer.
    pub fn reopen(&mut self, party: &PartyId) {
        if let Some(entry) = self.entries.get_mut(party) {
            if entry.claimed {
                entry.claimed = false;
                self.total_claimed -= entry.amount;
            }
        }
    }

    pub fn total_recorded(&self) -> Amount {
        self.total_recorded
    }

    pub fn total_claimed(&self) -> Amount {
        self.total_claimed
    }

    /// Sum of every unclaimed entry.
    pub fn outstanding(&self) -> Amount {
        self.total_recorded - self.total_claimed
    }

    /// `true` once every recorded entry has been paid out.
    pub fn all_claimed(&self) -> bool {
        self.entries.values().all(|c| c.claimed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn party(name: &str) -> PartyId {
        PartyId::from(name)
    }

    #[test]
    fn single_ticket_rejects_second_purchase() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::SingleTicket { price: 10 });
        ledger.record(&party("alice"), 10, Utc::now()).unwrap();

        let result = ledger.record(&party("alice"), 10, Utc::now());
        assert_eq!(
            result,
            Err(CovenantError::AlreadyContributed {
                party: party("alice")
            })
        );
        assert_eq!(ledger.total_recorded(), 10);
    }

    #[test]
    fn single_ticket_requires_exact_price() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::SingleTicket { price: 10 });
        let result = ledger.record(&party("alice"), 9, Utc::now());
        assert_eq!(
            result,
            Err(CovenantError::InvalidAmount {
                expected: 10,
                got: 9
            })
        );
        assert!(!ledger.has_contributed(&party("alice")));
    }

    #[test]
    fn accumulate_adds_and_tracks_first_participation() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::Accumulate);
        ledger.record(&party("alice"), 4, Utc::now()).unwrap();
        ledger.record(&party("bob"), 3, Utc::now()).unwrap();
        let total = ledger.record(&party("alice"), 6, Utc::now()).unwrap();

        assert_eq!(total, 10);
        assert_eq!(ledger.amount_of(&party("alice")), 10);
        assert_eq!(ledger.participants(), &[party("alice"), party("bob")]);
        assert_eq!(ledger.total_recorded(), 13);
    }

    #[test]
    fn capped_policy_enforces_ceiling() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::Capped { per_party: 100 });
        ledger.record(&party("alice"), 60, Utc::now()).unwrap();
        let result = ledger.record(&party("alice"), 50, Utc::now());
        assert_eq!(
            result,
            Err(CovenantError::ContributionCapExceeded {
                cap: 100,
                attempted: 110
            })
        );
        ledger.record(&party("alice"), 40, Utc::now()).unwrap();
        assert_eq!(ledger.amount_of(&party("alice")), 100);
    }

    #[test]
    fn zero_amount_rejected() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::Accumulate);
        assert_eq!(
            ledger.record(&party("alice"), 0, Utc::now()),
            Err(CovenantError::ZeroAmount)
        );
    }

    #[test]
    fn mark_claimed_is_at_most_once() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::Accumulate);
        ledger.record(&party("alice"), 7, Utc::now()).unwrap();

        assert_eq!(ledger.mark_claimed(&party("alice")), Ok(7));
        assert_eq!(
            ledger.mark_claimed(&party("alice")),
            Err(CovenantError::AlreadyClaimed {
                party: party("alice")
            })
        );
        assert_eq!(ledger.amount_of(&party("alice")), 0);
        assert_eq!(ledger.total_claimed(), 7);
        assert!(ledger.all_claimed());
    }

    #[test]
    fn unknown_party_has_no_contribution() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::Accumulate);
        assert_eq!(
            ledger.mark_claimed(&party("ghost")),
            Err(CovenantError::NoContribution {
                party: party("ghost")
            })
        );
    }

    #[test]
    fn reopen_restores_claim() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::Accumulate);
        ledger.record(&party("alice"), 7, Utc::now()).unwrap();
        ledger.mark_claimed(&party("alice")).unwrap();
        ledger.reopen(&party("alice"));

        assert_eq!(ledger.amount_of(&party("alice")), 7);
        assert_eq!(ledger.total_claimed(), 0);
        assert_eq!(ledger.outstanding(), 7);
    }

    #[test]
    fn claimed_accumulating_party_can_start_fresh() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::Accumulate);
        ledger.record(&party("alice"), 5, Utc::now()).unwrap();
        ledger.mark_claimed(&party("alice")).unwrap();
        ledger.record(&party("alice"), 8, Utc::now()).unwrap();

        assert_eq!(ledger.amount_of(&party("alice")), 8);
        assert_eq!(ledger.total_recorded(), 13);
        assert_eq!(ledger.total_claimed(), 5);
        assert_eq!(ledger.outstanding(), 8);
        assert_eq!(ledger.participant_count(), 1);
    }

    #[test]
    fn refunded_ticket_holder_cannot_rebuy() {
        let mut ledger = ContributionLedger::new(ContributionPolicy::SingleTicket { price: 10 });
        ledger.record(&party("alice"), 10, Utc::now()).unwrap();
        ledger.mark_claimed(&party("alice")).unwrap();
        assert!(matches!(
            ledger.record(&party("alice"), 10, Utc::now()),
            Err(CovenantError::AlreadyContributed { .. })
        ));
    }
}
