//! # Pairwise Swap
//!
//! Two named parties each escrow one asset (an NFT, a token amount, native
//! value). The swap is executable only while both deposits are present:
//!
//! ```text
//! AwaitingDeposits ──deposit──▶ AwaitingDeposit{other} ──deposit──▶ Ready
//!        ▲                             │                             │
//!        └────────withdraw─────────────┘                        execute
//!                                                                    ▼
//!                                                         assets swapped,
//!                                                         record cleared
//! ```
//!
//! Before the second deposit arrives, the depositor may withdraw and the swap
//! returns to awaiting deposits. With an optional deadline, execution and
//! deposits stop at the deadline and any deposit can then be withdrawn.
//!
//! Swap legs are escrowed outside the entity pool: the two legs are
//! different assets and each one moves as a whole.

use chrono::{DateTime, Utc};
use covenant_protocol::{
    Amount, AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind,
    PartyId, PayoutPath, Phase, Registry, Schedule, TransferOrder,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ContractContext;
use crate::error::{ContractError, ContractResult};

/// What one party puts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTerms {
    pub party: PartyId,
    pub asset: AssetKind,
    /// Must be 1 for unique items.
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapParams {
    pub first: SwapTerms,
    pub second: SwapTerms,
    /// No deadline keeps the swap open until executed.
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapLeg {
    pub terms: SwapTerms,
    pub deposited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapStatus {
    AwaitingDeposits,
    AwaitingDeposit { from: PartyId },
    Ready,
}

/// Recorded when the exchange settles, just before the record is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapExecuted;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    pub core: EntityCore<SwapExecuted>,
    pub legs: [SwapLeg; 2],
}

impl Swap {
    pub fn status(&self) -> SwapStatus {
        match (self.legs[0].deposited, self.legs[1].deposited) {
            (true, true) => SwapStatus::Ready,
            (false, false) => SwapStatus::AwaitingDeposits,
            (true, false) => SwapStatus::AwaitingDeposit {
                from: self.legs[1].terms.party.clone(),
            },
            (false, true) => SwapStatus::AwaitingDeposit {
                from: self.legs[0].terms.party.clone(),
            },
        }
    }

    fn leg_index(&self, party: &PartyId) -> ContractResult<usize> {
        self.legs
            .iter()
            .position(|leg| &leg.terms.party == party)
            .ok_or_else(|| ContractError::NotAParty {
                party: party.clone(),
            })
    }
}

pub struct SwapBook {
    ctx: ContractContext,
    registry: Registry<Swap>,
}

impl SwapBook {
    pub fn new(ctx: ContractContext) -> Self {
        let registry = ctx.registry(EntityKind::Swap);
        Self { ctx, registry }
    }

    /// Proposes a swap. `creator` must be one of the two parties.
    pub fn create(&self, creator: &PartyId, params: SwapParams) -> ContractResult<EntityId> {
        let now = self.ctx.now();
        if params.first.party == params.second.party {
            return Err(
                CovenantError::InvalidParameters("a swap needs two distinct parties".into()).into(),
            );
        }
        if creator != &params.first.party && creator != &params.second.party {
            return Err(ContractError::NotAParty {
                party: creator.clone(),
            });
        }
        for terms in [&params.first, &params.second] {
            if terms.amount == 0 || (terms.asset.is_unique() && terms.amount != 1) {
                return Err(CovenantError::InvalidParameters(format!(
                    "invalid amount {} of {}",
                    terms.amount, terms.asset
                ))
                .into());
            }
        }
        let schedule = Schedule::new(now, params.deadline.unwrap_or(DateTime::<Utc>::MAX_UTC));
        schedule.validate(now)?;

        let id = self.registry.create_with(creator, |id| {
            Ok::<_, ContractError>(Swap {
                core: EntityCore::new(
                    id,
                    EntityKind::Swap,
                    creator.clone(),
                    params.first.asset.clone(),
                    schedule,
                    ContributionPolicy::Accumulate,
                ),
                legs: [
                    SwapLeg {
                        terms: params.first.clone(),
                        deposited: false,
                    },
                    SwapLeg {
                        terms: params.second.clone(),
                        deposited: false,
                    },
                ],
            })
        })?;

        info!(
            entity_id = id.0,
            first = %params.first.party,
            second = %params.second.party,
            "swap proposed"
        );
        Ok(id)
    }

    /// Escrows `party`'s leg.
    pub fn deposit(&self, id: EntityId, party: &PartyId) -> ContractResult<SwapStatus> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |swap| {
            let index = swap.leg_index(party)?;
            swap.core.ensure_open(now)?;
            if swap.legs[index].deposited {
                return Err(ContractError::AlreadyDeposited {
                    party: party.clone(),
                });
            }

            let terms = swap.legs[index].terms.clone();
            swap.legs[index].deposited = true;
            if let Err(err) = self
                .ctx
                .settlement
                .collect(id, &terms.asset, party, terms.amount)
            {
                swap.legs[index].deposited = false;
                return Err(err.into());
            }
            Ok(swap.status())
        })
    }

    /// Returns `party`'s deposit.
    ///
    /// # Errors
    ///
    /// [`ContractError::CounterpartyDeposited`] while both legs are in and the
    /// deadline has not passed.
    pub fn withdraw(&self, id: EntityId, party: &PartyId) -> ContractResult<SwapStatus> {
        let now = self.ctx.now();
        self.registry.with_entity(id, |swap| {
            let index = swap.leg_index(party)?;
            if !swap.legs[index].deposited {
                return Err(CovenantError::NoContribution {
                    party: party.clone(),
                }
                .into());
            }
            let open = swap.core.observe(now) == Phase::Open;
            if swap.legs[1 - index].deposited && open {
                return Err(ContractError::CounterpartyDeposited);
            }

            let terms = swap.legs[index].terms.clone();
            swap.legs[index].deposited = false;
            if let Err(err) = self.ctx.settlement.deliver(
                id,
                &terms.asset,
                party,
                terms.amount,
                PayoutPath::Refund,
            ) {
                swap.legs[index].deposited = true;
                return Err(err.into());
            }
            Ok(swap.status())
        })
    }

    /// Exchanges both legs atomically and clears the record.
    pub fn execute(&self, id: EntityId, caller: &PartyId) -> ContractResult<()> {
        let now = self.ctx.now();
        self.registry.with_slot(id, |slot| {
            let swap = slot.as_mut().ok_or(CovenantError::EntityNotFound(id))?;
            swap.leg_index(caller)?;
            swap.core.ensure_open(now)?;
            match swap.status() {
                SwapStatus::Ready => {}
                SwapStatus::AwaitingDeposit { from } => {
                    return Err(ContractError::AwaitingDeposit { party: from })
                }
                SwapStatus::AwaitingDeposits => {
                    return Err(ContractError::AwaitingDeposit {
                        party: swap.legs[0].terms.party.clone(),
                    })
                }
            }

            let escrow = self.ctx.settlement.escrow();
            let [first, second] = &swap.legs;
            let orders = [
                TransferOrder::new(
                    first.terms.asset.clone(),
                    escrow.clone(),
                    second.terms.party.clone(),
                    first.terms.amount,
                ),
                TransferOrder::new(
                    second.terms.asset.clone(),
                    escrow,
                    first.terms.party.clone(),
                    second.terms.amount,
                ),
            ];
            self.ctx.settlement.exchange(id, &orders)?;
            self.ctx
                .settlement
                .conclude(&mut swap.core, now, SwapExecuted)?;

            info!(entity_id = id.0, executed_by = %caller, "swap executed");
            *slot = None;
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<Swap> {
        self.registry.get(id)
    }

    /// `false` once the swap has executed and its record was cleared.
    pub fn exists(&self, id: EntityId) -> bool {
        self.registry.exists(id)
    }

    pub fn status(&self, id: EntityId) -> Option<SwapStatus> {
        self.get(id).map(|s| s.status())
    }

    /// What `party` currently has escrowed in the swap.
    pub fn amount_of(&self, id: EntityId, party: &PartyId) -> Amount {
        self.get(id)
            .and_then(|s| {
                s.legs
                    .iter()
                    .find(|leg| &leg.terms.party == party && leg.deposited)
                    .map(|leg| leg.terms.amount)
            })
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
