// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Zero-sum random shares used to mask server replies.
//!
//! A [`ShareTuple`] holds `P` field elements summing to zero modulo `t`. The host party
//! (party 0) generates the shares, keeps the first one and sends the others to the remaining
//! parties over a channel outside this crate.
//!
//! For batches, the host's [`ShareDealer`] stages one independent tuple per reply slot and
//! hands each party its column of shares exactly once, as a [`StagedShares`] value. A staged
//! vector is consumed by the reply it masks and cannot be used again; refreshing the dealer
//! discards whatever was staged before.
//!
//! Shares must be drawn from a cryptographically secure generator, hence the `CryptoRng`
//! bound throughout.

use crate::{
    field::{add_mod, check_element, neg_mod, sum_mod},
    params::MAX_PLAIN_MODULUS,
    FieldElement, PartyCount, PartyIndex, PirError, ProtocolConfig,
};
use rand::{CryptoRng, Rng, RngCore};
use std::sync::Mutex;

/// The party that generates and distributes shares.
pub const HOST_PARTY: PartyIndex = 0;

fn check_share_parameters(parties: PartyCount, modulus: FieldElement) -> Result<(), PirError> {
    if parties < 2 {
        return Err(PirError::InvalidConfigurationError(
            "at least two parties are required",
        ));
    }
    if !(2..=MAX_PLAIN_MODULUS).contains(&modulus) {
        return Err(PirError::InvalidConfigurationError(
            "plain modulus must lie in [2, 2^62]",
        ));
    }
    Ok(())
}

/// `P` field elements summing to zero modulo `t`, one per party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShareTuple<const P: PartyCount>([FieldElement; P]);

impl<const P: PartyCount> ShareTuple<P> {
    /// Draws `P - 1` uniform shares and sets the last to the negation of their sum.
    pub fn generate<R: RngCore + CryptoRng>(
        modulus: FieldElement,
        rng: &mut R,
    ) -> Result<Self, PirError> {
        check_share_parameters(P, modulus)?;

        let mut shares = [0; P];
        let mut partial_sum = 0;
        for share in shares.iter_mut().take(P - 1) {
            *share = rng.gen_range(0..modulus);
            partial_sum = add_mod(partial_sum, *share, modulus);
        }
        shares[P - 1] = neg_mod(partial_sum, modulus);
        Ok(Self(shares))
    }

    /// Wraps shares received from elsewhere, checking that they are field elements summing
    /// to zero.
    pub fn from_shares(shares: [FieldElement; P], modulus: FieldElement) -> Result<Self, PirError> {
        check_share_parameters(P, modulus)?;
        for share in &shares {
            check_element(*share, modulus)?;
        }
        if sum_mod(&shares, modulus) != 0 {
            return Err(PirError::InvalidConfigurationError(
                "shares do not sum to zero",
            ));
        }
        Ok(Self(shares))
    }

    /// The number of shares, one per party.
    pub fn party_count(&self) -> PartyCount {
        P
    }

    /// All the shares, indexed by party.
    pub fn shares(&self) -> &[FieldElement; P] {
        &self.0
    }

    /// The share of `party`, if `party < P`.
    pub fn share(&self, party: PartyIndex) -> Option<FieldElement> {
        self.0.get(party).copied()
    }

    /// The share the host keeps for itself.
    pub fn host_share(&self) -> FieldElement {
        self.0[HOST_PARTY]
    }

    /// The shares the host sends out, for parties `1..P` in order.
    pub fn exported_shares(&self) -> &[FieldElement] {
        &self.0[HOST_PARTY + 1..]
    }

    /// Returns `true` if the shares sum to zero modulo `modulus`.
    pub fn is_zero_sum(&self, modulus: FieldElement) -> bool {
        sum_mod(&self.0, modulus) == 0
    }
}

/// One independent [`ShareTuple`] per reply slot, stored as `P` parallel columns indexed by
/// slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareBatch<const P: PartyCount> {
    columns: [Vec<FieldElement>; P],
}

impl<const P: PartyCount> ShareBatch<P> {
    /// Generates a fresh tuple for each of `slot_count` slots.
    pub fn generate<R: RngCore + CryptoRng>(
        slot_count: usize,
        modulus: FieldElement,
        rng: &mut R,
    ) -> Result<Self, PirError> {
        check_share_parameters(P, modulus)?;

        let mut columns: [Vec<FieldElement>; P] =
            std::array::from_fn(|_| Vec::with_capacity(slot_count));
        for _ in 0..slot_count {
            let tuple = ShareTuple::<P>::generate(modulus, rng)?;
            for (column, share) in columns.iter_mut().zip(tuple.shares()) {
                column.push(*share);
            }
        }
        Ok(Self { columns })
    }

    /// The number of slots covered.
    pub fn slot_count(&self) -> usize {
        self.columns[HOST_PARTY].len()
    }

    /// The shares of `party`, indexed by slot.
    pub fn column(&self, party: PartyIndex) -> Option<&[FieldElement]> {
        self.columns.get(party).map(Vec::as_slice)
    }

    /// The tuple generated for `slot`.
    pub fn tuple(&self, slot: usize) -> Option<ShareTuple<P>> {
        if slot >= self.slot_count() {
            return None;
        }
        Some(ShareTuple(std::array::from_fn(|party| {
            self.columns[party][slot]
        })))
    }
}

/// The per-slot shares one party will add into its next batch of replies.
///
/// Shares are consumed exactly once: [`StagedShares::consume`] succeeds on the first call and
/// returns a `StaleShareReuseError` afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedShares {
    party: PartyIndex,
    party_count: PartyCount,
    epoch: u64,
    shares: Vec<FieldElement>,
    consumed: bool,
}

impl StagedShares {
    /// Stages `shares` for `party`, taken from tuples of `party_count` shares. `epoch` must
    /// increase with every refresh of the host's dealer; a server refuses shares from an
    /// epoch it has already used.
    pub fn new(
        party: PartyIndex,
        party_count: PartyCount,
        epoch: u64,
        shares: Vec<FieldElement>,
    ) -> Self {
        Self {
            party,
            party_count,
            epoch,
            shares,
            consumed: false,
        }
    }

    /// The party these shares belong to.
    pub fn party(&self) -> PartyIndex {
        self.party
    }

    /// The size of the tuples these shares were taken from. Masks only cancel when this
    /// equals the number of parties answering.
    pub fn party_count(&self) -> PartyCount {
        self.party_count
    }

    /// The dealer refresh these shares came from.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The number of slots covered.
    pub fn slot_count(&self) -> usize {
        self.shares.len()
    }

    /// Whether the shares have been consumed.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Marks the shares as consumed and returns them.
    pub fn consume(&mut self) -> Result<Vec<FieldElement>, PirError> {
        if self.consumed {
            return Err(PirError::StaleShareReuseError { epoch: self.epoch });
        }
        self.consumed = true;
        Ok(std::mem::take(&mut self.shares))
    }
}

#[derive(Debug)]
struct DealerState<const P: PartyCount> {
    epoch: u64,
    batch: Option<ShareBatch<P>>,
    exported: [bool; P],
}

/// The host's staging area for batch shares.
///
/// Refreshes and hand-outs are serialized by an internal mutex, so a party can never receive
/// a column from a partially regenerated batch.
#[derive(Debug)]
pub struct ShareDealer<const P: PartyCount> {
    modulus: FieldElement,
    state: Mutex<DealerState<P>>,
}

impl<const P: PartyCount> ShareDealer<P> {
    /// Returns a dealer for shares modulo `modulus`, with nothing staged.
    pub fn new(modulus: FieldElement) -> Result<Self, PirError> {
        check_share_parameters(P, modulus)?;
        Ok(Self {
            modulus,
            state: Mutex::new(DealerState {
                epoch: 0,
                batch: None,
                exported: [false; P],
            }),
        })
    }

    /// Returns a dealer for a protocol configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns a `ShareCountMismatchError` if `P` differs from `config.party_count()`: shares
    /// from tuples of another size do not cancel.
    pub fn for_config(config: &ProtocolConfig, modulus: FieldElement) -> Result<Self, PirError> {
        if config.party_count() != P {
            return Err(PirError::ShareCountMismatchError {
                expected: config.party_count(),
                actual: P,
            });
        }
        Self::new(modulus)
    }

    /// The plaintext modulus of the shares.
    pub fn modulus(&self) -> FieldElement {
        self.modulus
    }

    /// Draws a single tuple, for masking a single query.
    pub fn generate_tuple<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<ShareTuple<P>, PirError> {
        ShareTuple::generate(self.modulus, rng)
    }

    /// Discards any staged shares and stages a fresh tuple for each of `slot_count` slots.
    /// Returns the new epoch.
    pub fn refresh<R: RngCore + CryptoRng>(
        &self,
        slot_count: usize,
        rng: &mut R,
    ) -> Result<u64, PirError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PirError::ShareStatePoisonedError)?;

        if state.batch.is_some() {
            let unclaimed = state.exported.iter().filter(|e| !**e).count();
            log::debug!(
                "Discarding epoch {} with {} unclaimed share columns",
                state.epoch,
                unclaimed
            );
        }

        state.batch = Some(ShareBatch::generate(slot_count, self.modulus, rng)?);
        state.exported = [false; P];
        state.epoch += 1;

        log::info!(
            "ShareDealer::refresh(slots = {}, epoch = {})",
            slot_count,
            state.epoch
        );
        Ok(state.epoch)
    }

    /// Hands `party` its column of the staged batch. Each column can be taken once per epoch.
    ///
    /// # Errors
    ///
    /// Returns a `StaleShareReuseError` if the column was already taken, and an
    /// `InvalidConfigurationError` if nothing is staged or `party >= P`.
    pub fn take_staged(&self, party: PartyIndex) -> Result<StagedShares, PirError> {
        if party >= P {
            return Err(PirError::InvalidConfigurationError("no such party"));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| PirError::ShareStatePoisonedError)?;
        let epoch = state.epoch;

        if state.exported[party] {
            return Err(PirError::StaleShareReuseError { epoch });
        }
        let column = state
            .batch
            .as_ref()
            .and_then(|batch| batch.column(party))
            .ok_or(PirError::InvalidConfigurationError("no shares are staged"))?
            .to_vec();
        state.exported[party] = true;

        // Nothing else can be handed out from this epoch.
        if state.exported.iter().all(|e| *e) {
            state.batch = None;
        }

        log::debug!("Handed out epoch {} shares to party {}", epoch, party);
        Ok(StagedShares::new(party, P, epoch, column))
    }

    /// Checks that `staged` comes from the current epoch and has not been consumed.
    ///
    /// # Errors
    ///
    /// Returns a `StaleShareReuseError` if `staged` was consumed or a later refresh has
    /// superseded it.
    pub fn check_current(&self, staged: &StagedShares) -> Result<(), PirError> {
        if staged.is_consumed() || staged.epoch() != self.epoch()? {
            return Err(PirError::StaleShareReuseError {
                epoch: staged.epoch(),
            });
        }
        Ok(())
    }

    /// The current epoch; 0 before the first refresh.
    pub fn epoch(&self) -> Result<u64, PirError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| PirError::ShareStatePoisonedError)?
            .epoch)
    }
}
