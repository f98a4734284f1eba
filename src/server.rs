// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The server side of the multi-party protocol.
//!
//! Each party runs a [`PirServer`] over its own fragment of the database. Replies are
//! answered per slot on a worker pool and always returned in slot order.

use crate::{
    confusion::confuse_reply, FieldElement, PartyIndex, PirError, ProtocolConfig,
    RetrievalServer, StagedShares,
};
use rayon::prelude::*;

/// Wraps a retrieval-primitive server with batch answering and reply confusion.
#[derive(Debug)]
pub struct PirServer<S> {
    primitive: S,
    party: PartyIndex,
    config: ProtocolConfig,
    pool: rayon::ThreadPool,
    last_epoch: Option<u64>,
}

impl<S: RetrievalServer + Sync> PirServer<S> {
    /// Returns the server of `party`, answering with `primitive`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if `party` is not below the configured party
    /// count.
    pub fn new(primitive: S, party: PartyIndex, config: ProtocolConfig) -> Result<Self, PirError> {
        if party >= config.party_count() {
            return Err(PirError::InvalidConfigurationError(
                "party index exceeds the party count",
            ));
        }
        log::info!(
            "PirServer::new(party = {}, party_count = {})",
            party,
            config.party_count()
        );
        let pool = config.build_pool()?;
        Ok(Self {
            primitive,
            party,
            config,
            pool,
            last_epoch: None,
        })
    }

    /// The underlying retrieval-primitive server.
    pub fn primitive(&self) -> &S {
        &self.primitive
    }

    /// The index of this party.
    pub fn party(&self) -> PartyIndex {
        self.party
    }

    /// The protocol configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// The epoch of the last staged shares consumed, if any.
    pub fn last_epoch(&self) -> Option<u64> {
        self.last_epoch
    }

    /// Answers a single query without masking.
    pub fn answer(&self, query: &S::Query) -> Result<S::Reply, PirError> {
        self.primitive.answer(query)
    }

    /// Answers every query of a batch without masking, in slot order.
    pub fn answer_batch(&self, queries: &[S::Query]) -> Result<Vec<S::Reply>, PirError> {
        let replies = self.pool.install(|| {
            queries
                .par_iter()
                .map(|query| self.primitive.answer(query))
                .collect::<Result<Vec<_>, PirError>>()
        })?;
        log::debug!("Party {} answered {} queries", self.party, replies.len());
        Ok(replies)
    }

    /// Answers a single query and masks the reply with this party's `share`.
    pub fn answer_with_confusion(
        &self,
        query: &S::Query,
        share: FieldElement,
    ) -> Result<S::Reply, PirError> {
        let reply = self.primitive.answer(query)?;
        confuse_reply(&self.primitive, reply, share)
    }

    /// Answers every query of a batch, masking the reply of slot `s` with the `s`-th staged
    /// share. The shares are consumed even if answering fails afterwards.
    ///
    /// # Errors
    ///
    /// - `InvalidConfigurationError` if `staged` belongs to another party.
    /// - `ShareCountMismatchError` if `staged` was taken from tuples sized for another party
    ///   count, since its masks would not cancel.
    /// - `StaleShareReuseError` if `staged` was already consumed, or comes from an epoch no
    ///   later than one this server has already used.
    /// - `SlotCountMismatchError` if `staged` does not hold exactly one share per query.
    pub fn answer_batch_with_confusion(
        &mut self,
        queries: &[S::Query],
        staged: &mut StagedShares,
    ) -> Result<Vec<S::Reply>, PirError> {
        if staged.party() != self.party {
            return Err(PirError::InvalidConfigurationError(
                "shares were staged for another party",
            ));
        }
        if staged.party_count() != self.config.party_count() {
            return Err(PirError::ShareCountMismatchError {
                expected: self.config.party_count(),
                actual: staged.party_count(),
            });
        }
        let epoch = staged.epoch();
        if staged.is_consumed() || self.last_epoch.is_some_and(|last| epoch <= last) {
            return Err(PirError::StaleShareReuseError { epoch });
        }
        if staged.slot_count() != queries.len() {
            return Err(PirError::SlotCountMismatchError {
                shares: staged.slot_count(),
                slots: queries.len(),
            });
        }

        let shares = staged.consume()?;
        self.last_epoch = Some(epoch);

        let primitive = &self.primitive;
        let replies = self.pool.install(|| {
            queries
                .par_iter()
                .zip(shares.par_iter())
                .map(|(query, share)| {
                    let reply = primitive.answer(query)?;
                    confuse_reply(primitive, reply, *share)
                })
                .collect::<Result<Vec<_>, PirError>>()
        })?;

        log::info!(
            "Party {} answered {} masked queries (epoch {})",
            self.party,
            replies.len(),
            epoch
        );
        Ok(replies)
    }
}
