// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The client side of the multi-party protocol.

use crate::{
    confusion, debatch, planner, BatchPlan, BlockOffset, ItemIndex, PirError, ProtocolConfig,
    RequestDescriptor, RetrievalClient,
};

/// Wraps a retrieval-primitive client with batch planning and reply deconfusion.
///
/// Queries are identical for every party; the client sends the same query (or batch of
/// queries) to each of the `party_count` servers and recombines their replies.
#[derive(Debug)]
pub struct PirClient<C> {
    primitive: C,
    config: ProtocolConfig,
    pool: rayon::ThreadPool,
}

impl<C: RetrievalClient + Sync> PirClient<C> {
    /// Returns a client using `primitive`, configured by `config`.
    pub fn new(primitive: C, config: ProtocolConfig) -> Result<Self, PirError> {
        log::info!(
            "PirClient::new(party_count = {}, worker_threads = {:?})",
            config.party_count(),
            config.worker_threads()
        );
        let pool = config.build_pool()?;
        Ok(Self {
            primitive,
            config,
            pool,
        })
    }

    /// The underlying retrieval-primitive client.
    pub fn primitive(&self) -> &C {
        &self.primitive
    }

    /// The protocol configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Generates the query for a single item, along with the item's offset in the block the
    /// query retrieves.
    pub fn query(&self, item: ItemIndex) -> Result<(C::Query, BlockOffset), PirError> {
        let block = self.primitive.block_index_of(item)?;
        let offset = self.primitive.block_offset_of(item)?;
        Ok((self.primitive.query(block)?, offset))
    }

    /// Plans a batch of requests, generating queries on the worker pool.
    pub fn plan_batch(&self, items: &[ItemIndex]) -> Result<BatchPlan<C::Query>, PirError> {
        planner::plan_batch(&self.primitive, items, Some(&self.pool))
    }

    /// Resolves the unmasked replies of a single server to the items of a batch.
    pub fn debatch(
        &self,
        descriptors: &[RequestDescriptor],
        replies: &[C::Reply],
    ) -> Result<Vec<Vec<u8>>, PirError> {
        debatch::debatch_replies(&self.primitive, descriptors, replies)
    }

    /// Recovers a single item from the masked replies of every party.
    pub fn deconfuse_and_decode(
        &self,
        replies: &[C::Reply],
        offset: BlockOffset,
    ) -> Result<Vec<u8>, PirError> {
        confusion::deconfuse_and_decode(
            &self.primitive,
            replies,
            self.config.party_count(),
            offset,
        )
    }

    /// Recovers every item of a batch from the masked reply batches of every party.
    /// `batch_replies[p]` holds party `p`'s replies in slot order.
    pub fn batch_deconfuse_and_decode(
        &self,
        batch_replies: &[Vec<C::Reply>],
        descriptors: &[RequestDescriptor],
    ) -> Result<Vec<Vec<u8>>, PirError> {
        let results = confusion::batch_deconfuse_and_decode(
            &self.primitive,
            batch_replies,
            self.config.party_count(),
            descriptors,
        )?;
        log::debug!("Recovered {} items from a batch", results.len());
        Ok(results)
    }
}
