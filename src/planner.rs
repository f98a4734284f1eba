// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Deduplication of a batch of item requests into one query per distinct block.
//!
//! Planning is a merge-style pass: the requests are sorted by block index and walked once,
//! opening a new reply slot whenever the block index increases. Slots are therefore dense,
//! ordered by block index, and shared by every request for the same block.

use crate::{BlockIndex, BlockOffset, ItemIndex, PirError, ReplySlot, RetrievalClient};
use rayon::prelude::*;

/// Where one requested item will be found among the replies of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// The requested item.
    pub item_index: ItemIndex,
    /// The block holding the item.
    pub block_index: BlockIndex,
    /// The position of the item within its block.
    pub block_offset: BlockOffset,
    /// The reply slot answering `block_index`.
    pub reply_slot: ReplySlot,
}

/// One distinct block query of a batch, stored at its reply slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotQuery<Q> {
    /// The queried block.
    pub block_index: BlockIndex,
    /// The query for `block_index`.
    pub query: Q,
}

/// The queries of a batch, one per distinct block, and the descriptors of the requests in
/// their original submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan<Q> {
    queries: Vec<SlotQuery<Q>>,
    descriptors: Vec<RequestDescriptor>,
}

impl<Q> BatchPlan<Q> {
    /// The queries, indexed by reply slot.
    pub fn queries(&self) -> &[SlotQuery<Q>] {
        &self.queries
    }

    /// The request descriptors, in submission order.
    pub fn descriptors(&self) -> &[RequestDescriptor] {
        &self.descriptors
    }

    /// The number of distinct blocks, and hence of replies required.
    pub fn slot_count(&self) -> usize {
        self.queries.len()
    }

    /// Returns `true` if the batch requests no items.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Clones the queries in slot order, ready to be sent to a server.
    pub fn query_list(&self) -> Vec<Q>
    where
        Q: Clone,
    {
        self.queries.iter().map(|q| q.query.clone()).collect()
    }
}

/// Slot assignment for a batch, before any query is generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotAssignment {
    /// The distinct block of each slot, ascending.
    pub slot_blocks: Vec<BlockIndex>,
    /// The request descriptors, in submission order.
    pub descriptors: Vec<RequestDescriptor>,
}

/// Computes the reply slot of every requested item.
///
/// # Errors
///
/// Returns the first error raised while locating an item (typically an `OutOfRangeError`);
/// no partial assignment is returned.
pub fn assign_slots<C: RetrievalClient>(
    client: &C,
    items: &[ItemIndex],
) -> Result<SlotAssignment, PirError> {
    let mut descriptors = items
        .iter()
        .map(|item| {
            Ok(RequestDescriptor {
                item_index: *item,
                block_index: client.block_index_of(*item)?,
                block_offset: client.block_offset_of(*item)?,
                reply_slot: 0,
            })
        })
        .collect::<Result<Vec<_>, PirError>>()?;

    // Visit the descriptors in block order without disturbing submission order.
    let mut sorted: Vec<usize> = (0..descriptors.len()).collect();
    sorted.sort_by_key(|i| descriptors[*i].block_index);

    let mut slot_blocks: Vec<BlockIndex> = Vec::new();
    for i in sorted {
        let block_index = descriptors[i].block_index;
        match slot_blocks.last() {
            Some(highest) if block_index <= *highest => {}
            _ => slot_blocks.push(block_index),
        }
        descriptors[i].reply_slot = slot_blocks.len() - 1;
    }

    log::debug!(
        "Assigned {} requests to {} reply slots",
        descriptors.len(),
        slot_blocks.len()
    );
    Ok(SlotAssignment {
        slot_blocks,
        descriptors,
    })
}

/// Plans a batch: assigns slots, then generates one query per distinct block.
/// When `pool` is given, queries are generated on it; results are kept in slot order.
///
/// # Errors
///
/// Fails with an `OutOfRangeError` if any item has no block, or with any error raised by
/// query generation. No partial plan is returned.
pub fn plan_batch<C: RetrievalClient + Sync>(
    client: &C,
    items: &[ItemIndex],
    pool: Option<&rayon::ThreadPool>,
) -> Result<BatchPlan<C::Query>, PirError> {
    let SlotAssignment {
        slot_blocks,
        descriptors,
    } = assign_slots(client, items)?;

    let generate = |block_index: &BlockIndex| -> Result<SlotQuery<C::Query>, PirError> {
        log::debug!("Generating query for block {}", block_index);
        Ok(SlotQuery {
            block_index: *block_index,
            query: client.query(*block_index)?,
        })
    };

    let queries = match pool {
        Some(pool) => pool.install(|| {
            slot_blocks
                .par_iter()
                .map(generate)
                .collect::<Result<Vec<_>, PirError>>()
        })?,
        None => slot_blocks
            .iter()
            .map(generate)
            .collect::<Result<Vec<_>, PirError>>()?,
    };

    log::info!(
        "Planned batch of {} requests as {} queries",
        descriptors.len(),
        queries.len()
    );
    Ok(BatchPlan {
        queries,
        descriptors,
    })
}
