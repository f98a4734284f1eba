// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Batched, multi-server Private Information Retrieval.
//!
//! This crate sits on top of a single-server retrieval primitive (for example, a
//! homomorphic-encryption based PIR scheme) and adds two things:
//!
//! - Batch planning. Many requested items are deduplicated into one query per distinct
//!   block, and replies are resolved back to the requested items in submission order
//!   (see [`planner`] and [`debatch`]).
//! - Additive reply masking. Several non-colluding servers, each holding an additive
//!   fragment of a logical database, mask their replies with random shares that sum to
//!   zero modulo the plaintext modulus. Only the client, holding all the replies for a
//!   slot, can remove the masks (see [`shares`] and [`confusion`]).
//!
//! The retrieval primitive itself is abstracted by the [`RetrievalClient`] and
//! [`RetrievalServer`] traits. [`linear_pir::LinearScanClient`] and
//! [`linear_pir::LinearScanServer`] form a transparent (non-private) implementation suitable
//! for testing.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

use std::fmt::Debug;
use std::num::TryFromIntError;
use thiserror::Error;

pub mod client;
pub mod confusion;
pub mod database;
pub mod debatch;
pub mod field;
pub mod linear_pir;
pub mod params;
pub mod planner;
pub mod server;
pub mod shares;

#[cfg(test)]
mod test_utils;

pub use crate::client::PirClient;
pub use crate::params::{PirParameters, ProtocolConfig};
pub use crate::planner::{BatchPlan, RequestDescriptor, SlotQuery};
pub use crate::server::PirServer;
pub use crate::shares::{ShareBatch, ShareDealer, ShareTuple, StagedShares};

/// Caller-supplied logical identifier of a database item.
pub type ItemIndex = u64;
/// Identifies the plaintext unit of the retrieval primitive that holds an item.
pub type BlockIndex = u64;
/// Position of an item within its block.
pub type BlockOffset = u64;
/// Dense index of one distinct query/reply pair within a batch.
pub type ReplySlot = usize;
/// An integer in `[0, t)`, `t` being the plaintext modulus of the retrieval primitive.
pub type FieldElement = u64;
/// Number of cooperating servers.
pub type PartyCount = usize;
/// Identifies one cooperating server, in `[0, P)`. Party 0 is the host.
pub type PartyIndex = usize;

/// The types and field shared by the client and server halves of a retrieval primitive.
pub trait RetrievalScheme {
    /// The opaque query sent from the client to each server.
    type Query: Clone + Debug + Send + Sync;
    /// The opaque reply returned by a server.
    type Reply: Clone + Debug + Send + Sync;
    /// A plaintext that can be homomorphically added into a reply.
    type Plaintext: Clone + Debug;

    /// The plaintext modulus `t`.
    fn plain_modulus(&self) -> FieldElement;

    /// The number of coefficients in a plaintext (the polynomial degree for lattice schemes).
    fn coefficient_count(&self) -> usize;

    /// Encodes a vector of field elements as a plaintext.
    fn encode_field(&self, coefficients: &[FieldElement]) -> Result<Self::Plaintext, PirError>;
}

/// The client half of a retrieval primitive.
pub trait RetrievalClient: RetrievalScheme {
    /// Returns the block holding `item`.
    fn block_index_of(&self, item: ItemIndex) -> Result<BlockIndex, PirError>;
    /// Returns the offset of `item` within its block.
    fn block_offset_of(&self, item: ItemIndex) -> Result<BlockOffset, PirError>;
    /// Generates a query for `block`.
    fn query(&self, block: BlockIndex) -> Result<Self::Query, PirError>;
    /// Decodes the item at `offset` from `reply`. Must not mutate or otherwise affect `reply`.
    fn decode(&self, reply: &Self::Reply, offset: BlockOffset) -> Result<Vec<u8>, PirError>;
    /// Decodes `reply` to its vector of field coefficients.
    fn decode_to_field(&self, reply: &Self::Reply) -> Result<Vec<FieldElement>, PirError>;
    /// Extracts the item at `offset` from a plaintext built with [`RetrievalScheme::encode_field`].
    fn decode_plaintext(
        &self,
        plaintext: &Self::Plaintext,
        offset: BlockOffset,
    ) -> Result<Vec<u8>, PirError>;
}

/// The server half of a retrieval primitive.
pub trait RetrievalServer: RetrievalScheme {
    /// Answers `query` against this server's database.
    fn answer(&self, query: &Self::Query) -> Result<Self::Reply, PirError>;
    /// Homomorphically adds `plaintext` into `reply`.
    fn add_plaintext(
        &self,
        reply: Self::Reply,
        plaintext: &Self::Plaintext,
    ) -> Result<Self::Reply, PirError>;
}

/// A list of the errors that can occur while planning, answering or resolving queries.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PirError {
    /// An item index has no block in the database.
    #[error("Item index {item} is out of range (the database holds {item_count} items)")]
    OutOfRangeError {
        /// The offending item index.
        item: ItemIndex,
        /// The number of items in the database.
        item_count: u64,
    },
    /// Fewer replies were supplied than there are slots in the batch.
    #[error("Reply slot {slot} requested but only {available} replies were supplied")]
    IndexOutOfBoundsError {
        /// The slot that could not be resolved.
        slot: ReplySlot,
        /// The number of replies supplied.
        available: usize,
    },
    /// Deconfusion was invoked with a number of replies different from the party count.
    #[error("Expected replies from {expected} parties, got {actual}")]
    ShareCountMismatchError {
        /// The configured party count.
        expected: PartyCount,
        /// The number of replies (or reply batches) supplied.
        actual: usize,
    },
    /// A staged share vector was used after being consumed or superseded.
    #[error("Staged shares for epoch {epoch} were already consumed or superseded")]
    StaleShareReuseError {
        /// The epoch of the rejected share vector.
        epoch: u64,
    },
    /// A staged share vector does not cover exactly the slots of the batch.
    #[error("Staged shares cover {shares} slots but the batch has {slots}")]
    SlotCountMismatchError {
        /// The number of staged shares.
        shares: usize,
        /// The number of queries in the batch.
        slots: usize,
    },
    /// A value outside `[0, t)` was supplied where a field element was expected.
    #[error("{value} is not a field element modulo {modulus}")]
    InvalidFieldElementError {
        /// The offending value.
        value: u64,
        /// The plaintext modulus.
        modulus: FieldElement,
    },
    /// The parameters are not valid.
    #[error("Invalid configuration: {0}")]
    InvalidConfigurationError(&'static str),
    /// A thread panicked while holding the staged share state.
    #[error("The staged share state is poisoned")]
    ShareStatePoisonedError,
    /// Integer conversion failed.
    #[error("Arithmetic error encountered")]
    IntegerConversionError(#[from] TryFromIntError),
    /// The worker pool could not be built.
    #[error("Failed to build the worker pool: {0}")]
    WorkerPoolError(String),
}

impl From<rayon::ThreadPoolBuildError> for PirError {
    fn from(error: rayon::ThreadPoolBuildError) -> Self {
        PirError::WorkerPoolError(error.to_string())
    }
}
