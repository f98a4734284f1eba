// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Parameters for the database layout and for the multi-party protocol.

use crate::{BlockIndex, BlockOffset, FieldElement, ItemIndex, PartyCount, PirError};
use static_assertions::const_assert;

/// The number of cooperating servers used unless configured otherwise.
pub const DEFAULT_PARTY_COUNT: PartyCount = 3;

/// The number of plaintext coefficients in one block, matching a polynomial degree of 4096.
pub const DEFAULT_COEFFICIENTS_PER_BLOCK: usize = 4096;

/// A 20-bit prime plaintext modulus.
pub const DEFAULT_PLAIN_MODULUS: FieldElement = 1_048_573;

/// The largest supported plaintext modulus. Keeping `t <= 2^62` lets the sum of two field
/// elements be computed without overflow.
pub const MAX_PLAIN_MODULUS: FieldElement = 1 << 62;

const_assert!(DEFAULT_PARTY_COUNT >= 2);
const_assert!(DEFAULT_PLAIN_MODULUS <= MAX_PLAIN_MODULUS);

/// Describes how fixed-size items are laid out in the blocks of the retrieval primitive.
///
/// Each coefficient carries `floor(log2(t))` bits of item data, each item occupies
/// `ceil(8 * item_size / bits_per_coefficient)` consecutive coefficients, and as many whole
/// items as fit are packed into each block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PirParameters {
    plain_modulus: FieldElement,
    item_count: u64,
    item_size: usize,
    coefficients_per_block: usize,
    bits_per_coefficient: u32,
    coefficients_per_item: usize,
    items_per_block: u64,
}

impl PirParameters {
    /// Returns parameters for `item_count` items of `item_size` bytes each, using the default
    /// modulus and block size.
    ///
    /// # Errors
    ///
    /// See [`PirParameters::new_with_parameters`].
    pub fn new(item_count: u64, item_size: usize) -> Result<Self, PirError> {
        Self::new_with_parameters(
            item_count,
            item_size,
            DEFAULT_PLAIN_MODULUS,
            DEFAULT_COEFFICIENTS_PER_BLOCK,
        )
    }

    /// Returns parameters for `item_count` items of `item_size` bytes each, in blocks of
    /// `coefficients_per_block` coefficients modulo `plain_modulus`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` in the following cases.
    ///
    /// - `plain_modulus` is less than 2 or greater than [`MAX_PLAIN_MODULUS`].
    /// - `item_count`, `item_size` or `coefficients_per_block` is 0.
    /// - A single item does not fit in one block.
    pub fn new_with_parameters(
        item_count: u64,
        item_size: usize,
        plain_modulus: FieldElement,
        coefficients_per_block: usize,
    ) -> Result<Self, PirError> {
        if !(2..=MAX_PLAIN_MODULUS).contains(&plain_modulus) {
            return Err(PirError::InvalidConfigurationError(
                "plain modulus must lie in [2, 2^62]",
            ));
        }
        if item_count == 0 || item_size == 0 || coefficients_per_block == 0 {
            return Err(PirError::InvalidConfigurationError(
                "item count, item size and block size must be nonzero",
            ));
        }

        let bits_per_coefficient = plain_modulus.ilog2();
        let item_bits = item_size
            .checked_mul(8)
            .ok_or(PirError::InvalidConfigurationError("item size is too large"))?;
        let coefficients_per_item = item_bits.div_ceil(usize::try_from(bits_per_coefficient)?);

        if coefficients_per_item > coefficients_per_block {
            return Err(PirError::InvalidConfigurationError(
                "an item does not fit in a single block",
            ));
        }
        let items_per_block = u64::try_from(coefficients_per_block / coefficients_per_item)?;

        Ok(Self {
            plain_modulus,
            item_count,
            item_size,
            coefficients_per_block,
            bits_per_coefficient,
            coefficients_per_item,
            items_per_block,
        })
    }

    /// The plaintext modulus `t`.
    pub fn plain_modulus(&self) -> FieldElement {
        self.plain_modulus
    }

    /// The number of items in the database.
    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    /// The size of each item in bytes.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// The number of coefficients in each block.
    pub fn coefficients_per_block(&self) -> usize {
        self.coefficients_per_block
    }

    /// The number of item bits stored in each coefficient.
    pub fn bits_per_coefficient(&self) -> u32 {
        self.bits_per_coefficient
    }

    /// The number of coefficients occupied by one item.
    pub fn coefficients_per_item(&self) -> usize {
        self.coefficients_per_item
    }

    /// The number of items packed into each block.
    pub fn items_per_block(&self) -> u64 {
        self.items_per_block
    }

    /// The number of blocks needed to hold every item.
    pub fn block_count(&self) -> u64 {
        self.item_count.div_ceil(self.items_per_block)
    }

    /// Returns the block holding `item`.
    pub fn block_index_of(&self, item: ItemIndex) -> Result<BlockIndex, PirError> {
        self.check_item(item)?;
        Ok(item / self.items_per_block)
    }

    /// Returns the offset of `item` within its block.
    pub fn block_offset_of(&self, item: ItemIndex) -> Result<BlockOffset, PirError> {
        self.check_item(item)?;
        Ok(item % self.items_per_block)
    }

    fn check_item(&self, item: ItemIndex) -> Result<(), PirError> {
        if item >= self.item_count {
            return Err(PirError::OutOfRangeError {
                item,
                item_count: self.item_count,
            });
        }
        Ok(())
    }
}

/// Configures the multi-party protocol run by [`crate::PirClient`] and [`crate::PirServer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolConfig {
    party_count: PartyCount,
    worker_threads: Option<usize>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            party_count: DEFAULT_PARTY_COUNT,
            worker_threads: None,
        }
    }
}

impl ProtocolConfig {
    /// Returns a configuration for `party_count` servers. If `worker_threads` is `None`,
    /// per-slot work runs on rayon's default number of threads.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` if `party_count < 2` or `worker_threads == Some(0)`.
    pub fn new(party_count: PartyCount, worker_threads: Option<usize>) -> Result<Self, PirError> {
        if party_count < 2 {
            return Err(PirError::InvalidConfigurationError(
                "at least two parties are required",
            ));
        }
        if worker_threads == Some(0) {
            return Err(PirError::InvalidConfigurationError(
                "the worker pool needs at least one thread",
            ));
        }
        Ok(Self {
            party_count,
            worker_threads,
        })
    }

    /// The number of cooperating servers.
    pub fn party_count(&self) -> PartyCount {
        self.party_count
    }

    /// The bound on the worker pool, if any.
    pub fn worker_threads(&self) -> Option<usize> {
        self.worker_threads
    }

    pub(crate) fn build_pool(&self) -> Result<rayon::ThreadPool, PirError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.worker_threads {
            builder = builder.num_threads(threads);
        }
        Ok(builder.build()?)
    }
}
