// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Item storage for the reference retrieval primitive.

use crate::{
    field::{add_mod, bytes_to_coefficients, check_element, neg_mod, sum_mod},
    BlockIndex, FieldElement, ItemIndex, PartyCount, PirError, PirParameters,
};
use rand::{CryptoRng, Rng, RngCore};

/// A flat array of fixed-size items, keyed by item index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemDatabase {
    params: PirParameters,
    bytes: Vec<u8>,
}

impl ItemDatabase {
    /// Returns a new `ItemDatabase` filled with zero bytes.
    pub fn new(params: PirParameters) -> Result<Self, PirError> {
        Ok(Self {
            params,
            bytes: vec![0u8; Self::total_size(&params)?],
        })
    }

    /// Wraps `bytes`, which must hold exactly `item_count * item_size` bytes.
    pub fn from_bytes(params: PirParameters, bytes: Vec<u8>) -> Result<Self, PirError> {
        if bytes.len() != Self::total_size(&params)? {
            return Err(PirError::InvalidConfigurationError(
                "database size does not match the parameters",
            ));
        }
        Ok(Self { params, bytes })
    }

    /// Returns a database filled with uniformly random bytes.
    pub fn random<R: Rng>(params: PirParameters, rng: &mut R) -> Result<Self, PirError> {
        let mut bytes = vec![0u8; Self::total_size(&params)?];
        rng.fill(&mut bytes[..]);
        Ok(Self { params, bytes })
    }

    fn total_size(params: &PirParameters) -> Result<usize, PirError> {
        usize::try_from(params.item_count())?
            .checked_mul(params.item_size())
            .ok_or(PirError::InvalidConfigurationError("database is too large"))
    }

    /// The layout parameters of the database.
    pub fn params(&self) -> &PirParameters {
        &self.params
    }

    /// Reads the item stored at `index`.
    pub fn item(&self, index: ItemIndex) -> Result<&[u8], PirError> {
        let range = self.item_range(index)?;
        Ok(&self.bytes[range])
    }

    /// Overwrites the item stored at `index`, returning its previous value.
    pub fn write_item(&mut self, index: ItemIndex, value: &[u8]) -> Result<Vec<u8>, PirError> {
        if value.len() != self.params.item_size() {
            return Err(PirError::InvalidConfigurationError(
                "item value has the wrong size",
            ));
        }
        let range = self.item_range(index)?;
        let previous = self.bytes[range.clone()].to_vec();
        self.bytes[range].copy_from_slice(value);
        Ok(previous)
    }

    fn item_range(&self, index: ItemIndex) -> Result<std::ops::Range<usize>, PirError> {
        if index >= self.params.item_count() {
            return Err(PirError::OutOfRangeError {
                item: index,
                item_count: self.params.item_count(),
            });
        }
        let start = usize::try_from(index)? * self.params.item_size();
        Ok(start..start + self.params.item_size())
    }

    /// Encodes every item into the coefficient blocks of the retrieval primitive.
    pub fn encode(&self) -> Result<EncodedDatabase, PirError> {
        let params = self.params;
        let items_per_block = usize::try_from(params.items_per_block())?;
        let mut blocks = Vec::with_capacity(usize::try_from(params.block_count())?);

        for block_items in self.bytes.chunks(items_per_block * params.item_size()) {
            let mut block = vec![0; params.coefficients_per_block()];
            for (offset, item) in block_items.chunks(params.item_size()).enumerate() {
                let start = offset * params.coefficients_per_item();
                let coefficients = bytes_to_coefficients(item, params.bits_per_coefficient());
                block[start..start + coefficients.len()].copy_from_slice(&coefficients);
            }
            blocks.push(block);
        }

        log::debug!(
            "Encoded {} items into {} blocks of {} coefficients",
            params.item_count(),
            blocks.len(),
            params.coefficients_per_block()
        );
        Ok(EncodedDatabase { params, blocks })
    }
}

/// A database encoded as blocks of field coefficients, as held by a server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedDatabase {
    params: PirParameters,
    blocks: Vec<Vec<FieldElement>>,
}

impl EncodedDatabase {
    /// Wraps pre-encoded `blocks`, for example a fragment received from a dealer.
    ///
    /// Every block must hold `coefficients_per_block` field elements, and there must be
    /// `block_count` blocks.
    pub fn from_blocks(
        params: PirParameters,
        blocks: Vec<Vec<FieldElement>>,
    ) -> Result<Self, PirError> {
        if blocks.len() != usize::try_from(params.block_count())? {
            return Err(PirError::InvalidConfigurationError(
                "block count does not match the parameters",
            ));
        }
        for block in &blocks {
            if block.len() != params.coefficients_per_block() {
                return Err(PirError::InvalidConfigurationError(
                    "block does not hold coefficients_per_block coefficients",
                ));
            }
            for coefficient in block {
                check_element(*coefficient, params.plain_modulus())?;
            }
        }
        Ok(Self { params, blocks })
    }

    /// The layout parameters of the database.
    pub fn params(&self) -> &PirParameters {
        &self.params
    }

    /// The number of blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the coefficients of block `index`.
    pub fn block(&self, index: BlockIndex) -> Result<&[FieldElement], PirError> {
        let position = usize::try_from(index)?;
        self.blocks
            .get(position)
            .map(Vec::as_slice)
            .ok_or(PirError::InvalidConfigurationError("block index out of range"))
    }

    pub(crate) fn blocks(&self) -> &[Vec<FieldElement>] {
        &self.blocks
    }

    /// Splits the database into `parties` fragments whose coefficient-wise sum modulo `t` is
    /// this database. Any `parties - 1` fragments are jointly uniformly random.
    pub fn split_into_fragments<R: RngCore + CryptoRng>(
        &self,
        parties: PartyCount,
        rng: &mut R,
    ) -> Result<Vec<EncodedDatabase>, PirError> {
        if parties < 2 {
            return Err(PirError::InvalidConfigurationError(
                "at least two fragments are required",
            ));
        }
        let modulus = self.params.plain_modulus();
        let mut fragments = vec![self.clone(); parties];

        for (block_index, block) in self.blocks.iter().enumerate() {
            for (coefficient_index, coefficient) in block.iter().enumerate() {
                // The last fragment absorbs the value minus the sum of the random ones.
                let mut random_sum = 0;
                for fragment in fragments.iter_mut().take(parties - 1) {
                    let share = rng.gen_range(0..modulus);
                    fragment.blocks[block_index][coefficient_index] = share;
                    random_sum = add_mod(random_sum, share, modulus);
                }
                fragments[parties - 1].blocks[block_index][coefficient_index] =
                    add_mod(*coefficient, neg_mod(random_sum, modulus), modulus);
            }
        }

        log::info!(
            "Split a database of {} blocks into {} fragments",
            self.blocks.len(),
            parties
        );
        Ok(fragments)
    }

    /// Recombines fragments produced by [`EncodedDatabase::split_into_fragments`].
    pub fn combine_fragments(fragments: &[EncodedDatabase]) -> Result<Self, PirError> {
        let first = fragments.first().ok_or(PirError::InvalidConfigurationError(
            "no fragments to combine",
        ))?;
        if fragments.iter().any(|f| f.params != first.params) {
            return Err(PirError::InvalidConfigurationError(
                "fragments have different parameters",
            ));
        }
        let modulus = first.params.plain_modulus();

        let mut combined = first.clone();
        for (block_index, block) in combined.blocks.iter_mut().enumerate() {
            for (coefficient_index, coefficient) in block.iter_mut().enumerate() {
                *coefficient = sum_mod(
                    fragments
                        .iter()
                        .map(|f| &f.blocks[block_index][coefficient_index]),
                    modulus,
                );
            }
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::coefficients_to_bytes;
    use crate::test_utils::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn read_and_write_items() {
        init_logger();
        let params = PirParameters::new_with_parameters(4, 2, 97, 8).unwrap();
        let mut database = ItemDatabase::new(params).unwrap();
        assert_eq!(database.write_item(2, &[7, 9]).unwrap(), vec![0, 0]);
        assert_eq!(database.item(2).unwrap(), &[7, 9]);
        assert_eq!(database.item(1).unwrap(), &[0, 0]);
        assert!(database.item(4).is_err());
        assert!(database.write_item(0, &[1]).is_err());
    }

    #[test]
    fn from_bytes_checks_size() {
        let params = PirParameters::new_with_parameters(4, 2, 97, 8).unwrap();
        assert!(ItemDatabase::from_bytes(params, vec![0; 7]).is_err());
        assert!(ItemDatabase::from_bytes(params, vec![0; 8]).is_ok());
    }

    #[test]
    fn encoding_places_items_at_their_offsets() {
        let mut rng = StdRng::seed_from_u64(0);
        let params = PirParameters::new_with_parameters(11, 3, 97, 16).unwrap();
        let database = ItemDatabase::random(params, &mut rng).unwrap();
        let encoded = database.encode().unwrap();
        assert_eq!(encoded.block_count(), 3);

        for item in 0..params.item_count() {
            let block = encoded.block(params.block_index_of(item).unwrap()).unwrap();
            let offset = params.block_offset_of(item).unwrap() as usize;
            let start = offset * params.coefficients_per_item();
            let bytes = coefficients_to_bytes(
                &block[start..start + params.coefficients_per_item()],
                params.bits_per_coefficient(),
                params.item_size(),
            );
            assert_eq!(bytes, database.item(item).unwrap());
        }
    }

    #[test]
    fn fragments_recombine() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = PirParameters::new_with_parameters(20, 4, 97, 24).unwrap();
        let encoded = ItemDatabase::random(params, &mut rng)
            .unwrap()
            .encode()
            .unwrap();
        let fragments = encoded.split_into_fragments(3, &mut rng).unwrap();
        assert_eq!(fragments.len(), 3);
        assert_ne!(fragments[0], encoded);
        for fragment in &fragments {
            assert!(fragment.blocks().iter().flatten().all(|c| *c < 97));
        }
        assert_eq!(EncodedDatabase::combine_fragments(&fragments).unwrap(), encoded);
        assert!(encoded.split_into_fragments(1, &mut rng).is_err());
    }

    #[test]
    fn from_blocks_validates_shape() {
        let params = PirParameters::new_with_parameters(2, 1, 97, 2).unwrap();
        assert!(EncodedDatabase::from_blocks(params, vec![vec![1, 2], vec![3, 4]]).is_ok());
        assert!(EncodedDatabase::from_blocks(params, vec![vec![1, 2]]).is_err());
        assert!(EncodedDatabase::from_blocks(params, vec![vec![1, 2], vec![3]]).is_err());
        assert_eq!(
            EncodedDatabase::from_blocks(params, vec![vec![1, 2], vec![3, 97]]),
            Err(PirError::InvalidFieldElementError {
                value: 97,
                modulus: 97
            })
        );
    }
}
