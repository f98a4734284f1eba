// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A transparent linear-scan implementation of the retrieval primitive.
//!
//! Queries are plaintext one-hot selection vectors over the blocks, and the server answers by
//! taking the inner product of the selection vector with every block of its database. The
//! server therefore learns which block is requested: this primitive offers **no privacy** and
//! exists to exercise the batching and masking layers with exact, inspectable arithmetic.

use crate::{
    database::EncodedDatabase,
    field::{add_mod, check_element, coefficients_to_bytes, mul_mod},
    BlockIndex, BlockOffset, FieldElement, ItemIndex, PirError, PirParameters, RetrievalClient,
    RetrievalScheme, RetrievalServer,
};

/// A one-hot selection vector over the blocks of the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionVector(Vec<FieldElement>);

/// A vector of block coefficients, used both for replies and for plaintexts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoefficientVector(Vec<FieldElement>);

impl CoefficientVector {
    /// The coefficients.
    pub fn coefficients(&self) -> &[FieldElement] {
        &self.0
    }
}

macro_rules! linear_scan_scheme {
    ($scheme_type: ident) => {
        impl RetrievalScheme for $scheme_type {
            type Query = SelectionVector;
            type Reply = CoefficientVector;
            type Plaintext = CoefficientVector;

            fn plain_modulus(&self) -> FieldElement {
                self.params().plain_modulus()
            }

            fn coefficient_count(&self) -> usize {
                self.params().coefficients_per_block()
            }

            fn encode_field(
                &self,
                coefficients: &[FieldElement],
            ) -> Result<CoefficientVector, PirError> {
                encode_coefficients(self.params(), coefficients)
            }
        }
    };
}

fn encode_coefficients(
    params: &PirParameters,
    coefficients: &[FieldElement],
) -> Result<CoefficientVector, PirError> {
    if coefficients.len() > params.coefficients_per_block() {
        return Err(PirError::InvalidConfigurationError(
            "more coefficients than fit in a block",
        ));
    }
    let mut result = vec![0; params.coefficients_per_block()];
    for (slot, coefficient) in result.iter_mut().zip(coefficients) {
        *slot = check_element(*coefficient, params.plain_modulus())?;
    }
    Ok(CoefficientVector(result))
}

/// The client of the linear-scan primitive.
#[derive(Clone, Debug)]
pub struct LinearScanClient {
    params: PirParameters,
}

impl LinearScanClient {
    /// Returns a client for a database laid out according to `params`.
    pub fn new(params: PirParameters) -> Self {
        Self { params }
    }

    /// The layout parameters.
    pub fn params(&self) -> &PirParameters {
        &self.params
    }

    fn check_length(&self, coefficients: &[FieldElement]) -> Result<(), PirError> {
        if coefficients.len() != self.params.coefficients_per_block() {
            return Err(PirError::InvalidConfigurationError(
                "reply does not hold exactly one block",
            ));
        }
        Ok(())
    }

    fn extract_item(
        &self,
        coefficients: &[FieldElement],
        offset: BlockOffset,
    ) -> Result<Vec<u8>, PirError> {
        self.check_length(coefficients)?;
        if offset >= self.params.items_per_block() {
            return Err(PirError::InvalidConfigurationError(
                "offset lies outside the block",
            ));
        }
        let start = usize::try_from(offset)? * self.params.coefficients_per_item();
        let end = start + self.params.coefficients_per_item();
        Ok(coefficients_to_bytes(
            &coefficients[start..end],
            self.params.bits_per_coefficient(),
            self.params.item_size(),
        ))
    }
}

linear_scan_scheme!(LinearScanClient);

impl RetrievalClient for LinearScanClient {
    fn block_index_of(&self, item: ItemIndex) -> Result<BlockIndex, PirError> {
        self.params.block_index_of(item)
    }

    fn block_offset_of(&self, item: ItemIndex) -> Result<BlockOffset, PirError> {
        self.params.block_offset_of(item)
    }

    fn query(&self, block: BlockIndex) -> Result<SelectionVector, PirError> {
        let block_count = self.params.block_count();
        if block >= block_count {
            return Err(PirError::InvalidConfigurationError(
                "block index out of range",
            ));
        }
        let mut selection = vec![0; usize::try_from(block_count)?];
        selection[usize::try_from(block)?] = 1;
        Ok(SelectionVector(selection))
    }

    fn decode(&self, reply: &CoefficientVector, offset: BlockOffset) -> Result<Vec<u8>, PirError> {
        self.extract_item(&reply.0, offset)
    }

    fn decode_to_field(&self, reply: &CoefficientVector) -> Result<Vec<FieldElement>, PirError> {
        self.check_length(&reply.0)?;
        Ok(reply.0.clone())
    }

    fn decode_plaintext(
        &self,
        plaintext: &CoefficientVector,
        offset: BlockOffset,
    ) -> Result<Vec<u8>, PirError> {
        self.extract_item(&plaintext.0, offset)
    }
}

/// The server of the linear-scan primitive, holding one (fragment of a) database.
#[derive(Clone, Debug)]
pub struct LinearScanServer {
    database: EncodedDatabase,
}

impl LinearScanServer {
    /// Returns a server answering queries against `database`.
    pub fn new(database: EncodedDatabase) -> Self {
        log::info!(
            "LinearScanServer::new(blocks = {})",
            database.block_count()
        );
        Self { database }
    }

    /// The layout parameters.
    pub fn params(&self) -> &PirParameters {
        self.database.params()
    }
}

linear_scan_scheme!(LinearScanServer);

impl RetrievalServer for LinearScanServer {
    fn answer(&self, query: &SelectionVector) -> Result<CoefficientVector, PirError> {
        let modulus = self.plain_modulus();
        let blocks = self.database.blocks();
        if query.0.len() != blocks.len() {
            return Err(PirError::InvalidConfigurationError(
                "query does not match the number of blocks",
            ));
        }

        // Every block is read regardless of the selection.
        let mut result = vec![0; self.params().coefficients_per_block()];
        for (selector, block) in query.0.iter().zip(blocks) {
            let selector = check_element(*selector, modulus)?;
            for (accumulator, coefficient) in result.iter_mut().zip(block) {
                *accumulator = add_mod(
                    *accumulator,
                    mul_mod(selector, *coefficient, modulus),
                    modulus,
                );
            }
        }
        Ok(CoefficientVector(result))
    }

    fn add_plaintext(
        &self,
        reply: CoefficientVector,
        plaintext: &CoefficientVector,
    ) -> Result<CoefficientVector, PirError> {
        if reply.0.len() != plaintext.0.len() {
            return Err(PirError::InvalidConfigurationError(
                "reply and plaintext lengths differ",
            ));
        }
        let modulus = self.plain_modulus();
        let mut coefficients = reply.0;
        for (coefficient, addend) in coefficients.iter_mut().zip(&plaintext.0) {
            *coefficient = add_mod(*coefficient, *addend, modulus);
        }
        Ok(CoefficientVector(coefficients))
    }
}
