// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Arithmetic modulo the plaintext modulus, and packing of item bytes into coefficients.
//!
//! The modular operations run in constant time, since servers apply them to secret shares.
//! All of them assume operands already lie in `[0, modulus)` and `modulus <= 2^62`.

use crate::{FieldElement, PirError};
use subtle::{ConditionallySelectable, ConstantTimeEq, ConstantTimeGreater};

/// Returns `(a + b) mod modulus`.
pub fn add_mod(a: FieldElement, b: FieldElement, modulus: FieldElement) -> FieldElement {
    let sum = a + b;
    let wrapped = sum.wrapping_sub(modulus);
    // sum >= modulus
    let needs_reduction = !modulus.ct_gt(&sum);
    FieldElement::conditional_select(&sum, &wrapped, needs_reduction)
}

/// Returns `(modulus - a) mod modulus`.
pub fn neg_mod(a: FieldElement, modulus: FieldElement) -> FieldElement {
    let negated = modulus - a;
    FieldElement::conditional_select(&negated, &0, a.ct_eq(&0))
}

/// Sums `values` modulo `modulus`, reducing after every addition.
pub fn sum_mod<'a, I: IntoIterator<Item = &'a FieldElement>>(
    values: I,
    modulus: FieldElement,
) -> FieldElement {
    values
        .into_iter()
        .fold(0, |acc, value| add_mod(acc, *value, modulus))
}

/// Returns `(a * b) mod modulus`. Not constant time.
pub fn mul_mod(a: FieldElement, b: FieldElement, modulus: FieldElement) -> FieldElement {
    let product = u128::from(a) * u128::from(b) % u128::from(modulus);
    // The remainder is below `modulus`, which fits in 64 bits.
    product as FieldElement
}

/// Checks that `value` is a field element modulo `modulus`.
pub fn check_element(value: u64, modulus: FieldElement) -> Result<FieldElement, PirError> {
    if value >= modulus {
        return Err(PirError::InvalidFieldElementError { value, modulus });
    }
    Ok(value)
}

/// Packs `bytes` into coefficients of `bits_per_coefficient` bits each, least significant bit
/// first. The last coefficient is zero-padded.
pub fn bytes_to_coefficients(bytes: &[u8], bits_per_coefficient: u32) -> Vec<FieldElement> {
    let bits = bits_per_coefficient as usize;
    let total_bits = bytes.len() * 8;
    let mut coefficients = vec![0; total_bits.div_ceil(bits)];

    for bit in 0..total_bits {
        if (bytes[bit / 8] >> (bit % 8)) & 1 == 1 {
            coefficients[bit / bits] |= 1 << (bit % bits);
        }
    }
    coefficients
}

/// Unpacks `byte_count` bytes from coefficients written by [`bytes_to_coefficients`].
/// Bits above `bits_per_coefficient` in each coefficient are ignored, and missing
/// coefficients read as zero.
pub fn coefficients_to_bytes(
    coefficients: &[FieldElement],
    bits_per_coefficient: u32,
    byte_count: usize,
) -> Vec<u8> {
    let bits = bits_per_coefficient as usize;
    let mut bytes = vec![0u8; byte_count];

    for bit in 0..byte_count * 8 {
        let coefficient = coefficients.get(bit / bits).copied().unwrap_or(0);
        if (coefficient >> (bit % bits)) & 1 == 1 {
            bytes[bit / 8] |= 1 << (bit % 8);
        }
    }
    bytes
}
