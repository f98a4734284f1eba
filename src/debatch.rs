// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Resolution of per-slot replies back to the requested items.

use crate::{planner::RequestDescriptor, PirError, ReplySlot, RetrievalClient};

/// Returns the reply at `slot`, or an `IndexOutOfBoundsError` if too few replies were supplied.
pub(crate) fn reply_at<T>(replies: &[T], slot: ReplySlot) -> Result<&T, PirError> {
    replies.get(slot).ok_or(PirError::IndexOutOfBoundsError {
        slot,
        available: replies.len(),
    })
}

/// Checks that `replies` covers every slot referenced by `descriptors`.
pub(crate) fn check_coverage<T>(
    replies: &[T],
    descriptors: &[RequestDescriptor],
) -> Result<(), PirError> {
    match descriptors.iter().map(|d| d.reply_slot).max() {
        Some(highest) => reply_at(replies, highest).map(|_| ()),
        None => Ok(()),
    }
}

/// Decodes the item of every descriptor from the reply at its slot.
///
/// The output is in descriptor (submission) order; duplicate requests are decoded
/// independently.
///
/// # Errors
///
/// Returns an `IndexOutOfBoundsError` before decoding anything if `replies` is shorter than
/// the highest slot referenced, or the first error raised by the primitive's decoder.
pub fn debatch_replies<C: RetrievalClient>(
    client: &C,
    descriptors: &[RequestDescriptor],
    replies: &[C::Reply],
) -> Result<Vec<Vec<u8>>, PirError> {
    check_coverage(replies, descriptors)?;

    descriptors
        .iter()
        .map(|descriptor| {
            let reply = reply_at(replies, descriptor.reply_slot)?;
            client.decode(reply, descriptor.block_offset)
        })
        .collect()
}
