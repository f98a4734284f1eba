// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Additive masking of replies ("confusion") and its removal by the client ("deconfusion").
//!
//! Each of the `P` servers holds an additive fragment of the database and masks its reply by
//! adding its share `r_i` of a zero-sum tuple to every coefficient. Summing the `P` decoded
//! replies modulo `t` gives `sum(v_i + r_i) = sum(v_i)`, the logical value, while any fewer
//! than `P` replies are masked by uniformly random shares.

use crate::{
    debatch::{check_coverage, reply_at},
    field::{add_mod, check_element},
    planner::RequestDescriptor,
    BlockOffset, FieldElement, PartyCount, PirError, ReplySlot, RetrievalClient, RetrievalServer,
};
use std::collections::{hash_map::Entry, HashMap};

/// Adds `share` to every coefficient of `reply`.
///
/// Must be applied exactly once per reply: adding the same share twice leaves a residual mask
/// that the client cannot remove.
pub fn confuse_reply<S: RetrievalServer>(
    server: &S,
    reply: S::Reply,
    share: FieldElement,
) -> Result<S::Reply, PirError> {
    let share = check_element(share, server.plain_modulus())?;
    let mask = server.encode_field(&vec![share; server.coefficient_count()])?;
    server.add_plaintext(reply, &mask)
}

fn check_party_count(parties: PartyCount) -> Result<(), PirError> {
    if parties < 2 {
        return Err(PirError::InvalidConfigurationError(
            "deconfusion needs at least two parties",
        ));
    }
    Ok(())
}

/// Sums the decoded coefficients of the replies of all `parties` for one slot, reducing
/// modulo `t` after every addition.
///
/// # Errors
///
/// Returns an `InvalidConfigurationError` if `parties < 2`, a `ShareCountMismatchError` if
/// `replies.len() != parties` (a partial sum would still carry a random mask), and an
/// `InvalidFieldElementError` if a reply decodes to a value outside `[0, t)`.
pub fn deconfuse<C: RetrievalClient>(
    client: &C,
    replies: &[&C::Reply],
    parties: PartyCount,
) -> Result<Vec<FieldElement>, PirError> {
    check_party_count(parties)?;
    if replies.len() != parties {
        return Err(PirError::ShareCountMismatchError {
            expected: parties,
            actual: replies.len(),
        });
    }
    let modulus = client.plain_modulus();

    let mut combined: Vec<FieldElement> = Vec::new();
    for (party, reply) in replies.iter().enumerate() {
        let coefficients = client
            .decode_to_field(reply)?
            .into_iter()
            .map(|coefficient| check_element(coefficient, modulus))
            .collect::<Result<Vec<_>, PirError>>()?;
        if party == 0 {
            combined = coefficients;
            continue;
        }
        if coefficients.len() != combined.len() {
            return Err(PirError::InvalidConfigurationError(
                "replies decode to different lengths",
            ));
        }
        for (total, coefficient) in combined.iter_mut().zip(coefficients) {
            *total = add_mod(*total, coefficient, modulus);
        }
    }
    Ok(combined)
}

/// Recovers the item at `offset` from the replies of all `parties` for one query.
pub fn deconfuse_and_decode<C: RetrievalClient>(
    client: &C,
    replies: &[C::Reply],
    parties: PartyCount,
    offset: BlockOffset,
) -> Result<Vec<u8>, PirError> {
    let references: Vec<&C::Reply> = replies.iter().collect();
    let combined = deconfuse(client, &references, parties)?;
    client.decode_plaintext(&client.encode_field(&combined)?, offset)
}

/// Recovers every requested item of a batch from the per-party reply batches.
///
/// `batch_replies[p][s]` is party `p`'s reply for slot `s`. Each slot referenced by a
/// descriptor is deconfused once, and each descriptor is decoded from its slot, in
/// descriptor order.
///
/// # Errors
///
/// Returns an `InvalidConfigurationError` if `parties < 2`, a `ShareCountMismatchError` if
/// `batch_replies.len() != parties`, and an `IndexOutOfBoundsError` if any party supplied
/// fewer replies than the descriptors require.
pub fn batch_deconfuse_and_decode<C: RetrievalClient>(
    client: &C,
    batch_replies: &[Vec<C::Reply>],
    parties: PartyCount,
    descriptors: &[RequestDescriptor],
) -> Result<Vec<Vec<u8>>, PirError> {
    check_party_count(parties)?;
    if batch_replies.len() != parties {
        return Err(PirError::ShareCountMismatchError {
            expected: parties,
            actual: batch_replies.len(),
        });
    }
    for replies in batch_replies {
        check_coverage(replies, descriptors)?;
    }

    let mut combined_by_slot: HashMap<ReplySlot, C::Plaintext> = HashMap::new();
    let mut results = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let slot = descriptor.reply_slot;
        let combined = match combined_by_slot.entry(slot) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let replies = batch_replies
                    .iter()
                    .map(|party_replies| reply_at(party_replies, slot))
                    .collect::<Result<Vec<_>, PirError>>()?;
                let coefficients = deconfuse(client, &replies, parties)?;
                log::debug!("Deconfused slot {}", slot);
                entry.insert(client.encode_field(&coefficients)?)
            }
        };
        results.push(client.decode_plaintext(combined, descriptor.block_offset)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_pir::{LinearScanClient, LinearScanServer};
    use crate::database::{EncodedDatabase, ItemDatabase};
    use crate::field::sum_mod;
    use crate::planner::plan_batch;
    use crate::shares::ShareTuple;
    use crate::test_utils::*;
    use crate::{PirParameters, RetrievalScheme};
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    // Two one-byte items, each alone in a block of two coefficients, t = 97.
    fn single_coefficient_params() -> PirParameters {
        PirParameters::new_with_parameters(2, 1, 97, 2).unwrap()
    }

    fn servers_with_values(values: [FieldElement; 3]) -> Vec<LinearScanServer> {
        let params = single_coefficient_params();
        values
            .iter()
            .map(|value| {
                let fragment =
                    EncodedDatabase::from_blocks(params, vec![vec![*value, 0], vec![0, 0]])
                        .unwrap();
                LinearScanServer::new(fragment)
            })
            .collect()
    }

    #[test]
    fn worked_example() {
        init_logger();
        // Partials 10, 20, 30 masked by 40, 55, 2 (mod 97).
        let servers = servers_with_values([10, 20, 30]);
        let client = LinearScanClient::new(single_coefficient_params());
        let tuple = ShareTuple::<3>::from_shares([40, 55, 2], 97).unwrap();
        let query = client.query(0).unwrap();

        let replies: Vec<_> = servers
            .iter()
            .zip(tuple.shares())
            .map(|(server, share)| {
                let reply = server.answer(&query).unwrap();
                confuse_reply(server, reply, *share).unwrap()
            })
            .collect();

        let confused: Vec<FieldElement> = replies
            .iter()
            .map(|r| client.decode_to_field(r).unwrap()[0])
            .collect();
        assert_eq!(confused, vec![50, 75, 32]);

        let references: Vec<_> = replies.iter().collect();
        let combined = deconfuse(&client, &references, 3).unwrap();
        assert_eq!(combined, vec![60, 0]);
    }

    #[test]
    fn refuses_partial_recombination() {
        let servers = servers_with_values([1, 2, 3]);
        let client = LinearScanClient::new(single_coefficient_params());
        let query = client.query(0).unwrap();
        let replies: Vec<_> = servers.iter().map(|s| s.answer(&query).unwrap()).collect();

        assert_eq!(
            deconfuse_and_decode(&client, &replies[..2], 3, 0),
            Err(PirError::ShareCountMismatchError {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            batch_deconfuse_and_decode(&client, &[replies.clone()], 3, &[]),
            Err(PirError::ShareCountMismatchError {
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn deconfusion_needs_two_parties() {
        let servers = servers_with_values([4, 5, 6]);
        let client = LinearScanClient::new(single_coefficient_params());
        let plan = plan_batch(&client, &[0, 1], None).unwrap();
        let replies: Vec<_> = plan
            .queries()
            .iter()
            .map(|q| servers[0].answer(&q.query).unwrap())
            .collect();
        let refused = || {
            Some(PirError::InvalidConfigurationError(
                "deconfusion needs at least two parties",
            ))
        };

        assert_eq!(
            batch_deconfuse_and_decode(&client, &[], 0, plan.descriptors()).err(),
            refused()
        );
        assert_eq!(
            batch_deconfuse_and_decode(&client, &[replies.clone()], 1, plan.descriptors()).err(),
            refused()
        );
        assert_eq!(deconfuse_and_decode(&client, &[], 0, 0).err(), refused());
        assert_eq!(
            deconfuse_and_decode(&client, &replies[..1], 1, 0).err(),
            refused()
        );
        assert_eq!(deconfuse(&client, &[&replies[0]], 1).err(), refused());
    }

    // Decodes replies verbatim, without range checks.
    struct UncheckedClient;

    impl RetrievalScheme for UncheckedClient {
        type Query = ();
        type Reply = Vec<FieldElement>;
        type Plaintext = Vec<FieldElement>;

        fn plain_modulus(&self) -> FieldElement {
            97
        }

        fn coefficient_count(&self) -> usize {
            2
        }

        fn encode_field(&self, coefficients: &[FieldElement]) -> Result<Self::Plaintext, PirError> {
            Ok(coefficients.to_vec())
        }
    }

    impl RetrievalClient for UncheckedClient {
        fn block_index_of(&self, _item: crate::ItemIndex) -> Result<crate::BlockIndex, PirError> {
            Ok(0)
        }

        fn block_offset_of(&self, _item: crate::ItemIndex) -> Result<BlockOffset, PirError> {
            Ok(0)
        }

        fn query(&self, _block: crate::BlockIndex) -> Result<(), PirError> {
            Ok(())
        }

        fn decode(&self, _reply: &Self::Reply, _offset: BlockOffset) -> Result<Vec<u8>, PirError> {
            Ok(Vec::new())
        }

        fn decode_to_field(&self, reply: &Self::Reply) -> Result<Vec<FieldElement>, PirError> {
            Ok(reply.clone())
        }

        fn decode_plaintext(
            &self,
            _plaintext: &Self::Plaintext,
            _offset: BlockOffset,
        ) -> Result<Vec<u8>, PirError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn deconfusion_rejects_out_of_field_coefficients() {
        let in_range = vec![96, 0];
        let overflowing = vec![u64::MAX, 0];
        assert_eq!(
            deconfuse(&UncheckedClient, &[&in_range, &overflowing], 2),
            Err(PirError::InvalidFieldElementError {
                value: u64::MAX,
                modulus: 97
            })
        );
        assert_eq!(
            deconfuse(&UncheckedClient, &[&vec![97, 0], &in_range], 2),
            Err(PirError::InvalidFieldElementError {
                value: 97,
                modulus: 97
            })
        );
        assert_eq!(
            deconfuse(&UncheckedClient, &[&in_range, &vec![2, 5]], 2),
            Ok(vec![1, 5])
        );
    }

    #[test]
    fn confusing_twice_leaves_a_residue() {
        let servers = servers_with_values([10, 20, 30]);
        let client = LinearScanClient::new(single_coefficient_params());
        let query = client.query(0).unwrap();
        let mut replies: Vec<_> = servers
            .iter()
            .zip([40, 55, 2])
            .map(|(s, r)| confuse_reply(s, s.answer(&query).unwrap(), r).unwrap())
            .collect();
        replies[1] = confuse_reply(&servers[1], replies[1].clone(), 55).unwrap();

        let references: Vec<_> = replies.iter().collect();
        assert_ne!(deconfuse(&client, &references, 3).unwrap()[0], 60);
    }

    #[test]
    fn confusion_rejects_non_field_shares() {
        let servers = servers_with_values([0, 0, 0]);
        let reply = servers[0].encode_field(&[0, 0]).unwrap();
        assert!(confuse_reply(&servers[0], reply, 97).is_err());
    }

    #[test]
    fn batch_equals_individual_deconfusion() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = PirParameters::new_with_parameters(40, 3, 257, 12).unwrap();
        let logical = ItemDatabase::random(params, &mut rng).unwrap();
        let fragments = logical
            .encode()
            .unwrap()
            .split_into_fragments(3, &mut rng)
            .unwrap();
        let servers: Vec<_> = fragments.into_iter().map(LinearScanServer::new).collect();
        let client = LinearScanClient::new(params);

        let items = [3, 39, 3, 17, 0, 16, 39];
        let plan = plan_batch(&client, &items, None).unwrap();

        let tuples: Vec<ShareTuple<3>> = (0..plan.slot_count())
            .map(|_| ShareTuple::generate(257, &mut rng).unwrap())
            .collect();
        let batch_replies: Vec<Vec<_>> = servers
            .iter()
            .enumerate()
            .map(|(party, server)| {
                plan.queries()
                    .iter()
                    .zip(&tuples)
                    .map(|(q, tuple)| {
                        let reply = server.answer(&q.query).unwrap();
                        confuse_reply(server, reply, tuple.shares()[party]).unwrap()
                    })
                    .collect()
            })
            .collect();

        let batched =
            batch_deconfuse_and_decode(&client, &batch_replies, 3, plan.descriptors()).unwrap();
        assert_eq!(batched.len(), items.len());

        for (descriptor, result) in plan.descriptors().iter().zip(&batched) {
            let slot_replies: Vec<_> = batch_replies
                .iter()
                .map(|replies| replies[descriptor.reply_slot].clone())
                .collect();
            let single =
                deconfuse_and_decode(&client, &slot_replies, 3, descriptor.block_offset).unwrap();
            assert_eq!(&single, result);
            assert_eq!(result, logical.item(descriptor.item_index).unwrap());
        }
    }

    #[test]
    fn batch_with_missing_replies() {
        let params = single_coefficient_params();
        let servers = servers_with_values([1, 2, 3]);
        let client = LinearScanClient::new(params);
        let plan = plan_batch(&client, &[0, 1], None).unwrap();
        let full: Vec<_> = plan
            .queries()
            .iter()
            .map(|q| servers[0].answer(&q.query).unwrap())
            .collect();
        let short = vec![full[0].clone()];
        assert_eq!(
            batch_deconfuse_and_decode(
                &client,
                &[full.clone(), short, full],
                3,
                plan.descriptors()
            ),
            Err(PirError::IndexOutOfBoundsError {
                slot: 1,
                available: 1
            })
        );
    }

    proptest! {
        #[test]
        fn masks_cancel_for_any_partials(
            v1 in 0u64..97, v2 in 0u64..97, v3 in 0u64..97, seed in any::<u64>()
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let tuple = ShareTuple::<3>::generate(97, &mut rng).unwrap();
            let servers = servers_with_values([v1, v2, v3]);
            let client = LinearScanClient::new(single_coefficient_params());
            let query = client.query(0).unwrap();
            let replies: Vec<_> = servers
                .iter()
                .zip(tuple.shares())
                .map(|(s, r)| confuse_reply(s, s.answer(&query).unwrap(), *r).unwrap())
                .collect();
            let references: Vec<_> = replies.iter().collect();
            let combined = deconfuse(&client, &references, 3).unwrap();
            prop_assert_eq!(combined[0], sum_mod(&[v1, v2, v3], 97));
        }
    }
}
