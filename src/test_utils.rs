// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains common test utilities for tests exercising the multi-party protocol
//! end to end.

use std::sync::Once;
static INIT: Once = Once::new();
use crate::database::ItemDatabase;
use crate::linear_pir::{LinearScanClient, LinearScanServer};
use crate::{
    FieldElement, ItemIndex, PartyCount, PirClient, PirParameters, PirServer, ProtocolConfig,
    ShareDealer,
};
use rand::{rngs::StdRng, CryptoRng, Rng, RngCore, SeedableRng};
use simplelog::{Config, WriteLogger};

/// Block size used by the generated end-to-end tests.
pub(crate) const TEST_COEFFICIENTS_PER_BLOCK: usize = 64;

// For use in manual testing and inspection.
pub(crate) fn init_logger() {
    INIT.call_once(|| {
        WriteLogger::init(log::LevelFilter::Info, Config::default(), std::io::stdout()).unwrap()
    })
}

/// A random logical database, one client, and one server per party holding a fragment.
pub(crate) struct Deployment {
    pub(crate) database: ItemDatabase,
    pub(crate) client: PirClient<LinearScanClient>,
    pub(crate) servers: Vec<PirServer<LinearScanServer>>,
}

pub(crate) fn deploy<R: RngCore + CryptoRng>(
    parties: PartyCount,
    params: PirParameters,
    rng: &mut R,
) -> Deployment {
    let config = ProtocolConfig::new(parties, Some(2)).unwrap();
    let database = ItemDatabase::random(params, rng).unwrap();
    let fragments = database
        .encode()
        .unwrap()
        .split_into_fragments(parties, rng)
        .unwrap();
    let servers = fragments
        .into_iter()
        .enumerate()
        .map(|(party, fragment)| {
            PirServer::new(LinearScanServer::new(fragment), party, config).unwrap()
        })
        .collect();
    let client = PirClient::new(LinearScanClient::new(params), config).unwrap();
    Deployment {
        database,
        client,
        servers,
    }
}

fn test_params(item_count: u64, item_size: usize, plain_modulus: FieldElement) -> PirParameters {
    PirParameters::new_with_parameters(
        item_count,
        item_size,
        plain_modulus,
        TEST_COEFFICIENTS_PER_BLOCK,
    )
    .unwrap()
}

/// Retrieves `num_queries` random items one at a time, each masked by a fresh tuple.
pub(crate) fn test_single_query_workload<const P: PartyCount>(
    item_count: u64,
    item_size: usize,
    plain_modulus: FieldElement,
    num_queries: usize,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);
    let Deployment {
        database,
        client,
        servers,
    } = deploy(P, test_params(item_count, item_size, plain_modulus), &mut rng);
    let dealer = ShareDealer::<P>::new(plain_modulus).unwrap();

    for _ in 0..num_queries {
        let item: ItemIndex = rng.gen_range(0..item_count);
        let (query, offset) = client.query(item).unwrap();
        let tuple = dealer.generate_tuple(&mut rng).unwrap();

        let replies: Vec<_> = servers
            .iter()
            .map(|server| {
                let share = tuple.share(server.party()).unwrap();
                server.answer_with_confusion(&query, share).unwrap()
            })
            .collect();

        assert_eq!(
            client.deconfuse_and_decode(&replies, offset).unwrap(),
            database.item(item).unwrap(),
            "{item}"
        );
    }
}

/// Runs several rounds of random batches of `batch_size` requests, each round masked by a
/// freshly refreshed dealer.
pub(crate) fn test_batch_workload<const P: PartyCount>(
    item_count: u64,
    item_size: usize,
    plain_modulus: FieldElement,
    batch_size: usize,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);
    let Deployment {
        database,
        client,
        mut servers,
    } = deploy(P, test_params(item_count, item_size, plain_modulus), &mut rng);
    let dealer = ShareDealer::<P>::new(plain_modulus).unwrap();

    for _round in 0..3 {
        let items: Vec<ItemIndex> = (0..batch_size)
            .map(|_| rng.gen_range(0..item_count))
            .collect();
        let plan = client.plan_batch(&items).unwrap();
        dealer.refresh(plan.slot_count(), &mut rng).unwrap();

        let queries = plan.query_list();
        let batch_replies: Vec<Vec<_>> = servers
            .iter_mut()
            .enumerate()
            .map(|(party, server)| {
                let mut staged = dealer.take_staged(party).unwrap();
                server
                    .answer_batch_with_confusion(&queries, &mut staged)
                    .unwrap()
            })
            .collect();

        let results = client
            .batch_deconfuse_and_decode(&batch_replies, plan.descriptors())
            .unwrap();
        assert_eq!(results.len(), items.len());
        for (result, item) in results.iter().zip(&items) {
            assert_eq!(result, database.item(*item).unwrap(), "{item}");
        }
    }
}

macro_rules! create_end_to_end_test {
    ($function_name:ident, $parties: expr, $item_count: expr, $item_size: expr, $plain_modulus: expr, $iterations_to_test: expr) => {
        paste::paste! {
            #[test]
            fn [<$function_name _ $parties _parties_ $item_count _ $item_size _ $plain_modulus>]() {
                $function_name::<{ $parties }>($item_count, $item_size, $plain_modulus, $iterations_to_test);
            }
        }
    };
}

macro_rules! create_end_to_end_tests_for_workload {
    ($function_name: ident) => {
        create_end_to_end_test!($function_name, 2, 16, 1, 97, 20);
        create_end_to_end_test!($function_name, 2, 100, 8, 257, 20);
        create_end_to_end_test!($function_name, 3, 64, 4, 65537, 20);
        create_end_to_end_test!($function_name, 3, 200, 16, 1048573, 10);
        create_end_to_end_test!($function_name, 5, 50, 3, 97, 10);
        // Plaintext modulus 2^62, the largest supported.
        create_end_to_end_test!($function_name, 4, 33, 2, 4611686018427387904, 10);
    };
}

pub(crate) use create_end_to_end_test;
pub(crate) use create_end_to_end_tests_for_workload;
