// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An example of retrieving a batch of items from a database split across three servers.

extern crate mpc_pir;

use mpc_pir::database::ItemDatabase;
use mpc_pir::linear_pir::{LinearScanClient, LinearScanServer};
use mpc_pir::params::DEFAULT_PARTY_COUNT;
use mpc_pir::{
    ItemIndex, PirClient, PirError, PirParameters, PirServer, ProtocolConfig, ShareDealer,
};
use rand::{rngs::OsRng, Rng};
use simplelog::{Config, LevelFilter, SimpleLogger};

const ITEM_COUNT: u64 = 1 << 10;
const ITEM_SIZE: usize = 64;
const BATCH_SIZE: usize = 32;

fn main() -> Result<(), PirError> {
    let _ = SimpleLogger::init(LevelFilter::Info, Config::default());
    let mut rng = OsRng;
    let params = PirParameters::new(ITEM_COUNT, ITEM_SIZE)?;
    let config = ProtocolConfig::new(DEFAULT_PARTY_COUNT, Some(4))?;

    // A stand-in for the database you want to serve privately.
    let database = ItemDatabase::random(params, &mut rng)?;

    let mut servers = database
        .encode()?
        .split_into_fragments(config.party_count(), &mut rng)?
        .into_iter()
        .enumerate()
        .map(|(party, fragment)| PirServer::new(LinearScanServer::new(fragment), party, config))
        .collect::<Result<Vec<_>, PirError>>()?;
    let client = PirClient::new(LinearScanClient::new(params), config)?;
    let dealer = ShareDealer::<DEFAULT_PARTY_COUNT>::new(params.plain_modulus())?;

    let items: Vec<ItemIndex> = (0..BATCH_SIZE)
        .map(|_| rng.gen_range(0..ITEM_COUNT))
        .collect();
    let plan = client.plan_batch(&items)?;
    dealer.refresh(plan.slot_count(), &mut rng)?;

    let queries = plan.query_list();
    let mut batch_replies = Vec::with_capacity(servers.len());
    for server in servers.iter_mut() {
        let mut staged = dealer.take_staged(server.party())?;
        batch_replies.push(server.answer_batch_with_confusion(&queries, &mut staged)?);
    }

    let results = client.batch_deconfuse_and_decode(&batch_replies, plan.descriptors())?;
    let matching = results
        .iter()
        .zip(&items)
        .filter(|(result, item)| {
            database
                .item(**item)
                .is_ok_and(|expected| expected == &result[..])
        })
        .count();
    println!(
        "Retrieved {} of {} items with {} queries per server.",
        matching,
        items.len(),
        plan.slot_count()
    );
    Ok(())
}
