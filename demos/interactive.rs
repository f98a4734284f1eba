// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A simple interactive demonstration of batched multi-server retrieval.

use mpc_pir::database::ItemDatabase;
use mpc_pir::linear_pir::{LinearScanClient, LinearScanServer};
use mpc_pir::params::DEFAULT_PARTY_COUNT;
use mpc_pir::{ItemIndex, PirClient, PirParameters, PirServer, ProtocolConfig, ShareDealer};
use rand::rngs::OsRng;
use rustyline::history::FileHistory;
use rustyline::Editor;

const ITEM_SIZE: usize = 8;

fn parse_number(
    prompt: &str,
    rl: &mut Editor<(), FileHistory>,
) -> Result<u64, Box<dyn std::error::Error>> {
    Ok(loop {
        println!("{}", prompt);
        println!();
        let readline: String = rl.readline("> ")?;
        match readline.trim().parse::<u64>() {
            Ok(number) => break number,
            Err(_) => {
                println!("Expected a number. Try again.");
                continue;
            }
        }
    })
}

fn parse_items(
    prompt: &str,
    rl: &mut Editor<(), FileHistory>,
) -> Result<Vec<ItemIndex>, Box<dyn std::error::Error>> {
    Ok(loop {
        println!("{}", prompt);
        println!();
        let readline: String = rl.readline("> ")?;
        let parsed = readline
            .split_whitespace()
            .map(str::parse::<ItemIndex>)
            .collect::<Result<Vec<_>, _>>();
        match parsed {
            Ok(items) => break items,
            Err(_) => {
                println!("Expected numbers separated by spaces. Try again.");
                continue;
            }
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = OsRng;

    let mut rl = Editor::<(), _>::new()?;

    let item_count = parse_number("How many items should the database hold?", &mut rl)?;
    let params = PirParameters::new(item_count, ITEM_SIZE)?;
    let config = ProtocolConfig::default();

    // Item i holds the big-endian bytes of i * i.
    let mut database = ItemDatabase::new(params)?;
    for item in 0..item_count {
        database.write_item(item, &item.wrapping_mul(item).to_be_bytes())?;
    }

    let mut servers = database
        .encode()?
        .split_into_fragments(config.party_count(), &mut rng)?
        .into_iter()
        .enumerate()
        .map(|(party, fragment)| PirServer::new(LinearScanServer::new(fragment), party, config))
        .collect::<Result<Vec<_>, _>>()?;
    let client = PirClient::new(LinearScanClient::new(params), config)?;
    let dealer = ShareDealer::<DEFAULT_PARTY_COUNT>::new(params.plain_modulus())?;

    loop {
        let items = parse_items("Which items? (e.g. 3 17 3)", &mut rl)?;

        let plan = match client.plan_batch(&items) {
            Ok(plan) => plan,
            Err(error) => {
                println!("{}", error);
                continue;
            }
        };
        dealer.refresh(plan.slot_count(), &mut rng)?;

        let queries = plan.query_list();
        let mut batch_replies = Vec::with_capacity(servers.len());
        for server in servers.iter_mut() {
            let mut staged = dealer.take_staged(server.party())?;
            batch_replies.push(server.answer_batch_with_confusion(&queries, &mut staged)?);
        }

        let results = client.batch_deconfuse_and_decode(&batch_replies, plan.descriptors())?;
        for (item, bytes) in items.iter().zip(results) {
            let mut value = [0u8; ITEM_SIZE];
            value.copy_from_slice(&bytes);
            println!("Item {} is {}.", item, u64::from_be_bytes(value));
        }
        println!("({} queries sent to each server.)", plan.slot_count());
    }
}
