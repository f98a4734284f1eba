// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A very simple demonstration of a single masked query answered by three servers.

extern crate mpc_pir;

use mpc_pir::database::ItemDatabase;
use mpc_pir::linear_pir::{LinearScanClient, LinearScanServer};
use mpc_pir::params::DEFAULT_PARTY_COUNT;
use mpc_pir::{PirClient, PirError, PirParameters, PirServer, ProtocolConfig, ShareDealer};
use rand::rngs::OsRng;

fn main() -> Result<(), PirError> {
    let mut rng = OsRng;
    let params = PirParameters::new(64, 8)?;
    let config = ProtocolConfig::default();

    let mut database = ItemDatabase::new(params)?;
    database.write_item(42, b"mpc-pir!")?;

    let fragments = database
        .encode()?
        .split_into_fragments(config.party_count(), &mut rng)?;
    let servers = fragments
        .into_iter()
        .enumerate()
        .map(|(party, fragment)| PirServer::new(LinearScanServer::new(fragment), party, config))
        .collect::<Result<Vec<_>, PirError>>()?;
    let client = PirClient::new(LinearScanClient::new(params), config)?;

    let (query, offset) = client.query(42)?;
    let tuple = ShareDealer::<DEFAULT_PARTY_COUNT>::new(params.plain_modulus())?
        .generate_tuple(&mut rng)?;
    let replies = servers
        .iter()
        .zip(tuple.shares())
        .map(|(server, share)| server.answer_with_confusion(&query, *share))
        .collect::<Result<Vec<_>, PirError>>()?;

    let item = client.deconfuse_and_decode(&replies, offset)?;
    println!("{}", String::from_utf8_lossy(&item));
    Ok(())
}
