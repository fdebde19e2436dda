// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Pins the hash, MAC and KDF primitives shared by the whole protocol

use hkdf::Hkdf;
use hmac::Hmac;

use crate::errors::ProtocolError;

/// The collision-resistant hash backing the transcript, the OPRF finalization
/// and every KDF invocation.
pub(crate) type Hash = sha2::Sha512;

/// A hash-sized (64-byte) output value.
pub(crate) type HashOutput = digest::Output<Hash>;

pub(crate) type HashHmac = Hmac<Hash>;
pub(crate) type HashHkdf = Hkdf<Hash>;

/// The hash output size in bytes.
pub(crate) const HASH_LEN: usize = 64;

/// [`Hmac`] accepts keys of any length, so this only converts the error type.
pub(crate) fn hmac(key: &[u8]) -> Result<HashHmac, ProtocolError> {
    use hmac::Mac;
    HashHmac::new_from_slice(key).map_err(|_| ProtocolError::SerializationError)
}
