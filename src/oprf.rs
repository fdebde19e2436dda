// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! An implementation of the oblivious pseudorandom function over ristretto255
//!
//! The client blinds its password, the server evaluates the blinded element
//! under a per-credential key, and the client unblinds and finalizes the
//! result. The server learns nothing about the password, and the client
//! learns nothing about the key beyond the single evaluation.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use digest::Digest;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};

use crate::errors::ProtocolError;
use crate::group;
use crate::hash::{Hash, HashOutput, HASH_LEN};
use crate::serialization::serialize;

static STR_HASH_TO_GROUP: &[u8] = b"HashToGroup-OPRF-ristretto255-SHA512";
static STR_HASH_TO_SCALAR: &[u8] = b"HashToScalar-OPRF-ristretto255-SHA512";
static STR_FINALIZE: &[u8] = b"Finalize";
static STR_OPRF_KEY: &[u8] = b"OprfKey";

/// Computes the first step of the OPRF: hashing the input to the group and
/// multiplying by a random blinding factor. Returns the blinding factor
/// alongside the blinded element to be sent to the server.
pub(crate) fn blind<R: RngCore + CryptoRng>(
    rng: &mut R,
    input: &[u8],
) -> Result<(Scalar, RistrettoPoint), ProtocolError> {
    let blind = group::random_nonzero_scalar(rng);
    let hashed = group::hash_to_group(input, STR_HASH_TO_GROUP)?;
    Ok((blind, hashed * blind))
}

/// The server-side evaluation of a blinded element under an OPRF key.
pub(crate) fn evaluate(oprf_key: &Scalar, blinded_element: &RistrettoPoint) -> RistrettoPoint {
    blinded_element * oprf_key
}

/// Removes the blinding factor from an evaluated element and hashes the result
/// together with the original input, completing the OPRF.
pub(crate) fn finalize(
    input: &[u8],
    blind: &Scalar,
    evaluated_element: &RistrettoPoint,
) -> Result<HashOutput, ProtocolError> {
    let unblinded = evaluated_element * blind.invert();
    Ok(Hash::new()
        .chain_update(serialize(input, 2)?)
        .chain_update(serialize(&group::element_to_bytes(&unblinded), 2)?)
        .chain_update(STR_FINALIZE)
        .finalize())
}

/// Derives the per-credential OPRF key from the server's long-lived seed and
/// the credential identifier. Unknown identifiers yield keys that are
/// indistinguishable from registered ones.
pub(crate) fn key_from_seed(
    oprf_seed: &[u8],
    credential_identifier: &[u8],
) -> Result<Scalar, ProtocolError> {
    let mut ikm = [0u8; HASH_LEN];
    Hkdf::<Hash>::from_prk(oprf_seed)
        .map_err(|_| ProtocolError::SerializationError)?
        .expand_multi_info(&[credential_identifier, STR_OPRF_KEY], &mut ikm)
        .map_err(|_| ProtocolError::SerializationError)?;
    group::hash_to_scalar(&ikm, STR_HASH_TO_SCALAR)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    // Computes the OPRF output without any blinding, to check that the
    // blinded protocol arrives at the same value.
    fn oprf_unblinded(input: &[u8], oprf_key: &Scalar) -> HashOutput {
        let hashed = group::hash_to_group(input, STR_HASH_TO_GROUP).unwrap();
        let evaluated = hashed * oprf_key;
        Hash::new()
            .chain_update(serialize(input, 2).unwrap())
            .chain_update(serialize(&group::element_to_bytes(&evaluated), 2).unwrap())
            .chain_update(STR_FINALIZE)
            .finalize()
    }

    #[test]
    fn blinding_does_not_change_the_output() {
        let mut rng = OsRng;
        let input = b"correct horse battery staple";
        let oprf_key = key_from_seed(&[0x5a; HASH_LEN], b"alice").unwrap();

        let (blind, blinded_element) = blind(&mut rng, input).unwrap();
        let evaluated_element = evaluate(&oprf_key, &blinded_element);
        let output = finalize(input, &blind, &evaluated_element).unwrap();

        assert_eq!(output, oprf_unblinded(input, &oprf_key));
    }

    #[test]
    fn distinct_blinds_hide_the_input() {
        let mut rng = OsRng;
        let input = b"same password";
        let (_, first) = blind(&mut rng, input).unwrap();
        let (_, second) = blind(&mut rng, input).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn key_derivation_separates_credentials() {
        let seed = [0x11; HASH_LEN];
        let alice = key_from_seed(&seed, b"alice").unwrap();
        let bob = key_from_seed(&seed, b"bob").unwrap();
        assert_ne!(alice, bob);
        assert_eq!(alice, key_from_seed(&seed, b"alice").unwrap());
    }
}
