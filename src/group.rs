// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Scalar and element arithmetic for the ristretto255 prime-order group
//!
//! All scalar multiplications are constant-time in `curve25519-dalek`.
//! Deserialization is strict: elements must be canonical encodings of
//! non-identity points, and scalars must be canonical encodings of non-zero
//! values. Anything else is a [`ProtocolError::SerializationError`].

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use digest::Digest;
use rand::{CryptoRng, RngCore};

use crate::errors::ProtocolError;
use crate::hash::Hash;
use crate::serialization::{check_slice_size, serialize};

/// The byte length of a canonical group element encoding.
pub(crate) const ELEMENT_LEN: usize = 32;

/// The byte length of a canonical scalar encoding.
pub(crate) const SCALAR_LEN: usize = 32;

/// Picks a uniformly random non-zero scalar.
pub(crate) fn random_nonzero_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let scalar = Scalar::random(rng);
        if scalar != Scalar::ZERO {
            break scalar;
        }
    }
}

/// Returns a scalar from its canonical fixed-length encoding, rejecting
/// non-canonical encodings and zero.
pub(crate) fn scalar_from_slice(bytes: &[u8]) -> Result<Scalar, ProtocolError> {
    let checked_bytes = check_slice_size(bytes, SCALAR_LEN, "scalar_bytes")?;
    let mut bits = [0u8; SCALAR_LEN];
    bits.copy_from_slice(checked_bytes);
    let scalar: Option<Scalar> = Scalar::from_canonical_bytes(bits).into();
    match scalar {
        Some(scalar) if scalar != Scalar::ZERO => Ok(scalar),
        _ => Err(ProtocolError::SerializationError),
    }
}

/// Returns an element from its canonical fixed-length encoding, rejecting
/// non-canonical encodings and the identity element.
pub(crate) fn element_from_slice(bytes: &[u8]) -> Result<RistrettoPoint, ProtocolError> {
    let checked_bytes = check_slice_size(bytes, ELEMENT_LEN, "element_bytes")?;
    let mut bits = [0u8; ELEMENT_LEN];
    bits.copy_from_slice(checked_bytes);
    let point = CompressedRistretto(bits)
        .decompress()
        .ok_or(ProtocolError::SerializationError)?;
    if point.is_identity() {
        return Err(ProtocolError::SerializationError);
    }
    Ok(point)
}

/// Serializes a group element into its canonical encoding.
pub(crate) fn element_to_bytes(element: &RistrettoPoint) -> [u8; ELEMENT_LEN] {
    element.compress().to_bytes()
}

/// Hashes an input to a uniformly random group element under the given
/// domain-separation tag.
pub(crate) fn hash_to_group(input: &[u8], dst: &[u8]) -> Result<RistrettoPoint, ProtocolError> {
    let uniform_bytes = Hash::new()
        .chain_update(serialize(dst, 2)?)
        .chain_update(input)
        .finalize();
    let mut bits = [0u8; 64];
    bits.copy_from_slice(&uniform_bytes);
    Ok(RistrettoPoint::from_uniform_bytes(&bits))
}

/// Hashes an input to a uniformly random scalar under the given
/// domain-separation tag.
pub(crate) fn hash_to_scalar(input: &[u8], dst: &[u8]) -> Result<Scalar, ProtocolError> {
    let uniform_bytes = Hash::new()
        .chain_update(serialize(dst, 2)?)
        .chain_update(input)
        .finalize();
    let mut bits = [0u8; 64];
    bits.copy_from_slice(&uniform_bytes);
    Ok(Scalar::from_bytes_mod_order_wide(&bits))
}
