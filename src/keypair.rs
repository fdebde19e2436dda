// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Contains the keypair types used by the authenticated key exchange

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::errors::ProtocolError;
use crate::group;

/// A static or ephemeral Diffie-Hellman secret key: a non-zero scalar on
/// ristretto255.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrivateKey(pub(crate) Scalar);

/// The group element matching a [`PrivateKey`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey(pub(crate) RistrettoPoint);

/// A private/public keypair with the pairing invariant
/// `public == G * private` enforced on every deserialization path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl PrivateKey {
    /// Serialization into bytes
    pub fn serialize(&self) -> [u8; group::SCALAR_LEN] {
        self.0.to_bytes()
    }

    /// Deserialization from bytes, rejecting non-canonical and zero scalars
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self(group::scalar_from_slice(input)?))
    }

    /// Computes the public key matching this secret key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(RistrettoPoint::mul_base(&self.0))
    }

    /// Computes the Diffie-Hellman function between this secret key and a
    /// public key. Constant-time with respect to the secret scalar.
    pub(crate) fn diffie_hellman(&self, public: &PublicKey) -> [u8; group::ELEMENT_LEN] {
        group::element_to_bytes(&(public.0 * self.0))
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Zeroize for KeyPair {
    // The public half is derivable from anything that knows the secret, so
    // only the private scalar needs wiping.
    fn zeroize(&mut self) {
        self.private.zeroize();
    }
}

impl PublicKey {
    /// Serialization into bytes
    pub fn serialize(&self) -> [u8; group::ELEMENT_LEN] {
        group::element_to_bytes(&self.0)
    }

    /// Deserialization from bytes, rejecting non-canonical encodings and the
    /// identity element
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self(group::element_from_slice(input)?))
    }
}

impl KeyPair {
    /// Generates a fresh keypair from a cryptographic rng.
    pub fn generate_random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let private = PrivateKey(group::random_nonzero_scalar(rng));
        let public = private.public_key();
        Self { private, public }
    }

    /// Builds a keypair from a secret key, deriving the public half.
    pub fn from_private_key(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Builds a keypair from a serialized secret key.
    pub fn from_private_key_slice(input: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self::from_private_key(PrivateKey::deserialize(input)?))
    }

    /// Builds a keypair from both halves, verifying that they match. A
    /// mismatched pair is corrupt key material, not a protocol failure.
    pub fn from_keys(private: PrivateKey, public: PublicKey) -> Result<Self, ProtocolError> {
        let expected = private.public_key();
        if !bool::from(expected.serialize().ct_eq(&public.serialize())) {
            return Err(ProtocolError::SerializationError);
        }
        Ok(Self { private, public })
    }

    /// The public key component
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// The private key component
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }
}
