// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The envelope sealed by the client at registration and opened at login
//!
//! The envelope holds the client's static secret key, encrypted under keys
//! derived from the randomized password, and authenticates the server's
//! public key together with both identities. Opening it with anything other
//! than the original password fails the tag check.

use hmac::Mac;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;

use crate::errors::ProtocolError;
use crate::group::{ELEMENT_LEN, SCALAR_LEN};
use crate::hash::{hmac, HashHkdf, HashOutput, HASH_LEN};
use crate::keypair::{KeyPair, PublicKey};
use crate::opaque::Identifiers;
use crate::serialization::{check_slice_size, serialize};

/// The length of the envelope nonce.
pub(crate) const NONCE_LEN: usize = 32;

/// The total serialized envelope length: nonce, encrypted secret key and
/// authentication tag.
pub(crate) const ENVELOPE_LEN: usize = NONCE_LEN + SCALAR_LEN + HASH_LEN;

static STR_PAD: &[u8] = b"Pad";
static STR_AUTH_KEY: &[u8] = b"AuthKey";
static STR_EXPORT_KEY: &[u8] = b"ExportKey";

/// The encrypted and authenticated envelope stored in the password file and
/// echoed back to the client inside the masked credential response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Envelope {
    nonce: [u8; NONCE_LEN],
    encrypted_creds: [u8; SCALAR_LEN],
    auth_tag: HashOutput,
}

/// The result of successfully opening an [`Envelope`].
#[derive(Debug)]
pub(crate) struct OpenedEnvelope {
    pub(crate) client_static_keypair: KeyPair,
    pub(crate) export_key: HashOutput,
}

struct EnvelopeKeys {
    pad: [u8; SCALAR_LEN],
    auth_key: HashOutput,
    export_key: HashOutput,
}

fn derive_keys(randomized_pwd: &[u8], nonce: &[u8]) -> Result<EnvelopeKeys, ProtocolError> {
    let hkdf = HashHkdf::from_prk(randomized_pwd).map_err(|_| ProtocolError::SerializationError)?;
    let mut pad = [0u8; SCALAR_LEN];
    let mut auth_key = HashOutput::default();
    let mut export_key = HashOutput::default();
    hkdf.expand_multi_info(&[nonce, STR_PAD], &mut pad)
        .map_err(|_| ProtocolError::SerializationError)?;
    hkdf.expand_multi_info(&[nonce, STR_AUTH_KEY], &mut auth_key)
        .map_err(|_| ProtocolError::SerializationError)?;
    hkdf.expand_multi_info(&[nonce, STR_EXPORT_KEY], &mut export_key)
        .map_err(|_| ProtocolError::SerializationError)?;
    Ok(EnvelopeKeys {
        pad,
        auth_key,
        export_key,
    })
}

/// Serializes the identity bindings covered by the authentication tag. Absent
/// identities default to the matching static public keys.
pub(crate) fn build_cleartext_credentials(
    server_s_pk: &PublicKey,
    client_s_pk: &PublicKey,
    identifiers: Identifiers<'_>,
) -> Result<Vec<u8>, ProtocolError> {
    let server_s_pk_bytes = server_s_pk.serialize();
    let client_s_pk_bytes = client_s_pk.serialize();
    let server_identity = identifiers.server.unwrap_or(&server_s_pk_bytes);
    let client_identity = identifiers.client.unwrap_or(&client_s_pk_bytes);

    let mut credentials = Vec::new();
    credentials.extend_from_slice(&server_s_pk_bytes);
    credentials.extend_from_slice(&serialize(server_identity, 2)?);
    credentials.extend_from_slice(&serialize(client_identity, 2)?);
    Ok(credentials)
}

impl Envelope {
    /// Encrypts and authenticates the client's static secret key under keys
    /// derived from the randomized password. Returns the export key alongside
    /// the sealed envelope.
    pub(crate) fn seal<R: RngCore + CryptoRng>(
        rng: &mut R,
        randomized_pwd: &[u8],
        client_static_keypair: &KeyPair,
        server_s_pk: &PublicKey,
        identifiers: Identifiers<'_>,
    ) -> Result<(Self, HashOutput), ProtocolError> {
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let keys = derive_keys(randomized_pwd, &nonce)?;
        let sk_bytes = client_static_keypair.private().serialize();
        let mut encrypted_creds = [0u8; SCALAR_LEN];
        for (slot, (lhs, rhs)) in encrypted_creds
            .iter_mut()
            .zip(sk_bytes.iter().zip(keys.pad.iter()))
        {
            *slot = lhs ^ rhs;
        }

        let cleartext_credentials = build_cleartext_credentials(
            server_s_pk,
            client_static_keypair.public(),
            identifiers,
        )?;
        let mut mac = hmac(&keys.auth_key)?;
        mac.update(&nonce);
        mac.update(&encrypted_creds);
        mac.update(&cleartext_credentials);
        let auth_tag = mac.finalize().into_bytes();

        Ok((
            Self {
                nonce,
                encrypted_creds,
                auth_tag,
            },
            keys.export_key,
        ))
    }

    /// Decrypts the client's static secret key and verifies the tag. Any
    /// failure along the way presents as a single credential error so that a
    /// wrong password and a tampered envelope are indistinguishable.
    pub(crate) fn open(
        &self,
        randomized_pwd: &[u8],
        server_s_pk: &PublicKey,
        identifiers: Identifiers<'_>,
    ) -> Result<OpenedEnvelope, ProtocolError> {
        let keys = derive_keys(randomized_pwd, &self.nonce)?;
        let mut sk_bytes = [0u8; SCALAR_LEN];
        for (slot, (lhs, rhs)) in sk_bytes
            .iter_mut()
            .zip(self.encrypted_creds.iter().zip(keys.pad.iter()))
        {
            *slot = lhs ^ rhs;
        }
        let client_static_keypair = KeyPair::from_private_key_slice(&sk_bytes)
            .map_err(|_| ProtocolError::InvalidLoginError)?;

        let cleartext_credentials = build_cleartext_credentials(
            server_s_pk,
            client_static_keypair.public(),
            identifiers,
        )?;
        let mut mac = hmac(&keys.auth_key)?;
        mac.update(&self.nonce);
        mac.update(&self.encrypted_creds);
        mac.update(&cleartext_credentials);
        let expected_tag = mac.finalize().into_bytes();

        if !bool::from(expected_tag.ct_eq(&self.auth_tag)) {
            return Err(ProtocolError::InvalidLoginError);
        }

        Ok(OpenedEnvelope {
            client_static_keypair,
            export_key: keys.export_key,
        })
    }

    /// Serialization into bytes
    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(ENVELOPE_LEN);
        output.extend_from_slice(&self.nonce);
        output.extend_from_slice(&self.encrypted_creds);
        output.extend_from_slice(&self.auth_tag);
        output
    }

    /// Deserialization from bytes
    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, ENVELOPE_LEN, "envelope")?;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&checked_bytes[..NONCE_LEN]);
        let mut encrypted_creds = [0u8; SCALAR_LEN];
        encrypted_creds.copy_from_slice(&checked_bytes[NONCE_LEN..NONCE_LEN + SCALAR_LEN]);
        let mut auth_tag = HashOutput::default();
        auth_tag.copy_from_slice(&checked_bytes[NONCE_LEN + SCALAR_LEN..]);
        Ok(Self {
            nonce,
            encrypted_creds,
            auth_tag,
        })
    }
}

// Keeps ENVELOPE_LEN honest if any component width changes.
const _: () = assert!(ENVELOPE_LEN == 128);
const _: () = assert!(ELEMENT_LEN == SCALAR_LEN);
