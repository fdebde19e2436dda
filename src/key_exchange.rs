// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The 3DH authenticated key exchange run alongside credential retrieval
//!
//! Three Diffie-Hellman results over the ephemeral and static keys of both
//! parties are mixed with a hash of the full protocol transcript, yielding a
//! session key plus a MAC key for each direction. The server proves knowledge
//! of its static key in the second message, the client in the third.

use digest::Digest;
use hmac::Mac;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::ProtocolError;
use crate::group::ELEMENT_LEN;
use crate::hash::{hmac, Hash, HashHkdf, HashOutput, HASH_LEN};
use crate::keypair::{KeyPair, PrivateKey, PublicKey};
use crate::serialization::{check_slice_size, serialize};

/// The length of the nonces contributed by each side of the key exchange.
pub(crate) const NONCE_LEN: usize = 32;

/// The serialized length of the key exchange portion of the second protocol
/// message: server nonce, server ephemeral public key and server MAC.
pub(crate) const KE2_MESSAGE_LEN: usize = NONCE_LEN + ELEMENT_LEN + HASH_LEN;

static STR_PREAMBLE: &[u8] = b"OPAQUEv1-";
static STR_LABEL_PREFIX: &[u8] = b"OPAQUE-";
static STR_HANDSHAKE_SECRET: &[u8] = b"HandshakeSecret";
static STR_SESSION_KEY: &[u8] = b"SessionKey";
static STR_SERVER_MAC: &[u8] = b"ServerMAC";
static STR_CLIENT_MAC: &[u8] = b"ClientMAC";

/// The client's key exchange state between the first and third message.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Ke1State {
    client_e: KeyPair,
    client_nonce: [u8; NONCE_LEN],
}

/// The key exchange fields of the first protocol message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Ke1Message {
    pub(crate) client_nonce: [u8; NONCE_LEN],
    pub(crate) client_e_pk: PublicKey,
}

/// The server's key exchange state between the second and third message.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Ke2State {
    client_mac_key: [u8; HASH_LEN],
    hashed_transcript: [u8; HASH_LEN],
    session_key: [u8; HASH_LEN],
}

/// The key exchange fields of the second protocol message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Ke2Message {
    pub(crate) server_nonce: [u8; NONCE_LEN],
    pub(crate) server_e_pk: PublicKey,
    pub(crate) mac: HashOutput,
}

/// The third protocol message: the client's MAC over the transcript.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Ke3Message {
    pub(crate) mac: HashOutput,
}

/// The client-side output of a completed key exchange.
#[derive(Debug)]
pub(crate) struct Ke3Result {
    pub(crate) ke3_message: Ke3Message,
    pub(crate) session_key: HashOutput,
}

impl Ke1State {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(ELEMENT_LEN + NONCE_LEN);
        output.extend_from_slice(&self.client_e.private().serialize());
        output.extend_from_slice(&self.client_nonce);
        output
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, ELEMENT_LEN + NONCE_LEN, "ke1_state")?;
        let client_e = KeyPair::from_private_key_slice(&checked_bytes[..ELEMENT_LEN])?;
        let mut client_nonce = [0u8; NONCE_LEN];
        client_nonce.copy_from_slice(&checked_bytes[ELEMENT_LEN..]);
        Ok(Self {
            client_e,
            client_nonce,
        })
    }
}

impl Ke2State {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(3 * HASH_LEN);
        output.extend_from_slice(&self.client_mac_key);
        output.extend_from_slice(&self.hashed_transcript);
        output.extend_from_slice(&self.session_key);
        output
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, 3 * HASH_LEN, "ke2_state")?;
        let mut client_mac_key = [0u8; HASH_LEN];
        let mut hashed_transcript = [0u8; HASH_LEN];
        let mut session_key = [0u8; HASH_LEN];
        client_mac_key.copy_from_slice(&checked_bytes[..HASH_LEN]);
        hashed_transcript.copy_from_slice(&checked_bytes[HASH_LEN..2 * HASH_LEN]);
        session_key.copy_from_slice(&checked_bytes[2 * HASH_LEN..]);
        Ok(Self {
            client_mac_key,
            hashed_transcript,
            session_key,
        })
    }

    pub(crate) fn session_key(&self) -> HashOutput {
        HashOutput::clone_from_slice(&self.session_key)
    }
}

impl Ke2Message {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut output = self.serialize_without_mac();
        output.extend_from_slice(&self.mac);
        output
    }

    fn serialize_without_mac(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(KE2_MESSAGE_LEN);
        output.extend_from_slice(&self.server_nonce);
        output.extend_from_slice(&self.server_e_pk.serialize());
        output
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, KE2_MESSAGE_LEN, "ke2_message")?;
        let mut server_nonce = [0u8; NONCE_LEN];
        server_nonce.copy_from_slice(&checked_bytes[..NONCE_LEN]);
        let server_e_pk =
            PublicKey::deserialize(&checked_bytes[NONCE_LEN..NONCE_LEN + ELEMENT_LEN])?;
        let mut mac = HashOutput::default();
        mac.copy_from_slice(&checked_bytes[NONCE_LEN + ELEMENT_LEN..]);
        Ok(Self {
            server_nonce,
            server_e_pk,
            mac,
        })
    }
}

impl Ke3Message {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        self.mac.to_vec()
    }

    pub(crate) fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, HASH_LEN, "ke3_message")?;
        let mut mac = HashOutput::default();
        mac.copy_from_slice(checked_bytes);
        Ok(Self { mac })
    }
}

/// Starts the key exchange with a fresh ephemeral keypair and nonce.
pub(crate) fn generate_ke1<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<(Ke1State, Ke1Message), ProtocolError> {
    let client_e = KeyPair::generate_random(rng);
    let mut client_nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut client_nonce);

    let ke1_message = Ke1Message {
        client_nonce,
        client_e_pk: client_e.public().clone(),
    };
    Ok((
        Ke1State {
            client_e,
            client_nonce,
        },
        ke1_message,
    ))
}

/// The transcript hash binds the context, both identities and every byte
/// exchanged so far, up to and including the server nonce and ephemeral key.
#[allow(clippy::too_many_arguments)]
fn transcript_hasher(
    context: &[u8],
    client_identity: &[u8],
    server_identity: &[u8],
    credential_request: &[u8],
    credential_response_prefix: &[u8],
    server_nonce: &[u8],
    server_e_pk: &PublicKey,
) -> Result<Hash, ProtocolError> {
    Ok(Hash::new()
        .chain_update(STR_PREAMBLE)
        .chain_update(serialize(context, 2)?)
        .chain_update(serialize(client_identity, 2)?)
        .chain_update(credential_request)
        .chain_update(serialize(server_identity, 2)?)
        .chain_update(credential_response_prefix)
        .chain_update(server_nonce)
        .chain_update(server_e_pk.serialize()))
}

/// HKDF-Expand-Label in the TLS 1.3 style, with an "OPAQUE-" label prefix.
fn hkdf_expand_label(
    hkdf: &HashHkdf,
    label: &[u8],
    context: &[u8],
    okm: &mut [u8],
) -> Result<(), ProtocolError> {
    let length = u16::try_from(okm.len()).map_err(|_| ProtocolError::SerializationError)?;
    let label_len =
        u8::try_from(STR_LABEL_PREFIX.len() + label.len()).map_err(|_| ProtocolError::SerializationError)?;
    let context_len = u8::try_from(context.len()).map_err(|_| ProtocolError::SerializationError)?;
    hkdf.expand_multi_info(
        &[
            &length.to_be_bytes(),
            &[label_len],
            STR_LABEL_PREFIX,
            label,
            &[context_len],
            context,
        ],
        okm,
    )
    .map_err(|_| ProtocolError::SerializationError)
}

struct DerivedKeys {
    session_key: [u8; HASH_LEN],
    server_mac_key: [u8; HASH_LEN],
    client_mac_key: [u8; HASH_LEN],
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.session_key.zeroize();
        self.server_mac_key.zeroize();
        self.client_mac_key.zeroize();
    }
}

fn derive_3dh_keys(
    dh1: [u8; ELEMENT_LEN],
    dh2: [u8; ELEMENT_LEN],
    dh3: [u8; ELEMENT_LEN],
    hashed_transcript: &[u8],
) -> Result<DerivedKeys, ProtocolError> {
    let mut ikm = [0u8; 3 * ELEMENT_LEN];
    ikm[..ELEMENT_LEN].copy_from_slice(&dh1);
    ikm[ELEMENT_LEN..2 * ELEMENT_LEN].copy_from_slice(&dh2);
    ikm[2 * ELEMENT_LEN..].copy_from_slice(&dh3);

    let (_, hkdf) = HashHkdf::extract(None, &ikm);
    ikm.zeroize();

    let mut handshake_secret = [0u8; HASH_LEN];
    let mut session_key = [0u8; HASH_LEN];
    hkdf_expand_label(
        &hkdf,
        STR_HANDSHAKE_SECRET,
        hashed_transcript,
        &mut handshake_secret,
    )?;
    hkdf_expand_label(&hkdf, STR_SESSION_KEY, hashed_transcript, &mut session_key)?;

    let handshake_hkdf =
        HashHkdf::from_prk(&handshake_secret).map_err(|_| ProtocolError::SerializationError)?;
    let mut server_mac_key = [0u8; HASH_LEN];
    let mut client_mac_key = [0u8; HASH_LEN];
    hkdf_expand_label(&handshake_hkdf, STR_SERVER_MAC, b"", &mut server_mac_key)?;
    hkdf_expand_label(&handshake_hkdf, STR_CLIENT_MAC, b"", &mut client_mac_key)?;
    handshake_secret.zeroize();

    Ok(DerivedKeys {
        session_key,
        server_mac_key,
        client_mac_key,
    })
}

/// The server's half of the key exchange: generates its ephemeral keypair and
/// nonce, performs the three Diffie-Hellman computations and MACs the
/// transcript.
#[allow(clippy::too_many_arguments)]
pub(crate) fn generate_ke2<R: RngCore + CryptoRng>(
    rng: &mut R,
    credential_request: &[u8],
    credential_response_prefix: &[u8],
    client_e_pk: &PublicKey,
    client_s_pk: &PublicKey,
    server_s_sk: &PrivateKey,
    client_identity: &[u8],
    server_identity: &[u8],
    context: &[u8],
) -> Result<(Ke2State, Ke2Message), ProtocolError> {
    let server_e = KeyPair::generate_random(rng);
    let mut server_nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut server_nonce);

    let hasher = transcript_hasher(
        context,
        client_identity,
        server_identity,
        credential_request,
        credential_response_prefix,
        &server_nonce,
        server_e.public(),
    )?;
    let hashed_transcript = hasher.clone().finalize();

    let keys = derive_3dh_keys(
        server_e.private().diffie_hellman(client_e_pk),
        server_s_sk.diffie_hellman(client_e_pk),
        server_e.private().diffie_hellman(client_s_pk),
        &hashed_transcript,
    )?;

    let mut server_mac = hmac(&keys.server_mac_key)?;
    server_mac.update(&hashed_transcript);
    let mac = server_mac.finalize().into_bytes();

    let mut full_transcript = [0u8; HASH_LEN];
    full_transcript.copy_from_slice(&hasher.chain_update(mac).finalize());

    Ok((
        Ke2State {
            client_mac_key: keys.client_mac_key,
            hashed_transcript: full_transcript,
            session_key: keys.session_key,
        },
        Ke2Message {
            server_nonce,
            server_e_pk: server_e.public().clone(),
            mac,
        },
    ))
}

/// The client's half of the key exchange: recomputes the transcript and the
/// three Diffie-Hellman values, checks the server's MAC and produces its own.
#[allow(clippy::too_many_arguments)]
pub(crate) fn generate_ke3(
    ke1_state: &Ke1State,
    ke2_message: &Ke2Message,
    credential_request: &[u8],
    credential_response_prefix: &[u8],
    server_s_pk: &PublicKey,
    client_static_keypair: &KeyPair,
    client_identity: &[u8],
    server_identity: &[u8],
    context: &[u8],
) -> Result<Ke3Result, ProtocolError> {
    let hasher = transcript_hasher(
        context,
        client_identity,
        server_identity,
        credential_request,
        credential_response_prefix,
        &ke2_message.server_nonce,
        &ke2_message.server_e_pk,
    )?;
    let hashed_transcript = hasher.clone().finalize();

    let keys = derive_3dh_keys(
        ke1_state.client_e.private().diffie_hellman(&ke2_message.server_e_pk),
        ke1_state.client_e.private().diffie_hellman(server_s_pk),
        client_static_keypair
            .private()
            .diffie_hellman(&ke2_message.server_e_pk),
        &hashed_transcript,
    )?;

    let mut server_mac = hmac(&keys.server_mac_key)?;
    server_mac.update(&hashed_transcript);
    if !bool::from(
        server_mac
            .finalize()
            .into_bytes()
            .ct_eq(&ke2_message.mac),
    ) {
        return Err(ProtocolError::InvalidLoginError);
    }

    let full_transcript = hasher.chain_update(ke2_message.mac).finalize();
    let mut client_mac = hmac(&keys.client_mac_key)?;
    client_mac.update(&full_transcript);

    Ok(Ke3Result {
        ke3_message: Ke3Message {
            mac: client_mac.finalize().into_bytes(),
        },
        session_key: HashOutput::clone_from_slice(&keys.session_key),
    })
}

/// The server's verification of the client's MAC, completing mutual
/// authentication.
pub(crate) fn finish_ke(
    ke2_state: &Ke2State,
    ke3_message: &Ke3Message,
) -> Result<HashOutput, ProtocolError> {
    let mut client_mac = hmac(&ke2_state.client_mac_key)?;
    client_mac.update(&ke2_state.hashed_transcript);
    if !bool::from(
        client_mac
            .finalize()
            .into_bytes()
            .ct_eq(&ke3_message.mac),
    ) {
        return Err(ProtocolError::InvalidLoginError);
    }
    Ok(ke2_state.session_key())
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn key_exchange_completes_with_matching_keys() {
        let mut rng = OsRng;
        let client_s = KeyPair::generate_random(&mut rng);
        let server_s = KeyPair::generate_random(&mut rng);
        let request = b"credential request bytes";
        let response = b"credential response bytes";
        let context = b"application context";

        let (ke1_state, ke1_message) = generate_ke1(&mut rng).unwrap();
        let (ke2_state, ke2_message) = generate_ke2(
            &mut rng,
            request,
            response,
            &ke1_message.client_e_pk,
            client_s.public(),
            server_s.private(),
            b"alice",
            b"server",
            context,
        )
        .unwrap();

        let result = generate_ke3(
            &ke1_state,
            &ke2_message,
            request,
            response,
            server_s.public(),
            &client_s,
            b"alice",
            b"server",
            context,
        )
        .unwrap();

        let server_session_key = finish_ke(&ke2_state, &result.ke3_message).unwrap();
        assert_eq!(result.session_key, server_session_key);
    }

    #[test]
    fn transcript_mismatch_is_rejected() {
        let mut rng = OsRng;
        let client_s = KeyPair::generate_random(&mut rng);
        let server_s = KeyPair::generate_random(&mut rng);

        let (ke1_state, ke1_message) = generate_ke1(&mut rng).unwrap();
        let (_, ke2_message) = generate_ke2(
            &mut rng,
            b"request",
            b"response",
            &ke1_message.client_e_pk,
            client_s.public(),
            server_s.private(),
            b"alice",
            b"server",
            b"context",
        )
        .unwrap();

        // Client saw a different context.
        assert_eq!(
            generate_ke3(
                &ke1_state,
                &ke2_message,
                b"request",
                b"response",
                server_s.public(),
                &client_s,
                b"alice",
                b"server",
                b"other context",
            )
            .unwrap_err(),
            ProtocolError::InvalidLoginError
        );
    }

    #[test]
    fn wrong_client_mac_is_rejected() {
        let mut rng = OsRng;
        let client_s = KeyPair::generate_random(&mut rng);
        let server_s = KeyPair::generate_random(&mut rng);

        let (ke1_state, ke1_message) = generate_ke1(&mut rng).unwrap();
        let (ke2_state, ke2_message) = generate_ke2(
            &mut rng,
            b"request",
            b"response",
            &ke1_message.client_e_pk,
            client_s.public(),
            server_s.private(),
            b"alice",
            b"server",
            b"context",
        )
        .unwrap();

        let mut result = generate_ke3(
            &ke1_state,
            &ke2_message,
            b"request",
            b"response",
            server_s.public(),
            &client_s,
            b"alice",
            b"server",
            b"context",
        )
        .unwrap();

        result.ke3_message.mac[0] ^= 0x01;
        assert_eq!(
            finish_ke(&ke2_state, &result.ke3_message).unwrap_err(),
            ProtocolError::InvalidLoginError
        );
    }

    #[test]
    fn states_roundtrip_through_bytes() {
        let mut rng = OsRng;
        let client_s = KeyPair::generate_random(&mut rng);
        let server_s = KeyPair::generate_random(&mut rng);

        let (ke1_state, ke1_message) = generate_ke1(&mut rng).unwrap();
        let restored_ke1 = Ke1State::deserialize(&ke1_state.serialize()).unwrap();
        assert_eq!(restored_ke1.client_nonce, ke1_state.client_nonce);
        assert_eq!(restored_ke1.client_e, ke1_state.client_e);

        let (ke2_state, ke2_message) = generate_ke2(
            &mut rng,
            b"request",
            b"response",
            &ke1_message.client_e_pk,
            client_s.public(),
            server_s.private(),
            b"alice",
            b"server",
            b"context",
        )
        .unwrap();
        let restored_ke2 = Ke2State::deserialize(&ke2_state.serialize()).unwrap();
        assert_eq!(restored_ke2.serialize(), ke2_state.serialize());

        let restored_message = Ke2Message::deserialize(&ke2_message.serialize()).unwrap();
        assert_eq!(restored_message, ke2_message);
    }
}
