// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The registration and login state machines for both parties
//!
//! Client and server states are one-shot: any finish call consumes the state,
//! and a second call reports [`ProtocolError::InvalidStateError`] instead of
//! re-running the protocol with stale secrets.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::envelope::{Envelope, ENVELOPE_LEN};
use crate::errors::ProtocolError;
use crate::group::{self, ELEMENT_LEN, SCALAR_LEN};
use crate::hash::{HashHkdf, HashOutput, HASH_LEN};
use crate::key_exchange::{self, Ke1State, Ke2State, NONCE_LEN};
use crate::keypair::{KeyPair, PrivateKey, PublicKey};
use crate::ksf::KeyStretch;
use crate::messages::{
    CredentialFinalization, CredentialRequest, CredentialResponse, RegistrationRequest,
    RegistrationResponse, RegistrationUpload, MASKED_RESPONSE_LEN,
};
use crate::oprf;
use crate::serialization::check_slice_size;

static STR_MASKING_KEY: &[u8] = b"MaskingKey";
static STR_CREDENTIAL_RESPONSE_PAD: &[u8] = b"CredentialResponsePad";
static STR_FAKE_RECORD: &[u8] = b"FakeRecord";

/// Optional application-level identities bound into the envelope and the key
/// exchange transcript. An absent identity defaults to the matching static
/// public key.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Identifiers<'a> {
    /// The client identity, e.g. a username or account id
    pub client: Option<&'a [u8]>,
    /// The server identity, e.g. a domain name
    pub server: Option<&'a [u8]>,
}

/// Resolves the identity defaults into concrete byte strings for the
/// transcript. Must agree byte-for-byte between both parties.
fn bytestrings_from_identifiers(
    identifiers: Identifiers<'_>,
    client_s_pk: &[u8],
    server_s_pk: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let client_identity = identifiers.client.unwrap_or(client_s_pk).to_vec();
    let server_identity = identifiers.server.unwrap_or(server_s_pk).to_vec();
    (client_identity, server_identity)
}

/// Compares a pinned server public key against the one recovered during
/// login, in constant time. Lengths are public, so a length mismatch returns
/// early.
pub fn verify_server_public_key(expected: &[u8], actual: &[u8]) -> Result<(), ProtocolError> {
    if expected.len() == actual.len() && bool::from(expected.ct_eq(actual)) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidLoginError)
    }
}

// ===========================================================================
// Randomized password and masking key derivation
// ===========================================================================

/// Mixes the OPRF output with its stretched form into the randomized
/// password, the root secret for all envelope and masking keys.
fn derive_randomized_password(
    oprf_output: &HashOutput,
    key_stretch: &KeyStretch,
) -> Result<HashOutput, ProtocolError> {
    let stretched = key_stretch.stretch(oprf_output)?;
    let mut ikm = Vec::with_capacity(2 * HASH_LEN);
    ikm.extend_from_slice(oprf_output);
    ikm.extend_from_slice(&stretched);
    let (prk, _) = HashHkdf::extract(None, &ikm);
    Ok(prk)
}

fn derive_masking_key(randomized_pwd: &[u8]) -> Result<HashOutput, ProtocolError> {
    let hkdf = HashHkdf::from_prk(randomized_pwd).map_err(|_| ProtocolError::SerializationError)?;
    let mut masking_key = HashOutput::default();
    hkdf.expand(STR_MASKING_KEY, &mut masking_key)
        .map_err(|_| ProtocolError::SerializationError)?;
    Ok(masking_key)
}

fn masking_pad(
    masking_key: &[u8],
    masking_nonce: &[u8],
) -> Result<[u8; MASKED_RESPONSE_LEN], ProtocolError> {
    let hkdf = HashHkdf::from_prk(masking_key).map_err(|_| ProtocolError::SerializationError)?;
    let mut pad = [0u8; MASKED_RESPONSE_LEN];
    hkdf.expand_multi_info(&[masking_nonce, STR_CREDENTIAL_RESPONSE_PAD], &mut pad)
        .map_err(|_| ProtocolError::SerializationError)?;
    Ok(pad)
}

// ===========================================================================
// Server setup
// ===========================================================================

/// The server's long-lived secrets: the OPRF key seed and its static
/// keypair. Created once and reused across all registrations and logins.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerSetup {
    oprf_seed: [u8; HASH_LEN],
    keypair: KeyPair,
}

impl ServerSetup {
    /// The serialized length of a server setup.
    pub const LEN: usize = HASH_LEN + SCALAR_LEN + ELEMENT_LEN;

    /// Generates a fresh server setup.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut oprf_seed = [0u8; HASH_LEN];
        rng.fill_bytes(&mut oprf_seed);
        Self {
            oprf_seed,
            keypair: KeyPair::generate_random(rng),
        }
    }

    /// Generates a fresh OPRF seed around an existing static keypair.
    pub fn new_with_key<R: RngCore + CryptoRng>(rng: &mut R, keypair: KeyPair) -> Self {
        let mut oprf_seed = [0u8; HASH_LEN];
        rng.fill_bytes(&mut oprf_seed);
        Self { oprf_seed, keypair }
    }

    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(Self::LEN);
        output.extend_from_slice(&self.oprf_seed);
        output.extend_from_slice(&self.keypair.private().serialize());
        output.extend_from_slice(&self.keypair.public().serialize());
        output
    }

    /// Deserialization from bytes, verifying that the stored public key
    /// matches the stored secret key.
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, Self::LEN, "server_setup")?;
        let mut oprf_seed = [0u8; HASH_LEN];
        oprf_seed.copy_from_slice(&checked_bytes[..HASH_LEN]);
        let private = PrivateKey::deserialize(&checked_bytes[HASH_LEN..HASH_LEN + SCALAR_LEN])?;
        let public = PublicKey::deserialize(&checked_bytes[HASH_LEN + SCALAR_LEN..])?;
        Ok(Self {
            oprf_seed,
            keypair: KeyPair::from_keys(private, public)?,
        })
    }

    /// The server's static keypair
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

// ===========================================================================
// Registration
// ===========================================================================

#[derive(Zeroize, ZeroizeOnDrop)]
struct ClientRegistrationState {
    blind: Scalar,
    #[zeroize(skip)]
    blinded_element: RistrettoPoint,
}

/// The client's side of the registration flow. One-shot: consumed by
/// [`ClientRegistration::finish`].
pub struct ClientRegistration {
    state: Option<ClientRegistrationState>,
}

/// Optional inputs to [`ClientRegistration::finish`].
#[derive(Default)]
pub struct ClientRegistrationFinishParameters<'a> {
    /// Identity bindings, defaulting to the static public keys
    pub identifiers: Identifiers<'a>,
    /// The key stretching policy; must match the one used at login
    pub key_stretch: KeyStretch,
    /// A fixed client static keypair instead of a freshly sampled one
    pub client_static_keypair: Option<KeyPair>,
}

/// The outputs of [`ClientRegistration::finish`].
#[derive(Debug)]
pub struct ClientRegistrationFinishResult {
    /// The registration upload to send to the server
    pub message: RegistrationUpload,
    /// A key only the client can compute, available again after every
    /// successful login
    pub export_key: Vec<u8>,
}

impl ClientRegistration {
    /// The serialized length of the client registration state.
    pub const LEN: usize = SCALAR_LEN + ELEMENT_LEN;

    /// Blinds the password and produces the first registration message.
    pub fn start<R: RngCore + CryptoRng>(
        rng: &mut R,
        password: &[u8],
    ) -> Result<(Self, RegistrationRequest), ProtocolError> {
        let (blind, blinded_element) = oprf::blind(rng, password)?;
        Ok((
            Self {
                state: Some(ClientRegistrationState {
                    blind,
                    blinded_element,
                }),
            },
            RegistrationRequest { blinded_element },
        ))
    }

    /// Unblinds the server's evaluation, derives the randomized password and
    /// seals the envelope. Consumes the state.
    pub fn finish<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        password: &[u8],
        response: &RegistrationResponse,
        params: ClientRegistrationFinishParameters<'_>,
    ) -> Result<ClientRegistrationFinishResult, ProtocolError> {
        let state = self.state.take().ok_or(ProtocolError::InvalidStateError)?;

        let oprf_output = oprf::finalize(password, &state.blind, &response.evaluated_element)?;
        let randomized_pwd = derive_randomized_password(&oprf_output, &params.key_stretch)?;
        let masking_key = derive_masking_key(&randomized_pwd)?;

        let client_static_keypair = match params.client_static_keypair {
            Some(keypair) => keypair,
            None => KeyPair::generate_random(rng),
        };

        let (envelope, export_key) = Envelope::seal(
            rng,
            &randomized_pwd,
            &client_static_keypair,
            &response.server_s_pk,
            params.identifiers,
        )?;

        Ok(ClientRegistrationFinishResult {
            message: RegistrationUpload {
                client_s_pk: client_static_keypair.public().clone(),
                server_s_pk: response.server_s_pk.clone(),
                masking_key,
                envelope,
            },
            export_key: export_key.to_vec(),
        })
    }

    /// Serialization into bytes. Fails once the state has been consumed.
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let state = self.state.as_ref().ok_or(ProtocolError::InvalidStateError)?;
        let mut output = Vec::with_capacity(Self::LEN);
        output.extend_from_slice(state.blind.as_bytes());
        output.extend_from_slice(&group::element_to_bytes(&state.blinded_element));
        Ok(output)
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, Self::LEN, "client_registration")?;
        Ok(Self {
            state: Some(ClientRegistrationState {
                blind: group::scalar_from_slice(&checked_bytes[..SCALAR_LEN])?,
                blinded_element: group::element_from_slice(&checked_bytes[SCALAR_LEN..])?,
            }),
        })
    }
}

/// The password file record the server persists per credential. A thin
/// wrapper around the client's final registration message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRegistration(pub(crate) RegistrationUpload);

impl ServerRegistration {
    /// The serialized length of a password file record.
    pub const LEN: usize = RegistrationUpload::LEN;

    /// Evaluates the blinded element under the per-credential OPRF key. The
    /// server keeps no state between this and [`ServerRegistration::finish`].
    pub fn start(
        server_setup: &ServerSetup,
        request: &RegistrationRequest,
        credential_identifier: &[u8],
    ) -> Result<RegistrationResponse, ProtocolError> {
        let oprf_key = oprf::key_from_seed(&server_setup.oprf_seed, credential_identifier)?;
        Ok(RegistrationResponse {
            evaluated_element: oprf::evaluate(&oprf_key, &request.blinded_element),
            server_s_pk: server_setup.keypair.public().clone(),
        })
    }

    /// Accepts the client's upload as the password file record.
    pub fn finish(upload: RegistrationUpload) -> Self {
        Self(upload)
    }

    /// A deterministic record for an unregistered credential identifier,
    /// derived from the OPRF seed. Login against it runs the full protocol
    /// and fails exactly like a wrong password, and repeated lookups of the
    /// same identifier cannot be distinguished by comparing responses across
    /// server restarts.
    pub fn fake(
        server_setup: &ServerSetup,
        credential_identifier: &[u8],
    ) -> Result<Self, ProtocolError> {
        let hkdf = HashHkdf::from_prk(&server_setup.oprf_seed)
            .map_err(|_| ProtocolError::SerializationError)?;
        let mut okm = [0u8; 2 * HASH_LEN + ENVELOPE_LEN];
        hkdf.expand_multi_info(&[credential_identifier, STR_FAKE_RECORD], &mut okm)
            .map_err(|_| ProtocolError::SerializationError)?;

        let mut wide = [0u8; 64];
        wide.copy_from_slice(&okm[..HASH_LEN]);
        let client_static_keypair =
            KeyPair::from_private_key(PrivateKey(Scalar::from_bytes_mod_order_wide(&wide)));
        let mut masking_key = HashOutput::default();
        masking_key.copy_from_slice(&okm[HASH_LEN..2 * HASH_LEN]);
        let envelope = Envelope::deserialize(&okm[2 * HASH_LEN..])?;

        Ok(Self(RegistrationUpload {
            client_s_pk: client_static_keypair.public().clone(),
            server_s_pk: server_setup.keypair.public().clone(),
            masking_key,
            envelope,
        }))
    }

    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        self.0.serialize()
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self(RegistrationUpload::deserialize(input)?))
    }
}

// ===========================================================================
// Login
// ===========================================================================

#[derive(Zeroize, ZeroizeOnDrop)]
struct ClientLoginState {
    blind: Scalar,
    ke1_state: Ke1State,
    #[zeroize(skip)]
    credential_request: CredentialRequest,
}

/// The client's side of the login flow. One-shot: consumed by
/// [`ClientLogin::finish`], including on failed logins.
pub struct ClientLogin {
    state: Option<ClientLoginState>,
}

/// Optional inputs to [`ClientLogin::finish`].
#[derive(Default)]
pub struct ClientLoginFinishParameters<'a> {
    /// Application context bound into the transcript; must match the server
    pub context: Option<&'a [u8]>,
    /// Identity bindings, defaulting to the static public keys
    pub identifiers: Identifiers<'a>,
    /// The key stretching policy; must match the one used at registration
    pub key_stretch: KeyStretch,
    /// A pinned server public key to verify against the recovered one
    pub expected_server_s_pk: Option<PublicKey>,
}

/// The outputs of a successful [`ClientLogin::finish`].
#[derive(Debug)]
pub struct ClientLoginFinishResult {
    /// The final login message to send to the server
    pub message: CredentialFinalization,
    /// The mutually authenticated session key
    pub session_key: Vec<u8>,
    /// The same export key produced at registration
    pub export_key: Vec<u8>,
    /// The server's static public key recovered from the response
    pub server_s_pk: PublicKey,
}

impl ClientLogin {
    /// The serialized length of the client login state.
    pub const LEN: usize = SCALAR_LEN + ELEMENT_LEN + NONCE_LEN + CredentialRequest::LEN;

    /// Blinds the password and opens the key exchange.
    pub fn start<R: RngCore + CryptoRng>(
        rng: &mut R,
        password: &[u8],
    ) -> Result<(Self, CredentialRequest), ProtocolError> {
        let (blind, blinded_element) = oprf::blind(rng, password)?;
        let (ke1_state, ke1_message) = key_exchange::generate_ke1(rng)?;
        let credential_request = CredentialRequest {
            blinded_element,
            ke1_message,
        };
        Ok((
            Self {
                state: Some(ClientLoginState {
                    blind,
                    ke1_state,
                    credential_request: credential_request.clone(),
                }),
            },
            credential_request,
        ))
    }

    /// Recovers the credentials from the masked response, opens the envelope
    /// and completes the client's side of the key exchange. Consumes the
    /// state; a wrong password, a tampered response or a mismatched context,
    /// identity or stretching policy all fail identically.
    pub fn finish(
        &mut self,
        password: &[u8],
        response: &CredentialResponse,
        params: ClientLoginFinishParameters<'_>,
    ) -> Result<ClientLoginFinishResult, ProtocolError> {
        let state = self.state.take().ok_or(ProtocolError::InvalidStateError)?;

        let oprf_output = oprf::finalize(password, &state.blind, &response.evaluated_element)?;
        let randomized_pwd = derive_randomized_password(&oprf_output, &params.key_stretch)?;
        let masking_key = derive_masking_key(&randomized_pwd)?;

        let pad = masking_pad(&masking_key, &response.masking_nonce)?;
        let mut unmasked = [0u8; MASKED_RESPONSE_LEN];
        for (slot, (lhs, rhs)) in unmasked
            .iter_mut()
            .zip(response.masked_response.iter().zip(pad.iter()))
        {
            *slot = lhs ^ rhs;
        }

        // A wrong password yields uniformly random bytes here, so structural
        // failures below are credential failures, not serialization ones.
        let server_s_pk = PublicKey::deserialize(&unmasked[..ELEMENT_LEN])
            .map_err(|_| ProtocolError::InvalidLoginError)?;
        let envelope = Envelope::deserialize(&unmasked[ELEMENT_LEN..])
            .map_err(|_| ProtocolError::InvalidLoginError)?;

        if let Some(expected) = &params.expected_server_s_pk {
            verify_server_public_key(&expected.serialize(), &server_s_pk.serialize())?;
        }

        let opened = envelope.open(&randomized_pwd, &server_s_pk, params.identifiers)?;
        let (client_identity, server_identity) = bytestrings_from_identifiers(
            params.identifiers,
            &opened.client_static_keypair.public().serialize(),
            &server_s_pk.serialize(),
        );

        let result = key_exchange::generate_ke3(
            &state.ke1_state,
            &response.ke2_message,
            &state.credential_request.serialize(),
            &response.serialize_without_ke2(),
            &server_s_pk,
            &opened.client_static_keypair,
            &client_identity,
            &server_identity,
            params.context.unwrap_or(&[]),
        )?;

        Ok(ClientLoginFinishResult {
            message: CredentialFinalization {
                ke3_message: result.ke3_message,
            },
            session_key: result.session_key.to_vec(),
            export_key: opened.export_key.to_vec(),
            server_s_pk,
        })
    }

    /// Serialization into bytes. Fails once the state has been consumed.
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let state = self.state.as_ref().ok_or(ProtocolError::InvalidStateError)?;
        let mut output = Vec::with_capacity(Self::LEN);
        output.extend_from_slice(state.blind.as_bytes());
        output.extend_from_slice(&state.ke1_state.serialize());
        output.extend_from_slice(&state.credential_request.serialize());
        Ok(output)
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, Self::LEN, "client_login")?;
        let blind = group::scalar_from_slice(&checked_bytes[..SCALAR_LEN])?;
        let ke1_state =
            Ke1State::deserialize(&checked_bytes[SCALAR_LEN..SCALAR_LEN + ELEMENT_LEN + NONCE_LEN])?;
        let credential_request =
            CredentialRequest::deserialize(&checked_bytes[SCALAR_LEN + ELEMENT_LEN + NONCE_LEN..])?;
        Ok(Self {
            state: Some(ClientLoginState {
                blind,
                ke1_state,
                credential_request,
            }),
        })
    }
}

/// Optional inputs to [`ServerLogin::start`].
#[derive(Default)]
pub struct ServerLoginParameters<'a> {
    /// Application context bound into the transcript; must match the client
    pub context: Option<&'a [u8]>,
    /// Identity bindings, defaulting to the static public keys
    pub identifiers: Identifiers<'a>,
}

/// The outputs of a successful [`ServerLogin::finish`].
#[derive(Debug)]
pub struct ServerLoginFinishResult {
    /// The mutually authenticated session key
    pub session_key: Vec<u8>,
}

/// The server's side of the login flow. One-shot: consumed by
/// [`ServerLogin::finish`].
pub struct ServerLogin {
    state: Option<Ke2State>,
}

impl ServerLogin {
    /// The serialized length of the server login state.
    pub const LEN: usize = 3 * HASH_LEN;

    /// Evaluates the OPRF, masks the stored credentials and produces the
    /// server's key exchange share. When no record exists for the credential
    /// identifier, a deterministic fake record keeps the response
    /// indistinguishable from a registered user's.
    pub fn start<R: RngCore + CryptoRng>(
        rng: &mut R,
        server_setup: &ServerSetup,
        record: Option<&ServerRegistration>,
        request: &CredentialRequest,
        credential_identifier: &[u8],
        params: ServerLoginParameters<'_>,
    ) -> Result<(Self, CredentialResponse), ProtocolError> {
        let record = match record {
            Some(registration) => registration.0.clone(),
            None => ServerRegistration::fake(server_setup, credential_identifier)?.0,
        };

        let oprf_key = oprf::key_from_seed(&server_setup.oprf_seed, credential_identifier)?;
        let evaluated_element = oprf::evaluate(&oprf_key, &request.blinded_element);

        let mut masking_nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut masking_nonce);
        let pad = masking_pad(&record.masking_key, &masking_nonce)?;
        let mut masked_response = [0u8; MASKED_RESPONSE_LEN];
        masked_response[..ELEMENT_LEN].copy_from_slice(&record.server_s_pk.serialize());
        masked_response[ELEMENT_LEN..].copy_from_slice(&record.envelope.serialize());
        for (slot, mask) in masked_response.iter_mut().zip(pad.iter()) {
            *slot ^= mask;
        }

        let mut response = CredentialResponse {
            evaluated_element,
            masking_nonce,
            masked_response,
            // Placeholder until the key exchange fills it in below.
            ke2_message: key_exchange::Ke2Message {
                server_nonce: [0u8; NONCE_LEN],
                server_e_pk: server_setup.keypair.public().clone(),
                mac: HashOutput::default(),
            },
        };

        let (client_identity, server_identity) = bytestrings_from_identifiers(
            params.identifiers,
            &record.client_s_pk.serialize(),
            &record.server_s_pk.serialize(),
        );

        let (ke2_state, ke2_message) = key_exchange::generate_ke2(
            rng,
            &request.serialize(),
            &response.serialize_without_ke2(),
            &request.ke1_message.client_e_pk,
            &record.client_s_pk,
            server_setup.keypair.private(),
            &client_identity,
            &server_identity,
            params.context.unwrap_or(&[]),
        )?;
        response.ke2_message = ke2_message;

        Ok((
            Self {
                state: Some(ke2_state),
            },
            response,
        ))
    }

    /// Verifies the client's MAC and returns the session key. Consumes the
    /// state.
    pub fn finish(
        &mut self,
        finalization: &CredentialFinalization,
    ) -> Result<ServerLoginFinishResult, ProtocolError> {
        let state = self.state.take().ok_or(ProtocolError::InvalidStateError)?;
        let session_key = key_exchange::finish_ke(&state, &finalization.ke3_message)?;
        Ok(ServerLoginFinishResult {
            session_key: session_key.to_vec(),
        })
    }

    /// Serialization into bytes. Fails once the state has been consumed.
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let state = self.state.as_ref().ok_or(ProtocolError::InvalidStateError)?;
        Ok(state.serialize())
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, Self::LEN, "server_login")?;
        Ok(Self {
            state: Some(Ke2State::deserialize(checked_bytes)?),
        })
    }
}
