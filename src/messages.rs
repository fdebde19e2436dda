// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! The messages exchanged on the wire during registration and login
//!
//! Every message has a fixed byte layout. Deserialization checks the overall
//! length before validating any group element, so truncation and corruption
//! are reported distinctly.

use curve25519_dalek::ristretto::RistrettoPoint;

use crate::envelope::{Envelope, ENVELOPE_LEN};
use crate::errors::ProtocolError;
use crate::group::{self, ELEMENT_LEN};
use crate::hash::{HashOutput, HASH_LEN};
use crate::key_exchange::{Ke1Message, Ke2Message, Ke3Message, KE2_MESSAGE_LEN, NONCE_LEN};
use crate::keypair::PublicKey;
use crate::serialization::check_slice_size;

/// The serialized length of the masked credential response: the server's
/// static public key and the envelope, XORed with a derived pad.
pub(crate) const MASKED_RESPONSE_LEN: usize = ELEMENT_LEN + ENVELOPE_LEN;

/// The first registration message, sent from client to server: a blinded
/// password element.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegistrationRequest {
    pub(crate) blinded_element: RistrettoPoint,
}

/// The second registration message, sent from server to client: the evaluated
/// element and the server's static public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegistrationResponse {
    pub(crate) evaluated_element: RistrettoPoint,
    pub(crate) server_s_pk: PublicKey,
}

/// The final registration message, sent from client to server and persisted
/// as the password file record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegistrationUpload {
    pub(crate) client_s_pk: PublicKey,
    pub(crate) server_s_pk: PublicKey,
    pub(crate) masking_key: HashOutput,
    pub(crate) envelope: Envelope,
}

/// The first login message, sent from client to server: the blinded password
/// element plus the client's key exchange share.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialRequest {
    pub(crate) blinded_element: RistrettoPoint,
    pub(crate) ke1_message: Ke1Message,
}

/// The second login message, sent from server to client: the evaluated
/// element, the masked credentials and the server's key exchange share.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialResponse {
    pub(crate) evaluated_element: RistrettoPoint,
    pub(crate) masking_nonce: [u8; NONCE_LEN],
    pub(crate) masked_response: [u8; MASKED_RESPONSE_LEN],
    pub(crate) ke2_message: Ke2Message,
}

/// The final login message, sent from client to server: the client's MAC over
/// the transcript.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialFinalization {
    pub(crate) ke3_message: Ke3Message,
}

impl RegistrationRequest {
    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        group::element_to_bytes(&self.blinded_element).to_vec()
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, ELEMENT_LEN, "registration_request")?;
        Ok(Self {
            blinded_element: group::element_from_slice(checked_bytes)?,
        })
    }
}

impl RegistrationResponse {
    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(2 * ELEMENT_LEN);
        output.extend_from_slice(&group::element_to_bytes(&self.evaluated_element));
        output.extend_from_slice(&self.server_s_pk.serialize());
        output
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, 2 * ELEMENT_LEN, "registration_response")?;
        Ok(Self {
            evaluated_element: group::element_from_slice(&checked_bytes[..ELEMENT_LEN])?,
            server_s_pk: PublicKey::deserialize(&checked_bytes[ELEMENT_LEN..])?,
        })
    }
}

impl RegistrationUpload {
    /// The serialized length of a registration upload.
    pub const LEN: usize = 2 * ELEMENT_LEN + HASH_LEN + ENVELOPE_LEN;

    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(Self::LEN);
        output.extend_from_slice(&self.client_s_pk.serialize());
        output.extend_from_slice(&self.server_s_pk.serialize());
        output.extend_from_slice(&self.masking_key);
        output.extend_from_slice(&self.envelope.serialize());
        output
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, Self::LEN, "registration_upload")?;
        let mut masking_key = HashOutput::default();
        masking_key.copy_from_slice(&checked_bytes[2 * ELEMENT_LEN..2 * ELEMENT_LEN + HASH_LEN]);
        Ok(Self {
            client_s_pk: PublicKey::deserialize(&checked_bytes[..ELEMENT_LEN])?,
            server_s_pk: PublicKey::deserialize(&checked_bytes[ELEMENT_LEN..2 * ELEMENT_LEN])?,
            masking_key,
            envelope: Envelope::deserialize(&checked_bytes[2 * ELEMENT_LEN + HASH_LEN..])?,
        })
    }
}

impl CredentialRequest {
    /// The serialized length of a credential request.
    pub const LEN: usize = 2 * ELEMENT_LEN + NONCE_LEN;

    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(Self::LEN);
        output.extend_from_slice(&group::element_to_bytes(&self.blinded_element));
        output.extend_from_slice(&self.ke1_message.client_nonce);
        output.extend_from_slice(&self.ke1_message.client_e_pk.serialize());
        output
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, Self::LEN, "credential_request")?;
        let blinded_element = group::element_from_slice(&checked_bytes[..ELEMENT_LEN])?;
        let mut client_nonce = [0u8; NONCE_LEN];
        client_nonce.copy_from_slice(&checked_bytes[ELEMENT_LEN..ELEMENT_LEN + NONCE_LEN]);
        let client_e_pk = PublicKey::deserialize(&checked_bytes[ELEMENT_LEN + NONCE_LEN..])?;
        Ok(Self {
            blinded_element,
            ke1_message: Ke1Message {
                client_nonce,
                client_e_pk,
            },
        })
    }
}

impl CredentialResponse {
    /// The serialized length of a credential response.
    pub const LEN: usize = ELEMENT_LEN + NONCE_LEN + MASKED_RESPONSE_LEN + KE2_MESSAGE_LEN;

    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut output = self.serialize_without_ke2();
        output.extend_from_slice(&self.ke2_message.serialize());
        output
    }

    /// The prefix covered by the key exchange transcript: everything up to
    /// the server nonce.
    pub(crate) fn serialize_without_ke2(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(Self::LEN);
        output.extend_from_slice(&group::element_to_bytes(&self.evaluated_element));
        output.extend_from_slice(&self.masking_nonce);
        output.extend_from_slice(&self.masked_response);
        output
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, Self::LEN, "credential_response")?;
        let evaluated_element = group::element_from_slice(&checked_bytes[..ELEMENT_LEN])?;
        let mut masking_nonce = [0u8; NONCE_LEN];
        masking_nonce.copy_from_slice(&checked_bytes[ELEMENT_LEN..ELEMENT_LEN + NONCE_LEN]);
        let mut masked_response = [0u8; MASKED_RESPONSE_LEN];
        masked_response.copy_from_slice(
            &checked_bytes
                [ELEMENT_LEN + NONCE_LEN..ELEMENT_LEN + NONCE_LEN + MASKED_RESPONSE_LEN],
        );
        let ke2_message =
            Ke2Message::deserialize(&checked_bytes[ELEMENT_LEN + NONCE_LEN + MASKED_RESPONSE_LEN..])?;
        Ok(Self {
            evaluated_element,
            masking_nonce,
            masked_response,
            ke2_message,
        })
    }
}

impl CredentialFinalization {
    /// Serialization into bytes
    pub fn serialize(&self) -> Vec<u8> {
        self.ke3_message.serialize()
    }

    /// Deserialization from bytes
    pub fn deserialize(input: &[u8]) -> Result<Self, ProtocolError> {
        let checked_bytes = check_slice_size(input, HASH_LEN, "credential_finalization")?;
        Ok(Self {
            ke3_message: Ke3Message::deserialize(checked_bytes)?,
        })
    }
}
