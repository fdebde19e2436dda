// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Key stretching applied to the OPRF output before key derivation

use argon2::{Algorithm, Argon2, Version};

use crate::errors::ProtocolError;
use crate::hash::{HashOutput, HASH_LEN};

const ARGON2_RECOMMENDED_SALT_LEN: usize = 16;

/// The memory-hardness policy applied during client-side password hardening.
///
/// The choice is never sent on the wire. The client must use the same policy
/// at registration and at login: a mismatch changes the derived envelope keys
/// and surfaces as a failed login.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum KeyStretch {
    /// The Argon2id defaults (19 MiB of memory, 2 iterations).
    #[default]
    Default,
    /// The RFC 9106 memory-constrained profile: 64 MiB of memory, 3
    /// iterations and 4 lanes.
    MemoryConstrained,
    /// Caller-supplied Argon2id parameters.
    Custom(argon2::Params),
}

impl KeyStretch {
    fn params(&self) -> Result<argon2::Params, ProtocolError> {
        match self {
            Self::Default => Ok(argon2::Params::default()),
            Self::MemoryConstrained => argon2::Params::new(65536, 3, 4, None)
                .map_err(|_| ProtocolError::SerializationError),
            Self::Custom(params) => Ok(params.clone()),
        }
    }

    /// Hardens `input` into a hash-sized output under this policy.
    pub(crate) fn stretch(&self, input: &[u8]) -> Result<HashOutput, ProtocolError> {
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params()?);
        let mut output = [0u8; HASH_LEN];
        argon
            .hash_password_into(input, &[0u8; ARGON2_RECOMMENDED_SALT_LEN], &mut output)
            .map_err(|_| ProtocolError::SerializationError)?;
        Ok(HashOutput::clone_from_slice(&output))
    }
}
