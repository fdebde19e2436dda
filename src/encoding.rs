// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Base64 helpers for moving protocol messages through text transports

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::errors::ProtocolError;

const INDIFFERENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, INDIFFERENT);
const STANDARD_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, INDIFFERENT);

/// Encodes bytes as unpadded base64url.
pub fn encode_b64(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Decodes base64 text produced by this crate or by foreign implementations:
/// surrounding whitespace is ignored, padding is accepted but not required,
/// and the standard alphabet is accepted as a fallback to base64url.
pub fn decode_b64(input: &str) -> Result<Vec<u8>, ProtocolError> {
    let trimmed = input.trim();
    URL_SAFE_INDIFFERENT
        .decode(trimmed)
        .or_else(|_| STANDARD_INDIFFERENT.decode(trimmed))
        .map_err(|_| ProtocolError::SerializationError)
}
