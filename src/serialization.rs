// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! Helpers for the fixed-layout byte encodings used by the protocol

use crate::errors::ProtocolError;

/// Corresponds to the I2OSP() function from RFC 8017: the length of `input`,
/// encoded as a `max_bytes`-wide big-endian integer, followed by `input`
/// itself.
pub(crate) fn serialize(input: &[u8], max_bytes: usize) -> Result<Vec<u8>, ProtocolError> {
    if max_bytes > 8 || (max_bytes < 8 && input.len() >= 1 << (8 * max_bytes)) {
        return Err(ProtocolError::SerializationError);
    }
    let mut output = Vec::with_capacity(max_bytes + input.len());
    output.extend_from_slice(&input.len().to_be_bytes()[8 - max_bytes..]);
    output.extend_from_slice(input);
    Ok(output)
}

/// Checks that `slice` has length exactly `expected_len`, failing with a
/// [`ProtocolError::SizeError`] naming `arg_name` otherwise. Length is always
/// checked before any structural validation is attempted.
pub(crate) fn check_slice_size<'a>(
    slice: &'a [u8],
    expected_len: usize,
    arg_name: &'static str,
) -> Result<&'a [u8], ProtocolError> {
    if slice.len() != expected_len {
        return Err(ProtocolError::SizeError {
            name: arg_name,
            len: expected_len,
            actual_len: slice.len(),
        });
    }
    Ok(slice)
}
