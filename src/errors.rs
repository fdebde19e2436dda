// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! A list of error types which are produced during an execution of the protocol

use std::error::Error;

use displaydoc::Display;

/// Represents an error in protocol handling. Every fallible operation of this
/// crate resolves to one of these four outcomes; adversarial input never
/// panics.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Display)]
pub enum ProtocolError {
    /// Error in validating credentials
    InvalidLoginError,
    /// A one-shot state object was used after it was already consumed
    InvalidStateError,
    /// Error with serializing / deserializing protocol messages
    SerializationError,
    /// Invalid length for `{name}`: expected {len}, actual {actual_len}
    SizeError {
        /// The name of the field which did not match its expected length
        name: &'static str,
        /// The expected length
        len: usize,
        /// The length that was encountered
        actual_len: usize,
    },
}

impl Error for ProtocolError {}
