// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! An implementation of the OPAQUE asymmetric password-authenticated key
//! exchange protocol, instantiated over ristretto255 with SHA-512 and
//! Argon2id.
//!
//! OPAQUE lets a client register and later authenticate with a password
//! without the server ever seeing that password, not even at registration
//! time. A successful login yields a mutually authenticated session key on
//! both sides and re-derives the client's export key, a secret the server
//! cannot compute.
//!
//! # Registration
//!
//! The client blinds its password, the server evaluates the blinded element
//! under a per-credential OPRF key, and the client seals an envelope that
//! becomes part of the server's password file record:
//!
//! ```
//! use opaque_auth::errors::ProtocolError;
//! use opaque_auth::{ClientRegistration, ServerRegistration, ServerSetup};
//!
//! let mut rng = opaque_auth::rand::rngs::OsRng;
//! let server_setup = ServerSetup::new(&mut rng);
//!
//! let (mut client_state, request) = ClientRegistration::start(&mut rng, b"hunter2")?;
//! let response = ServerRegistration::start(&server_setup, &request, b"alice@example.com")?;
//! let finish = client_state.finish(&mut rng, b"hunter2", &response, Default::default())?;
//! let password_file = ServerRegistration::finish(finish.message);
//! # Ok::<(), ProtocolError>(())
//! ```
//!
//! # Login
//!
//! Login runs the OPRF again and completes a 3DH key exchange over the
//! recovered credentials:
//!
//! ```
//! # use opaque_auth::errors::ProtocolError;
//! # use opaque_auth::{ClientRegistration, ServerRegistration, ServerSetup};
//! use opaque_auth::{ClientLogin, ServerLogin};
//!
//! # let mut rng = opaque_auth::rand::rngs::OsRng;
//! # let server_setup = ServerSetup::new(&mut rng);
//! # let (mut client_state, request) = ClientRegistration::start(&mut rng, b"hunter2")?;
//! # let response = ServerRegistration::start(&server_setup, &request, b"alice@example.com")?;
//! # let finish = client_state.finish(&mut rng, b"hunter2", &response, Default::default())?;
//! # let password_file = ServerRegistration::finish(finish.message);
//! let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2")?;
//! let (mut server_login, response) = ServerLogin::start(
//!     &mut rng,
//!     &server_setup,
//!     Some(&password_file),
//!     &request,
//!     b"alice@example.com",
//!     Default::default(),
//! )?;
//! let client_finish = client_login.finish(b"hunter2", &response, Default::default())?;
//! let server_finish = server_login.finish(&client_finish.message)?;
//!
//! assert_eq!(client_finish.session_key, server_finish.session_key);
//! # Ok::<(), ProtocolError>(())
//! ```
//!
//! An unknown credential identifier is answered with a deterministic fake
//! record, so an attacker cannot probe which accounts exist. All protocol
//! failures surface as one of the four [`errors::ProtocolError`] variants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod encoding;
pub mod errors;
pub mod ksf;

mod envelope;
mod group;
mod hash;
mod key_exchange;
mod keypair;
mod messages;
mod opaque;
mod oprf;
mod serialization;

#[cfg(test)]
mod tests;

pub use errors::ProtocolError;
pub use keypair::{KeyPair, PrivateKey, PublicKey};
pub use ksf::KeyStretch;
pub use messages::{
    CredentialFinalization, CredentialRequest, CredentialResponse, RegistrationRequest,
    RegistrationResponse, RegistrationUpload,
};
pub use opaque::{
    verify_server_public_key, ClientLogin, ClientLoginFinishParameters, ClientLoginFinishResult,
    ClientRegistration, ClientRegistrationFinishParameters, ClientRegistrationFinishResult,
    Identifiers, ServerLogin, ServerLoginFinishResult, ServerLoginParameters, ServerRegistration,
    ServerSetup,
};

// Callers need these to construct custom stretching parameters and to supply
// their own randomness.
pub use argon2;
pub use rand;
