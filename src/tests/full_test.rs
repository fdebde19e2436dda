// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed
// licenses.

//! End-to-end runs of registration and login across both parties

use rand::rngs::OsRng;

use crate::errors::ProtocolError;
use crate::{
    ClientLogin, ClientLoginFinishParameters, ClientRegistration,
    ClientRegistrationFinishParameters, Identifiers, KeyPair, KeyStretch, ServerLogin,
    ServerLoginParameters, ServerRegistration, ServerSetup,
};

// Low-cost Argon2id parameters so the suite stays fast. The policy choice
// does not change any protocol logic, only the stretching work factor.
fn fast_stretch() -> KeyStretch {
    KeyStretch::Custom(argon2::Params::new(1024, 1, 1, None).unwrap())
}

fn register(
    rng: &mut OsRng,
    server_setup: &ServerSetup,
    password: &[u8],
    credential_identifier: &[u8],
    identifiers: Identifiers<'_>,
) -> (ServerRegistration, Vec<u8>) {
    let (mut client_state, request) = ClientRegistration::start(rng, password).unwrap();
    let response =
        ServerRegistration::start(server_setup, &request, credential_identifier).unwrap();
    let finish = client_state
        .finish(
            rng,
            password,
            &response,
            ClientRegistrationFinishParameters {
                identifiers,
                key_stretch: fast_stretch(),
                ..Default::default()
            },
        )
        .unwrap();
    (
        ServerRegistration::finish(finish.message),
        finish.export_key,
    )
}

#[test]
fn registration_and_login_agree_on_keys() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let (record, registration_export_key) = register(
        &mut rng,
        &server_setup,
        b"hunter2",
        b"alice",
        Identifiers::default(),
    );

    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (mut server_login, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();

    let client_finish = client_login
        .finish(
            b"hunter2",
            &response,
            ClientLoginFinishParameters {
                key_stretch: fast_stretch(),
                ..Default::default()
            },
        )
        .unwrap();
    let server_finish = server_login.finish(&client_finish.message).unwrap();

    assert_eq!(client_finish.session_key, server_finish.session_key);
    assert_eq!(client_finish.export_key, registration_export_key);
    assert_eq!(
        client_finish.server_s_pk,
        server_setup.keypair().public().clone()
    );
}

#[test]
fn login_with_identifiers_and_context() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let identifiers = Identifiers {
        client: Some(b"alice@example.com"),
        server: Some(b"login.example.com"),
    };
    let (record, _) = register(&mut rng, &server_setup, b"hunter2", b"alice", identifiers);

    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (mut server_login, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters {
            context: Some(b"app-v2"),
            identifiers,
        },
    )
    .unwrap();

    let client_finish = client_login
        .finish(
            b"hunter2",
            &response,
            ClientLoginFinishParameters {
                context: Some(b"app-v2"),
                identifiers,
                key_stretch: fast_stretch(),
                ..Default::default()
            },
        )
        .unwrap();
    let server_finish = server_login.finish(&client_finish.message).unwrap();
    assert_eq!(client_finish.session_key, server_finish.session_key);
}

#[test]
fn wrong_password_fails_login() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let (record, _) = register(
        &mut rng,
        &server_setup,
        b"hunter2",
        b"alice",
        Identifiers::default(),
    );

    let (mut client_login, request) = ClientLogin::start(&mut rng, b"wrong-password").unwrap();
    let (_, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();

    assert_eq!(
        client_login
            .finish(
                b"wrong-password",
                &response,
                ClientLoginFinishParameters {
                    key_stretch: fast_stretch(),
                    ..Default::default()
                },
            )
            .unwrap_err(),
        ProtocolError::InvalidLoginError
    );
}

#[test]
fn mismatched_parameters_fail_login() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let (record, _) = register(
        &mut rng,
        &server_setup,
        b"hunter2",
        b"alice",
        Identifiers::default(),
    );

    // Context differs between the two sides.
    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (_, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters {
            context: Some(b"server-context"),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(
        client_login
            .finish(
                b"hunter2",
                &response,
                ClientLoginFinishParameters {
                    context: Some(b"client-context"),
                    key_stretch: fast_stretch(),
                    ..Default::default()
                },
            )
            .unwrap_err(),
        ProtocolError::InvalidLoginError
    );

    // Identity differs from the one sealed into the envelope.
    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (_, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters {
            identifiers: Identifiers {
                client: Some(b"mallory"),
                server: None,
            },
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(
        client_login
            .finish(
                b"hunter2",
                &response,
                ClientLoginFinishParameters {
                    identifiers: Identifiers {
                        client: Some(b"mallory"),
                        server: None,
                    },
                    key_stretch: fast_stretch(),
                    ..Default::default()
                },
            )
            .unwrap_err(),
        ProtocolError::InvalidLoginError
    );

    // Stretching policy differs from the one used at registration.
    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (_, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();
    assert_eq!(
        client_login
            .finish(
                b"hunter2",
                &response,
                ClientLoginFinishParameters {
                    key_stretch: KeyStretch::Custom(
                        argon2::Params::new(2048, 1, 1, None).unwrap()
                    ),
                    ..Default::default()
                },
            )
            .unwrap_err(),
        ProtocolError::InvalidLoginError
    );
}

#[test]
fn states_are_consumed_by_finish() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);

    // Client registration state.
    let (mut client_state, request) = ClientRegistration::start(&mut rng, b"hunter2").unwrap();
    let response = ServerRegistration::start(&server_setup, &request, b"alice").unwrap();
    let params = || ClientRegistrationFinishParameters {
        key_stretch: fast_stretch(),
        ..Default::default()
    };
    let finish = client_state
        .finish(&mut rng, b"hunter2", &response, params())
        .unwrap();
    assert_eq!(
        client_state
            .finish(&mut rng, b"hunter2", &response, params())
            .unwrap_err(),
        ProtocolError::InvalidStateError
    );
    assert_eq!(
        client_state.serialize().unwrap_err(),
        ProtocolError::InvalidStateError
    );
    let record = ServerRegistration::finish(finish.message);

    // Client and server login states.
    let login_params = || ClientLoginFinishParameters {
        key_stretch: fast_stretch(),
        ..Default::default()
    };
    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (mut server_login, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();
    let client_finish = client_login
        .finish(b"hunter2", &response, login_params())
        .unwrap();
    assert_eq!(
        client_login
            .finish(b"hunter2", &response, login_params())
            .unwrap_err(),
        ProtocolError::InvalidStateError
    );

    server_login.finish(&client_finish.message).unwrap();
    assert_eq!(
        server_login.finish(&client_finish.message).unwrap_err(),
        ProtocolError::InvalidStateError
    );
    assert_eq!(
        server_login.serialize().unwrap_err(),
        ProtocolError::InvalidStateError
    );
}

#[test]
fn failed_login_still_consumes_the_state() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let (record, _) = register(
        &mut rng,
        &server_setup,
        b"hunter2",
        b"alice",
        Identifiers::default(),
    );

    let (mut client_login, request) = ClientLogin::start(&mut rng, b"wrong").unwrap();
    let (_, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();

    let params = || ClientLoginFinishParameters {
        key_stretch: fast_stretch(),
        ..Default::default()
    };
    assert_eq!(
        client_login.finish(b"wrong", &response, params()).unwrap_err(),
        ProtocolError::InvalidLoginError
    );
    // The second attempt reports the consumed state, not another login error.
    assert_eq!(
        client_login.finish(b"wrong", &response, params()).unwrap_err(),
        ProtocolError::InvalidStateError
    );
}

#[test]
fn unknown_user_fails_like_a_wrong_password() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);

    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (_, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        None,
        &request,
        b"no-such-user",
        ServerLoginParameters::default(),
    )
    .unwrap();

    assert_eq!(
        client_login
            .finish(
                b"hunter2",
                &response,
                ClientLoginFinishParameters {
                    key_stretch: fast_stretch(),
                    ..Default::default()
                },
            )
            .unwrap_err(),
        ProtocolError::InvalidLoginError
    );
}

#[test]
fn pinned_server_public_key_is_checked() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let (record, _) = register(
        &mut rng,
        &server_setup,
        b"hunter2",
        b"alice",
        Identifiers::default(),
    );

    let (mut client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (_, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();

    let other_key = KeyPair::generate_random(&mut rng);
    assert_eq!(
        client_login
            .finish(
                b"hunter2",
                &response,
                ClientLoginFinishParameters {
                    key_stretch: fast_stretch(),
                    expected_server_s_pk: Some(other_key.public().clone()),
                    ..Default::default()
                },
            )
            .unwrap_err(),
        ProtocolError::InvalidLoginError
    );
}

#[test]
fn empty_password_is_accepted() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let (record, _) = register(
        &mut rng,
        &server_setup,
        b"",
        b"alice",
        Identifiers::default(),
    );

    let (mut client_login, request) = ClientLogin::start(&mut rng, b"").unwrap();
    let (mut server_login, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();
    let client_finish = client_login
        .finish(
            b"",
            &response,
            ClientLoginFinishParameters {
                key_stretch: fast_stretch(),
                ..Default::default()
            },
        )
        .unwrap();
    let server_finish = server_login.finish(&client_finish.message).unwrap();
    assert_eq!(client_finish.session_key, server_finish.session_key);
}

#[test]
fn client_supplied_static_keypair_is_used() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let client_keypair = KeyPair::generate_random(&mut rng);

    let (mut client_state, request) = ClientRegistration::start(&mut rng, b"hunter2").unwrap();
    let response = ServerRegistration::start(&server_setup, &request, b"alice").unwrap();
    let finish = client_state
        .finish(
            &mut rng,
            b"hunter2",
            &response,
            ClientRegistrationFinishParameters {
                key_stretch: fast_stretch(),
                client_static_keypair: Some(client_keypair.clone()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(&finish.message.client_s_pk, client_keypair.public());
}

#[test]
fn login_state_survives_a_byte_roundtrip() {
    let mut rng = OsRng;
    let server_setup = ServerSetup::new(&mut rng);
    let (record, _) = register(
        &mut rng,
        &server_setup,
        b"hunter2",
        b"alice",
        Identifiers::default(),
    );

    let (client_login, request) = ClientLogin::start(&mut rng, b"hunter2").unwrap();
    let (server_login, response) = ServerLogin::start(
        &mut rng,
        &server_setup,
        Some(&record),
        &request,
        b"alice",
        ServerLoginParameters::default(),
    )
    .unwrap();

    // Both parties persist their state between messages.
    let mut client_login = ClientLogin::deserialize(&client_login.serialize().unwrap()).unwrap();
    let mut server_login = ServerLogin::deserialize(&server_login.serialize().unwrap()).unwrap();

    let client_finish = client_login
        .finish(
            b"hunter2",
            &response,
            ClientLoginFinishParameters {
                key_stretch: fast_stretch(),
                ..Default::default()
            },
        )
        .unwrap();
    let server_finish = server_login.finish(&client_finish.message).unwrap();
    assert_eq!(client_finish.session_key, server_finish.session_key);
}
