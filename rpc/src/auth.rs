// BP Node: sovereign bitcoin wallet backend.
//
// SPDX-License-Identifier: Apache-2.0
//
// Designed & written in 2020-2025 by
//     @will-bitlight <https://bitlightlabs.com>
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2024 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2025 LNP/BP Labs, InDCS, Switzerland. All rights reserved.
// Copyright (C) 2020-2025 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License. You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

//! Resolves node RPC credentials from a data directory (§4.5, §6): `bitcoin.conf`'s
//! `rpcuser`/`rpcpassword` first, falling back to a `.cookie` file.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::AuthError;

/// Parses `rpcuser=...`/`rpcpassword=...` lines out of a `bitcoin.conf`-shaped `key=value` file.
/// Later lines win if a key repeats, matching `bitcoind`'s own config precedence.
fn parse_conf(contents: &str) -> Option<(String, String)> {
    let mut user = None;
    let mut pass = None;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "rpcuser" => user = Some(value.trim().to_string()),
                "rpcpassword" => pass = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    Some((user?, pass?))
}

/// Parses a `.cookie` file: exactly one line, shaped `__cookie__:<secret>`.
fn parse_cookie(contents: &str) -> Result<(String, String), AuthError> {
    let mut lines = contents.lines();
    let line = lines.next().ok_or(AuthError::MalformedCookie)?;
    if lines.next().is_some() {
        return Err(AuthError::MalformedCookie);
    }
    let (user, pass) = line.split_once(':').ok_or(AuthError::MissingCookieTag)?;
    if user != "__cookie__" {
        return Err(AuthError::MissingCookieTag);
    }
    Ok((user.to_string(), pass.to_string()))
}

/// Resolves `user:pass` credentials for `data_dir`, trying `bitcoin.conf` then `.cookie`, and
/// returns the base64-encoded `Basic` auth value ready to be cached on the transport.
pub fn resolve_basic_auth(data_dir: &Path) -> Result<String, AuthError> {
    let conf_path = data_dir.join("bitcoin.conf");
    if let Ok(contents) = std::fs::read_to_string(&conf_path) {
        if let Some((user, pass)) = parse_conf(&contents) {
            return Ok(encode_basic(&user, &pass));
        }
    }

    let cookie_path = data_dir.join(".cookie");
    match std::fs::read_to_string(&cookie_path) {
        Ok(contents) => {
            let (user, pass) = parse_cookie(&contents)?;
            Ok(encode_basic(&user, &pass))
        }
        Err(_) => Err(AuthError::NoCredentials(data_dir.display().to_string())),
    }
}

fn encode_basic(user: &str, pass: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rpcuser_and_password_from_conf() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bitcoin.conf"), "server=1\nrpcuser=alice\nrpcpassword=s3cret\n")
            .unwrap();
        let header = resolve_basic_auth(dir.path()).unwrap();
        assert_eq!(header, encode_basic("alice", "s3cret"));
    }

    #[test]
    fn falls_back_to_cookie_when_conf_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".cookie"), "__cookie__:deadbeef").unwrap();
        let header = resolve_basic_auth(dir.path()).unwrap();
        assert_eq!(header, encode_basic("__cookie__", "deadbeef"));
    }

    #[test]
    fn rejects_multiline_cookie() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".cookie"), "__cookie__:a\nextra\n").unwrap();
        let err = resolve_basic_auth(dir.path()).unwrap_err();
        assert!(matches!(err, AuthError::MalformedCookie));
    }

    #[test]
    fn no_credentials_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_basic_auth(dir.path()).unwrap_err();
        assert!(matches!(err, AuthError::NoCredentials(_)));
    }
}
