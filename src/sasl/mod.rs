//! The SASL client handshake D-Bus performs before switching to the
//! binary protocol.
//!
//! The exchange is line oriented: the client opens with a NUL byte and an
//! `AUTH` command, the server answers with `DATA`, `OK` or `REJECTED`, and
//! a successful handshake ends with the client sending `BEGIN`.


pub use self::auth_error::AuthError;
pub(crate) use self::auth_error::AuthErrorKind;
mod auth_error;

use std::path::PathBuf;

use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::connection::Transport;
use crate::error::Result;

/// Guard against a malicious peer feeding an endless SASL line.
const MAX_LINE: usize = 16 * 1024;

/// An authentication mechanism offered during the SASL handshake.
///
/// Mechanisms are tried in the order given; the first one the server
/// accepts wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMechanism {
    /// The EXTERNAL mechanism: proves identity through the transport
    /// itself, announcing the numeric uid of this process.
    External {
        /// The uid announced to the server.
        uid: u32,
    },
    /// The DBUS_COOKIE_SHA1 mechanism: proves identity by answering a
    /// challenge with a secret cookie read from the user's keyring
    /// directory.
    CookieSha1 {
        /// The username announced to the server.
        username: String,
        /// The directory holding keyring files, normally
        /// `$HOME/.dbus-keyrings`.
        keyring_dir: PathBuf,
    },
}

impl AuthMechanism {
    /// The EXTERNAL mechanism for the uid of the current process.
    #[cfg(all(unix, feature = "libc"))]
    pub fn external() -> Self {
        Self::External {
            uid: unsafe { libc::getuid() },
        }
    }

    /// The DBUS_COOKIE_SHA1 mechanism configured from the `USER` and
    /// `HOME` environment variables.
    pub fn cookie_sha1() -> Self {
        let username = std::env::var("USER").unwrap_or_default();

        let keyring_dir = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(".dbus-keyrings");

        Self::CookieSha1 {
            username,
            keyring_dir,
        }
    }

    /// The default mechanism chain: DBUS_COOKIE_SHA1 first, then
    /// EXTERNAL.
    pub(crate) fn default_chain() -> Vec<Self> {
        let mut chain = vec![Self::cookie_sha1()];

        #[cfg(all(unix, feature = "libc"))]
        chain.push(Self::external());

        chain
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::External { .. } => "EXTERNAL",
            Self::CookieSha1 { .. } => "DBUS_COOKIE_SHA1",
        }
    }

    /// The hex-encoded initial response sent with the `AUTH` command.
    pub(crate) fn initial_response(&self) -> String {
        match self {
            Self::External { uid } => hex_encode(uid.to_string().as_bytes()),
            Self::CookieSha1 { username, .. } => hex_encode(username.as_bytes()),
        }
    }

    /// Answer a server `DATA` challenge. The payload has already been
    /// hex-decoded; the response is raw and will be hex-encoded by the
    /// handshake loop.
    pub(crate) async fn challenge(&self, payload: &[u8]) -> Result<Vec<u8>, AuthError> {
        match self {
            // EXTERNAL never issues data challenges.
            Self::External { .. } => Err(AuthError::new(AuthErrorKind::UnexpectedChallenge)),
            Self::CookieSha1 { keyring_dir, .. } => {
                cookie_sha1_response(keyring_dir, payload).await
            }
        }
    }
}

/// Run the SASL handshake over a freshly opened transport, leaving it
/// ready for the binary protocol once `BEGIN` has been sent.
///
/// Normally called through [`ConnectionBuilder`][crate::ConnectionBuilder];
/// exposed for callers wiring a [`Transport`] up by hand.
pub async fn authenticate(
    transport: &mut Transport,
    mechanisms: &[AuthMechanism],
) -> Result<()> {
    transport.write_all(b"\0").await?;

    'mechanisms: for mechanism in mechanisms {
        let command = format!(
            "AUTH {} {}\r\n",
            mechanism.name(),
            mechanism.initial_response()
        );
        transport.write_all(command.as_bytes()).await?;

        loop {
            let line = read_line(transport).await?;
            let (command, rest) = match line.split_once(' ') {
                Some((command, rest)) => (command, rest),
                None => (line.as_str(), ""),
            };

            match command {
                "OK" => {
                    log::debug!("sasl: authenticated via {} ({rest})", mechanism.name());
                    transport.write_all(b"BEGIN\r\n").await?;
                    return Ok(());
                }
                "DATA" => {
                    let payload = hex_decode(rest.trim())?;

                    match mechanism.challenge(&payload).await {
                        Ok(response) => {
                            let line = format!("DATA {}\r\n", hex_encode(&response));
                            transport.write_all(line.as_bytes()).await?;
                        }
                        Err(error) => {
                            log::debug!("sasl: {} failed: {error}", mechanism.name());
                            transport.write_all(b"CANCEL\r\n").await?;
                        }
                    }
                }
                "REJECTED" => {
                    log::debug!("sasl: {} rejected, offered: {rest}", mechanism.name());
                    continue 'mechanisms;
                }
                "ERROR" => {
                    transport.write_all(b"CANCEL\r\n").await?;
                }
                _ => {
                    return Err(AuthError::new(AuthErrorKind::UnexpectedResponse(
                        line.as_str().into(),
                    ))
                    .into())
                }
            }
        }
    }

    Err(AuthError::new(AuthErrorKind::Rejected).into())
}

/// Compute the DBUS_COOKIE_SHA1 response: find the cookie named by the
/// challenge, then answer with a fresh client challenge and the SHA-1
/// digest of `server_challenge:client_challenge:cookie`.
async fn cookie_sha1_response(
    keyring_dir: &std::path::Path,
    payload: &[u8],
) -> Result<Vec<u8>, AuthError> {
    let payload =
        std::str::from_utf8(payload).map_err(|_| AuthError::new(AuthErrorKind::MalformedChallenge))?;

    let mut parts = payload.split_whitespace();

    let (Some(context), Some(cookie_id), Some(server_challenge)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::new(AuthErrorKind::MalformedChallenge));
    };

    // Context names are path components; refuse anything that could walk
    // out of the keyring directory.
    if context.is_empty() || context.contains(['/', '\\']) || context == ".." {
        return Err(AuthError::new(AuthErrorKind::MalformedChallenge));
    }

    let keyring = tokio::fs::read_to_string(keyring_dir.join(context))
        .await
        .map_err(|_| AuthError::new(AuthErrorKind::MissingCookie))?;

    let cookie = keyring
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let id = columns.next()?;
            let _creation = columns.next()?;
            let cookie = columns.next()?;
            (id == cookie_id).then(|| cookie.to_owned())
        })
        .next()
        .ok_or_else(|| AuthError::new(AuthErrorKind::MissingCookie))?;

    let mut random = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random);
    let client_challenge = hex_encode(&random);

    let mut digest = Sha1::new();
    digest.update(server_challenge.as_bytes());
    digest.update(b":");
    digest.update(client_challenge.as_bytes());
    digest.update(b":");
    digest.update(cookie.as_bytes());

    let response = format!("{client_challenge} {}", hex_encode(&digest.finalize()));
    Ok(response.into_bytes())
}

/// Read one CRLF-terminated line off the transport.
///
/// Reads proceed byte by byte so nothing beyond the line is consumed; the
/// binary protocol begins right after the handshake.
async fn read_line(transport: &mut Transport) -> Result<String> {
    let mut line = Vec::new();

    loop {
        let byte = transport.read_u8().await?;

        if byte == b'\n' {
            break;
        }

        line.push(byte);

        if line.len() > MAX_LINE {
            return Err(AuthError::new(AuthErrorKind::LineTooLong).into());
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Ok(String::from_utf8(line)
        .map_err(|_| AuthError::new(AuthErrorKind::UnexpectedResponse("<binary>".into())))?)
}

const HEX: &[u8; 16] = b"0123456789abcdef";

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);

    for &byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0xf)]));
    }

    out
}

pub(crate) fn hex_decode(input: &str) -> Result<Vec<u8>, AuthError> {
    fn nibble(byte: u8) -> Option<u8> {
        match byte {
            b'0'..=b'9' => Some(byte - b'0'),
            b'a'..=b'f' => Some(byte - b'a' + 10),
            b'A'..=b'F' => Some(byte - b'A' + 10),
            _ => None,
        }
    }

    let input = input.as_bytes();

    if input.len() % 2 != 0 {
        return Err(AuthError::new(AuthErrorKind::InvalidHex));
    }

    input
        .chunks_exact(2)
        .map(|pair| {
            let (Some(high), Some(low)) = (nibble(pair[0]), nibble(pair[1])) else {
                return Err(AuthError::new(AuthErrorKind::InvalidHex));
            };

            Ok(high << 4 | low)
        })
        .collect()
}
