use std::env;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::{Error, ErrorKind, Result};

const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const DEFAULT_SYSTEM_BUS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// The standard message bus to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// The per-login-session bus, addressed by `DBUS_SESSION_BUS_ADDRESS`.
    Session,
    /// The system-wide bus, addressed by `DBUS_SYSTEM_BUS_ADDRESS` with a
    /// well-known fallback socket.
    System,
}

pub(crate) trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// The byte stream a connection runs over.
///
/// Usually a UNIX stream socket resolved from the bus address, but any
/// async byte stream will do, which is how tests drive a connection over
/// an in-memory pipe.
pub struct Transport {
    stream: Box<dyn Stream>,
}

impl Transport {
    /// Open a transport to one of the standard buses, resolving its
    /// address from the environment.
    pub async fn connect(kind: BusKind) -> Result<Self> {
        let address = match kind {
            BusKind::Session => {
                env::var(ENV_SESSION_BUS).map_err(|_| Error::new(ErrorKind::MissingBus))?
            }
            BusKind::System => {
                env::var(ENV_SYSTEM_BUS).unwrap_or_else(|_| DEFAULT_SYSTEM_BUS.to_owned())
            }
        };

        Self::connect_address(&address).await
    }

    /// Open a transport to a specific bus address, such as
    /// `unix:path=/run/user/1000/bus` or `tcp:host=localhost,port=4711`.
    pub async fn connect_address(address: &str) -> Result<Self> {
        match parse_address(address)? {
            #[cfg(unix)]
            Address::UnixPath(path) => Ok(Self::from_stream(UnixStream::connect(path).await?)),
            Address::UnixAbstract(name) => connect_abstract(&name),
            Address::Tcp(host, port) => {
                Ok(Self::from_stream(TcpStream::connect((host, port)).await?))
            }
            #[cfg(not(unix))]
            Address::UnixPath(..) => Err(Error::new(ErrorKind::InvalidAddress)),
        }
    }

    /// Wrap an already-open byte stream.
    pub fn from_stream<T>(stream: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            stream: Box::new(stream),
        }
    }
}

impl AsyncRead for Transport {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Transport {
    #[inline]
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.get_mut().stream).poll_write(cx, buf)
    }

    #[inline]
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().stream).poll_flush(cx)
    }

    #[inline]
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().stream).poll_shutdown(cx)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Address {
    UnixPath(String),
    UnixAbstract(String),
    Tcp(String, u16),
}

/// Parse a bus address: `;`-separated alternatives, each a transport name
/// followed by `,`-separated `key=value` pairs. The first alternative this
/// crate can open wins.
fn parse_address(address: &str) -> Result<Address> {
    for entry in address.split(';') {
        let Some((transport, rest)) = entry.split_once(':') else {
            continue;
        };

        let lookup = |key: &str| {
            rest.split(',')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_owned())
        };

        match transport {
            "unix" => {
                if let Some(path) = lookup("path") {
                    return Ok(Address::UnixPath(path));
                }

                if let Some(name) = lookup("abstract") {
                    return Ok(Address::UnixAbstract(name));
                }
            }
            "tcp" => {
                let (Some(host), Some(port)) = (lookup("host"), lookup("port")) else {
                    continue;
                };

                let Ok(port) = port.parse::<u16>() else {
                    return Err(Error::new(ErrorKind::InvalidAddress));
                };

                return Ok(Address::Tcp(host, port));
            }
            _ => continue,
        }
    }

    Err(Error::new(ErrorKind::InvalidAddress))
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> Result<Transport> {
    use std::os::linux::net::SocketAddrExt;

    let address = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
    let stream = std::os::unix::net::UnixStream::connect_addr(&address)?;
    stream.set_nonblocking(true)?;
    Ok(Transport::from_stream(UnixStream::from_std(stream)?))
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(_: &str) -> Result<Transport> {
    Err(Error::new(ErrorKind::InvalidAddress))
}

#[cfg(test)]
mod tests {
    use super::{parse_address, Address};

    #[test]
    fn parse_addresses() {
        assert_eq!(
            parse_address("unix:path=/run/user/1000/bus").unwrap(),
            Address::UnixPath("/run/user/1000/bus".into())
        );

        assert_eq!(
            parse_address("unix:abstract=/tmp/dbus-qqq,guid=0f").unwrap(),
            Address::UnixAbstract("/tmp/dbus-qqq".into())
        );

        assert_eq!(
            parse_address("tcp:host=localhost,port=4711").unwrap(),
            Address::Tcp("localhost".into(), 4711)
        );

        // The first openable alternative wins.
        assert_eq!(
            parse_address("unixexec:path=/bin/false;unix:path=/run/bus").unwrap(),
            Address::UnixPath("/run/bus".into())
        );

        assert!(parse_address("").is_err());
        assert!(parse_address("unix:guid=00").is_err());
        assert!(parse_address("tcp:host=localhost,port=noport").is_err());
    }
}
