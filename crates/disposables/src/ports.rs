use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

static ADDRESS_AND_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[(?P<v6>[^\]]+)\]|(?P<addr>.+)):(?P<port>\d+)$")
        .expect("address pattern is valid")
});

/// Host-side binding of a published container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub address: IpAddr,
    pub port: u16,
}

impl PortMapping {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Parses one `address:port` token as printed by `<engine> port`.
    pub fn parse(token: &str) -> Result<Self> {
        let invalid = || Error::PortMapParse {
            token: token.to_string(),
        };

        let caps = ADDRESS_AND_PORT.captures(token).ok_or_else(invalid)?;
        let address = caps
            .name("v6")
            .or_else(|| caps.name("addr"))
            .map(|m| m.as_str())
            .ok_or_else(invalid)?;
        let address: IpAddr = address.parse().map_err(|_| invalid())?;
        let port: u16 = caps["port"].parse().map_err(|_| invalid())?;

        Ok(Self { address, port })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.socket_addr().fmt(f)
    }
}

/// Parses the whole output of `<engine> port <id> <port>`, one mapping per
/// whitespace-separated token.
pub fn parse_port_output(output: &str) -> Result<Vec<PortMapping>> {
    output.split_whitespace().map(PortMapping::parse).collect()
}

/// Connects to the first mapping that accepts, in order.
pub(crate) fn connect_first(port: u16, mappings: &[PortMapping]) -> Result<TcpStream> {
    let mut last_error = None;
    for mapping in mappings {
        match TcpStream::connect(mapping.socket_addr()) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!(%mapping, error = %err, "connection attempt failed");
                last_error = Some(err);
            }
        }
    }
    Err(Error::Connection {
        port,
        source: last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no host mappings discovered")
        }),
    })
}
