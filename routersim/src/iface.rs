//! Interface descriptors for the datagram link layer.

use eui48::MacAddress;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

/// One router port as given on the command line: `PATH,MAC,IPV4`, where
/// `PATH` is the unix datagram socket the port binds. The argument's
/// position defines the interface index.
#[derive(Clone, Debug)]
pub struct IfaceSpec {
    pub path: PathBuf,
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
}

impl FromStr for IfaceSpec {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |what: &str| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{what} in interface descriptor `{s}` (expected PATH,MAC,IPV4)"),
            )
        };
        let mut parts = s.splitn(3, ',');
        let (Some(path), Some(mac), Some(ip)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(bad("missing field"));
        };
        let mac = MacAddress::parse_str(mac)
            .map_err(|_| bad("unparseable MAC address"))?
            .to_array();
        let ip = ip.parse().map_err(|_| bad("unparseable IPv4 address"))?;
        Ok(IfaceSpec {
            path: PathBuf::from(path),
            mac,
            ip,
        })
    }
}
