//! SOCKS5-style target address codec.
//!
//! The first plaintext chunk from the client starts with this header:
//!
//! ```text
//! [ atyp (1) | address (4 / 1+len / 16) | port (2, big-endian) ]
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::core::{ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6};

/// A proxied connection's target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IPv4 address.
    Ipv4(Ipv4Addr),
    /// IPv6 address.
    Ipv6(Ipv6Addr),
    /// Domain name, resolved at the far end.
    Domain(String),
}

impl Address {
    /// Encode the header for this target and port.
    pub fn encode(&self, port: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(22);
        match self {
            Address::Ipv4(ip) => {
                buf.push(ATYP_IPV4);
                buf.extend_from_slice(&ip.octets());
            }
            Address::Ipv6(ip) => {
                buf.push(ATYP_IPV6);
                buf.extend_from_slice(&ip.octets());
            }
            Address::Domain(domain) => {
                buf.push(ATYP_DOMAIN);
                buf.push(domain.len() as u8);
                buf.extend_from_slice(domain.as_bytes());
            }
        }
        buf.extend_from_slice(&port.to_be_bytes());
        buf
    }

    /// Decode a header from the start of `buf`.
    ///
    /// Returns the target, port, and number of bytes consumed, or `None`
    /// for malformed or truncated input. Callers treat `None` as a fatal
    /// protocol error.
    pub fn decode(buf: &[u8]) -> Option<(Address, u16, usize)> {
        let atyp = *buf.first()?;
        match atyp {
            ATYP_IPV4 => {
                let octets: [u8; 4] = buf.get(1..5)?.try_into().ok()?;
                let port = u16::from_be_bytes(buf.get(5..7)?.try_into().ok()?);
                Some((Address::Ipv4(Ipv4Addr::from(octets)), port, 7))
            }
            ATYP_IPV6 => {
                let octets: [u8; 16] = buf.get(1..17)?.try_into().ok()?;
                let port = u16::from_be_bytes(buf.get(17..19)?.try_into().ok()?);
                Some((Address::Ipv6(Ipv6Addr::from(octets)), port, 19))
            }
            ATYP_DOMAIN => {
                let len = *buf.get(1)? as usize;
                if len == 0 {
                    return None;
                }
                let name = buf.get(2..2 + len)?;
                let domain = std::str::from_utf8(name).ok()?.to_string();
                let end = 2 + len;
                let port = u16::from_be_bytes(buf.get(end..end + 2)?.try_into().ok()?);
                Some((Address::Domain(domain), port, end + 2))
            }
            _ => None,
        }
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(ip) => Address::Ipv4(ip),
            IpAddr::V6(ip) => Address::Ipv6(ip),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip) => ip.fmt(f),
            Address::Ipv6(ip) => ip.fmt(f),
            Address::Domain(domain) => f.write_str(domain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_roundtrip() {
        let addr = Address::Ipv4(Ipv4Addr::new(10, 0, 0, 1));
        let encoded = addr.encode(8080);
        assert_eq!(encoded[0], ATYP_IPV4);
        assert_eq!(encoded.len(), 7);

        let (decoded, port, consumed) = Address::decode(&encoded).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(port, 8080);
        assert_eq!(consumed, 7);
    }

    #[test]
    fn test_ipv6_roundtrip() {
        let addr = Address::Ipv6("2001:db8::1".parse().unwrap());
        let encoded = addr.encode(443);
        assert_eq!(encoded[0], ATYP_IPV6);
        assert_eq!(encoded.len(), 19);

        let (decoded, port, consumed) = Address::decode(&encoded).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(port, 443);
        assert_eq!(consumed, 19);
    }

    #[test]
    fn test_domain_roundtrip() {
        let addr = Address::Domain("example.com".to_string());
        let encoded = addr.encode(443);
        assert_eq!(encoded[0], ATYP_DOMAIN);
        assert_eq!(encoded[1], 11);

        let (decoded, port, consumed) = Address::decode(&encoded).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(port, 443);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_decode_with_trailing_payload() {
        let mut buf = Address::Ipv4(Ipv4Addr::LOCALHOST).encode(80);
        let header_len = buf.len();
        buf.extend_from_slice(b"GET / HTTP/1.1\r\n");

        let (_, _, consumed) = Address::decode(&buf).unwrap();
        assert_eq!(consumed, header_len);
        assert_eq!(&buf[consumed..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn test_decode_malformed() {
        // Empty input.
        assert!(Address::decode(&[]).is_none());
        // Unknown address type.
        assert!(Address::decode(&[0x02, 1, 2, 3, 4, 0, 80]).is_none());
        // Truncated IPv4.
        assert!(Address::decode(&[ATYP_IPV4, 10, 0, 0]).is_none());
        // Truncated port.
        assert!(Address::decode(&[ATYP_IPV4, 10, 0, 0, 1, 0]).is_none());
        // Zero-length domain.
        assert!(Address::decode(&[ATYP_DOMAIN, 0, 0, 80]).is_none());
        // Domain longer than the buffer.
        assert!(Address::decode(&[ATYP_DOMAIN, 5, b'a', b'b']).is_none());
        // Non-UTF-8 domain.
        assert!(Address::decode(&[ATYP_DOMAIN, 2, 0xFF, 0xFE, 0, 80]).is_none());
    }
}
