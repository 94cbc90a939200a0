use core::fmt;
use core::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("unknown transport: {0}")]
    UnknownTransport(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("UDP"),
            Transport::Tcp => f.write_str("TCP"),
            Transport::Tls => f.write_str("TLS"),
        }
    }
}

impl FromStr for Transport {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Transport::Udp),
            "tcp" => Ok(Transport::Tcp),
            "tls" => Ok(Transport::Tls),
            other => Err(AddressError::UnknownTransport(other.to_string())),
        }
    }
}

/// The user-facing identity an account registers as.
///
/// Both URIs are derived from the username and domain, so an identity that
/// was constructed successfully always renders to well-formed SIP URIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    username: String,
    domain: String,
    transport: Transport,
}

impl AccountIdentity {
    pub fn new(username: &str, domain: &str, transport: Transport) -> Result<Self, AddressError> {
        validate_user(username)?;
        validate_domain(domain)?;

        Ok(Self {
            username: username.to_string(),
            domain: domain.to_string(),
            transport,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// `sip:{username}@{domain}`
    pub fn sip_uri(&self) -> String {
        format!("sip:{}@{}", self.username, self.domain)
    }

    /// `sip:{domain}`
    pub fn server_uri(&self) -> String {
        format!("sip:{}", self.domain)
    }
}

/// Digest credentials handed to the engine. The password never leaves this
/// struct through `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    domain: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str, domain: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            domain: domain.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

fn validate_user(user: &str) -> Result<(), AddressError> {
    if user.is_empty() {
        return Err(AddressError::InvalidAddress("empty username".into()));
    }
    if let Some(c) = user
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || "@:;<>\"".contains(*c))
    {
        return Err(AddressError::InvalidAddress(format!(
            "username contains {c:?}"
        )));
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<(), AddressError> {
    if domain.is_empty() {
        return Err(AddressError::InvalidAddress("empty domain".into()));
    }

    let (host, port) = split_host_port(domain)?;

    if let Some(v6) = host.strip_prefix('[') {
        let inner = v6
            .strip_suffix(']')
            .ok_or_else(|| AddressError::InvalidAddress(format!("unterminated IPv6 host {domain}")))?;
        if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.') {
            return Err(AddressError::InvalidAddress(format!("bad IPv6 host {domain}")));
        }
    } else {
        if host.is_empty() || host.starts_with('.') || host.starts_with('-') || host.ends_with('-') {
            return Err(AddressError::InvalidAddress(format!("bad host {domain}")));
        }
        if !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
            return Err(AddressError::InvalidAddress(format!("bad host {domain}")));
        }
    }

    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(p) if p != 0 => {}
            _ => return Err(AddressError::InvalidAddress(format!("bad port in {domain}"))),
        }
    }

    Ok(())
}

fn split_host_port(domain: &str) -> Result<(&str, Option<&str>), AddressError> {
    if domain.starts_with('[') {
        // [v6]:port
        return match domain.rfind("]:") {
            Some(pos) => Ok((&domain[..pos + 1], Some(&domain[pos + 2..]))),
            None => Ok((domain, None)),
        };
    }

    let mut parts = domain.splitn(2, ':');
    let host = parts.next().unwrap_or_default();
    match parts.next() {
        Some(port) if port.contains(':') => {
            Err(AddressError::InvalidAddress(format!("bad host {domain}")))
        }
        port => Ok((host, port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_renders_sip_uris() {
        let pairs = [
            ("alice", "example.com"),
            ("100", "pbx.local"),
            ("bob.smith", "10.0.0.2:5070"),
            ("carol_1", "[2001:db8::1]"),
            ("dave+test", "sip-gw.example.org"),
        ];
        for (user, domain) in pairs {
            let id = AccountIdentity::new(user, domain, Transport::Udp).unwrap();
            assert_eq!(id.sip_uri(), format!("sip:{user}@{domain}"));
            assert_eq!(id.server_uri(), format!("sip:{domain}"));
        }
    }

    #[test]
    fn rejects_malformed_identity() {
        let bad = [
            ("", "example.com"),
            ("alice", ""),
            ("al ice", "example.com"),
            ("alice@home", "example.com"),
            ("alice", "exa mple.com"),
            ("alice", ".example.com"),
            ("alice", "example.com:0"),
            ("alice", "example.com:port"),
            ("alice", "[2001:db8::1"),
        ];
        for (user, domain) in bad {
            assert!(
                matches!(
                    AccountIdentity::new(user, domain, Transport::Udp),
                    Err(AddressError::InvalidAddress(_))
                ),
                "accepted {user:?}@{domain:?}"
            );
        }
    }

    #[test]
    fn transport_parses_case_insensitively() {
        assert_eq!("UDP".parse::<Transport>().unwrap(), Transport::Udp);
        assert_eq!("tcp".parse::<Transport>().unwrap(), Transport::Tcp);
        assert_eq!(" Tls ".parse::<Transport>().unwrap(), Transport::Tls);
        assert!(matches!(
            "sctp".parse::<Transport>(),
            Err(AddressError::UnknownTransport(_))
        ));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("alice", "hunter2", "example.com");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("alice"));
    }
}
