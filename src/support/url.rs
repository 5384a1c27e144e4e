//! Connection URL handling
//!
//! OCPP endpoints are addressed as
//! `<scheme>://[user[:password]@]host[:port][path]`. Parsing is strict:
//! an input either yields a fully validated URL or an error, never a
//! partially filled one.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Invalid(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("URL port must be in 1..=65535")]
    InvalidPort,
}

/// A validated connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    raw: String,
    scheme: String,
    username: String,
    password: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
}

impl ConnectionUrl {
    /// Parse and validate a URL. The path defaults to `/`.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let parsed = url::Url::parse(input).map_err(|e| UrlError::Invalid(e.to_string()))?;

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(UrlError::MissingHost)?
            .to_string();
        if parsed.port() == Some(0) {
            return Err(UrlError::InvalidPort);
        }

        let path = match parsed.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            raw: input.to_string(),
            scheme: parsed.scheme().to_string(),
            username: parsed.username().to_string(),
            password: parsed.password().map(str::to_string),
            host,
            port: parsed.port(),
            path,
        })
    }

    /// The URL as it was given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// User name, empty when the URL carries no credentials.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the scheme requests TLS (`wss` / `https`).
    pub fn is_secure(&self) -> bool {
        matches!(self.scheme.as_str(), "wss" | "https")
    }

    /// Append a path segment, used to build `<base>/<charge point id>`.
    pub fn join_segment(&self, segment: &str) -> String {
        let base = self.raw.trim_end_matches('/');
        format!("{}/{}", base, segment)
    }
}

impl std::fmt::Display for ConnectionUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_is_decomposed() {
        let url = ConnectionUrl::parse("wss://id:pw@host:8443/ocpp/CP1").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.username(), "id");
        assert_eq!(url.password(), Some("pw"));
        assert_eq!(url.host(), "host");
        assert_eq!(url.port(), Some(8443));
        assert_eq!(url.path(), "/ocpp/CP1");
        assert!(url.is_secure());
    }

    #[test]
    fn path_defaults_to_root() {
        let url = ConnectionUrl::parse("ws://central.example.com").unwrap();
        assert_eq!(url.path(), "/");
        assert_eq!(url.port(), None);
        assert_eq!(url.username(), "");
        assert_eq!(url.password(), None);
    }

    #[test]
    fn missing_scheme_separator_is_rejected() {
        assert!(ConnectionUrl::parse("ftp//bad").is_err());
    }

    #[test]
    fn port_zero_is_rejected() {
        assert_eq!(
            ConnectionUrl::parse("ws://host:0/ocpp"),
            Err(UrlError::InvalidPort)
        );
    }

    #[test]
    fn port_out_of_range_is_rejected() {
        assert!(ConnectionUrl::parse("ws://host:65536/ocpp").is_err());
    }

    #[test]
    fn ipv4_and_ipv6_hosts_are_accepted() {
        let v4 = ConnectionUrl::parse("ws://192.168.1.10:8080/ocpp").unwrap();
        assert_eq!(v4.host(), "192.168.1.10");
        let v6 = ConnectionUrl::parse("ws://[::1]:8080/ocpp").unwrap();
        assert_eq!(v6.port(), Some(8080));
    }

    #[test]
    fn join_segment_builds_charge_point_url() {
        let url = ConnectionUrl::parse("wss://cs.example.com/ocpp/").unwrap();
        assert_eq!(
            url.join_segment("CP_42"),
            "wss://cs.example.com/ocpp/CP_42"
        );
    }
}
