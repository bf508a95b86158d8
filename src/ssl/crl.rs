//! CRL acquisition
//!
//! Downloads a Certificate Revocation List from the configured source.
//! The scheme picks the backend: `file://` reads a local file, `ldap://`
//! queries a directory service, anything else goes through HTTP(S). Every
//! branch fails closed: on any error no CRL is produced and the caller
//! must refuse to trust the connection.
//!
//! Revocation sources are untrusted network inputs, so a payload is only
//! accepted after structural validation (PEM `X509 CRL` block or DER
//! SEQUENCE framing); full signature validation happens when the verifier
//! is built from the trust store.

use rustls::pki_types::CertificateRevocationListDer;
use tracing::{debug, warn};

use crate::error::SslErrorMessage;
use crate::ssl::CrlData;

/// Growth increment for the download buffer, matching the fetch chunking.
const CRL_DATA_LENGTH: usize = 2048;

/// Growable byte buffer with fixed-increment amortized growth.
///
/// Grows by [`CRL_DATA_LENGTH`] plus the incoming chunk whenever the next
/// chunk would overflow the current capacity.
pub(crate) struct CrlBuffer {
    contents: Vec<u8>,
    length: usize,
}

impl CrlBuffer {
    pub(crate) fn new() -> Self {
        Self {
            contents: vec![0; CRL_DATA_LENGTH],
            length: 0,
        }
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        if self.length + chunk.len() > self.contents.len() {
            self.contents
                .resize(self.contents.len() + CRL_DATA_LENGTH + chunk.len(), 0);
        }
        self.contents[self.length..self.length + chunk.len()].copy_from_slice(chunk);
        self.length += chunk.len();
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.contents[..self.length]
    }

    pub(crate) fn len(&self) -> usize {
        self.length
    }
}

/// Download and parse the CRL at `url`.
pub fn download(url: &str, ssl_trace: bool) -> Result<CrlData, SslErrorMessage> {
    if url.is_empty() {
        return Err(SslErrorMessage::with_description(
            "Can't open CRL File",
            "The URL for the CRL is undefined or empty",
        ));
    }

    debug!(url, "fetching CRL");

    let lower = url.to_ascii_lowercase();

    let der = if let Some(path) = lower.strip_prefix("file://").map(|_| &url[7..]) {
        from_file(path)?
    } else if lower.starts_with("ldap://") {
        #[cfg(feature = "crl-ldap")]
        {
            from_ldap(url, ssl_trace)?
        }
        #[cfg(not(feature = "crl-ldap"))]
        {
            from_http(url, ssl_trace)?
        }
    } else {
        from_http(url, ssl_trace)?
    };

    Ok(CrlData {
        der,
        url: url.to_string(),
    })
}

fn from_file(path: &str) -> Result<CertificateRevocationListDer<'static>, SslErrorMessage> {
    let contents = std::fs::read(path).map_err(|e| {
        warn!(path, "can't open CRL file: {}", e);
        SslErrorMessage::with_description("Can't open CRL File", e.to_string())
    })?;

    debug!(path, "loading CRL");
    parse_payload(&contents)
}

#[cfg(feature = "crl-ldap")]
fn from_ldap(
    url: &str,
    ssl_trace: bool,
) -> Result<CertificateRevocationListDer<'static>, SslErrorMessage> {
    use ldap3::{LdapConn, Scope, SearchEntry};

    // ldap://[HOST]/[DN]?attribute
    let rest = &url["ldap://".len()..];
    let (host, dn_attr) = rest.split_once('/').ok_or_else(|| {
        SslErrorMessage::with_description(
            "No DN of the entry at which to start the search on the URL",
            "The URL argument should be in the format ldap://[HOST]/[DN]?attribute",
        )
    })?;
    let (base, attribute) = dn_attr.split_once('?').ok_or_else(|| {
        SslErrorMessage::with_description(
            "No LDAP attribute on the URL",
            "The URL argument should be in the format ldap://[HOST]/[DN]?attribute",
        )
    })?;

    debug!(host, base, attribute, "LDAP CRL query");

    let mut conn = LdapConn::new(&format!("ldap://{}", host)).map_err(|e| {
        warn!(url, "can't initialize LDAP: {}", e);
        SslErrorMessage::with_description("Can't initialize LDAP", e.to_string())
    })?;

    conn.simple_bind("", "")
        .and_then(|r| r.success())
        .map_err(|e| {
            warn!(url, "can't bind to LDAP server: {}", e);
            SslErrorMessage::with_description("Can't bind to LDAP server", e.to_string())
        })?;

    let (entries, _result) = conn
        .search(base, Scope::Base, "(objectClass=*)", vec![attribute])
        .and_then(|r| r.success())
        .map_err(|e| {
            warn!(url, "can't search LDAP server: {}", e);
            SslErrorMessage::with_description("Can't search LDAP server", e.to_string())
        })?;

    let _ = conn.unbind();

    let entry = entries.into_iter().next().ok_or_else(|| {
        SslErrorMessage::with_description(
            "Can't get LDAP attribute",
            "Search did not produce any attributes.",
        )
    })?;
    let entry = SearchEntry::construct(entry);

    let value = entry
        .bin_attrs
        .get(attribute)
        .and_then(|values| values.first().cloned())
        .or_else(|| {
            entry
                .attrs
                .get(attribute)
                .and_then(|values| values.first())
                .map(|value| value.clone().into_bytes())
        })
        .ok_or_else(|| {
            SslErrorMessage::with_description(
                "Can't get LDAP attribute",
                "Search did not produce any values.",
            )
        })?;

    if ssl_trace {
        trace_payload("CRL Data received from LDAP server", &value);
    }

    parse_payload(&value).map_err(|_| {
        warn!(url, "can't decode CRL got from LDAP search");
        SslErrorMessage::new("Can't decode CRL got from LDAP Search")
    })
}

#[cfg(feature = "crl-http")]
fn from_http(
    url: &str,
    ssl_trace: bool,
) -> Result<CertificateRevocationListDer<'static>, SslErrorMessage> {
    use std::io::Read;

    let client = reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| SslErrorMessage::with_description("Error loading CRL", e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(|e| {
            warn!(url, "CRL download failed: {}", e);
            SslErrorMessage::with_description("Error loading CRL", e.to_string())
        })?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());

    let mut body = CrlBuffer::new();
    let mut reader = response;
    let mut chunk = [0u8; 1024];
    loop {
        let n = reader.read(&mut chunk).map_err(|e| {
            SslErrorMessage::with_description("Error loading CRL", e.to_string())
        })?;
        if n == 0 {
            break;
        }
        if ssl_trace {
            trace_payload("Received", &chunk[..n]);
        }
        body.append(&chunk[..n]);
    }

    debug!(url, bytes = body.len(), "CRL data received");

    match content_type.as_deref() {
        Some(ct) if ct.eq_ignore_ascii_case("application/pkix-crl") => {
            parse_payload(body.as_slice()).map_err(|_| {
                warn!(url, "got an invalid CRL from server");
                SslErrorMessage::new("Got an invalid CRL from server")
            })
        }
        None if url.to_ascii_lowercase().starts_with("ldap://") => {
            let decoded = decode_ldap_framed(body.as_slice())?;
            parse_payload(&decoded)
                .map_err(|_| SslErrorMessage::new("Got an invalid CRL from server"))
        }
        other => {
            warn!(url, content_type = ?other, "content-type unexpected");
            Err(SslErrorMessage::with_description(
                "Got an invalid CRL from server",
                format!("content-type unexpected: {:?}", other),
            ))
        }
    }
}

#[cfg(not(feature = "crl-http"))]
fn from_http(
    url: &str,
    _ssl_trace: bool,
) -> Result<CertificateRevocationListDer<'static>, SslErrorMessage> {
    warn!(url, "no download backend for URL scheme");
    Err(SslErrorMessage::with_description(
        "Unexpected or invalid CRL URL",
        "The URL scheme is unknown",
    ))
}

/// Decode a base64-framed LDAP response: the payload follows a `":: "`
/// marker, base64-encoded, possibly wrapped over several lines.
#[cfg(feature = "crl-http")]
pub(crate) fn decode_ldap_framed(body: &[u8]) -> Result<Vec<u8>, SslErrorMessage> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let text = std::str::from_utf8(body).map_err(|_| {
        SslErrorMessage::new("Got an invalid CRL from LDAP server")
    })?;

    let (_, encoded) = text.split_once(":: ").ok_or_else(|| {
        warn!("LDAP response has no base64 payload marker");
        SslErrorMessage::new("Got an invalid CRL from LDAP server")
    })?;

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD
        .decode(compact)
        .map_err(|_| SslErrorMessage::new("Got an invalid CRL from LDAP server"))
}

/// Structural validation of a fetched payload. Accepts a PEM `X509 CRL`
/// block or raw DER; anything else is rejected so no corrupt CRL is ever
/// retained.
fn parse_payload(payload: &[u8]) -> Result<CertificateRevocationListDer<'static>, SslErrorMessage> {
    if payload.is_empty() {
        return Err(SslErrorMessage::new("Got an empty CRL from server"));
    }

    if payload.starts_with(b"-----BEGIN") {
        let mut reader = &payload[..];
        return rustls_pemfile::crls(&mut reader)
            .next()
            .and_then(|crl| crl.ok())
            .ok_or_else(|| SslErrorMessage::new("Got an invalid CRL from server"));
    }

    // DER: a CRL is an ASN.1 SEQUENCE.
    if payload[0] != 0x30 {
        return Err(SslErrorMessage::new("Got an invalid CRL from server"));
    }

    Ok(CertificateRevocationListDer::from(payload.to_vec()))
}

#[cfg(any(feature = "crl-http", feature = "crl-ldap"))]
fn trace_payload(label: &str, data: &[u8]) {
    tracing::trace!(target: "tn3270::ssl", label, bytes = data.len(), "{:02x?}", &data[..data.len().min(64)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal DER SEQUENCE framing, enough to pass structural validation.
    const FAKE_DER_CRL: &[u8] = &[0x30, 0x06, 0x30, 0x04, 0x02, 0x02, 0x01, 0x00];

    #[test]
    fn test_buffer_grows_by_fixed_increment() {
        let mut buffer = CrlBuffer::new();
        let chunk = [0xabu8; 1500];
        buffer.append(&chunk);
        buffer.append(&chunk);
        buffer.append(&chunk);
        assert_eq!(buffer.len(), 4500);
        assert!(buffer.as_slice().iter().all(|&b| b == 0xab));
    }

    #[test]
    fn test_missing_file_fails_with_os_error() {
        let err = download("file:///tmp/missing.crl", false).unwrap_err();
        assert_eq!(err.title, "Security error");
        assert_eq!(err.text, "Can't open CRL File");
        assert!(err.description.is_some());
    }

    #[test]
    fn test_file_fetch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.crl");
        std::fs::write(&path, FAKE_DER_CRL).unwrap();

        let url = format!("file://{}", path.display());
        let crl = download(&url, false).unwrap();
        assert_eq!(crl.url, url);
        assert_eq!(crl.der.as_ref(), FAKE_DER_CRL);
    }

    #[test]
    fn test_malformed_payload_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.crl");
        std::fs::write(&path, b"certainly not a CRL").unwrap();

        let url = format!("file://{}", path.display());
        assert!(download(&url, false).is_err());
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let err = download("", false).unwrap_err();
        assert_eq!(
            err.description.as_deref(),
            Some("The URL for the CRL is undefined or empty")
        );
    }

    #[cfg(feature = "crl-ldap")]
    #[test]
    fn test_ldap_url_without_dn_is_invalid() {
        let err = download("ldap://server.example", false).unwrap_err();
        assert_eq!(
            err.text,
            "No DN of the entry at which to start the search on the URL"
        );

        let err = download("ldap://server.example/cn=crl,o=bank", false).unwrap_err();
        assert_eq!(err.text, "No LDAP attribute on the URL");
    }

    #[cfg(feature = "crl-http")]
    #[test]
    fn test_decode_ldap_framed_payload() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let encoded = STANDARD.encode(FAKE_DER_CRL);
        let body = format!("certificateRevocationList:: {}\n", encoded);
        let decoded = decode_ldap_framed(body.as_bytes()).unwrap();
        assert_eq!(decoded, FAKE_DER_CRL);

        // Line-wrapped payload decodes the same.
        let (head, tail) = encoded.split_at(4);
        let wrapped = format!("certificateRevocationList:: {}\n {}\n", head, tail);
        assert_eq!(decode_ldap_framed(wrapped.as_bytes()).unwrap(), FAKE_DER_CRL);
    }

    #[cfg(feature = "crl-http")]
    #[test]
    fn test_decode_ldap_framed_requires_marker() {
        assert!(decode_ldap_framed(b"no marker here").is_err());
    }

    /// One-shot HTTP server on a loopback port, answering the first
    /// request with the given content type and body.
    #[cfg(feature = "crl-http")]
    fn serve_once(content_type: Option<&'static str>, body: &'static [u8]) -> String {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let mut response = format!(
                "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: {}\r\n",
                body.len()
            );
            if let Some(value) = content_type {
                response.push_str(&format!("Content-Type: {}\r\n", value));
            }
            response.push_str("\r\n");
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.write_all(body);
        });
        format!("http://{}/revocation.crl", address)
    }

    #[cfg(feature = "crl-http")]
    #[test]
    fn test_http_pkix_content_type_is_accepted() {
        let url = serve_once(Some("application/pkix-crl"), FAKE_DER_CRL);
        let crl = download(&url, false).unwrap();
        assert_eq!(crl.url, url);
        assert_eq!(crl.der.as_ref(), FAKE_DER_CRL);

        // Content-type parameters do not matter for the dispatch.
        let url = serve_once(Some("application/pkix-crl; charset=binary"), FAKE_DER_CRL);
        assert!(download(&url, false).is_ok());
    }

    #[cfg(feature = "crl-http")]
    #[test]
    fn test_http_unexpected_content_type_is_rejected() {
        let url = serve_once(Some("text/html"), b"<html>not a CRL</html>");
        let err = download(&url, false).unwrap_err();
        assert_eq!(err.text, "Got an invalid CRL from server");
        assert!(err.description.unwrap().contains("text/html"));
    }

    #[cfg(feature = "crl-http")]
    #[test]
    fn test_http_missing_content_type_is_rejected() {
        // Without a content type the body is not trusted, even when it
        // would parse as a CRL.
        let url = serve_once(None, FAKE_DER_CRL);
        let err = download(&url, false).unwrap_err();
        assert_eq!(err.text, "Got an invalid CRL from server");
    }

    #[cfg(feature = "crl-http")]
    #[test]
    fn test_pem_payload_is_accepted() {
        use std::fmt::Write;

        // PEM framing around the fake DER body.
        let mut pem = String::from("-----BEGIN X509 CRL-----\n");
        {
            use base64::engine::general_purpose::STANDARD;
            use base64::Engine;
            let _ = writeln!(pem, "{}", STANDARD.encode(FAKE_DER_CRL));
        }
        pem.push_str("-----END X509 CRL-----\n");

        let parsed = parse_payload(pem.as_bytes()).unwrap();
        assert_eq!(parsed.as_ref(), FAKE_DER_CRL);
    }
}
