//! Process-wide TLS context
//!
//! One TLS context serves every session in the process. It is created
//! lazily on first use and never recreated once it exists; concurrent
//! first callers race on a single lock, so exactly one of them builds it.
//! Installing a CRL is an append-only enrichment: it flags strict
//! revocation checking on every client configuration built afterwards.

#[cfg(feature = "crl-check")]
pub mod crl;

use std::io::BufReader;
use std::sync::Arc;

use parking_lot::Mutex;
use rustls::pki_types::CertificateRevocationListDer;
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use crate::core::callbacks::{NotifySeverity, PopupNotification};
use crate::error::SslErrorMessage;
use crate::util;

/// TLS state of a session, reported through the `update_ssl` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslState {
    /// No TLS on this connection
    Unsecure,
    /// Handshake in progress
    Negotiating,
    /// Handshake complete, peer verified
    Secure,
    /// Handshake or verification failed
    Invalid,
}

/// A fetched revocation list bound to the URL it came from.
#[derive(Debug, Clone)]
pub struct CrlData {
    /// DER-encoded CRL
    pub der: CertificateRevocationListDer<'static>,
    /// Originating URL
    pub url: String,
}

struct SslContext {
    roots: RootCertStore,
    crls: Vec<CertificateRevocationListDer<'static>>,
    crl_check: bool,
    /// Cached config, invalidated whenever a CRL is installed
    config: Option<Arc<ClientConfig>>,
}

type InfoCallback = Arc<dyn Fn(&PopupNotification) + Send + Sync>;

static CONTEXT: Mutex<Option<SslContext>> = Mutex::new(None);
static INFO_CALLBACK: Mutex<Option<InfoCallback>> = Mutex::new(None);

/// Install the informational callback the context uses for non-fatal
/// security notices (for example an unreadable extra-certificates
/// directory). Defaults to a `tracing` warning.
pub fn set_info_callback(callback: impl Fn(&PopupNotification) + Send + Sync + 'static) {
    *INFO_CALLBACK.lock() = Some(Arc::new(callback));
}

fn notify(notification: PopupNotification) {
    let callback = INFO_CALLBACK.lock().clone();
    match callback {
        Some(callback) => callback(&notification),
        None => warn!(title = %notification.title, "{}", notification.summary),
    }
}

/// Initialize the process TLS context. Idempotent: returns immediately
/// when the context already exists. A construction failure is fatal to
/// any subsequent TLS use in the process.
pub fn init_context() -> Result<(), SslErrorMessage> {
    let mut guard = CONTEXT.lock();
    if guard.is_some() {
        return Ok(());
    }

    debug!("initializing TLS context");

    // Pin the process-wide crypto provider so config builders never
    // have to guess between enabled backends.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if roots.is_empty() {
        return Err(SslErrorMessage::new("Can't initialize the TLS context"));
    }

    load_extra_certificates(&mut roots);

    *guard = Some(SslContext {
        roots,
        crls: Vec::new(),
        crl_check: false,
        config: None,
    });

    Ok(())
}

/// Add certificates from the application-relative `certs` directory, when
/// one exists. Failures here are reported but never fatal.
fn load_extra_certificates(roots: &mut RootCertStore) {
    let certpath = util::build_filename("certs");
    if !certpath.is_dir() {
        return;
    }

    debug!(path = %certpath.display(), "searching extra certs");

    let entries = match std::fs::read_dir(&certpath) {
        Ok(entries) => entries,
        Err(e) => {
            notify(PopupNotification {
                severity: NotifySeverity::Warning,
                title: "Security error".to_string(),
                summary: format!("Can't read SSL certificates from \"{}\"", certpath.display()),
                body: e.to_string(),
            });
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_pem = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pem") || ext.eq_ignore_ascii_case("crt"))
            .unwrap_or(false);
        if !is_pem {
            continue;
        }

        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                notify(PopupNotification {
                    severity: NotifySeverity::Warning,
                    title: "Security error".to_string(),
                    summary: format!("Can't read SSL certificates from \"{}\"", path.display()),
                    body: e.to_string(),
                });
                continue;
            }
        };

        let mut reader = BufReader::new(file);
        for cert in rustls_pemfile::certs(&mut reader).flatten() {
            let _ = roots.add(cert);
        }
    }
}

/// Install a fetched CRL into the shared trust store and flag strict
/// revocation checking. One-time enrichment per fetched CRL.
pub fn apply_crl(crl: &CrlData) -> Result<(), SslErrorMessage> {
    let mut guard = CONTEXT.lock();
    let context = guard
        .as_mut()
        .ok_or_else(|| SslErrorMessage::new("TLS context is not initialized"))?;

    context.crls.push(crl.der.clone());
    context.crl_check = true;
    context.config = None;

    debug!(url = %crl.url, "CRL was added to cert store");
    Ok(())
}

/// True when at least one CRL has been installed and strict checking is
/// flagged on the verification parameters.
pub fn crl_check_enabled() -> bool {
    CONTEXT
        .lock()
        .as_ref()
        .map(|context| context.crl_check)
        .unwrap_or(false)
}

/// Number of CRLs currently installed in the shared trust store.
pub fn installed_crl_count() -> usize {
    CONTEXT
        .lock()
        .as_ref()
        .map(|context| context.crls.len())
        .unwrap_or(0)
}

/// Build (or reuse) the client configuration for new TLS sessions.
pub fn client_config() -> Result<Arc<ClientConfig>, SslErrorMessage> {
    let mut guard = CONTEXT.lock();
    let context = guard
        .as_mut()
        .ok_or_else(|| SslErrorMessage::new("TLS context is not initialized"))?;

    if let Some(config) = &context.config {
        return Ok(config.clone());
    }

    let config = if context.crl_check && !context.crls.is_empty() {
        let verifier =
            rustls::client::WebPkiServerVerifier::builder(Arc::new(context.roots.clone()))
                .with_crls(context.crls.iter().cloned())
                .build()
                .map_err(|e| {
                    SslErrorMessage::with_description(
                        "Can't enable CRL verification",
                        e.to_string(),
                    )
                })?;

        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .with_root_certificates(context.roots.clone())
            .with_no_client_auth()
    };

    let config = Arc::new(config);
    context.config = Some(config.clone());
    Ok(config)
}

/// Drop the process context so tests can exercise first-initialization.
#[doc(hidden)]
pub fn reset_context() {
    *CONTEXT.lock() = None;
    *INFO_CALLBACK.lock() = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_init_is_idempotent_and_concurrent() {
        let _guard = crate::test_lock();
        reset_context();

        let successes = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let successes = successes.clone();
            handles.push(std::thread::spawn(move || {
                if init_context().is_ok() {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every caller observed success against the single context.
        assert_eq!(successes.load(Ordering::SeqCst), 8);
        assert!(CONTEXT.lock().is_some());

        reset_context();
        assert!(CONTEXT.lock().is_none());
    }

    #[test]
    fn test_config_requires_init() {
        let _guard = crate::test_lock();
        reset_context();
        assert!(client_config().is_err());
        init_context().unwrap();
        assert!(client_config().is_ok());
        reset_context();
    }
}
