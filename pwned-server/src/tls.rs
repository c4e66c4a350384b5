use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsPaths;
use crate::error::Error;

fn pem_error(path: &Path) -> impl FnOnce(rustls::pki_types::pem::Error) -> Error + '_ {
    move |source| Error::TlsPem { path: path.to_path_buf(), source }
}

/// Builds a TLS acceptor from a PEM certificate chain and private key. HTTP/1.1 only.
pub fn load_acceptor(paths: &TlsPaths) -> Result<TlsAcceptor, Error> {
    let certs = CertificateDer::pem_file_iter(&paths.cert)
        .map_err(pem_error(&paths.cert))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error(&paths.cert))?;
    if certs.is_empty() {
        return Err(Error::Config("TLS certificate file contains no certificates"));
    }
    let key = PrivateKeyDer::from_pem_file(&paths.key).map_err(pem_error(&paths.key))?;
    acceptor(certs, key)
}

/// Subject names of the generated certificate.
pub const SELF_SIGNED_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

/// Generates a self-signed certificate for `names` and builds an acceptor from it. The
/// certificate is returned so that clients can be told to trust it.
pub fn self_signed_acceptor(
    names: &[&str],
) -> Result<(TlsAcceptor, CertificateDer<'static>), Error> {
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(
        names.iter().map(|name| name.to_string()).collect::<Vec<_>>(),
    )?;
    let cert = cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    Ok((acceptor(vec![cert.clone()], key)?, cert))
}

fn acceptor(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TlsPaths { cert: dir.path().join("cert.pem"), key: dir.path().join("key.pem") };
        assert!(matches!(load_acceptor(&paths), Err(Error::TlsPem { .. })));

        fs::write(&paths.cert, "").unwrap();
        fs::write(&paths.key, "").unwrap();
        assert!(matches!(load_acceptor(&paths), Err(Error::Config(_))));
    }

    #[test]
    fn test_self_signed_certificate_loads_from_pem() {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let paths = TlsPaths { cert: dir.path().join("cert.pem"), key: dir.path().join("key.pem") };
        fs::write(&paths.cert, cert.pem()).unwrap();
        fs::write(&paths.key, key_pair.serialize_pem()).unwrap();
        assert!(load_acceptor(&paths).is_ok());

        // certificate and key swapped
        let swapped = TlsPaths { cert: paths.key.clone(), key: paths.cert.clone() };
        assert!(load_acceptor(&swapped).is_err());
    }
}
