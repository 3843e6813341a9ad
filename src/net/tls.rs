//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Load TLS configuration from certificate and key files.
///
/// Both files are parsed up front so a bad PEM fails startup with a clear
/// message instead of failing the first handshake.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, io::Error> {
    validate_pem(cert_path, key_path)?;
    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Check that the certificate chain and private key are present and parse.
pub fn validate_pem(cert_path: &Path, key_path: &Path) -> Result<(), io::Error> {
    let mut certs = BufReader::new(open(cert_path, "Certificate")?);
    let chain = rustls_pemfile::certs(&mut certs).collect::<Result<Vec<_>, _>>()?;
    if chain.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No certificates found in {:?}", cert_path),
        ));
    }

    let mut key = BufReader::new(open(key_path, "Private key")?);
    if rustls_pemfile::private_key(&mut key)?.is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No private key found in {:?}", key_path),
        ));
    }

    tracing::debug!(certificates = chain.len(), "TLS material validated");
    Ok(())
}

fn open(path: &Path, what: &str) -> Result<File, io::Error> {
    File::open(path).map_err(|e| io::Error::new(e.kind(), format!("{} file {:?}: {}", what, path, e)))
}
