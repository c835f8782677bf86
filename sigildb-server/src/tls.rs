//! TLS configuration loading.

use crate::config::TlsConfig;
use crate::error::ServerError;
use crate::stream::MaybeTlsStream;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConnection, StreamOwned};
use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

/// Loads TLS certificates and builds the rustls server configuration.
pub fn create_server_config(config: &TlsConfig) -> Result<Arc<rustls::ServerConfig>, ServerError> {
    // Validate configuration before loading files
    let cert_path = config
        .cert_path
        .as_ref()
        .ok_or_else(|| ServerError::TlsConfig("cert_path not set".into()))?;
    let key_path = config
        .key_path
        .as_ref()
        .ok_or_else(|| ServerError::TlsConfig("key_path not set".into()))?;

    // Check mTLS config early
    if config.require_client_cert && config.client_ca_path.is_none() {
        return Err(ServerError::TlsConfig(
            "client_ca_path not set for mTLS".into(),
        ));
    }

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let server_config = if config.require_client_cert {
        // mTLS: require and verify client certificates
        let client_ca_path = config.client_ca_path.as_ref().expect("already validated");

        let client_certs = load_certs(client_ca_path)?;
        let mut root_store = RootCertStore::empty();
        for cert in client_certs {
            root_store
                .add(cert)
                .map_err(|e| ServerError::TlsConfig(format!("invalid client CA cert: {}", e)))?;
        }

        let client_verifier = WebPkiClientVerifier::builder(Arc::new(root_store))
            .build()
            .map_err(|e| {
                ServerError::TlsConfig(format!("failed to build client verifier: {}", e))
            })?;

        rustls::ServerConfig::builder()
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::TlsConfig(format!("invalid server cert/key: {}", e)))?
    } else {
        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::TlsConfig(format!("invalid server cert/key: {}", e)))?
    };

    Ok(Arc::new(server_config))
}

/// Wraps an accepted TCP stream in a server-side TLS session. The
/// handshake completes lazily on first read or write.
pub fn accept(
    config: Arc<rustls::ServerConfig>,
    stream: TcpStream,
) -> Result<MaybeTlsStream, ServerError> {
    let connection = ServerConnection::new(config)
        .map_err(|e| ServerError::TlsHandshake(e.to_string()))?;
    Ok(MaybeTlsStream::Tls(Box::new(StreamOwned::new(
        connection, stream,
    ))))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsConfig(format!("cannot open key file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| ServerError::TlsConfig(format!("invalid key file {:?}: {}", path, e)))?
        {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            None => {
                return Err(ServerError::TlsConfig(format!(
                    "no private key found in {:?}",
                    path
                )))
            }
            _ => continue, // Skip other PEM items (certs, etc.)
        }
    }
}
