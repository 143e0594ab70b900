//! Fixtures and a mutual-TLS echo responder for tests.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::tls::{CertificateConfig, DEFAULT_CA_FILE};

/// Path of a file under `testdata/`
pub(crate) fn fixture(name: &str) -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata")).join(name)
}

/// Client credentials signed by the test CA
pub(crate) fn client_certificate_config() -> CertificateConfig {
    let config = CertificateConfig::from_folder(fixture("client"), DEFAULT_CA_FILE);
    CertificateConfig {
        ca_file: fixture("ca.crt"),
        ..config
    }
}

fn read_certs(name: &str) -> Vec<CertificateDer<'static>> {
    let pem = std::fs::read(fixture(name)).unwrap();
    rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn read_key(name: &str) -> PrivateKeyDer<'static> {
    let pem = std::fs::read(fixture(name)).unwrap();
    rustls_pemfile::private_key(&mut pem.as_slice())
        .unwrap()
        .unwrap()
}

/// Server configuration that requires a client certificate from the test CA
pub(crate) fn make_server_config(cert_file: &str, key_file: &str) -> ServerConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    for ca_cert in read_certs("ca.crt") {
        roots.add(ca_cert).unwrap();
    }

    let client_verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .unwrap();

    ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(read_certs(cert_file), read_key(key_file))
        .unwrap()
}

/// Spawn a responder that echoes every byte back on each accepted connection
pub(crate) async fn spawn_echo_server(cert_file: &str, key_file: &str) -> SocketAddr {
    let acceptor = TlsAcceptor::from(Arc::new(make_server_config(cert_file, key_file)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((tcp_stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut stream) = acceptor.accept(tcp_stream).await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                            let _ = stream.flush().await;
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Address that refuses connections
pub(crate) async fn closed_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
