//! Client credentials and the mutual-TLS handshake.
//!
//! Every credential file is read and parsed up front by
//! [`Credentials::load`], so a broken credential folder is reported as a
//! configuration error before any endpoint is dialed.
//!
//! The client configuration only enables TLS 1.2 and TLS 1.3, trusts nothing
//! but the configured CA file, and always requires the server to present a
//! certificate that chains to it.

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::error::{timed_out, SessionError, Stage};

/// Default CA trust file, relative to the working directory
pub const DEFAULT_CA_FILE: &str = "certs/server.crt";
/// Default certificate chain file name inside the credential folder
pub const DEFAULT_CERT_FILE: &str = "server.crt";
/// Default private key file name inside the credential folder
pub const DEFAULT_KEY_FILE: &str = "server.key";
/// Default DH parameters file name inside the credential folder
pub const DEFAULT_DH_FILE: &str = "dh512.pem";

const DH_PARAMS_LABEL: &str = "DH PARAMETERS";

/// Locations of every file the handshake needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateConfig {
    /// CA certificates used to verify the server
    pub ca_file: PathBuf,
    /// Client certificate chain (PEM)
    pub cert_chain_file: PathBuf,
    /// Client private key (PEM; PKCS#8, PKCS#1 or SEC1)
    pub private_key_file: PathBuf,
    /// Diffie-Hellman parameters (PEM)
    pub dh_params_file: PathBuf,
}

impl CertificateConfig {
    /// Credential folder with the default file names
    pub fn from_folder(folder: impl AsRef<Path>, ca_file: impl Into<PathBuf>) -> Self {
        Self::with_file_names(
            folder,
            ca_file,
            DEFAULT_CERT_FILE,
            DEFAULT_KEY_FILE,
            DEFAULT_DH_FILE,
        )
    }

    /// Credential folder with explicit file names
    pub fn with_file_names(
        folder: impl AsRef<Path>,
        ca_file: impl Into<PathBuf>,
        cert_file: &str,
        key_file: &str,
        dh_file: &str,
    ) -> Self {
        let folder = folder.as_ref();
        Self {
            ca_file: ca_file.into(),
            cert_chain_file: folder.join(cert_file),
            private_key_file: folder.join(key_file),
            dh_params_file: folder.join(dh_file),
        }
    }
}

/// Parsed credentials, ready to build a client configuration
pub struct Credentials {
    roots: RootCertStore,
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
    dh_params: Vec<u8>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("roots", &self.roots.len())
            .field("cert_chain", &self.cert_chain.len())
            .field("dh_params", &self.dh_params.len())
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read and parse every file named by `config`
    pub fn load(config: &CertificateConfig) -> Result<Self, SessionError> {
        info!(
            component = "tls",
            "Loading credentials from ca={:?}, cert={:?}, key={:?}, dh={:?}",
            config.ca_file,
            config.cert_chain_file,
            config.private_key_file,
            config.dh_params_file
        );

        let roots = load_roots(&config.ca_file)?;
        let cert_chain = load_certs("certificate chain", &config.cert_chain_file)?;
        let private_key = load_private_key(&config.private_key_file)?;
        let dh_params = load_dh_params(&config.dh_params_file)?;

        debug!(
            component = "tls",
            "Loaded {} trust root(s), {} chain certificate(s), {} bytes of DH parameters",
            roots.len(),
            cert_chain.len(),
            dh_params.len()
        );

        Ok(Self {
            roots,
            cert_chain,
            private_key,
            dh_params,
        })
    }

    /// DER contents of the DH parameters block
    pub fn dh_params(&self) -> &[u8] {
        &self.dh_params
    }

    /// Number of trusted CA certificates
    pub fn trust_root_count(&self) -> usize {
        self.roots.len()
    }
}

/// Build the mutual-TLS client configuration
///
/// Key exchange is always ephemeral (ECDHE), negotiated fresh for each
/// handshake; the DH parameters file is only validated.
pub fn make_client_config(credentials: Credentials) -> Result<ClientConfig, SessionError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_root_certificates(credentials.roots)
        .with_client_auth_cert(credentials.cert_chain, credentials.private_key)?;

    info!(component = "tls", "TLS client configuration created");
    Ok(config)
}

/// Name the server certificate must be valid for
pub fn server_name(host: &str, sni: Option<&str>) -> Result<ServerName<'static>, SessionError> {
    let name = sni.unwrap_or(host);
    ServerName::try_from(name.to_owned()).map_err(|_| SessionError::ServerName(name.to_owned()))
}

/// Run the client handshake over a connected transport
pub async fn handshake<S>(
    connector: &TlsConnector,
    server_name: ServerName<'static>,
    stream: S,
    timeout: Duration,
) -> io::Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tls_stream = tokio::time::timeout(timeout, connector.connect(server_name, stream))
        .await
        .map_err(|_| timed_out(Stage::Handshake, timeout))??;

    let (_, connection) = tls_stream.get_ref();
    debug!(
        component = "tls",
        "Handshake complete: protocol={:?}, cipher={:?}, peer={}",
        connection.protocol_version(),
        connection.negotiated_cipher_suite().map(|suite| suite.suite()),
        peer_subject(connection).unwrap_or_else(|| "unknown".to_string())
    );
    Ok(tls_stream)
}

/// Subject of the certificate the server presented
pub fn peer_subject(connection: &rustls::ClientConnection) -> Option<String> {
    let cert = connection.peer_certificates()?.first()?;
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
    Some(parsed.subject().to_string())
}

fn read_file(kind: &'static str, path: &Path) -> Result<Vec<u8>, SessionError> {
    std::fs::read(path).map_err(|source| SessionError::ConfigRead {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(kind: &'static str, path: &Path, reason: impl Into<String>) -> SessionError {
    SessionError::ConfigInvalid {
        kind,
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn load_certs(
    kind: &'static str,
    path: &Path,
) -> Result<Vec<CertificateDer<'static>>, SessionError> {
    let pem = read_file(kind, path)?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(kind, path, e.to_string()))?;

    if certs.is_empty() {
        return Err(invalid(kind, path, "no certificates found"));
    }
    Ok(certs)
}

fn load_roots(path: &Path) -> Result<RootCertStore, SessionError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs("CA", path)? {
        roots
            .add(cert)
            .map_err(|e| invalid("CA", path, e.to_string()))?;
    }
    Ok(roots)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, SessionError> {
    let pem = read_file("private key", path)?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| invalid("private key", path, e.to_string()))?
        .ok_or_else(|| invalid("private key", path, "no private key found"))
}

fn load_dh_params(path: &Path) -> Result<Vec<u8>, SessionError> {
    let pem = read_file("DH parameters", path)?;
    let (_, block) = x509_parser::pem::parse_x509_pem(&pem)
        .map_err(|e| invalid("DH parameters", path, format!("{:?}", e)))?;

    if block.label != DH_PARAMS_LABEL {
        return Err(invalid(
            "DH parameters",
            path,
            format!("expected {} block, found {}", DH_PARAMS_LABEL, block.label),
        ));
    }
    if block.contents.is_empty() {
        return Err(invalid("DH parameters", path, "empty parameters block"));
    }
    Ok(block.contents)
}
