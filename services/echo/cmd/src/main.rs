//! Single-shot mutual-TLS echo client.
//!
//! Resolves the server, connects to the first reachable endpoint, completes a
//! client-authenticated TLS handshake, sends one line read from stdin and
//! prints the reply.

use anyhow::Context;
use clap::Parser;
use echo_session::{
    make_client_config, resolve, server_name, CertificateConfig, Credentials, Reply, Session,
    SessionConfig, SessionError, TcpDialer, MAX_LENGTH,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

mod config;
mod logging;

use config::EchoConfig;

/// Send one line over mutual TLS and print the reply
#[derive(Parser, Debug)]
#[command(name = "tls-echo", version, about = "Send one line over mutual TLS and print the reply")]
struct Args {
    /// Server host name or address
    host: String,

    /// Server port
    port: u16,

    /// Folder holding the client certificate chain, private key and DH parameters
    cert_folder: PathBuf,

    /// CA certificate file used to verify the server (PEM format)
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Name to verify the server certificate against, defaults to <HOST>
    #[arg(long)]
    sni: Option<String>,

    /// Per-endpoint connect timeout, e.g. 5s
    #[arg(long)]
    connect_timeout: Option<humantime::Duration>,

    /// TLS handshake timeout, e.g. 5s
    #[arg(long)]
    handshake_timeout: Option<humantime::Duration>,

    /// Timeout for each of the write and the read, e.g. 5s
    #[arg(long)]
    io_timeout: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "tls-echo.yaml")]
    config: PathBuf,
}

fn pick_timeout(flag: Option<humantime::Duration>, configured: Duration) -> Duration {
    flag.map(Into::into).unwrap_or(configured)
}

/// Print the outcome of a session to `output`.
///
/// Stage failures on the network path are reported with their cause chain and
/// end the run normally; anything else is returned to the caller.
async fn report<W>(result: Result<Reply, SessionError>, output: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match result {
        Ok(reply) => {
            output.write_all(b"Reply: ").await?;
            output.write_all(&reply.bytes).await?;
            output.write_all(b"\n").await?;
        }
        Err(e) if e.is_exchange_failure() => {
            let e = anyhow::Error::new(e);
            output.write_all(format!("{:#}\n", e).as_bytes()).await?;
        }
        Err(e) => return Err(e.into()),
    }
    output.flush().await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init("echo", &args.log_level)?;
    info!("Starting tls-echo v{}", env!("CARGO_PKG_VERSION"));

    let echo_config = EchoConfig::load_from_file(&args.config)?;

    let ca_file = args
        .ca_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&echo_config.tls.ca_file));
    let sni = args.sni.clone().or_else(|| echo_config.tls.server_name.clone());
    let connect_timeout = pick_timeout(args.connect_timeout, echo_config.timeouts.connect()?);
    let session_config = SessionConfig {
        handshake_timeout: pick_timeout(args.handshake_timeout, echo_config.timeouts.handshake()?),
        io_timeout: pick_timeout(args.io_timeout, echo_config.timeouts.io()?),
        max_length: MAX_LENGTH,
    };

    // Credentials are loaded before any endpoint is dialed
    let certificate_config = CertificateConfig::with_file_names(
        &args.cert_folder,
        ca_file,
        &echo_config.tls.cert_file,
        &echo_config.tls.key_file,
        &echo_config.tls.dh_file,
    );
    let credentials =
        Credentials::load(&certificate_config).context("Failed to load TLS credentials")?;
    let client_config = make_client_config(credentials)?;
    let server_name = server_name(&args.host, sni.as_deref())?;

    let endpoints = resolve(&args.host, args.port).await?;
    info!(
        "Resolved {}:{} to {} endpoint(s)",
        args.host,
        args.port,
        endpoints.len()
    );

    let session = Session::new(
        session_config,
        Arc::new(client_config),
        TcpDialer::new(connect_timeout),
    );

    let mut input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();

    let result = session.run(endpoints, server_name, &mut input, &mut output).await;
    report(result, &mut output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use std::io;

    #[test]
    fn test_args_require_cert_folder() {
        let err = Args::try_parse_from(["tls-echo", "localhost", "443"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_args_port_must_be_numeric() {
        let err = Args::try_parse_from(["tls-echo", "localhost", "https", "certs"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_args_with_options() {
        let args = Args::try_parse_from([
            "tls-echo",
            "localhost",
            "8443",
            "certs",
            "--sni",
            "echo.internal",
            "--connect-timeout",
            "2s",
        ])
        .unwrap();

        assert_eq!(args.port, 8443);
        assert_eq!(args.cert_folder, PathBuf::from("certs"));
        assert_eq!(args.sni.as_deref(), Some("echo.internal"));
        assert_eq!(
            pick_timeout(args.connect_timeout, Duration::from_secs(10)),
            Duration::from_secs(2)
        );
        assert_eq!(
            pick_timeout(args.io_timeout, Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_report_reply() {
        let reply = Reply {
            endpoint: "127.0.0.1:8443".parse().unwrap(),
            bytes: b"hello".to_vec(),
        };
        let mut output = Vec::new();

        report(Ok(reply), &mut output).await.unwrap();
        assert_eq!(output, b"Reply: hello\n");
    }

    #[tokio::test]
    async fn test_report_stage_failure_prints_cause() {
        let err = SessionError::Connect {
            attempts: 2,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
        };
        let mut output = Vec::new();

        report(Err(err), &mut output).await.unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "connect failed after 2 attempt(s): connection refused\n"
        );
    }

    #[tokio::test]
    async fn test_report_config_error_is_returned() {
        let mut output = Vec::new();

        let err = report(Err(SessionError::ServerName("bad name".to_string())), &mut output)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("configuration error"));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_report_resolve_error_is_returned() {
        let err = SessionError::NoEndpoints("localhost".to_string());
        let mut output = Vec::new();

        let result = report(Err(err), &mut output).await;
        assert!(result.is_err());
        assert!(output.is_empty());
    }
}
