//! Probe semantics: tcp, http, https.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::crd::Protocol;

#[derive(Debug)]
pub struct ProbeFailed(pub String);

impl std::fmt::Display for ProbeFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ProbeFailed {}

/// Runs one probe to completion (or failure). The caller is responsible for
/// applying `timeout` via `tokio::time::timeout` — a probe that is
/// abandoned on expiry counts as `down` exactly like a probe that
/// completes with an error.
pub async fn run(
    protocol: Protocol,
    address: Ipv4Addr,
    port: u16,
    path: &str,
) -> Result<(), ProbeFailed> {
    match protocol {
        Protocol::Tcp => tcp_probe(address, port).await,
        Protocol::Http => http_probe(address, port, path, false).await,
        Protocol::Https => http_probe(address, port, path, true).await,
    }
}

async fn tcp_probe(address: Ipv4Addr, port: u16) -> Result<(), ProbeFailed> {
    tokio::net::TcpStream::connect((address, port))
        .await
        .map(|_| ())
        .map_err(|e| ProbeFailed(format!("tcp connect failed: {e}")))
}

async fn http_probe(address: Ipv4Addr, port: u16, path: &str, tls: bool) -> Result<(), ProbeFailed> {
    let client = build_client(tls).map_err(|e| ProbeFailed(format!("client build failed: {e}")))?;
    let scheme = if tls { "https" } else { "http" };
    let url = format!("{scheme}://{address}:{port}{path}");

    let response = client
        .get(&url)
        .header(reqwest::header::HOST, address.to_string())
        .send()
        .await
        .map_err(|e| ProbeFailed(format!("request failed: {e}")))?;

    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(ProbeFailed(format!("status {status} not in [200, 300)")))
    }
}

/// Builds a client with no redirect-following and, for https, TLS that
/// accepts any server certificate: the certificate is not validated against
/// a hostname, only the TLS handshake itself must succeed. Targets are IPs,
/// often with self-signed certificates.
fn build_client(tls: bool) -> reqwest::Result<reqwest::Client> {
    let builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
    if tls {
        builder
            .use_preconfigured_tls(insecure_tls_config())
            .build()
    } else {
        builder.build()
    }
}

fn insecure_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        .with_no_client_auth()
}

/// Accepts every certificate presented by the server. Grounded on the
/// `rustls` `dangerous_configuration` pattern used for IP-addressed load
/// balancers with self-signed certificates, matching the probe semantics
/// this control plane targets.
struct NoCertificateVerification;

impl rustls::client::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
