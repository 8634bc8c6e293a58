//! End-to-end probes against a local HTTPS server.
//!
//! A throwaway CA signs a leaf certificate for 127.0.0.1; the server
//! answers every request with a fixed status code.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hostwatch_probe::trust::{client_config, system_roots};
use hostwatch_probe::*;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, SanType};
use rustls::RootCertStore;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

struct TestPki {
    ca_pem: String,
    ca_der: rustls::pki_types::CertificateDer<'static>,
    server_config: Arc<rustls::ServerConfig>,
}

fn test_pki() -> TestPki {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "hostwatch test CA");
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let mut leaf_params = CertificateParams::default();
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, "127.0.0.1");
    leaf_params.subject_alt_names = vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
    let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

    let server_config = rustls::ServerConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(
        vec![leaf_cert.der().clone()],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der())),
    )
    .unwrap();

    TestPki {
        ca_pem: ca_cert.pem(),
        ca_der: ca_cert.der().clone(),
        server_config: Arc::new(server_config),
    }
}

/// Serve HTTPS on 127.0.0.1, answering every request with `status`.
async fn spawn_https(pki: &TestPki, status: u16) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(Arc::clone(&pki.server_config));

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(tcp).await else {
                    return;
                };
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status} Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = tls.write_all(response.as_bytes()).await;
                let _ = tls.shutdown().await;
            });
        }
    });

    addr
}

fn config(http_stage: HttpStage) -> ProbeConfig {
    ProbeConfig {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        http_stage,
        ..ProbeConfig::default()
    }
}

fn trusting_prober(pki: &TestPki, http_stage: HttpStage) -> Prober {
    let mut roots = RootCertStore::empty();
    roots.add(pki.ca_der.clone()).unwrap();
    Prober::with_tls_config(config(http_stage), client_config(roots).unwrap())
}

#[tokio::test]
async fn trusted_server_is_reachable() {
    let pki = test_pki();
    let addr = spawn_https(&pki, 200).await;
    let prober = trusting_prober(&pki, HttpStage::Always);

    let result = prober
        .probe(&ProbeTarget::new("127.0.0.1", addr.port()), "/healthz")
        .await;

    assert!(result.reachable, "{:?}", result.failure_reason);
    assert_eq!(result.status_code, 200);
    assert!(result.failure_reason.is_none());
    assert!(result.tls_handshake > Duration::ZERO);
    assert!(result.http_round_trip > Duration::ZERO);
}

#[tokio::test]
async fn redirect_counts_as_reachable() {
    let pki = test_pki();
    let addr = spawn_https(&pki, 302).await;
    let prober = trusting_prober(&pki, HttpStage::Always);

    let result = prober
        .probe(&ProbeTarget::new("127.0.0.1", addr.port()), "")
        .await;

    assert!(result.reachable);
    assert_eq!(result.status_code, 302);
}

#[tokio::test]
async fn server_error_is_http_failure() {
    let pki = test_pki();
    let addr = spawn_https(&pki, 503).await;
    let prober = trusting_prober(&pki, HttpStage::Always);

    let result = prober
        .probe(&ProbeTarget::new("127.0.0.1", addr.port()), "/")
        .await;

    assert!(!result.reachable);
    assert_eq!(result.status_code, 503);
    assert_eq!(
        result.error().map(ProbeError::kind),
        Some(FailureKind::Http)
    );
}

#[tokio::test]
async fn untrusted_certificate_is_tls_failure() {
    let pki = test_pki();
    let addr = spawn_https(&pki, 200).await;
    let prober = Prober::with_tls_config(
        config(HttpStage::Always),
        client_config(system_roots()).unwrap(),
    );

    let result = prober
        .probe(&ProbeTarget::new("127.0.0.1", addr.port()), "/")
        .await;

    assert!(!result.reachable);
    assert_eq!(result.error().map(ProbeError::kind), Some(FailureKind::Tls));
    assert_eq!(result.http_round_trip, Duration::ZERO);
    assert_eq!(result.status_code, 0);
}

#[tokio::test]
async fn http_stage_skipped_without_path() {
    let pki = test_pki();
    let addr = spawn_https(&pki, 500).await;
    let prober = trusting_prober(&pki, HttpStage::WhenPathGiven);

    let result = prober
        .probe(&ProbeTarget::new("127.0.0.1", addr.port()), "")
        .await;

    assert!(result.reachable);
    assert_eq!(result.status_code, 0);
    assert_eq!(result.http_round_trip, Duration::ZERO);
}

#[tokio::test]
async fn cert_directory_extends_trust_store() {
    let pki = test_pki();
    let addr = spawn_https(&pki, 200).await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("test-ca.crt"), &pki.ca_pem).unwrap();
    let prober = Prober::new(ProbeConfig {
        cert_dir: dir.path().to_path_buf(),
        ..config(HttpStage::Always)
    })
    .unwrap();

    let result = prober
        .probe(&ProbeTarget::new("127.0.0.1", addr.port()), "/")
        .await;
    assert!(result.reachable, "{:?}", result.failure_reason);
}

#[tokio::test]
async fn unreadable_cert_directory_degrades_to_system_roots() {
    let pki = test_pki();
    let addr = spawn_https(&pki, 200).await;

    let prober = Prober::new(ProbeConfig {
        cert_dir: "/nonexistent/hostwatch/certs".into(),
        ..config(HttpStage::Always)
    })
    .unwrap();

    let result = prober
        .probe(&ProbeTarget::new("127.0.0.1", addr.port()), "/")
        .await;
    assert_eq!(result.error().map(ProbeError::kind), Some(FailureKind::Tls));
}
