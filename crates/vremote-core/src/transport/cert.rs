//! Certificate and key handling.
//!
//! Provides PEM loading for the credential set, the SHA-256 fingerprint used
//! in logs, and the leaf checks that the verification override never waives:
//! certificate type, validity window and hostname binding.

use std::net::IpAddr;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::error::{CertificateFailure, Result, TlsError};

/// Load a certificate chain from PEM data.
pub fn load_certs_from_pem(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut certs = Vec::new();
    let mut reader = std::io::BufReader::new(pem_data);

    for cert in rustls_pemfile::certs(&mut reader) {
        match cert {
            Ok(c) => certs.push(c),
            Err(e) => {
                return Err(TlsError::Credentials {
                    message: format!("failed to parse certificate: {}", e),
                }
                .into());
            }
        }
    }

    if certs.is_empty() {
        return Err(TlsError::Credentials {
            message: "no certificates found in PEM data".to_string(),
        }
        .into());
    }

    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from PEM data.
pub fn load_key_from_pem(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::BufReader::new(pem_data);

    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(TlsError::Credentials {
            message: "no private key found in PEM data".to_string(),
        }
        .into()),
        Err(e) => Err(TlsError::Credentials {
            message: format!("failed to parse private key: {}", e),
        }
        .into()),
    }
}

/// Compute SHA-256 hash of certificate DER bytes.
pub fn cert_hash(cert_der: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    hasher.finalize().to_vec()
}

/// Colon-separated hex fingerprint, as printed by `openssl x509 -fingerprint`.
pub fn fingerprint(cert_der: &[u8]) -> String {
    cert_hash(cert_der)
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn parse(cert_der: &[u8]) -> std::result::Result<X509Certificate<'_>, CertificateFailure> {
    X509Certificate::from_der(cert_der)
        .map(|(_, cert)| cert)
        .map_err(|_| CertificateFailure::WrongType)
}

/// Check that `cert_der` is an X.509 certificate valid at `now` (seconds since
/// the Unix epoch).
pub fn check_validity(
    cert_der: &[u8],
    now: u64,
) -> std::result::Result<(), CertificateFailure> {
    let cert = parse(cert_der)?;
    let now = i64::try_from(now).unwrap_or(i64::MAX);
    let validity = cert.validity();

    if validity.not_after.timestamp() < now {
        return Err(CertificateFailure::Expired);
    }
    if validity.not_before.timestamp() > now {
        return Err(CertificateFailure::NotYetActive);
    }
    Ok(())
}

/// Check that the leaf certificate names `hostname`.
///
/// Subject alternative names are authoritative when present; the subject
/// common name is only consulted for certificates without DNS names. A
/// wildcard matches exactly one left-most label.
pub fn check_hostname(
    cert_der: &[u8],
    hostname: &str,
) -> std::result::Result<(), CertificateFailure> {
    let cert = parse(cert_der)?;
    let mismatch = || CertificateFailure::HostnameMismatch {
        hostname: hostname.to_string(),
    };

    let target_ip = hostname
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok();

    let mut dns_names = Vec::new();
    let mut ip_names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                GeneralName::IPAddress(raw) => {
                    if let Some(ip) = ip_from_bytes(raw) {
                        ip_names.push(ip);
                    }
                }
                _ => {}
            }
        }
    }

    if let Some(ip) = target_ip {
        return if ip_names.contains(&ip) {
            Ok(())
        } else {
            Err(mismatch())
        };
    }

    if dns_names.is_empty() {
        dns_names = cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok().map(str::to_string))
            .collect();
    }

    if dns_names.iter().any(|pattern| dns_matches(pattern, hostname)) {
        Ok(())
    } else {
        Err(mismatch())
    }
}

/// Run every leaf check in order: type, validity of each presented
/// certificate, then hostname binding of the end entity.
pub fn check_presented_chain(
    end_entity: &[u8],
    intermediates: &[&[u8]],
    hostname: &str,
    now: u64,
) -> std::result::Result<(), CertificateFailure> {
    parse(end_entity)?;
    check_validity(end_entity, now)?;
    for intermediate in intermediates {
        check_validity(intermediate, now)?;
    }
    check_hostname(end_entity, hostname)
}

fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(raw).ok().map(IpAddr::from),
        _ => None,
    }
}

fn dns_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let hostname = hostname.trim_end_matches('.');

    if let Some(suffix) = pattern.strip_prefix("*.") {
        return match hostname.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        };
    }
    pattern.eq_ignore_ascii_case(hostname)
}
