// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! PKI for the operand's admission webhooks.
//!
//! The manager acts as its own certificate authority: it keeps a self-signed
//! CA and a serving certificate for the webhook service signed by that CA.
//! Keys are RSA, serialized as PKCS#8 PEM.

pub mod manager;

use crate::constants::{certs::ORGANIZATION, operand::WEBHOOK_SERVICE};
use crate::kubernetes::ClusterError;
use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, PKCS_RSA_SHA256,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::time::Duration;
use thiserror::Error;
use ::time::OffsetDateTime;
use x509_parser::prelude::{FromDer, X509Certificate};

pub use manager::{CertificateManager, CertificateState, Rotation};

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("certificate generation failed: {0}")]
    Generation(String),

    #[error("certificate parsing error: {0}")]
    Parse(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

pub type Result<T> = std::result::Result<T, CertificateError>;

/// A PEM certificate and its PEM private key
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateBundle {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Validity of a parsed certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Unix timestamp
    pub not_after: i64,
    pub common_name: String,
}

impl CertificateInfo {
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| CertificateError::Parse(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_after: cert.validity().not_after.timestamp(),
            common_name,
        })
    }

    /// Whether the certificate expires before `boundary` has passed
    pub fn expires_within(&self, boundary: Duration) -> bool {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        now.saturating_add(boundary.as_secs() as i64) >= self.not_after
    }
}

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| CertificateError::Parse(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Generate an RSA private key of `bits` bits as PKCS#8 PEM
pub fn generate_private_key(bits: usize) -> Result<String> {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    Ok(pem.as_str().to_owned())
}

fn load_key_pair(key_pem: &str) -> Result<KeyPair> {
    KeyPair::from_pem_and_sign_algo(key_pem, &PKCS_RSA_SHA256)
        .map_err(|e| CertificateError::Parse(format!("failed to load private key: {}", e)))
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    dn
}

fn validity(lifetime: Duration) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let now = OffsetDateTime::now_utc();
    let not_after = ::time::Duration::try_from(lifetime)
        .ok()
        .and_then(|d| now.checked_add(d))
        .ok_or_else(|| CertificateError::Generation(format!("validity {:?} out of range", lifetime)))?;
    Ok((now, not_after))
}

/// Create a self-signed CA valid for `lifetime`
pub fn generate_ca(bits: usize, lifetime: Duration) -> Result<CertificateBundle> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name("btp-manager-ca");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    (params.not_before, params.not_after) = validity(lifetime)?;

    let key_pem = generate_private_key(bits)?;
    let key_pair = load_key_pair(&key_pem)?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertificateError::Generation(format!("failed to create CA cert: {}", e)))?;

    Ok(CertificateBundle {
        cert_pem: cert.pem(),
        key_pem,
    })
}

/// DNS names the webhook service answers to inside `namespace`
pub fn webhook_dns_names(namespace: &str) -> Vec<String> {
    vec![
        format!("{}.{}.svc", WEBHOOK_SERVICE, namespace),
        format!("{}.{}", WEBHOOK_SERVICE, namespace),
    ]
}

/// Create the webhook serving certificate for `namespace`, signed by `ca`
pub fn generate_webhook_cert(
    ca: &CertificateBundle,
    namespace: &str,
    bits: usize,
    lifetime: Duration,
) -> Result<CertificateBundle> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(&format!("{}.{}.svc", WEBHOOK_SERVICE, namespace));
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    (params.not_before, params.not_after) = validity(lifetime)?;
    params.subject_alt_names = webhook_dns_names(namespace)
        .into_iter()
        .map(|name| {
            Ia5String::try_from(name.clone())
                .map(SanType::DnsName)
                .map_err(|e| CertificateError::Generation(format!("invalid DNS name '{}': {}", name, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    let key_pem = generate_private_key(bits)?;
    let key_pair = load_key_pair(&key_pem)?;

    let ca_key = load_key_pair(&ca.key_pem)?;
    let issuer = Issuer::from_ca_cert_pem(&ca.cert_pem, &ca_key)
        .map_err(|e| CertificateError::Parse(format!("failed to create issuer: {}", e)))?;
    let cert = params
        .signed_by(&key_pair, &issuer)
        .map_err(|e| CertificateError::Generation(format!("failed to sign webhook cert: {}", e)))?;

    Ok(CertificateBundle {
        cert_pem: cert.pem(),
        key_pem,
    })
}

/// Whether `cert_pem` carries a valid signature by the key of `ca_pem`
pub fn verify_signed_by(cert_pem: &str, ca_pem: &str) -> Result<bool> {
    let cert_der = parse_pem(cert_pem)?;
    let ca_der = parse_pem(ca_pem)?;
    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| CertificateError::Parse(format!("failed to parse certificate: {}", e)))?;
    let (_, ca) = X509Certificate::from_der(&ca_der)
        .map_err(|e| CertificateError::Parse(format!("failed to parse CA certificate: {}", e)))?;
    Ok(cert.verify_signature(Some(ca.public_key())).is_ok())
}

/// Whether the key parses and the bundle is a usable signing CA
pub fn is_valid_ca(bundle: &CertificateBundle) -> bool {
    load_key_pair(&bundle.key_pem).is_ok()
        && verify_signed_by(&bundle.cert_pem, &bundle.cert_pem).unwrap_or(false)
}
