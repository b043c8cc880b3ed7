//! Self-signed CA generation for the IAM authenticator

use chrono::{Datelike, Utc};
#[cfg(test)]
use mockall::automock;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose,
};

use crate::error::{Error, Result};

pub const CA_COMMON_NAME: &str = "aws-iam-authenticator";
const CA_VALIDITY_YEARS: i32 = 10;

#[cfg_attr(test, automock)]
pub trait CertificateGenerator: Send + Sync {
    /// PEM-encoded `(certificate, private key)`.
    fn generate_self_signed_ca_key_pair(&self) -> Result<(Vec<u8>, Vec<u8>)>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RcgenCertificateGenerator;

impl CertificateGenerator for RcgenCertificateGenerator {
    fn generate_self_signed_ca_key_pair(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, CA_COMMON_NAME);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::CrlSign,
        ];

        // Day clamped so Feb 29 never lands on a non-leap year.
        let now = Utc::now();
        let (month, day) = (now.month() as u8, now.day().min(28) as u8);
        params.not_before = rcgen::date_time_ymd(now.year(), month, day);
        params.not_after = rcgen::date_time_ymd(now.year() + CA_VALIDITY_YEARS, month, day);

        let key_pair =
            KeyPair::generate().map_err(|e| Error::CertificateError(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::CertificateError(e.to_string()))?;

        Ok((
            cert.pem().into_bytes(),
            key_pair.serialize_pem().into_bytes(),
        ))
    }
}
