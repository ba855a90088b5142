//! Test fixtures: cached RSA keys, self-signed certificates and ready
//! signers. Available under `cfg(test)` or the `fixtures` feature.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::{Decode, Encode};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;

use crate::certificate::Certificate;
use crate::signer::LocalSigner;

/// Number of distinct cached keys.
pub const KEY_SLOTS: usize = 4;

const FIXTURE_KEY_BITS: usize = 1024;

/// A cached 1024-bit RSA key. Slots `0..KEY_SLOTS` are distinct keys.
///
/// # Panics
///
/// Panics if `slot >= KEY_SLOTS`.
pub fn test_key(slot: usize) -> &'static RsaPrivateKey {
    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        (0..KEY_SLOTS)
            .map(|_| RsaPrivateKey::new(&mut rng, FIXTURE_KEY_BITS).expect("RSA key generation"))
            .collect()
    });
    &keys[slot]
}

/// A freshly generated key outside the cache.
pub fn fresh_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), FIXTURE_KEY_BITS).expect("RSA key generation")
}

/// A one-year self-signed certificate over `key` with subject `CN=<common_name>`.
pub fn self_signed_certificate(key: &RsaPrivateKey, common_name: &str) -> Certificate {
    let spki_der = key
        .to_public_key()
        .to_public_key_der()
        .expect("encode public key");
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).expect("decode SPKI");
    let subject = Name::from_str(&format!("CN={common_name}")).expect("subject name");
    let validity = Validity::from_now(Duration::from_secs(365 * 24 * 3600)).expect("validity");
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(1u32),
        validity,
        subject,
        spki,
        &signing_key,
    )
    .expect("certificate builder");
    let cert = builder
        .build::<rsa::pkcs1v15::Signature>()
        .expect("build certificate");
    let der = cert.to_der().expect("encode certificate");
    Certificate::from_der(&der).expect("decode fixture certificate")
}

/// A signer over cached key `slot` with a matching certificate.
pub fn local_signer(slot: usize) -> LocalSigner {
    let key = test_key(slot);
    let cert = self_signed_certificate(key, &format!("Fixture Signer {slot}"));
    LocalSigner::new(key.clone(), cert).expect("fixture key and certificate match")
}
