//! Scratch directory with fixture keys, authorizations, and documents on
//! disk, for exercising subcommands end to end.

use std::path::{Path, PathBuf};

use dte_core::DocumentType;
use dte_crypto::fixtures::{self_signed_certificate, test_key};
use dte_stamp::fixtures::{sample_document, CafBuilder, AUTHORITY_SLOT, FIXTURE_SERIALS};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePublicKey;
use tempfile::TempDir;

use crate::common::{AuthorityArgs, SignerArgs};

pub(crate) struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("authority");
        std::fs::create_dir(&keys).unwrap();
        let authority = test_key(AUTHORITY_SLOT)
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        for serial in FIXTURE_SERIALS {
            std::fs::write(keys.join(format!("{serial}.pem")), &authority).unwrap();
        }

        let key = test_key(0);
        std::fs::write(
            dir.path().join("signer.key"),
            key.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes(),
        )
        .unwrap();
        let cert = self_signed_certificate(key, "Fixture Signer 0");
        std::fs::write(dir.path().join("signer.crt"), cert.to_pem().unwrap()).unwrap();
        Self { dir }
    }

    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub(crate) fn signer_args(&self) -> SignerArgs {
        SignerArgs {
            key: Some(self.path("signer.key")),
            cert: Some(self.path("signer.crt")),
        }
    }

    pub(crate) fn authority_args(&self) -> AuthorityArgs {
        AuthorityArgs {
            keys: self.path("authority"),
            certification_serials: vec![100],
        }
    }

    pub(crate) fn write_caf(&self, document_type: DocumentType, desde: u64, hasta: u64) -> PathBuf {
        let path = self.path(&format!("caf-{document_type}-{desde}-{hasta}.xml"));
        std::fs::write(&path, CafBuilder::new(document_type, desde, hasta).build_xml()).unwrap();
        path
    }

    pub(crate) fn write_document(&self, document_type: DocumentType, folio: u64) -> PathBuf {
        let path = self.path(&format!("doc-{document_type}-{folio}.xml"));
        std::fs::write(&path, sample_document(document_type, folio).to_xml()).unwrap();
        path
    }
}

pub(crate) fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
