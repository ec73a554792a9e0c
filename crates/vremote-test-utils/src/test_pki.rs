//! Throwaway PKI for TLS tests.
//!
//! Every certificate is generated fresh; nothing is read from disk.

use std::path::Path;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, date_time_ymd,
};

/// A generated certificate and its private key.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub cert_pem: String,
    pub cert_der: Vec<u8>,
    pub key_pem: String,
}

/// A test certificate authority.
pub struct TestPki {
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    /// Generate a new CA.
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().expect("generate CA key");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "vremote test CA");
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = params.self_signed(&ca_key).expect("self-sign CA");
        Self { ca_cert, ca_key }
    }

    /// CA certificate in PEM form, for use as a trust anchor.
    pub fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// Server certificate for `hosts`, valid now.
    pub fn server(&self, hosts: &[&str]) -> Leaf {
        self.issue(leaf_params(hosts, ExtendedKeyUsagePurpose::ServerAuth))
    }

    /// Server certificate naming `host` only in its subject CN, with no
    /// subject alternative names.
    pub fn server_cn_only(&self, host: &str) -> Leaf {
        let mut params = leaf_params(&[], ExtendedKeyUsagePurpose::ServerAuth);
        params.distinguished_name.push(DnType::CommonName, host);
        self.issue(params)
    }

    /// Client certificate, valid now.
    pub fn client(&self) -> Leaf {
        self.issue(leaf_params(&["vremote-client"], ExtendedKeyUsagePurpose::ClientAuth))
    }

    /// Server certificate whose validity ended in 2001.
    pub fn expired(&self, hosts: &[&str]) -> Leaf {
        let mut params = leaf_params(hosts, ExtendedKeyUsagePurpose::ServerAuth);
        params.not_before = date_time_ymd(2000, 1, 1);
        params.not_after = date_time_ymd(2001, 1, 1);
        self.issue(params)
    }

    /// Server certificate that only becomes valid in 2090.
    pub fn not_yet_valid(&self, hosts: &[&str]) -> Leaf {
        let mut params = leaf_params(hosts, ExtendedKeyUsagePurpose::ServerAuth);
        params.not_before = date_time_ymd(2090, 1, 1);
        params.not_after = date_time_ymd(2095, 1, 1);
        self.issue(params)
    }

    /// Server certificate signed by its own key rather than the CA.
    pub fn self_signed(hosts: &[&str]) -> Leaf {
        let key = KeyPair::generate().expect("generate key");
        let cert = leaf_params(hosts, ExtendedKeyUsagePurpose::ServerAuth)
            .self_signed(&key)
            .expect("self-sign leaf");
        Leaf {
            cert_pem: cert.pem(),
            cert_der: cert.der().to_vec(),
            key_pem: key.serialize_pem(),
        }
    }

    /// Write the CA and a fresh client certificate/key into `dir` as
    /// `cacert.pem`, `clientcert.pem` and `clientkey.pem`.
    pub fn write_client_files(&self, dir: &Path) -> std::io::Result<()> {
        let client = self.client();
        std::fs::write(dir.join("cacert.pem"), self.ca_pem())?;
        std::fs::write(dir.join("clientcert.pem"), client.cert_pem)?;
        std::fs::write(dir.join("clientkey.pem"), client.key_pem)?;
        Ok(())
    }

    fn issue(&self, params: CertificateParams) -> Leaf {
        let key = KeyPair::generate().expect("generate leaf key");
        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("sign leaf");
        Leaf {
            cert_pem: cert.pem(),
            cert_der: cert.der().to_vec(),
            key_pem: key.serialize_pem(),
        }
    }
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

fn leaf_params(hosts: &[&str], usage: ExtendedKeyUsagePurpose) -> CertificateParams {
    let names: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
    let mut params = CertificateParams::new(names).expect("leaf params");
    if let Some(first) = hosts.first() {
        params.distinguished_name.push(DnType::CommonName, *first);
    }
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![usage];
    params
}
