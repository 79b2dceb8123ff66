//! Entwicklungs-PKI
//!
//! Erzeugt eine selbstsignierte CA und davon signierte Server- und
//! Client-Zertifikate. Fuer lokale Entwicklung und Integrationstests; in
//! Produktion stammt das Material aus dem Deployment.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};

use crate::error::{CryptoError, CryptoResult};
use crate::tls::TlsMaterial;

/// Selbstsignierte CA, die Blatt-Zertifikate ausstellt
pub struct EntwicklungsPki {
    /// PEM des CA-Zertifikats (fuer beide Seiten als Vertrauensanker)
    pub ca_pem: String,
    ca_zertifikat: Certificate,
    ca_schluessel: KeyPair,
}

impl EntwicklungsPki {
    /// Erzeugt eine neue CA mit dem angegebenen Common Name
    pub fn erzeugen(common_name: &str) -> CryptoResult<Self> {
        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(generierung)?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, common_name);
        params.distinguished_name = distinguished_name;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let ca_schluessel = KeyPair::generate().map_err(generierung)?;
        let ca_zertifikat = params.self_signed(&ca_schluessel).map_err(generierung)?;

        tracing::debug!(common_name = common_name, "Entwicklungs-CA erzeugt");

        Ok(Self {
            ca_pem: ca_zertifikat.pem(),
            ca_zertifikat,
            ca_schluessel,
        })
    }

    /// Server-Zertifikat fuer die angegebenen Namen (DNS-Namen oder IP-Adressen)
    pub fn server_material(&self, namen: &[&str]) -> CryptoResult<TlsMaterial> {
        let common_name = namen.first().copied().unwrap_or("deskproxy-server");
        self.blatt_ausstellen(
            namen.iter().map(|n| n.to_string()).collect(),
            common_name,
            ExtendedKeyUsagePurpose::ServerAuth,
        )
    }

    /// Client-Zertifikat mit dem angegebenen Common Name
    pub fn client_material(&self, common_name: &str) -> CryptoResult<TlsMaterial> {
        self.blatt_ausstellen(
            vec![common_name.to_string()],
            common_name,
            ExtendedKeyUsagePurpose::ClientAuth,
        )
    }

    fn blatt_ausstellen(
        &self,
        alternative_namen: Vec<String>,
        common_name: &str,
        zweck: ExtendedKeyUsagePurpose,
    ) -> CryptoResult<TlsMaterial> {
        let mut params = CertificateParams::new(alternative_namen).map_err(generierung)?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, common_name);
        params.distinguished_name = distinguished_name;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![zweck];

        let schluessel = KeyPair::generate().map_err(generierung)?;
        let zertifikat = params
            .signed_by(&schluessel, &self.ca_zertifikat, &self.ca_schluessel)
            .map_err(generierung)?;

        Ok(TlsMaterial {
            ca_pem: self.ca_pem.clone(),
            zertifikat_pem: zertifikat.pem(),
            schluessel_pem: schluessel.serialize_pem(),
        })
    }
}

fn generierung(fehler: rcgen::Error) -> CryptoError {
    CryptoError::ZertifikatGenerierung(fehler.to_string())
}
