//! GeoIP database adaptation.
//!
//! The core's only mandatory GeoIP duty is ensuring the database path the
//! data plane needs is mounted and readable. This module additionally
//! supports the fallback where the chosen DNS backend cannot express view
//! selection by country natively: it can expand a country code to its
//! constituent subnets by walking the MaxMind database.

use ipnetwork::Ipv4Network;
use maxminddb::geoip2;

use crate::error::GslbError;

/// How the synthesizer should express per-country routing in the server
/// config fragment.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ViewStrategy {
    /// Emit a symbolic "client-country == C" directive; the DNS backend
    /// resolves the client's country itself (e.g. CoreDNS's geoip plugin).
    NativeCountry,
    /// Emit explicit source-subnet lists derived from the GeoIP database at
    /// synthesis time, for backends that cannot express country views.
    ExplicitSubnets,
}

pub struct GeoDb {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl GeoDb {
    /// Opens the database, verifying it is readable and MaxMind-format.
    /// Failure here at startup is a fatal invalid-configuration condition
    /// when `--controller-geoip` is set.
    pub fn open(path: &str) -> Result<Self, GslbError> {
        let reader = maxminddb::Reader::open_readfile(path)
            .map_err(|e| GslbError::Fatal(format!("failed to open GeoIP database {path:?}: {e}")))?;
        Ok(Self { reader })
    }

    /// Walks the database's network list and returns the IPv4 subnets whose
    /// country matches `country`, for the explicit-subnets fallback.
    pub fn country_subnets(&self, country: &str) -> Vec<Ipv4Network> {
        let root: ipnetwork::IpNetwork = "0.0.0.0/0".parse().expect("valid default route");
        let Ok(within) = self.reader.within::<geoip2::Country>(root) else {
            return Vec::new();
        };

        let mut subnets = Vec::new();
        for item in within {
            let Ok(entry) = item else { continue };
            let Some(iso) = entry.info.country.and_then(|c| c.iso_code) else {
                continue;
            };
            if !iso.eq_ignore_ascii_case(country) {
                continue;
            }
            if let ipnetwork::IpNetwork::V4(net) = entry.ip_net {
                subnets.push(net);
            }
        }
        subnets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_database_is_fatal() {
        let result = GeoDb::open("/nonexistent/path/to.mmdb");
        assert!(result.is_err());
    }
}
