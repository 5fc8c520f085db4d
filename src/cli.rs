use std::path::PathBuf;

use clap::Parser;

use crate::error::GslbError;
use crate::geoip::ViewStrategy;

#[derive(Parser, Debug, Clone)]
#[clap(version, author, about = "SimpleGSLB: GSLB control plane for Kubernetes")]
pub struct Opts {
    #[clap(long, env = "INTERVAL", default_value = "10")]
    #[clap(help = "Probe period in seconds; also the A-record TTL.")]
    pub interval: u64,

    #[clap(long, env = "TIMEOUT", default_value = "2")]
    #[clap(help = "Per-probe deadline in seconds.")]
    pub timeout: u64,

    #[clap(long, env = "PROBE_CONCURRENCY", default_value = "64")]
    #[clap(help = "Maximum number of probes dispatched concurrently per tick.")]
    pub probe_concurrency: usize,

    #[clap(long, env = "CONFIG_DIR")]
    #[clap(help = "Shared directory the DNS server reads zone files/Corefile from.")]
    pub config_dir: PathBuf,

    #[clap(long, env = "CONTROLLER_GEOIP")]
    #[clap(help = "Enable per-country view generation.")]
    pub controller_geoip: bool,

    #[clap(long, env = "VIEW_STRATEGY", value_enum, default_value = "native-country")]
    #[clap(help = "How per-country views are expressed in the server-config fragment.")]
    pub view_strategy: ViewStrategy,

    #[clap(long, env = "GEOIP_DB", default_value = "")]
    #[clap(help = "Path to a GeoLite2-Country/City-compatible MaxMind database.")]
    pub geoip_db: String,

    #[clap(long, env = "GEOIP_ACCOUNT", default_value = "")]
    #[clap(help = "MaxMind account id, for database refresh tooling external to this process.")]
    pub geoip_account: String,

    #[clap(long, env = "GEOIP_LICENSE", default_value = "")]
    #[clap(help = "MaxMind license key, for database refresh tooling external to this process.")]
    pub geoip_license: String,

    #[clap(long, env = "DNS_PID_FILE", default_value = "")]
    #[clap(help = "Pid file of the DNS server process to SIGHUP after a successful publish.")]
    pub dns_pid_file: String,
}

impl Opts {
    /// Validate process configuration. Failure here is the "invalid process
    /// configuration" fatal startup condition.
    pub fn validate(&self) -> Result<(), GslbError> {
        if self.interval == 0 {
            return Err(GslbError::Fatal("interval must be nonzero".into()));
        }
        if self.timeout == 0 {
            return Err(GslbError::Fatal("timeout must be nonzero".into()));
        }
        if self.timeout >= self.interval {
            return Err(GslbError::Fatal(
                "timeout must be smaller than interval".into(),
            ));
        }
        if self.probe_concurrency == 0 {
            return Err(GslbError::Fatal("probe-concurrency must be nonzero".into()));
        }
        if self.controller_geoip && self.geoip_db.is_empty() {
            return Err(GslbError::Fatal(
                "controller-geoip requires --geoip-db".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts() -> Opts {
        Opts {
            interval: 10,
            timeout: 2,
            probe_concurrency: 64,
            config_dir: PathBuf::from("/tmp/gslb"),
            controller_geoip: false,
            view_strategy: ViewStrategy::NativeCountry,
            geoip_db: String::new(),
            geoip_account: String::new(),
            geoip_license: String::new(),
            dns_pid_file: String::new(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(base_opts().validate().is_ok());
    }

    #[test]
    fn timeout_must_be_smaller_than_interval() {
        let mut opts = base_opts();
        opts.timeout = 10;
        opts.interval = 10;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn geoip_requires_db_path() {
        let mut opts = base_opts();
        opts.controller_geoip = true;
        assert!(opts.validate().is_err());
        opts.geoip_db = "/var/lib/GeoLite2-City.mmdb".into();
        assert!(opts.validate().is_ok());
    }
}
