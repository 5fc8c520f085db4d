//! Server-config fragment generation: declares, per domain, one view per
//! country plus the default view, each bound to its zone file and
//! selected by client source subnet/country.

use std::fmt::Write as _;

use crate::geoip::{GeoDb, ViewStrategy};

/// One domain's worth of view routing, rendered as a CoreDNS-style
/// `Corefile` block (CoreDNS is the natural off-the-shelf companion to a
/// Kubernetes-native controller; its `geoip` plugin resolves client
/// country natively).
pub fn render_domain_block(
    domain: &str,
    views: &[String],
    zone_file_name: impl Fn(&str) -> String,
    strategy: ViewStrategy,
    geo: Option<&GeoDb>,
) -> String {
    let mut out = String::new();

    match strategy {
        ViewStrategy::NativeCountry => {
            for view in views {
                if view == crate::synth::zone::DEFAULT_VIEW {
                    continue;
                }
                writeln!(out, "{domain} {{").unwrap();
                writeln!(out, "    geoip /etc/gslb/GeoLite2-Country.mmdb").unwrap();
                writeln!(out, "    view {view} {{").unwrap();
                writeln!(out, "        expr metadata('geoip/country/code') == '{view}'").unwrap();
                writeln!(out, "    }}").unwrap();
                writeln!(out, "    file {}", zone_file_name(view)).unwrap();
                writeln!(out, "}}").unwrap();
            }
            writeln!(out, "{domain} {{").unwrap();
            writeln!(out, "    file {}", zone_file_name(crate::synth::zone::DEFAULT_VIEW)).unwrap();
            writeln!(out, "}}").unwrap();
        }
        ViewStrategy::ExplicitSubnets => {
            for view in views {
                if view == crate::synth::zone::DEFAULT_VIEW {
                    continue;
                }
                let subnets = geo.map(|g| g.country_subnets(view)).unwrap_or_default();
                if subnets.is_empty() {
                    continue;
                }
                writeln!(out, "{domain} {{").unwrap();
                writeln!(out, "    # view {view}").unwrap();
                for subnet in &subnets {
                    writeln!(out, "    # source {subnet}").unwrap();
                }
                writeln!(out, "    file {}", zone_file_name(view)).unwrap();
                writeln!(out, "}}").unwrap();
            }
            writeln!(out, "{domain} {{").unwrap();
            writeln!(out, "    file {}", zone_file_name(crate::synth::zone::DEFAULT_VIEW)).unwrap();
            writeln!(out, "}}").unwrap();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_country_emits_a_view_block_per_country() {
        let rendered = render_domain_block(
            "cloud.example.com",
            &["default".to_string(), "XX".to_string()],
            |view| format!("cloud.example.com.{view}.zone"),
            ViewStrategy::NativeCountry,
            None,
        );
        assert!(rendered.contains("geoip /etc/gslb/GeoLite2-Country.mmdb"));
        assert!(rendered.contains("view XX {"));
        assert!(rendered.contains("expr metadata('geoip/country/code') == 'XX'"));
        assert!(rendered.contains("file cloud.example.com.XX.zone"));
        assert!(rendered.contains("file cloud.example.com.default.zone"));
    }

    #[test]
    fn geoip_disabled_emits_only_default() {
        let rendered = render_domain_block(
            "cloud.example.com",
            &["default".to_string()],
            |view| format!("cloud.example.com.{view}.zone"),
            ViewStrategy::NativeCountry,
            None,
        );
        assert!(!rendered.contains("view "));
        assert!(rendered.contains("cloud.example.com.default.zone"));
    }
}
