//! Zone file construction.

use std::fmt::Write as _;
use std::net::Ipv4Addr;

use crate::crd::{GslbConfigSpec, Nameserver};
use crate::health::{HealthSample, TargetId};

const DEFAULT_REFRESH: u32 = 60;
const DEFAULT_RETRY: u32 = 30;
const DEFAULT_EXPIRE: u32 = 86400;
const DEFAULT_MINIMUM: u32 = 10;

/// The view name used for the always-present fallback pool.
pub const DEFAULT_VIEW: &str = "default";

#[derive(Clone, Debug)]
pub struct ResolvedTarget {
    pub address: Ipv4Addr,
    pub weight: u32,
}

/// One `(domain, view)` pair's worth of records, ready to render.
pub struct ZoneFile {
    pub domain: String,
    pub view: String,
    pub nameservers: Vec<Nameserver>,
    pub serial: u32,
    /// `(owner_label, ttl, ordered_targets)` — empty `ordered_targets`
    /// means NXRRSET for that owner name.
    pub record_answers: Vec<(String, u32, Vec<ResolvedTarget>)>,
}

impl ZoneFile {
    /// Renders standard RFC 1035 zone file syntax.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mname = &self
            .nameservers
            .first()
            .expect("synthesis requires at least one nameserver")
            .hostname;
        let rname = format!("hostmaster.{}", self.domain);

        writeln!(out, "$ORIGIN {}.", self.domain).unwrap();
        writeln!(
            out,
            "@ IN SOA {mname}. {rname}. ( {} {} {} {} {} )",
            self.serial, DEFAULT_REFRESH, DEFAULT_RETRY, DEFAULT_EXPIRE, DEFAULT_MINIMUM
        )
        .unwrap();

        for ns in &self.nameservers {
            writeln!(out, "@ IN NS {}.", ns.hostname).unwrap();
        }
        for ns in &self.nameservers {
            if ns.hostname == self.domain || ns.hostname.ends_with(&format!(".{}", self.domain)) {
                writeln!(out, "{}. IN A {}", ns.hostname, ns.address).unwrap();
            }
        }

        for (owner, ttl, targets) in &self.record_answers {
            let owner_name = if owner == "@" {
                format!("{}.", self.domain)
            } else {
                format!("{owner}.{}.", self.domain)
            };
            for target in targets {
                for _ in 0..target.weight {
                    writeln!(out, "{owner_name} {ttl} IN A {}", target.address).unwrap();
                }
            }
        }

        out
    }
}

/// Builds the eligible, ordered target list for one record in one view:
/// `up` targets located in `view`, falling back to the `up` targets with
/// empty `location` when the view pool is empty.
pub fn eligible_targets(
    config_id: &crate::crd::ObjectId,
    record_idx: usize,
    spec: &GslbConfigSpec,
    health: &std::collections::HashMap<TargetId, HealthSample>,
    view: &str,
) -> Vec<ResolvedTarget> {
    let record = &spec.records[record_idx];
    let located = |want_default: bool| {
        record
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                if want_default {
                    t.location.is_empty()
                } else {
                    t.location == view
                }
            })
            .filter(|(target_idx, _)| {
                let id: TargetId = (config_id.clone(), record_idx, *target_idx);
                health.get(&id).map(HealthSample::is_up).unwrap_or(false)
            })
            .map(|(_, t)| ResolvedTarget {
                address: t.address,
                weight: t.weight,
            })
            .collect::<Vec<_>>()
    };

    if view == DEFAULT_VIEW {
        return located(true);
    }

    let country_pool = located(false);
    if !country_pool.is_empty() {
        country_pool
    } else {
        located(true)
    }
}

/// All distinct non-empty `location`s used by any `up` target in this
/// config, plus the always-present default view.
pub fn views_for(
    config_id: &crate::crd::ObjectId,
    spec: &GslbConfigSpec,
    health: &std::collections::HashMap<TargetId, HealthSample>,
) -> Vec<String> {
    let mut views: Vec<String> = vec![DEFAULT_VIEW.to_string()];
    for (record_idx, record) in spec.records.iter().enumerate() {
        for (target_idx, target) in record.targets.iter().enumerate() {
            if target.location.is_empty() {
                continue;
            }
            let id: TargetId = (config_id.clone(), record_idx, target_idx);
            let up = health.get(&id).map(HealthSample::is_up).unwrap_or(false);
            if up && !views.contains(&target.location) {
                views.push(target.location.clone());
            }
        }
    }
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Protocol, Record, Target};
    use crate::health::HealthStatus;

    fn spec_with(targets: Vec<Target>) -> GslbConfigSpec {
        GslbConfigSpec {
            domain: "cloud.example.com".to_string(),
            nameservers: vec![Nameserver {
                hostname: "ns1.cloud.example.com".to_string(),
                address: "10.0.0.1".parse().unwrap(),
            }],
            records: vec![Record {
                name: "app".to_string(),
                targets,
            }],
        }
    }

    fn target(addr: &str, location: &str, weight: u32) -> Target {
        Target {
            address: addr.parse().unwrap(),
            location: location.to_string(),
            weight,
            protocol: Protocol::Tcp,
            port: 80,
            path: "/".to_string(),
        }
    }

    fn up_health(id: &crate::crd::ObjectId, pairs: &[(usize, usize)]) -> std::collections::HashMap<TargetId, HealthSample> {
        pairs
            .iter()
            .map(|(r, t)| {
                (
                    (id.clone(), *r, *t),
                    HealthSample {
                        status: HealthStatus::Up,
                        last_checked: None,
                        consecutive_failures: 0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn geo_preference_scenario() {
        let id = ("default".to_string(), "a".to_string());
        let spec = spec_with(vec![
            target("8.8.8.8", "XX", 1),
            target("10.0.0.1", "", 1),
            target("10.0.0.2", "", 1),
        ]);
        let health = up_health(&id, &[(0, 0), (0, 1), (0, 2)]);

        let xx = eligible_targets(&id, 0, &spec, &health, "XX");
        assert_eq!(xx.len(), 1);
        assert_eq!(xx[0].address, "8.8.8.8".parse::<Ipv4Addr>().unwrap());

        let default = eligible_targets(&id, 0, &spec, &health, DEFAULT_VIEW);
        assert_eq!(default.len(), 2);
    }

    #[test]
    fn geo_fallback_scenario() {
        let id = ("default".to_string(), "a".to_string());
        let spec = spec_with(vec![target("1.1.1.1", "US", 1), target("2.2.2.2", "", 1)]);
        let health = up_health(&id, &[(0, 0), (0, 1)]);

        let jp = eligible_targets(&id, 0, &spec, &health, "JP");
        assert_eq!(jp.len(), 1);
        assert_eq!(jp[0].address, "2.2.2.2".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn all_down_yields_no_answers() {
        let id = ("default".to_string(), "a".to_string());
        let spec = spec_with(vec![target("1.1.1.1", "", 1)]);
        let health = std::collections::HashMap::new();

        let default = eligible_targets(&id, 0, &spec, &health, DEFAULT_VIEW);
        assert!(default.is_empty());
    }

    #[test]
    fn weight_is_realized_as_repeated_lines() {
        let id = ("default".to_string(), "a".to_string());
        let spec = spec_with(vec![target("1.1.1.1", "", 3), target("2.2.2.2", "", 1)]);
        let health = up_health(&id, &[(0, 0), (0, 1)]);

        let zone = ZoneFile {
            domain: spec.domain.clone(),
            view: DEFAULT_VIEW.to_string(),
            nameservers: spec.nameservers.clone(),
            serial: 1,
            record_answers: vec![(
                "app".to_string(),
                10,
                eligible_targets(&id, 0, &spec, &health, DEFAULT_VIEW),
            )],
        };
        let rendered = zone.render();
        assert_eq!(rendered.matches("1.1.1.1").count(), 3);
        assert_eq!(rendered.matches("2.2.2.2").count(), 1);
    }

    #[test]
    fn ttl_matches_configured_interval() {
        let zone = ZoneFile {
            domain: "cloud.example.com".to_string(),
            view: DEFAULT_VIEW.to_string(),
            nameservers: vec![Nameserver {
                hostname: "ns1.cloud.example.com".to_string(),
                address: "10.0.0.1".parse().unwrap(),
            }],
            serial: 1,
            record_answers: vec![(
                "app".to_string(),
                5,
                vec![ResolvedTarget {
                    address: "1.1.1.1".parse().unwrap(),
                    weight: 1,
                }],
            )],
        };
        assert!(zone.render().contains("app.cloud.example.com. 5 IN A 1.1.1.1"));
    }

    #[test]
    fn glue_record_requires_label_boundary_match() {
        let zone = ZoneFile {
            domain: "ample.com".to_string(),
            view: DEFAULT_VIEW.to_string(),
            nameservers: vec![
                Nameserver {
                    hostname: "ns1.example.com".to_string(),
                    address: "10.0.0.1".parse().unwrap(),
                },
                Nameserver {
                    hostname: "ns1.ample.com".to_string(),
                    address: "10.0.0.2".parse().unwrap(),
                },
            ],
            serial: 1,
            record_answers: vec![],
        };
        let rendered = zone.render();
        assert!(!rendered.contains("ns1.example.com. IN A 10.0.0.1"));
        assert!(rendered.contains("ns1.ample.com. IN A 10.0.0.2"));
    }
}
