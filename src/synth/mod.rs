//! Zone Synthesizer: given the current config snapshot and latest health
//! snapshot, produces zone files and a server-config fragment.

pub mod corefile;
pub mod zone;

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use slog::{error, Logger};

use crate::crd::{GslbConfigSpec, ObjectId};
use crate::error::GslbError;
use crate::geoip::{GeoDb, ViewStrategy};
use crate::health::HealthSnapshot;
use crate::serial::SerialTable;
use zone::{eligible_targets, views_for, ZoneFile, DEFAULT_VIEW};

pub struct SynthesisOutput {
    /// file name -> rendered zone contents.
    pub zone_files: HashMap<String, String>,
    pub corefile: String,
    /// Kind-3 synthesis errors accumulated this tick (e.g. a config with no
    /// nameservers); also logged at the point of occurrence.
    pub errors: Vec<GslbError>,
    /// Ids of configs that newly contributed zone content this tick (as
    /// opposed to being skipped, whether or not a previous generation was
    /// carried forward for them). The coordinator uses this to patch each
    /// contributing config's `status.lastGeneration`.
    pub synthesized: Vec<ObjectId>,
}

/// A single domain's contribution to the bundle: its zone files and its
/// block of the server-config fragment, kept around so a synthesis error on
/// a later tick can carry the domain's last-good output forward instead of
/// dropping it from the published generation.
#[derive(Clone)]
struct DomainOutput {
    zone_files: HashMap<String, String>,
    corefile_block: String,
}

pub struct Synthesizer {
    pub interval_secs: u64,
    pub geoip_enabled: bool,
    pub view_strategy: ViewStrategy,
    last_good: HashMap<String, DomainOutput>,
}

impl Synthesizer {
    pub fn new(interval_secs: u64, geoip_enabled: bool, view_strategy: ViewStrategy) -> Self {
        Self {
            interval_secs,
            geoip_enabled,
            view_strategy,
            last_good: HashMap::new(),
        }
    }

    /// spec.md §7 kind 3: a config that fails synthesis is skipped, but its
    /// previous generation's output (if any) is carried forward so the
    /// domain doesn't vanish from the published bundle over a transient
    /// error. `last_good` is also the place a domain's carried output is
    /// garbage-collected once the domain disappears from the spec (spec
    /// churn, §8 "Spec churn" scenario).
    pub fn run(
        &mut self,
        spec_snapshot: &[(ObjectId, Arc<GslbConfigSpec>)],
        health: &HealthSnapshot,
        serials: &mut SerialTable,
        geo: Option<&GeoDb>,
        log: &Logger,
    ) -> SynthesisOutput {
        let mut zone_files = HashMap::new();
        let mut corefile = String::new();
        let mut errors = Vec::new();
        let mut synthesized = Vec::new();
        let mut seen_domains = std::collections::HashSet::new();

        for (id, spec) in spec_snapshot {
            seen_domains.insert(spec.domain.clone());

            if spec.nameservers.is_empty() {
                let err = GslbError::Synthesis {
                    domain: spec.domain.clone(),
                    reason: "no nameservers declared".to_string(),
                };
                error!(log, "skipping synthesis"; "domain" => &spec.domain, "error" => %err);
                errors.push(err);
                if let Some(prev) = self.last_good.get(&spec.domain) {
                    error!(log, "carrying forward previous generation"; "domain" => &spec.domain);
                    zone_files.extend(prev.zone_files.clone());
                    corefile.push_str(&prev.corefile_block);
                }
                continue;
            }

            let views = if self.geoip_enabled {
                views_for(id, spec, health)
            } else {
                vec![DEFAULT_VIEW.to_string()]
            };

            let mut domain_zone_files = HashMap::new();
            for view in &views {
                let mut record_answers = Vec::with_capacity(spec.records.len());
                for (record_idx, record) in spec.records.iter().enumerate() {
                    let targets = eligible_targets(id, record_idx, spec, health, view);
                    record_answers.push((record.name.clone(), self.interval_secs as u32, targets));
                }

                let body_hash = hash_body(&spec.domain, view, &spec.nameservers, &record_answers);
                let key = (spec.domain.clone(), view.clone());
                let serial = serials.next_serial(key, body_hash);

                let zone_file = ZoneFile {
                    domain: spec.domain.clone(),
                    view: view.clone(),
                    nameservers: spec.nameservers.clone(),
                    serial,
                    record_answers,
                };
                domain_zone_files.insert(zone_file_name(&spec.domain, view), zone_file.render());
            }

            let corefile_block = corefile::render_domain_block(
                &spec.domain,
                &views,
                |v| zone_file_name(&spec.domain, v),
                self.view_strategy,
                geo,
            );

            zone_files.extend(domain_zone_files.clone());
            corefile.push_str(&corefile_block);
            synthesized.push(id.clone());
            self.last_good.insert(
                spec.domain.clone(),
                DomainOutput {
                    zone_files: domain_zone_files,
                    corefile_block,
                },
            );
        }

        self.last_good.retain(|domain, _| seen_domains.contains(domain));

        SynthesisOutput {
            zone_files,
            corefile,
            errors,
            synthesized,
        }
    }
}

pub fn zone_file_name(domain: &str, view: &str) -> String {
    format!("{domain}.{view}.zone")
}

fn hash_body(
    domain: &str,
    view: &str,
    nameservers: &[crate::crd::Nameserver],
    record_answers: &[(String, u32, Vec<zone::ResolvedTarget>)],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(view.as_bytes());
    for ns in nameservers {
        hasher.update(ns.hostname.as_bytes());
        hasher.update(ns.address.octets());
    }
    for (owner, ttl, targets) in record_answers {
        hasher.update(owner.as_bytes());
        hasher.update(ttl.to_le_bytes());
        for target in targets {
            hasher.update(target.address.octets());
            hasher.update(target.weight.to_le_bytes());
        }
    }
    hasher.finalize().into()
}
