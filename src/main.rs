#![warn(clippy::all, clippy::pedantic)]

// vim:set et sw=4 ts=4 foldmethod=marker:

// starting doc {{{
//! SimpleGSLB: a Global Server Load Balancing control plane for Kubernetes.
//!
//! Watches `GslbConfig` custom resources, health-checks the targets they
//! declare, and synthesizes zone files plus a server-config fragment for an
//! authoritative DNS backend (e.g. CoreDNS) to serve from a shared config
//! directory. Routing intent lives in Kubernetes; the data plane is an
//! off-the-shelf DNS server reading flat files this process publishes.
//!
//! ## Configuration
//!
//! All options are plain flags/env vars; see `--help`. At minimum
//! `--config-dir` must point at a directory writable by this process and
//! readable by the DNS backend.
//!
//! ## Custom Resource Definition
//!
//! ```yaml
//! apiVersion: cyberun.cloud/v1
//! kind: GslbConfig
//! metadata:
//!   name: app
//! spec:
//!   domain: app.cloud.example.com
//!   nameservers:
//!   - hostname: ns1.cloud.example.com
//!     address: 203.0.113.1
//!   records:
//!   - name: "@"
//!     targets:
//!     - address: 203.0.113.10
//!       location: US
//!       protocol: https
//!       port: 443
//! ```
// }}}

// imports {{{
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use slog::{crit, info, o, warn, Drain, Logger};

use simple_gslb::cli;
use simple_gslb::crd::GslbConfig;
use simple_gslb::error::GslbError;
use simple_gslb::geoip::GeoDb;
use simple_gslb::health::ticker::Prober;
use simple_gslb::publish::Publisher;
use simple_gslb::serial::SerialTable;
use simple_gslb::store::SpecStore;
use simple_gslb::synth::Synthesizer;
use simple_gslb::watch;
// }}}

#[tokio::main]
async fn main() -> Result<()> {
    let opts: cli::Opts = cli::Opts::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let root_logger = slog::Logger::root(
        drain,
        o!("config_dir" => opts.config_dir.display().to_string()),
    );

    if let Err(e) = opts.validate() {
        crit!(root_logger, "invalid process configuration"; "error" => %e);
        return Err(e.into());
    }
    std::fs::create_dir_all(&opts.config_dir)
        .with_context(|| format!("failed to create config dir {}", opts.config_dir.display()))?;

    let geo = load_geoip(&opts, &root_logger)?;

    info!(root_logger, "connecting to Kubernetes API");
    let client = Client::try_default().await?;
    let store = Arc::new(SpecStore::new(root_logger.new(o!("component" => "store"))));

    let watch_log = root_logger.new(o!("component" => "watch"));
    let watch_store = store.clone();
    let watch_client = client.clone();
    tokio::spawn(async move {
        watch::run(watch_client, watch_store, watch_log).await;
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let signal_log = root_logger.new(o!("component" => "signal"));
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!(signal_log, "received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    run_coordinator(opts, store, geo, client, root_logger, shutdown_rx).await
}

/// Waits for SIGINT or SIGTERM, whichever comes first (teacher's `main`
/// awaits all spawned work via `join_all` before returning; this crate adds
/// the signal wait that triggers that same kind of orderly stop).
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Ties the Health Prober to the Zone Synthesizer and Atomic Publisher:
/// the prober's `on_tick` hook runs synthesis and publish inline, on the
/// prober's own task, so the whole pipeline has exactly one worker per
/// tick.
async fn run_coordinator(
    opts: cli::Opts,
    store: Arc<SpecStore>,
    geo: Option<GeoDb>,
    client: Client,
    log: Logger,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let geoip_enabled = opts.controller_geoip;
    let view_strategy = opts.view_strategy;
    let dns_pid_file = (!opts.dns_pid_file.is_empty()).then(|| PathBuf::from(&opts.dns_pid_file));

    let (prober, _snapshot_rx) = Prober::new(
        store,
        Duration::from_secs(opts.interval),
        Duration::from_secs(opts.timeout),
        opts.probe_concurrency,
        log.new(o!("component" => "prober")),
    );

    let synth_log = log.new(o!("component" => "synth"));
    let mut synthesizer = Synthesizer::new(opts.interval, geoip_enabled, view_strategy);
    let mut serials = SerialTable::new();
    let mut publisher = Publisher::new(opts.config_dir.clone(), dns_pid_file, log.new(o!("component" => "publish")));

    prober
        .run(
            move |spec_snapshot, health_snapshot| {
                let output = synthesizer.run(
                    &spec_snapshot,
                    &health_snapshot,
                    &mut serials,
                    geo.as_ref(),
                    &synth_log,
                );
                let synthesized_ids = output.synthesized.clone();
                let result = publisher.publish(&output);
                let did_publish = matches!(result, Ok(true));
                let generation = publisher.generation();
                let synth_log = synth_log.clone();
                let client = client.clone();
                async move {
                    if let Err(e) = result {
                        warn!(synth_log, "publish failed, previous generation remains live"; "error" => %e);
                        return;
                    }
                    if !did_publish {
                        return;
                    }
                    for (namespace, name) in synthesized_ids {
                        if let Err(e) = patch_last_generation(&client, &namespace, &name, generation).await {
                            warn!(synth_log, "failed to patch GslbConfig status";
                                "namespace" => &namespace, "name" => &name, "error" => %e);
                        }
                    }
                }
            },
            shutdown,
        )
        .await;

    Ok(())
}

/// Records the generation a config last contributed content to, via the
/// `status` subresource. Best-effort: a failed patch is logged but never
/// fails the tick — the published zone files are already live regardless of
/// whether the CRD's status reflects it.
async fn patch_last_generation(
    client: &Client,
    namespace: &str,
    name: &str,
    generation: u64,
) -> Result<(), kube::Error> {
    let api: Api<GslbConfig> = Api::namespaced(client.clone(), namespace);
    let patch = Patch::Merge(json!({ "status": { "lastGeneration": generation } }));
    api.patch_status(name, &PatchParams::default(), &patch)
        .await?;
    Ok(())
}

fn load_geoip(opts: &cli::Opts, log: &Logger) -> Result<Option<GeoDb>, GslbError> {
    if !opts.controller_geoip {
        return Ok(None);
    }
    info!(log, "loading GeoIP database"; "path" => &opts.geoip_db);
    Ok(Some(GeoDb::open(&opts.geoip_db)?))
}
