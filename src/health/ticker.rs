//! Scheduling model: a periodic ticker that snapshots the Spec Store,
//! dispatches bounded-concurrency probes, and publishes a coherent
//! HealthSnapshot once the tick completes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use slog::{error, info, warn, Logger};
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::crd::GslbConfigSpec;
use crate::error::GslbError;
use crate::health::probe;
use crate::health::{HealthSnapshot, HealthTable, TargetId};
use crate::store::SpecStore;

pub struct Prober {
    store: Arc<SpecStore>,
    table: Arc<HealthTable>,
    interval: Duration,
    timeout: Duration,
    concurrency: usize,
    log: Logger,
    snapshot_tx: watch::Sender<Option<HealthSnapshot>>,
}

impl Prober {
    pub fn new(
        store: Arc<SpecStore>,
        interval: Duration,
        timeout: Duration,
        concurrency: usize,
        log: Logger,
    ) -> (Self, watch::Receiver<Option<HealthSnapshot>>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        (
            Self {
                store,
                table: Arc::new(HealthTable::new()),
                interval,
                timeout,
                concurrency,
                log,
                snapshot_tx,
            },
            snapshot_rx,
        )
    }

    /// Runs the ticker until `shutdown` fires. `on_tick` is invoked
    /// synchronously after each completed tick's HealthSnapshot is
    /// published, with the config snapshot used for that tick — this is the
    /// single worker that runs synthesis + publish, avoiding an extra
    /// hand-off channel. Shutdown is only observed between ticks, so a tick
    /// already in flight always runs to completion.
    pub async fn run<F, Fut>(self, mut on_tick: F, mut shutdown: tokio::sync::watch::Receiver<bool>)
    where
        F: FnMut(Vec<(crate::crd::ObjectId, Arc<GslbConfigSpec>)>, HealthSnapshot) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut tick_num: u64 = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!(self.log, "shutdown requested, stopping before next tick");
                    return;
                }
            }
            tick_num += 1;
            let tick_log = self.log.new(slog::o!("tick" => tick_num));
            let started = Instant::now();

            let spec_snapshot = self.store.snapshot();
            let snapshot = self.run_tick(&spec_snapshot, &tick_log).await;
            let elapsed = started.elapsed();

            if elapsed > self.interval {
                error!(tick_log, "tick overran interval, next tick will be skipped";
                    "elapsed_ms" => elapsed.as_millis(), "interval_ms" => self.interval.as_millis());
            } else {
                info!(tick_log, "tick completed"; "elapsed_ms" => elapsed.as_millis());
            }

            let _ = self.snapshot_tx.send(Some(snapshot.clone()));
            on_tick(spec_snapshot, snapshot).await;
        }
    }

    async fn run_tick(
        &self,
        spec_snapshot: &[(crate::crd::ObjectId, Arc<GslbConfigSpec>)],
        log: &Logger,
    ) -> HealthSnapshot {
        let mut current: HashSet<TargetId> = HashSet::new();
        let mut jobs: Vec<(TargetId, crate::crd::Protocol, std::net::Ipv4Addr, u16, String)> =
            Vec::new();

        for (id, spec) in spec_snapshot {
            for (record_idx, record) in spec.records.iter().enumerate() {
                for (target_idx, target) in record.targets.iter().enumerate() {
                    let target_id: TargetId = (id.clone(), record_idx, target_idx);
                    current.insert(target_id.clone());
                    jobs.push((
                        target_id,
                        target.protocol,
                        target.address,
                        target.port,
                        target.path.clone(),
                    ));
                }
            }
        }

        self.table.reconcile(&current);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let timeout = self.timeout;

        for (target_id, protocol, address, port, path) in jobs {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            join_set.spawn(async move {
                let result = tokio::time::timeout(timeout, probe::run(protocol, address, port, &path)).await;
                drop(permit);
                (target_id, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((target_id, Ok(Ok(())))) => {
                    self.table.record_success(&target_id, Utc::now());
                }
                Ok((target_id, Ok(Err(e)))) => {
                    let err = GslbError::ProbeFailure {
                        target: format!("{target_id:?}"),
                        reason: e.to_string(),
                    };
                    warn!(log, "probe failed"; "error" => %err);
                    self.table.record_failure(&target_id, Utc::now());
                }
                Ok((target_id, Err(_elapsed))) => {
                    let err = GslbError::ProbeFailure {
                        target: format!("{target_id:?}"),
                        reason: "timed out".to_string(),
                    };
                    warn!(log, "probe timed out"; "error" => %err);
                    self.table.record_failure(&target_id, Utc::now());
                }
                Err(join_err) => {
                    error!(log, "probe task panicked"; "error" => %join_err);
                }
            }
        }

        self.table.snapshot()
    }
}
