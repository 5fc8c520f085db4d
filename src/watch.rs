//! Watch consumer: adapts the platform's add/modify/delete event stream
//! into `SpecStore` mutations, with reconnect-with-backoff and atomic
//! relist on resync.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, Client};
use slog::{error, info, Logger};

use crate::crd::{GslbConfig, ObjectId};
use crate::error::GslbError;
use crate::store::SpecStore;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Runs forever, restarting the underlying watch with exponential backoff
/// whenever the stream ends.
pub async fn run(client: Client, store: Arc<SpecStore>, log: Logger) {
    let api: Api<GslbConfig> = Api::all(client);
    let mut backoff = INITIAL_BACKOFF;

    loop {
        info!(log, "starting GslbConfig watch");
        let mut stream = watcher::watcher(api.clone(), watcher::Config::default()).boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Applied(obj)) => {
                    apply_object(&store, &log, obj);
                    backoff = INITIAL_BACKOFF;
                }
                Ok(watcher::Event::Deleted(obj)) => {
                    if let Some(id) = object_id(&obj) {
                        info!(log, "removing config"; "id" => format!("{}/{}", id.0, id.1));
                        store.remove(&id);
                    }
                    backoff = INITIAL_BACKOFF;
                }
                Ok(watcher::Event::Restarted(objs)) => {
                    // Relist is a single atomic replace of the store
                    // contents, not per-object apply/remove.
                    info!(log, "watch restarted, performing atomic relist"; "count" => objs.len());
                    let objects = objs
                        .into_iter()
                        .filter_map(|obj| object_id(&obj).map(|id| (id, obj.spec)))
                        .collect();
                    store.replace_all(objects);
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    let err = GslbError::WatchDisconnect {
                        reason: e.to_string(),
                    };
                    error!(log, "watch stream error"; "error" => %err);
                    break;
                }
            }
        }

        info!(log, "watch stream ended, reconnecting"; "backoff_secs" => backoff.as_secs());
        tokio::time::sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
    }
}

fn object_id(obj: &GslbConfig) -> Option<ObjectId> {
    let namespace = obj.metadata.namespace.clone()?;
    let name = obj.metadata.name.clone()?;
    Some((namespace, name))
}

fn apply_object(store: &SpecStore, log: &Logger, obj: GslbConfig) {
    let Some(id) = object_id(&obj) else {
        error!(log, "ignoring object with no namespace/name");
        return;
    };
    if let Err(e) = store.apply(id.clone(), obj.spec) {
        error!(log, "rejected config"; "id" => format!("{}/{}", id.0, id.1), "error" => %e);
    } else {
        info!(log, "applied config"; "id" => format!("{}/{}", id.0, id.1));
    }
}
