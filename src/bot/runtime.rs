//! Bot runtime - the ingestion loop plus periodic housekeeping, until ctrl-c.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::api::ChatActions;
use super::ingest::{Ingestion, UpdateSource};
use crate::database::TrustSnapshotFile;
use crate::moderation::{Moderator, is_digest_hour};

/// How often timed-out challenges are failed.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// The digest hour is checked this often, so it fires once per day.
pub const DIGEST_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// How often ham counters are written to disk.
pub const TRUST_SAVE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run `job` every `period` (first run after one period) until shutdown.
fn every<F, Fut>(
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => job().await,
            }
        }
    })
}

async fn save_trust<A: ChatActions>(moderator: &Moderator<A>, file: &TrustSnapshotFile) {
    let counts = moderator.trust_snapshot();
    match file.save(&counts).await {
        Ok(()) => debug!("Saved {} trust counters", counts.len()),
        Err(e) => warn!("Saving trust counters failed: {}", e),
    }
}

/// Run ingestion and housekeeping until ctrl-c, then flush state.
pub async fn run<S, A>(
    moderator: Arc<Moderator<A>>,
    ingestion: Ingestion<S, Moderator<A>>,
    trust_file: TrustSnapshotFile,
    digest_hour: u32,
) where
    S: UpdateSource,
    A: ChatActions,
{
    let (stop, shutdown) = watch::channel(false);
    let trust_file = Arc::new(trust_file);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Cannot listen for ctrl-c, stopping: {}", e),
        }
        let _ = stop.send(true);
    });

    let sweeper = {
        let moderator = Arc::clone(&moderator);
        every(SWEEP_INTERVAL, shutdown.clone(), move || {
            let moderator = Arc::clone(&moderator);
            async move {
                let failed = moderator.sweep_challenges().await;
                if failed > 0 {
                    info!("{} challenges timed out", failed);
                }
            }
        })
    };

    let digest = {
        let moderator = Arc::clone(&moderator);
        every(DIGEST_CHECK_INTERVAL, shutdown.clone(), move || {
            let moderator = Arc::clone(&moderator);
            async move {
                if is_digest_hour(&Local::now(), digest_hour) && !moderator.send_digest().await {
                    debug!("Nothing to report in today's digest");
                }
            }
        })
    };

    let saver = {
        let moderator = Arc::clone(&moderator);
        let trust_file = Arc::clone(&trust_file);
        every(TRUST_SAVE_INTERVAL, shutdown.clone(), move || {
            let moderator = Arc::clone(&moderator);
            let trust_file = Arc::clone(&trust_file);
            async move { save_trust(&moderator, &trust_file).await }
        })
    };

    info!("Gatekeeper is running");
    ingestion.run(shutdown).await;

    for task in [sweeper, digest, saver] {
        let _ = task.await;
    }
    save_trust(&moderator, &trust_file).await;
    info!("Gatekeeper stopped");
}
