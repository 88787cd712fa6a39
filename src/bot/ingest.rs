//! Ingestion loop: long-poll updates, keep the cursor, hand events out in order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, UserId};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::api::ThrottledBot;
use super::convert::convert;
use crate::database::CursorFile;
use crate::events::Event;

/// Server-side long-poll timeout, in seconds.
pub const POLL_TIMEOUT_SECS: u32 = 30;

/// Pause after a failed batch fetch.
pub const FETCH_RETRY_DELAY: Duration = Duration::from_secs(15);

/// The cursor is written after this many processed updates.
pub const CURSOR_SAVE_INTERVAL: usize = 100;

/// One fetched update: its id, and the event it carried if it was relevant.
#[derive(Debug)]
pub struct Delivery {
    pub id: u32,
    pub event: Option<Event>,
}

/// Source of update batches.
pub trait UpdateSource: Send {
    /// Fetch updates with id >= `offset`. An empty batch is normal.
    fn poll(
        &mut self,
        offset: Option<u32>,
    ) -> impl Future<Output = anyhow::Result<Vec<Delivery>>> + Send;
}

/// Consumer of events.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: Event) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// `getUpdates` long polling.
pub struct TelegramUpdates {
    bot: ThrottledBot,
    me: UserId,
}

impl TelegramUpdates {
    pub fn new(bot: ThrottledBot, me: UserId) -> Self {
        Self { bot, me }
    }
}

impl UpdateSource for TelegramUpdates {
    async fn poll(&mut self, offset: Option<u32>) -> anyhow::Result<Vec<Delivery>> {
        let mut request = self
            .bot
            .get_updates()
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![
                AllowedUpdate::Message,
                AllowedUpdate::CallbackQuery,
                AllowedUpdate::ChatMember,
            ]);
        if let Some(offset) = offset {
            request = request.offset(i32::try_from(offset)?);
        }

        let updates = request.await?;
        Ok(updates
            .into_iter()
            .map(|update| Delivery {
                id: update.id.0,
                event: convert(update, self.me),
            })
            .collect())
    }
}

/// Drops media-album fragments after the first of a consecutive run.
#[derive(Debug, Default)]
pub struct AlbumFilter {
    current: Option<String>,
}

impl AlbumFilter {
    /// True when the event should be processed.
    pub fn admit(&mut self, event: &Event) -> bool {
        match event.album() {
            Some(album) if self.current.as_deref() == Some(album) => false,
            Some(album) => {
                self.current = Some(album.to_string());
                true
            }
            None => {
                self.current = None;
                true
            }
        }
    }
}

/// The sequential ingestion loop.
pub struct Ingestion<S, H> {
    source: S,
    cursor: CursorFile,
    handler: Arc<H>,
    retry_delay: Duration,
}

impl<S: UpdateSource, H: EventHandler> Ingestion<S, H> {
    pub fn new(source: S, cursor: CursorFile, handler: Arc<H>) -> Self {
        Self {
            source,
            cursor,
            handler,
            retry_delay: FETCH_RETRY_DELAY,
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender goes away).
    ///
    /// Returns the id of the last processed update, which has been saved.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Option<u32> {
        let mut saved = match self.cursor.load().await {
            Ok(last) => last,
            Err(e) => {
                warn!("Starting without a cursor: {}", e);
                None
            }
        };
        let mut last = saved;
        let mut unsaved = 0usize;
        let mut albums = AlbumFilter::default();
        info!("Ingestion starting after update {:?}", last);

        while !*shutdown.borrow() {
            let offset = last.map(|id| id.wrapping_add(1));
            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                batch = self.source.poll(offset) => batch,
            };

            let deliveries = match batch {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    warn!(
                        "Fetching updates failed, retrying in {:?}: {:#}",
                        self.retry_delay, e
                    );
                    last = saved;
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.retry_delay) => continue,
                    }
                }
            };

            for delivery in deliveries {
                if let Some(event) = delivery.event {
                    if albums.admit(&event) {
                        self.dispatch(event).await;
                    } else {
                        debug!("Skipping album fragment in update {}", delivery.id);
                    }
                }

                last = Some(delivery.id);
                unsaved += 1;
                if unsaved >= CURSOR_SAVE_INTERVAL {
                    if self.save(delivery.id).await {
                        saved = last;
                    }
                    unsaved = 0;
                }
            }
        }

        if let Some(id) = last {
            if last != saved {
                self.save(id).await;
            }
        }
        info!("Ingestion stopped at update {:?}", last);
        last
    }

    async fn dispatch(&self, event: Event) {
        match AssertUnwindSafe(self.handler.handle(event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Event handling failed: {:#}", e),
            Err(_) => error!("Event handler panicked; continuing with the next update"),
        }
    }

    async fn save(&self, id: u32) -> bool {
        match self.cursor.save(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cursor not saved: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use teloxide::types::{ChatId, MessageId};

    use crate::events::{ChatRef, IncomingMessage, Sender};
    use crate::testing::person;

    fn message(id: i32, text: &str, album: Option<&str>) -> Event {
        Event::Message(IncomingMessage {
            chat: ChatRef {
                id: ChatId(-100),
                title: "group".into(),
            },
            id: MessageId(id),
            sender: Sender::User(person(1, "ann")),
            text: Some(text.to_string()),
            album: album.map(str::to_string),
            reply_text: None,
        })
    }

    /// Serves scripted batches, then asks the loop to stop.
    ///
    /// Each poll also notes the offset asked for and what the cursor file held.
    struct Script {
        batches: VecDeque<anyhow::Result<Vec<Delivery>>>,
        offsets: Arc<Mutex<Vec<Option<u32>>>>,
        on_disk: Arc<Mutex<Vec<Option<u32>>>>,
        cursor: CursorFile,
        stop: watch::Sender<bool>,
    }

    impl UpdateSource for Script {
        async fn poll(&mut self, offset: Option<u32>) -> anyhow::Result<Vec<Delivery>> {
            self.offsets.lock().push(offset);
            let stored = self.cursor.load().await.unwrap();
            self.on_disk.lock().push(stored);
            match self.batches.pop_front() {
                Some(batch) => batch,
                None => {
                    let _ = self.stop.send(true);
                    std::future::pending().await
                }
            }
        }
    }

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<String>>,
    }

    impl EventHandler for Collect {
        async fn handle(&self, event: Event) -> anyhow::Result<()> {
            let Event::Message(msg) = event else {
                return Ok(());
            };
            let text = msg.text.unwrap_or_default();
            self.seen.lock().push(text.clone());
            match text.as_str() {
                "boom" => panic!("handler blew up"),
                "fail" => anyhow::bail!("handler failed"),
                _ => Ok(()),
            }
        }
    }

    fn deliver(id: u32, event: Event) -> Delivery {
        Delivery {
            id,
            event: Some(event),
        }
    }

    struct Outcome {
        last: Option<u32>,
        seen: Vec<String>,
        offsets: Vec<Option<u32>>,
        on_disk: Vec<Option<u32>>,
    }

    async fn run_script(
        dir: &tempfile::TempDir,
        batches: Vec<anyhow::Result<Vec<Delivery>>>,
    ) -> Outcome {
        let (stop, shutdown) = watch::channel(false);
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let on_disk = Arc::new(Mutex::new(Vec::new()));
        let source = Script {
            batches: batches.into(),
            offsets: Arc::clone(&offsets),
            on_disk: Arc::clone(&on_disk),
            cursor: CursorFile::new(dir.path().join("offset")),
            stop,
        };
        let handler = Arc::new(Collect::default());
        let mut ingestion = Ingestion::new(
            source,
            CursorFile::new(dir.path().join("offset")),
            Arc::clone(&handler),
        );
        ingestion.retry_delay = Duration::from_millis(10);

        let last = ingestion.run(shutdown).await;
        Outcome {
            last,
            seen: handler.seen.lock().clone(),
            offsets: offsets.lock().clone(),
            on_disk: on_disk.lock().clone(),
        }
    }

    #[test]
    fn album_filter_keeps_only_the_first_fragment_of_a_run() {
        let mut filter = AlbumFilter::default();
        assert!(filter.admit(&message(1, "caption", Some("a"))));
        assert!(!filter.admit(&message(2, "", Some("a"))));
        assert!(filter.admit(&message(3, "other", Some("b"))));
        assert!(filter.admit(&message(4, "plain", None)));
        assert!(filter.admit(&message(5, "again", Some("b"))));
    }

    #[tokio::test]
    async fn processes_in_order_and_survives_handler_failures() {
        let dir = tempfile::tempdir().unwrap();
        let batches = vec![Ok(vec![
            deliver(10, message(1, "first", None)),
            deliver(11, message(2, "boom", None)),
            deliver(12, message(3, "fail", None)),
            Delivery { id: 13, event: None },
            deliver(14, message(4, "last", None)),
        ])];

        let outcome = run_script(&dir, batches).await;

        assert_eq!(outcome.seen, vec!["first", "boom", "fail", "last"]);
        assert_eq!(outcome.last, Some(14));
        assert_eq!(outcome.offsets, vec![None, Some(15)]);
        let saved = CursorFile::new(dir.path().join("offset")).load().await.unwrap();
        assert_eq!(saved, Some(14));
    }

    #[tokio::test]
    async fn skips_album_fragments_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let batches = vec![
            Ok(vec![deliver(1, message(1, "photo set", Some("g1")))]),
            Ok(vec![
                deliver(2, message(2, "", Some("g1"))),
                deliver(3, message(3, "", Some("g1"))),
                deliver(4, message(4, "after", None)),
            ]),
        ];

        let outcome = run_script(&dir, batches).await;
        assert_eq!(outcome.seen, vec!["photo set", "after"]);
    }

    #[tokio::test]
    async fn fetch_failure_rewinds_to_the_saved_cursor() {
        let dir = tempfile::tempdir().unwrap();
        CursorFile::new(dir.path().join("offset")).save(99).await.unwrap();

        let batches = vec![
            Ok(vec![deliver(100, message(1, "one", None))]),
            Err(anyhow::anyhow!("network down")),
            Ok(vec![deliver(100, message(1, "one", None))]),
        ];

        let outcome = run_script(&dir, batches).await;
        assert_eq!(outcome.offsets, vec![Some(100), Some(101), Some(100), Some(101)]);
        assert_eq!(outcome.seen, vec!["one", "one"]);
        assert_eq!(outcome.last, Some(100));
    }

    #[tokio::test]
    async fn cursor_is_saved_every_hundred_updates_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let idle = |ids: std::ops::RangeInclusive<u32>| -> anyhow::Result<Vec<Delivery>> {
            Ok(ids.map(|id| Delivery { id, event: None }).collect())
        };
        let batches = vec![idle(1..=60), idle(61..=130), idle(131..=150)];

        let outcome = run_script(&dir, batches).await;

        // Read before each poll: nothing yet, nothing after 60, then the 100th id.
        assert_eq!(outcome.on_disk, vec![None, None, Some(100), Some(100)]);
        assert_eq!(outcome.last, Some(150));
        let saved = CursorFile::new(dir.path().join("offset")).load().await.unwrap();
        assert_eq!(saved, Some(150));
    }
}
