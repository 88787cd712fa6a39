//! Bot module - the Telegram side: action API, update conversion, ingestion, runtime.

mod api;
mod convert;
mod ingest;
mod runtime;

pub use api::{Button, ChatActions, TelegramActions};
pub use ingest::{EventHandler, Ingestion, TelegramUpdates};
pub use runtime::run;
