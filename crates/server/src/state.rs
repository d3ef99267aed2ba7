use std::sync::Arc;

use dropgate_events::EventBus;
use dropgate_protocol::Config;
use dropgate_upload::{RecordStore, UploadManager};

/// Shared application state handed to every handler.
///
/// All components are constructed once at process start and passed by
/// reference; nothing here is a global.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub manager: Arc<UploadManager>,
    pub records: Arc<dyn RecordStore>,
    pub bus: Arc<EventBus>,
}
