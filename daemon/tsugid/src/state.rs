use std::sync::Arc;
use tsugi_domain::store::{AuditStore, UpdateRecordStore};
use tsugi_infra_db::SqliteStore;
use tsugi_updater::Updater;

#[derive(Clone)]
pub struct AppState {
    pub updater: Arc<Updater>,
    pub records: Arc<dyn UpdateRecordStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(updater: Updater, store: Arc<SqliteStore>) -> Self {
        Self {
            updater: Arc::new(updater),
            records: store.clone(),
            audit: store,
        }
    }
}
