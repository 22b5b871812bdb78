use crate::config::Config;
use crate::store::MongoStore;
use crate::sync_server::SyncServer;
use actix::Addr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub sync_server: Addr<SyncServer>,
    pub store: Arc<MongoStore>,
    pub config: Config,
}
