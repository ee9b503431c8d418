mod auth;
mod db;
mod enrichment;
mod queues;
mod streams;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use db::*;
pub use enrichment::*;
pub use queues::*;
pub use streams::*;

use upqueue_core::Config;

/// The upqueue collab system, facilitating streams, voting, authentication, and more.
pub struct Collab {
    pub database: Arc<dyn Database>,

    pub auth: Auth,
    pub streams: StreamManager,
}

impl Collab {
    pub fn new(database: Arc<dyn Database>, source: Arc<dyn MetadataSource>, config: Config) -> Self {
        let enrichment = Enrichment::new(source);

        Self {
            auth: Auth::new(&database),
            streams: StreamManager::new(&database, enrichment, config),
            database,
        }
    }
}
