//! Connection manager opening PhantomDB handles for the pool.

use phantomdb_pool::ManageConnection;
use tracing::debug;

use crate::{
    client::{ClientError, PhantomDb},
    http_client::HttpClientConfig,
};

/// Opens [`PhantomDb`] handles bound to a configured base URL.
#[derive(Clone, Debug)]
pub struct PhantomDbManager {
    base_url: String,
    http: HttpClientConfig,
}

impl PhantomDbManager {
    /// Create new manager for the server at `base_url`.
    #[must_use]
    pub fn new(base_url: impl ToString, http: HttpClientConfig) -> Self {
        Self {
            base_url: base_url.to_string(),
            http,
        }
    }

    /// Base URL handles are bound to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl ManageConnection for PhantomDbManager {
    type Connection = PhantomDb;
    type Error = ClientError;

    async fn connect(&self) -> Result<PhantomDb, ClientError> {
        let db = PhantomDb::open(&self.base_url, &self.http).await?;
        debug!(id = db.id(), base_url = self.base_url.as_str(), "opened PhantomDB handle");
        Ok(db)
    }

    fn disconnect(&self, conn: PhantomDb) {
        debug!(id = conn.id(), "closing PhantomDB handle");
    }
}
