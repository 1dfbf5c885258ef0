pub mod statistics;

use mongodb::{Client, Database};

use crate::{db::statistics::Statistics, prelude::*};

#[must_use]
pub struct Db {
    client: Client,
    inner: Database,
}

impl Db {
    /// Connect to the database with the specified URI.
    ///
    /// The URI *must* specify the database name.
    #[instrument(skip_all)]
    pub async fn with_uri(uri: &str) -> Result<Self> {
        info!("connecting…");
        let client = Client::with_uri_str(uri).await.context("failed to connect to MongoDB")?;
        let inner = client
            .default_database()
            .context("MongoDB URI does not define the default database")?;
        Ok(Self { client, inner })
    }

    /// Statistics store with the indices in place.
    pub async fn statistics(&self) -> Result<Statistics> {
        Statistics::initialize(&self.inner).await
    }

    pub async fn shutdown(self) {
        info!("shutting down…");
        self.client.shutdown().await;
    }
}
