use clap::Parser;

use crate::{db::Db, prelude::*};

#[derive(Parser)]
pub struct DbArgs {
    /// The URI *must* specify the database name.
    #[clap(long = "mongodb-uri", env = "MONGODB_URI", hide_env_values = true)]
    uri: String,
}

impl DbArgs {
    pub async fn connect(&self) -> Result<Db> {
        Db::with_uri(&self.uri).await
    }
}
