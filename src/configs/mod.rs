use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{api::error::ChatError, ENV};

pub async fn connect_database() -> Result<PgPool, ChatError> {
    let database_url = &ENV.database_url;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_slow_threshold(std::time::Duration::from_secs(3))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| ChatError::Store(e.to_string().into()))?;

    Ok(pool)
}
