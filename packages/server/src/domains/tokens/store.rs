use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::models::SlackToken;
use crate::kernel::{BaseTokenStore, TokenRecord};

/// `BaseTokenStore` over the `slack_tokens` table.
#[derive(Clone)]
pub struct PostgresTokenStore {
    pool: PgPool,
}

impl PostgresTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseTokenStore for PostgresTokenStore {
    async fn get_token_by_user_id(&self, user_id: &str) -> Result<Option<TokenRecord>> {
        let token = SlackToken::find_by_user_id(user_id, &self.pool)
            .await
            .with_context(|| format!("failed to load token for user {}", user_id))?;
        Ok(token.map(Into::into))
    }
}
