//! Test fixtures for creating test data.

use anyhow::Result;
use janitor_core::domains::tokens::SlackToken;
use janitor_core::kernel::TokenRecord;
use sqlx::PgPool;

/// Store an access token for `user_id`
pub async fn create_test_token(pool: &PgPool, user_id: &str, access_token: &str) -> Result<()> {
    let record = TokenRecord {
        user_id: user_id.to_string(),
        team_id: "T0001".to_string(),
        team_name: Some("Test Team".to_string()),
        access_token: access_token.to_string(),
    };
    SlackToken::upsert(&record, pool).await?;
    Ok(())
}
