use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::kernel::TokenRecord;

/// SlackToken model - SQL persistence layer
///
/// One row per authorizing user; re-authorizing replaces the token.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SlackToken {
    pub user_id: String,
    pub team_id: String,
    pub team_name: Option<String>,
    pub access_token: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlackToken {
    /// Find the token for a Slack user
    pub async fn find_by_user_id(user_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM slack_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Insert or replace the token for `record.user_id`
    pub async fn upsert(record: &TokenRecord, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO slack_tokens (user_id, team_id, team_name, access_token)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE
             SET team_id = EXCLUDED.team_id,
                 team_name = EXCLUDED.team_name,
                 access_token = EXCLUDED.access_token,
                 updated_at = NOW()
             RETURNING *",
        )
        .bind(&record.user_id)
        .bind(&record.team_id)
        .bind(&record.team_name)
        .bind(&record.access_token)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}

impl From<SlackToken> for TokenRecord {
    fn from(token: SlackToken) -> Self {
        Self {
            user_id: token.user_id,
            team_id: token.team_id,
            team_name: token.team_name,
            access_token: token.access_token,
        }
    }
}
