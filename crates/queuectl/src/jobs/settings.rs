//! Runtime queue settings, persisted as key/value rows in `settings`.
//!
//! Values are validated before anything is written; a rejected `set` leaves
//! the stored settings untouched.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::SettingsError;
use crate::jobs::model::{format_ts, now_utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub backoff_base: u32,
    pub default_max_retries: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backoff_base: 2,
            default_max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    BackoffBase,
    DefaultMaxRetries,
}

impl SettingKey {
    pub fn parse(key: &str) -> Result<Self, SettingsError> {
        match key.trim() {
            "backoff-base" | "backoff_base" => Ok(Self::BackoffBase),
            "default-max-retries" | "default_max_retries" | "max-retries" => {
                Ok(Self::DefaultMaxRetries)
            }
            other => Err(SettingsError::UnknownKey(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackoffBase => "backoff_base",
            Self::DefaultMaxRetries => "default_max_retries",
        }
    }
}

impl QueueSettings {
    /// Validate `value` for `key` and return the updated settings.
    pub fn with(self, key: SettingKey, value: &str) -> Result<Self, SettingsError> {
        let parsed: u32 = value.trim().parse().map_err(|e| SettingsError::InvalidValue {
            key: key.as_str(),
            value: value.to_string(),
            reason: format!("{e}"),
        })?;

        let mut next = self;
        match key {
            SettingKey::BackoffBase => {
                if parsed < 1 {
                    return Err(SettingsError::InvalidValue {
                        key: key.as_str(),
                        value: value.to_string(),
                        reason: "must be >= 1".to_string(),
                    });
                }
                next.backoff_base = parsed;
            }
            SettingKey::DefaultMaxRetries => next.default_max_retries = parsed,
        }
        Ok(next)
    }
}

#[derive(Clone)]
pub struct SettingsRepo {
    pool: SqlitePool,
}

impl SettingsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored settings layered over the defaults.
    pub async fn load(&self) -> Result<QueueSettings, SettingsError> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        let mut settings = QueueSettings::default();
        for (key, value) in rows {
            // Keys written by a newer version are skipped, not fatal.
            let Ok(key) = SettingKey::parse(&key) else {
                tracing::warn!(key = %key, "ignoring unknown stored setting");
                continue;
            };
            settings = settings.with(key, &value)?;
        }
        Ok(settings)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<QueueSettings, SettingsError> {
        let key = SettingKey::parse(key)?;
        let updated = self.load().await?.with(key, value)?;

        let stored = match key {
            SettingKey::BackoffBase => updated.backoff_base,
            SettingKey::DefaultMaxRetries => updated.default_max_retries,
        };

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE
            SET value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.as_str())
        .bind(stored.to_string())
        .bind(format_ts(now_utc()))
        .execute(&self.pool)
        .await?;

        tracing::info!(key = key.as_str(), value = stored, "setting updated");
        Ok(updated)
    }
}
