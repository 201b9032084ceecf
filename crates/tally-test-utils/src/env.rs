// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A throwaway journal: temp SQLite file, one seeded user, and a quota
//! manager wired to the same database.

use rusqlite::params;
use tally_config::model::TallyConfig;
use tally_core::{PlanTier, TallyError, UserProfile};
use tally_quota::QuotaManager;
use tally_storage::queries::{profiles, trades};
use tally_storage::{Database, NewTrade, Trade, map_tr_err};
use tempfile::TempDir;

pub struct TestEnv {
    pub config: TallyConfig,
    pub db: Database,
    pub quota: QuotaManager,
    pub user: UserProfile,
    _dir: TempDir,
}

impl TestEnv {
    /// A FREE user on default configuration.
    pub async fn new() -> Result<Self, TallyError> {
        Self::with_plan(PlanTier::Free).await
    }

    pub async fn with_plan(plan: PlanTier) -> Result<Self, TallyError> {
        Self::with_config(TallyConfig::default(), plan).await
    }

    /// Uses `config` except for the database path, which points into a temp dir.
    pub async fn with_config(mut config: TallyConfig, plan: PlanTier) -> Result<Self, TallyError> {
        let dir = TempDir::new().map_err(|e| TallyError::Storage { source: e.into() })?;
        config.storage.database_path = dir.path().join("tally.db").to_string_lossy().to_string();

        let db = Database::open_with_config(&config.storage).await?;
        let quota = QuotaManager::from_config(db.clone(), &config)?;
        let user_id = tally_core::UserId::new();
        profiles::create_profile(&db, user_id, plan).await?;
        let user = quota
            .profile(user_id)
            .await?
            .ok_or_else(|| TallyError::Internal("seeded profile missing".into()))?;

        Ok(Self {
            config,
            db,
            quota,
            user,
            _dir: dir,
        })
    }

    /// Record a trade and close it right away.
    pub async fn add_closed_trade(
        &self,
        symbol: &str,
        direction: &str,
        entry_price: f64,
        exit_price: f64,
        exit_time: &str,
    ) -> Result<Trade, TallyError> {
        let open = trades::insert_trade(
            &self.db,
            self.user.id,
            &NewTrade::open(symbol, direction, entry_price, exit_time),
        )
        .await?;
        trades::close_trade(&self.db, self.user.id, &open.id, exit_price, exit_time)
            .await?
            .ok_or_else(|| TallyError::Internal("trade did not close".into()))
    }

    pub async fn add_open_trade(&self, symbol: &str, entry_price: f64) -> Result<Trade, TallyError> {
        trades::insert_trade(
            &self.db,
            self.user.id,
            &NewTrade::open(symbol, "LONG", entry_price, &tally_storage::now_timestamp()),
        )
        .await
    }

    /// The persisted monthly token counter.
    pub async fn tokens_used(&self) -> Result<i64, TallyError> {
        Ok(profiles::get_profile(&self.db, self.user.id)
            .await?
            .map(|p| p.monthly_ai_tokens_used)
            .unwrap_or_default())
    }

    /// Overwrite the monthly token counter, bypassing the quota manager.
    pub async fn set_tokens_used(&self, used: i64) -> Result<(), TallyError> {
        let uid = self.user.id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE user_profiles SET monthly_ai_tokens_used = ?2 WHERE id = ?1",
                    params![uid, used],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.quota.cache().invalidate(self.user.id);
        Ok(())
    }

    /// Re-read the seeded user's profile.
    pub async fn refresh_user(&mut self) -> Result<&UserProfile, TallyError> {
        self.quota.cache().invalidate(self.user.id);
        if let Some(profile) = self.quota.profile(self.user.id).await? {
            self.user = profile;
        }
        Ok(&self.user)
    }
}
