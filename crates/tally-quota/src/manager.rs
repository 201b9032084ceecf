// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plan enforcement against the persisted usage counters.
//!
//! Every counter change is a single conditional `UPDATE` (or one
//! transaction) on the store, so concurrent requests for the same user need
//! no in-process lock. Reservations use the estimate, not actual usage, and
//! a rollback returns that same estimate: the counter is eventually
//! consistent with real spend, never exact.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tally_config::model::{PlanLimits, PlansConfig, TallyConfig};
use tally_core::{PlanTier, TallyError, UserId, UserProfile};
use tally_storage::database::TIMESTAMP_FORMAT;
use tally_storage::queries::{profiles, trades};
use tally_storage::{Database, UsageLog};
use tracing::{debug, error, info, warn};

use crate::cache::ProfileCache;
use crate::plans::Feature;
use crate::usage_log::{self, UsageEntry};

/// A provisional token deduction made before a paid LLM call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReservation {
    pub user_id: UserId,
    pub estimated_total: i64,
    /// False for unlimited plans, where nothing was deducted.
    pub applied: bool,
    /// Set once the call succeeded; committed reservations are never rolled back.
    pub committed: bool,
}

impl TokenReservation {
    pub fn commit(&mut self) {
        self.committed = true;
    }
}

/// Used vs. allowed for one counter. `limit: None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageCounter {
    pub used: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub plan: PlanTier,
    pub chat: UsageCounter,
    pub imports: UsageCounter,
    pub ai_tokens: UsageCounter,
}

enum ReserveOutcome {
    Reserved(i64),
    Exceeded(i64),
    UnknownUser,
}

#[derive(Clone)]
pub struct QuotaManager {
    db: Database,
    plans: PlansConfig,
    cache: Arc<ProfileCache>,
    max_tokens_per_request: i64,
    default_plan: PlanTier,
}

impl QuotaManager {
    pub fn new(
        db: Database,
        config: &TallyConfig,
        cache: Arc<ProfileCache>,
    ) -> Result<Self, TallyError> {
        let default_plan = PlanTier::normalize(&config.quota.default_plan).ok_or_else(|| {
            TallyError::Config(format!(
                "quota.default_plan '{}' is not a known plan",
                config.quota.default_plan
            ))
        })?;
        Ok(Self {
            db,
            plans: config.plans.clone(),
            cache,
            max_tokens_per_request: config.quota.max_tokens_per_request,
            default_plan,
        })
    }

    /// Builds a manager with its own cache using `quota.cache_ttl_secs`.
    pub fn from_config(db: Database, config: &TallyConfig) -> Result<Self, TallyError> {
        let cache = Arc::new(ProfileCache::new(Duration::from_secs(
            config.quota.cache_ttl_secs,
        )));
        Self::new(db, config, cache)
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn default_plan(&self) -> PlanTier {
        self.default_plan
    }

    pub fn limits(&self, plan: PlanTier) -> &PlanLimits {
        self.plans.limits(plan)
    }

    // --- Profiles ---

    /// The user's profile, from cache when fresh.
    pub async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, TallyError> {
        if let Some(profile) = self.cache.get(user_id) {
            return Ok(Some(profile));
        }
        let profile = profiles::get_profile(&self.db, user_id)
            .await?
            .map(|row| row.into_profile(self.default_plan));
        if let Some(p) = &profile {
            self.cache.put(p.clone());
        }
        Ok(profile)
    }

    /// Fetches the profile, creating it on the default plan if absent.
    pub async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile, TallyError> {
        if let Some(profile) = self.profile(user_id).await? {
            return Ok(profile);
        }
        let profile = profiles::create_profile(&self.db, user_id, self.default_plan)
            .await?
            .into_profile(self.default_plan);
        info!(user_id = %user_id, plan = %profile.plan_tier, "profile created");
        self.cache.put(profile.clone());
        Ok(profile)
    }

    /// Re-plans a user. Returns the normalized tier.
    pub async fn set_plan_tier(&self, user_id: UserId, plan: &str) -> Result<PlanTier, TallyError> {
        let tier = PlanTier::normalize(plan)
            .ok_or_else(|| TallyError::InvalidInput(format!("unknown plan '{plan}'")))?;
        if !profiles::set_plan_tier(&self.db, user_id, plan).await? {
            return Err(TallyError::InvalidInput(format!("unknown user {user_id}")));
        }
        self.cache.invalidate(user_id);
        info!(user_id = %user_id, plan = %tier, "plan changed");
        Ok(tier)
    }

    // --- Feature gates ---

    /// Denies with [`TallyError::FeatureLocked`] unless the plan allows `feature`.
    ///
    /// A denial is only final after the persisted plan has been re-read, so
    /// an upgrade is honored even while an old profile is cached.
    pub async fn require_feature(
        &self,
        profile: &UserProfile,
        feature: Feature,
    ) -> Result<(), TallyError> {
        if feature.allowed_by(self.limits(profile.plan_tier)) {
            return Ok(());
        }

        let mut plan = profile.plan_tier;
        match profiles::get_profile(&self.db, profile.id).await {
            Ok(Some(row)) => {
                let fresh = row.into_profile(self.default_plan);
                plan = fresh.plan_tier;
                if feature.allowed_by(self.limits(plan)) {
                    self.cache.put(fresh);
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => warn!(user_id = %profile.id, error = %e, "failed to re-read plan for feature check"),
        }

        warn!(user_id = %profile.id, %feature, %plan, "feature locked");
        Err(TallyError::FeatureLocked {
            feature: feature.to_string(),
        })
    }

    // --- AI tokens ---

    /// Cheap pre-check against the profile's counters, run before a turn
    /// spends anything. The authoritative check is the reservation itself.
    pub fn check_ai_tokens(&self, profile: &UserProfile) -> Result<(), TallyError> {
        let Some(limit) = self.limits(profile.plan_tier).monthly_ai_tokens_limit else {
            return Ok(());
        };
        let (_, used) = monthly_counts(profile, &month_start(Utc::now()));
        if used >= limit {
            info!(user_id = %profile.id, used, limit, "AI token limit already reached");
            return Err(TallyError::QuotaExceeded {
                message: "AI token limit exceeded".into(),
            });
        }
        Ok(())
    }

    /// Reserve `estimated_tokens` against the monthly AI token limit.
    ///
    /// Runs before any paid call. The monthly reset and the conditional
    /// increment share one transaction.
    pub async fn reserve_ai_tokens(
        &self,
        profile: &UserProfile,
        estimated_tokens: i64,
    ) -> Result<TokenReservation, TallyError> {
        if estimated_tokens <= 0 {
            return Err(TallyError::InvalidInput(format!(
                "token estimate must be positive, got {estimated_tokens}"
            )));
        }
        if estimated_tokens > self.max_tokens_per_request {
            return Err(TallyError::QuotaExceeded {
                message: "request too large".into(),
            });
        }

        let user_id = profile.id;
        let Some(limit) = self.limits(profile.plan_tier).monthly_ai_tokens_limit else {
            debug!(user_id = %user_id, plan = %profile.plan_tier, "unlimited plan, nothing reserved");
            return Ok(TokenReservation {
                user_id,
                estimated_total: estimated_tokens,
                applied: false,
                committed: false,
            });
        };

        let uid = user_id.to_string();
        let now = Utc::now();
        let now_ts = format_ts(now);
        let month = month_start(now);
        let outcome = self
            .db
            .connection()
            .call(move |conn| -> Result<ReserveOutcome, rusqlite::Error> {
                let tx = conn.transaction()?;
                reset_monthly_if_due(&tx, &uid, &now_ts, &month)?;
                let reserved: Option<i64> = tx
                    .query_row(
                        "UPDATE user_profiles
                         SET monthly_ai_tokens_used = monthly_ai_tokens_used + ?2
                         WHERE id = ?1 AND monthly_ai_tokens_used + ?2 <= ?3
                         RETURNING monthly_ai_tokens_used",
                        params![uid, estimated_tokens, limit],
                        |row| row.get(0),
                    )
                    .optional()?;
                let outcome = match reserved {
                    Some(used) => ReserveOutcome::Reserved(used),
                    None => match tx
                        .query_row(
                            "SELECT monthly_ai_tokens_used FROM user_profiles WHERE id = ?1",
                            params![uid],
                            |row| row.get(0),
                        )
                        .optional()?
                    {
                        Some(used) => ReserveOutcome::Exceeded(used),
                        None => ReserveOutcome::UnknownUser,
                    },
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await
            .map_err(|e| unavailable("token reservation", e))?;

        match outcome {
            ReserveOutcome::Reserved(used) => {
                self.cache.update_tokens_used(user_id, used);
                debug!(user_id = %user_id, reserved = estimated_tokens, used, limit, "tokens reserved");
                Ok(TokenReservation {
                    user_id,
                    estimated_total: estimated_tokens,
                    applied: true,
                    committed: false,
                })
            }
            ReserveOutcome::Exceeded(used) => {
                self.cache.update_tokens_used(user_id, used);
                info!(user_id = %user_id, requested = estimated_tokens, used, limit, "AI token limit exceeded");
                Err(TallyError::QuotaExceeded {
                    message: "AI token limit exceeded".into(),
                })
            }
            ReserveOutcome::UnknownUser => {
                Err(TallyError::InvalidInput(format!("unknown user {user_id}")))
            }
        }
    }

    /// Return a failed call's reservation.
    ///
    /// Only subtracts when the stored counter still holds at least the
    /// reserved amount, so concurrent rollbacks (or a monthly reset in
    /// between) can never drive it negative. Returns the new counter, or
    /// `None` when nothing was subtracted.
    pub async fn rollback(
        &self,
        reservation: TokenReservation,
    ) -> Result<Option<i64>, TallyError> {
        if !reservation.applied || reservation.committed {
            debug!(
                user_id = %reservation.user_id,
                applied = reservation.applied,
                committed = reservation.committed,
                "rollback not needed"
            );
            return Ok(None);
        }

        let uid = reservation.user_id.to_string();
        let amount = reservation.estimated_total;
        let remaining = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
                conn.query_row(
                    "UPDATE user_profiles
                     SET monthly_ai_tokens_used = monthly_ai_tokens_used - ?2
                     WHERE id = ?1 AND monthly_ai_tokens_used >= ?2
                     RETURNING monthly_ai_tokens_used",
                    params![uid, amount],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(|e| unavailable("token rollback", e))?;

        match remaining {
            Some(used) => {
                self.cache.update_tokens_used(reservation.user_id, used);
                info!(user_id = %reservation.user_id, amount, used, "rolled back reserved tokens");
            }
            None => warn!(
                user_id = %reservation.user_id,
                amount,
                "rollback skipped, counter below reserved amount"
            ),
        }
        Ok(remaining)
    }

    // --- Daily chat ---

    pub async fn check_daily_chat(&self, profile: &UserProfile) -> Result<(), TallyError> {
        let limit = self.limits(profile.plan_tier).daily_chat_msgs;
        let used = chat_count_today(profile, &day_start(Utc::now()));
        if used >= limit {
            info!(user_id = %profile.id, used, limit, "daily chat limit reached");
            return Err(TallyError::QuotaExceeded {
                message: format!("daily chat limit of {limit} messages reached"),
            });
        }
        Ok(())
    }

    /// Count one chat message, starting over on a new UTC day.
    pub async fn increment_daily_chat(&self, user_id: UserId) -> Result<i64, TallyError> {
        let uid = user_id.to_string();
        let now = Utc::now();
        let now_ts = format_ts(now);
        let today = day_start(now);
        let updated = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<(i64, String)>, rusqlite::Error> {
                conn.query_row(
                    "UPDATE user_profiles
                     SET daily_chat_count = CASE
                             WHEN last_chat_reset_at IS NULL OR last_chat_reset_at < ?3 THEN 1
                             ELSE daily_chat_count + 1
                         END,
                         last_chat_reset_at = ?2
                     WHERE id = ?1
                     RETURNING daily_chat_count, last_chat_reset_at",
                    params![uid, now_ts, today],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .map_err(|e| unavailable("chat counter", e))?;

        let (count, stamp) =
            updated.ok_or_else(|| TallyError::InvalidInput(format!("unknown user {user_id}")))?;
        self.cache.modify(user_id, |p| {
            p.daily_chat_count = count;
            p.last_chat_reset_at = Some(stamp);
        });
        Ok(count)
    }

    // --- Journal size ---

    /// Denies a new trade once the plan's journal is full.
    pub async fn check_trade_capacity(&self, profile: &UserProfile) -> Result<(), TallyError> {
        let limit = self.limits(profile.plan_tier).max_total_trades;
        let count = trades::count_trades(&self.db, profile.id)
            .await
            .map_err(|e| unavailable("trade count", e))?;
        if count >= limit {
            info!(user_id = %profile.id, count, limit, "trade limit reached");
            return Err(TallyError::QuotaExceeded {
                message: format!("trade limit of {limit} reached"),
            });
        }
        Ok(())
    }

    // --- CSV imports ---

    pub async fn check_csv_import(&self, profile: &UserProfile) -> Result<(), TallyError> {
        let limit = self.limits(profile.plan_tier).monthly_csv_imports;
        let (used, _) = monthly_counts(profile, &month_start(Utc::now()));
        if used >= limit {
            return Err(TallyError::QuotaExceeded {
                message: format!("monthly CSV import limit of {limit} reached"),
            });
        }
        Ok(())
    }

    /// Count one CSV import, starting over on a new UTC month.
    pub async fn increment_csv_import(&self, user_id: UserId) -> Result<i64, TallyError> {
        let uid = user_id.to_string();
        let now = Utc::now();
        let now_ts = format_ts(now);
        let month = month_start(now);
        let count = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
                let tx = conn.transaction()?;
                reset_monthly_if_due(&tx, &uid, &now_ts, &month)?;
                let count = tx
                    .query_row(
                        "UPDATE user_profiles SET monthly_import_count = monthly_import_count + 1
                         WHERE id = ?1 RETURNING monthly_import_count",
                        params![uid],
                        |row| row.get(0),
                    )
                    .optional()?;
                tx.commit()?;
                Ok(count)
            })
            .await
            .map_err(|e| unavailable("import counter", e))?
            .ok_or_else(|| TallyError::InvalidInput(format!("unknown user {user_id}")))?;

        // A reset may have zeroed the token counter too.
        self.cache.invalidate(user_id);
        Ok(count)
    }

    // --- Reporting ---

    /// Current usage against the plan, read from the store.
    pub async fn usage(&self, user_id: UserId) -> Result<Option<UsageReport>, TallyError> {
        let Some(row) = profiles::get_profile(&self.db, user_id)
            .await
            .map_err(|e| unavailable("usage report", e))?
        else {
            return Ok(None);
        };
        let profile = row.into_profile(self.default_plan);
        let limits = self.limits(profile.plan_tier);
        let now = Utc::now();
        let (imports, tokens) = monthly_counts(&profile, &month_start(now));

        Ok(Some(UsageReport {
            plan: profile.plan_tier,
            chat: UsageCounter {
                used: chat_count_today(&profile, &day_start(now)),
                limit: Some(limits.daily_chat_msgs),
            },
            imports: UsageCounter {
                used: imports,
                limit: Some(limits.monthly_csv_imports),
            },
            ai_tokens: UsageCounter {
                used: tokens,
                limit: limits.monthly_ai_tokens_limit,
            },
        }))
    }

    /// Persist one finished call.
    pub async fn log_usage(&self, entry: UsageEntry) -> Result<UsageLog, TallyError> {
        usage_log::record(&self.db, entry).await
    }
}

fn unavailable(what: &str, e: impl std::fmt::Display) -> TallyError {
    error!(error = %e, "{what} failed");
    TallyError::QuotaUnavailable {
        message: format!("{what} failed"),
    }
}

/// Zero the monthly counters when the last reset predates `month_start`.
fn reset_monthly_if_due(
    conn: &rusqlite::Connection,
    uid: &str,
    now_ts: &str,
    month_start: &str,
) -> Result<(), rusqlite::Error> {
    let reset = conn.execute(
        "UPDATE user_profiles
         SET monthly_ai_tokens_used = 0, monthly_import_count = 0, quota_reset_at = ?2
         WHERE id = ?1 AND (quota_reset_at IS NULL OR quota_reset_at < ?3)",
        params![uid, now_ts, month_start],
    )?;
    if reset > 0 {
        debug!(user_id = uid, "monthly counters reset");
    }
    Ok(())
}

fn format_ts(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn day_start(now: DateTime<Utc>) -> String {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| format_ts(t.and_utc()))
        .unwrap_or_else(|| format_ts(now))
}

fn month_start(now: DateTime<Utc>) -> String {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| format_ts(t.and_utc()))
        .unwrap_or_else(|| format_ts(now))
}

fn chat_count_today(profile: &UserProfile, day_start: &str) -> i64 {
    match profile.last_chat_reset_at.as_deref() {
        Some(last) if last >= day_start => profile.daily_chat_count,
        _ => 0,
    }
}

/// `(imports, tokens)` after any pending monthly reset.
fn monthly_counts(profile: &UserProfile, month_start: &str) -> (i64, i64) {
    match profile.quota_reset_at.as_deref() {
        Some(reset) if reset >= month_start => {
            (profile.monthly_import_count, profile.monthly_ai_tokens_used)
        }
        _ => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use tally_storage::now_timestamp;

    use super::*;

    async fn setup(plan: PlanTier) -> (QuotaManager, UserProfile) {
        let db = Database::open_in_memory().await.unwrap();
        let manager = QuotaManager::from_config(db, &TallyConfig::default()).unwrap();
        let user = UserId::new();
        profiles::create_profile(manager.database(), user, plan)
            .await
            .unwrap();
        let profile = manager.profile(user).await.unwrap().unwrap();
        (manager, profile)
    }

    async fn exec(manager: &QuotaManager, sql: &'static str, uid: UserId, value: String) {
        let uid = uid.to_string();
        manager
            .database()
            .connection()
            .call(move |conn| conn.execute(sql, params![uid, value]))
            .await
            .unwrap();
    }

    async fn stored_tokens(manager: &QuotaManager, user: UserId) -> i64 {
        profiles::get_profile(manager.database(), user)
            .await
            .unwrap()
            .unwrap()
            .monthly_ai_tokens_used
    }

    #[tokio::test]
    async fn reserve_within_limit_updates_store_and_cache() {
        let (manager, profile) = setup(PlanTier::Free).await;
        let reservation = manager.reserve_ai_tokens(&profile, 1_200).await.unwrap();
        assert!(reservation.applied);
        assert!(!reservation.committed);
        assert_eq!(stored_tokens(&manager, profile.id).await, 1_200);
        assert_eq!(
            manager.cache().get(profile.id).unwrap().monthly_ai_tokens_used,
            1_200
        );
    }

    #[tokio::test]
    async fn reserve_over_limit_leaves_counter_alone() {
        let (manager, profile) = setup(PlanTier::Free).await;
        exec(
            &manager,
            "UPDATE user_profiles SET monthly_ai_tokens_used = ?2 WHERE id = ?1",
            profile.id,
            "49500".into(),
        )
        .await;

        let err = manager.reserve_ai_tokens(&profile, 600).await.unwrap_err();
        assert!(matches!(err, TallyError::QuotaExceeded { .. }));
        assert_eq!(stored_tokens(&manager, profile.id).await, 49_500);

        // Exactly at the limit is still allowed.
        manager.reserve_ai_tokens(&profile, 500).await.unwrap();
        assert_eq!(stored_tokens(&manager, profile.id).await, 50_000);
    }

    #[tokio::test]
    async fn oversized_request_is_rejected_before_the_store() {
        let db = Database::open_in_memory().await.unwrap();
        let manager = QuotaManager::from_config(db, &TallyConfig::default()).unwrap();
        let ghost = UserProfile {
            id: UserId::new(),
            plan_tier: PlanTier::Free,
            daily_chat_count: 0,
            last_chat_reset_at: None,
            monthly_import_count: 0,
            monthly_ai_tokens_used: 0,
            quota_reset_at: None,
        };
        let err = manager.reserve_ai_tokens(&ghost, 20_001).await.unwrap_err();
        match err {
            TallyError::QuotaExceeded { message } => assert_eq!(message, "request too large"),
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
        let err = manager.reserve_ai_tokens(&ghost, 100).await.unwrap_err();
        assert!(matches!(err, TallyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unlimited_plan_reserves_nothing() {
        let (manager, profile) = setup(PlanTier::Premium).await;
        let reservation = manager.reserve_ai_tokens(&profile, 9_000).await.unwrap();
        assert!(!reservation.applied);
        assert_eq!(stored_tokens(&manager, profile.id).await, 0);
        assert_eq!(manager.rollback(reservation).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rollback_restores_reserved_tokens() {
        let (manager, profile) = setup(PlanTier::Pro).await;
        manager.reserve_ai_tokens(&profile, 300).await.unwrap();
        let reservation = manager.reserve_ai_tokens(&profile, 700).await.unwrap();
        assert_eq!(stored_tokens(&manager, profile.id).await, 1_000);

        assert_eq!(manager.rollback(reservation).await.unwrap(), Some(300));
        assert_eq!(stored_tokens(&manager, profile.id).await, 300);
    }

    #[tokio::test]
    async fn rollback_never_goes_negative() {
        let (manager, profile) = setup(PlanTier::Free).await;
        let reservation = manager.reserve_ai_tokens(&profile, 800).await.unwrap();
        // Simulate a concurrent reset between reserve and rollback.
        exec(
            &manager,
            "UPDATE user_profiles SET monthly_ai_tokens_used = ?2 WHERE id = ?1",
            profile.id,
            "100".into(),
        )
        .await;

        assert_eq!(manager.rollback(reservation).await.unwrap(), None);
        assert_eq!(stored_tokens(&manager, profile.id).await, 100);
    }

    #[tokio::test]
    async fn committed_reservation_is_kept() {
        let (manager, profile) = setup(PlanTier::Free).await;
        let mut reservation = manager.reserve_ai_tokens(&profile, 250).await.unwrap();
        reservation.commit();
        assert_eq!(manager.rollback(reservation).await.unwrap(), None);
        assert_eq!(stored_tokens(&manager, profile.id).await, 250);
    }

    #[tokio::test]
    async fn stale_month_is_reset_before_reserving() {
        let (manager, profile) = setup(PlanTier::Free).await;
        let uid = profile.id.to_string();
        manager
            .database()
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE user_profiles SET monthly_ai_tokens_used = 49999,
                     monthly_import_count = 1, quota_reset_at = '2020-01-15T00:00:00.000Z'
                     WHERE id = ?1",
                    params![uid],
                )
            })
            .await
            .unwrap();

        manager.reserve_ai_tokens(&profile, 2_000).await.unwrap();
        let row = profiles::get_profile(manager.database(), profile.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.monthly_ai_tokens_used, 2_000);
        assert_eq!(row.monthly_import_count, 0);
        assert!(row.quota_reset_at.unwrap() > "2020-01-15".to_string());
    }

    #[tokio::test]
    async fn token_precheck_honours_pending_reset() {
        let manager_config = TallyConfig::default();
        let limit = manager_config.plans.free.monthly_ai_tokens_limit.unwrap();
        let mut profile = UserProfile {
            id: UserId::new(),
            plan_tier: PlanTier::Free,
            daily_chat_count: 0,
            last_chat_reset_at: None,
            monthly_import_count: 0,
            monthly_ai_tokens_used: limit,
            quota_reset_at: Some(now_timestamp()),
        };
        let db = Database::open_in_memory().await.unwrap();
        let manager = QuotaManager::from_config(db, &manager_config).unwrap();

        assert!(matches!(
            manager.check_ai_tokens(&profile),
            Err(TallyError::QuotaExceeded { .. })
        ));
        // Last reset in an earlier month: the counter is about to be zeroed.
        profile.quota_reset_at = Some("2020-01-01T00:00:00.000Z".into());
        assert!(manager.check_ai_tokens(&profile).is_ok());
        profile.plan_tier = PlanTier::Premium;
        profile.quota_reset_at = Some(now_timestamp());
        assert!(manager.check_ai_tokens(&profile).is_ok());
    }

    #[tokio::test]
    async fn concurrent_reservations_never_exceed_limit() {
        let (manager, profile) = setup(PlanTier::Free).await;
        let mut handles = Vec::new();
        for _ in 0..20 {
            let manager = manager.clone();
            let profile = profile.clone();
            handles.push(tokio::spawn(async move {
                manager.reserve_ai_tokens(&profile, 5_000).await
            }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
        assert_eq!(stored_tokens(&manager, profile.id).await, 50_000);
    }

    #[tokio::test]
    async fn daily_chat_limit_and_reset() {
        let (manager, profile) = setup(PlanTier::Free).await;
        exec(
            &manager,
            "UPDATE user_profiles SET daily_chat_count = 10, last_chat_reset_at = ?2 WHERE id = ?1",
            profile.id,
            now_timestamp(),
        )
        .await;
        manager.cache().invalidate(profile.id);
        let today = manager.profile(profile.id).await.unwrap().unwrap();
        let err = manager.check_daily_chat(&today).await.unwrap_err();
        assert!(err.is_quota_denial());

        exec(
            &manager,
            "UPDATE user_profiles SET last_chat_reset_at = ?2 WHERE id = ?1",
            profile.id,
            "2020-01-01T00:00:00.000Z".into(),
        )
        .await;
        manager.cache().invalidate(profile.id);
        let yesterday = manager.profile(profile.id).await.unwrap().unwrap();
        manager.check_daily_chat(&yesterday).await.unwrap();

        assert_eq!(manager.increment_daily_chat(profile.id).await.unwrap(), 1);
        assert_eq!(manager.increment_daily_chat(profile.id).await.unwrap(), 2);
        let cached = manager.cache().get(profile.id).unwrap();
        assert_eq!(cached.daily_chat_count, 2);
    }

    #[tokio::test]
    async fn csv_imports_are_capped_monthly() {
        let (manager, profile) = setup(PlanTier::Free).await;
        manager.check_csv_import(&profile).await.unwrap();
        assert_eq!(manager.increment_csv_import(profile.id).await.unwrap(), 1);

        let fresh = manager.profile(profile.id).await.unwrap().unwrap();
        let err = manager.check_csv_import(&fresh).await.unwrap_err();
        assert!(matches!(err, TallyError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn feature_gate_rereads_persisted_plan() {
        let (manager, stale) = setup(PlanTier::Free).await;
        let err = manager
            .require_feature(&stale, Feature::CsvExport)
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::FeatureLocked { ref feature } if feature == "csv_export"));

        // Upgrade behind the cache's back; the stale profile still passes.
        profiles::set_plan_tier(manager.database(), stale.id, "PRO")
            .await
            .unwrap();
        manager
            .require_feature(&stale, Feature::CsvExport)
            .await
            .unwrap();
        assert_eq!(
            manager.cache().get(stale.id).unwrap().plan_tier,
            PlanTier::Pro
        );
    }

    #[tokio::test]
    async fn set_plan_tier_invalidates_cache() {
        let (manager, profile) = setup(PlanTier::Free).await;
        assert!(manager.cache().get(profile.id).is_some());

        let tier = manager.set_plan_tier(profile.id, "lifetime").await.unwrap();
        assert_eq!(tier, PlanTier::Premium);
        assert!(manager.cache().get(profile.id).is_none());

        let err = manager.set_plan_tier(profile.id, "gold").await.unwrap_err();
        assert!(matches!(err, TallyError::InvalidInput(_)));
        let err = manager.set_plan_tier(UserId::new(), "pro").await.unwrap_err();
        assert!(matches!(err, TallyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn usage_report_reflects_counters() {
        let (manager, profile) = setup(PlanTier::Pro).await;
        manager.reserve_ai_tokens(&profile, 1_234).await.unwrap();
        manager.increment_daily_chat(profile.id).await.unwrap();

        let report = manager.usage(profile.id).await.unwrap().unwrap();
        assert_eq!(report.plan, PlanTier::Pro);
        assert_eq!(report.chat, UsageCounter { used: 1, limit: Some(500) });
        assert_eq!(report.ai_tokens.used, 1_234);
        assert_eq!(report.ai_tokens.limit, Some(2_000_000));
        assert_eq!(report.imports.used, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["plan"], "PRO");

        assert!(manager.usage(UserId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_profile_creates_on_default_plan() {
        let db = Database::open_in_memory().await.unwrap();
        let manager = QuotaManager::from_config(db, &TallyConfig::default()).unwrap();
        let user = UserId::new();
        let profile = manager.ensure_profile(user).await.unwrap();
        assert_eq!(profile.plan_tier, PlanTier::Free);
        assert_eq!(manager.ensure_profile(user).await.unwrap(), profile);
    }

    #[tokio::test]
    async fn usage_entries_are_persisted_with_cost() {
        let (manager, profile) = setup(PlanTier::Free).await;
        let log = manager
            .log_usage(UsageEntry {
                user_id: profile.id,
                model: "gpt-4.1".into(),
                provider: "openai".into(),
                input_tokens: 1_000,
                output_tokens: 500,
                latency_ms: 420.0,
                context: "chat_synthesis".into(),
            })
            .await
            .unwrap();
        assert!((log.est_cost - 0.006).abs() < 1e-12);

        let month = &log.created_at[..7];
        let totals =
            tally_storage::queries::usage::totals_for_prefix(manager.database(), profile.id, month)
                .await
                .unwrap();
        assert_eq!(totals.calls, 1);
    }

    #[tokio::test]
    async fn full_journal_refuses_new_trades() {
        let db = Database::open_in_memory().await.unwrap();
        let mut config = TallyConfig::default();
        config.plans.free.max_total_trades = 2;
        let manager = QuotaManager::from_config(db, &config).unwrap();
        let user = UserId::new();
        let profile = manager.ensure_profile(user).await.unwrap();

        for symbol in ["AAPL", "MSFT"] {
            manager.check_trade_capacity(&profile).await.unwrap();
            let trade = tally_storage::NewTrade::open(symbol, "LONG", 10.0, &format_ts(Utc::now()));
            trades::insert_trade(manager.database(), user, &trade)
                .await
                .unwrap();
        }
        let err = manager.check_trade_capacity(&profile).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded: trade limit of 2 reached");
    }

    #[test]
    fn unknown_default_plan_is_a_config_error() {
        let mut config = TallyConfig::default();
        config.quota.default_plan = "GOLD".into();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let db = rt.block_on(Database::open_in_memory()).unwrap();
        assert!(matches!(
            QuotaManager::from_config(db, &config),
            Err(TallyError::Config(_))
        ));
    }

    #[test]
    fn period_boundaries_are_utc_midnight() {
        let t = DateTime::parse_from_rfc3339("2026-03-17T15:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(day_start(t), "2026-03-17T00:00:00.000Z");
        assert_eq!(month_start(t), "2026-03-01T00:00:00.000Z");
    }
}
