// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User profile operations.
//!
//! Counter arithmetic (reservations, resets) lives with the quota ledger;
//! this module only creates, reads and re-plans profiles.

use rusqlite::{OptionalExtension, Row, params};
use tally_core::{PlanTier, TallyError, UserId};

use crate::database::{Database, map_tr_err, now_timestamp};
use crate::models::ProfileRow;

/// Column list matching [`profile_from_row`].
pub const PROFILE_COLUMNS: &str = "id, plan_tier, daily_chat_count, last_chat_reset_at, \
     monthly_import_count, monthly_ai_tokens_used, quota_reset_at";

/// Map a row selected with `PROFILE_COLUMNS`.
pub fn profile_from_row(row: &Row<'_>) -> Result<ProfileRow, rusqlite::Error> {
    let id: String = row.get(0)?;
    let id = id.parse::<UserId>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ProfileRow {
        id,
        plan_tier: row.get(1)?,
        daily_chat_count: row.get(2)?,
        last_chat_reset_at: row.get(3)?,
        monthly_import_count: row.get(4)?,
        monthly_ai_tokens_used: row.get(5)?,
        quota_reset_at: row.get(6)?,
    })
}

/// Create a profile on `plan`. Existing profiles are left untouched.
pub async fn create_profile(
    db: &Database,
    user_id: UserId,
    plan: PlanTier,
) -> Result<ProfileRow, TallyError> {
    let id = user_id.to_string();
    let plan = plan.to_string();
    let created_at = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<ProfileRow, rusqlite::Error> {
            conn.execute(
                "INSERT OR IGNORE INTO user_profiles (id, plan_tier, quota_reset_at, created_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![id, plan, created_at],
            )?;
            conn.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE id = ?1"),
                params![id],
                profile_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a profile by user id.
pub async fn get_profile(db: &Database, user_id: UserId) -> Result<Option<ProfileRow>, TallyError> {
    let id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE id = ?1"),
                params![id],
                profile_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Store a new plan string. Returns `false` when the user does not exist.
pub async fn set_plan_tier(db: &Database, user_id: UserId, plan: &str) -> Result<bool, TallyError> {
    let id = user_id.to_string();
    let plan = plan.trim().to_uppercase();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE user_profiles SET plan_tier = ?2 WHERE id = ?1",
                params![id, plan],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Store the free-form preferences blob.
pub async fn set_preferences(
    db: &Database,
    user_id: UserId,
    preferences: &str,
) -> Result<(), TallyError> {
    let id = user_id.to_string();
    let preferences = preferences.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE user_profiles SET preferences = ?2 WHERE id = ?1",
                params![id, preferences],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserId::new();
        let first = create_profile(&db, user, PlanTier::Pro).await.unwrap();
        let second = create_profile(&db, user, PlanTier::Free).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.plan_tier, "PRO");
        assert_eq!(second.monthly_ai_tokens_used, 0);
        assert!(second.quota_reset_at.is_some());
    }

    #[tokio::test]
    async fn set_plan_tier_reports_missing_user() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(!set_plan_tier(&db, UserId::new(), "PRO").await.unwrap());

        let user = UserId::new();
        create_profile(&db, user, PlanTier::Free).await.unwrap();
        assert!(set_plan_tier(&db, user, "founder").await.unwrap());
        let row = get_profile(&db, user).await.unwrap().unwrap();
        assert_eq!(row.plan_tier, "FOUNDER");
        assert_eq!(row.into_profile(PlanTier::Free).plan_tier, PlanTier::Premium);
    }

    #[tokio::test]
    async fn unknown_stored_plan_uses_fallback() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserId::new();
        create_profile(&db, user, PlanTier::Free).await.unwrap();
        set_plan_tier(&db, user, "platinum").await.unwrap();
        let profile = get_profile(&db, user)
            .await
            .unwrap()
            .unwrap()
            .into_profile(PlanTier::Free);
        assert_eq!(profile.plan_tier, PlanTier::Free);
    }
}
