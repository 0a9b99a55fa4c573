//! Integration tests for the usage ledger against a real SQLite file

use std::sync::Arc;

use chrono::NaiveDate;
use kiwi_core::db::Database;
use kiwi_core::services::{
    Caller, Limit, NewUser, SqliteUsageStore, SqliteUserDirectory, UsageService, UserStore,
};
use kiwi_core::{Error, MembershipTier};
use tempfile::TempDir;

struct Fixture {
    usage: Arc<UsageService>,
    users: UserStore,
    admin_id: String,
    _temp_dir: TempDir,
}

/// Open a fresh database with an administrator already registered
async fn create_fixture() -> Fixture {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(temp_dir.path().join("test.db"))
        .await
        .expect("Failed to create test database");

    let users = UserStore::new(db.pool.clone());
    let admin = users
        .register(new_user("admin@example.com"))
        .await
        .expect("Failed to register admin");

    let usage = UsageService::new(
        Arc::new(SqliteUsageStore::new(db.pool.clone())),
        Arc::new(SqliteUserDirectory::new(db.pool.clone())),
    );

    Fixture {
        usage: Arc::new(usage),
        users,
        admin_id: admin.id,
        _temp_dir: temp_dir,
    }
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        password: "password123".to_string(),
        name: "Test".to_string(),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
}

async fn user_on(fixture: &Fixture, email: &str, tier: MembershipTier) -> Caller {
    let user = fixture.users.register(new_user(email)).await.expect("register");
    fixture.users.set_tier(&user.id, tier).await.expect("set tier");
    Caller::User(user.id)
}

#[tokio::test]
async fn test_free_tier_exhausts_after_ten_uses() {
    let fixture = create_fixture().await;
    let caller = user_on(&fixture, "free@example.com", MembershipTier::Free).await;

    for _ in 0..9 {
        fixture
            .usage
            .increment_usage_on(&caller, "keyword_analysis", day(10))
            .await
            .unwrap();
    }

    let check = fixture
        .usage
        .check_usage_on(&caller, "keyword_analysis", day(10))
        .await
        .unwrap();
    assert!(check.is_allowed);
    assert_eq!(check.remaining, Limit::Bounded(1));

    fixture
        .usage
        .increment_usage_on(&caller, "keyword_analysis", day(10))
        .await
        .unwrap();

    let check = fixture
        .usage
        .check_usage_on(&caller, "keyword_analysis", day(10))
        .await
        .unwrap();
    assert!(!check.is_allowed);
    assert_eq!(check.remaining, Limit::Bounded(0));
}

#[tokio::test]
async fn test_new_day_resets_allowance() {
    let fixture = create_fixture().await;
    let caller = user_on(&fixture, "free@example.com", MembershipTier::Free).await;

    for _ in 0..10 {
        fixture.usage.increment_usage_on(&caller, "trends", day(10)).await.unwrap();
    }
    assert!(!fixture.usage.check_usage_on(&caller, "trends", day(10)).await.unwrap().is_allowed);

    let tomorrow = fixture.usage.check_usage_on(&caller, "trends", day(11)).await.unwrap();
    assert!(tomorrow.is_allowed);
    assert_eq!(tomorrow.current_usage, Some(0));
    assert_eq!(tomorrow.remaining, Limit::Bounded(10));

    let first = fixture.usage.increment_usage_on(&caller, "trends", day(11)).await.unwrap();
    assert!(first.success);
    assert_eq!(first.count, Some(1));

    let yesterday = fixture.usage.check_usage_on(&caller, "trends", day(10)).await.unwrap();
    assert_eq!(yesterday.current_usage, Some(10));
}

#[tokio::test]
async fn test_tier_upgrade_applies_immediately() {
    let fixture = create_fixture().await;
    let caller = user_on(&fixture, "grow@example.com", MembershipTier::Free).await;
    let Caller::User(user_id) = caller.clone() else { unreachable!() };

    for _ in 0..10 {
        fixture.usage.increment_usage_on(&caller, "naver_ads", day(5)).await.unwrap();
    }
    assert!(!fixture.usage.check_usage_on(&caller, "naver_ads", day(5)).await.unwrap().is_allowed);

    fixture.users.set_tier(&user_id, MembershipTier::Basic).await.unwrap();
    let check = fixture.usage.check_usage_on(&caller, "naver_ads", day(5)).await.unwrap();
    assert!(check.is_allowed);
    assert_eq!(check.remaining, Limit::Bounded(90));
    assert_eq!(check.tier, "basic");
}

#[tokio::test]
async fn test_premium_never_blocked() {
    let fixture = create_fixture().await;
    let caller = user_on(&fixture, "vip@example.com", MembershipTier::Premium).await;

    for _ in 0..50 {
        fixture.usage.increment_usage_on(&caller, "trends", day(1)).await.unwrap();
    }
    let check = fixture.usage.check_usage_on(&caller, "trends", day(1)).await.unwrap();
    assert!(check.is_allowed);
    assert_eq!(serde_json::to_value(&check).unwrap()["remaining"], -1);
}

#[tokio::test]
async fn test_concurrent_consume_holds_the_ceiling() {
    let fixture = create_fixture().await;
    let caller = user_on(&fixture, "race@example.com", MembershipTier::Free).await;

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let usage = Arc::clone(&fixture.usage);
            let caller = caller.clone();
            tokio::spawn(async move { usage.consume_on(&caller, "trends", day(2)).await })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);

    let check = fixture.usage.check_usage_on(&caller, "trends", day(2)).await.unwrap();
    assert_eq!(check.current_usage, Some(10));
}

#[tokio::test]
async fn test_admin_reset_restores_allowance() {
    let fixture = create_fixture().await;
    let caller = user_on(&fixture, "reset@example.com", MembershipTier::Free).await;
    let Caller::User(user_id) = caller.clone() else { unreachable!() };

    for _ in 0..10 {
        fixture.usage.increment_usage_on(&caller, "trends", day(3)).await.unwrap();
    }

    let denied = fixture.usage.reset_usage_on(&user_id, &user_id, "trends", day(3)).await;
    assert!(matches!(denied, Err(Error::Forbidden(_))));

    fixture
        .usage
        .reset_usage_on(&fixture.admin_id, &user_id, "trends", day(3))
        .await
        .unwrap();
    assert!(fixture.usage.check_usage_on(&caller, "trends", day(3)).await.unwrap().is_allowed);
}

#[tokio::test]
async fn test_history_covers_requested_days() {
    let fixture = create_fixture().await;
    let caller = user_on(&fixture, "hist@example.com", MembershipTier::Basic).await;
    let Caller::User(user_id) = caller.clone() else { unreachable!() };

    for d in [1, 5, 6, 7] {
        fixture.usage.increment_usage_on(&caller, "trends", day(d)).await.unwrap();
    }

    let rows = fixture.usage.usage_history_on(&user_id, 3, day(7)).await.unwrap();
    let days: Vec<NaiveDate> = rows.iter().map(|r| r.usage_date).collect();
    assert_eq!(days, vec![day(7), day(6), day(5)]);
}

#[tokio::test]
async fn test_anonymous_never_persists() {
    let fixture = create_fixture().await;
    for _ in 0..10 {
        fixture
            .usage
            .increment_usage_on(&Caller::Anonymous, "trends", day(4))
            .await
            .unwrap();
    }
    let check = fixture
        .usage
        .check_usage_on(&Caller::Anonymous, "trends", day(4))
        .await
        .unwrap();
    assert!(check.is_allowed);
    assert_eq!(check.tier, "anonymous");
    assert_eq!(check.remaining, Limit::Bounded(5));
}
