use std::{path::PathBuf, sync::Arc};

use chrono::{Duration, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    AccountStatus, Engine, EngineError, EntryKind, EntryStatus, HistoryQuery, Kwh, LedgerEntry,
    LedgerPolicy, NewAccount, RequestUsage,
};
use migration::MigratorTrait;

const ADMIN: i64 = 1;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    engine.ensure_admin(ADMIN, "Admin", Utc::now()).await.unwrap();
    (engine, db)
}

/// A file-backed database, so the pool hands out several connections and
/// concurrent tasks really overlap.
async fn engine_on_file() -> (Arc<Engine>, DatabaseConnection, PathBuf) {
    let path = std::env::temp_dir().join(format!("kwh_ledger_{}.db", uuid::Uuid::new_v4()));
    let db = Database::connect(format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .policy(LedgerPolicy {
            max_retries: 50,
            ..LedgerPolicy::default()
        })
        .build()
        .await
        .unwrap();
    engine.ensure_admin(ADMIN, "Admin", Utc::now()).await.unwrap();
    (Arc::new(engine), db, path)
}

fn remove_db_file(db: DatabaseConnection, path: PathBuf) {
    drop(db);
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

/// Registers and activates an account, then forces its balance.
async fn active_account(engine: &Engine, db: &DatabaseConnection, id: i64, balance: Kwh) {
    engine
        .register_account(
            NewAccount {
                id,
                first_name: format!("User{id}"),
                card_id: format!("CARD-{id}"),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    engine
        .set_account_status(id, AccountStatus::Active)
        .await
        .unwrap();
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE accounts SET balance = ? WHERE id = ?",
        vec![balance.hundredths().into(), id.into()],
    ))
    .await
    .unwrap();
}

fn usage(account_id: i64, amount: Kwh) -> RequestUsage {
    RequestUsage {
        account_id,
        amount,
        requested_by: account_id,
        photo_file_id: Some("photo-1".to_string()),
        notes: None,
    }
}

fn assert_balanced(entry: &LedgerEntry) {
    if entry.status != EntryStatus::Pending {
        assert_eq!(
            entry.new_balance,
            entry.previous_balance + entry.signed_amount(),
            "entry {} breaks previous + signed amount",
            entry.id
        );
    }
}

#[tokio::test]
async fn recharge_credits_balance_and_records_approved_charge() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(50_00)).await;

    let entry = engine
        .apply_charge(10, Kwh::new(25_50), ADMIN, Some("manual"))
        .await
        .unwrap();

    assert_eq!(entry.kind, EntryKind::Charge);
    assert_eq!(entry.status, EntryStatus::Approved);
    assert_eq!(entry.previous_balance, Kwh::new(50_00));
    assert_eq!(entry.new_balance, Kwh::new(75_50));
    assert_eq!(entry.processed_by, Some(ADMIN));
    assert_balanced(&entry);
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(75_50));
    assert!(engine.last_charge_at(10).await.unwrap().is_some());
}

#[tokio::test]
async fn usage_larger_than_balance_is_rejected_without_entry() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(10_00)).await;

    let err = engine.request_usage(usage(10, Kwh::new(15_00))).await.unwrap_err();

    assert_eq!(
        err,
        EngineError::InsufficientFunds {
            balance: Kwh::new(10_00),
            requested: Kwh::new(15_00),
        }
    );
    assert!(engine.entries_for_account(10, 10).await.unwrap().is_empty());
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(10_00));
}

#[tokio::test]
async fn usage_is_pending_until_approved_and_late_reject_is_noop() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(30_00)).await;

    let pending = engine.request_usage(usage(10, Kwh::new(12_00))).await.unwrap();
    assert_eq!(pending.status, EntryStatus::Pending);
    assert_eq!(pending.previous_balance, Kwh::new(30_00));
    assert_eq!(pending.new_balance, Kwh::new(18_00));
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(30_00));

    let outcome = engine.approve_usage(pending.id, ADMIN).await.unwrap();
    assert_eq!(outcome.entry.status, EntryStatus::Approved);
    assert_eq!(outcome.account.balance, Kwh::new(18_00));
    assert!(!outcome.rebased);
    assert!(outcome.low_balance);
    assert_balanced(&outcome.entry);

    let err = engine.reject_usage(pending.id, ADMIN).await.unwrap_err();
    assert_eq!(err, EngineError::AlreadyProcessed(pending.id.to_string()));
    let err = engine.approve_usage(pending.id, ADMIN).await.unwrap_err();
    assert_eq!(err, EngineError::AlreadyProcessed(pending.id.to_string()));

    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(18_00));
    assert_eq!(engine.entry(pending.id).await.unwrap(), outcome.entry);
}

#[tokio::test]
async fn reject_leaves_balance_untouched() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(30_00)).await;

    let pending = engine.request_usage(usage(10, Kwh::new(5_00))).await.unwrap();
    let rejected = engine.reject_usage(pending.id, ADMIN).await.unwrap();

    assert_eq!(rejected.status, EntryStatus::Rejected);
    assert_eq!(rejected.processed_by, Some(ADMIN));
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(30_00));
    assert!(engine.approve_usage(pending.id, ADMIN).await.is_err());
}

#[tokio::test]
async fn approval_rebases_onto_intervening_charge() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(100_00)).await;

    let pending = engine.request_usage(usage(10, Kwh::new(40_00))).await.unwrap();
    engine
        .apply_charge(10, Kwh::new(30_00), ADMIN, None)
        .await
        .unwrap();

    let outcome = engine.approve_usage(pending.id, ADMIN).await.unwrap();

    assert!(outcome.rebased);
    assert_eq!(outcome.entry.previous_balance, Kwh::new(130_00));
    assert_eq!(outcome.entry.new_balance, Kwh::new(90_00));
    assert_eq!(outcome.account.balance, Kwh::new(90_00));
    assert!(!outcome.low_balance);
    for entry in engine.entries_for_account(10, 10).await.unwrap() {
        assert_balanced(&entry);
    }
}

#[tokio::test]
async fn rebase_that_would_go_negative_keeps_entry_pending() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(20_00)).await;

    let first = engine.request_usage(usage(10, Kwh::new(15_00))).await.unwrap();
    let second = engine.request_usage(usage(10, Kwh::new(15_00))).await.unwrap();
    engine.approve_usage(first.id, ADMIN).await.unwrap();

    let err = engine.approve_usage(second.id, ADMIN).await.unwrap_err();

    assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    assert_eq!(engine.entry(second.id).await.unwrap().status, EntryStatus::Pending);
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(5_00));
}

#[tokio::test]
async fn concurrent_approvals_apply_once() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(30_00)).await;
    let pending = engine.request_usage(usage(10, Kwh::new(10_00))).await.unwrap();

    let (a, b) = tokio::join!(
        engine.approve_usage(pending.id, ADMIN),
        engine.approve_usage(pending.id, ADMIN)
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let failure = a.err().or(b.err()).unwrap();
    assert_eq!(failure, EngineError::AlreadyProcessed(pending.id.to_string()));
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(20_00));
}

#[tokio::test]
async fn concurrent_charges_are_not_lost() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(100_00)).await;

    let (a, b) = tokio::join!(
        engine.apply_charge(10, Kwh::new(10_00), ADMIN, None),
        engine.apply_charge(10, Kwh::new(20_00), ADMIN, None)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(130_00));
    for entry in engine.entries_for_account(10, 10).await.unwrap() {
        assert_balanced(&entry);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_charges_on_separate_connections_all_land() {
    let (engine, db, path) = engine_on_file().await;
    active_account(&engine, &db, 10, Kwh::new(100_00)).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.apply_charge(10, Kwh::new(1_00), ADMIN, None).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(108_00));
    let entries = engine.entries_for_account(10, 20).await.unwrap();
    assert_eq!(entries.len(), 8);
    for entry in &entries {
        assert_balanced(entry);
    }
    // Each charge saw the balance left by exactly one other.
    let mut previous: Vec<i64> = entries.iter().map(|e| e.previous_balance.hundredths()).collect();
    previous.sort_unstable();
    assert_eq!(previous, (0..8).map(|i| 100_00 + i * 1_00).collect::<Vec<_>>());

    drop(engine);
    remove_db_file(db, path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_approvals_on_separate_connections_debit_once() {
    let (engine, db, path) = engine_on_file().await;
    active_account(&engine, &db, 10, Kwh::new(30_00)).await;
    let pending = engine.request_usage(usage(10, Kwh::new(10_00))).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine.approve_usage(pending.id, ADMIN).await
        }));
    }
    let mut approved = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) => {
                approved += 1;
                assert_eq!(outcome.account.balance, Kwh::new(20_00));
            }
            Err(err) => assert_eq!(err, EngineError::AlreadyProcessed(pending.id.to_string())),
        }
    }

    assert_eq!(approved, 1);
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(20_00));
    let entry = engine.entry(pending.id).await.unwrap();
    assert_eq!(entry.status, EntryStatus::Approved);
    assert_balanced(&entry);

    drop(engine);
    remove_db_file(db, path);
}

#[tokio::test]
async fn non_active_accounts_cannot_move_balance() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(30_00)).await;

    for status in [AccountStatus::Pending, AccountStatus::Blocked, AccountStatus::Disabled] {
        engine.set_account_status(10, status).await.unwrap();
        assert_eq!(
            engine
                .apply_charge(10, Kwh::new(1_00), ADMIN, None)
                .await
                .unwrap_err(),
            EngineError::AccountNotActive(status)
        );
        assert_eq!(
            engine.request_usage(usage(10, Kwh::new(1_00))).await.unwrap_err(),
            EngineError::AccountNotActive(status)
        );
    }
    assert!(engine.entries_for_account(10, 10).await.unwrap().is_empty());
    assert_eq!(engine.account(10).await.unwrap().balance, Kwh::new(30_00));
}

#[tokio::test]
async fn amounts_must_be_positive_and_under_ceiling() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(30_00)).await;

    assert!(matches!(
        engine.request_usage(usage(10, Kwh::ZERO)).await,
        Err(EngineError::InvalidAmount(_))
    ));
    assert_eq!(
        engine
            .apply_charge(10, Kwh::whole(10_001), ADMIN, None)
            .await
            .unwrap_err(),
        EngineError::AmountTooLarge(Kwh::whole(10_000))
    );
    assert!(engine.entries_for_account(10, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn registration_consumes_invite_once() {
    let (engine, _db) = engine_with_db().await;
    let now = Utc::now();
    let invite = engine
        .create_invite(&engine::generate_code(), ADMIN, Some("for Mario"), now)
        .await
        .unwrap();
    assert_eq!(invite.expires_at, now + Duration::days(7));

    let account = engine
        .register_account(
            NewAccount {
                id: 20,
                first_name: "Mario".to_string(),
                card_id: "RFID:0001".to_string(),
                invite_code: Some(invite.code.clone()),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(account.status, AccountStatus::Pending);
    assert_eq!(account.balance, Kwh::ZERO);
    assert_eq!(
        engine.invite(&invite.code).await.unwrap().unwrap().used_by,
        Some(20)
    );

    let err = engine
        .register_account(
            NewAccount {
                id: 21,
                first_name: "Luigi".to_string(),
                card_id: "RFID:0002".to_string(),
                invite_code: Some(invite.code.clone()),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidInvite(invite.code.clone()));
    assert!(engine.find_account(21).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_card_is_refused() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::ZERO).await;

    let err = engine
        .register_account(
            NewAccount {
                id: 11,
                first_name: "Copy".to_string(),
                card_id: "CARD-10".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("card CARD-10".to_string()));
}

#[tokio::test]
async fn history_and_low_balance_queries() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(5_00)).await;
    active_account(&engine, &db, 11, Kwh::new(15_00)).await;
    active_account(&engine, &db, 12, Kwh::new(50_00)).await;

    let low: Vec<i64> = engine
        .low_balance_accounts(Kwh::whole(20))
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    // The fixture admin is active with an empty balance.
    assert_eq!(low, vec![1, 10, 11]);

    engine.apply_charge(12, Kwh::new(1_00), ADMIN, None).await.unwrap();
    let pending = engine.request_usage(usage(12, Kwh::new(2_00))).await.unwrap();

    let charges = engine
        .history(HistoryQuery {
            kind: EntryKind::Charge,
            from: Some(Utc::now() - Duration::hours(1)),
            to: None,
            limit: 100,
        })
        .await
        .unwrap();
    assert_eq!(charges.len(), 1);

    let usages = engine
        .history(HistoryQuery {
            kind: EntryKind::Usage,
            from: None,
            to: None,
            limit: 100,
        })
        .await
        .unwrap();
    assert!(usages.is_empty());
    assert_eq!(engine.pending_usages().await.unwrap()[0].id, pending.id);

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.accounts(AccountStatus::Active), 4);
    assert_eq!(stats.total_charged, Kwh::new(1_00));
    assert_eq!(stats.pending_usages, 1);
}

#[tokio::test]
async fn delete_account_keeps_ledger_history() {
    let (engine, db) = engine_with_db().await;
    active_account(&engine, &db, 10, Kwh::new(5_00)).await;
    let charge = engine.apply_charge(10, Kwh::new(1_00), ADMIN, None).await.unwrap();
    let pending = engine.request_usage(usage(10, Kwh::new(2_00))).await.unwrap();

    engine.delete_account(10).await.unwrap();

    assert!(engine.find_account(10).await.unwrap().is_none());
    let kept: Vec<_> = engine
        .entries_for_account(10, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(kept.len(), 2);
    assert!(kept.contains(&charge.id));
    assert!(kept.contains(&pending.id));
    assert_eq!(engine.entry(charge.id).await.unwrap().card_id.as_deref(), Some("CARD-10"));
    assert_eq!(
        engine.account(10).await.unwrap_err(),
        EngineError::KeyNotFound("account 10".to_string())
    );
}

#[tokio::test]
async fn username_lookup_ignores_case_and_at_sign() {
    let (engine, _db) = engine_with_db().await;
    engine
        .register_account(
            NewAccount {
                id: 30,
                first_name: "Anna".to_string(),
                username: Some("AnnaB".to_string()),
                card_id: "CARD-30".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let found = engine.account_by_username("@annab").await.unwrap().unwrap();
    assert_eq!(found.id, 30);
    assert_eq!(engine.account_by_card("CARD-30").await.unwrap().unwrap().id, 30);
}
