use account_dao_core::db::{DbError, DbResult};
use account_dao_core::{
    within_transaction, Account, AccountDao, DaoError, PersistenceContextFactory,
    PersistenceError, SqliteAccountDao, SqliteContextFactory, TransactionMode,
};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

fn file_dao(dir: &tempfile::TempDir) -> (SqliteAccountDao, PathBuf) {
    let path = dir.path().join("accounts.db");
    let dao = SqliteAccountDao::new(SqliteContextFactory::open_file(&path).unwrap());
    (dao, path)
}

#[test]
fn failing_work_rolls_back_earlier_writes() {
    let factory = SqliteContextFactory::temporary().unwrap();

    let err = within_transaction(&factory, TransactionMode::Write, "bulk_save", |uow| {
        uow.persist(&mut Account::new("a@x.com", "Ann", "Lee"))?;
        uow.persist(&mut Account::new("b@x.com", "Bo", "Kim"))?;
        Err::<(), _>(PersistenceError::InvalidData("forced".to_string()))
    })
    .unwrap_err();

    assert!(matches!(
        err,
        DaoError::RolledBack {
            operation: "bulk_save",
            ..
        }
    ));
    let dao = SqliteAccountDao::new(factory);
    assert!(dao.find_all().unwrap().is_empty());
}

#[test]
fn constraint_violation_mid_transaction_leaves_no_partial_state() {
    let dir = tempfile::tempdir().unwrap();
    let (dao, path) = file_dao(&dir);

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_blocked_accounts
         BEFORE INSERT ON accounts
         WHEN NEW.email = 'blocked@x.com'
         BEGIN
             SELECT RAISE(ABORT, 'blocked account');
         END;",
    )
    .unwrap();
    drop(conn);

    let err = within_transaction(dao.factory(), TransactionMode::Write, "bulk_save", |uow| {
        uow.persist(&mut Account::new("ok@x.com", "Ok", "User"))?;
        uow.persist(&mut Account::new("blocked@x.com", "No", "User"))?;
        Ok(())
    })
    .unwrap_err();

    assert!(err.cause().is_constraint_violation());
    assert!(err.to_string().contains("blocked account"));
    assert!(dao.find_all().unwrap().is_empty());
    assert!(dao.find_by_email("ok@x.com").unwrap_err().is_not_found());
}

#[test]
fn dao_save_constraint_violation_is_wrapped() {
    let dir = tempfile::tempdir().unwrap();
    let (dao, path) = file_dao(&dir);

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE UNIQUE INDEX idx_accounts_email_unique ON accounts (email);",
    )
    .unwrap();
    drop(conn);

    let mut first = Account::new("a@x.com", "Ann", "Lee");
    dao.save(&mut first).unwrap();

    let mut duplicate = Account::new("a@x.com", "Ann", "Twin");
    let err = dao.save(&mut duplicate).unwrap_err();

    assert_eq!(err.operation(), "save");
    assert!(err.cause().is_constraint_violation());
    assert!(err.to_string().contains("UNIQUE constraint failed"));
    assert_eq!(duplicate.id, None);
    assert_eq!(dao.find_all().unwrap(), vec![first]);
}

#[test]
fn file_store_survives_factory_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut account = Account::new("a@x.com", "Ann", "Lee");
    let id = {
        let (dao, _) = file_dao(&dir);
        dao.save(&mut account).unwrap()
    };

    let (reopened, _) = file_dao(&dir);
    assert_eq!(reopened.find_by_id(id).unwrap(), account);
}

#[test]
fn every_operation_releases_its_connection() {
    let dir = tempfile::tempdir().unwrap();
    let (dao, path) = file_dao(&dir);

    let mut account = Account::new("a@x.com", "Ann", "Lee");
    dao.save(&mut account).unwrap();
    dao.find_by_email("missing@x.com").unwrap_err();
    dao.update(&account).unwrap();

    // A lingering unit-of-work would hold a lock and make this fail fast.
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;").unwrap();
}

struct UnreachableStore {
    path: PathBuf,
}

impl PersistenceContextFactory for UnreachableStore {
    fn open_context(&self) -> DbResult<Connection> {
        Ok(Connection::open(&self.path)?)
    }
}

#[test]
fn unreachable_store_is_reported_as_dao_error() {
    let dir = tempfile::tempdir().unwrap();
    let dao = SqliteAccountDao::new(UnreachableStore {
        path: dir.path().join("missing").join("accounts.db"),
    });

    let err = dao.find_all().unwrap_err();
    assert!(matches!(
        err,
        DaoError::RolledBack {
            operation: "find_all",
            cause: PersistenceError::Db(DbError::Sqlite(_)),
        }
    ));
    assert!(!err.cause().is_constraint_violation());

    let mut account = Account::new("a@x.com", "Ann", "Lee");
    assert!(dao.save(&mut account).is_err());
    assert_eq!(account.id, None);
}

#[test]
fn concurrent_callers_share_one_dao() {
    let dir = tempfile::tempdir().unwrap();
    let (dao, _) = file_dao(&dir);
    let dao = Arc::new(dao);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let dao = Arc::clone(&dao);
            thread::spawn(move || {
                for index in 0..10 {
                    let mut account =
                        Account::new(format!("w{worker}-{index}@x.com"), "Worker", "Thread");
                    dao.save(&mut account).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let all = dao.find_all().unwrap();
    assert_eq!(all.len(), 40);
    assert!(all.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[test]
fn concurrent_saves_and_reads_on_temporary_store() {
    let dao = Arc::new(SqliteAccountDao::new(
        SqliteContextFactory::temporary().unwrap(),
    ));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let dao = Arc::clone(&dao);
            thread::spawn(move || {
                let mut failures = Vec::new();
                for index in 0..50 {
                    let mut account =
                        Account::new(format!("t{worker}-{index}@x.com"), "Worker", "Thread");
                    if let Err(err) = dao.save(&mut account) {
                        failures.push(err.to_string());
                    }
                    if let Err(err) = dao.find_all() {
                        failures.push(err.to_string());
                    }
                }
                failures
            })
        })
        .collect();

    let failures: Vec<String> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    assert!(failures.is_empty(), "failures: {failures:?}");
    assert_eq!(dao.find_all().unwrap().len(), 200);
}

#[test]
fn unit_of_work_find_returns_managed_or_none() {
    let factory = SqliteContextFactory::temporary().unwrap();
    let dao = SqliteAccountDao::new(&factory);
    let mut account = Account::new("a@x.com", "Ann", "Lee");
    let id = dao.save(&mut account).unwrap();

    let (found, missing) = within_transaction(&factory, TransactionMode::Read, "find", |uow| {
        let found = uow.find(id)?.map(|managed| {
            assert_eq!(managed.id(), id);
            managed.into_detached()
        });
        let missing = uow.find(id + 1)?.is_none();
        Ok((found, missing))
    })
    .unwrap();

    assert_eq!(found, Some(account));
    assert!(missing);
}

#[test]
fn unit_of_work_find_feeds_remove() {
    let factory = SqliteContextFactory::temporary().unwrap();
    let dao = SqliteAccountDao::new(&factory);
    let id = dao.save(&mut Account::new("a@x.com", "Ann", "Lee")).unwrap();

    within_transaction(&factory, TransactionMode::Write, "remove", |uow| {
        match uow.find(id)? {
            Some(managed) => uow.remove(managed),
            None => Err(PersistenceError::NoResult),
        }
    })
    .unwrap();

    assert!(dao.find_by_id(id).unwrap_err().is_not_found());
}
