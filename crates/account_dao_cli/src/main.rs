//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise save/find/remove against a throwaway temporary store.
//! - Keep output deterministic `key=value` lines for quick sanity checks.
//!
//! Set `ACCOUNT_DAO_LOG_DIR` to an absolute path to also write rolling logs.

use account_dao_core::{
    core_version, default_log_level, init_logging, Account, AccountDao, SqliteAccountDao,
    SqliteContextFactory,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("account_dao status=error error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("ACCOUNT_DAO_LOG_DIR") {
        init_logging(default_log_level(), &log_dir)?;
    }

    println!("account_dao version={}", core_version());

    let dao = SqliteAccountDao::new(SqliteContextFactory::temporary()?);
    let mut account = Account::new("smoke@example.com", "Smoke", "Test");
    let id = dao.save(&mut account)?;
    println!("account_dao save id={id}");

    let loaded = dao.find_by_id(id)?;
    println!("account_dao find_by_id matches={}", loaded == account);

    dao.remove(&loaded)?;
    let gone = dao.find_by_id(id).is_err_and(|err| err.is_not_found());
    println!("account_dao remove gone={gone}");

    info!("event=cli_smoke module=cli status=ok account_id={id}");
    Ok(())
}
