//! Shared bank balance.
//!
//! Each deposit reads the balance into a worker-local register and writes
//! back register + amount. When two deposits interleave between read and
//! write, one of them is lost, which `check_invariants` reports.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use rf_core::{OpKind, ResourceId, ScenarioDef, Step, WorkerId};
use rf_dst::{CampaignConfig, ConfigError, FuzzCampaign, Workload};

/// Resource name of the balance cell.
pub const BALANCE: &str = "balance";
/// Resource name of the mutex guarding it.
pub const GUARD: &str = "guard";

#[derive(Debug, Default)]
struct Ledger {
    balance: i64,
    registers: HashMap<WorkerId, i64>,
    deposits_count: u64,
}

/// Workload that gives `balance` reads and writes real effects.
#[derive(Debug)]
pub struct BankAccount {
    balance: ResourceId,
    initial: i64,
    amount: i64,
    ledger: Mutex<Ledger>,
}

impl BankAccount {
    pub fn new(balance: ResourceId, initial: i64, amount: i64) -> Self {
        Self {
            balance,
            initial,
            amount,
            ledger: Mutex::new(Ledger {
                balance: initial,
                ..Ledger::default()
            }),
        }
    }

    pub fn balance(&self) -> i64 {
        self.ledger.lock().balance
    }

    pub fn deposits_count(&self) -> u64 {
        self.ledger.lock().deposits_count
    }

    fn expected(&self, deposits_count: u64) -> i64 {
        self.initial + self.amount * deposits_count as i64
    }
}

impl Workload for BankAccount {
    fn reset(&self) {
        let mut ledger = self.ledger.lock();
        ledger.balance = self.initial;
        ledger.registers.clear();
        ledger.deposits_count = 0;
    }

    fn execute(&self, worker: WorkerId, step_index: usize, step: &Step) -> Result<(), String> {
        if step.resource != self.balance {
            return Ok(());
        }

        let mut ledger = self.ledger.lock();
        match step.op {
            OpKind::Read => {
                let balance = ledger.balance;
                ledger.registers.insert(worker, balance);
            }
            OpKind::Write => {
                let register = ledger.registers.get(&worker).copied().ok_or_else(|| {
                    format!("step {}: {} wrote the balance without reading it", step_index, worker)
                })?;
                ledger.balance = register + self.amount;
                ledger.deposits_count += 1;
            }
            OpKind::Acquire | OpKind::Release => {}
        }
        Ok(())
    }

    fn check_invariants(&self) -> Result<(), String> {
        let ledger = self.ledger.lock();
        let expected = self.expected(ledger.deposits_count);
        if ledger.balance != expected {
            return Err(format!(
                "lost update: balance is {} after {} deposits, expected {}",
                ledger.balance, ledger.deposits_count, expected
            ));
        }
        Ok(())
    }
}

/// Deposit that reads and writes the balance under the guard.
pub fn deposit_bracketed() -> ScenarioDef {
    ScenarioDef::new("deposit")
        .acquire(GUARD)
        .read(BALANCE)
        .write(BALANCE)
        .release(GUARD)
}

/// Deposit with no locking at all.
pub fn deposit_unguarded() -> ScenarioDef {
    ScenarioDef::new("deposit-unguarded")
        .read(BALANCE)
        .write(BALANCE)
}

/// Campaign of `depositors` concurrent deposits into one account.
pub fn bank_campaign(
    bracketed: bool,
    depositors: u32,
    config: CampaignConfig,
) -> Result<FuzzCampaign, ConfigError> {
    let scenario = if bracketed {
        deposit_bracketed()
    } else {
        deposit_unguarded()
    };

    // Declared up front so `balance` is always resource 0.
    FuzzCampaign::builder()
        .resources([BALANCE, GUARD])
        .auto_register(false)
        .scenario(scenario.with_instances(depositors))
        .workload(Arc::new(BankAccount::new(ResourceId(0), 100, 10)))
        .config(config)
        .build()
}
