//! sled backed record store
//!
//! Four trees: `accounts`, `exams`, `assignments` hold CBOR records keyed by id;
//! `claims` holds the uniqueness keys that back the exclusivity invariants
//! (see [`crate::guard::faculty_claim_key`]). All check-then-act work goes
//! through [`Store::transaction`].
use crate::account::Account;
use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::exam::{Assignment, Exam};
use crate::types::{AccountId, AssignmentId, ExamId};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
    accounts: sled::Tree,
    exams: sled::Tree,
    assignments: sled::Tree,
    claims: sled::Tree,
    max_attempts: u32,
}

/// Typed view over the trees inside one transaction. `E` is the caller's abort
/// type, fixed per transaction so `?` never needs annotations.
pub struct Txn<'a, E> {
    accounts: &'a TransactionalTree,
    exams: &'a TransactionalTree,
    assignments: &'a TransactionalTree,
    claims: &'a TransactionalTree,
    abort: PhantomData<fn() -> E>,
}

impl Store {
    pub fn open(config: &EngineConfig) -> Result<Self, StoreError> {
        let db = if config.temporary {
            sled::Config::new().temporary(true).open()?
        } else {
            sled::open(&config.data_dir)?
        };
        Self::with_db(Arc::new(db), config.max_transaction_attempts)
    }

    pub fn with_db(instance: Arc<sled::Db>, max_attempts: u32) -> Result<Self, StoreError> {
        Ok(Self {
            accounts: instance.open_tree("accounts")?,
            exams: instance.open_tree("exams")?,
            assignments: instance.open_tree("assignments")?,
            claims: instance.open_tree("claims")?,
            instance,
            max_attempts: max_attempts.max(1),
        })
    }

    /// Runs `f` atomically across all trees. sled retries read/write conflicts
    /// itself; storage failures are retried here up to the configured attempt
    /// count and then surface as [`StoreError::RetriesExhausted`]. An abort from
    /// `f` is returned untouched.
    pub fn transaction<A, E, F>(&self, f: F) -> Result<A, E>
    where
        F: Fn(&Txn<'_, E>) -> ConflictableTransactionResult<A, E>,
        E: From<StoreError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = (&self.accounts, &self.exams, &self.assignments, &self.claims)
                .transaction(|(accounts, exams, assignments, claims)| {
                    f(&Txn {
                        accounts,
                        exams,
                        assignments,
                        claims,
                        abort: PhantomData,
                    })
                });

            match result {
                Ok(value) => return Ok(value),
                Err(TransactionError::Abort(e)) => return Err(e),
                Err(TransactionError::Storage(err)) if attempt < self.max_attempts => {
                    tracing::warn!(attempt, error = %err, "storage failure in transaction, retrying");
                }
                Err(TransactionError::Storage(err)) => {
                    tracing::error!(attempt, error = %err, "storage failure in transaction, giving up");
                    return Err(StoreError::RetriesExhausted {
                        attempts: attempt,
                        source: err,
                    }
                    .into());
                }
            }
        }
    }

    pub fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.accounts
            .insert(account.id.as_str().as_bytes(), minicbor::to_vec(account)?)?;
        Ok(())
    }

    pub fn insert_exam(&self, exam: &Exam) -> Result<(), StoreError> {
        self.exams
            .insert(exam.id.as_str().as_bytes(), minicbor::to_vec(exam)?)?;
        Ok(())
    }

    pub fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        get_record(&self.accounts, id.as_str())
    }

    pub fn exam(&self, id: &ExamId) -> Result<Option<Exam>, StoreError> {
        get_record(&self.exams, id.as_str())
    }

    pub fn assignment(&self, id: &AssignmentId) -> Result<Option<Assignment>, StoreError> {
        get_record(&self.assignments, id.as_str())
    }

    pub fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        all_records(&self.accounts)
    }

    pub fn exams(&self) -> Result<Vec<Exam>, StoreError> {
        all_records(&self.exams)
    }

    pub fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        all_records(&self.assignments)
    }

    /// Assignment id held under a claim key, outside any transaction.
    pub fn claim(&self, key: &str) -> Result<Option<AssignmentId>, StoreError> {
        Ok(self
            .claims
            .get(key.as_bytes())?
            .map(|bytes| AssignmentId::from(String::from_utf8_lossy(&bytes).into_owned())))
    }

    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.instance.flush()?)
    }
}

fn get_record<T>(tree: &sled::Tree, key: &str) -> Result<Option<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
        None => Ok(None),
    }
}

fn all_records<T>(tree: &sled::Tree) -> Result<Vec<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.iter()
        .values()
        .map(|bytes| -> Result<T, StoreError> { Ok(minicbor::decode(&bytes?)?) })
        .collect()
}

fn codec<E: From<StoreError>, X: Into<StoreError>>(err: X) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(E::from(err.into()))
}

fn tx_get<T, E>(tree: &TransactionalTree, key: &str) -> ConflictableTransactionResult<Option<T>, E>
where
    T: for<'b> minicbor::Decode<'b, ()>,
    E: From<StoreError>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => minicbor::decode(&bytes).map(Some).map_err(codec::<E, _>),
        None => Ok(None),
    }
}

fn tx_put<T, E>(tree: &TransactionalTree, key: &str, record: &T) -> ConflictableTransactionResult<(), E>
where
    T: minicbor::Encode<()>,
    E: From<StoreError>,
{
    let bytes = minicbor::to_vec(record).map_err(codec::<E, _>)?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

impl<E: From<StoreError>> Txn<'_, E> {
    pub fn account(&self, id: &AccountId) -> ConflictableTransactionResult<Option<Account>, E> {
        tx_get(self.accounts, id.as_str())
    }

    pub fn put_account(&self, account: &Account) -> ConflictableTransactionResult<(), E> {
        tx_put(self.accounts, account.id.as_str(), account)
    }

    pub fn exam(&self, id: &ExamId) -> ConflictableTransactionResult<Option<Exam>, E> {
        tx_get(self.exams, id.as_str())
    }

    pub fn put_exam(&self, exam: &Exam) -> ConflictableTransactionResult<(), E> {
        tx_put(self.exams, exam.id.as_str(), exam)
    }

    pub fn assignment(&self, id: &AssignmentId) -> ConflictableTransactionResult<Option<Assignment>, E> {
        tx_get(self.assignments, id.as_str())
    }

    pub fn put_assignment(&self, assignment: &Assignment) -> ConflictableTransactionResult<(), E> {
        tx_put(self.assignments, assignment.id.as_str(), assignment)
    }

    pub fn claim(&self, key: &str) -> ConflictableTransactionResult<Option<AssignmentId>, E> {
        Ok(self
            .claims
            .get(key.as_bytes())?
            .map(|bytes| AssignmentId::from(String::from_utf8_lossy(&bytes).into_owned())))
    }

    pub fn put_claim(&self, key: &str, holder: &AssignmentId) -> ConflictableTransactionResult<(), E> {
        self.claims
            .insert(key.as_bytes(), holder.as_str().as_bytes())?;
        Ok(())
    }
}
