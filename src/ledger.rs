// src/ledger.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info};
use mongodb::bson::{doc, from_document, to_document, Bson, DateTime as BsonDateTime, Document};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::error::EngineError;
use crate::models::{AuthContext, Role, Transaction, TxType};
use crate::store::{BatchOp, DocumentStore};

fn number_field(document: &Document, key: &str) -> f64 {
    match document.get(key) {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    }
}

/// Open a Pending transaction. Deposits only append the ledger record;
/// withdrawals also place a hold by debiting the balance in the same
/// commit, so a brand cannot queue overlapping withdrawals against the
/// same funds. Amount and owner are immutable from here on.
pub async fn request_transaction(
    store: &dyn DocumentStore,
    ctx: &AuthContext,
    amount: f64,
    tx_type: TxType,
) -> Result<Transaction, EngineError> {
    if ctx.role != Role::Brand {
        return Err(EngineError::Invalid(
            "only brand accounts can open transactions".to_string(),
        ));
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(EngineError::Invalid("amount must be positive".to_string()));
    }

    let tx = Transaction {
        id: Uuid::new_v4().to_string(),
        brand_id: ctx.uid.clone(),
        amount,
        tx_type,
        status: "Pending".to_string(),
        timestamp: BsonDateTime::now(),
        version: 0,
    };
    let tx_doc = to_document(&tx).map_err(|e| EngineError::Store(e.to_string()))?;

    match tx_type {
        TxType::Deposit => {
            store.create("transactions", tx_doc).await?;
        }
        TxType::Withdrawal => {
            let user = store.get_one("users", &ctx.uid).await?;
            let balance = number_field(&user, "balance");
            if balance < amount {
                return Err(EngineError::Invalid("insufficient balance".to_string()));
            }
            let user_version = user.get_i64("version").unwrap_or(0);
            store
                .batch_commit(vec![
                    BatchOp::Create {
                        collection: "transactions".to_string(),
                        data: tx_doc,
                    },
                    BatchOp::Patch {
                        collection: "users".to_string(),
                        id: ctx.uid.clone(),
                        data: doc! { "balance": balance - amount },
                        expected_version: Some(user_version),
                    },
                ])
                .await?;
        }
    }

    info!(
        "Transaction {} opened: {:?} of {} for {}",
        tx.id, tx.tx_type, tx.amount, tx.brand_id
    );
    Ok(tx)
}

/// Move a transaction to a terminal status and apply its balance effect
/// exactly once.
///
/// Only a Pending DEPOSIT settling to Completed credits the balance, and
/// only a Pending WITHDRAWAL settling to Rejected refunds its hold; both
/// happen in the same commit as the status patch, guarded by the
/// transaction's and the user's version fields. Every other transition
/// patches the status alone, under the same version guard, so settling
/// an already-settled transaction never touches the balance again and a
/// settle built on a stale read aborts instead of overwriting the
/// terminal status another admin just committed.
pub async fn settle_transaction(
    store: &dyn DocumentStore,
    ctx: &AuthContext,
    tx_id: &str,
    new_status: &str,
) -> Result<Transaction, EngineError> {
    if !ctx.role.is_admin() {
        return Err(EngineError::Invalid(
            "only admins can settle transactions".to_string(),
        ));
    }
    if !matches!(new_status, "Completed" | "Rejected") {
        return Err(EngineError::Invalid(format!(
            "{} is not a terminal status",
            new_status
        )));
    }

    let raw = store.get_one("transactions", tx_id).await?;
    let tx: Transaction = from_document(raw)
        .map_err(|e| EngineError::Store(format!("malformed transaction: {}", e)))?;

    let pending = tx.status == "Pending";
    let credit = match (pending, tx.tx_type, new_status) {
        (true, TxType::Deposit, "Completed") => Some(tx.amount),
        (true, TxType::Withdrawal, "Rejected") => Some(tx.amount),
        _ => None,
    };

    match credit {
        Some(amount) => {
            let user = store.get_one("users", &tx.brand_id).await?;
            let balance = number_field(&user, "balance");
            let user_version = user.get_i64("version").unwrap_or(0);
            store
                .batch_commit(vec![
                    BatchOp::Patch {
                        collection: "transactions".to_string(),
                        id: tx_id.to_string(),
                        data: doc! { "status": new_status },
                        expected_version: Some(tx.version),
                    },
                    BatchOp::Patch {
                        collection: "users".to_string(),
                        id: tx.brand_id.clone(),
                        data: doc! { "balance": balance + amount },
                        expected_version: Some(user_version),
                    },
                ])
                .await?;
            info!(
                "Transaction {} settled to {} with balance effect {}",
                tx_id, new_status, amount
            );
        }
        None => {
            store
                .batch_commit(vec![BatchOp::Patch {
                    collection: "transactions".to_string(),
                    id: tx_id.to_string(),
                    data: doc! { "status": new_status },
                    expected_version: Some(tx.version),
                }])
                .await?;
            info!("Transaction {} settled to {} (status only)", tx_id, new_status);
        }
    }

    let updated = store.get_one("transactions", tx_id).await?;
    from_document(updated).map_err(|e| EngineError::Store(format!("malformed transaction: {}", e)))
}

// ─── HTTP SURFACE ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OpenTransactionRequest {
    pub amount: f64,
    #[serde(rename = "type")]
    pub tx_type: TxType,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub status: String,
}

// POST /transactions
pub async fn open_transaction(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<OpenTransactionRequest>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    match request_transaction(data.store.as_ref(), &ctx, payload.amount, payload.tx_type).await {
        Ok(tx) => HttpResponse::Ok().json(tx),
        Err(e) => {
            error!("Error opening transaction: {}", e);
            e.to_response()
        }
    }
}

// POST /transactions/{tx_id}/settle
pub async fn settle(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SettleRequest>,
) -> impl Responder {
    let tx_id = path.into_inner();
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    match settle_transaction(data.store.as_ref(), &ctx, &tx_id, &payload.status).await {
        Ok(tx) => HttpResponse::Ok().json(tx),
        Err(e) => {
            error!("Error settling transaction {}: {}", tx_id, e);
            e.to_response()
        }
    }
}

// GET /transactions
// Admins see the whole ledger; brands see their own records.
pub async fn list_transactions(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let store = data.store.as_ref();
    let result = if ctx.role.is_admin() {
        store.get_all("transactions").await
    } else if ctx.role == Role::Brand {
        store.get_where("transactions", doc! { "brandId": &ctx.uid }).await
    } else {
        return HttpResponse::Unauthorized().body("No ledger access for this role");
    };

    match result {
        Ok(docs) => {
            let txs: Vec<Transaction> = docs
                .into_iter()
                .filter_map(|d| from_document::<Transaction>(d).ok())
                .collect();
            HttpResponse::Ok().json(txs)
        }
        Err(e) => {
            error!("Error listing transactions: {}", e);
            e.to_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mongodb::bson::{doc, Document};
    use tokio::sync::broadcast;

    use super::{request_transaction, settle_transaction};
    use crate::error::EngineError;
    use crate::models::{AuthContext, Role, TxType};
    use crate::store::memory::MemoryStore;
    use crate::store::{BatchOp, DocumentStore};

    /// Delegates to the in-memory store but answers transaction reads
    /// with a fixed earlier snapshot, standing in for an admin whose
    /// settle was computed from data another session has since changed.
    struct StaleTransactionReads {
        inner: MemoryStore,
        snapshot: Document,
    }

    #[async_trait]
    impl DocumentStore for StaleTransactionReads {
        async fn get_all(&self, collection: &str) -> Result<Vec<Document>, EngineError> {
            self.inner.get_all(collection).await
        }

        async fn get_where(
            &self,
            collection: &str,
            filter: Document,
        ) -> Result<Vec<Document>, EngineError> {
            self.inner.get_where(collection, filter).await
        }

        async fn get_one(&self, collection: &str, id: &str) -> Result<Document, EngineError> {
            if collection == "transactions" {
                return Ok(self.snapshot.clone());
            }
            self.inner.get_one(collection, id).await
        }

        async fn create(&self, collection: &str, data: Document) -> Result<String, EngineError> {
            self.inner.create(collection, data).await
        }

        async fn patch(
            &self,
            collection: &str,
            id: &str,
            data: Document,
        ) -> Result<(), EngineError> {
            self.inner.patch(collection, id, data).await
        }

        async fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), EngineError> {
            self.inner.batch_commit(ops).await
        }

        fn subscribe(&self) -> broadcast::Receiver<String> {
            self.inner.subscribe()
        }
    }

    fn admin() -> AuthContext {
        AuthContext {
            uid: "admin-1".to_string(),
            email: "admin@console.test".to_string(),
            role: Role::Admin,
        }
    }

    fn brand(uid: &str) -> AuthContext {
        AuthContext {
            uid: uid.to_string(),
            email: format!("{}@brand.test", uid),
            role: Role::Brand,
        }
    }

    fn seed_brand(store: &MemoryStore, uid: &str, balance: f64) {
        store.seed(
            "users",
            vec![doc! {
                "_id": uid,
                "role": "brand",
                "email": format!("{}@brand.test", uid),
                "balance": balance,
                "version": 0_i64,
            }],
        );
    }

    async fn balance_of(store: &MemoryStore, uid: &str) -> f64 {
        let user = store.get_one("users", uid).await.unwrap();
        user.get_f64("balance").unwrap()
    }

    #[tokio::test]
    async fn completing_a_pending_deposit_credits_exactly_once() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 1000.0);
        let tx = request_transaction(&store, &brand("b1"), 500.0, TxType::Deposit)
            .await
            .unwrap();

        let settled = settle_transaction(&store, &admin(), &tx.id, "Completed")
            .await
            .unwrap();
        assert_eq!(settled.status, "Completed");
        assert_eq!(balance_of(&store, "b1").await, 1500.0);

        // Settling the now-Completed transaction again is status-only.
        settle_transaction(&store, &admin(), &tx.id, "Completed")
            .await
            .unwrap();
        assert_eq!(balance_of(&store, "b1").await, 1500.0);
    }

    #[tokio::test]
    async fn rejecting_a_deposit_has_no_balance_effect() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 1000.0);
        let tx = request_transaction(&store, &brand("b1"), 500.0, TxType::Deposit)
            .await
            .unwrap();

        let settled = settle_transaction(&store, &admin(), &tx.id, "Rejected")
            .await
            .unwrap();
        assert_eq!(settled.status, "Rejected");
        assert_eq!(balance_of(&store, "b1").await, 1000.0);
    }

    #[tokio::test]
    async fn withdrawal_holds_funds_and_rejection_refunds_them() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 1000.0);

        let tx = request_transaction(&store, &brand("b1"), 300.0, TxType::Withdrawal)
            .await
            .unwrap();
        assert_eq!(balance_of(&store, "b1").await, 700.0);

        settle_transaction(&store, &admin(), &tx.id, "Rejected")
            .await
            .unwrap();
        assert_eq!(balance_of(&store, "b1").await, 1000.0);
    }

    #[tokio::test]
    async fn completed_withdrawal_is_status_only() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 1000.0);

        let tx = request_transaction(&store, &brand("b1"), 300.0, TxType::Withdrawal)
            .await
            .unwrap();
        let settled = settle_transaction(&store, &admin(), &tx.id, "Completed")
            .await
            .unwrap();
        assert_eq!(settled.status, "Completed");
        // The hold placed at request time is the only debit.
        assert_eq!(balance_of(&store, "b1").await, 700.0);
    }

    #[tokio::test]
    async fn withdrawal_beyond_balance_is_rejected_up_front() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 100.0);

        let result = request_transaction(&store, &brand("b1"), 300.0, TxType::Withdrawal).await;
        assert!(matches!(result, Err(EngineError::Invalid(_))));
        assert_eq!(store.count("transactions"), 0);
        assert_eq!(balance_of(&store, "b1").await, 100.0);
    }

    #[tokio::test]
    async fn only_admins_settle_and_only_brands_open() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 1000.0);

        let result = request_transaction(&store, &admin(), 10.0, TxType::Deposit).await;
        assert!(matches!(result, Err(EngineError::Invalid(_))));

        let tx = request_transaction(&store, &brand("b1"), 10.0, TxType::Deposit)
            .await
            .unwrap();
        let result = settle_transaction(&store, &brand("b1"), &tx.id, "Completed").await;
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[tokio::test]
    async fn stale_transaction_version_surfaces_a_conflict() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 1000.0);
        let tx = request_transaction(&store, &brand("b1"), 500.0, TxType::Deposit)
            .await
            .unwrap();

        // Another session touches the transaction between our read and
        // commit; bumping its version makes a settle built on the stale
        // read abort instead of double-applying.
        store
            .patch("transactions", &tx.id, doc! { "status": "Pending" })
            .await
            .unwrap();

        let result = store
            .batch_commit(vec![BatchOp::Patch {
                collection: "transactions".to_string(),
                id: tx.id.clone(),
                data: doc! { "status": "Completed" },
                expected_version: Some(tx.version),
            }])
            .await;
        assert!(matches!(result, Err(EngineError::ConcurrentOverwrite(_))));
        assert_eq!(balance_of(&store, "b1").await, 1000.0);
    }

    #[tokio::test]
    async fn stale_status_only_settle_cannot_overwrite_a_terminal_status() {
        let store = MemoryStore::new();
        seed_brand(&store, "b1", 1000.0);
        let tx = request_transaction(&store, &brand("b1"), 300.0, TxType::Withdrawal)
            .await
            .unwrap();
        assert_eq!(balance_of(&store, "b1").await, 700.0);

        // Capture the Pending record as a second admin would have read it.
        let snapshot = store.get_one("transactions", &tx.id).await.unwrap();

        // The first admin rejects the withdrawal, refunding the hold.
        settle_transaction(&store, &admin(), &tx.id, "Rejected")
            .await
            .unwrap();
        assert_eq!(balance_of(&store, "b1").await, 1000.0);

        // The second admin settles to Completed off the stale Pending
        // read. That transition carries no balance effect, but it must
        // still abort rather than mark the refunded transaction
        // Completed.
        let stale = StaleTransactionReads {
            inner: store,
            snapshot,
        };
        let result = settle_transaction(&stale, &admin(), &tx.id, "Completed").await;
        assert!(matches!(result, Err(EngineError::ConcurrentOverwrite(_))));

        let current = stale.inner.get_one("transactions", &tx.id).await.unwrap();
        assert_eq!(current.get_str("status").unwrap(), "Rejected");
        assert_eq!(balance_of(&stale.inner, "b1").await, 1000.0);
    }
}
