// Shared application state: the store, the action executor, and the
// per-tenant serialization locks used by the pipeline jobs.

use crate::db::Database;
use crate::executor::ActionExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub db: Database,
    pub executor: ActionExecutor,
    /// One async mutex per tenant. Jobs hold a tenant's lock for the length
    /// of that tenant's cycle so overlapping jobs interleave between tenants
    /// but never within one.
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            executor: ActionExecutor::new(),
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn tenant_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
