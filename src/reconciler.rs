use std::sync::Arc;

use rusqlite::params;

use crate::admission::AdmissionContext;
use crate::db::Db;

/// On process boot, ensure the storage bucket exists and schedule
/// restoration for every session the row store still lists as `connected`.
/// Returns as soon as restorations are scheduled — it never blocks server
/// listen.
pub async fn reconcile(ctx: Arc<AdmissionContext>, store: Arc<dyn crate::object_store::ObjectStore>, bucket_probe_key: &str) {
    if let Err(e) = ensure_bucket(store.as_ref(), bucket_probe_key).await {
        eprintln!("startup reconciler: bucket check failed: {e}");
    }

    let connected = connected_sessions(&ctx.db);
    println!("startup reconciler: scheduling restoration for {} connected session(s)", connected.len());

    for (session_id, user_id) in connected {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let worker = (ctx.worker_factory)();
            let registry = ctx.registry.clone();
            ctx.registry.create_if_absent(&session_id, || {
                crate::supervisor::spawn(
                    session_id.clone(),
                    user_id.clone(),
                    ctx.db.clone(),
                    ctx.events.clone(),
                    ctx.storage.clone(),
                    worker,
                    ctx.auth_root.clone(),
                    registry,
                )
            });
        });
    }
}

/// The object store has no explicit "create bucket" verb in this crate's
/// REST contract; existence is probed with a harmless HEAD so a
/// misconfigured store surfaces at boot rather than on the first send.
async fn ensure_bucket(store: &dyn crate::object_store::ObjectStore, probe_key: &str) -> Result<(), String> {
    store.exists(probe_key).await.map(|_| ())
}

fn connected_sessions(db: &Db) -> Vec<(String, String)> {
    let conn = db.conn();
    let mut stmt = match conn.prepare("SELECT id, user_id FROM sessions WHERE status = 'connected'") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    stmt.query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default()
}
