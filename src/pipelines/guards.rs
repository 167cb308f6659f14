// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Guards Reconciler (§4.6): rebuilds the `Guard` table from scratch each
//! cycle by asking the node for every known account's current guard,
//! batched and rate-limited so a full pass doesn't overwhelm the node API.

use std::sync::Arc;

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use futures::future::join_all;
use scoped_futures::ScopedFutureExt;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::config::Settings;
use crate::db::models::NewGuard;
use crate::db::schema::{balances, guards};
use crate::db::{run_in_transaction, DbPool};
use crate::error::Result;
use crate::node::NodeClient;
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Queryable)]
struct AccountModule {
    id: i64,
    account: String,
    chain_id: i32,
    module: String,
}

/// One page of `(account, chain_id, module)` triples, ordered by the
/// underlying balance row's id so paging is stable across batches.
async fn next_batch(
    conn: &mut AsyncPgConnection,
    after_id: i64,
    batch_size: i64,
) -> Result<Vec<AccountModule>> {
    let rows = balances::table
        .filter(balances::id.gt(after_id))
        .order(balances::id.asc())
        .limit(batch_size)
        .select((balances::id, balances::account, balances::chain_id, balances::module))
        .load::<AccountModule>(conn)
        .await?;
    Ok(rows)
}

/// Minimal unsigned Pact `exec` local-call body requesting an account's
/// guard via `{module}.details`, matching the shape `NodeClient::pact_local`
/// forwards unmodified to `pact/api/v1/local`.
fn guard_request_body(module: &str, account: &str) -> Value {
    json!({
        "cmd": {
            "payload": {
                "exec": {
                    "code": format!("({module}.details \"{account}\")"),
                    "data": {}
                }
            },
            "signers": [],
            "meta": {"chainId": "", "sender": "", "gasLimit": 1000, "gasPrice": 1e-8, "ttl": 600, "creationTime": 0},
            "nonce": "guard-reconciler"
        },
        "sigs": []
    })
}

/// Pull `keys`/`pred` out of a `{module}.details` local-call result, if the
/// account actually exists on that module.
fn parse_guard_result(result: &Value) -> Option<(Value, String)> {
    let data = result.get("result")?.get("data")?;
    let guard = data.get("guard")?;
    let keys = guard.get("keys")?.clone();
    let predicate = guard.get("pred")?.as_str()?.to_string();
    Some((keys, predicate))
}

async fn fetch_guard(
    client: &NodeClient,
    account_module: &AccountModule,
) -> Option<NewGuard> {
    let body = guard_request_body(&account_module.module, &account_module.account);
    let response = client.pact_local(account_module.chain_id, &body).await.ok()?;
    let (keys, predicate) = parse_guard_result(&response)?;
    Some(NewGuard {
        account: account_module.account.clone(),
        chain_id: account_module.chain_id,
        module: account_module.module.clone(),
        keys,
        predicate,
    })
}

/// One batch: fetch guards for every account in the batch (bounded
/// concurrency), then insert them all in the one transaction that also
/// carries the batch's cursor forward.
async fn run_batch(
    pool: &DbPool,
    client: &NodeClient,
    concurrency: usize,
    after_id: i64,
    batch_size: i64,
) -> Result<Option<i64>> {
    let (rows, last_id) = run_in_transaction(pool, move |conn| {
        async move {
            let rows = next_batch(conn, after_id, batch_size).await?;
            let last_id = rows.last().map(|r| r.id);
            Ok((rows, last_id))
        }
        .scope_boxed()
    })
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let fetches = rows.iter().map(|row| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            fetch_guard(client, row).await
        }
    });
    let fetched: Vec<NewGuard> = join_all(fetches).await.into_iter().flatten().collect();

    run_in_transaction(pool, move |conn| {
        async move {
            for guard in &fetched {
                diesel::insert_into(guards::table)
                    .values(guard)
                    .execute(conn)
                    .await?;
            }
            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    Ok(last_id)
}

/// One full reconciliation cycle (§4.6): truncate, then page through every
/// known account/module, batch by batch. A batch failure aborts the cycle,
/// leaving `Guard` partially populated until the next scheduled cycle.
pub async fn run_once(pool: &DbPool, client: &NodeClient, settings: &Settings) -> Result<()> {
    run_in_transaction(pool, |conn| {
        async move {
            diesel::delete(guards::table).execute(conn).await?;
            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    let mut after_id = 0i64;
    loop {
        match run_batch(
            pool,
            client,
            settings.guards_concurrency,
            after_id,
            settings.guards_batch_size,
        )
        .await?
        {
            Some(last_id) => after_id = last_id,
            None => break,
        }
    }
    Ok(())
}

/// Entry point: runs once at startup, then once per hour, until shutdown
/// (§4.3 lifecycle note: the Tip Streamer schedules the first reconciliation,
/// subsequent cycles are purely time-driven).
pub async fn run(pool: DbPool, client: NodeClient, settings: Arc<Settings>, shutdown: Shutdown) {
    loop {
        if let Err(e) = run_once(&pool, &client, &settings).await {
            tracing::error!(area = "guards", error = %e, "reconciliation cycle aborted");
        }
        if shutdown.is_triggered() {
            break;
        }
        shutdown
            .sleep_or_shutdown(std::time::Duration::from_secs(3600))
            .await;
        if shutdown.is_triggered() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_guard_from_details_result() {
        let result = json!({
            "result": {
                "status": "success",
                "data": {
                    "guard": {"keys": ["abc"], "pred": "keys-all"}
                }
            }
        });
        let (keys, predicate) = parse_guard_result(&result).unwrap();
        assert_eq!(keys, json!(["abc"]));
        assert_eq!(predicate, "keys-all");
    }

    #[test]
    fn missing_account_yields_no_guard() {
        let result = json!({"result": {"status": "failure", "error": "row not found"}});
        assert!(parse_guard_result(&result).is_none());
    }
}
