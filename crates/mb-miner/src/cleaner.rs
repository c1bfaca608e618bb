use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use mb_merkle::OwnershipClaim;
use mb_summary::summary;
use mb_transaction::{Transaction, TxKind};
use tracing::{debug, info, warn};

use crate::state::{MinerState, RemovalEntry};

/// Floor for the scheduler's idle sleep.
const MIN_SLEEP: Duration = Duration::from_millis(10);

/// The cleaning control loop. Every interval it dispatches up to three
/// concurrent mutation tasks (TTL/deferred removal, user-request
/// verification, miner summarisation); between ticks it prunes finished
/// tasks and sleeps a twentieth of the interval, at most a second.
pub async fn run_cleaner(state: Arc<MinerState>) {
    let mut interval = state.config.cleaning_interval;
    let mut next_tick = Instant::now() + interval;
    loop {
        if Instant::now() >= next_tick {
            next_tick = Instant::now() + interval;

            if !state.to_remove.lock().unwrap().is_empty() {
                spawn_tracked(&state, flush_removals);
            }
            // Runs unconditionally: the slot rotation must happen every
            // cycle even when the current slot is empty.
            spawn_tracked(&state, verify_user_requests);
            if !state.to_summarise.lock().unwrap().is_empty() {
                spawn_tracked(&state, flush_summaries);
            }

            let blocks_created = state.chain.lock().unwrap().blocks_created;
            interval = interval_for(&state, blocks_created);
        } else {
            state.prune_tasks();
            let sleep = (interval / 20).min(Duration::from_secs(1)).max(MIN_SLEEP);
            tokio::time::sleep(sleep).await;
        }
    }
}

/// Spawn a blocking cleaning job and track it in the running-task list.
fn spawn_tracked(state: &Arc<MinerState>, job: fn(&MinerState)) {
    let cloned = state.clone();
    let handle = tokio::task::spawn_blocking(move || job(&cloned));
    state.tasks.lock().unwrap().push(handle);
}

/// The interval grows with the chain until the cap, then clamps to the
/// fixed post-cap value (at which point verification scans the ring instead
/// of the full store).
fn interval_for(state: &MinerState, blocks_created: u64) -> Duration {
    let cfg = &state.config;
    if blocks_created > cfg.block_cap {
        cfg.post_cap_interval
    } else if blocks_created > cfg.interval_growth_block_limit {
        Duration::from_secs(
            cfg.interval_growth_increment * blocks_created / cfg.interval_growth_block_limit,
        )
    } else {
        cfg.cleaning_interval
    }
}

/// Purge every scheduled removal that has come due, one store read and one
/// write per affected block.
pub fn flush_removals(state: &MinerState) {
    let due: Vec<RemovalEntry> = {
        let mut to_remove = state.to_remove.lock().unwrap();
        let now_ms = Utc::now().timestamp_millis();
        let (due, pending): (Vec<_>, Vec<_>) =
            to_remove.drain(..).partition(|entry| entry.due_ms <= now_ms);
        *to_remove = pending;
        due
    };
    if due.is_empty() {
        return;
    }

    let mut by_block: HashMap<String, Vec<String>> = HashMap::new();
    for entry in due {
        by_block.entry(entry.block_hash).or_default().push(entry.tx_id);
    }

    for (block_hash, tx_ids) in by_block {
        match state.store.get_block(&block_hash) {
            Ok(Some(mut block)) => {
                if block.remove_many(&tx_ids) {
                    if let Err(e) = state.store.update_block(&block) {
                        warn!(block = %block_hash, error = %e, "failed to write purged block");
                    } else {
                        debug!(block = %block_hash, purged = tx_ids.len(), "purged transactions");
                    }
                }
            }
            Ok(None) => warn!(block = %block_hash, "scheduled removal in unknown block"),
            Err(e) => warn!(block = %block_hash, error = %e, "skipping unreadable block"),
        }
    }
}

/// Rotate the user-request slots and try to verify the consumed batch
/// against the chain.
///
/// The scan window is the whole store until the chain outgrows `block_cap`,
/// then the recent-blocks ring. A request is authorised once every declared
/// id has a GV-verified witness; authorised requests are injected into the
/// ingress queue (mined later as evidence) and their witnesses scheduled
/// for immediate removal. Anything still incomplete at the end of the cycle
/// is dropped.
pub fn verify_user_requests(state: &MinerState) {
    let requests = state.user_requests.lock().unwrap().rotate();
    if requests.is_empty() {
        return;
    }
    let mut claims: Vec<OwnershipClaim> = requests
        .into_iter()
        .filter_map(OwnershipClaim::from_request)
        .collect();
    if claims.is_empty() {
        return;
    }

    let (blocks_created, ring) = {
        let chain = state.chain.lock().unwrap();
        (chain.blocks_created, chain.recent_blocks.clone())
    };

    let mut complete: Vec<OwnershipClaim> = Vec::new();
    if blocks_created > state.config.block_cap {
        for block_hash in ring {
            match state.store.get_block(&block_hash) {
                Ok(Some(block)) => block.scan_claims(&mut claims),
                Ok(None) => warn!(block = %block_hash, "ring block missing from store"),
                Err(e) => warn!(block = %block_hash, error = %e, "skipping unreadable block"),
            }
        }
        complete = claims.into_iter().filter(|c| c.is_complete()).collect();
    } else {
        for entry in state.store.scan() {
            let block = match entry {
                Ok((_, block)) => block,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable block");
                    continue;
                }
            };
            block.scan_claims(&mut claims);
            let (done, pending): (Vec<_>, Vec<_>) =
                claims.into_iter().partition(|c| c.is_complete());
            complete.extend(done);
            claims = pending;
            if claims.is_empty() {
                break;
            }
        }
        if !claims.is_empty() {
            debug!(dropped = claims.len(), "unverified user requests dropped");
        }
    }

    for claim in complete {
        let (request, witnesses) = claim.into_parts();
        if matches!(request.kind, TxKind::Summarise { .. }) && !summary_matches(&request, &witnesses)
        {
            debug!(request = %request.id, "summarise totals do not match, dropping");
            continue;
        }
        info!(request = %request.id, kind = request.kind.label(), targets = witnesses.len(),
              "user request authorised");
        {
            let mut to_remove = state.to_remove.lock().unwrap();
            to_remove.extend(witnesses.into_iter().map(|(tx, block_hash)| RemovalEntry {
                block_hash,
                tx_id: tx.id,
                due_ms: 0,
            }));
        }
        // Mined into a later block as evidence of the mutation.
        state.enqueue(request);
    }
}

/// A `summarise` request is only honoured when the net token sets of the
/// witnessed transactions equal the sets the request declares.
fn summary_matches(request: &Transaction, witnesses: &[(Transaction, String)]) -> bool {
    let txs: Vec<&Transaction> = witnesses.iter().map(|(tx, _)| tx).collect();
    let (ins, outs) = summary(&txs);
    let declared_ins: BTreeSet<&str> = request.input.split(':').collect();
    let declared_outs: BTreeSet<&str> = request.output.split(':').collect();
    ins.iter().map(String::as_str).collect::<BTreeSet<_>>() == declared_ins
        && outs.iter().map(String::as_str).collect::<BTreeSet<_>>() == declared_outs
}

/// Collapse the pending miner-summarisable transactions: schedule all of
/// them for removal next cycle and, when the net sets are non-empty, mint a
/// single miner-authored `summarised` transaction in their place.
pub fn flush_summaries(state: &MinerState) {
    let snapshot: HashMap<String, Vec<String>> =
        std::mem::take(&mut *state.to_summarise.lock().unwrap());
    if snapshot.is_empty() {
        return;
    }

    let mut collected: Vec<Transaction> = Vec::new();
    for (block_hash, tx_ids) in &snapshot {
        match state.store.get_block(block_hash) {
            Ok(Some(block)) => {
                collected.extend(tx_ids.iter().filter_map(|id| block.get(id)).cloned());
            }
            Ok(None) => warn!(block = %block_hash, "summarisable block missing from store"),
            Err(e) => warn!(block = %block_hash, error = %e, "skipping unreadable block"),
        }
    }

    {
        let mut to_remove = state.to_remove.lock().unwrap();
        for (block_hash, tx_ids) in &snapshot {
            to_remove.extend(tx_ids.iter().map(|tx_id| RemovalEntry {
                block_hash: block_hash.clone(),
                tx_id: tx_id.clone(),
                due_ms: 0,
            }));
        }
    }

    let (ins, outs) = summary(&collected);
    if ins.is_empty() || outs.is_empty() {
        return;
    }
    let summarised = state.author_tx(ins.join(":"), outs.join(":"), TxKind::Summarised);
    info!(tx = %summarised.id, collapsed = collected.len(), "minted summarised transaction");
    state.enqueue(summarised);
}
