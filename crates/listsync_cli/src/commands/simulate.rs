//! Simulate command implementation.
//!
//! Runs a primary replica against an in-process companion through the real
//! engine and codec, and reports what each round moved.

use crate::Format;
use listsync_core::{EntityStore, Item};
use listsync_engine::{LoopbackRemote, SyncConfig, SyncEngine, SyncPeer, SyncResult};
use listsync_protocol::{ConflictPolicy, SnapshotCodec, DEFAULT_CHUNK_TIMEOUT};
use serde::Serialize;
use std::sync::Arc;

/// One sync round.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    /// What happened before the sync.
    pub step: String,
    /// Units the primary sent.
    pub units_sent: usize,
    /// Bytes the primary sent.
    pub bytes_sent: usize,
    /// Units the primary received.
    pub units_received: usize,
    /// Lists left out for size.
    pub lists_skipped: usize,
    /// Entities the companion changed.
    pub companion_changes: usize,
    /// Entities the primary changed.
    pub primary_changes: usize,
}

/// Simulation result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResult {
    /// Transport ceiling used.
    pub ceiling: usize,
    /// Rounds, in order.
    pub rounds: Vec<RoundResult>,
    /// Whether both replicas ended with the same active lists.
    pub converged: bool,
    /// Flushes the primary's bulk insert took.
    pub bulk_insert_flushes: u64,
    /// Lists on the primary at the end.
    pub lists: usize,
    /// Items on the primary at the end.
    pub items: usize,
}

/// Runs the simulate command.
pub fn run(
    lists: usize,
    items: usize,
    ceiling: usize,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(simulate(lists, items, ceiling))?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    if result.converged {
        Ok(())
    } else {
        Err("replicas did not converge".into())
    }
}

/// Seeds a primary, syncs it with a companion three times, and compares them.
pub async fn simulate(lists: usize, items: usize, ceiling: usize) -> SyncResult<SimulateResult> {
    let companion = Arc::new(EntityStore::open_in_memory()?);
    let peer = Arc::new(SyncPeer::new(
        companion.clone(),
        SnapshotCodec::new(ceiling),
        ConflictPolicy::LastWriteWins,
        DEFAULT_CHUNK_TIMEOUT,
    ));
    let remote = Arc::new(LoopbackRemote::new(peer.clone()));
    let engine = SyncEngine::new(
        SyncConfig::default().with_size_ceiling(ceiling),
        Arc::new(EntityStore::open_in_memory()?),
        remote,
    )?;
    let primary = engine.store().clone();

    let mut seeded = Vec::with_capacity(lists);
    for n in 0..lists {
        let list = primary.create_list(&format!("List {}", n + 1))?;
        primary.create_item(list.id, "first")?;
        seeded.push(list.id);
    }

    let mut rounds = Vec::new();
    rounds.push(round(&engine, &peer, format!("primary seeded {lists} lists")).await?);

    if let Some(&first) = seeded.first() {
        let shared = companion.items_of(&first);
        for item in &shared {
            companion.set_crossed_out(&item.id, true)?;
        }
        companion.rename_list(&first, "Renamed on companion")?;
        rounds.push(round(&engine, &peer, "companion edited the first list".to_string()).await?);
    }

    let mut bulk_insert_flushes = 0;
    if let Some(&first) = seeded.first() {
        let before = primary.stats().flushes();
        primary.batch(|txn| {
            let base = txn.items_of(&first).len() as u32;
            for n in 0..items {
                let item = Item::new(first, format!("bulk {}", n + 1), base + n as u32, txn.now());
                txn.upsert_item(item)?;
            }
            Ok(())
        })?;
        bulk_insert_flushes = primary.stats().flushes() - before;
        rounds.push(round(&engine, &peer, format!("primary added {items} items in one batch")).await?);
    }

    Ok(SimulateResult {
        ceiling,
        rounds,
        converged: primary.active_snapshot() == companion.active_snapshot(),
        bulk_insert_flushes,
        lists: primary.list_count(),
        items: primary.item_count(),
    })
}

async fn round(engine: &SyncEngine, peer: &SyncPeer, step: String) -> SyncResult<RoundResult> {
    let outcome = engine.force_sync().await?;
    let report = outcome.report();
    tracing::debug!(%step, units_sent = report.map_or(0, |r| r.units_sent), "round finished");
    Ok(RoundResult {
        step,
        units_sent: report.map_or(0, |r| r.units_sent),
        bytes_sent: report.map_or(0, |r| r.bytes_sent),
        units_received: report.map_or(0, |r| r.units_received),
        lists_skipped: report.map_or(0, |r| r.skipped.len()),
        companion_changes: peer.last_report().map_or(0, |r| r.changes()),
        primary_changes: report
            .and_then(|r| r.merge.as_ref())
            .map_or(0, |merge| merge.changes()),
    })
}

fn print_text_output(result: &SimulateResult) {
    println!("Simulation (ceiling {} bytes)", result.ceiling);
    println!("==========");
    for (index, round) in result.rounds.iter().enumerate() {
        println!("Round {}: {}", index + 1, round.step);
        println!(
            "  sent {} units ({} bytes), received {}",
            round.units_sent, round.bytes_sent, round.units_received
        );
        println!(
            "  companion changed {}, primary changed {}",
            round.companion_changes, round.primary_changes
        );
        if round.lists_skipped > 0 {
            println!("  {} lists too large to send", round.lists_skipped);
        }
    }
    println!();
    println!("Bulk insert flushes: {}", result.bulk_insert_flushes);
    println!("Final state:         {} lists, {} items", result.lists, result.items);
    if result.converged {
        println!("✓ Replicas converged");
    } else {
        println!("✗ Replicas diverged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replicas_converge() {
        let result = simulate(3, 100, listsync_protocol::SIZE_CEILING).await.unwrap();
        assert!(result.converged);
        assert_eq!(result.rounds.len(), 3);
        assert_eq!(result.bulk_insert_flushes, 1);
        assert_eq!(result.lists, 3);
        assert_eq!(result.items, 103);
        assert_eq!(result.rounds[0].companion_changes, 6);
        assert!(result.rounds[1].primary_changes > 0);
    }

    #[tokio::test]
    async fn small_ceiling_chunks_the_exchange() {
        let result = simulate(12, 0, 2048).await.unwrap();
        assert!(result.converged);
        assert!(result.rounds[0].units_sent > 1);
        assert!(result.rounds[0].units_received > 1);
        assert_eq!(result.rounds[0].lists_skipped, 0);
    }

    #[tokio::test]
    async fn no_lists_is_a_single_round() {
        let result = simulate(0, 10, 4096).await.unwrap();
        assert!(result.converged);
        assert_eq!(result.rounds.len(), 1);
        assert_eq!(result.items, 0);
    }
}
