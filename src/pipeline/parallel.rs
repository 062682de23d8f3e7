//! Bounded worker pool for per-commit file stats
//!
//! ```text
//!   commit reader ──jobs──▶ N workers (git show) ──results──▶ caller thread
//!   (1 thread)     bounded                         bounded    re-sequence by
//!                                                             commit index
//! ```
//!
//! The reader takes a slot before queueing each commit and the caller gives
//! it back once that commit has been handed on in order. At most `capacity`
//! commits are in flight, so one stuck `git show` stalls the reader instead
//! of letting finished results pile up behind it. The caller receives
//! results in exactly the order the commit stream produced them.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::bounded;
use std::collections::BTreeMap;
use std::thread;

use super::fetch_files;
use crate::git::{ChangeSource, CommitFiles, CommitStream, GitError};
use crate::models::CommitEntry;

type Job = (usize, CommitEntry);
type Done = (usize, CommitEntry, Result<CommitFiles, GitError>);

/// Fetch file stats for every commit in `lines` on `workers` threads and
/// hand each result to `on_result` in history order.
///
/// Returns the number of commits the stream skipped for bad dates. Stops
/// early, dropping in-flight work, if `on_result` fails.
pub(super) fn run<S, F>(source: &S, lines: S::Lines, workers: usize, mut on_result: F) -> Result<usize>
where
    S: ChangeSource,
    F: FnMut(CommitEntry, Result<CommitFiles, GitError>) -> Result<()>,
{
    let capacity = workers * 2;
    let (job_tx, job_rx) = bounded::<Job>(capacity);
    let (done_tx, done_rx) = bounded::<Done>(capacity);
    let (slot_tx, slot_rx) = bounded::<()>(capacity);

    thread::scope(|s| {
        let reader = s.spawn(move || -> Result<usize> {
            let mut commits = CommitStream::new(lines);
            for (index, entry) in commits.by_ref().enumerate() {
                let entry = entry.context("Failed to read commit history")?;
                if slot_tx.send(()).is_err() || job_tx.send((index, entry)).is_err() {
                    break;
                }
            }
            Ok(commits.skipped())
        });

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            s.spawn(move || {
                for (index, entry) in job_rx.iter() {
                    let files = fetch_files(source, &entry.id);
                    if done_tx.send((index, entry, files)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(done_tx);

        let mut pending: BTreeMap<usize, (CommitEntry, Result<CommitFiles, GitError>)> =
            BTreeMap::new();
        let mut next = 0;
        let mut outcome = Ok(());

        'recv: for (index, entry, files) in done_rx.iter() {
            pending.insert(index, (entry, files));
            while let Some((entry, files)) = pending.remove(&next) {
                if let Err(e) = on_result(entry, files) {
                    outcome = Err(e);
                    break 'recv;
                }
                let _ = slot_rx.try_recv();
                next += 1;
            }
        }
        // Unblocks workers and the reader if we stopped early
        drop(done_rx);
        drop(slot_rx);

        let skipped = reader
            .join()
            .map_err(|_| anyhow!("commit reader thread panicked"))?;
        outcome?;
        skipped
    })
}
