//! Page-granular strict two-phase locking with upgrades and deadlock
//! detection by cycle search over a wait-for graph.
//!
//! The lock table, wait-for graph, and the condition waiters re-check all
//! share a single mutex; waiters suspend on a condition variable attached
//! to that mutex. Every mutation that could unblock a waiter (release,
//! abort cleanup) broadcasts a wake.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};

use log::{debug, trace, warn};

use crate::error::{DbError, Result};
use crate::heap_page::{HeapPageId, Permission};
use crate::transaction::TransactionId;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl From<Permission> for LockMode {
    fn from(perm: Permission) -> Self {
        match perm {
            Permission::Read => LockMode::Shared,
            Permission::Write => LockMode::Exclusive,
        }
    }
}

enum Decision {
    Grant,
    Deny(HashSet<TransactionId>),
}

#[derive(Default)]
struct LockTable {
    // invariant: for any page, holders are either all Shared, or a single Exclusive.
    locks: HashMap<HeapPageId, HashMap<TransactionId, LockMode>>,
    locked_by: HashMap<TransactionId, HashSet<HeapPageId>>,
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl LockTable {
    fn decide(&self, pid: HeapPageId, tid: TransactionId, mode: LockMode) -> Decision {
        let holders = match self.locks.get(&pid) {
            None => return Decision::Grant,
            Some(h) if h.is_empty() => return Decision::Grant,
            Some(h) => h,
        };
        if holders.len() == 1 && holders.contains_key(&tid) {
            return Decision::Grant;
        }
        if mode == LockMode::Shared && !holders.values().any(|m| *m == LockMode::Exclusive) {
            return Decision::Grant;
        }
        let blockers: HashSet<TransactionId> = match mode {
            LockMode::Exclusive => holders.keys().filter(|&&h| h != tid).copied().collect(),
            LockMode::Shared => holders
                .iter()
                .filter(|(_, &m)| m == LockMode::Exclusive)
                .map(|(&h, _)| h)
                .filter(|&h| h != tid)
                .collect(),
        };
        Decision::Deny(blockers)
    }

    fn grant(&mut self, pid: HeapPageId, tid: TransactionId, mode: LockMode) {
        self.locks.entry(pid).or_default().insert(tid, mode);
        self.locked_by.entry(tid).or_default().insert(pid);
    }

    /// DFS from `start` over the wait-for graph; true iff a cycle reaches
    /// back to `start`.
    fn has_cycle_from(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if let Some(next) = self.wait_for.get(&node) {
                for &n in next {
                    if n == start {
                        return true;
                    }
                    if visited.insert(n) {
                        stack.push(n);
                    }
                }
            }
        }
        false
    }

    fn clear_wait_for(&mut self, tid: TransactionId) {
        self.wait_for.remove(&tid);
        for edges in self.wait_for.values_mut() {
            edges.remove(&tid);
        }
    }
}

pub struct LockManager {
    table: Mutex<LockTable>,
    cond: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            table: Mutex::new(LockTable::default()),
            cond: Condvar::new(),
        }
    }

    /// Blocks until `mode` can be granted to `tid` on `pid`, or fails with
    /// `DbError::Aborted` if `tid` is chosen as a deadlock victim.
    pub fn acquire_lock(&self, tid: TransactionId, pid: HeapPageId, mode: LockMode) -> Result<()> {
        let mut guard = self.table.lock().unwrap();
        loop {
            match guard.decide(pid, tid, mode) {
                Decision::Grant => {
                    guard.grant(pid, tid, mode);
                    guard.wait_for.remove(&tid);
                    trace!("{:?} granted {:?} on {:?}", tid, mode, pid);
                    self.cond.notify_all();
                    return Ok(());
                }
                Decision::Deny(blockers) => {
                    guard.wait_for.insert(tid, blockers);
                    if guard.has_cycle_from(tid) {
                        guard.clear_wait_for(tid);
                        warn!("{:?} aborted: deadlock detected on {:?}", tid, pid);
                        self.cond.notify_all();
                        return Err(DbError::Aborted);
                    }
                    debug!("{:?} blocked waiting for {:?} on {:?}", tid, mode, pid);
                    guard = self.cond.wait(guard).unwrap();
                    guard.wait_for.remove(&tid);
                }
            }
        }
    }

    /// Removes `tid`'s entry for `pid`, if any, and wakes any waiters.
    pub fn release_lock(&self, pid: HeapPageId, tid: TransactionId) {
        let mut guard = self.table.lock().unwrap();
        if let Some(holders) = guard.locks.get_mut(&pid) {
            holders.remove(&tid);
            if holders.is_empty() {
                guard.locks.remove(&pid);
            }
        }
        if let Some(pages) = guard.locked_by.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                guard.locked_by.remove(&tid);
            }
        }
        self.cond.notify_all();
    }

    /// Releases every lock held by `tid`.
    pub fn release_all(&self, tid: TransactionId) {
        let mut guard = self.table.lock().unwrap();
        if let Some(pages) = guard.locked_by.remove(&tid) {
            for pid in pages {
                if let Some(holders) = guard.locks.get_mut(&pid) {
                    holders.remove(&tid);
                    if holders.is_empty() {
                        guard.locks.remove(&pid);
                    }
                }
            }
        }
        self.cond.notify_all();
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: HeapPageId) -> bool {
        let guard = self.table.lock().unwrap();
        guard
            .locks
            .get(&pid)
            .map(|h| h.contains_key(&tid))
            .unwrap_or(false)
    }

    /// The set of pages for which `tid` currently holds an entry.
    pub fn pages_locked_by(&self, tid: TransactionId) -> HashSet<HeapPageId> {
        let guard = self.table.lock().unwrap();
        guard.locked_by.get(&tid).cloned().unwrap_or_default()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
