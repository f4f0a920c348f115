//! Sweep (LOOK) disk-head scheduler.
//!
//! Orders pending requests so the disk head travels monotonically in one
//! direction across sector addresses, reverses at the nearer exhausted
//! extreme, and sweeps back. Compared to FIFO or pure shortest-seek policies
//! this bounds total head travel without scanning past the last pending
//! request in either direction.
//!
//! Algorithm:
//! 1. Pending requests form a circular doubly-linked arrangement kept in
//!    sector order, anchored at a sentinel slot that carries no request. The
//!    sentinel stands in for the disk head, so the slots adjacent to it are
//!    the next candidates in either travel direction.
//! 2. `add` compares the new sector against the last dispatched sector to
//!    pick a walk direction, then walks until the sector slots between two
//!    neighbors, reaches the extreme, or crosses the wrap boundary. Average
//!    cost is N/2 comparisons.
//! 3. `dispatch` takes the slot adjacent to the sentinel in the travel
//!    direction in O(1), reversing direction when no request remains ahead.
//!
//! The circular order has exactly one point where the sector sequence
//! decreases: the wrap boundary between the highest and lowest pending
//! sectors. Insertion and the neighbor queries recognize it by comparing
//! candidate sectors against the head position, so no minimum/maximum
//! sentinel key is ever needed.

use crate::request::Request;
use std::collections::TryReserveError;
use std::fmt;

/// Index of the sentinel slot. The sentinel carries no request and only
/// closes the circle.
const SENTINEL: u32 = 0;

/// Travel direction of the simulated disk head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Handle to a pending request's slot in the scheduler arena.
///
/// Valid only while the request is pending: dispatch and merge removal
/// invalidate the handle, and the slot may be reused by a later `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u32);

/// Scheduler state could not be allocated at queue attach time.
///
/// Reported to the host so the queue attachment can abort instead of
/// aborting the process.
#[derive(Debug)]
pub struct AttachError {
    source: TryReserveError,
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler arena allocation failed: {}", self.source)
    }
}

impl std::error::Error for AttachError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// `add` walked the entire pending set without finding an insertion point.
///
/// Unreachable while the sorted-circular invariant holds; hitting it means
/// the pending set is corrupted. The rejected request rides in the error so
/// the host decides its fate instead of the scheduler dropping it silently.
#[derive(Debug)]
pub struct AddError {
    pub request: Request,
}

impl fmt::Display for AddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no insertion point for {}: pending-set order corrupted",
            self.request
        )
    }
}

impl std::error::Error for AddError {}

#[derive(Debug)]
struct Slot {
    prev: u32,
    next: u32,
    request: Option<Request>,
}

/// One LOOK scheduler instance, owned by a single host device queue.
///
/// The host serializes every call on one instance (see the queue layer);
/// nothing here locks. Requests are owned by the arena while pending and
/// move back out by value on dispatch or merge removal.
#[derive(Debug)]
pub struct SweepScheduler {
    /// `slots[0]` is the sentinel; it never carries a request.
    slots: Vec<Slot>,
    /// Vacant slot indices available for reuse.
    free: Vec<u32>,
    len: usize,
    last_sector: u64,
    direction: Direction,
}

impl SweepScheduler {
    /// Arena capacity reserved at attach time, sentinel included.
    const INITIAL_SLOTS: usize = 64;

    /// Allocate scheduler state for one host queue.
    ///
    /// The head starts at sector 0 travelling up. Allocation failure is
    /// reported, not fatal.
    pub fn new() -> Result<SweepScheduler, AttachError> {
        let mut slots: Vec<Slot> = Vec::new();
        slots
            .try_reserve(Self::INITIAL_SLOTS)
            .map_err(|source| AttachError { source })?;
        slots.push(Slot {
            prev: SENTINEL,
            next: SENTINEL,
            request: None,
        });
        Ok(SweepScheduler {
            slots,
            free: Vec::new(),
            len: 0,
            last_sector: 0,
            direction: Direction::Up,
        })
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.len
    }

    /// O(1) emptiness check; true exactly when `dispatch` would return `None`.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sector of the most recently dispatched request (0 before the first).
    pub fn last_sector(&self) -> u64 {
        self.last_sector
    }

    /// Current travel direction of the head.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Borrow a pending request by handle.
    pub fn get(&self, id: RequestId) -> Option<&Request> {
        self.slots.get(id.0 as usize)?.request.as_ref()
    }

    /// Mutably borrow a pending request, e.g. to grow it after a merge.
    ///
    /// The sort key is not reachable through this: `Request` exposes no way
    /// to move its start sector.
    pub fn request_mut(&mut self, id: RequestId) -> Option<&mut Request> {
        self.slots.get_mut(id.0 as usize)?.request.as_mut()
    }

    /// Insert a request, preserving the sorted-circular order.
    ///
    /// Sectors above the last dispatched sector are searched walking up from
    /// the sentinel, the rest walking down, which halves the expected walk
    /// length. Exhausting the walk without a position is an invariant
    /// violation and hands the request back in the error.
    pub fn add(&mut self, request: Request) -> Result<RequestId, AddError> {
        let Some((prev, next)) = self.insertion_point(request.sector()) else {
            return Err(AddError { request });
        };
        log::debug!("add {} {}", request.dir, request.sector());
        let idx = self.alloc_slot(request);
        self.link_between(idx, prev, next);
        Ok(RequestId(idx))
    }

    /// Locate the link pair the new sector belongs between.
    ///
    /// Each step checks, in order: the walk opened on the far side of the
    /// wrap boundary (the request caps the run right here); the sector fits
    /// against the current slot in sort order; the current slot is the
    /// extreme of the walk; or the edge ahead is the wrap descent, which
    /// ends the run the request belongs to. The boundary is recognized from
    /// the head position and the local sector order, never from a
    /// minimum/maximum sentinel key. Returns `None` only if the walk
    /// exhausts the circle, which cannot happen while the order invariant
    /// holds.
    fn insertion_point(&self, rqs: u64) -> Option<(u32, u32)> {
        // The walks below assume at least one pending request; the first
        // insert links directly behind the sentinel.
        if self.is_empty() {
            return Some((SENTINEL, SENTINEL));
        }

        if rqs > self.last_sector {
            // Search up: walk toward increasing sectors.
            let mut curr = self.slots[SENTINEL as usize].next;
            while curr != SENTINEL {
                if self.sector(curr) < self.last_sector {
                    // The walk opened on a slot already wrapped behind the
                    // head: nothing remains ahead, so the request leads.
                    return Some((self.slots[curr as usize].prev, curr));
                }
                if rqs < self.sector(curr) {
                    return Some((self.slots[curr as usize].prev, curr));
                }
                let next = self.slots[curr as usize].next;
                if next == SENTINEL {
                    // New upper extreme.
                    return Some((curr, SENTINEL));
                }
                if self.sector(next) < self.sector(curr) {
                    // The edge ahead is the wrap descent: the request caps
                    // the run of sectors ahead of the head.
                    return Some((curr, next));
                }
                curr = next;
            }
        } else {
            // Search down: walk toward decreasing sectors.
            let mut curr = self.slots[SENTINEL as usize].prev;
            while curr != SENTINEL {
                if self.sector(curr) > self.last_sector {
                    // The walk opened on a slot still ahead of the head:
                    // nothing has wrapped yet, so the request trails.
                    return Some((curr, self.slots[curr as usize].next));
                }
                if rqs > self.sector(curr) {
                    return Some((curr, self.slots[curr as usize].next));
                }
                let prev = self.slots[curr as usize].prev;
                if prev == SENTINEL {
                    // New lower extreme.
                    return Some((SENTINEL, curr));
                }
                if self.sector(prev) > self.sector(curr) {
                    // The edge behind is the wrap descent: the request opens
                    // the wrapped run.
                    return Some((prev, curr));
                }
                curr = prev;
            }
        }

        None
    }

    /// Remove and return the next request under the LOOK discipline, in O(1).
    ///
    /// Continues in the current direction while a request remains at or
    /// beyond the head; otherwise reverses and restarts from the extreme of
    /// the opposite sweep.
    pub fn dispatch(&mut self) -> Option<Request> {
        if self.is_empty() {
            return None;
        }

        let first = self.slots[SENTINEL as usize].next;
        let last = self.slots[SENTINEL as usize].prev;

        let idx = match self.direction {
            Direction::Up => {
                if self.sector(first) >= self.last_sector {
                    first
                } else {
                    // Nothing left above the head: reverse and take the
                    // highest pending sector.
                    self.direction = Direction::Down;
                    last
                }
            }
            Direction::Down => {
                if self.sector(last) <= self.last_sector {
                    last
                } else {
                    self.direction = Direction::Up;
                    first
                }
            }
        };

        self.last_sector = self.sector(idx);
        let request = self.unlink(idx);
        log::debug!("dsp {} {}", request.dir, request.sector());
        Some(request)
    }

    /// Host notification that `absorbed` was folded into `surviving` by the
    /// block layer's merge logic.
    ///
    /// Detaches `absorbed` and hands it back; `surviving` already holds a
    /// valid position and is untouched. Returns `None` if `absorbed` is not
    /// pending.
    pub fn merge_notify(&mut self, surviving: RequestId, absorbed: RequestId) -> Option<Request> {
        debug_assert!(self.get(surviving).is_some(), "surviving request must be pending");
        self.get(absorbed)?;
        Some(self.unlink(absorbed.0))
    }

    /// The pending request immediately before `id` in sector order.
    ///
    /// `None` if `id` is the lowest pending sector, the set is singular, or
    /// the structural predecessor is the wrap artifact (its sector is
    /// numerically greater).
    pub fn neighbor_before(&self, id: RequestId) -> Option<RequestId> {
        if self.len < 2 {
            return None;
        }
        let rq = self.get(id)?;

        // Step over the sentinel when the link lands on it.
        let prev = self.slots[id.0 as usize].prev;
        let prev = if prev == SENTINEL {
            self.slots[SENTINEL as usize].prev
        } else {
            prev
        };

        // A predecessor with a larger sector is the wrap boundary, not a
        // true neighbor.
        if rq.sector() < self.sector(prev) {
            return None;
        }
        Some(RequestId(prev))
    }

    /// The pending request immediately after `id` in sector order.
    ///
    /// Symmetric to [`neighbor_before`](Self::neighbor_before), reporting
    /// `None` across the wrap boundary.
    pub fn neighbor_after(&self, id: RequestId) -> Option<RequestId> {
        if self.len < 2 {
            return None;
        }
        let rq = self.get(id)?;

        let next = self.slots[id.0 as usize].next;
        let next = if next == SENTINEL {
            self.slots[SENTINEL as usize].next
        } else {
            next
        };

        if rq.sector() > self.sector(next) {
            return None;
        }
        Some(RequestId(next))
    }

    /// Iterate pending requests in forward circular order from the sentinel.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            sched: self,
            curr: self.slots[SENTINEL as usize].next,
        }
    }

    /// Tear down the scheduler at queue detach time.
    ///
    /// A non-empty pending set here means the host leaked a request; that is
    /// a fatal programming error, not a recoverable condition.
    ///
    /// # Panics
    /// Panics if any request is still pending.
    pub fn exit(self) {
        assert!(
            self.is_empty(),
            "scheduler torn down with {} request(s) still pending",
            self.len
        );
    }

    /// Sector of an occupied slot. The sentinel never reaches here.
    fn sector(&self, idx: u32) -> u64 {
        self.slots[idx as usize]
            .request
            .as_ref()
            .expect("linked slot must hold a request")
            .sector()
    }

    fn alloc_slot(&mut self, request: Request) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize].request = Some(request);
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                prev: idx,
                next: idx,
                request: Some(request),
            });
            idx
        }
    }

    fn link_between(&mut self, idx: u32, prev: u32, next: u32) {
        self.slots[idx as usize].prev = prev;
        self.slots[idx as usize].next = next;
        self.slots[prev as usize].next = idx;
        self.slots[next as usize].prev = idx;
        self.len += 1;
    }

    /// Fully detach a slot and reclaim it, returning the request by value.
    fn unlink(&mut self, idx: u32) -> Request {
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };
        self.slots[prev as usize].next = next;
        self.slots[next as usize].prev = prev;

        let slot = &mut self.slots[idx as usize];
        slot.prev = idx;
        slot.next = idx;
        let request = slot.request.take().expect("unlinked slot must hold a request");
        self.free.push(idx);
        self.len -= 1;
        request
    }
}

/// Forward iterator over the pending set; see [`SweepScheduler::iter`].
pub struct Iter<'a> {
    sched: &'a SweepScheduler,
    curr: u32,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (RequestId, &'a Request);

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr == SENTINEL {
            return None;
        }
        let idx = self.curr;
        let request = self.sched.slots[idx as usize]
            .request
            .as_ref()
            .expect("linked slot must hold a request");
        self.curr = self.sched.slots[idx as usize].next;
        Some((RequestId(idx), request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::IoDir;

    fn rq(sector: u64) -> Request {
        Request::new(IoDir::Read, sector, 8)
    }

    fn sched_with(sectors: &[u64]) -> SweepScheduler {
        let mut sched = SweepScheduler::new().unwrap();
        for &s in sectors {
            sched.add(rq(s)).unwrap();
        }
        sched
    }

    fn sectors(sched: &SweepScheduler) -> Vec<u64> {
        sched.iter().map(|(_, r)| r.sector()).collect()
    }

    /// Forward circular order must be non-decreasing except at one point.
    fn assert_sorted_circular(sched: &SweepScheduler) {
        let order = sectors(sched);
        if order.len() < 2 {
            return;
        }
        let mut descents = 0;
        for i in 0..order.len() {
            let next = order[(i + 1) % order.len()];
            if next < order[i] {
                descents += 1;
            }
        }
        assert!(
            descents <= 1,
            "more than one wrap point in circular order {order:?}"
        );
    }

    #[test]
    fn empty_set_special_case() {
        // The first insert must never fall through to the failure path.
        let mut sched = SweepScheduler::new().unwrap();
        assert!(sched.is_empty());
        sched.add(rq(42)).unwrap();
        assert_eq!(sched.len(), 1);
        assert_eq!(sectors(&sched), vec![42]);
    }

    #[test]
    fn scenario_a_ascending_sweep_from_zero() {
        let mut sched = sched_with(&[50, 10, 30]);
        assert_sorted_circular(&sched);
        let order: Vec<u64> = std::iter::from_fn(|| sched.dispatch())
            .map(|r| r.sector())
            .collect();
        assert_eq!(order, vec![10, 30, 50]);
        assert_eq!(sched.last_sector(), 50);
    }

    #[test]
    fn scenario_b_add_behind_head_mid_sweep() {
        let mut sched = sched_with(&[50, 10, 30]);
        assert_eq!(sched.dispatch().unwrap().sector(), 10);
        assert_eq!(sched.dispatch().unwrap().sector(), 30);
        assert_eq!(sched.last_sector(), 30);

        // 20 is behind the head; sort order must survive the insert.
        sched.add(rq(20)).unwrap();
        assert_sorted_circular(&sched);
        assert_eq!(sched.dispatch().unwrap().sector(), 50);
        assert_eq!(sched.dispatch().unwrap().sector(), 20);
        assert!(sched.is_empty());
    }

    #[test]
    fn scenario_c_reversal_takes_largest_remaining() {
        // Walk the head up to 70 first.
        let mut sched = SweepScheduler::new().unwrap();
        sched.add(rq(70)).unwrap();
        assert_eq!(sched.dispatch().unwrap().sector(), 70);
        assert_eq!(sched.last_sector(), 70);

        sched.add(rq(40)).unwrap();
        sched.add(rq(60)).unwrap();
        assert_eq!(sched.direction(), Direction::Up);
        // No pending sector is >= 70: flip down and take 60, not 40.
        assert_eq!(sched.dispatch().unwrap().sector(), 60);
        assert_eq!(sched.direction(), Direction::Down);
        assert_eq!(sched.dispatch().unwrap().sector(), 40);
    }

    #[test]
    fn scenario_d_merge_removes_absorbed() {
        let mut sched = SweepScheduler::new().unwrap();
        let a = sched.add(rq(10)).unwrap();
        let b = sched.add(rq(18)).unwrap();
        sched.add(rq(30)).unwrap();
        assert_eq!(sched.len(), 3);

        let absorbed = sched.merge_notify(a, b).unwrap();
        assert_eq!(absorbed.sector(), 18);
        assert_eq!(sched.len(), 2);
        assert_sorted_circular(&sched);

        let order: Vec<u64> = std::iter::from_fn(|| sched.dispatch())
            .map(|r| r.sector())
            .collect();
        assert_eq!(order, vec![10, 30]);
    }

    #[test]
    #[should_panic(expected = "still pending")]
    fn scenario_e_exit_with_pending_request_panics() {
        let mut sched = SweepScheduler::new().unwrap();
        sched.add(rq(7)).unwrap();
        sched.exit();
    }

    #[test]
    fn exit_on_empty_queue_succeeds() {
        let mut sched = SweepScheduler::new().unwrap();
        sched.add(rq(7)).unwrap();
        sched.dispatch().unwrap();
        sched.exit();
    }

    #[test]
    fn wrapped_insert_lands_at_boundary() {
        let mut sched = sched_with(&[10, 20, 30]);
        assert_eq!(sched.dispatch().unwrap().sector(), 10);
        assert_eq!(sched.dispatch().unwrap().sector(), 20);

        // Head at 20. 5 and 15 are behind it and must wrap.
        sched.add(rq(5)).unwrap();
        sched.add(rq(15)).unwrap();
        assert_sorted_circular(&sched);

        let order: Vec<u64> = std::iter::from_fn(|| sched.dispatch())
            .map(|r| r.sector())
            .collect();
        assert_eq!(order, vec![30, 15, 5]);
    }

    #[test]
    fn emptiness_matches_dispatch() {
        let mut sched = SweepScheduler::new().unwrap();
        assert!(sched.is_empty());
        assert!(sched.dispatch().is_none());

        sched.add(rq(1)).unwrap();
        assert!(!sched.is_empty());
        assert!(sched.dispatch().is_some());
        assert!(sched.is_empty());
        assert!(sched.dispatch().is_none());
    }

    #[test]
    fn neighbors_are_inverse_away_from_the_wrap() {
        let sched = sched_with(&[10, 20, 30]);
        let ids: Vec<RequestId> = sched.iter().map(|(id, _)| id).collect();

        let after = sched.neighbor_after(ids[0]).unwrap();
        assert_eq!(sched.get(after).unwrap().sector(), 20);
        let before = sched.neighbor_before(after).unwrap();
        assert_eq!(before, ids[0]);
    }

    #[test]
    fn neighbors_report_none_across_the_wrap() {
        let mut sched = sched_with(&[10, 20, 30]);
        sched.dispatch().unwrap();
        sched.dispatch().unwrap();
        // Head at 20; 5 wraps behind 30, the only request still ahead.
        sched.add(rq(5)).unwrap();

        let order = sectors(&sched);
        assert_eq!(order, vec![30, 5]);

        let ids: Vec<RequestId> = sched.iter().map(|(id, _)| id).collect();
        let (hi, lo) = (ids[0], ids[1]);

        // 5 and 30 are true sector-order neighbors of each other.
        assert_eq!(sched.neighbor_after(lo), Some(hi));
        assert_eq!(sched.neighbor_before(hi), Some(lo));
        // The structural edge 30 -> 5 is the wrap, not a relation.
        assert!(sched.neighbor_after(hi).is_none());
        assert!(sched.neighbor_before(lo).is_none());
    }

    #[test]
    fn singular_set_has_no_neighbors() {
        let sched = sched_with(&[42]);
        let (id, _) = sched.iter().next().unwrap();
        assert!(sched.neighbor_before(id).is_none());
        assert!(sched.neighbor_after(id).is_none());
    }

    #[test]
    fn duplicate_sectors_cluster_and_dispatch_adjacent() {
        let mut sched = sched_with(&[25, 25, 10, 25]);
        assert_sorted_circular(&sched);
        let order: Vec<u64> = std::iter::from_fn(|| sched.dispatch())
            .map(|r| r.sector())
            .collect();
        assert_eq!(order, vec![10, 25, 25, 25]);
    }

    #[test]
    fn slots_are_reused_after_removal() {
        let mut sched = SweepScheduler::new().unwrap();
        for s in [10u64, 20, 30] {
            sched.add(rq(s)).unwrap();
        }
        let arena = sched.slots.len();
        while sched.dispatch().is_some() {}
        for s in [40u64, 50, 60] {
            sched.add(rq(s)).unwrap();
        }
        assert_eq!(sched.slots.len(), arena);
    }
}
