// kernel/src/kernel/ring.rs
//
// 役割:
// - タスクの循環双方向リストを固定長 arena 上に持つ。prev/next は slot index。
// - プロセス全体で 1 つの current を持つ。
//
// [不変条件]
// 1. 初期化後、リングは空にならない（最低でも bootstrap タスクが自分自身とリンクしている）。
// 2. 生きている全スロットについて ctx[ctx[i].next].prev == i かつ ctx[ctx[i].prev].next == i。
// 3. current から next をたどると len 歩でちょうど current に戻る。
// 4. Running はちょうど 1 つで、それは current。
// 5. Terminated のタスクはリングから外されてからスロットを解放する。
//
// これらは check_invariants() で検査できる。
//
// 同期: ここは素のデータ構造。呼び出し側が割り込み禁止区間で触ること。

use core::fmt;

use super::task::{SavedState, TaskContext, TaskId, TaskState};

pub const MAX_TASKS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingError {
    NotInitialized,
    AlreadyInitialized,
    CapacityExceeded,
    /// 解放済み（または再利用済み）スロットを指すハンドル
    StaleHandle(TaskId),
    /// current 自身を外そうとした（先に current を進めること）
    RemovingCurrent,
    /// Terminated 以外を外そうとした
    NotTerminated(TaskState),
    InvalidTransition { from: TaskState, to: TaskState },
    /// 不変条件違反（検出したら続行しない）
    Corrupted(&'static str),
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::NotInitialized => write!(f, "task ring not initialized"),
            RingError::AlreadyInitialized => write!(f, "task ring already initialized"),
            RingError::CapacityExceeded => write!(f, "task ring full ({} slots)", MAX_TASKS),
            RingError::StaleHandle(id) => write!(f, "stale task handle {}", id),
            RingError::RemovingCurrent => write!(f, "cannot unlink the current task"),
            RingError::NotTerminated(state) => {
                write!(f, "cannot unlink a task in state {}", state.as_str())
            }
            RingError::InvalidTransition { from, to } => {
                write!(f, "invalid transition {} -> {}", from.as_str(), to.as_str())
            }
            RingError::Corrupted(what) => write!(f, "task ring corrupted: {}", what),
        }
    }
}

/// terminate() の結果
#[derive(Clone, Copy, Debug)]
pub enum Termination {
    /// 即座にリングから外した
    Reaped(TaskContext),
    /// current なので次の dispatch で外す
    Deferred,
}

#[derive(Clone, Copy)]
struct Slot {
    generation: u32,
    context: Option<TaskContext>,
}

impl Slot {
    const EMPTY: Slot = Slot {
        generation: 0,
        context: None,
    };
}

pub struct TaskRing {
    slots: [Slot; MAX_TASKS],
    current: Option<usize>,
    len: usize,
}

impl TaskRing {
    pub const fn new() -> Self {
        TaskRing {
            slots: [Slot::EMPTY; MAX_TASKS],
            current: None,
            len: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// bootstrap タスク（いま走っている実行文脈）でリングを作る。
    pub fn init_bootstrap(&mut self, name: &'static str, saved: SavedState) -> Result<TaskId, RingError> {
        if self.is_initialized() {
            return Err(RingError::AlreadyInitialized);
        }
        let slot = self.free_slot().ok_or(RingError::CapacityExceeded)?;

        self.slots[slot].context = Some(TaskContext {
            name,
            prev: slot,
            next: slot,
            saved,
            state: TaskState::Running,
        });
        self.current = Some(slot);
        self.len = 1;
        Ok(self.id_of(slot))
    }

    /// current の直後に Ready で挿入する。
    pub fn insert(&mut self, name: &'static str, saved: SavedState) -> Result<TaskId, RingError> {
        let cur = self.current.ok_or(RingError::NotInitialized)?;
        let slot = self.free_slot().ok_or(RingError::CapacityExceeded)?;
        let after = self.ctx(cur)?.next;

        self.slots[slot].context = Some(TaskContext {
            name,
            prev: cur,
            next: after,
            saved,
            state: TaskState::Ready,
        });
        self.ctx_mut(after)?.prev = slot;
        self.ctx_mut(cur)?.next = slot;
        self.len += 1;
        Ok(self.id_of(slot))
    }

    /// Terminated のタスクをリングから外し、スロットを解放する。
    pub fn remove(&mut self, id: TaskId) -> Result<TaskContext, RingError> {
        let slot = self.resolve(id)?;
        if self.current == Some(slot) {
            return Err(RingError::RemovingCurrent);
        }
        self.unlink(slot)
    }

    fn unlink(&mut self, slot: usize) -> Result<TaskContext, RingError> {
        let ctx = *self.ctx(slot)?;
        if !ctx.state.is_terminal() {
            return Err(RingError::NotTerminated(ctx.state));
        }

        self.ctx_mut(ctx.prev)?.next = ctx.next;
        self.ctx_mut(ctx.next)?.prev = ctx.prev;

        let s = &mut self.slots[slot];
        s.context = None;
        s.generation = s.generation.wrapping_add(1);
        self.len -= 1;
        Ok(ctx)
    }

    /// Ready / Running → Blocked
    pub fn block(&mut self, id: TaskId) -> Result<(), RingError> {
        let slot = self.resolve(id)?;
        let ctx = self.ctx_mut(slot)?;
        match ctx.state {
            TaskState::Ready | TaskState::Running => {
                ctx.state = TaskState::Blocked;
                Ok(())
            }
            from => Err(RingError::InvalidTransition {
                from,
                to: TaskState::Blocked,
            }),
        }
    }

    /// Blocked → Ready（current なら Running に戻す）
    pub fn unblock(&mut self, id: TaskId) -> Result<(), RingError> {
        let slot = self.resolve(id)?;
        let is_current = self.current == Some(slot);
        let ctx = self.ctx_mut(slot)?;
        if ctx.state != TaskState::Blocked {
            return Err(RingError::InvalidTransition {
                from: ctx.state,
                to: TaskState::Ready,
            });
        }
        ctx.state = if is_current {
            TaskState::Running
        } else {
            TaskState::Ready
        };
        Ok(())
    }

    /// Terminated にする。current 以外はその場で外す。
    pub fn terminate(&mut self, id: TaskId) -> Result<Termination, RingError> {
        let slot = self.resolve(id)?;
        let ctx = self.ctx_mut(slot)?;
        if ctx.state.is_terminal() {
            return Err(RingError::InvalidTransition {
                from: ctx.state,
                to: TaskState::Terminated,
            });
        }
        ctx.state = TaskState::Terminated;

        if self.current == Some(slot) {
            return Ok(Termination::Deferred);
        }
        self.unlink(slot).map(Termination::Reaped)
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current.map(|slot| self.id_of(slot))
    }

    pub fn current_context(&self) -> Option<&TaskContext> {
        self.current.and_then(|slot| self.slots[slot].context.as_ref())
    }

    pub fn get(&self, id: TaskId) -> Result<&TaskContext, RingError> {
        let slot = self.resolve(id)?;
        self.ctx(slot)
    }

    /// current から next 方向に 1 周
    pub fn iter(&self) -> RingIter<'_> {
        RingIter::new(self, Direction::Next)
    }

    /// current から prev 方向に 1 周
    pub fn iter_rev(&self) -> RingIter<'_> {
        RingIter::new(self, Direction::Prev)
    }

    /// [不変条件] 1〜4 を検査する
    pub fn check_invariants(&self) -> Result<(), RingError> {
        let cur = match self.current {
            Some(cur) => cur,
            None if self.len == 0 => return Ok(()),
            None => return Err(RingError::Corrupted("tasks exist but current is unset")),
        };

        let occupied = self.slots.iter().filter(|s| s.context.is_some()).count();
        if occupied != self.len {
            return Err(RingError::Corrupted("live count disagrees with arena"));
        }

        let mut running = 0;
        for (slot, s) in self.slots.iter().enumerate() {
            let Some(ctx) = s.context.as_ref() else {
                continue;
            };
            let next = self.slots.get(ctx.next).and_then(|n| n.context.as_ref());
            let prev = self.slots.get(ctx.prev).and_then(|p| p.context.as_ref());
            match (next, prev) {
                (Some(n), Some(p)) if n.prev == slot && p.next == slot => {}
                _ => return Err(RingError::Corrupted("asymmetric prev/next links")),
            }
            if ctx.state == TaskState::Running {
                running += 1;
                if slot != cur {
                    return Err(RingError::Corrupted("running task is not current"));
                }
            }
        }

        // Running の current が Blocked/Terminated に落ちている間は 0 を許す（次の tick で解消）
        if running > 1 {
            return Err(RingError::Corrupted("more than one running task"));
        }

        let mut steps = 0;
        let mut cursor = cur;
        loop {
            cursor = self.ctx(cursor)?.next;
            steps += 1;
            if cursor == cur {
                break;
            }
            if steps > self.len {
                return Err(RingError::Corrupted("ring does not close"));
            }
        }
        if steps != self.len {
            return Err(RingError::Corrupted("ring lap skips live tasks"));
        }
        Ok(())
    }

    // ── dispatcher 用の内部 API ──

    pub(crate) fn current_slot(&self) -> Option<usize> {
        self.current
    }

    pub(crate) fn set_current(&mut self, slot: usize) {
        self.current = Some(slot);
    }

    pub(crate) fn ctx(&self, slot: usize) -> Result<&TaskContext, RingError> {
        self.slots
            .get(slot)
            .and_then(|s| s.context.as_ref())
            .ok_or(RingError::Corrupted("link to empty slot"))
    }

    pub(crate) fn ctx_mut(&mut self, slot: usize) -> Result<&mut TaskContext, RingError> {
        self.slots
            .get_mut(slot)
            .and_then(|s| s.context.as_mut())
            .ok_or(RingError::Corrupted("link to empty slot"))
    }

    /// from の次から next 方向に Ready を探す。from 自身には戻らない。
    pub(crate) fn next_ready_after(&self, from: usize) -> Result<Option<usize>, RingError> {
        let mut cursor = self.ctx(from)?.next;
        for _ in 0..self.len {
            if cursor == from {
                return Ok(None);
            }
            let ctx = self.ctx(cursor)?;
            if ctx.state.is_schedulable() {
                return Ok(Some(cursor));
            }
            cursor = ctx.next;
        }
        Err(RingError::Corrupted("ring does not close"))
    }

    /// current ではなくなった Terminated タスクを外す（dispatch の最後の動作）
    pub(crate) fn reap(&mut self, slot: usize) -> Result<TaskContext, RingError> {
        if self.current == Some(slot) {
            return Err(RingError::RemovingCurrent);
        }
        self.unlink(slot)
    }

    pub(crate) fn id_of(&self, slot: usize) -> TaskId {
        TaskId {
            slot: slot as u16,
            generation: self.slots[slot].generation,
        }
    }

    fn resolve(&self, id: TaskId) -> Result<usize, RingError> {
        let slot = id.slot();
        match self.slots.get(slot) {
            Some(s) if s.generation == id.generation && s.context.is_some() => Ok(slot),
            _ => Err(RingError::StaleHandle(id)),
        }
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.context.is_none())
    }
}

impl Default for TaskRing {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Next,
    Prev,
}

/// current を起点に 1 周だけ歩くイテレータ。
///
/// リンクが壊れていても len 歩で必ず止まる。
pub struct RingIter<'a> {
    ring: &'a TaskRing,
    start: Option<usize>,
    cursor: Option<usize>,
    remaining: usize,
    direction: Direction,
}

impl<'a> RingIter<'a> {
    fn new(ring: &'a TaskRing, direction: Direction) -> Self {
        RingIter {
            ring,
            start: ring.current,
            cursor: ring.current,
            remaining: ring.len,
            direction,
        }
    }
}

impl<'a> Iterator for RingIter<'a> {
    type Item = (TaskId, &'a TaskContext);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.cursor?;
        let ctx = self.ring.ctx(slot).ok()?;
        self.remaining -= 1;

        let following = match self.direction {
            Direction::Next => ctx.next,
            Direction::Prev => ctx.prev,
        };
        self.cursor = if Some(following) == self.start {
            None
        } else {
            Some(following)
        };
        Some((self.ring.id_of(slot), ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddressSpaceId;

    fn saved(sp: usize) -> SavedState {
        SavedState::new(sp & !0xFFF, sp, AddressSpaceId(0x1000))
    }

    fn names_forward(ring: &TaskRing) -> Vec<&'static str> {
        ring.iter().map(|(_, c)| c.name()).collect()
    }

    fn names_backward(ring: &TaskRing) -> Vec<&'static str> {
        ring.iter_rev().map(|(_, c)| c.name()).collect()
    }

    #[test]
    fn bootstrap_task_links_to_itself() {
        let mut ring = TaskRing::new();
        let id = ring.init_bootstrap("kernel", saved(0x9000)).unwrap();

        let ctx = ring.get(id).unwrap();
        assert_eq!(ctx.prev_slot(), id.slot());
        assert_eq!(ctx.next_slot(), id.slot());
        assert_eq!(ctx.state(), TaskState::Running);
        assert_eq!(ring.current(), Some(id));
        assert_eq!(names_forward(&ring), ["kernel"]);
        ring.check_invariants().unwrap();
    }

    #[test]
    fn second_bootstrap_is_rejected() {
        let mut ring = TaskRing::new();
        ring.init_bootstrap("kernel", saved(0x9000)).unwrap();
        assert_eq!(
            ring.init_bootstrap("again", saved(0xA000)),
            Err(RingError::AlreadyInitialized)
        );
    }

    #[test]
    fn insert_requires_initialized_ring() {
        let mut ring = TaskRing::new();
        assert_eq!(ring.insert("a", saved(0x1000)), Err(RingError::NotInitialized));
    }

    #[test]
    fn insert_splices_right_after_current() {
        let mut ring = TaskRing::new();
        ring.init_bootstrap("A", saved(0x1000)).unwrap();
        ring.insert("C", saved(0x3000)).unwrap();
        let b = ring.insert("B", saved(0x2000)).unwrap();

        assert_eq!(ring.get(b).unwrap().state(), TaskState::Ready);
        assert_eq!(names_forward(&ring), ["A", "B", "C"]);
        ring.check_invariants().unwrap();
    }

    #[test]
    fn forward_and_backward_laps_visit_same_set() {
        let mut ring = TaskRing::new();
        ring.init_bootstrap("A", saved(0x1000)).unwrap();
        for name in ["E", "D", "C", "B"] {
            ring.insert(name, saved(0x2000)).unwrap();
        }

        let fwd = names_forward(&ring);
        let bwd = names_backward(&ring);
        assert_eq!(fwd, ["A", "B", "C", "D", "E"]);
        assert_eq!(bwd, ["A", "E", "D", "C", "B"]);

        let mut a = fwd.clone();
        let mut b = bwd.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(fwd.len(), ring.len());
    }

    #[test]
    fn terminated_task_disappears_from_next_lap() {
        let mut ring = TaskRing::new();
        ring.init_bootstrap("A", saved(0x1000)).unwrap();
        ring.insert("C", saved(0x3000)).unwrap();
        let b = ring.insert("B", saved(0x2000)).unwrap();

        match ring.terminate(b).unwrap() {
            Termination::Reaped(ctx) => assert_eq!(ctx.name(), "B"),
            Termination::Deferred => panic!("non-current task must be reaped at once"),
        }

        assert_eq!(names_forward(&ring), ["A", "C"]);
        assert_eq!(names_backward(&ring), ["A", "C"]);
        assert_eq!(ring.len(), 2);
        ring.check_invariants().unwrap();
    }

    #[test]
    fn terminating_current_is_deferred() {
        let mut ring = TaskRing::new();
        let a = ring.init_bootstrap("A", saved(0x1000)).unwrap();
        ring.insert("B", saved(0x2000)).unwrap();

        assert!(matches!(ring.terminate(a), Ok(Termination::Deferred)));
        assert_eq!(ring.get(a).unwrap().state(), TaskState::Terminated);
        assert_eq!(ring.remove(a).unwrap_err(), RingError::RemovingCurrent);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn remove_rejects_live_tasks() {
        let mut ring = TaskRing::new();
        ring.init_bootstrap("A", saved(0x1000)).unwrap();
        let b = ring.insert("B", saved(0x2000)).unwrap();
        assert_eq!(ring.remove(b).unwrap_err(), RingError::NotTerminated(TaskState::Ready));
    }

    #[test]
    fn stale_handle_is_rejected_after_slot_reuse() {
        let mut ring = TaskRing::new();
        ring.init_bootstrap("A", saved(0x1000)).unwrap();
        let b = ring.insert("B", saved(0x2000)).unwrap();
        ring.terminate(b).unwrap();

        let c = ring.insert("C", saved(0x3000)).unwrap();
        assert_eq!(c.slot(), b.slot());
        assert_ne!(c.generation(), b.generation());
        assert_eq!(ring.get(b).unwrap_err(), RingError::StaleHandle(b));
        assert_eq!(ring.get(c).unwrap().name(), "C");
    }

    #[test]
    fn capacity_is_enforced() {
        let mut ring = TaskRing::new();
        ring.init_bootstrap("boot", saved(0x1000)).unwrap();
        for _ in 1..MAX_TASKS {
            ring.insert("worker", saved(0x2000)).unwrap();
        }
        assert_eq!(ring.insert("overflow", saved(0x3000)), Err(RingError::CapacityExceeded));
        assert_eq!(ring.iter().count(), MAX_TASKS);
        ring.check_invariants().unwrap();
    }

    #[test]
    fn block_and_unblock_transitions() {
        let mut ring = TaskRing::new();
        let a = ring.init_bootstrap("A", saved(0x1000)).unwrap();
        let b = ring.insert("B", saved(0x2000)).unwrap();

        ring.block(b).unwrap();
        assert_eq!(ring.get(b).unwrap().state(), TaskState::Blocked);
        assert!(matches!(
            ring.block(b),
            Err(RingError::InvalidTransition { from: TaskState::Blocked, .. })
        ));
        ring.unblock(b).unwrap();
        assert_eq!(ring.get(b).unwrap().state(), TaskState::Ready);
        assert!(ring.unblock(b).is_err());

        ring.block(a).unwrap();
        ring.unblock(a).unwrap();
        assert_eq!(ring.get(a).unwrap().state(), TaskState::Running);
    }

    #[test]
    fn terminated_is_final() {
        let mut ring = TaskRing::new();
        let a = ring.init_bootstrap("A", saved(0x1000)).unwrap();
        ring.terminate(a).unwrap();
        assert!(ring.block(a).is_err());
        assert!(ring.unblock(a).is_err());
        assert!(ring.terminate(a).is_err());
    }

    #[test]
    fn next_ready_after_wraps_and_skips() {
        let mut ring = TaskRing::new();
        let a = ring.init_bootstrap("A", saved(0x1000)).unwrap();
        ring.insert("C", saved(0x3000)).unwrap();
        let b = ring.insert("B", saved(0x2000)).unwrap();

        ring.block(b).unwrap();
        let found = ring.next_ready_after(a.slot()).unwrap().unwrap();
        assert_eq!(ring.ctx(found).unwrap().name(), "C");

        let alone = {
            let mut r = TaskRing::new();
            let only = r.init_bootstrap("solo", saved(0x1000)).unwrap();
            r.next_ready_after(only.slot()).unwrap()
        };
        assert_eq!(alone, None);
    }

    #[test]
    fn empty_ring_iterates_nothing() {
        let ring = TaskRing::new();
        assert_eq!(ring.iter().count(), 0);
        assert!(ring.current_context().is_none());
        ring.check_invariants().unwrap();
    }
}
