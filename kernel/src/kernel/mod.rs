// kernel/src/kernel/mod.rs
//
// fsos: タイマ駆動ラウンドロビン・スケジューラの状態
//
// - task:     TaskId / TaskState / SavedState / TaskContext
// - ring:     タスクの循環双方向リスト（固定長 arena + index リンク）
// - dispatch: tick 1 回ぶんの切替決定（suspend / resume の 2 段階）
// - trace:    dispatch_trace feature 時の 1 行 trace
// - state_ref: 割り込み側から Scheduler に触る唯一の入口
// - entry:    boot 後の段取り
//
// [設計上の不変条件（このモジュールにおける仕様）]
//
// 1. bootstrap() 以降、リングは空にならず current は常に生きたタスクを指す。
// 2. Running は高々 1 つで、それは current。
//    （current が外部から Blocked/Terminated にされた直後だけ 0 になり、次の tick で解消する）
// 3. tick() は Blocked / Terminated を選ばない。Ready が current しかいなければ current のまま。
// 4. イベントログは固定長。あふれたら古いものから上書きする。
//
// 1〜2 は ring.check_invariants() で、debug ビルドでは毎 tick 検査される。

pub mod dispatch;
pub mod entry;
pub mod ring;
pub mod state_ref;
pub mod task;
pub mod trace;

use crate::logging;
use crate::types::AddressSpaceId;

use dispatch::{Dispatch, DispatchError};
use ring::{RingError, TaskRing, Termination};
use task::{SavedState, TaskContext, TaskId, TaskState};

pub const EVENT_LOG_CAP: usize = 128;

//
// ──────────────────────────────────────────────
// LogEvent（抽象イベントログ）
// ──────────────────────────────────────────────
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogEvent {
    Bootstrapped(TaskId),
    Spawned(TaskId),
    TaskStateChanged(TaskId, TaskState),
    TaskSwitched { from: TaskId, to: TaskId, tick: u64 },
    AddressSpaceSwitched(AddressSpaceId),
    Reaped(TaskId),
}

//
// ──────────────────────────────────────────────
// Scheduler（リング + tick 数 + イベントログ）
// ──────────────────────────────────────────────
//

pub struct Scheduler {
    ring: TaskRing,
    tick_count: u64,

    // 抽象イベントログ（リングバッファ）
    event_log: [Option<LogEvent>; EVENT_LOG_CAP],
    event_head: usize,
    event_log_len: usize,
    events_overwritten: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler {
            ring: TaskRing::new(),
            tick_count: 0,
            event_log: [None; EVENT_LOG_CAP],
            event_head: 0,
            event_log_len: 0,
            events_overwritten: 0,
        }
    }

    fn push_event(&mut self, ev: LogEvent) {
        self.event_log[self.event_head] = Some(ev);
        self.event_head = (self.event_head + 1) % EVENT_LOG_CAP;
        if self.event_log_len < EVENT_LOG_CAP {
            self.event_log_len += 1;
        } else {
            self.events_overwritten += 1;
        }
    }

    /// 古い順
    pub fn events(&self) -> impl Iterator<Item = LogEvent> + '_ {
        let start = (self.event_head + EVENT_LOG_CAP - self.event_log_len) % EVENT_LOG_CAP;
        (0..self.event_log_len).filter_map(move |i| self.event_log[(start + i) % EVENT_LOG_CAP])
    }

    pub fn events_overwritten(&self) -> u64 {
        self.events_overwritten
    }

    //
    // bootstrap
    //
    /// いま走っている実行文脈をリングの最初のタスクにする。
    pub fn bootstrap(&mut self, name: &'static str, saved: SavedState) -> Result<TaskId, RingError> {
        logging::info("Scheduler::bootstrap()");
        let id = self.ring.init_bootstrap(name, saved)?;
        self.push_event(LogEvent::Bootstrapped(id));
        Ok(id)
    }

    pub fn spawn(&mut self, name: &'static str, saved: SavedState) -> Result<TaskId, RingError> {
        let id = self.ring.insert(name, saved)?;
        self.push_event(LogEvent::Spawned(id));
        Ok(id)
    }

    pub fn block(&mut self, id: TaskId) -> Result<(), RingError> {
        self.ring.block(id)?;
        self.push_event(LogEvent::TaskStateChanged(id, TaskState::Blocked));
        Ok(())
    }

    pub fn unblock(&mut self, id: TaskId) -> Result<(), RingError> {
        self.ring.unblock(id)?;
        let state = self.ring.get(id)?.state();
        self.push_event(LogEvent::TaskStateChanged(id, state));
        Ok(())
    }

    pub fn terminate(&mut self, id: TaskId) -> Result<Termination, RingError> {
        let t = self.ring.terminate(id)?;
        self.push_event(LogEvent::TaskStateChanged(id, TaskState::Terminated));
        if let Termination::Reaped(_) = t {
            self.push_event(LogEvent::Reaped(id));
        }
        Ok(t)
    }

    //
    // tick()
    //
    /// タイマ割り込み 1 回ぶん。戻り値の stack pointer で復帰すること。
    pub fn tick(&mut self, saved_sp: usize) -> Result<Dispatch, DispatchError> {
        self.tick_count += 1;

        let d = dispatch::tick(&mut self.ring, saved_sp)?;

        if let Dispatch::Switch(sw) = d {
            self.push_event(LogEvent::TaskSwitched {
                from: sw.from,
                to: sw.to,
                tick: self.tick_count,
            });
            if sw.address_space_changed() {
                self.push_event(LogEvent::AddressSpaceSwitched(sw.address_space));
            }
            if sw.reaped.is_some() {
                self.push_event(LogEvent::Reaped(sw.from));
            }
        }
        trace::trace_dispatch(self.tick_count, &d);

        #[cfg(debug_assertions)]
        self.ring.check_invariants()?;

        Ok(d)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn current(&self) -> Option<TaskId> {
        self.ring.current()
    }

    pub fn current_context(&self) -> Option<TaskContext> {
        self.ring.current_context().copied()
    }

    pub fn ring(&self) -> &TaskRing {
        &self.ring
    }

    //
    // dump_task_list()
    //
    /// current を index 0 として next 方向に 1 周ぶん出す。
    pub fn dump_task_list(&self) {
        logging::info("=== Task List Dump ===");
        logging::info_u64(" tasks", self.ring.len() as u64);

        for (idx, (id, ctx)) in self.ring.iter().enumerate() {
            let saved = ctx.saved();
            logging::info_u64(" index", idx as u64);
            logging::info_str("  name", ctx.name());
            logging::info_u64("  slot", id.slot() as u64);
            logging::info_u64("  prev", ctx.prev_slot() as u64);
            logging::info_u64("  next", ctx.next_slot() as u64);
            logging::info_hex("  stack_base", saved.stack_base as u64);
            logging::info_hex("  saved_sp", saved.stack_pointer as u64);
            logging::info_hex("  address_space", saved.address_space.0 as u64);
            logging::info_str("  state", ctx.state().as_str());
        }

        logging::info("=== End of Task List ===");
    }

    //
    // dump_events()
    //
    pub fn dump_events(&self) {
        logging::info("=== Scheduler Event Log Dump ===");
        if self.events_overwritten > 0 {
            logging::warn("event log wrapped; oldest events lost");
            logging::info_u64(" overwritten", self.events_overwritten);
        }

        for ev in self.events() {
            log_event(ev);
        }

        logging::info("=== End of Event Log ===");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// LogEvent → ログ出力
// ─────────────────────────────────────────────

fn log_event(ev: LogEvent) {
    match ev {
        LogEvent::Bootstrapped(tid) => {
            logging::info("EVENT: Bootstrapped");
            logging::info_u64(" task", tid.slot() as u64);
        }
        LogEvent::Spawned(tid) => {
            logging::info("EVENT: Spawned");
            logging::info_u64(" task", tid.slot() as u64);
        }
        LogEvent::TaskStateChanged(tid, state) => {
            logging::info("EVENT: TaskStateChanged");
            logging::info_u64(" task", tid.slot() as u64);
            logging::info_str(" to", state.as_str());
        }
        LogEvent::TaskSwitched { from, to, tick } => {
            logging::info("EVENT: TaskSwitched");
            logging::info_u64(" from", from.slot() as u64);
            logging::info_u64(" to", to.slot() as u64);
            logging::info_u64(" tick", tick);
        }
        LogEvent::AddressSpaceSwitched(asid) => {
            logging::info("EVENT: AddressSpaceSwitched");
            logging::info_hex(" root", asid.0 as u64);
        }
        LogEvent::Reaped(tid) => {
            logging::info("EVENT: Reaped");
            logging::info_u64(" task", tid.slot() as u64);
        }
    }
}
