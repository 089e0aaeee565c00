// kernel/src/kernel/state_ref.rs
//
// 役割:
// - arch(割り込み) 側とカーネル本体の両方から Scheduler にアクセスするための “唯一の入口” を提供する。
//
// やること:
// - Scheduler の実体を static に 1 つだけ持つ。
// - 通常コンテキストからは with_scheduler()（IF=0 区間 + lock）経由でのみ &mut Scheduler を得る。
// - 割り込みコンテキストからは with_scheduler_in_interrupt()（try_lock のみ）を使う。
//
// やらないこと:
// - 複雑な同期（単一コア前提。IF=0 が唯一の同期手段で、Mutex は取り違え検出用）

use spin::Mutex;

use crate::arch::cpu;

use super::ring::RingError;
use super::task::{SavedState, TaskContext, TaskId};
use super::Scheduler;

static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// 割り込み禁止区間で Scheduler を一時的に借用する。
pub fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    cpu::without_interrupts(|| {
        let mut guard = SCHEDULER.lock();
        f(&mut guard)
    })
}

/// 割り込みハンドラ用。IF=0 で来るので、lock が取れない = 同じ CPU 上で誰かが握ったまま割り込まれた。
///
/// 待つと二度と戻らないので、その場で fatal にする。
pub fn with_scheduler_in_interrupt<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    match SCHEDULER.try_lock() {
        Some(mut guard) => f(&mut guard),
        None => cpu::fatal("scheduler lock held across an interrupt"),
    }
}

/// current のスナップショット（bootstrap 前は None）
pub fn current_task() -> Option<TaskContext> {
    with_scheduler(|s| s.current_context())
}

pub fn spawn(name: &'static str, saved: SavedState) -> Result<TaskId, RingError> {
    with_scheduler(|s| s.spawn(name, saved))
}

pub fn dump_task_list() {
    with_scheduler(|s| s.dump_task_list());
}
