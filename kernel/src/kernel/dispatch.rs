// kernel/src/kernel/dispatch.rs
//
// 役割:
// - タイマ割り込み 1 回ぶんのラウンドロビン 1 歩を決める。
//
// やること:
// - suspend: 出ていくタスクの stack pointer を保存する
// - select : next 方向に最初の Ready を探す（Blocked/Terminated は飛ばす、1 周で打ち切る）
// - resume : 状態遷移と current の付け替え。Terminated だった出ていくタスクはここで外す
//
// やらないこと:
// - 実際のスタック差し替え / CR3 書き込み（戻り値を受け取ったトランポリンとタイマフックの責務）
//
// 前提: 割り込み禁止中に呼ばれる（タイマ割り込みの中 or without_interrupts の中）。

use core::fmt;

use super::ring::{RingError, TaskRing};
use super::task::{TaskContext, TaskId, TaskState};
use crate::types::AddressSpaceId;

/// tick() の決定
#[derive(Clone, Copy, Debug)]
pub enum Dispatch {
    /// 他に Ready がいない。current はそのまま
    Stay { stack_pointer: usize },
    Switch(Switch),
}

impl Dispatch {
    /// トランポリンが復帰に使う stack pointer
    pub fn stack_pointer(&self) -> usize {
        match self {
            Dispatch::Stay { stack_pointer } => *stack_pointer,
            Dispatch::Switch(sw) => sw.stack_pointer,
        }
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, Dispatch::Switch(_))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Switch {
    pub from: TaskId,
    pub to: TaskId,
    pub stack_pointer: usize,
    pub address_space: AddressSpaceId,
    pub previous_address_space: AddressSpaceId,
    /// 出ていくタスクが Terminated だった場合、外したコンテキスト
    pub reaped: Option<TaskContext>,
}

impl Switch {
    /// CR3 を書き換える必要があるか。未割り当て (0) のタスクへは切り替えない
    pub fn address_space_changed(&self) -> bool {
        self.address_space.is_assigned() && self.address_space != self.previous_address_space
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// リング未初期化（bootstrap 前のタイマ割り込み）
    NoCurrent,
    /// 出ていくタスクが Running ではなく、他に Ready もいない
    NothingRunnable { outgoing: TaskId, state: TaskState },
    Ring(RingError),
}

impl From<RingError> for DispatchError {
    fn from(e: RingError) -> Self {
        DispatchError::Ring(e)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoCurrent => write!(f, "dispatch before scheduler bootstrap"),
            DispatchError::NothingRunnable { outgoing, state } => write!(
                f,
                "nothing runnable: task {} is {} and no other task is ready",
                outgoing,
                state.as_str()
            ),
            DispatchError::Ring(e) => write!(f, "{}", e),
        }
    }
}

/// ラウンドロビン 1 歩。saved_sp はトランポリンが積んだ直後の stack pointer。
pub fn tick(ring: &mut TaskRing, saved_sp: usize) -> Result<Dispatch, DispatchError> {
    let outgoing = suspend(ring, saved_sp)?;

    match ring.next_ready_after(outgoing)? {
        Some(incoming) => resume(ring, outgoing, incoming).map(Dispatch::Switch),
        None => {
            let ctx = ring.ctx(outgoing)?;
            if ctx.state == TaskState::Running {
                Ok(Dispatch::Stay {
                    stack_pointer: saved_sp,
                })
            } else {
                Err(DispatchError::NothingRunnable {
                    outgoing: ring.id_of(outgoing),
                    state: ctx.state,
                })
            }
        }
    }
}

fn suspend(ring: &mut TaskRing, saved_sp: usize) -> Result<usize, DispatchError> {
    let slot = ring.current_slot().ok_or(DispatchError::NoCurrent)?;
    ring.ctx_mut(slot)?.saved.stack_pointer = saved_sp;
    Ok(slot)
}

fn resume(ring: &mut TaskRing, outgoing: usize, incoming: usize) -> Result<Switch, DispatchError> {
    let from = ring.id_of(outgoing);
    let to = ring.id_of(incoming);

    let out_ctx = ring.ctx_mut(outgoing)?;
    let previous_address_space = out_ctx.saved.address_space;
    // 外部から Blocked / Terminated にされていればそのまま
    if out_ctx.state == TaskState::Running {
        out_ctx.state = TaskState::Ready;
    }
    let out_terminated = out_ctx.state.is_terminal();

    let in_ctx = ring.ctx_mut(incoming)?;
    in_ctx.state = TaskState::Running;
    let resume_to = in_ctx.saved;

    ring.set_current(incoming);

    let reaped = if out_terminated {
        Some(ring.reap(outgoing)?)
    } else {
        None
    };

    Ok(Switch {
        from,
        to,
        stack_pointer: resume_to.stack_pointer,
        address_space: resume_to.address_space,
        previous_address_space,
        reaped,
    })
}
