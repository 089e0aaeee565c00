// kernel/src/kernel/task.rs
//
// 役割:
// - 1 つの実行単位（タスク）の保存状態とライフサイクルを表現する。
//
// やらないこと:
// - リンクの張り替え（ring.rs の責務）
// - スタック確保（外部のメモリ管理の責務。ここでは値として受け取るだけ）

use core::fmt;

use crate::types::AddressSpaceId;

/// リング arena 上のハンドル。スロット再利用後の古いハンドルは generation で弾く。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskId {
    pub(crate) slot: u16,
    pub(crate) generation: u32,
}

impl TaskId {
    pub fn slot(self) -> usize {
        self.slot as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.slot, self.generation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// いま CPU 上にいる（current と一致する唯一のタスク）
    Running,
    /// 次の tick で選ばれうる
    Ready,
    /// 外部イベント待ち。dispatch は飛ばす
    Blocked,
    /// 終了。リングから外されるまでの間だけ存在する
    Terminated,
}

impl TaskState {
    pub fn is_schedulable(self) -> bool {
        self == TaskState::Ready
    }

    pub fn is_terminal(self) -> bool {
        self == TaskState::Terminated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Running => "RUNNING",
            TaskState::Ready => "READY",
            TaskState::Blocked => "BLOCKED",
            TaskState::Terminated => "TERMINATED",
        }
    }
}

/// 切替時に保存・復元されるマシン状態。
///
/// stack_pointer は「このタスクが CPU 上にいない間」だけ意味を持つ。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SavedState {
    pub stack_base: usize,
    pub stack_pointer: usize,
    pub address_space: AddressSpaceId,
}

impl SavedState {
    pub const fn new(stack_base: usize, stack_pointer: usize, address_space: AddressSpaceId) -> Self {
        SavedState {
            stack_base,
            stack_pointer,
            address_space,
        }
    }
}

/// リングに属するタスク 1 つ分。prev / next は arena の slot index。
#[derive(Clone, Copy, Debug)]
pub struct TaskContext {
    pub(crate) name: &'static str,
    pub(crate) prev: usize,
    pub(crate) next: usize,
    pub(crate) saved: SavedState,
    pub(crate) state: TaskState,
}

impl TaskContext {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prev_slot(&self) -> usize {
        self.prev
    }

    pub fn next_slot(&self) -> usize {
        self.next
    }

    pub fn saved(&self) -> SavedState {
        self.saved
    }

    pub fn state(&self) -> TaskState {
        self.state
    }
}
