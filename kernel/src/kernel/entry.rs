// kernel/src/kernel/entry.rs
//
// fsos: kernel entry glue
//
// 役割:
// - いま走っている実行文脈を bootstrap タスクとしてリングに入れる
// - 割り込みまわりを boot 順序どおりに整える
// - 以後はタイマ割り込みに任せて hlt で待つ
//
// やらないこと:
// - タスクの生成（外部のメモリ管理がスタックとアドレス空間を用意してから spawn する）

use crate::arch::{self, cpu, interrupts, machine, vectors::HandlerSet};
use crate::logging;

use super::state_ref;
use super::task::SavedState;

pub const BOOTSTRAP_TASK_NAME: &str = "kernel";

/// 外部ブートイメージの入口から 1 回だけ呼ぶ（割り込み禁止のまま）
pub fn start(handlers: &HandlerSet) -> ! {
    logging::init();
    logging::info("kernel::start()");

    // スタック上の値のアドレスを bootstrap タスクのスタック位置の目安にする
    let stack_probe: u64 = 0;
    let stack_addr = &stack_probe as *const u64 as usize;

    // sp は CPU 上にいる間は意味を持たないので 0。最初の tick で保存される
    let saved = SavedState::new(stack_addr, 0, machine::current_address_space());
    if state_ref::with_scheduler(|s| s.bootstrap(BOOTSTRAP_TASK_NAME, saved)).is_err() {
        cpu::fatal("scheduler bootstrap failed");
    }

    if interrupts::init(handlers).is_err() {
        cpu::fatal("interrupt wiring initialized twice");
    }

    state_ref::dump_task_list();
    logging::info("kernel idle; waiting for timer interrupts");

    arch::halt_loop();
}
