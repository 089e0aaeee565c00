// kernel/src/arch/cpu.rs
// CPU 命令ラッパ。unsafe は最小限。
//
// - halt_loop: 以後何もしない停止
// - without_interrupts: IF=0 区間（リング操作の唯一の同期手段）
// - fatal: 「診断メッセージを出して停止」。戻らない。

use x86_64::instructions::{hlt, interrupts};

use crate::logging::emergency;

pub fn halt_loop() -> ! {
    loop {
        hlt();
    }
}

/// 割り込み禁止区間で f を実行する。
///
/// 割り込みコンテキスト内（IF=0）から呼ばれても、復帰時に IF を勝手に 1 にしない。
#[cfg(not(test))]
#[inline]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    interrupts::without_interrupts(f)
}

// ホストのテストはユーザーモードで走るので cli/sti は使えない
#[cfg(test)]
#[inline]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// 現在 IF=1 か
#[inline]
pub fn interrupts_enabled() -> bool {
    interrupts::are_enabled()
}

/// 設定ミス・不変条件違反など、継続してはいけない状態で呼ぶ。
///
/// 緊急出力に残したうえで panic する。
///
/// 割り込み・例外の中からも呼ばれるので、lock を取る通常のログは使わない。
#[cold]
pub fn fatal(msg: &str) -> ! {
    emergency::write_str("[FATAL] ");
    emergency::write_str(msg);
    emergency::write_str("\n");
    panic!("fatal: {}", msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;

    #[test]
    fn fatal_reports_through_emergency_output_only() {
        logging::take_captured();
        emergency::take_captured();

        let r = std::panic::catch_unwind(|| fatal("ring corrupted"));
        assert!(r.is_err());
        assert_eq!(logging::take_captured(), "");
        assert_eq!(emergency::take_captured(), "[FATAL] ring corrupted\n");
    }
}
