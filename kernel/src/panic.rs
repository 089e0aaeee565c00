// kernel/src/panic.rs
//
// no_std カーネル用 panic ハンドラ（feature "panic_handler"）。
// - このクレートを 32bit のブートイメージにリンクする側が有効にする。
// - 挙動は「緊急出力（ロック無し） → CPU 停止」に固定する。
// - logging は使わない（serial / VGA の lock を握ったまま panic している可能性がある）。
// - 二重 panic は即停止（再入で #DF になりやすい）
// - fatal() 由来の panic はメッセージに理由が入っているので、それを出す。

use core::fmt::Write;
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::interrupts;

use crate::arch;
use crate::logging::emergency::{self, EmergencyWriter};

static PANIC_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    interrupts::disable();

    if PANIC_IN_PROGRESS.swap(true, Ordering::AcqRel) {
        emergency::write_str("[PANIC] re-entered => halt\n");
        return arch::halt_loop();
    }

    emergency::write_str("[PANIC] ");
    let _ = write!(EmergencyWriter, "{}", info.message());
    emergency::write_str("\n");

    if let Some(loc) = info.location() {
        emergency::write_str("[PANIC] at ");
        emergency::write_str(loc.file());
        emergency::write_str(" line=");
        emergency::write_hex_u64(loc.line() as u64);
        emergency::write_str("\n");
    } else {
        emergency::write_str("[PANIC] location unknown\n");
    }

    arch::halt_loop()
}
