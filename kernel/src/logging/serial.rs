// kernel/src/logging/serial.rs
//
// COM1 (0x3F8) へのシリアル出力。UART の初期化と送信待ちは uart_16550 に任せる。
// - init(): 1 回だけ初期化
// - write_line_parts(): 断片を続けて送って CRLF

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;
use uart_16550::SerialPort;

use crate::arch::cpu;

const COM1: u16 = 0x3F8;

static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1) });
static SERIAL_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn init() {
    if SERIAL_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    cpu::without_interrupts(|| SERIAL.lock().init());
}

pub fn write_line_parts(parts: &[&str]) {
    if !SERIAL_INITIALIZED.load(Ordering::Relaxed) {
        return;
    }
    cpu::without_interrupts(|| {
        let mut port = SERIAL.lock();
        for p in parts {
            let _ = port.write_str(p);
        }
        let _ = port.write_str("\r\n");
    });
}
