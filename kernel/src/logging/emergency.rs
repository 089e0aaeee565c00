// kernel/src/logging/emergency.rs
//
// 緊急出力（ロック無し）
// - QEMU debugcon(0xE9) と COM1(0x3F8) に直接書く
// - panic 中・ロック保持中・NMI 中でも使える。通常のログには使わない
// - テストビルドではスレッドごとのキャプチャに溜める

use x86_64::instructions::port::Port;

const DEBUGCON: u16 = 0xE9;
const COM1_DATA: u16 = 0x3F8;
const COM1_LINE_STATUS: u16 = 0x3FD;
const LSR_THR_EMPTY: u8 = 0x20;

#[cfg(not(test))]
fn write_byte(b: u8) {
    unsafe {
        Port::<u8>::new(DEBUGCON).write(b);

        let mut lsr = Port::<u8>::new(COM1_LINE_STATUS);
        let mut data = Port::<u8>::new(COM1_DATA);
        // UART が死んでいても止まらないよう上限つきで待つ
        for _ in 0..10_000 {
            if (lsr.read() & LSR_THR_EMPTY) != 0 {
                break;
            }
        }
        data.write(b);
    }
}

#[cfg(test)]
fn write_byte(b: u8) {
    capture::push(b);
}

/// このスレッドで緊急出力された内容を取り出して空にする（テスト専用）
#[cfg(test)]
pub fn take_captured() -> std::string::String {
    capture::take()
}


pub fn write_str(s: &str) {
    for b in s.bytes() {
        write_byte(b);
    }
}

pub fn write_hex_u64(v: u64) {
    write_str("0x");
    for i in (0..16).rev() {
        let n = ((v >> (i * 4)) & 0xF) as u8;
        let c = if n < 10 { b'0' + n } else { b'a' + (n - 10) };
        write_byte(c);
    }
}

/// panic メッセージの書式化用（バッファなし、1 バイトずつ直接出す）
pub struct EmergencyWriter;

impl core::fmt::Write for EmergencyWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        write_str(s);
        Ok(())
    }
}
