// kernel/src/logging/mod.rs
//
// 1 行ログ。"[LEVEL] " + 本文を serial と VGA の両方に出す。
// - heap なし（数値は固定長のスタックバッファで文字列化）
// - 出力中は IF=0（割り込みハンドラからのログで lock を取り合わない）
// - テストビルドではスレッドごとのキャプチャに溜める（ハードウェアには触れない）
// - emergency: panic 経路用。lock なし

pub mod emergency;

#[cfg(not(test))]
mod serial;
#[cfg(not(test))]
mod vga;

use core::sync::atomic::{AtomicBool, Ordering};

static VGA_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn init() {
    #[cfg(not(test))]
    {
        vga::init();
        serial::init();
    }
}

pub fn set_vga_enabled(enabled: bool) {
    VGA_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_vga_enabled() -> bool {
    VGA_ENABLED.load(Ordering::Relaxed)
}

pub fn info(msg: &str) {
    write_line(&["[INFO] ", msg]);
}

pub fn warn(msg: &str) {
    write_line(&["[WARN] ", msg]);
}

pub fn error(msg: &str) {
    write_line(&["[ERROR] ", msg]);
}

pub fn info_u64(label: &str, value: u64) {
    info_kv(label, value);
}

pub fn info_kv(key: &str, value: u64) {
    let mut buf = [0u8; 20];
    let s = u64_to_decimal(value, &mut buf);
    info_str(key, s);
}

pub fn info_hex(key: &str, value: u64) {
    let mut buf = [0u8; 18];
    let s = u64_to_hex(value, &mut buf);
    info_str(key, s);
}

pub fn info_str(key: &str, value: &str) {
    if key.is_empty() {
        write_line(&["[INFO] ", value]);
        return;
    }
    write_line(&["[INFO] ", key, " = ", value]);
}

#[cfg(not(test))]
fn write_line(parts: &[&str]) {
    serial::write_line_parts(parts);
    if is_vga_enabled() {
        vga::write_line_parts(parts);
    }
}

#[cfg(test)]
fn write_line(parts: &[&str]) {
    capture::push(parts);
}

/// このスレッドでキャプチャしたログを取り出して空にする（テスト専用）
#[cfg(test)]
pub fn take_captured() -> std::string::String {
    capture::take()
}


fn u64_to_decimal(mut value: u64, buf: &mut [u8; 20]) -> &str {
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    // ASCII 数字のみ
    core::str::from_utf8(&buf[i..]).unwrap_or("?")
}

fn u64_to_hex(mut value: u64, buf: &mut [u8; 18]) -> &str {
    let mut i = buf.len();
    loop {
        i -= 1;
        let n = (value & 0xF) as u8;
        buf[i] = if n < 10 { b'0' + n } else { b'a' + (n - 10) };
        value >>= 4;
        if value == 0 {
            break;
        }
    }
    i -= 1;
    buf[i] = b'x';
    i -= 1;
    buf[i] = b'0';
    core::str::from_utf8(&buf[i..]).unwrap_or("?")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_rendering() {
        let mut buf = [0u8; 20];
        assert_eq!(u64_to_decimal(0, &mut buf), "0");
        assert_eq!(u64_to_decimal(2047, &mut buf), "2047");
        assert_eq!(u64_to_decimal(u64::MAX, &mut buf), "18446744073709551615");
    }

    #[test]
    fn hex_rendering() {
        let mut buf = [0u8; 18];
        assert_eq!(u64_to_hex(0, &mut buf), "0x0");
        assert_eq!(u64_to_hex(0xB8000, &mut buf), "0xb8000");
        assert_eq!(u64_to_hex(u64::MAX, &mut buf), "0xffffffffffffffff");
    }

    #[test]
    fn lines_carry_level_prefix() {
        take_captured();
        info("booting");
        warn("careful");
        error("broken");
        info_kv("ticks", 3);
        info_hex("base", 0x1000);
        info_str("", "bare");
        assert_eq!(
            take_captured(),
            "[INFO] booting\n[WARN] careful\n[ERROR] broken\n\
             [INFO] ticks = 3\n[INFO] base = 0x1000\n[INFO] bare\n"
        );
    }
}
