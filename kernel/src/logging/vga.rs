// kernel/src/logging/vga.rs
//
// VGA テキストモード(0xb8000)への最小限出力。
// - init(): Writer を初期化（画面を消す）
// - write_line_parts(): 断片を続けて書いて改行。常に最下行に書き、改行で 1 行スクロール
//
// レベルごとに色を変える（[ERROR] 赤 / [WARN] 黄 / その他 灰）。

use core::fmt::{self, Write};
use spin::Mutex;
use volatile::Volatile;

use crate::arch::cpu;

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;

#[derive(Clone, Copy)]
#[repr(u8)]
enum Color {
    Black = 0x0,
    LightGray = 0x7,
    LightRed = 0xC,
    Yellow = 0xE,
}

const fn color_code(fg: Color, bg: Color) -> u8 {
    (fg as u8) | ((bg as u8) << 4)
}

const DEFAULT_COLOR: u8 = color_code(Color::LightGray, Color::Black);

fn color_for_prefix(prefix: &str) -> u8 {
    match prefix {
        "[ERROR] " => color_code(Color::LightRed, Color::Black),
        "[WARN] " => color_code(Color::Yellow, Color::Black),
        _ => DEFAULT_COLOR,
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ScreenChar {
    ascii_character: u8,
    color_code: u8,
}

#[repr(transparent)]
struct Buffer {
    chars: [[Volatile<ScreenChar>; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

struct Writer {
    col: usize,
    color_code: u8,
    buffer: &'static mut Buffer,
}

impl Writer {
    fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            byte => {
                // 表示できない文字は ■
                let byte = if (0x20..=0x7e).contains(&byte) { byte } else { 0xfe };
                if self.col >= BUFFER_WIDTH {
                    self.new_line();
                }
                let row = BUFFER_HEIGHT - 1;
                let col = self.col;
                self.buffer.chars[row][col].write(ScreenChar {
                    ascii_character: byte,
                    color_code: self.color_code,
                });
                self.col += 1;
            }
        }
    }

    fn new_line(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                let ch = self.buffer.chars[row][col].read();
                self.buffer.chars[row - 1][col].write(ch);
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
        self.col = 0;
    }

    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code,
        };
        for col in 0..BUFFER_WIDTH {
            self.buffer.chars[row][col].write(blank);
        }
    }
}

impl Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.write_byte(b);
        }
        Ok(())
    }
}

static WRITER: Mutex<Option<Writer>> = Mutex::new(None);

pub fn init() {
    let mut writer = Writer {
        col: 0,
        color_code: DEFAULT_COLOR,
        buffer: unsafe { &mut *(0xb8000 as *mut Buffer) },
    };
    for row in 0..BUFFER_HEIGHT {
        writer.clear_row(row);
    }
    cpu::without_interrupts(|| *WRITER.lock() = Some(writer));
}

pub fn write_line_parts(parts: &[&str]) {
    cpu::without_interrupts(|| {
        if let Some(ref mut w) = *WRITER.lock() {
            w.color_code = parts.first().map_or(DEFAULT_COLOR, |p| color_for_prefix(p));
            for p in parts {
                let _ = w.write_str(p);
            }
            let _ = w.write_str("\n");
            w.color_code = DEFAULT_COLOR;
        }
    });
}
