// kernel/src/arch/port.rs
//
// 役割:
// - 8bit I/O ポートへの読み書きを trait で抽象化する。
// - 実機では x86_64 crate の Port を使い、テストでは記録用の偽物に差し替える。
//
// 設計方針:
// - 1 回の write は 1 回の out 命令。まとめ書き・並べ替えはしない（PIC 初期化はプロトコル）。

use x86_64::instructions::port::Port;

/// 8bit ポート I/O の境界。
pub trait PortIo {
    /// # Safety
    /// 任意のポートへの書き込みはハードウェア状態を変える。
    /// 呼び出し側がポートの意味とシーケンスに責任を持つこと。
    unsafe fn write_u8(&mut self, port: u16, value: u8);

    /// # Safety
    /// 読み出しに副作用があるポート（キーボードのデータポート等）がある。
    unsafe fn read_u8(&mut self, port: u16) -> u8;
}

/// 実機の I/O 空間。
#[derive(Clone, Copy, Debug, Default)]
pub struct Hardware;

impl PortIo for Hardware {
    #[inline]
    unsafe fn write_u8(&mut self, port: u16, value: u8) {
        Port::<u8>::new(port).write(value);
    }

    #[inline]
    unsafe fn read_u8(&mut self, port: u16) -> u8 {
        Port::<u8>::new(port).read()
    }
}
