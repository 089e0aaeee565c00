// kernel/src/arch/mod.rs
//
// アーキ依存部。unsafe をできるだけここに閉じ込める方針。
// - cpu: hlt ループ / IF=0 区間 / fatal
// - port, machine: ポート I/O と特権命令の境界（テストでは差し替える）
// - idt, vectors: ゲートテーブルと登録口
// - pic: 8259 の再配置と EOI
// - interrupts: boot 手順と割り込みコンテキスト側の入口

pub mod cpu;
pub mod idt;
pub mod interrupts;
pub mod machine;
pub mod pic;
pub mod port;
pub mod vectors;

#[cfg(test)]
pub mod testing;

/// CPU を停止させるループ
pub fn halt_loop() -> ! {
    cpu::halt_loop()
}
