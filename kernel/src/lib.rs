// kernel/src/lib.rs
//
// fsos kernel core
// - arch:    ゲートテーブル / PIC / boot 手順 / 割り込み入口（unsafe はここ）
// - kernel:  タスクリングとラウンドロビン dispatch
// - logging: serial + VGA の 1 行ログ
// - types:   両側で使う素朴な型
//
// ホストの cargo test で全体を検査できるよう、テスト時だけ std を使う。
//
// ブートイメージはこのクレートの外。32bit protected mode のブートコードとトランポリンが
// HandlerSet を組み立てて kernel::entry::start を呼び、fsos_* シンボルへ割り込みを渡す。

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod kernel;
pub mod logging;
pub mod types;

#[cfg(all(not(test), feature = "panic_handler"))]
mod panic;
