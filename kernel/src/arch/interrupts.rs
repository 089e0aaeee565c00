// kernel/src/arch/interrupts.rs
//
// 役割:
// - boot 時に 1 回だけ、ゲートテーブル・PIC・割り込みフラグを決まった順序で整える。
// - トランポリンから呼ばれる割り込みコンテキスト側の入口（timer / keyboard / default / exception）。
//
// 順序（変えないこと）:
//   1. テーブル記述子（サイズと位置だけ）
//   2. PIC 再配置 (32, 40)
//   3. CPU 例外 {0-8, 10-20, 30}
//   4. timer (32) / keyboard (33)
//   5. 34..40 → master default, 40..48 → slave default
//   6. lidt
//   7. sti
//
// 設計方針:
// - 手順の本体は Machine に対してジェネリック（テストは RecordingMachine で順序を検査する）
// - 割り込みハンドラはテーブルの lock を取らない
// - 例外は fail-stop（名前とエラーコードを残して止まる）

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use spin::Mutex;

use crate::arch::cpu;
use crate::arch::idt::{GateTable, TableDescriptor};
use crate::arch::machine::Machine;
use crate::arch::pic::{self, PicSide, Pics, LINES_PER_PIC, MASTER_OFFSET, SLAVE_OFFSET};
use crate::arch::port::{Hardware, PortIo};
use crate::arch::vectors::{exception_name, HandlerSet, VectorRegistry};
use crate::kernel::dispatch::{Dispatch, DispatchError};
use crate::kernel::state_ref;
use crate::kernel::Scheduler;
use crate::logging::{self, emergency};
use crate::types::{Vector, EXCEPTION_VECTOR_END};

const KEYBOARD_DATA_PORT: u16 = 0x60;

static GATE_TABLE: Mutex<GateTable> = Mutex::new(GateTable::new());
static PICS: Pics = Pics::new(MASTER_OFFSET, SLAVE_OFFSET);
static BOOTED: AtomicBool = AtomicBool::new(false);

static TIMER_TICKS: AtomicU64 = AtomicU64::new(0);
static UNEXPECTED_IRQS: AtomicU64 = AtomicU64::new(0);

// 外部のキーボードドライバが取りに来るまでの 1 バイト latch
static SCANCODE: AtomicU8 = AtomicU8::new(0);
static SCANCODE_PENDING: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootError {
    /// init() は 1 回しか呼べない
    AlreadyBooted,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::AlreadyBooted => write!(f, "interrupt wiring already initialized"),
        }
    }
}

/// boot の結果（診断用）
#[derive(Clone, Copy, Debug)]
pub struct BootReport {
    pub descriptor: TableDescriptor,
    pub pics: Pics,
    pub gates_installed: usize,
    /// ハンドラを持たない CPU 例外ベクタ (0..32) のビット集合
    pub unregistered_exceptions: u32,
}

/// 実機で 1 回だけ呼ぶ。
pub fn init(handlers: &HandlerSet) -> Result<BootReport, BootError> {
    if BOOTED.swap(true, Ordering::SeqCst) {
        return Err(BootError::AlreadyBooted);
    }

    logging::info("arch::interrupts::init()");

    // テーブルは static に置かれているので、ロード後も base は動かない
    let mut table = GATE_TABLE.lock();
    let report = unsafe { boot_with(&mut table, &mut Hardware, handlers) };

    logging::info_u64(" gates_installed", report.gates_installed as u64);
    logging::info_hex(" idt_base", report.descriptor.base() as u64);
    logging::info_u64(" idt_limit", report.descriptor.limit() as u64);
    logging::info_u64(" interrupts_enabled", cpu::interrupts_enabled() as u64);
    Ok(report)
}

/// boot 手順の本体。
///
/// # Safety
/// machine が実機なら、割り込み禁止中に 1 回だけ呼ぶこと。
/// table はロード後に動かない場所（static）に置かれていること。
pub unsafe fn boot_with<M: Machine>(
    table: &mut GateTable,
    machine: &mut M,
    handlers: &HandlerSet,
) -> BootReport {
    let descriptor = table.descriptor();

    let pics = pic::remap(machine, MASTER_OFFSET, SLAVE_OFFSET);

    {
        let mut reg = VectorRegistry::new(table);

        for (vector, entry) in handlers.exception_entries() {
            reg.register(vector as u16, entry);
        }

        let master = pics.master_offset() as u16;
        let slave = pics.slave_offset() as u16;
        let lines = LINES_PER_PIC as u16;

        reg.register(master, handlers.timer);
        reg.register(master + 1, handlers.keyboard);
        reg.register_range(master + 2, master + lines, handlers.default_master);
        reg.register_range(slave, slave + lines, handlers.default_slave);
    }

    let unregistered_exceptions = report_unregistered_exceptions(table);

    machine.load_gate_table(&descriptor);
    machine.enable_interrupts();

    BootReport {
        descriptor,
        pics,
        gates_installed: table.present_count(),
        unregistered_exceptions,
    }
}

/// ハンドラのない CPU 例外ベクタを warn で出す。ここに来たらハードウェア定義の挙動（多くは #GP→#DF）になる。
fn report_unregistered_exceptions(table: &GateTable) -> u32 {
    let mut missing = 0u32;
    for v in 0..EXCEPTION_VECTOR_END as Vector {
        if table.entry(v).is_missing() {
            missing |= 1 << v;
            logging::warn("CPU exception vector left unregistered");
            logging::info_u64(" vector", v as u64);
            if let Some(name) = exception_name(v) {
                logging::info_str(" name", name);
            }
        }
    }
    missing
}

// ─────────────────────────────────────────────
// 割り込みコンテキスト側（IF=0 で呼ばれる）
// ─────────────────────────────────────────────

/// timer 1 回ぶん。戻り値はトランポリンが復帰に使う stack pointer。
pub fn on_timer_with<M: Machine>(
    sched: &mut Scheduler,
    pics: &Pics,
    machine: &mut M,
    saved_sp: usize,
) -> usize {
    TIMER_TICKS.fetch_add(1, Ordering::Relaxed);

    let resume_sp = match sched.tick(saved_sp) {
        Ok(Dispatch::Switch(sw)) => {
            if sw.address_space_changed() {
                unsafe { machine.switch_address_space(sw.address_space) };
            }
            sw.stack_pointer
        }
        Ok(stay) => stay.stack_pointer(),
        // bootstrap 前の tick は何もしない
        Err(DispatchError::NoCurrent) => saved_sp,
        Err(e) => cpu::fatal(dispatch_error_message(&e)),
    };

    if let Some(vector) = pics.vector_for(PicSide::Master, 0) {
        unsafe { pics.end_of_interrupt(machine, vector) };
    }
    resume_sp
}

fn dispatch_error_message(e: &DispatchError) -> &'static str {
    match e {
        DispatchError::NoCurrent => "timer tick before scheduler bootstrap",
        DispatchError::NothingRunnable { .. } => "no runnable task: current left running state and nothing is ready",
        DispatchError::Ring(_) => "task ring inconsistent during dispatch",
    }
}

pub fn on_keyboard_with<P: PortIo>(pics: &Pics, io: &mut P) {
    let code = unsafe { io.read_u8(KEYBOARD_DATA_PORT) };
    SCANCODE.store(code, Ordering::Relaxed);
    SCANCODE_PENDING.store(true, Ordering::Release);

    if let Some(vector) = pics.vector_for(PicSide::Master, 1) {
        unsafe { pics.end_of_interrupt(io, vector) };
    }
}

/// 登録されていない IRQ ライン。EOI だけ返して捨てる。
pub fn on_unexpected_irq_with<P: PortIo>(pics: &Pics, io: &mut P, side: PicSide) {
    UNEXPECTED_IRQS.fetch_add(1, Ordering::Relaxed);
    let base = match side {
        PicSide::Master => pics.master_offset(),
        PicSide::Slave => pics.slave_offset(),
    };
    unsafe { pics.end_of_interrupt(io, base) };
}

/// CPU 例外は fail-stop。
///
/// NMI は IF=0 でも入ってくるし、ログ出力の途中で fault することもある。
/// serial / VGA の lock はこの CPU 自身が握っているかもしれないので、緊急出力だけを使う。
#[cold]
pub fn exception_fatal(vector: Vector, error_code: u64) -> ! {
    let name = exception_name(vector).unwrap_or("Unknown Exception");
    emergency::write_str("[EXCEPTION] ");
    emergency::write_str(name);
    emergency::write_str(" vector=");
    emergency::write_hex_u64(vector as u64);
    emergency::write_str(" error_code=");
    emergency::write_hex_u64(error_code);
    emergency::write_str("\n");
    cpu::fatal(name)
}

/// 外部のキーボードドライバ向け。新しいスキャンコードがあれば 1 回だけ返す。
pub fn take_scancode() -> Option<u8> {
    if SCANCODE_PENDING.swap(false, Ordering::Acquire) {
        Some(SCANCODE.load(Ordering::Relaxed))
    } else {
        None
    }
}

pub fn timer_ticks() -> u64 {
    TIMER_TICKS.load(Ordering::Relaxed)
}

pub fn unexpected_irqs() -> u64 {
    UNEXPECTED_IRQS.load(Ordering::Relaxed)
}

// ---- トランポリンが呼ぶ C ABI の入口 ----

#[no_mangle]
pub extern "C" fn fsos_timer_interrupt(saved_sp: usize) -> usize {
    state_ref::with_scheduler_in_interrupt(|s| on_timer_with(s, &PICS, &mut Hardware, saved_sp))
}

#[no_mangle]
pub extern "C" fn fsos_keyboard_interrupt() {
    on_keyboard_with(&PICS, &mut Hardware);
}

#[no_mangle]
pub extern "C" fn fsos_default_master_interrupt() {
    on_unexpected_irq_with(&PICS, &mut Hardware, PicSide::Master);
}

#[no_mangle]
pub extern "C" fn fsos_default_slave_interrupt() {
    on_unexpected_irq_with(&PICS, &mut Hardware, PicSide::Slave);
}

#[no_mangle]
pub extern "C" fn fsos_exception(vector: u8, error_code: u64) -> ! {
    exception_fatal(vector, error_code)
}
