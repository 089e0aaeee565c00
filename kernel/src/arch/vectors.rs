// kernel/src/arch/vectors.rs
//
// 役割:
// - ベクタ番号 → ハンドラ入口アドレスの登録口（Vector Registry）。
// - トランポリン層から渡されるハンドラ入口アドレスの集合（HandlerSet）。
// - CPU 例外ベクタの名前表。
//
// 設計方針:
// - 範囲外ベクタ（>= 256）の登録は設定ミス。try_register は Err を返し、
//   register は fatal で停止する。どちらの場合もテーブルには一切書かない。
// - 同じベクタへの再登録は上書き（boot 中しか起きない）。

use core::fmt;

use crate::arch::cpu;
use crate::arch::idt::{GateDescriptor, GateTable, KERNEL_CODE_SELECTOR};
use crate::types::{Vector, EXCEPTION_VECTOR_END, VECTOR_COUNT};

/// トランポリンが提供するハンドラ入口（不透明なアドレス値）。
///
/// ゲートの offset は 32bit なので、入口は下位 4GiB に置かれている必要がある。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerEntry(u32);

impl HandlerEntry {
    pub const fn new(addr: u32) -> Self {
        HandlerEntry(addr)
    }

    /// ポインタ幅のアドレスから作る。32bit に収まらなければ None。
    pub fn from_addr(addr: usize) -> Option<Self> {
        u32::try_from(addr).ok().map(HandlerEntry)
    }

    pub const fn addr(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorError {
    /// ベクタ番号がテーブル容量を超えている
    OutOfRange { vector: u16 },
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorError::OutOfRange { vector } => {
                write!(f, "vector {} out of bounds (capacity {})", vector, VECTOR_COUNT)
            }
        }
    }
}

/// ゲートテーブルへの登録口。
pub struct VectorRegistry<'a> {
    table: &'a mut GateTable,
    selector: u16,
}

impl<'a> VectorRegistry<'a> {
    pub fn new(table: &'a mut GateTable) -> Self {
        VectorRegistry {
            table,
            selector: KERNEL_CODE_SELECTOR,
        }
    }

    /// 範囲検証つき登録。範囲外ならテーブルに触らず Err。
    pub fn try_register(&mut self, vector: u16, handler: HandlerEntry) -> Result<(), VectorError> {
        let vector = Vector::try_from(vector).map_err(|_| VectorError::OutOfRange { vector })?;
        self.table
            .set(vector, GateDescriptor::interrupt_gate(handler.addr(), self.selector));
        Ok(())
    }

    /// boot 用。範囲外は設定ミスなので即停止する。
    pub fn register(&mut self, vector: u16, handler: HandlerEntry) {
        if self.try_register(vector, handler).is_err() {
            cpu::fatal("Idx out of bounds when registering ISR");
        }
    }

    /// [start, end) を同じハンドラで埋める
    pub fn register_range(&mut self, start: u16, end: u16, handler: HandlerEntry) {
        for vector in start..end {
            self.register(vector, handler);
        }
    }

    pub fn table(&self) -> &GateTable {
        self.table
    }
}

/// このカーネルが明示的に扱う CPU 例外ベクタ。
///
/// 9（coprocessor segment overrun）と 21..=29, 31 は登録しない。
pub const HANDLED_EXCEPTIONS: [Vector; 21] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 30,
];

/// トランポリン層から受け取るハンドラ入口一式。
///
/// exceptions[i] は HANDLED_EXCEPTIONS[i] に対応する。
#[derive(Clone, Copy, Debug)]
pub struct HandlerSet {
    pub exceptions: [HandlerEntry; HANDLED_EXCEPTIONS.len()],
    pub timer: HandlerEntry,
    pub keyboard: HandlerEntry,
    pub default_master: HandlerEntry,
    pub default_slave: HandlerEntry,
}

impl HandlerSet {
    /// HANDLED_EXCEPTIONS と対応させた (vector, entry) の列
    pub fn exception_entries(&self) -> impl Iterator<Item = (Vector, HandlerEntry)> + '_ {
        HANDLED_EXCEPTIONS.iter().copied().zip(self.exceptions.iter().copied())
    }
}

const EXCEPTION_NAMES: [&str; EXCEPTION_VECTOR_END] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "BOUND Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Hypervisor Injection Exception",
    "VMM Communication Exception",
    "Security Exception",
    "Reserved",
];

/// CPU 例外名。例外範囲外なら None。
pub fn exception_name(vector: Vector) -> Option<&'static str> {
    EXCEPTION_NAMES.get(vector as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::idt::KERNEL_INTERRUPT_GATE;

    #[test]
    fn registers_two_vectors_with_split_offsets() {
        let mut table = GateTable::new();
        let h0 = HandlerEntry::new(0x0010_1234);
        let h32 = HandlerEntry::new(0x0020_ABCD);
        {
            let mut reg = VectorRegistry::new(&mut table);
            reg.register(0, h0);
            reg.register(32, h32);
        }

        let g0 = table.entry(0);
        assert_eq!(g0.offset_low(), 0x1234);
        assert_eq!(g0.offset_high(), 0x0010);
        assert_eq!(g0.type_attr(), KERNEL_INTERRUPT_GATE);
        assert_eq!(g0.selector(), KERNEL_CODE_SELECTOR);

        let g32 = table.entry(32);
        assert_eq!(g32.offset_low(), 0xABCD);
        assert_eq!(g32.offset_high(), 0x0020);
        assert_eq!(g32.type_attr(), KERNEL_INTERRUPT_GATE);

        assert_eq!(table.present_count(), 2);
    }

    #[test]
    fn out_of_range_vector_is_rejected_without_touching_table() {
        let mut table = GateTable::new();
        let mut reg = VectorRegistry::new(&mut table);
        reg.register(5, HandlerEntry::new(0x5000));

        for bad in [256u16, 300, u16::MAX] {
            assert_eq!(
                reg.try_register(bad, HandlerEntry::new(0xDEAD)),
                Err(VectorError::OutOfRange { vector: bad })
            );
        }

        assert_eq!(reg.table().present_vectors().collect::<Vec<_>>(), vec![5]);
        assert_eq!(reg.table().entry(255), GateDescriptor::MISSING);
        assert_eq!(reg.table().entry(0), GateDescriptor::MISSING);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn register_out_of_range_is_fatal() {
        let mut table = GateTable::new();
        VectorRegistry::new(&mut table).register(256, HandlerEntry::new(0x1000));
    }

    #[test]
    fn last_registration_wins() {
        let mut table = GateTable::new();
        let mut reg = VectorRegistry::new(&mut table);
        reg.register(33, HandlerEntry::new(0x1111));
        reg.register(33, HandlerEntry::new(0x2222));
        assert_eq!(reg.table().entry(33).offset(), 0x2222);
    }

    #[test]
    fn register_range_fills_half_open_interval() {
        let mut table = GateTable::new();
        VectorRegistry::new(&mut table).register_range(34, 40, HandlerEntry::new(0x3400));
        assert_eq!(table.present_vectors().collect::<Vec<_>>(), vec![34, 35, 36, 37, 38, 39]);
    }

    #[test]
    fn handler_entry_rejects_addresses_above_4gib() {
        assert_eq!(HandlerEntry::from_addr(0xFFFF_FFFF), Some(HandlerEntry::new(0xFFFF_FFFF)));
        assert_eq!(HandlerEntry::from_addr(0x1_0000_0000), None);
    }

    #[test]
    fn exception_names_cover_cpu_range_only() {
        assert_eq!(exception_name(14), Some("Page Fault"));
        assert_eq!(exception_name(8), Some("Double Fault"));
        assert_eq!(exception_name(32), None);
    }
}
