// kernel/src/arch/idt.rs
//
// 役割:
// - 割り込みゲート記述子（8 byte, packed）と 256 エントリのゲートテーブルを表現する。
// - lidt に渡すテーブル記述子（limit / base）を作る。
//
// やること:
// - ハンドラアドレスを low/high に分割し、selector / type_attr を固定値で埋める。
// - 未登録スロットはすべて 0（present bit なし）のまま残す。
//
// やらないこと:
// - ベクタ番号の範囲検証（vectors.rs の責務。ここは u8 で受けるので範囲外が存在しない）
// - lidt の発行（interrupts.rs の Machine 境界）
//
// レイアウト（byte offset）:
//   0: offset_low  (u16)
//   2: selector    (u16)
//   4: reserved    (u8, 常に 0)
//   5: type_attr   (u8, P | DPL | gate kind)
//   6: offset_high (u16)

use core::mem;

use crate::types::{Vector, VECTOR_COUNT};

/// GDT 上の唯一のカーネルコードセグメント（index 1, TI=0, RPL=0）
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

bitflags::bitflags! {
    /// type_attr の上位 4bit（P / DPL）
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GateFlags: u8 {
        /// エントリが有効
        const PRESENT = 1 << 7;
        /// DPL bit0
        const DPL_0 = 1 << 5;
        /// DPL bit1
        const DPL_1 = 1 << 6;
    }
}

/// type_attr の下位 4bit（ゲート種別）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GateKind {
    Task = 0x5,
    Interrupt16 = 0x6,
    Trap16 = 0x7,
    /// このカーネルで使うのはこれだけ
    Interrupt32 = 0xE,
    Trap32 = 0xF,
}

/// present / DPL0 / 32bit interrupt gate = 0x8E
pub const KERNEL_INTERRUPT_GATE: u8 = GateFlags::PRESENT.bits() | GateKind::Interrupt32 as u8;

/// ゲート記述子 1 エントリ。
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    reserved: u8,
    type_attr: u8,
    offset_high: u16,
}

const _: () = assert!(mem::size_of::<GateDescriptor>() == 8);

impl GateDescriptor {
    /// 未登録スロット（全ビット 0）
    pub const MISSING: GateDescriptor = GateDescriptor {
        offset_low: 0,
        selector: 0,
        reserved: 0,
        type_attr: 0,
        offset_high: 0,
    };

    /// カーネル用 32bit 割り込みゲート。
    pub const fn interrupt_gate(handler: u32, selector: u16) -> Self {
        GateDescriptor {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            reserved: 0,
            type_attr: KERNEL_INTERRUPT_GATE,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }

    pub fn offset_low(&self) -> u16 {
        self.offset_low
    }

    pub fn offset_high(&self) -> u16 {
        self.offset_high
    }

    /// low/high を結合したハンドラアドレス
    pub fn offset(&self) -> u32 {
        (self.offset_high as u32) << 16 | self.offset_low as u32
    }

    pub fn selector(&self) -> u16 {
        self.selector
    }

    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    pub fn type_attr(&self) -> u8 {
        self.type_attr
    }

    pub fn is_present(&self) -> bool {
        self.type_attr & GateFlags::PRESENT.bits() != 0
    }

    pub fn is_missing(&self) -> bool {
        *self == Self::MISSING
    }

    /// 「完全に埋まっている」か。部分書き込みの検出に使う。
    pub fn is_well_formed_kernel_gate(&self) -> bool {
        self.type_attr == KERNEL_INTERRUPT_GATE
            && self.selector == KERNEL_CODE_SELECTOR
            && self.reserved == 0
    }
}

/// lidt のオペランド（limit / base）。
///
/// base はポインタ幅。packed(2) により 32bit では 6 byte、64bit では 10 byte になり、
/// どちらもそのモードの lidt が読む形と一致する。
#[repr(C, packed(2))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableDescriptor {
    limit: u16,
    base: usize,
}

impl TableDescriptor {
    pub fn limit(&self) -> u16 {
        self.limit
    }

    pub fn base(&self) -> usize {
        self.base
    }
}

/// テーブルのバイトサイズ - 1（= 2047）
pub const TABLE_LIMIT: u16 = (VECTOR_COUNT * mem::size_of::<GateDescriptor>() - 1) as u16;

/// 256 エントリ固定のゲートテーブル。
///
/// ロード後に動かさないこと（static に置く前提）。
#[repr(C, align(8))]
pub struct GateTable {
    entries: [GateDescriptor; VECTOR_COUNT],
}

impl GateTable {
    pub const fn new() -> Self {
        GateTable {
            entries: [GateDescriptor::MISSING; VECTOR_COUNT],
        }
    }

    /// スロットを丸ごと書き換える（last write wins）
    pub fn set(&mut self, vector: Vector, gate: GateDescriptor) {
        self.entries[vector as usize] = gate;
    }

    pub fn entry(&self, vector: Vector) -> GateDescriptor {
        self.entries[vector as usize]
    }

    /// テーブル記述子。内容ではなくサイズと位置だけを記録する。
    pub fn descriptor(&self) -> TableDescriptor {
        TableDescriptor {
            limit: TABLE_LIMIT,
            base: self.entries.as_ptr() as usize,
        }
    }

    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|g| g.is_present()).count()
    }

    /// present なスロットのベクタ番号を昇順に列挙する
    pub fn present_vectors(&self) -> impl Iterator<Item = Vector> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_present())
            .map(|(v, _)| v as Vector)
    }
}

impl Default for GateTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn gate_descriptor_is_eight_packed_bytes() {
        assert_eq!(mem::size_of::<GateDescriptor>(), 8);
        assert_eq!(offset_of!(GateDescriptor, offset_low), 0);
        assert_eq!(offset_of!(GateDescriptor, selector), 2);
        assert_eq!(offset_of!(GateDescriptor, reserved), 4);
        assert_eq!(offset_of!(GateDescriptor, type_attr), 5);
        assert_eq!(offset_of!(GateDescriptor, offset_high), 6);
    }

    #[test]
    fn interrupt_gate_splits_address_into_halves() {
        let gate = GateDescriptor::interrupt_gate(0xC010_2A40, KERNEL_CODE_SELECTOR);
        assert_eq!(gate.offset_low(), 0x2A40);
        assert_eq!(gate.offset_high(), 0xC010);
        assert_eq!(gate.offset(), 0xC010_2A40);
        assert_eq!(gate.type_attr(), 0x8E);
        assert_eq!(gate.reserved(), 0);
        assert!(gate.is_present());
        assert!(gate.is_well_formed_kernel_gate());
    }

    #[test]
    fn new_table_has_no_present_entries() {
        let table = GateTable::new();
        assert_eq!(table.present_count(), 0);
        assert!(table.entry(0).is_missing());
        assert!(table.entry(255).is_missing());
    }

    #[test]
    fn descriptor_records_limit_and_base() {
        let table = GateTable::new();
        let desc = table.descriptor();
        assert_eq!(desc.limit(), 2047);
        assert_eq!(desc.base(), &table as *const GateTable as usize);
    }

    #[test]
    fn descriptor_has_the_lidt_operand_shape() {
        use x86_64::structures::DescriptorTablePointer;
        assert_eq!(
            mem::size_of::<TableDescriptor>(),
            mem::size_of::<DescriptorTablePointer>()
        );
        assert_eq!(offset_of!(TableDescriptor, limit), 0);
        assert_eq!(offset_of!(TableDescriptor, base), 2);
    }

    #[test]
    fn set_overwrites_previous_gate() {
        let mut table = GateTable::new();
        table.set(7, GateDescriptor::interrupt_gate(0x1000, KERNEL_CODE_SELECTOR));
        table.set(7, GateDescriptor::interrupt_gate(0x2000, KERNEL_CODE_SELECTOR));
        assert_eq!(table.entry(7).offset(), 0x2000);
        assert_eq!(table.present_vectors().collect::<Vec<_>>(), vec![7]);
    }
}
