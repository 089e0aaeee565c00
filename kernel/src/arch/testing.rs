// kernel/src/arch/testing.rs
//
// テスト専用: ハードウェアに触れず、要求された特権操作を順番どおり記録する Machine。

use crate::arch::idt::{GateTable, TableDescriptor};
use crate::arch::machine::Machine;
use crate::arch::port::PortIo;
use crate::types::AddressSpaceId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineEvent {
    PortWrite { port: u16, value: u8 },
    PortRead { port: u16 },
    /// present: ロードした瞬間にテーブル上で present だったゲート数
    LoadTable { limit: u16, base: usize, present: usize },
    EnableInterrupts,
    SwitchAddressSpace(AddressSpaceId),
}

#[derive(Debug, Default)]
pub struct RecordingMachine {
    events: Vec<MachineEvent>,
    /// read_u8 が返す値
    pub read_value: u8,
}

impl RecordingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[MachineEvent] {
        &self.events
    }

    pub fn port_writes(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.events.iter().filter_map(|ev| match *ev {
            MachineEvent::PortWrite { port, value } => Some((port, value)),
            _ => None,
        })
    }

    /// 最初に pred を満たしたイベントの位置
    pub fn position(&self, pred: impl Fn(&MachineEvent) -> bool) -> Option<usize> {
        self.events.iter().position(pred)
    }
}

impl PortIo for RecordingMachine {
    unsafe fn write_u8(&mut self, port: u16, value: u8) {
        self.events.push(MachineEvent::PortWrite { port, value });
    }

    unsafe fn read_u8(&mut self, port: u16) -> u8 {
        self.events.push(MachineEvent::PortRead { port });
        self.read_value
    }
}

impl Machine for RecordingMachine {
    // 実機の lidt と同じく、記述子の base だけを頼りにテーブルを読む。
    // base は生きている GateTable を指していること。
    unsafe fn load_gate_table(&mut self, descriptor: &TableDescriptor) {
        let table = &*(descriptor.base() as *const GateTable);
        self.events.push(MachineEvent::LoadTable {
            limit: descriptor.limit(),
            base: descriptor.base(),
            present: table.present_count(),
        });
    }

    unsafe fn enable_interrupts(&mut self) {
        self.events.push(MachineEvent::EnableInterrupts);
    }

    unsafe fn switch_address_space(&mut self, asid: AddressSpaceId) {
        self.events.push(MachineEvent::SwitchAddressSpace(asid));
    }
}
