// kernel/src/arch/machine.rs
//
// 役割:
// - boot / timer 経路が CPU に要求する特権操作を 1 つの trait にまとめる。
//   (ポート I/O に加えて lidt / sti / CR3 書き込み)
//
// やらないこと:
// - スタックポインタの差し替え。それはトランポリンが tick の戻り値で 1 命令で行う。

use x86_64::instructions::tables::lidt;
use x86_64::registers::control::Cr3;
use x86_64::structures::paging::PhysFrame;
use x86_64::structures::DescriptorTablePointer;
use x86_64::{PhysAddr, VirtAddr};

use crate::arch::idt::TableDescriptor;
use crate::arch::port::{Hardware, PortIo};
use crate::types::AddressSpaceId;

pub trait Machine: PortIo {
    /// # Safety
    /// descriptor が指すテーブルは完全に埋まっていて、以後動かないこと。
    unsafe fn load_gate_table(&mut self, descriptor: &TableDescriptor);

    /// # Safety
    /// ゲートテーブルのロード後にだけ呼ぶこと。
    unsafe fn enable_interrupts(&mut self);

    /// # Safety
    /// asid は有効なトップレベルページテーブルで、カーネルのコード/スタックを写していること。
    unsafe fn switch_address_space(&mut self, asid: AddressSpaceId);
}

impl Machine for Hardware {
    unsafe fn load_gate_table(&mut self, descriptor: &TableDescriptor) {
        let ptr = DescriptorTablePointer {
            limit: descriptor.limit(),
            base: VirtAddr::new(descriptor.base() as u64),
        };
        lidt(&ptr);
    }

    unsafe fn enable_interrupts(&mut self) {
        x86_64::instructions::interrupts::enable();
    }

    unsafe fn switch_address_space(&mut self, asid: AddressSpaceId) {
        let (current, flags) = Cr3::read();
        let target = asid.0 as u64;
        if current.start_address().as_u64() == target {
            return;
        }
        let frame = PhysFrame::containing_address(PhysAddr::new(target));
        Cr3::write(frame, flags);
    }
}

/// いまロードされているトップレベルページテーブルの物理アドレス（bootstrap タスク用）
pub fn current_address_space() -> AddressSpaceId {
    let (frame, _) = Cr3::read();
    AddressSpaceId(frame.start_address().as_u64() as usize)
}
