//! 8259 PIC（master / slave のカスケード構成）
//!
//! - `remap`: 初期化コマンド列を送り、IRQ 0..=7 / 8..=15 を任意のベクタ範囲へ移す。
//! - `end_of_interrupt`: ベクタの持ち主に EOI を送る（slave 由来なら両方）。
//!
//! 初期化列はハードウェアのプロトコルなので、順序と値はこのまま変えないこと。
//! pic8259 は使わない（0x80 への wait 書き込みとマスク復元が入り、10 回の書き込み列にならない）。

use crate::arch::port::PortIo;
use crate::types::{IrqLine, Vector};

pub const MASTER_CMD: u16 = 0x20;
pub const MASTER_DATA: u16 = 0x21;
pub const SLAVE_CMD: u16 = 0xA0;
pub const SLAVE_DATA: u16 = 0xA1;

/// 既定の再配置先（CPU 例外 0..32 の直後）
pub const MASTER_OFFSET: u8 = 32;
pub const SLAVE_OFFSET: u8 = 40;

/// 各 PIC の IRQ ライン数
pub const LINES_PER_PIC: u8 = 8;

/// master 上で slave が繋がっているライン（IRQ2）のビットマスク
const CASCADE_MASK_ON_MASTER: u8 = 1 << 2;
/// slave 自身のカスケード ID
const CASCADE_IDENTITY: u8 = 2;

const EOI: u8 = 0x20;

bitflags::bitflags! {
    /// ICW1（コマンドポートへ）
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Icw1: u8 {
        /// ICW4 を送る
        const ICW4 = 0x01;
        /// single（非カスケード）
        const SINGLE = 0x02;
        /// call address interval 4
        const INTERVAL4 = 0x04;
        /// level trigger
        const LEVEL = 0x08;
        /// 初期化開始（必須）
        const INIT = 0x10;
    }
}

bitflags::bitflags! {
    /// ICW4（データポートへ）
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Icw4: u8 {
        /// 8086/88 モード
        const MODE_8086 = 0x01;
        const AUTO_EOI = 0x02;
        const BUF_SLAVE = 0x08;
        const BUF_MASTER = 0x0C;
        /// special fully nested
        const SFNM = 0x10;
    }
}

/// どちらの PIC のラインか
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PicSide {
    Master,
    Slave,
}

/// 再配置済みの PIC 対。ベクタ ↔ IRQ の変換と EOI を受け持つ。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pics {
    master_offset: u8,
    slave_offset: u8,
}

impl Pics {
    pub const fn new(master_offset: u8, slave_offset: u8) -> Self {
        Pics {
            master_offset,
            slave_offset,
        }
    }

    pub fn master_offset(&self) -> u8 {
        self.master_offset
    }

    pub fn slave_offset(&self) -> u8 {
        self.slave_offset
    }

    /// 初期化列を送る（remap 本体）。
    ///
    /// # Safety
    /// PIC の状態を書き換える。割り込み禁止中、boot で 1 回だけ呼ぶこと。
    pub unsafe fn initialize<P: PortIo>(&self, io: &mut P) {
        let icw1 = (Icw1::INIT | Icw1::ICW4).bits();

        // 初期化開始（ICW4 あり、カスケード）
        io.write_u8(MASTER_CMD, icw1);
        io.write_u8(SLAVE_CMD, icw1);

        // ICW2: IRQ0 のベクタ基点
        io.write_u8(MASTER_DATA, self.master_offset);
        io.write_u8(SLAVE_DATA, self.slave_offset);

        // ICW3: master の IRQ2 に slave
        io.write_u8(MASTER_DATA, CASCADE_MASK_ON_MASTER);
        io.write_u8(SLAVE_DATA, CASCADE_IDENTITY);

        // ICW4
        io.write_u8(MASTER_DATA, Icw4::MODE_8086.bits());
        io.write_u8(SLAVE_DATA, Icw4::MODE_8086.bits());

        // マスク全解除（以前のマスクは復元しない）
        io.write_u8(MASTER_DATA, 0);
        io.write_u8(SLAVE_DATA, 0);
    }

    /// ライン番号 → ベクタ
    pub fn vector_for(&self, side: PicSide, line: IrqLine) -> Option<Vector> {
        if line >= LINES_PER_PIC {
            return None;
        }
        let base = match side {
            PicSide::Master => self.master_offset,
            PicSide::Slave => self.slave_offset,
        };
        base.checked_add(line)
    }

    /// ベクタ → (PIC, ライン)。どちらの範囲でもなければ None。
    pub fn line_for(&self, vector: Vector) -> Option<(PicSide, IrqLine)> {
        if let Some(line) = offset_within(self.master_offset, vector) {
            return Some((PicSide::Master, line));
        }
        offset_within(self.slave_offset, vector).map(|line| (PicSide::Slave, line))
    }

    /// EOI を送る。slave 由来なら slave → master の順に両方。
    ///
    /// # Safety
    /// 割り込みハンドラの末尾から、実際に処理したベクタで呼ぶこと。
    pub unsafe fn end_of_interrupt<P: PortIo>(&self, io: &mut P, vector: Vector) {
        match self.line_for(vector) {
            Some((PicSide::Slave, _)) => {
                io.write_u8(SLAVE_CMD, EOI);
                io.write_u8(MASTER_CMD, EOI);
            }
            Some((PicSide::Master, _)) => {
                io.write_u8(MASTER_CMD, EOI);
            }
            None => {}
        }
    }
}

fn offset_within(base: u8, vector: Vector) -> Option<IrqLine> {
    let line = vector.checked_sub(base)?;
    (line < LINES_PER_PIC).then_some(line)
}

/// 両 PIC を master_offset / slave_offset へ再配置する。
///
/// # Safety
/// `Pics::initialize` と同じ。
pub unsafe fn remap<P: PortIo>(io: &mut P, master_offset: u8, slave_offset: u8) -> Pics {
    let pics = Pics::new(master_offset, slave_offset);
    pics.initialize(io);
    pics
}
