/*!
 * types
 *
 * 役割:
 *   - arch 側と kernel 側の両方が使う素朴な型・定数を集約する。
 *
 * やること:
 *   - ベクタ番号 / IRQ ライン / アドレス空間 ID の表現。
 *
 * やらないこと:
 *   - ポート I/O や CR3 書き込みなどの arch 依存処理。
 */

/// 割り込みベクタ番号（0..=255）
pub type Vector = u8;

/// PIC 上の IRQ ライン番号（各 PIC で 0..=7）
pub type IrqLine = u8;

/// ゲートテーブルのスロット数（ベクタ空間全体）
pub const VECTOR_COUNT: usize = 256;

/// CPU 例外が占めるベクタ範囲の上限（0..32）
pub const EXCEPTION_VECTOR_END: usize = 32;

/// タスクのページテーブルを選ぶレジスタ値（CR3）。
///
/// 0 は「まだ割り当てられていない」を意味し、dispatch で CR3 を書き換えない。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AddressSpaceId(pub usize);

impl AddressSpaceId {
    pub const UNASSIGNED: AddressSpaceId = AddressSpaceId(0);

    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}
