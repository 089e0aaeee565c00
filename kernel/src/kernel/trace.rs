// kernel/src/kernel/trace.rs
//
// dispatch の決定を 1 行ずつ出す低コスト trace。
//
// 設計方針:
// - logging 側に新 API を要求しない（info / info_u64 / info_hex のみ）
// - heap 確保なし
// - feature off のときは何もしない（呼び出し側に cfg を撒かない）
//
// feature:
// - dispatch_trace: tick ごとに stay/switch を出す
//
// 毎 tick 出るので、VGA を止めて serial だけで見るのが前提。

use super::dispatch::Dispatch;

#[inline(always)]
pub fn trace_dispatch(tick: u64, d: &Dispatch) {
    #[cfg(feature = "dispatch_trace")]
    {
        match d {
            Dispatch::Stay { .. } => crate::logging::info("dispatch_trace decision=stay"),
            Dispatch::Switch(sw) => {
                crate::logging::info("dispatch_trace decision=switch");
                crate::logging::info_u64(" from_slot", sw.from.slot() as u64);
                crate::logging::info_u64(" to_slot", sw.to.slot() as u64);
                crate::logging::info_hex(" sp", d.stack_pointer() as u64);
                if sw.address_space_changed() {
                    crate::logging::info_hex(" asid", sw.address_space.0 as u64);
                }
                if sw.reaped.is_some() {
                    crate::logging::info(" reaped outgoing");
                }
            }
        }
        crate::logging::info_u64(" tick", tick);
    }
    #[cfg(not(feature = "dispatch_trace"))]
    {
        let _ = tick;
        let _ = d;
    }
}
