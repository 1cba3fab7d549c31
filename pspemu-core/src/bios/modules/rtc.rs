//! sceRtc - Real Time Clock
//!
//! A pure stub table. Every function is registered with its real NID so
//! guest imports resolve, and every call returns the not-implemented
//! sentinel. Clock arithmetic itself is out of scope here; games that probe
//! the RTC get a generic failure and carry on.

use super::super::{BiosModule, FunctionDescriptor};

static FUNCTIONS: [FunctionDescriptor; 30] = [
    FunctionDescriptor::stub(0xC41C2853, "sceRtcGetTickResolution"),
    FunctionDescriptor::stub(0x3F7AD767, "sceRtcGetCurrentTick"),
    FunctionDescriptor::stub(0x4CFA57B0, "sceRtcGetCurrentClock"),
    FunctionDescriptor::stub(0xE7C27D1B, "sceRtcGetCurrentClockLocalTime"),
    FunctionDescriptor::stub(0x34885E0D, "sceRtcConvertUtcToLocalTime"),
    FunctionDescriptor::stub(0x779242A2, "sceRtcConvertLocalTimeToUTC"),
    FunctionDescriptor::stub(0x42307A17, "sceRtcIsLeapYear"),
    FunctionDescriptor::stub(0x05EF322C, "sceRtcGetDaysInMonth"),
    FunctionDescriptor::stub(0x57726BC1, "sceRtcGetDayOfWeek"),
    FunctionDescriptor::stub(0x4B1B5E82, "sceRtcCheckValid"),
    FunctionDescriptor::stub(0x3A807CC8, "sceRtcSetTime_t"),
    FunctionDescriptor::stub(0x27C4594C, "sceRtcGetTime_t"),
    FunctionDescriptor::stub(0xF006F264, "sceRtcSetDosTime"),
    FunctionDescriptor::stub(0x36075567, "sceRtcGetDosTime"),
    FunctionDescriptor::stub(0x7ACE4C04, "sceRtcSetWin32FileTime"),
    FunctionDescriptor::stub(0xCF561893, "sceRtcGetWin32FileTime"),
    FunctionDescriptor::stub(0x7ED29E40, "sceRtcSetTick"),
    FunctionDescriptor::stub(0x6FF40ACC, "sceRtcGetTick"),
    FunctionDescriptor::stub(0x011F03C1, "sceRtcGetAccumulativeTime"),
    FunctionDescriptor::stub(0x9ED0AE87, "sceRtcCompareTick"),
    FunctionDescriptor::stub(0x44F45E05, "sceRtcTickAddTicks"),
    FunctionDescriptor::stub(0x26D25A5D, "sceRtcTickAddMicroseconds"),
    FunctionDescriptor::stub(0xF2A4AFE5, "sceRtcTickAddSeconds"),
    FunctionDescriptor::stub(0xE6605BCA, "sceRtcTickAddMinutes"),
    FunctionDescriptor::stub(0x26D7A24A, "sceRtcTickAddHours"),
    FunctionDescriptor::stub(0xE51B4B7A, "sceRtcTickAddDays"),
    FunctionDescriptor::stub(0xCF3A2CA8, "sceRtcTickAddWeeks"),
    FunctionDescriptor::stub(0xDBF74F1B, "sceRtcTickAddMonths"),
    FunctionDescriptor::stub(0x42842C77, "sceRtcTickAddYears"),
    FunctionDescriptor::stub(0xDFBC5F16, "sceRtcParseDateTime"),
];

pub struct SceRtc;

impl BiosModule for SceRtc {
    fn name(&self) -> &'static str {
        "sceRtc"
    }

    fn functions(&self) -> &'static [FunctionDescriptor] {
        &FUNCTIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bios::{FunctionRegistry, NOT_IMPLEMENTED_RETURN};
    use crate::cpu::context::ThreadContext;

    #[test]
    fn every_stub_resolves_and_degrades() {
        let mut registry = FunctionRegistry::new();
        registry.register_module(Box::new(SceRtc));

        let mut ctx = ThreadContext::default();
        for descriptor in &FUNCTIONS {
            let function = registry.find_function(descriptor.nid).unwrap();
            assert!(!function.descriptor.implemented);
            assert_eq!(
                registry.invoke(descriptor.nid, &mut ctx),
                NOT_IMPLEMENTED_RETURN
            );
        }
    }
}
