//! Per-patient narrative tracing.
//!
//! RULE: Tracing is fire-and-forget. It never fails and never changes a
//! simulation outcome; records go to the `log` facade under
//! `TRACE_TARGET` and are filtered by level like any other record.

use crate::patient::Patient;
use log::Level;
use std::fmt;

pub const TRACE_TARGET: &str = "patient_trace";

/// Write one trace line for `patient` if its tracing flag is set and
/// `level` passes the active log filter.
pub fn write(patient: &Patient, level: Level, args: fmt::Arguments<'_>) {
    if !patient.general.tracing || !log::log_enabled!(target: TRACE_TARGET, level) {
        return;
    }
    log::log!(
        target: TRACE_TARGET,
        level,
        "patient={} month={} {}",
        patient.id,
        patient.general.month,
        args
    );
}

/// `patient_trace!(patient, Level::Debug, "format", args..)`
#[macro_export]
macro_rules! patient_trace {
    ($patient:expr, $level:expr, $($arg:tt)+) => {
        $crate::trace::write(&$patient, $level, format_args!($($arg)+))
    };
}
