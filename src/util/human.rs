use crate::models::pressure::PressureRecord;

/// Format cumulative stall microseconds: "482.9 ms", "3.2 s", "1.5 h"
pub fn fmt_stall(micros: u64) -> String {
    const HOUR: f64 = 3_600_000_000.0;
    const MIN:  f64 = 60_000_000.0;
    const SEC:  f64 = 1_000_000.0;
    const MS:   f64 = 1_000.0;
    let us = micros as f64;
    if us >= HOUR     { format!("{:.1} h",  us / HOUR) }
    else if us >= MIN { format!("{:.1} m",  us / MIN) }
    else if us >= SEC { format!("{:.1} s",  us / SEC) }
    else if us >= MS  { format!("{:.1} ms", us / MS) }
    else              { format!("{} us",    micros) }
}

/// Format a stall percentage with two decimals: "1.25%"
pub fn fmt_pct(pct: f64) -> String {
    format!("{:.2}%", pct)
}

/// One report line for humans: "some  avg10 1.25%  avg60 0.50%  avg300 0.10%  total 3.2 s"
pub fn fmt_record(rec: &PressureRecord) -> String {
    format!(
        "{:<4}  avg10 {:>7}  avg60 {:>7}  avg300 {:>7}  total {}",
        rec.scope.as_str(),
        fmt_pct(rec.avg10),
        fmt_pct(rec.avg60),
        fmt_pct(rec.avg300),
        fmt_stall(rec.total),
    )
}
