use crate::models::pressure::Trigger;

/// Encode a trigger in the kernel's write format:
/// `"<some|full> <threshold_us> <window_us>\n"`.
///
/// The result must reach the kernel in a single write.
pub fn encode(trigger: &Trigger) -> String {
    format!(
        "{} {} {}\n",
        trigger.scope.as_str(),
        trigger.threshold.as_micros(),
        trigger.window.as_micros()
    )
}
