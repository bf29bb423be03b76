pub mod kernel;
pub mod monitor;
pub mod notifier;
pub mod pressure;
pub mod trigger;

#[cfg(test)]
pub(crate) mod fake;
