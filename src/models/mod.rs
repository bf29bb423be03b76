pub mod pressure;
