//! Traffic analysis over decoded packet rows.
//! Picks the device of interest and summarises its traffic into fixed-interval feature windows.
pub mod containers;
pub mod core;
pub mod device;
pub mod utils;
pub mod window;
