pub mod instance;
pub mod logging;
pub mod memory;
