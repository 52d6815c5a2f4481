pub mod cpu;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use cpu::BrightBlobBackend;
pub use stub::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
