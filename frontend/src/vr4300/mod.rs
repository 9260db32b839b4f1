//! VR4300 guest.

pub mod exceptions;
pub mod interp;
pub mod machine;
#[cfg(target_arch = "x86_64")]
pub mod threaded;

pub use exceptions::Vr4300Exceptions;
pub use interp::Vr4300Interpreter;
pub use machine::FlatMachine;
#[cfg(target_arch = "x86_64")]
pub use threaded::ThreadedTranslator;
