pub mod abi;
pub mod emitter;
pub mod regs;

pub use abi::X86_64Abi;
pub use regs::Reg;
