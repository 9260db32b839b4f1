//! Shared types for the VR4300 dynamic recompiler.
//!
//! Holds the CPU context that generated code and the runtime both
//! operate on, the guest address policy, memory access kinds, the
//! compiled-function bookkeeping types and the error enums.

pub mod addr;
pub mod cpu;
pub mod error;
pub mod function;
pub mod insn;
pub mod mem;

pub use addr::{Backing, INSN_WIDTH, PAGE_SHIFT, PAGE_SIZE};
pub use cpu::CpuContext;
pub use error::{DynarecError, TranslateError};
pub use function::{Block, CodeRegion, FuncId, Function, LinkRecord};
pub use insn::{Flow, Insn};
pub use mem::{AccessKind, MemAccess, Width};
