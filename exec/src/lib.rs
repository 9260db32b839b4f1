//! Dynarec execution engine: translation cache, code-cache linker,
//! runtime services for generated code and the driver loop.
//!
//! The driver repeatedly resolves the next guest address to a
//! compiled function (translating on a miss), links the previous exit
//! to it when requested, enters generated code through the host
//! trampoline and polls for interrupts when control comes back.

pub mod cache;
mod callbacks;
pub mod count;
pub mod dispatch;
pub mod exec_loop;
pub mod heap;
pub mod interp;
pub mod link;
pub mod runtime;
pub mod stats;

pub use cache::TranslationCache;
pub use exec_loop::Dynarec;
pub use link::Linker;
pub use runtime::Runtime;
pub use stats::ExecStats;

use dyna_core::{Backing, CpuContext, TranslateError, Width};

/// Default limit on guest instructions per compiled function.
pub const DEFAULT_MAX_FUNCTION_INSNS: u32 = 1024;

/// Tunables for a [`Dynarec`] instance.
#[derive(Debug, Clone)]
pub struct DynarecConfig {
    /// Code cache size in bytes.
    pub code_cache_size: usize,
    /// Upper bound handed to the translator per function.
    pub max_function_insns: u32,
    /// Poll for interrupts after every return from generated code.
    pub interrupt_polling: bool,
    /// Stop after this many dispatches.
    pub dispatch_limit: Option<u64>,
}

impl Default for DynarecConfig {
    fn default() -> Self {
        Self {
            code_cache_size: dyna_backend::code_buffer::DEFAULT_CODE_BUF_SIZE,
            max_function_insns: DEFAULT_MAX_FUNCTION_INSNS,
            interrupt_polling: true,
            dispatch_limit: None,
        }
    }
}

/// The emulated machine around the CPU: address translation, the
/// memory map and exception/interrupt delivery.
pub trait Machine {
    /// Resolve a virtual address to its unmapped-segment equivalent.
    /// Returns `None` after raising the appropriate exception when the
    /// address has no mapping.
    fn translate_addr(&mut self, cpu: &mut CpuContext, vaddr: u32) -> Option<u32>;

    /// Read `width` bytes at virtual address `addr`. Raises an
    /// exception (moving `cpu.pc`) on a fault.
    fn read(&mut self, cpu: &mut CpuContext, addr: u32, width: Width) -> u64;

    /// Write the low `width` bytes of `value` to virtual address `addr`.
    fn write(&mut self, cpu: &mut CpuContext, addr: u32, width: Width, value: u64);

    /// Instruction word at byte `offset` from the start of `backing`.
    fn fetch_code(&self, backing: Backing, offset: u32) -> Option<u32>;

    /// Enter the general exception vector using the exception code
    /// already in Cause.
    fn exception_general(&mut self, cpu: &mut CpuContext);

    /// Handle the interrupt event that became due and schedule the
    /// next one in `cpu.next_interrupt`.
    fn service_interrupt(&mut self, cpu: &mut CpuContext);

    /// Base of guest main memory for generated code, or null.
    fn memory_base(&mut self) -> *mut u8 {
        std::ptr::null_mut()
    }
}

/// Guest memory as seen by the interpreter. Writes made through it
/// keep the translation cache coherent.
pub trait GuestBus {
    fn read(&mut self, cpu: &mut CpuContext, addr: u32, width: Width) -> u64;
    fn write(&mut self, cpu: &mut CpuContext, addr: u32, width: Width, value: u64);
    /// Fetch the instruction word at `addr` (for delay slots).
    fn fetch(&mut self, cpu: &mut CpuContext, addr: u32) -> u32;
    fn exception_general(&mut self, cpu: &mut CpuContext);
}

/// Executes one guest instruction against the CPU context.
///
/// A non-branching instruction leaves `cpu.pc` at `pc + 4`. Branches
/// execute their delay slot and leave `cpu.pc` at the destination.
/// Exceptions leave it at the vector.
pub trait Interpreter {
    fn execute(&mut self, insn: u32, cpu: &mut CpuContext, bus: &mut dyn GuestBus);
}

/// Guest code a translator may read while compiling.
pub struct GuestCode<'a> {
    pub block_start: u32,
    pub block_end: u32,
    pub backing: Option<Backing>,
    pub max_insns: u32,
    pub machine: &'a dyn Machine,
}

impl GuestCode<'_> {
    /// Instruction word at guest address `addr`, if it lies in the
    /// block and the block has code behind it.
    pub fn word(&self, addr: u32) -> Option<u32> {
        if !(self.block_start..self.block_end).contains(&addr) {
            return None;
        }
        let backing = self.backing?;
        self.machine.fetch_code(backing, addr - self.block_start)
    }
}

/// Output of a translator, positioned at offset 0.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub start_addr: u32,
    pub end_addr: u32,
    pub code: Vec<u8>,
    /// `(guest address, code offset)` of each entry point.
    pub entries: Vec<(u32, usize)>,
}

/// Turns guest code into host code for the linker to install.
///
/// Code is generated as if it starts at offset 0 of a function whose
/// handle header sits immediately in front of it; the linker copies it
/// verbatim, so it must be position independent.
pub trait Translator {
    fn compile(&mut self, src: &GuestCode<'_>, addr: u32) -> Result<Compiled, TranslateError>;
}
