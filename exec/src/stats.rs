use std::fmt;

/// Counters for the driver loop and the code cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecStats {
    pub dispatches: u64,
    pub compiles: u64,
    pub cache_hits: u64,
    pub links_patched: u64,
    pub links_skipped: u64,
    pub functions_freed: u64,
    pub functions_evicted: u64,
    pub interpreted: u64,
    pub mem_accesses: u64,
    pub interrupts: u64,
}

impl fmt::Display for ExecStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Dynarec Stats ===")?;
        writeln!(f, "dispatches:        {}", self.dispatches)?;
        writeln!(f, "compiles:          {}", self.compiles)?;
        writeln!(f, "cache hits:        {}", self.cache_hits)?;
        writeln!(f, "links patched:     {}", self.links_patched)?;
        writeln!(f, "links skipped:     {}", self.links_skipped)?;
        writeln!(f, "functions freed:   {}", self.functions_freed)?;
        writeln!(f, "functions evicted: {}", self.functions_evicted)?;
        writeln!(f, "interpreted insns: {}", self.interpreted)?;
        writeln!(f, "memory accesses:   {}", self.mem_accesses)?;
        write!(f, "interrupts:        {}", self.interrupts)
    }
}
