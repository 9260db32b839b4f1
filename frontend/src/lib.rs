//! VR4300 guest support: a reference interpreter, exception delivery,
//! a flat test machine and a threaded-code translator for x86-64
//! hosts.

pub mod vr4300;

/// How the instruction just translated ends the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisasJumpType {
    /// Continue to the next sequential instruction.
    Next,
    /// Reached the instruction limit or the end of the page.
    TooMany,
    /// Control flow leaves the straight-line path.
    NoReturn,
}
