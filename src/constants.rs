// Constants for the C type engine

/// Slots a single parse may append to its output buffer before it fails with
/// a capacity error. Declarations needing more than this are not expected in
/// practice.
pub const DEFAULT_OPCODE_CAPACITY: usize = 1200;

/// Nesting limit for the realization engine
pub const MAX_REALIZE_RECURSION: usize = 1000;

/// Size and alignment of every data pointer (LP64)
pub const POINTER_SIZE: usize = 8;
