/// Default number of register slots per top-level invocation (512 KiB).
const DEFAULT_STACK_SIZE: usize = 1 << 16;

/// Default maximum number of nested wasm frames.
const DEFAULT_CALL_FRAMES: usize = 1024;

/// Default maximum number of invocations active at once, counting host re-entries.
const DEFAULT_INVOCATION_DEPTH: usize = 32;

/// Default hard cap on the number of elements in a table.
const DEFAULT_TABLE_LIMIT: u32 = 10_000_000;

/// Runtime configuration of a [`Store`](crate::Store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    stack_size: usize,
    call_frames: usize,
    invocation_depth: usize,
    table_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            call_frames: DEFAULT_CALL_FRAMES,
            invocation_depth: DEFAULT_INVOCATION_DEPTH,
            table_limit: DEFAULT_TABLE_LIMIT,
        }
    }
}

impl Config {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of 64-bit register slots available to one invocation.
    ///
    /// Every active wasm frame takes up its parameters, locals and maximum operand height.
    pub fn with_stack_size(mut self, slots: usize) -> Self {
        self.stack_size = slots;
        self
    }

    /// Set the maximum number of nested wasm frames.
    pub fn with_call_frames(mut self, frames: usize) -> Self {
        self.call_frames = frames;
        self
    }

    /// Set how many invocations may be active at once.
    ///
    /// A host function that calls back into wasm starts a nested invocation with its own
    /// register file and call stack. Going deeper than this traps with
    /// [`Trap::CallStackExhausted`](crate::Trap::CallStackExhausted).
    pub fn with_invocation_depth(mut self, depth: usize) -> Self {
        self.invocation_depth = depth;
        self
    }

    /// Set the largest size a table may grow to, regardless of its declared maximum.
    pub fn with_table_limit(mut self, elements: u32) -> Self {
        self.table_limit = elements;
        self
    }

    /// Register slots per invocation
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Maximum number of nested frames
    pub fn call_frames(&self) -> usize {
        self.call_frames
    }

    /// Maximum number of active invocations
    pub fn invocation_depth(&self) -> usize {
        self.invocation_depth
    }

    /// Hard cap on table sizes
    pub fn table_limit(&self) -> u32 {
        self.table_limit
    }
}

/// Decides whether tables and memories may grow.
///
/// Consulted when a table or memory is created and on every `table.grow` / `memory.grow`.
/// A denied growth makes the instruction return `-1`; a denied creation fails instantiation.
pub trait ResourceLimiter {
    /// Whether a memory may grow to `desired` bytes.
    fn limit_memory_growth(&self, desired: usize) -> bool {
        let _ = desired;
        true
    }

    /// Whether a table may grow to `desired` elements.
    fn limit_table_growth(&self, desired: usize) -> bool {
        let _ = desired;
        true
    }
}
