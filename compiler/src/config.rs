//! Compiler-side configuration (spec §10.3). The state-thread's resource
//! limits (stack size, frame depth, GC threshold) belong to the runtime's
//! `ThreadConfig` instead — this struct only covers knobs the compile step
//! itself cares about.

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    /// Name attributed to source passed to `compile_string` with no path of
    /// its own (`compile_file` always uses the real path instead).
    pub default_file_name: String,
    /// Whether to emit `FILE`/`LINE` debug opcodes ahead of every statement.
    /// Off shrinks the image; on is required for the `tiny --dis` output to
    /// carry line numbers.
    pub emit_debug_info: bool,
    /// Initial capacity hint for the string/float intern pools.
    pub intern_pool_capacity: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            default_file_name: "<script>".to_string(),
            emit_debug_info: true,
            intern_pool_capacity: 64,
        }
    }
}
