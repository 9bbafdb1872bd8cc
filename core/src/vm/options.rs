/// How strictly the interpreter treats the bytecode it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Trusted bytecode. Register, slot and pc misuse is a contract violation
    /// and panics through ordinary slice indexing.
    #[default]
    Fast,
    /// Every register, slot and pc access is checked and reported as an
    /// `ExecError`. Integer division by zero is reported instead of trapping.
    Validated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VmOptions {
    pub mode: ExecMode,
    /// Maximum instructions per thread; only enforced in validated mode.
    pub step_limit: Option<u64>,
}

impl VmOptions {
    pub fn validated() -> Self {
        Self {
            mode: ExecMode::Validated,
            step_limit: None,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn is_validated(&self) -> bool {
        self.mode == ExecMode::Validated
    }
}
