/// Run modes for the debugger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continue,
    StepOver,
    StepInto,
    StepOut,
}

impl RunMode {
    /// Whether a step that left the stack `depth` frames deep, having started at
    /// `start_depth`, ends here. Breakpoints are checked separately.
    pub fn should_stop(self, start_depth: usize, depth: usize) -> bool {
        match self {
            RunMode::Continue => false,
            RunMode::StepInto => true,
            RunMode::StepOver => depth <= start_depth,
            RunMode::StepOut => depth < start_depth,
        }
    }
}
