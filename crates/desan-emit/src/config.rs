use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub use_colors: bool,
    pub verbosity: VerbosityLevel,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            use_colors: true,
            verbosity: VerbosityLevel::Normal,
        }
    }
}

impl ReportConfig {
    pub fn plain() -> Self {
        Self {
            use_colors: false,
            ..Self::default()
        }
    }

    pub fn with_verbosity(mut self, verbosity: VerbosityLevel) -> Self {
        self.verbosity = verbosity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerbosityLevel {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

impl VerbosityLevel {
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Normal,
            1 => VerbosityLevel::Verbose,
            _ => VerbosityLevel::Debug,
        }
    }

    pub fn should_list_keys(&self) -> bool {
        !matches!(self, VerbosityLevel::Quiet)
    }

    pub fn should_list_functions(&self) -> bool {
        matches!(self, VerbosityLevel::Verbose | VerbosityLevel::Debug)
    }

    pub fn should_list_operands(&self) -> bool {
        matches!(self, VerbosityLevel::Debug)
    }
}
