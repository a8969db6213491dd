//! Registration backends and strategy selection.

pub mod linear_fit;
pub mod optimizer;

use std::fmt;

use crate::error::{VoxalignError, VoxalignResult};

/// Which backend performs the registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// In-process derivative-free rigid fit.
    LinearFit,
    /// External optimizer executable over staged files.
    ExternalOptimizer,
}

impl Strategy {
    /// Parse a strategy name as given on the command line or in options.
    pub fn parse(name: &str) -> VoxalignResult<Self> {
        match name {
            "linear-fit" => Ok(Self::LinearFit),
            "optimizer" => Ok(Self::ExternalOptimizer),
            other => Err(VoxalignError::unknown_strategy(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::LinearFit => "linear-fit",
            Self::ExternalOptimizer => "optimizer",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
