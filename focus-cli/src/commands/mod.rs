//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of one subcommand.

/// Full reconstruction runs.
pub mod denoise;
/// Synthetic dataset generation.
pub mod simulate;
/// Single-map statistic synthesis.
pub mod synthesize;

use crate::cli::StatisticArgs;
use focus_core::StatisticVariant;

impl StatisticArgs {
    pub fn variant(&self) -> StatisticVariant {
        if self.cov { StatisticVariant::Cov } else { StatisticVariant::Scat }
    }
}
