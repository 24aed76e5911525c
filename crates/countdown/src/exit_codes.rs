//! Exit codes for the CLI

use countdown_core::{ConfigError, CountdownError, RunStatus};

/// Success
pub const SUCCESS: i32 = 0;

/// A unit failed or the run could not complete
pub const FAILURE: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// The run was skipped (e.g. no snapshot for the regression date)
pub const SKIPPED: i32 = 3;

/// Exit code of a finished run
pub fn for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Passed => SUCCESS,
        RunStatus::Failed => FAILURE,
        RunStatus::Skipped => SKIPPED,
    }
}

/// Exit code of a run aborted by `err`
pub fn for_error(err: &anyhow::Error) -> i32 {
    let is_config = err.chain().any(|cause| {
        cause.is::<ConfigError>()
            || matches!(cause.downcast_ref::<CountdownError>(), Some(CountdownError::Config(_)))
    });
    if is_config {
        CONFIG_ERROR
    } else {
        FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(for_status(RunStatus::Passed), 0);
        assert_eq!(for_status(RunStatus::Failed), 1);
        assert_eq!(for_status(RunStatus::Skipped), 3);
    }

    #[test]
    fn test_config_errors_map_to_two() {
        let err: anyhow::Error =
            CountdownError::from(ConfigError::UnknownBinSet("all".to_string())).into();
        assert_eq!(for_error(&err), CONFIG_ERROR);

        let err = anyhow::Error::new(ConfigError::InvalidDirection("up".to_string()))
            .context("resolving regression settings");
        assert_eq!(for_error(&err), CONFIG_ERROR);

        let err = anyhow::anyhow!("tool exploded");
        assert_eq!(for_error(&err), FAILURE);
    }
}
