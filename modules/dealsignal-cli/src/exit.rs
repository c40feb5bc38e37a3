use dealsignal_common::PipelineError;

/// Process exit codes, one per failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// Some collectors errored or some upserts failed; the rest stand.
    PartialFailure = 1,
    ConfigError = 2,
    SchemaInvalid = 3,
    StoreError = 4,
}

impl ExitCode {
    /// The worse of two phase outcomes wins the process exit code.
    pub fn worst(self, other: ExitCode) -> ExitCode {
        if (other as i32) > (self as i32) {
            other
        } else {
            self
        }
    }

    pub fn from_error(error: &PipelineError) -> ExitCode {
        match error {
            PipelineError::SchemaInvalid(_) => ExitCode::SchemaInvalid,
            PipelineError::Database(_) => ExitCode::StoreError,
            PipelineError::Config(_) => ExitCode::ConfigError,
            _ => ExitCode::PartialFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_picks_the_higher_code() {
        assert_eq!(
            ExitCode::Success.worst(ExitCode::PartialFailure),
            ExitCode::PartialFailure
        );
        assert_eq!(
            ExitCode::StoreError.worst(ExitCode::PartialFailure),
            ExitCode::StoreError
        );
        assert_eq!(ExitCode::Success.worst(ExitCode::Success), ExitCode::Success);
    }

    #[test]
    fn errors_map_to_their_exit_family() {
        assert_eq!(
            ExitCode::from_error(&PipelineError::SchemaInvalid("bad".into())),
            ExitCode::SchemaInvalid
        );
        assert_eq!(
            ExitCode::from_error(&PipelineError::Config("missing".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::from_error(&PipelineError::Permanent("nope".into())),
            ExitCode::PartialFailure
        );
    }
}
