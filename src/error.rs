pub type StudioResult<T> = Result<T, StudioError>;

#[derive(thiserror::Error, Debug)]
pub enum StudioError {
    /// The picked/uploaded file is not a decodable image.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The generation backend failed, timed out, or returned no image.
    #[error("generation failed: {0}")]
    Backend(String),

    /// Daily generation quota used up; checked before any request is sent.
    #[error("daily generation quota exhausted")]
    QuotaExhausted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudioError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            StudioError::invalid_input("x")
                .to_string()
                .contains("invalid input:")
        );
        assert!(
            StudioError::backend("x")
                .to_string()
                .contains("generation failed:")
        );
    }
}
