//! Error types for the rebalance engine.

/// Errors surfaced by the engine.
///
/// Unmatched buy demand is not an error by default; it only becomes
/// [`Error::InsufficientLiquidity`] when the search runs in strict mode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Grand total USD value of the balances is zero, so percentages are undefined.
    #[error("portfolio has zero total value")]
    ZeroValuePortfolio,

    /// Strict mode only: the chosen plan leaves buy demand unfunded.
    #[error("insufficient liquidity: ${shortfall_usd:.2} of buy demand left unmatched")]
    InsufficientLiquidity { shortfall_usd: f64 },

    /// The search worker could not be started or went away before finishing.
    #[error("search worker failed: {0}")]
    Worker(String),

    /// Caller-supplied numbers the engine cannot work with (NaN, infinities).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            Error::ZeroValuePortfolio.to_string(),
            "portfolio has zero total value"
        );
        assert_eq!(
            Error::InsufficientLiquidity {
                shortfall_usd: 12.5
            }
            .to_string(),
            "insufficient liquidity: $12.50 of buy demand left unmatched"
        );
    }

    #[test]
    fn is_error() {
        let err: Box<dyn std::error::Error> = Box::new(Error::InvalidInput("nan".into()));
        assert!(err.to_string().contains("nan"));
    }
}
