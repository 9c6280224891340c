//! Use cases built on the edge store
//!
//! - [`DemandLinker`]: links one demand to every supply that can serve it
//! - [`SupplyLinker`]: re-links one supply to its current demands and drops
//!   stale in-edges
//! - [`AreaMatcher`]: hands the adjacency of one area to a matching engine
//!
//! Collaborators (who matches whom, the matching algorithm) sit behind traits.

pub mod area;
pub mod demand;
pub mod supply;

pub use area::{build_adjacency, Adjacency, AreaMatcher, MatchMaker};
pub use demand::{DemandLinker, SupplyReader};
pub use supply::{DemandReader, SupplyLinker};

use std::fmt;

/// Several independent failures of one use-case step
#[derive(Debug)]
pub struct JoinedError(pub Vec<anyhow::Error>);

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| format!("{:#}", e)).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for JoinedError {}

/// Ok if `errors` is empty, the single error if there is one, all of them joined otherwise
pub(crate) fn join_errors(mut errors: Vec<anyhow::Error>) -> anyhow::Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(JoinedError(errors).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_join_errors() {
        assert!(join_errors(Vec::new()).is_ok());

        let single = join_errors(vec![anyhow!("one")]).unwrap_err();
        assert_eq!(single.to_string(), "one");

        let joined = join_errors(vec![anyhow!("one"), anyhow!("two")]).unwrap_err();
        assert_eq!(joined.to_string(), "one; two");
        assert!(joined.downcast_ref::<JoinedError>().is_some());
    }
}
