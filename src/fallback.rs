//! Ordered fallback chains.
//!
//! Both the request-signing resolver and the selector resolution in the portal automaton try a
//! small, fixed list of strategies in priority order and keep the first one whose outcome is
//! acceptable. [`first_success`] is that loop, once.

use std::future::Future;

/// Result of walking a fallback chain.
#[derive(Debug)]
pub struct Chain<C, O> {
    /// Index, candidate and outcome of the first accepted attempt.
    pub winner: Option<(usize, C, O)>,
    /// Every attempt made before the winner (or all attempts when nothing was accepted), in order.
    pub rejected: Vec<(C, O)>,
}

impl<C, O> Chain<C, O> {
    pub fn attempts(&self) -> usize {
        self.rejected.len() + usize::from(self.winner.is_some())
    }

    pub fn into_winner(self) -> Option<(C, O)> {
        self.winner.map(|(_, candidate, outcome)| (candidate, outcome))
    }
}

/// Runs `produce` for each candidate in order until `accept` approves an outcome.
///
/// Candidates after the winner are never produced.
pub async fn first_success<C, O, I, P, Fut, A>(candidates: I, mut produce: P, accept: A) -> Chain<C, O>
where
    I: IntoIterator<Item = C>,
    P: FnMut(&C) -> Fut,
    Fut: Future<Output = O>,
    A: Fn(&O) -> bool,
{
    let mut rejected = Vec::new();
    for (index, candidate) in candidates.into_iter().enumerate() {
        let outcome = produce(&candidate).await;
        if accept(&outcome) {
            return Chain {
                winner: Some((index, candidate, outcome)),
                rejected,
            };
        }
        rejected.push((candidate, outcome));
    }
    Chain {
        winner: None,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[tokio::test]
    async fn stops_at_first_accepted_candidate() {
        let calls = Cell::new(0);
        let chain = first_success(
            [1, 2, 3, 4],
            |n| {
                calls.set(calls.get() + 1);
                let n = *n;
                async move { n * 10 }
            },
            |out| *out >= 20,
        )
        .await;
        assert_eq!(calls.get(), 2);
        assert_eq!(chain.attempts(), 2);
        assert_eq!(chain.rejected.len(), 1);
        let (index, candidate, outcome) = chain.winner.unwrap();
        assert_eq!((index, candidate, outcome), (1, 2, 20));
    }

    #[tokio::test]
    async fn exhausted_chain_keeps_every_attempt() {
        let chain = first_success(["a", "b"], |s| {
            let s = s.to_string();
            async move { s.len() }
        }, |len| *len > 5)
        .await;
        assert!(chain.winner.is_none());
        assert_eq!(chain.rejected, vec![("a", 1), ("b", 1)]);
    }
}
