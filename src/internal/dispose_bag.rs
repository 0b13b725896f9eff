//! Internal disposal bag for managing cleanup hooks.

use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::error::DisposalFailure;

/// A cleanup hook.
pub(crate) type Disposal = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Container for disposal hooks with LIFO execution order.
#[derive(Default)]
pub(crate) struct DisposeBag {
    entries: Vec<(String, Disposal)>,
}

impl DisposeBag {
    pub(crate) fn push(&mut self, service: impl Into<String>, disposal: Disposal) {
        self.entries.push((service.into(), disposal));
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every hook, last registered first. A failing or panicking hook does
    /// not stop the others.
    pub(crate) fn run_all_reverse(&mut self) -> Vec<DisposalFailure> {
        let mut failures = Vec::new();
        while let Some((service, disposal)) = self.entries.pop() {
            debug!(service = %service, "Disposing");
            let message = match panic::catch_unwind(AssertUnwindSafe(disposal)) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{:#}", err),
                Err(payload) => panic_message(payload.as_ref()),
            };
            failures.push(DisposalFailure { service, message });
        }
        failures
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn hooks_run_in_reverse_and_failures_are_collected() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            bag.push(name, Box::new(move || {
                order.lock().push(name);
                match name {
                    "second" => Err(anyhow::anyhow!("flush failed")),
                    "first" => panic!("boom"),
                    _ => Ok(()),
                }
            }));
        }
        assert_eq!(bag.len(), 3);

        let failures = bag.run_all_reverse();
        assert!(bag.is_empty());
        assert_eq!(*order.lock(), ["third", "second", "first"]);
        assert_eq!(
            failures,
            vec![
                DisposalFailure { service: "second".into(), message: "flush failed".into() },
                DisposalFailure { service: "first".into(), message: "panicked: boom".into() },
            ]
        );
    }
}
