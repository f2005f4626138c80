//! Block subscribers notified after each durable commit.

use std::sync::Arc;

use crate::types::Block;

use super::error::SubscriberError;

/// Listener for committed blocks.
///
/// Called synchronously, in registration order, after the block has been
/// durably archived and before `commit_block` returns. Implementations
/// must not call back into `commit_block`.
pub trait BlockSubscriber: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "subscriber"
    }

    fn receive_block(&self, block: &Block) -> Result<(), SubscriberError>;
}

/// Ordered set of subscribers, compared by identity.
#[derive(Default)]
pub(crate) struct Subscribers {
    list: Vec<Arc<dyn BlockSubscriber>>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, s: Arc<dyn BlockSubscriber>) -> Result<(), SubscriberError> {
        if self.list.iter().any(|x| same(x, &s)) {
            return Err(SubscriberError::AlreadyRegistered);
        }
        self.list.push(s);
        Ok(())
    }

    pub(crate) fn remove(&mut self, s: &Arc<dyn BlockSubscriber>) -> Result<(), SubscriberError> {
        let pos = self
            .list
            .iter()
            .position(|x| same(x, s))
            .ok_or(SubscriberError::NotRegistered)?;
        self.list.remove(pos);
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn BlockSubscriber>> {
        self.list.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }
}

/// Identity comparison that ignores vtable pointers.
fn same(a: &Arc<dyn BlockSubscriber>, b: &Arc<dyn BlockSubscriber>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl BlockSubscriber for Noop {
        fn receive_block(&self, _block: &Block) -> Result<(), SubscriberError> {
            Ok(())
        }
    }

    #[test]
    fn duplicates_and_unknown_removals_are_rejected() {
        let mut subs = Subscribers::default();
        let a: Arc<dyn BlockSubscriber> = Arc::new(Noop);
        let b: Arc<dyn BlockSubscriber> = Arc::new(Noop);

        subs.add(Arc::clone(&a)).expect("add a");
        assert!(matches!(
            subs.add(Arc::clone(&a)),
            Err(SubscriberError::AlreadyRegistered)
        ));
        assert!(matches!(
            subs.remove(&b),
            Err(SubscriberError::NotRegistered)
        ));

        subs.add(Arc::clone(&b)).expect("add b");
        subs.remove(&a).expect("remove a");
        assert_eq!(subs.len(), 1);
        assert!(same(&subs.snapshot()[0], &b));
    }
}
