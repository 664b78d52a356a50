//! Tests for the arena-backed message list

use prometheus_looper::core::{AppResult, Message, MessageTarget};
use prometheus_looper::infra::MessageList;
use std::sync::Arc;

struct Noop;

impl MessageTarget for Noop {
    fn dispatch(&self, _message: &Message) -> AppResult<()> {
        Ok(())
    }
}

fn scheduled(target: &Arc<dyn MessageTarget>, what: i32, when: u64) -> Message {
    let queue = prometheus_looper::core::MessageQueue::new(true);
    queue.enqueue(Message::new(Arc::clone(target), what), when).unwrap();
    queue.pop_due(u64::MAX).unwrap()
}

#[test]
fn test_insert_reports_new_head() {
    let target: Arc<dyn MessageTarget> = Arc::new(Noop);
    let mut list = MessageList::new();

    assert!(list.insert(scheduled(&target, 1, 50)));
    assert!(!list.insert(scheduled(&target, 2, 80)));
    assert!(list.insert(scheduled(&target, 3, 10)));
    assert!(!list.insert(scheduled(&target, 4, 10)));

    let order: Vec<i32> = list.iter().map(|m| m.what).collect();
    assert_eq!(order, vec![3, 4, 1, 2]);
    assert_eq!(list.head_due(), Some(10));
}

#[test]
fn test_pop_due_and_remove() {
    let target: Arc<dyn MessageTarget> = Arc::new(Noop);
    let mut list = MessageList::with_capacity(4);
    for (what, when) in [(1, 5), (2, 15), (3, 25)] {
        list.insert(scheduled(&target, what, when));
    }

    assert!(list.pop_due(4).is_none());
    assert_eq!(list.pop_due(20).map(|m| m.what), Some(1));
    assert!(list.remove_where(|m| m.what == 3, true));
    assert_eq!(list.len(), 2);
    assert!(list.remove_where(|m| m.what == 3, false));
    assert_eq!(list.len(), 1);
    list.clear();
    assert!(list.is_empty());
}
