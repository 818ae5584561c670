//! Priority-ordered list helpers shared by the ready queue, semaphore wait
//! lists, condition waiter lists and donor lists.
//!
//! Lists are kept highest priority first. Elements of equal priority keep
//! their arrival order.

use super::Priority;

extern crate alloc;
use alloc::collections::VecDeque;

/// Insert `item` behind every element of equal or higher priority.
pub fn insert_ordered<T>(list: &mut VecDeque<T>, item: T, priority: impl Fn(&T) -> Priority) {
    let key = priority(&item);
    let pos = list
        .iter()
        .position(|queued| priority(queued) < key)
        .unwrap_or(list.len());
    list.insert(pos, item);
}

/// Re-establish the ordering after priorities changed. The sort is stable, so
/// equal priorities keep their relative order.
pub fn sort_ordered<T>(list: &mut VecDeque<T>, priority: impl Fn(&T) -> Priority) {
    list.make_contiguous()
        .sort_by(|a, b| priority(b).cmp(&priority(a)));
}

/// Whether `list` is ordered highest priority first.
pub fn is_ordered<T>(list: &VecDeque<T>, priority: impl Fn(&T) -> Priority) -> bool {
    list.iter()
        .zip(list.iter().skip(1))
        .all(|(a, b)| priority(a) >= priority(b))
}
