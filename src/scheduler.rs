//! Bounded-concurrency execution with index-stable results.
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Run `task(0..count)` with at most `limit` in flight and return the outputs
/// in index order, regardless of completion order.
///
/// `min(limit, count)` lanes share one cursor; each lane claims the next
/// index, awaits it, then claims again until the cursor passes `count`. The
/// lanes are polled cooperatively on the caller's task.
pub async fn run_indexed<T, F, Fut>(count: usize, limit: usize, task: F) -> Vec<T>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = T>,
{
    let lanes = limit.max(1).min(count);
    let cursor = AtomicUsize::new(0);
    let cursor = &cursor;
    let task = &task;

    let finished = join_all((0..lanes).map(|_| async move {
        let mut done = Vec::new();
        loop {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            if index >= count {
                break;
            }
            done.push((index, task(index).await));
        }
        done
    }))
    .await;

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();
    for (index, value) in finished.into_iter().flatten() {
        slots[index] = Some(value);
    }
    slots.into_iter().flatten().collect()
}
