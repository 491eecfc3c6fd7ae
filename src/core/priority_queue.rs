//! Thread-safe, array-backed binary min-heap.
//!
//! Every structural operation takes the single internal lock for its full
//! duration. Items are compared only through their `Ord` implementation, which
//! must not call back into the queue.

use parking_lot::Mutex;

/// Time-ordered priority queue shared between the driving thread and producers.
///
/// The smallest item (earliest due time) is always at the root.
///
/// ```
/// use prometheus_event_scheduler::core::PriorityQueue;
///
/// let queue = PriorityQueue::new();
/// queue.insert(3);
/// queue.insert(1);
/// queue.insert(2);
/// assert_eq!(queue.remove_batch(3), vec![1, 2, 3]);
/// ```
#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: Mutex<Vec<T>>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty queue with room for `capacity` items.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Number of queued items at the time of the call.
    pub fn count(&self) -> usize {
        self.heap.lock().len()
    }

    /// Whether the queue held no items at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Allocated slots in the backing array.
    pub fn capacity(&self) -> usize {
        self.heap.lock().capacity()
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.heap.lock().clear();
    }

    /// Release backing capacity beyond the current length.
    pub fn shrink_to_fit(&self) {
        self.heap.lock().shrink_to_fit();
    }

    /// Take every item out of the queue in heap (not sorted) order.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.heap.lock())
    }
}

impl<T: Ord> PriorityQueue<T> {
    /// Insert a single item. O(log n).
    pub fn insert(&self, item: T) {
        let mut heap = self.heap.lock();
        heap.push(item);
        let tail = heap.len() - 1;
        sift_up(&mut heap, tail);
    }

    /// Append a batch and rebuild the heap once. O(n + k).
    pub fn insert_many<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut heap = self.heap.lock();
        let before = heap.len();
        heap.extend(items);
        if heap.len() != before {
            heapify(&mut heap);
        }
    }

    /// Remove and return the minimum item.
    pub fn pop(&self) -> Option<T> {
        extract_min(&mut self.heap.lock())
    }

    /// Remove up to `count` minimum items, returned in ascending order.
    ///
    /// Requests larger than half the queue sort the whole array and drain its
    /// prefix; smaller requests use repeated extract-min.
    pub fn remove_batch(&self, count: usize) -> Vec<T> {
        if count == 0 {
            return Vec::new();
        }
        let mut heap = self.heap.lock();
        let take = count.min(heap.len());
        if take == 0 {
            return Vec::new();
        }

        if take > heap.len() / 2 {
            heap.sort_unstable();
            // A sorted array is already a valid min-heap.
            return heap.drain(..take).collect();
        }

        let mut batch = Vec::with_capacity(take);
        while batch.len() < take {
            match extract_min(&mut heap) {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Whether an equal item is queued. O(n); heap order is not used.
    pub fn contains(&self, item: &T) -> bool {
        self.heap.lock().iter().any(|candidate| candidate == item)
    }

    /// Remove the first item equal to `item`. Returns `false` when absent.
    pub fn try_remove(&self, item: &T) -> bool {
        let mut heap = self.heap.lock();
        let Some(index) = heap.iter().position(|candidate| candidate == item) else {
            return false;
        };

        if index == heap.len() - 1 {
            heap.pop();
            return true;
        }

        heap.swap_remove(index);
        // The tail element now at `index` may belong above or below it.
        sift_up(&mut heap, index);
        sift_down(&mut heap, index);
        true
    }

    /// Remove every item matching `predicate`, then rebuild the heap once.
    pub fn remove_where<F>(&self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut heap = self.heap.lock();
        let removed: Vec<T> = heap.extract_if(.., |item| predicate(item)).collect();
        if !removed.is_empty() {
            heapify(&mut heap);
        }
        removed
    }
}

impl<T: Ord + Clone> PriorityQueue<T> {
    /// Clone of the minimum item, if any.
    pub fn try_peek(&self) -> Option<T> {
        self.heap.lock().first().cloned()
    }
}

fn sift_up<T: Ord>(heap: &mut [T], mut index: usize) {
    while index > 0 {
        let parent = (index - 1) / 2;
        if heap[index] >= heap[parent] {
            break;
        }
        heap.swap(index, parent);
        index = parent;
    }
}

fn sift_down<T: Ord>(heap: &mut [T], mut index: usize) {
    let len = heap.len();
    loop {
        let left = 2 * index + 1;
        if left >= len {
            break;
        }
        let right = left + 1;
        let smallest = if right < len && heap[right] < heap[left] {
            right
        } else {
            left
        };
        if heap[index] <= heap[smallest] {
            break;
        }
        heap.swap(index, smallest);
        index = smallest;
    }
}

fn heapify<T: Ord>(heap: &mut [T]) {
    for index in (0..heap.len() / 2).rev() {
        sift_down(heap, index);
    }
}

fn extract_min<T: Ord>(heap: &mut Vec<T>) -> Option<T> {
    if heap.is_empty() {
        return None;
    }
    let last = heap.len() - 1;
    heap.swap(0, last);
    let min = heap.pop();
    sift_down(heap, 0);
    min
}
