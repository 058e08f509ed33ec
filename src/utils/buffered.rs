use std::sync::Arc;

use parking_lot::RwLock;

/// Double-buffered value shared between one writer and any number of readers.
///
/// The writer publishes complete snapshots; readers clone the `Arc` of the last published
/// snapshot and never observe a partially written value.
#[derive(Debug)]
pub struct BufferedValue<T> {
    published: RwLock<Arc<T>>,
}

impl<T: Default> Default for BufferedValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> BufferedValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            published: RwLock::new(Arc::new(value)),
        }
    }

    /// Replaces the published snapshot.
    pub fn publish(&self, value: T) {
        *self.published.write() = Arc::new(value);
    }

    /// Last published snapshot.
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.published.read())
    }
}
