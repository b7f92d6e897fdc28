use std::any::Any;

/// Type-erased value stored in a result slot.
pub type BatchValue = Box<dyn Any + Send + Sync>;

/// One slot per command, index-aligned with the command list.
///
/// Write-check commands never fill their slot. A read command fills it with the
/// value produced by its reader; callers recover the concrete type with
/// [`BatchResults::get`] or [`BatchResults::take`].
#[derive(Debug, Default)]
pub struct BatchResults {
    slots: Vec<Option<BatchValue>>,
}

impl BatchResults {
    /// Results for `len` commands, every slot unset.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether command `index` stored a value.
    #[must_use]
    pub fn is_set(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Option::is_some)
    }

    /// Borrow the value of command `index` as `T`.
    ///
    /// `None` if the index is out of range, the slot is unset, or it holds another type.
    #[must_use]
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Move the value of command `index` out as `T`, leaving the slot unset.
    ///
    /// A slot holding a different type is left untouched.
    pub fn take<T: Any>(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;
        if !slot.as_ref().is_some_and(|value| value.is::<T>()) {
            return None;
        }
        slot.take()
            .and_then(|value| value.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Raw slot access.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&BatchValue> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&BatchValue>> {
        self.slots.iter().map(Option::as_ref)
    }

    pub(crate) fn set(&mut self, index: usize, value: BatchValue) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_unset() {
        let results = BatchResults::with_len(3);
        assert_eq!(results.len(), 3);
        assert!((0..3).all(|i| !results.is_set(i)));
        assert!(results.get::<i64>(5).is_none());
    }

    #[test]
    fn typed_access_requires_matching_type() {
        let mut results = BatchResults::with_len(2);
        results.set(1, Box::new(7_i64));
        assert_eq!(results.get::<i64>(1), Some(&7));
        assert!(results.get::<String>(1).is_none());
        assert!(results.take::<String>(1).is_none());
        assert!(results.is_set(1));
        assert_eq!(results.take::<i64>(1), Some(7));
        assert!(!results.is_set(1));
    }
}
