//! Approximate memory accounting.

use std::sync::Arc;

/// Rough in-memory footprint of a cached value, in bytes.
///
/// Only used to decide when a cache is under capacity pressure, so it
/// needs to be cheap rather than exact.
pub trait EstimateSize {
    fn estimated_size(&self) -> usize;
}

impl EstimateSize for String {
    fn estimated_size(&self) -> usize {
        std::mem::size_of::<String>() + self.len()
    }
}

impl EstimateSize for Vec<u8> {
    fn estimated_size(&self) -> usize {
        std::mem::size_of::<Vec<u8>>() + self.len()
    }
}

impl<T: EstimateSize + ?Sized> EstimateSize for Arc<T> {
    fn estimated_size(&self) -> usize {
        (**self).estimated_size()
    }
}
