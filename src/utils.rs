use std::ops::Deref;

pub fn ts_hm() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

pub fn ts_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Aligns the wrapped value to its own 64-byte cache line.
///
/// Used for the ring indices and the hot counters so the producer and
/// consumer never write to the same line.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cache_aligned_layout() {
        assert_eq!(std::mem::align_of::<CacheAligned<AtomicUsize>>(), 64);
        assert_eq!(std::mem::size_of::<CacheAligned<AtomicUsize>>(), 64);
    }

    #[test]
    fn test_ts_hm_format() {
        let ts = ts_hm();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.matches(':').count(), 2);
    }
}
