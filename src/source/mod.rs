//! Data source adapters.
//!
//! - [`FnSource`]: wraps a closure as a [`DataSource`].
//! - [`herd::ThunderingHerdGuard`]: collapses concurrent loads of the same
//!   key into one call to the wrapped source.

pub mod herd;

use std::fmt;

use crate::traits::DataSource;

/// A [`DataSource`] backed by a closure.
///
/// ```
/// use gencache::source::FnSource;
/// use gencache::traits::DataSource;
///
/// let source = FnSource::new(|key: &u64| -> Result<Option<u64>, std::io::Error> {
///     Ok(Some(key + 1))
/// });
/// assert_eq!(source.load(&1).unwrap(), Some(2));
/// ```
#[derive(Clone)]
pub struct FnSource<F> {
    load: F,
}

impl<F> FnSource<F> {
    pub fn new(load: F) -> Self {
        Self { load }
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

impl<K, V, F, E> DataSource<K, V> for FnSource<F>
where
    V: Send + 'static,
    F: Fn(&K) -> Result<Option<V>, E> + Send + Sync,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn load(&self, key: &K) -> Result<Option<V>, E> {
        (self.load)(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    #[test]
    fn closure_answers_loads() {
        let source = FnSource::new(|key: &u32| -> Result<Option<u32>, io::Error> {
            match key {
                0 => Err(io::Error::other("zero")),
                1 => Ok(None),
                k => Ok(Some(k * 10)),
            }
        });
        assert_eq!(source.load(&2).unwrap(), Some(20));
        assert_eq!(source.load(&1).unwrap(), None);
        assert_eq!(source.load(&0).unwrap_err().to_string(), "zero");
    }

    #[test]
    fn cloned_source_shares_behavior() {
        let source = FnSource::new(|key: &u32| -> Result<Option<u32>, io::Error> { Ok(Some(*key)) });
        let copy = source.clone();
        assert_eq!(copy.load(&5).unwrap(), Some(5));
    }
}
