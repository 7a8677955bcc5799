//! Ordered request/response transform chains.

use std::fmt;
use std::sync::Arc;

type Interceptor<T> = Arc<dyn Fn(&T) -> Option<T> + Send + Sync>;

/// Transforms applied in registration order.
///
/// Each interceptor sees the output of the previous one. Returning `None`
/// leaves the value unchanged.
pub struct InterceptorChain<T> {
    interceptors: Vec<Interceptor<T>>,
}

impl<T> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }
}

impl<T> Clone for InterceptorChain<T> {
    fn clone(&self) -> Self {
        Self {
            interceptors: self.interceptors.clone(),
        }
    }
}

impl<T> fmt::Debug for InterceptorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl<T> InterceptorChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, interceptor: F)
    where
        F: Fn(&T) -> Option<T> + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
    }

    /// Run `value` through every interceptor.
    pub fn apply(&self, mut value: T) -> T {
        for interceptor in &self.interceptors {
            if let Some(replaced) = interceptor(&value) {
                value = replaced;
            }
        }
        value
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn clear(&mut self) {
        self.interceptors.clear();
    }
}
