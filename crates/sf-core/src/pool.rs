//! Reusable solution-buffer arena with scoped checkout.
//!
//! The marching loop needs scratch vectors (time derivatives, coupling-delta
//! workspace) once per step. Instead of a process-wide registry, buffers come
//! from a pool owned by the loop; a checked-out buffer is returned on drop,
//! on every exit path.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

use crate::norms::GlobalVector;

/// Pool of reusable numeric vectors.
///
/// Single-threaded by design; the marching loop runs on one control thread.
#[derive(Debug, Default)]
pub struct VectorPool {
    free: RefCell<Vec<GlobalVector>>,
}

impl VectorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a zeroed vector of the given length.
    ///
    /// Reuses a previously returned buffer if one is available, resizing it
    /// as needed.
    pub fn acquire(&self, len: usize) -> PoolVector<'_> {
        let vec = match self.free.borrow_mut().pop() {
            Some(mut v) => {
                if v.len() != len {
                    v = GlobalVector::zeros(len);
                } else {
                    v.fill(0.0);
                }
                v
            }
            None => GlobalVector::zeros(len),
        };
        PoolVector {
            pool: self,
            vec: Some(vec),
        }
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.free.borrow().len()
    }

    fn release(&self, vec: GlobalVector) {
        self.free.borrow_mut().push(vec);
    }
}

/// A vector checked out from a [`VectorPool`].
///
/// Dereferences to [`GlobalVector`] and returns the buffer to the pool when
/// dropped.
#[derive(Debug)]
pub struct PoolVector<'p> {
    pool: &'p VectorPool,
    vec: Option<GlobalVector>,
}

impl Deref for PoolVector<'_> {
    type Target = GlobalVector;

    fn deref(&self) -> &GlobalVector {
        self.vec.as_ref().expect("buffer present until drop")
    }
}

impl DerefMut for PoolVector<'_> {
    fn deref_mut(&mut self) -> &mut GlobalVector {
        self.vec.as_mut().expect("buffer present until drop")
    }
}

impl Drop for PoolVector<'_> {
    fn drop(&mut self) {
        if let Some(vec) = self.vec.take() {
            self.pool.release(vec);
        }
    }
}
