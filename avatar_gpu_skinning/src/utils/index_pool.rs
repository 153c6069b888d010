use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Hands out compact `u32` block indices, lowest free index first.
///
/// The combiner stamps each block's quads with its block index, so keeping
/// indices dense keeps the per-block tables in the shader small. Released
/// indices are reused before fresh ones are minted.
///
/// # Example
///
/// ```ignore
/// let mut pool = IndexPool::new();
/// let a = pool.acquire();  // 0
/// let b = pool.acquire();  // 1
/// let c = pool.acquire();  // 2
/// pool.release(c);
/// pool.release(a);
/// assert_eq!(pool.acquire(), 0); // lowest first, not last released
/// ```
#[derive(Debug, Default)]
pub struct IndexPool {
    released: BinaryHeap<Reverse<u32>>,
    next_fresh: u32,
    live: u32,
}

impl IndexPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lowest available index
    pub fn acquire(&mut self) -> u32 {
        self.live += 1;
        match self.released.pop() {
            Some(Reverse(index)) => index,
            None => {
                let index = self.next_fresh;
                self.next_fresh += 1;
                index
            }
        }
    }

    /// Give an index back for reuse
    pub fn release(&mut self, index: u32) {
        debug_assert!(index < self.next_fresh, "releasing an index never acquired: {}", index);
        debug_assert!(
            !self.released.iter().any(|r| r.0 == index),
            "index released twice: {}", index
        );
        self.live -= 1;
        self.released.push(Reverse(index));
    }

    /// Highest index ever handed out + 1
    pub fn high_water_mark(&self) -> u32 {
        self.next_fresh
    }

    /// Number of indices currently held
    pub fn len(&self) -> u32 {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
#[path = "index_pool_tests.rs"]
mod tests;
