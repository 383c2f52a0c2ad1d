//! 📦 A lazy chunker: pull items, fill a buffer, hand it over when full. Repeat.
//!
//! The last chunk may be short. No chunk is ever empty.

/// 📦 Iterator adapter yielding `Vec`s of at most `size` items from the inner iterator.
#[derive(Debug, Clone)]
pub struct Chunked<I> {
    inner: I,
    size: usize,
    done: bool,
}

/// 🏗️ Wrap `inner` so it yields chunks of `size`. A size of 0 is treated as 1.
pub fn chunked<I: Iterator>(inner: I, size: usize) -> Chunked<I> {
    Chunked {
        inner,
        size: size.max(1),
        done: false,
    }
}

impl<I: Iterator> Iterator for Chunked<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        // 📏 grows with what's actually pulled; `size` is only an upper bound
        let mut buffer = Vec::new();
        while buffer.len() < self.size {
            match self.inner.next() {
                Some(item) => buffer.push(item),
                None => {
                    // 🏁 source dry. flush whatever's left, then stay dry.
                    self.done = true;
                    break;
                }
            }
        }
        if buffer.is_empty() { None } else { Some(buffer) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_last_chunk_is_allowed_to_be_short() {
        let chunks: Vec<Vec<u32>> = chunked(1..=5, 2).collect();
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn the_one_where_an_exact_fit_leaves_no_empty_straggler() {
        let chunks: Vec<Vec<u32>> = chunked(1..=4, 2).collect();
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn the_one_where_zero_means_one() {
        let chunks: Vec<Vec<u32>> = chunked(1..=3, 0).collect();
        assert_eq!(chunks, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn the_one_where_a_huge_size_is_just_one_chunk_not_a_huge_allocation() {
        let chunks: Vec<Vec<u32>> = chunked(1..=3, usize::MAX).collect();
        assert_eq!(chunks, vec![vec![1, 2, 3]]);

        let chunks: Vec<Vec<u32>> = chunked(1..=1, 1 << 40).collect();
        assert_eq!(chunks, vec![vec![1]]);
    }

    #[test]
    fn the_one_where_nothing_in_means_nothing_out() {
        assert_eq!(chunked(std::iter::empty::<u32>(), 3).count(), 0);
    }
}
