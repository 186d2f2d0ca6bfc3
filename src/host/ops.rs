use rayon::prelude::*;

use crate::CType;

/// Sequential element loops, for small arrays
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stack;

impl Stack {
    pub fn fill<T, F>(self, size: usize, f: F) -> Vec<T>
    where
        T: CType,
        F: Fn() -> T,
    {
        (0..size).map(|_| f()).collect()
    }

    pub fn map<IT, OT, F>(self, input: &[IT], f: F) -> Vec<OT>
    where
        IT: CType,
        OT: CType,
        F: Fn(IT) -> OT,
    {
        input.iter().copied().map(f).collect()
    }

    pub fn zip<IT, OT, F>(self, left: &[IT], right: &[IT], f: F) -> Vec<OT>
    where
        IT: CType,
        OT: CType,
        F: Fn(IT, IT) -> OT,
    {
        left.iter()
            .copied()
            .zip(right.iter().copied())
            .map(|(l, r)| f(l, r))
            .collect()
    }

    pub fn reduce_axis<T, F>(self, input: &[T], [outer, len, inner]: [usize; 3], f: F) -> Vec<T>
    where
        T: CType,
        F: Fn(T, T) -> T,
    {
        (0..(outer * inner))
            .map(|offset| reduce_offset(input, offset, len, inner, &f))
            .collect()
    }

    pub fn fold<T, F>(self, input: &[T], f: F) -> Option<T>
    where
        T: CType,
        F: Fn(T, T) -> T,
    {
        input.iter().copied().reduce(f)
    }

    pub fn matmul<T, A, M>(
        self,
        left: &[T],
        right_t: &[T],
        [m, k, n]: [usize; 3],
        add: A,
        mul: M,
    ) -> Vec<T>
    where
        T: CType,
        A: Fn(T, T) -> T,
        M: Fn(T, T) -> T,
    {
        (0..(m * n))
            .map(|offset| dot(left, right_t, offset, [k, n], &add, &mul))
            .collect()
    }
}

/// Parallel element loops, for large arrays
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Heap;

impl Heap {
    pub fn fill<T, F>(self, size: usize, f: F) -> Vec<T>
    where
        T: CType,
        F: Fn() -> T + Send + Sync,
    {
        (0..size).into_par_iter().map(|_| f()).collect()
    }

    pub fn map<IT, OT, F>(self, input: &[IT], f: F) -> Vec<OT>
    where
        IT: CType,
        OT: CType,
        F: Fn(IT) -> OT + Send + Sync,
    {
        input.par_iter().copied().map(f).collect()
    }

    pub fn zip<IT, OT, F>(self, left: &[IT], right: &[IT], f: F) -> Vec<OT>
    where
        IT: CType,
        OT: CType,
        F: Fn(IT, IT) -> OT + Send + Sync,
    {
        left.par_iter()
            .copied()
            .zip(right.par_iter().copied())
            .map(|(l, r)| f(l, r))
            .collect()
    }

    pub fn reduce_axis<T, F>(self, input: &[T], [outer, len, inner]: [usize; 3], f: F) -> Vec<T>
    where
        T: CType,
        F: Fn(T, T) -> T + Send + Sync,
    {
        (0..(outer * inner))
            .into_par_iter()
            .map(|offset| reduce_offset(input, offset, len, inner, &f))
            .collect()
    }

    pub fn fold<T, F>(self, input: &[T], f: F) -> Option<T>
    where
        T: CType,
        F: Fn(T, T) -> T + Send + Sync,
    {
        input.par_iter().copied().reduce_with(f)
    }

    pub fn matmul<T, A, M>(
        self,
        left: &[T],
        right_t: &[T],
        [m, k, n]: [usize; 3],
        add: A,
        mul: M,
    ) -> Vec<T>
    where
        T: CType,
        A: Fn(T, T) -> T + Send + Sync,
        M: Fn(T, T) -> T + Send + Sync,
    {
        (0..(m * n))
            .into_par_iter()
            .map(|offset| dot(left, right_t, offset, [k, n], &add, &mul))
            .collect()
    }
}

#[inline]
fn reduce_offset<T, F>(input: &[T], offset: usize, len: usize, inner: usize, f: &F) -> T
where
    T: CType,
    F: Fn(T, T) -> T,
{
    let start = (offset / inner) * len * inner + (offset % inner);
    let mut values = (0..len).map(|i| input[start + i * inner]);

    // the caller guarantees that len > 0
    let first = values.next().unwrap_or(T::ZERO);
    values.fold(first, f)
}

#[inline]
fn dot<T, A, M>(
    left: &[T],
    right_t: &[T],
    offset: usize,
    [k, n]: [usize; 2],
    add: &A,
    mul: &M,
) -> T
where
    T: CType,
    A: Fn(T, T) -> T,
    M: Fn(T, T) -> T,
{
    let row = &left[(offset / n) * k..][..k];
    let col = &right_t[(offset % n) * k..][..k];

    let mut products = row.iter().zip(col).map(|(l, r)| mul(*l, *r));

    // the sum of no products is zero whatever the add-op
    match products.next() {
        Some(first) => products.fold(first, add),
        None => T::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategies_agree() {
        let input = (0..120).map(|n| n as i64).collect::<Vec<_>>();
        let dims = [4, 5, 6];

        assert_eq!(
            Stack.reduce_axis(&input, dims, |l, r| l + r),
            Heap.reduce_axis(&input, dims, |l, r| l + r)
        );

        assert_eq!(
            Stack.zip(&input, &input, |l, r| l * r),
            Heap.zip::<i64, i64, _>(&input, &input, |l, r| l * r)
        );

        assert_eq!(Stack.fold(&input, |l, r| l + r), Some(7140));
        assert_eq!(Heap.fold(&input, |l, r| l + r), Some(7140));
    }

    #[test]
    fn test_max_plus_matmul() {
        let left = [-5i32, -6];
        let right_t = [-1, -2];
        let max = |l: i32, r: i32| Ord::max(l, r);
        let plus = |l: i32, r: i32| l + r;

        assert_eq!(Stack.matmul(&left, &right_t, [1, 2, 1], max, plus), vec![-6]);
        assert_eq!(Heap.matmul(&left, &right_t, [1, 2, 1], max, plus), vec![-6]);
        assert_eq!(Stack.matmul(&[], &[], [2, 0, 2], max, plus), vec![0; 4]);
    }
}
