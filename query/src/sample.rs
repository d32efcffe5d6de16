use rand::Rng;

/// Shuffle a random selection of `min(n, len)` items to the front of `pool`
/// and drop the rest. Each draw picks from the positions not yet drawn, so
/// asking for at least `len` items yields a permutation of the whole pool.
pub fn sample<T, R: Rng + ?Sized>(pool: &mut Vec<T>, n: usize, rng: &mut R) {
    let take = n.min(pool.len());
    for i in 0..take {
        let j = rng.gen_range(i..pool.len());
        pool.swap(i, j);
    }
    pool.truncate(take);
}
