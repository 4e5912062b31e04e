//! Consistent-hash bucketing and partition selection.
use crate::{hash::HashAlgorithm, splits::Partition};

/// Treatment returned when no confident decision can be made.
pub const CONTROL: &str = "control";

/// Map a hash to a bucket in `[1, 100]`.
pub fn get_bucket(hash: i64) -> u8 {
    // `%` truncates towards zero, so the remainder is within (-100, 100).
    ((hash % 100).unsigned_abs() + 1) as u8
}

/// Pick the treatment for `key` among `partitions`.
///
/// Returns [`CONTROL`] if there are no partitions or if partition sizes do not cover the bucket
/// (e.g., they don't add up to 100).
pub fn get_treatment<'a>(
    key: &str,
    seed: i32,
    partitions: &'a [Partition],
    algo: HashAlgorithm,
) -> &'a str {
    match partitions {
        [] => CONTROL,
        [only] if only.size == 100 => &only.treatment,
        _ => {
            let bucket = get_bucket(algo.hash(key, seed));
            treatment_for_bucket(bucket, partitions)
        }
    }
}

fn treatment_for_bucket(bucket: u8, partitions: &[Partition]) -> &str {
    let mut covered: u32 = 0;
    for partition in partitions {
        covered += u32::from(partition.size);
        if covered >= u32::from(bucket) {
            return &partition.treatment;
        }
    }
    CONTROL
}
