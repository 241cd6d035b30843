//! Seeded Train/Test Split

use crate::TrainingError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Row indices of the two partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_rows` with a seeded RNG and hold out `ceil(test_fraction * n_rows)` rows
pub fn train_test_split(
    n_rows: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<Split, TrainingError> {
    let n_test = (test_fraction * n_rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(TrainingError::EmptySplit(format!(
            "{} rows cannot be split with test fraction {}",
            n_rows, test_fraction
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    debug!("Split {} rows into {} train / {} test", n_rows, train.len(), indices.len());
    Ok(Split {
        train,
        test: indices,
    })
}
