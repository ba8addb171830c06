//! Carry-forward imputation for a single species series.

// ---

/// Replace each missing value with the last filled value before it.
///
/// A missing first value becomes `0.0`, so an all-missing input comes back
/// as all zeros. Output length always equals input length.
pub fn fill_missing(values: &[Option<f64>]) -> Vec<f64> {
    // ---
    let mut filled = Vec::with_capacity(values.len());
    let mut last = 0.0;

    for value in values {
        if let Some(v) = value {
            last = *v;
        }
        filled.push(last);
    }

    filled
}

/// `true` when a series has strictly more present than missing values.
///
/// Series failing this check are dropped instead of imputed.
pub fn passes_quality_gate(values: &[Option<f64>]) -> bool {
    let present = values.iter().filter(|v| v.is_some()).count();
    present > values.len() - present
}
