use sha2::{Digest, Sha256};

use crate::models::Stroke;

/// Content signature for a stroke set: SHA-256 over each stroke id and every
/// point rounded to hundredths, hex encoded. Rounding absorbs float jitter
/// from re-serialisation, so the same ink always maps to the same key.
pub fn generate_key(strokes: &[Stroke]) -> String {
    let mut hasher = Sha256::new();

    for stroke in strokes {
        hasher.update(stroke.id.as_bytes());
        hasher.update(b"|");
        for point in stroke.points() {
            hasher.update(hundredths(point.x).to_le_bytes());
            hasher.update(hundredths(point.y).to_le_bytes());
        }
        hasher.update(b";");
    }

    hex::encode(hasher.finalize())
}

fn hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}
