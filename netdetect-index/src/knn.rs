// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Brute-force cosine k-nearest-neighbour search.

use std::cmp::Ordering;

/// Scale `vector` to unit length; zero vectors are left untouched
pub fn normalize_in_place(vector: &mut [f64]) {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine distance between two unit vectors, clamped to `[0, 2]`
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (1.0 - dot).clamp(0.0, 2.0)
}

/// Neighbour table: row `i` lists the `k` nearest rows to `i`, nearest first
#[derive(Debug, Clone, PartialEq)]
pub struct KnnTable {
    pub distances: Vec<Vec<f64>>,
    pub indices: Vec<Vec<usize>>,
}

/// Exact k-NN over unit vectors.
///
/// Each row starts with the row itself at distance 0. Ties are broken by
/// index so results are deterministic.
pub fn knn(vectors: &[Vec<f64>], k: usize) -> KnnTable {
    let n = vectors.len();
    let k = k.min(n);
    let mut distances = Vec::with_capacity(n);
    let mut indices = Vec::with_capacity(n);

    for (i, query) in vectors.iter().enumerate() {
        let mut row: Vec<(f64, usize)> = vectors
            .iter()
            .enumerate()
            .map(|(j, other)| {
                if i == j {
                    (0.0, j)
                } else {
                    (cosine_distance(query, other), j)
                }
            })
            .collect();
        row.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| (a.1 != i).cmp(&(b.1 != i)))
                .then_with(|| a.1.cmp(&b.1))
        });
        row.truncate(k);
        distances.push(row.iter().map(|(d, _)| *d).collect());
        indices.push(row.iter().map(|(_, j)| *j).collect());
    }

    KnnTable { distances, indices }
}
