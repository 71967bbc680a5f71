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

//! Inference Engine: k-NN distances to a symmetric soft-equality relation

use netdetect_core::config::{MAX_SIMILARITY_THRESHOLD, MIN_SIMILARITY_THRESHOLD};
use netdetect_core::{EngineError, EngineResult, InferredLinks};
use tracing::info;

use crate::indexer::IndexOutput;

/// Link every pair of distinct texts within `threshold` cosine distance.
///
/// The result is symmetric by construction.
pub fn infer_links(output: &IndexOutput, threshold: f64) -> EngineResult<InferredLinks> {
    if !(MIN_SIMILARITY_THRESHOLD..=MAX_SIMILARITY_THRESHOLD).contains(&threshold) {
        return Err(EngineError::ThresholdOutOfRange(threshold));
    }

    let mut links = InferredLinks::new();
    for (i, (row_idx, row_dist)) in output.indices.iter().zip(&output.distances).enumerate() {
        let text = &output.texts[i];
        for (&j, &distance) in row_idx.iter().zip(row_dist) {
            if j == i || distance > threshold {
                continue;
            }
            let other = &output.texts[j];
            if text != other {
                links.insert_pair(text, other);
            }
        }
    }

    info!(threshold, pairs = links.pair_count(), "Inferred soft links");
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn output(texts: &[&str], distances: Vec<Vec<f64>>, indices: Vec<Vec<usize>>) -> IndexOutput {
        IndexOutput {
            texts: texts.iter().map(|s| s.to_string()).collect(),
            distances,
            indices,
        }
    }

    #[test]
    fn test_threshold_bounds() {
        let out = output(&["a"], vec![vec![0.0]], vec![vec![0]]);
        assert!(matches!(
            infer_links(&out, 0.0),
            Err(EngineError::ThresholdOutOfRange(_))
        ));
        assert!(infer_links(&out, 1.5).is_err());
        assert!(infer_links(&out, 0.001).is_ok());
        assert!(infer_links(&out, 1.0).is_ok());
    }

    #[test]
    fn test_links_within_threshold() {
        let out = output(
            &["name==Plus One", "name==PlusOne", "name==Zed"],
            vec![vec![0.0, 0.05, 0.9], vec![0.0, 0.05, 0.8], vec![0.0, 0.8, 0.9]],
            vec![vec![0, 1, 2], vec![1, 0, 2], vec![2, 1, 0]],
        );
        let links = infer_links(&out, 0.1).unwrap();
        assert!(links.contains("name==PlusOne", "name==Plus One"));
        assert_eq!(links.pair_count(), 1);

        let all = infer_links(&out, 1.0).unwrap();
        assert_eq!(all.pair_count(), 3);
    }

    proptest! {
        #[test]
        fn prop_relation_is_symmetric(
            n in 1usize..8,
            seed in prop::collection::vec(0.0f64..1.0, 64),
            threshold in 0.001f64..1.0,
        ) {
            let texts: Vec<String> = (0..n).map(|i| format!("t=={i}")).collect();
            let mut distances = Vec::new();
            let mut indices = Vec::new();
            for i in 0..n {
                let mut row: Vec<(f64, usize)> = (0..n)
                    .map(|j| (if i == j { 0.0 } else { seed[(i * 8 + j) % 64] }, j))
                    .collect();
                row.sort_by(|a, b| a.0.total_cmp(&b.0).then((a.1 != i).cmp(&(b.1 != i))));
                distances.push(row.iter().map(|r| r.0).collect());
                indices.push(row.iter().map(|r| r.1).collect());
            }
            let out = IndexOutput { texts, distances, indices };
            let links = infer_links(&out, threshold).unwrap();
            prop_assert!(links.is_symmetric());
        }
    }
}
