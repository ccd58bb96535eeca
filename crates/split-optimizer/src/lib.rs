//! Offloading split-point optimiser (C4).
//!
//! Given per-layer device/edge timings and a link-speed estimate, finds
//! the split index that minimises end-to-end latency. The algorithm is
//! two prefix sums and one suffix sum, `O(N)`, and is meant to be cheap
//! enough to re-run on every device report.

use split_core::SplitIndex;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptimizerError {
    #[error("model has zero layers")]
    EmptyModel,

    #[error("T_device has {device} entries but T_edge has {edge}; they must match")]
    TimingLengthMismatch { device: usize, edge: usize },

    #[error("layer_sizes has {sizes} entries but the model has {num_layers} layers")]
    SizeLengthMismatch { sizes: usize, num_layers: usize },

    #[error("net vector has {len} entries; expected 1, {num_layers}, or {num_layers_plus_one}")]
    NetLengthMismatch { len: usize, num_layers: usize, num_layers_plus_one: usize },

    #[error("avg_speed must be positive, got {0}")]
    NonPositiveSpeed(f64),
}

/// Network-cost input to the optimiser: either a single scalar link
/// speed the optimiser turns into a per-layer transfer-time vector, or an
/// already-computed `net[0..=N]` vector (or a shorter form to broadcast).
pub enum NetworkCost {
    AvgSpeedBytesPerSec(f64),
    Net(Vec<f64>),
}

/// Bytes-per-activation-element-to-KB-per-avg_speed conversion factor.
/// float32 elements (factor 4) converted to kilobytes (factor 1024),
/// divided by the observed link throughput. Preserved bit-identically
/// from the system this optimiser reproduces the decisions of.
fn net_from_avg_speed(layer_bytes: u32, avg_speed: f64) -> f64 {
    (layer_bytes as f64 * 4.0 / 1024.0) / avg_speed
}

/// Expands a possibly-shorter net specification into a full `net[0..=N]`
/// vector (`N + 1` entries), per the broadcast rule in §4.4: a vector
/// shorter than `N + 1` is extended by repeating its own last entry.
fn expand_net(num_layers: usize, cost: &NetworkCost, sizes: &[u32]) -> Result<Vec<f64>, OptimizerError> {
    match cost {
        NetworkCost::AvgSpeedBytesPerSec(avg_speed) => {
            if *avg_speed <= 0.0 {
                return Err(OptimizerError::NonPositiveSpeed(*avg_speed));
            }
            let mut net: Vec<f64> = sizes.iter().map(|&b| net_from_avg_speed(b, *avg_speed)).collect();
            let last = *net.last().expect("num_layers > 0 checked by caller");
            net.push(last);
            Ok(net)
        }
        NetworkCost::Net(provided) => {
            let num_layers_plus_one = num_layers + 1;
            match provided.len() {
                1 => Ok(vec![provided[0]; num_layers_plus_one]),
                n if n == num_layers => {
                    let mut net = provided.clone();
                    let last = *net.last().expect("num_layers > 0 checked by caller");
                    net.push(last);
                    Ok(net)
                }
                n if n == num_layers_plus_one => Ok(provided.clone()),
                len => Err(OptimizerError::NetLengthMismatch { len, num_layers, num_layers_plus_one }),
            }
        }
    }
}

/// Per-`k` totals computed by [`optimize`], exposed for diagnostics and
/// for tests that check self-consistency of the prefix/suffix sums.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best_k: SplitIndex,
    pub total: Vec<f64>,
}

/// Computes `total[k]` for every `k` in `0..=N` and returns the
/// argmin, with ties resolved toward the lowest `k` (prefers offloading
/// more work to the edge).
pub fn optimize(
    device: &[f64],
    edge: &[f64],
    sizes: &[u32],
    cost: NetworkCost,
) -> Result<OptimizationResult, OptimizerError> {
    let num_layers = device.len();
    if num_layers == 0 {
        return Err(OptimizerError::EmptyModel);
    }
    if device.len() != edge.len() {
        return Err(OptimizerError::TimingLengthMismatch { device: device.len(), edge: edge.len() });
    }
    if sizes.len() != num_layers {
        return Err(OptimizerError::SizeLengthMismatch { sizes: sizes.len(), num_layers });
    }

    let net = expand_net(num_layers, &cost, sizes)?;

    // prefix_device[k] = sum of T_device[0..k)
    let mut prefix_device = vec![0.0; num_layers + 1];
    for i in 0..num_layers {
        prefix_device[i + 1] = prefix_device[i] + device[i];
    }
    // suffix_edge[k] = sum of T_edge[k..N)
    let mut suffix_edge = vec![0.0; num_layers + 1];
    for i in (0..num_layers).rev() {
        suffix_edge[i] = suffix_edge[i + 1] + edge[i];
    }

    let total: Vec<f64> = (0..=num_layers).map(|k| prefix_device[k] + net[k] + suffix_edge[k]).collect();

    let mut best_k = 0usize;
    for k in 1..=num_layers {
        if total[k] < total[best_k] {
            best_k = k;
        }
    }

    let best_k = if best_k == num_layers {
        SplitIndex::Local
    } else {
        SplitIndex::Layer(best_k as u32)
    };

    Ok(OptimizationResult { best_k, total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_model() {
        let err = optimize(&[], &[], &[], NetworkCost::AvgSpeedBytesPerSec(1.0)).unwrap_err();
        assert_eq!(err, OptimizerError::EmptyModel);
    }

    #[test]
    fn rejects_mismatched_timing_lengths() {
        let err = optimize(&[1.0, 2.0], &[1.0], &[10, 10], NetworkCost::AvgSpeedBytesPerSec(1.0)).unwrap_err();
        assert!(matches!(err, OptimizerError::TimingLengthMismatch { .. }));
    }

    #[test]
    fn fast_network_and_expensive_device_favours_full_offload() {
        // Device is slow everywhere, edge is fast, network is nearly free.
        let device = vec![1.0; 4];
        let edge = vec![0.001; 4];
        let sizes = vec![1, 1, 1, 1];
        let result = optimize(&device, &edge, &sizes, NetworkCost::AvgSpeedBytesPerSec(1e12)).unwrap();
        assert_eq!(result.best_k, SplitIndex::Layer(0));
    }

    #[test]
    fn expensive_network_and_cheap_device_favours_local_only() {
        let device = vec![0.001; 4];
        let edge = vec![1.0; 4];
        let sizes = vec![1_000_000; 4];
        let result = optimize(&device, &edge, &sizes, NetworkCost::AvgSpeedBytesPerSec(1.0)).unwrap();
        assert_eq!(result.best_k, SplitIndex::Local);
    }

    #[test]
    fn ties_resolve_to_lowest_k() {
        // Identical device/edge costs and a zero-cost network: every k ties.
        let device = vec![0.0, 0.0, 0.0];
        let edge = vec![0.0, 0.0, 0.0];
        let sizes = vec![0, 0, 0];
        let result = optimize(&device, &edge, &sizes, NetworkCost::AvgSpeedBytesPerSec(1.0)).unwrap();
        assert_eq!(result.best_k, SplitIndex::Layer(0));
    }

    #[test]
    fn scalar_and_equivalent_vector_net_agree() {
        let device = vec![0.01, 0.02, 0.03];
        let edge = vec![0.03, 0.02, 0.01];
        let sizes = vec![100, 200, 300];
        let avg_speed = 5_000.0;

        let via_scalar = optimize(&device, &edge, &sizes, NetworkCost::AvgSpeedBytesPerSec(avg_speed)).unwrap();

        let explicit_net: Vec<f64> =
            sizes.iter().map(|&b| (b as f64 * 4.0 / 1024.0) / avg_speed).collect();
        let via_vector = optimize(&device, &edge, &sizes, NetworkCost::Net(explicit_net)).unwrap();

        assert_eq!(via_scalar.best_k, via_vector.best_k);
        for (a, b) in via_scalar.total.iter().zip(via_vector.total.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn total_k_matches_naive_definition() {
        let device = vec![0.01, 0.05, 0.02];
        let edge = vec![0.04, 0.01, 0.03];
        let sizes = vec![100, 200, 300];
        let result = optimize(&device, &edge, &sizes, NetworkCost::AvgSpeedBytesPerSec(10_000.0)).unwrap();

        let net: Vec<f64> = sizes.iter().map(|&b| (b as f64 * 4.0 / 1024.0) / 10_000.0).collect();
        let mut full_net = net.clone();
        full_net.push(*net.last().unwrap());

        for k in 0..=device.len() {
            let naive = device[..k].iter().sum::<f64>() + full_net[k] + edge[k..].iter().sum::<f64>();
            assert!((result.total[k] - naive).abs() < 1e-12, "mismatch at k={k}");
        }
    }

    #[test]
    fn rejects_bad_net_vector_length() {
        let device = vec![0.01, 0.02];
        let edge = vec![0.01, 0.02];
        let sizes = vec![10, 10];
        let err = optimize(&device, &edge, &sizes, NetworkCost::Net(vec![0.1, 0.2, 0.3, 0.4])).unwrap_err();
        assert!(matches!(err, OptimizerError::NetLengthMismatch { .. }));
    }
}
