//! Suffix executor (C5): runs the edge-resident tail of the model for one
//! inference, threading layer outputs through a per-run `layer -> tensor`
//! map, and is the sole writer of edge-side timings.

use split_core::{LayerIndex, Model, SplitIndex};
use split_runtime::{LayerRuntime, RuntimeError, Tensor};
use split_timing::TimingStore;
use split_variance::VarianceDetector;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("runtime failed on layer {layer}")]
    Runtime {
        layer: u32,
        #[source]
        source: RuntimeError,
    },

    #[error("layer {layer} depends on layer {missing}, which has not produced an output yet")]
    MissingInboundOutput { layer: u32, missing: u32 },
}

/// Combines more than one inbound tensor into the single tensor a
/// `LayerRuntime::evaluate` call expects. Simple concatenation along the
/// flat element axis — the model format this executor was built for does
/// not carry per-layer combine semantics, so concatenation is the
/// conservative choice for skip-connection-style layers.
fn concat_tensors(tensors: &[&Tensor]) -> Tensor {
    if tensors.len() == 1 {
        return tensors[0].clone();
    }
    let mut data = Vec::new();
    for t in tensors {
        data.extend_from_slice(&t.data);
    }
    Tensor::new(vec![data.len()], data)
}

/// Runs layers `first_edge_layer..N-1` of `model` on `runtime`, starting
/// from `activation` (the device's prefix output), recording each layer's
/// wall time into `timing` (edge side) and `variance`.
///
/// Returns `activation` unchanged if `split` leaves nothing for the edge
/// to do (`SplitIndex::Local`, or `Layer(N)`).
pub fn run_suffix(
    split: SplitIndex,
    activation: Tensor,
    model: &Model,
    runtime: &dyn LayerRuntime,
    timing: &TimingStore,
    variance: &Mutex<VarianceDetector>,
) -> Result<Tensor, ExecutorError> {
    let num_layers = model.num_layers() as u32;
    let Some(first_edge_layer) = split.first_edge_layer(num_layers) else {
        return Ok(activation);
    };

    let mut outputs: HashMap<u32, Tensor> = HashMap::new();
    let mut current = activation.clone();

    for layer_id in first_edge_layer..num_layers {
        let spec = model
            .layer(LayerIndex(layer_id))
            .expect("layer_id in 0..num_layers is always present");

        let input = if spec.inbound.is_empty() {
            current.clone()
        } else {
            let mut gathered = Vec::with_capacity(spec.inbound.len());
            for inbound in &spec.inbound {
                if inbound.as_usize() < first_edge_layer as usize {
                    gathered.push(activation.clone());
                } else {
                    let tensor = outputs.get(&inbound.0).ok_or(ExecutorError::MissingInboundOutput {
                        layer: layer_id,
                        missing: inbound.0,
                    })?;
                    gathered.push(tensor.clone());
                }
            }
            let refs: Vec<&Tensor> = gathered.iter().collect();
            concat_tensors(&refs)
        };

        let (output, wall_time) = runtime
            .evaluate(LayerIndex(layer_id), &input)
            .map_err(|source| ExecutorError::Runtime { layer: layer_id, source })?;

        if let Err(e) = timing.update_edge(LayerIndex(layer_id), wall_time) {
            tracing::warn!(layer = layer_id, error = %e, "failed to record edge timing");
        }
        variance.lock().unwrap().add_edge_measurement(LayerIndex(layer_id), wall_time);

        current = output.clone();
        outputs.insert(layer_id, output);
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use split_core::Model;
    use split_runtime::MockRuntime;

    fn chain_model(n: usize) -> Model {
        Model::linear_chain("chain", &vec![4; n]).unwrap()
    }

    #[test]
    fn local_split_returns_activation_unchanged() {
        let model = chain_model(4);
        let runtime = MockRuntime::identity(4);
        let timing = TimingStore::new(vec![0.01; 4], vec![0.01; 4], vec![16; 4]);
        let variance = Mutex::new(VarianceDetector::new(4));
        let activation = Tensor::new(vec![2], vec![1.0, 2.0]);

        let result =
            run_suffix(SplitIndex::Local, activation.clone(), &model, &runtime, &timing, &variance).unwrap();
        assert_eq!(result, activation);
    }

    #[test]
    fn full_offload_runs_every_layer() {
        let model = chain_model(3);
        let runtime = MockRuntime::identity(3).with_transform(|layer, t| {
            Tensor::new(t.shape.clone(), t.data.iter().map(|&x| x + layer.0 as f32).collect())
        });
        let timing = TimingStore::new(vec![0.01; 3], vec![0.01; 3], vec![16; 3]);
        let variance = Mutex::new(VarianceDetector::new(3));
        let activation = Tensor::new(vec![1], vec![0.0]);

        let result = run_suffix(
            SplitIndex::Layer(0),
            activation,
            &model,
            &runtime,
            &timing,
            &variance,
        )
        .unwrap();
        // layer 0 adds 0, layer 1 adds 1, layer 2 adds 2 -> total 3
        assert_eq!(result.data, vec![3.0]);
    }

    #[test]
    fn mid_split_runs_only_tail_layers() {
        let model = chain_model(4);
        let runtime = MockRuntime::identity(4).with_transform(|layer, t| {
            Tensor::new(t.shape.clone(), t.data.iter().map(|&x| x * 10.0 + layer.0 as f32).collect())
        });
        let timing = TimingStore::new(vec![0.01; 4], vec![0.01; 4], vec![16; 4]);
        let variance = Mutex::new(VarianceDetector::new(4));
        let activation = Tensor::new(vec![1], vec![1.0]);

        // device ran layers 0,1; edge runs layers 2,3.
        let result = run_suffix(
            SplitIndex::Layer(2),
            activation,
            &model,
            &runtime,
            &timing,
            &variance,
        )
        .unwrap();
        // layer2: 1*10+2=12, layer3: 12*10+3=123
        assert_eq!(result.data, vec![123.0]);
    }

    #[test]
    fn suffix_run_writes_edge_timings() {
        let model = chain_model(2);
        let runtime = MockRuntime::identity(2);
        let timing = TimingStore::new(vec![0.01; 2], vec![0.01; 2], vec![16; 2]);
        let variance = Mutex::new(VarianceDetector::new(2));
        let activation = Tensor::new(vec![1], vec![1.0]);

        run_suffix(SplitIndex::Layer(0), activation, &model, &runtime, &timing, &variance).unwrap();

        let snapshot = timing.snapshot();
        // EWMA from seed 0.01 must have moved (even a near-zero mock elapsed
        // time pulls the average down from the seed).
        assert!(snapshot.edge[0] <= 0.01);
        assert!(snapshot.edge[1] <= 0.01);
    }
}
