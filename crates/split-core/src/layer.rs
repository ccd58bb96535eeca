#![forbid(unsafe_code)]

// LayerIndex is consistent and stable across the whole edge process:
// repr(transparent) -> ensures the struct memory layout matches its single field
// Using a tuple struct (newtype pattern) that wraps u32.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LayerIndex(pub u32);

impl LayerIndex {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn next(self) -> Self {
        LayerIndex(self.0 + 1)
    }
}

impl From<u32> for LayerIndex {
    fn from(v: u32) -> Self {
        LayerIndex(v)
    }
}

impl From<usize> for LayerIndex {
    fn from(v: usize) -> Self {
        LayerIndex(v as u32)
    }
}

/// One entry in the model's immutable layer DAG.
///
/// `inbound` lists the layers whose output feeds this layer's input, in the
/// order the runtime expects them. Most layers have exactly one inbound
/// layer (a straight chain); layers with more than one are where the suffix
/// executor must keep earlier outputs alive instead of threading a single
/// running value (see `split-executor`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerSpec {
    pub id: LayerIndex,
    pub inbound: Vec<LayerIndex>,
    /// Bytes of the activation this layer produces, used by the offloading
    /// optimiser's network-cost model.
    pub output_bytes: u32,
}

/// An immutable ordered sequence of `N` layers, loaded once at edge startup.
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    layers: Vec<LayerSpec>,
}

impl Model {
    /// Builds a model from a layer list already in execution order.
    ///
    /// `layers[i].id` is expected to equal `i`; callers that construct a
    /// model from configuration are responsible for that invariant (checked
    /// in `new`, not re-checked on every access).
    pub fn new(name: impl Into<String>, layers: Vec<LayerSpec>) -> Result<Self, super::CoreError> {
        if layers.is_empty() {
            return Err(super::CoreError::EmptyModel);
        }
        for (i, l) in layers.iter().enumerate() {
            if l.id.as_usize() != i {
                return Err(super::CoreError::OutOfOrderLayer {
                    expected: i,
                    found: l.id.as_usize(),
                });
            }
            for inbound in &l.inbound {
                if inbound.as_usize() >= i {
                    return Err(super::CoreError::ForwardReferencingLayer { layer: i });
                }
            }
        }
        Ok(Self {
            name: name.into(),
            layers,
        })
    }

    /// A simple linear chain model: layer `i` depends only on layer `i-1`.
    /// Covers every canonical deployment; the DAG form above exists for
    /// branchy architectures the reference system also supports.
    pub fn linear_chain(name: impl Into<String>, layer_sizes: &[u32]) -> Result<Self, super::CoreError> {
        let layers = layer_sizes
            .iter()
            .enumerate()
            .map(|(i, &output_bytes)| LayerSpec {
                id: LayerIndex(i as u32),
                inbound: if i == 0 { vec![] } else { vec![LayerIndex((i - 1) as u32)] },
                output_bytes,
            })
            .collect();
        Self::new(name, layers)
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, idx: LayerIndex) -> Option<&LayerSpec> {
        self.layers.get(idx.as_usize())
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn output_bytes(&self) -> Vec<u32> {
        self.layers.iter().map(|l| l.output_bytes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_rejects_empty() {
        assert!(Model::linear_chain("m", &[]).is_err());
    }

    #[test]
    fn linear_chain_builds_expected_inbound_edges() {
        let m = Model::linear_chain("m", &[10, 20, 30]).unwrap();
        assert_eq!(m.num_layers(), 3);
        assert!(m.layer(LayerIndex(0)).unwrap().inbound.is_empty());
        assert_eq!(m.layer(LayerIndex(2)).unwrap().inbound, vec![LayerIndex(1)]);
    }

    #[test]
    fn rejects_forward_reference() {
        let layers = vec![
            LayerSpec { id: LayerIndex(0), inbound: vec![LayerIndex(1)], output_bytes: 4 },
            LayerSpec { id: LayerIndex(1), inbound: vec![], output_bytes: 4 },
        ];
        assert!(matches!(
            Model::new("m", layers),
            Err(crate::CoreError::ForwardReferencingLayer { layer: 0 })
        ));
    }
}
