//! Graph construction from the state side-table

use crate::op::OpType;
use crate::state::QuantStateMap;
use crate::tensor::{QParams, TensorInfo, WeightKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Synthetic node standing for a scope's own outputs
#[derive(Debug, Clone, PartialEq)]
pub struct ParentNode {
    pub scope: String,
    pub output_tensor_infos: Vec<Option<TensorInfo>>,
}

/// One recorded op
#[derive(Debug, Clone, PartialEq)]
pub struct OpNode {
    /// Fqn of the owning scope
    pub scope: String,
    /// Record index within the scope (quantizable and non-quantizable
    /// records are numbered separately)
    pub idx: usize,
    /// Whether this node comes from a quantizable record
    pub quantized: bool,
    pub op_type: OpType,
    pub fqn: String,
    pub input_tensor_infos: Vec<Option<TensorInfo>>,
    pub weight_tensor_infos: Vec<Option<TensorInfo>>,
    pub output_tensor_infos: Vec<Option<TensorInfo>>,
    /// Snapshot of the scope's parameters at build time
    pub input_scale_zp: BTreeMap<u64, QParams>,
    pub weight_scale_zp: BTreeMap<WeightKey, QParams>,
    pub output_scale_zp: BTreeMap<u64, QParams>,
    pub predecessors: Vec<usize>,
    pub successors: Vec<usize>,
}

impl OpNode {
    pub fn first_input_id(&self) -> Option<u64> {
        self.input_tensor_infos.iter().flatten().next().map(|t| t.id)
    }

    pub fn first_output_id(&self) -> Option<u64> {
        self.output_tensor_infos.iter().flatten().next().map(|t| t.id)
    }

    fn input_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.input_tensor_infos.iter().flatten().map(|t| t.id)
    }

    fn output_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.output_tensor_infos.iter().flatten().map(|t| t.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Parent(ParentNode),
    Op(OpNode),
}

impl Node {
    pub fn as_op(&self) -> Option<&OpNode> {
        match self {
            Node::Op(op) => Some(op),
            Node::Parent(_) => None,
        }
    }
}

/// Every scope contributes its parent node, then its quantizable records in
/// index order, then its non-quantizable records.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
}

impl DependencyGraph {
    pub fn build(states: &QuantStateMap) -> Self {
        let mut nodes = Vec::new();

        for (scope, state) in states {
            nodes.push(Node::Parent(ParentNode {
                scope: scope.clone(),
                output_tensor_infos: state.output_qtensor_infos().to_vec(),
            }));

            for (idx, record) in state.q_op_infos() {
                let pick = |infos: &[Option<TensorInfo>]| -> BTreeMap<u64, QParams> {
                    infos
                        .iter()
                        .flatten()
                        .filter_map(|t| state.scale_zp(t.id).map(|qp| (t.id, qp.clone())))
                        .collect()
                };
                let weight_scale_zp = record
                    .weight_tensor_infos
                    .iter()
                    .flatten()
                    .filter_map(|t| {
                        let key = WeightKey::new(*idx, t.id);
                        state.weight_scale_zp(key).map(|qp| (key, qp.clone()))
                    })
                    .collect();
                nodes.push(Node::Op(OpNode {
                    scope: scope.clone(),
                    idx: *idx,
                    quantized: true,
                    op_type: record.op_type.clone(),
                    fqn: record.fqn.clone(),
                    input_scale_zp: pick(&record.input_tensor_infos),
                    output_scale_zp: pick(&record.output_tensor_infos),
                    weight_scale_zp,
                    input_tensor_infos: record.input_tensor_infos.clone(),
                    weight_tensor_infos: record.weight_tensor_infos.clone(),
                    output_tensor_infos: record.output_tensor_infos.clone(),
                    predecessors: Vec::new(),
                    successors: Vec::new(),
                }));
            }

            for (idx, record) in state.nonq_op_infos().iter().enumerate() {
                nodes.push(Node::Op(OpNode {
                    scope: scope.clone(),
                    idx,
                    quantized: false,
                    op_type: record.op_type.clone(),
                    fqn: record.fqn.clone(),
                    input_tensor_infos: record.input_tensor_infos.clone(),
                    weight_tensor_infos: Vec::new(),
                    output_tensor_infos: record.output_tensor_infos.clone(),
                    input_scale_zp: BTreeMap::new(),
                    weight_scale_zp: BTreeMap::new(),
                    output_scale_zp: BTreeMap::new(),
                    predecessors: Vec::new(),
                    successors: Vec::new(),
                }));
            }
        }

        let mut graph = Self { nodes };
        graph.link();
        graph
    }

    /// Producer/consumer indexes keyed by tensor id; parent nodes stay
    /// unconnected
    fn link(&mut self) {
        let mut producers: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Op(op) = node {
                for id in op.output_ids() {
                    producers.entry(id).or_default().push(i);
                }
            }
        }

        let mut edges = BTreeSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Op(op) = node {
                for id in op.input_ids() {
                    for &p in producers.get(&id).map(Vec::as_slice).unwrap_or_default() {
                        edges.insert((p, i));
                    }
                }
            }
        }

        for (from, to) in edges {
            if let Node::Op(op) = &mut self.nodes[from] {
                op.successors.push(to);
            }
            if let Node::Op(op) = &mut self.nodes[to] {
                op.predecessors.push(from);
            }
        }
        tracing::debug!(nodes = self.nodes.len(), "built dependency graph");
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, i: usize) -> Option<&Node> {
        self.nodes.get(i)
    }

    pub fn op(&self, i: usize) -> Option<&OpNode> {
        self.nodes.get(i).and_then(Node::as_op)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn op_nodes(&self) -> impl Iterator<Item = (usize, &OpNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_op().map(|op| (i, op)))
    }

    /// Node index of the first op recorded at `fqn` with type name `name`
    pub fn find_op(&self, fqn: &str, name: &str) -> Option<usize> {
        self.op_nodes()
            .find(|(_, op)| op.fqn == fqn && op.op_type.name == name)
            .map(|(i, _)| i)
    }

    pub fn num_edges(&self) -> usize {
        self.op_nodes().map(|(_, op)| op.successors.len()).sum()
    }
}
