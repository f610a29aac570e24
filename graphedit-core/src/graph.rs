//! Graph data model for edit generation.
//!
//! A [`Graph`] is the tensor-ready view of a typed graph: an ordered node-id
//! sequence terminated by a stop symbol, a square edge-type matrix over that
//! sequence, and — for source graphs — the serialized node tokens together
//! with each node's half-open span inside them.

use crate::{Dictionary, GraphError, GraphResult, BLANK_ID};
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

/// A typed graph in node-sequence / edge-matrix form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Node-symbol ids, terminated by the stop symbol
    pub nodes: Vec<usize>,
    /// Edge-type ids, square over `nodes`; `<blank>` marks absent edges
    pub edges: Vec<Vec<usize>>,
    /// Serialized node tokens (text-dictionary ids); empty for target graphs
    pub node_tokens: Vec<usize>,
    /// Per-node half-open (start, end) span into `node_tokens`.
    ///
    /// May be shorter than `nodes`: trailing nodes without a span (the stop
    /// sentinel, or nodes decoded past the true count) carry no tokens.
    pub spans: Vec<(usize, usize)>,
}

impl Graph {
    /// Number of nodes, stop symbol included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edge-type id between two node indices, if both are in range
    pub fn edge(&self, from: usize, to: usize) -> Option<usize> {
        self.edges.get(from).and_then(|row| row.get(to)).copied()
    }

    /// Check the structural invariants: square matrix, spans within bounds.
    pub fn validate(&self) -> GraphResult<()> {
        let len = self.nodes.len();
        if self.edges.len() != len {
            return Err(GraphError::MatrixShape {
                rows: self.edges.len(),
                cols: self.edges.first().map(|r| r.len()).unwrap_or(0),
                len,
            });
        }
        for row in &self.edges {
            if row.len() != len {
                return Err(GraphError::MatrixShape {
                    rows: self.edges.len(),
                    cols: row.len(),
                    len,
                });
            }
        }
        if self.spans.len() > len {
            return Err(GraphError::NodeOutOfRange {
                index: self.spans.len(),
                len,
            });
        }
        for &(start, end) in &self.spans {
            if end < start || end > self.node_tokens.len() {
                return Err(GraphError::SpanOutOfRange {
                    start,
                    end,
                    tokens: self.node_tokens.len(),
                });
            }
        }
        Ok(())
    }

    /// Build a graph from a petgraph `DiGraph` with symbol-labelled nodes and
    /// edges. Node order follows petgraph's index order; `tokenize` supplies
    /// the serialized token ids for each node symbol.
    pub fn from_petgraph<F>(
        source: &DiGraph<String, String>,
        node_dict: &Dictionary,
        edge_dict: &Dictionary,
        stop_symbol: &str,
        mut tokenize: F,
    ) -> GraphResult<Graph>
    where
        F: FnMut(&str) -> Vec<usize>,
    {
        let mut builder = GraphBuilder::new(node_dict, edge_dict);
        for idx in source.node_indices() {
            let symbol = &source[idx];
            builder.node(symbol, &tokenize(symbol))?;
        }
        for edge in source.edge_references() {
            builder.link(
                edge.source().index(),
                edge.target().index(),
                edge.weight(),
            )?;
        }
        builder.finish(stop_symbol)
    }
}

/// Incremental builder for [`Graph`], resolving symbols through dictionaries.
pub struct GraphBuilder<'a> {
    node_dict: &'a Dictionary,
    edge_dict: &'a Dictionary,
    nodes: Vec<usize>,
    node_tokens: Vec<usize>,
    spans: Vec<(usize, usize)>,
    links: Vec<(usize, usize, usize)>,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over the given node and edge dictionaries
    pub fn new(node_dict: &'a Dictionary, edge_dict: &'a Dictionary) -> Self {
        Self {
            node_dict,
            edge_dict,
            nodes: Vec::new(),
            node_tokens: Vec::new(),
            spans: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Add a node by symbol, with its serialized token ids.
    ///
    /// Returns the node's index in the final sequence.
    pub fn node(&mut self, symbol: &str, tokens: &[usize]) -> GraphResult<usize> {
        let id = self.node_dict.require(symbol)?;
        let start = self.node_tokens.len();
        self.node_tokens.extend_from_slice(tokens);
        self.spans.push((start, self.node_tokens.len()));
        self.nodes.push(id);
        Ok(self.nodes.len() - 1)
    }

    /// Add a typed edge between two node indices
    pub fn link(&mut self, from: usize, to: usize, edge: &str) -> GraphResult<()> {
        let len = self.nodes.len();
        if from >= len || to >= len {
            return Err(GraphError::NodeOutOfRange {
                index: from.max(to),
                len,
            });
        }
        let id = self.edge_dict.require(edge)?;
        self.links.push((from, to, id));
        Ok(())
    }

    /// Append the stop sentinel and assemble the graph.
    ///
    /// The stop node carries no span, so the mask builder never paints it.
    pub fn finish(mut self, stop_symbol: &str) -> GraphResult<Graph> {
        let stop = self.node_dict.require(stop_symbol)?;
        self.nodes.push(stop);

        let len = self.nodes.len();
        let mut edges = vec![vec![BLANK_ID; len]; len];
        for (from, to, id) in self.links {
            edges[from][to] = id;
        }

        let graph = Graph {
            nodes: self.nodes,
            edges,
            node_tokens: self.node_tokens,
            spans: self.spans,
        };
        graph.validate()?;
        Ok(graph)
    }
}

/// Shift a node sequence for teacher forcing.
///
/// Input is the start sentinel followed by all nodes but the last; output is
/// the sequence itself (ending in the stop symbol). Both have the same length,
/// so decode step `t` consumes `input[t]` and is supervised by `output[t]`.
pub fn shifted_pair(nodes: &[usize], start: usize) -> (Vec<usize>, Vec<usize>) {
    let mut input = Vec::with_capacity(nodes.len());
    input.push(start);
    input.extend_from_slice(&nodes[..nodes.len().saturating_sub(1)]);
    (input, nodes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dicts() -> (Dictionary, Dictionary) {
        let nodes = Dictionary::new(["<s>", "</s>", "start", "mid", "end"]).unwrap();
        let edges = Dictionary::new(["modifies", "follows"]).unwrap();
        (nodes, edges)
    }

    #[test]
    fn test_builder_assembles_square_matrix() {
        let (node_dict, edge_dict) = dicts();
        let mut builder = GraphBuilder::new(&node_dict, &edge_dict);
        let a = builder.node("start", &[10, 11]).unwrap();
        let b = builder.node("mid", &[12]).unwrap();
        builder.link(a, b, "modifies").unwrap();
        let graph = builder.finish("</s>").unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edges.len(), 3);
        assert_eq!(
            graph.edge(a, b),
            Some(edge_dict.index("modifies").unwrap())
        );
        assert_eq!(graph.edge(b, a), Some(BLANK_ID));
        assert_eq!(graph.spans, vec![(0, 2), (2, 3)]);
        assert_eq!(graph.nodes[2], node_dict.index("</s>").unwrap());
    }

    #[test]
    fn test_builder_rejects_dangling_link() {
        let (node_dict, edge_dict) = dicts();
        let mut builder = GraphBuilder::new(&node_dict, &edge_dict);
        builder.node("start", &[1]).unwrap();
        assert!(matches!(
            builder.link(0, 5, "modifies"),
            Err(GraphError::NodeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_from_petgraph_preserves_structure() {
        let (node_dict, edge_dict) = dicts();
        let mut pg: DiGraph<String, String> = DiGraph::new();
        let a = pg.add_node("start".to_string());
        let b = pg.add_node("end".to_string());
        pg.add_edge(a, b, "follows".to_string());

        let graph =
            Graph::from_petgraph(&pg, &node_dict, &edge_dict, "</s>", |_| vec![42]).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge(0, 1), Some(edge_dict.index("follows").unwrap()));
        assert_eq!(graph.node_tokens, vec![42, 42]);
    }

    #[test]
    fn test_validate_catches_ragged_matrix() {
        let graph = Graph {
            nodes: vec![2, 3],
            edges: vec![vec![1, 1], vec![1]],
            node_tokens: vec![],
            spans: vec![],
        };
        assert!(matches!(
            graph.validate(),
            Err(GraphError::MatrixShape { .. })
        ));
    }

    #[test]
    fn test_shifted_pair_alignment() {
        let (input, output) = shifted_pair(&[5, 6, 7, 3], 2);
        assert_eq!(input, vec![2, 5, 6, 7]);
        assert_eq!(output, vec![5, 6, 7, 3]);
        assert_eq!(input.len(), output.len());
    }
}
