use serde::{Deserialize, Serialize};

/// Kind of a cell in the network grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Attacker entry point, bottom row
    Start,
    /// Unused grid cell, never a node
    Empty,
    Server,
    /// Attacker goal, top row
    Data,
}

impl NodeType {
    /// Whether the cell is a node of the graph (has a node id)
    pub fn is_node(self) -> bool {
        self != NodeType::Empty
    }

    /// Whether the defender may act on this node
    pub fn is_defendable(self) -> bool {
        matches!(self, NodeType::Server | NodeType::Data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_not_a_node() {
        assert!(!NodeType::Empty.is_node());
        assert!(NodeType::Start.is_node());
        assert!(NodeType::Server.is_node());
        assert!(NodeType::Data.is_node());
    }

    #[test]
    fn test_defendable_types() {
        assert!(NodeType::Server.is_defendable());
        assert!(NodeType::Data.is_defendable());
        assert!(!NodeType::Start.is_defendable());
        assert!(!NodeType::Empty.is_defendable());
    }
}
