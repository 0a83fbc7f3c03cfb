use serde::{Deserialize, Serialize};

use super::NodeType;
use crate::error::GameError;

/// A cell of the network grid. Row 0 is the top (DATA) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }
}

/// Grid layout of the network and its connectivity.
///
/// Node ids number the non-empty cells in row-major order. The adjacency
/// matrix is indexed by node id and is always symmetric.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    num_rows: usize,
    num_cols: usize,
    layout: Vec<Vec<NodeType>>,
    node_positions: Vec<Position>,
    adjacency: Vec<Vec<bool>>,
    start_pos: Position,
    data_pos: Position,
}

impl NetworkConfig {
    /// Build the default layout: START bottom-center, DATA top-center and a
    /// full row of servers on every row in between.
    pub fn new(num_rows: usize, num_cols: usize) -> Result<Self, GameError> {
        if num_rows < 2 || num_cols == 0 {
            return Err(GameError::InvalidConfiguration(format!(
                "a {num_rows}x{num_cols} grid cannot hold both a START and a DATA node"
            )));
        }
        Self::from_layout(default_layout(num_rows, num_cols))
    }

    /// Build a network from an explicit layout. The layout must be rectangular
    /// and contain exactly one START and one DATA cell.
    pub fn from_layout(layout: Vec<Vec<NodeType>>) -> Result<Self, GameError> {
        let num_rows = layout.len();
        let num_cols = layout.first().map_or(0, |row| row.len());
        if num_rows == 0 || num_cols == 0 {
            return Err(GameError::InvalidConfiguration("empty graph layout".into()));
        }
        if layout.iter().any(|row| row.len() != num_cols) {
            return Err(GameError::InvalidConfiguration(
                "graph layout rows have different lengths".into(),
            ));
        }

        let start_pos = find_unique(&layout, NodeType::Start)?;
        let data_pos = find_unique(&layout, NodeType::Data)?;

        let node_positions: Vec<Position> = (0..num_rows)
            .flat_map(|row| (0..num_cols).map(move |col| Position::new(row, col)))
            .filter(|pos| layout[pos.row][pos.col].is_node())
            .collect();

        let n = node_positions.len();
        let mut adjacency = vec![vec![false; n]; n];
        for (i, a) in node_positions.iter().enumerate() {
            for (j, b) in node_positions.iter().enumerate() {
                if connects(*a, *b, start_pos, data_pos) {
                    adjacency[i][j] = true;
                    adjacency[j][i] = true;
                }
            }
        }

        Ok(NetworkConfig {
            num_rows,
            num_cols,
            layout,
            node_positions,
            adjacency,
            start_pos,
            data_pos,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn num_nodes(&self) -> usize {
        self.node_positions.len()
    }

    pub fn layout(&self) -> &[Vec<NodeType>] {
        &self.layout
    }

    /// Adjacency matrix indexed by node id
    pub fn adjacency(&self) -> &[Vec<bool>] {
        &self.adjacency
    }

    pub fn start_pos(&self) -> Position {
        self.start_pos
    }

    pub fn data_pos(&self) -> Position {
        self.data_pos
    }

    /// Node id of a grid position, `None` for an empty cell.
    pub fn get_node_id(&self, pos: Position) -> Result<Option<usize>, GameError> {
        self.check_bounds(pos)?;
        Ok(self.node_positions.binary_search(&pos).ok())
    }

    /// Grid position of a node id. Exact inverse of [`Self::get_node_id`].
    pub fn get_node_pos(&self, node_id: usize) -> Result<Position, GameError> {
        self.node_positions
            .get(node_id)
            .copied()
            .ok_or(GameError::InvalidNodeId {
                node_id,
                num_nodes: self.num_nodes(),
            })
    }

    pub fn node_type(&self, node_id: usize) -> Result<NodeType, GameError> {
        let pos = self.get_node_pos(node_id)?;
        Ok(self.layout[pos.row][pos.col])
    }

    pub fn node_type_at(&self, pos: Position) -> Result<NodeType, GameError> {
        self.check_bounds(pos)?;
        Ok(self.layout[pos.row][pos.col])
    }

    /// Node types indexed by node id
    pub fn node_types(&self) -> Vec<NodeType> {
        self.node_positions
            .iter()
            .map(|pos| self.layout[pos.row][pos.col])
            .collect()
    }

    pub fn start_node_id(&self) -> usize {
        self.node_positions
            .binary_search(&self.start_pos)
            .unwrap_or_default()
    }

    pub fn data_node_id(&self) -> usize {
        self.node_positions
            .binary_search(&self.data_pos)
            .unwrap_or_default()
    }

    /// Whether two positions are connected. Empty cells are connected to nothing.
    pub fn is_adjacent(&self, a: Position, b: Position) -> Result<bool, GameError> {
        match (self.get_node_id(a)?, self.get_node_id(b)?) {
            (Some(i), Some(j)) => Ok(self.adjacency[i][j]),
            _ => Ok(false),
        }
    }

    fn check_bounds(&self, pos: Position) -> Result<(), GameError> {
        if pos.row >= self.num_rows || pos.col >= self.num_cols {
            return Err(GameError::InvalidPosition {
                pos,
                rows: self.num_rows,
                cols: self.num_cols,
            });
        }
        Ok(())
    }
}

fn default_layout(num_rows: usize, num_cols: usize) -> Vec<Vec<NodeType>> {
    let center = num_cols / 2;
    (0..num_rows)
        .map(|row| {
            (0..num_cols)
                .map(|col| {
                    if row == num_rows - 1 {
                        if col == center {
                            NodeType::Start
                        } else {
                            NodeType::Empty
                        }
                    } else if row == 0 {
                        if col == center {
                            NodeType::Data
                        } else {
                            NodeType::Empty
                        }
                    } else {
                        NodeType::Server
                    }
                })
                .collect()
        })
        .collect()
}

fn find_unique(layout: &[Vec<NodeType>], kind: NodeType) -> Result<Position, GameError> {
    let mut found = layout.iter().enumerate().flat_map(|(row, cells)| {
        cells
            .iter()
            .enumerate()
            .filter(move |(_, &cell)| cell == kind)
            .map(move |(col, _)| Position::new(row, col))
    });
    let first = found.next().ok_or_else(|| {
        GameError::InvalidConfiguration(format!("could not find a {kind:?} node in graph layout"))
    })?;
    if found.next().is_some() {
        return Err(GameError::InvalidConfiguration(format!(
            "graph layout has more than one {kind:?} node"
        )));
    }
    Ok(first)
}

/// Edge rule evaluated from the upper cell `a` to the lower cell `b`.
/// DATA links to the whole row below it, START to the whole row above it,
/// and every other node to the node straight below unless that is the START row.
fn connects(a: Position, b: Position, start: Position, data: Position) -> bool {
    if a.row == data.row {
        a.col == data.col && b.row == data.row + 1
    } else if a.row == start.row {
        a.col == start.col && start.row > 0 && b.row == start.row - 1
    } else {
        b.row == a.row + 1 && a.col == b.col && b.row != start.row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_topology_layout() {
        // 1 layer, 2 servers per layer
        let net = NetworkConfig::new(3, 2).unwrap();
        assert_eq!(net.num_rows(), 3);
        assert_eq!(net.num_cols(), 2);
        assert_eq!(net.num_nodes(), 4);
        assert_eq!(net.start_pos(), Position::new(2, 1));
        assert_eq!(net.data_pos(), Position::new(0, 1));
        assert_eq!(
            net.node_types(),
            vec![
                NodeType::Data,
                NodeType::Server,
                NodeType::Server,
                NodeType::Start
            ]
        );
        assert_eq!(net.data_node_id(), 0);
        assert_eq!(net.start_node_id(), 3);
    }

    #[test]
    fn test_node_id_roundtrip() {
        for (rows, cols) in [(3, 2), (4, 3), (6, 5), (2, 1)] {
            let net = NetworkConfig::new(rows, cols).unwrap();
            for id in 0..net.num_nodes() {
                let pos = net.get_node_pos(id).unwrap();
                assert_eq!(net.get_node_id(pos).unwrap(), Some(id));
            }
        }
    }

    #[test]
    fn test_empty_cell_has_no_id() {
        let net = NetworkConfig::new(3, 2).unwrap();
        assert_eq!(net.get_node_id(Position::new(0, 0)).unwrap(), None);
        assert_eq!(net.get_node_id(Position::new(2, 0)).unwrap(), None);
    }

    #[test]
    fn test_out_of_bounds_position() {
        let net = NetworkConfig::new(3, 2).unwrap();
        let err = net.get_node_id(Position::new(3, 0)).unwrap_err();
        assert!(matches!(err, GameError::InvalidPosition { .. }));
        let err = net.get_node_id(Position::new(0, 2)).unwrap_err();
        assert!(matches!(err, GameError::InvalidPosition { .. }));
    }

    #[test]
    fn test_invalid_node_id() {
        let net = NetworkConfig::new(3, 2).unwrap();
        assert_eq!(
            net.get_node_pos(4),
            Err(GameError::InvalidNodeId {
                node_id: 4,
                num_nodes: 4
            })
        );
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let net = NetworkConfig::new(5, 4).unwrap();
        let adj = net.adjacency();
        for i in 0..net.num_nodes() {
            for j in 0..net.num_nodes() {
                assert_eq!(adj[i][j], adj[j][i], "asymmetric at ({i}, {j})");
            }
            assert!(!adj[i][i]);
        }
    }

    #[test]
    fn test_servers_have_one_edge_up_and_one_down() {
        let net = NetworkConfig::new(5, 4).unwrap();
        for id in 0..net.num_nodes() {
            if net.node_type(id).unwrap() != NodeType::Server {
                continue;
            }
            let pos = net.get_node_pos(id).unwrap();
            let neighbors: Vec<Position> = (0..net.num_nodes())
                .filter(|&j| net.adjacency()[id][j])
                .map(|j| net.get_node_pos(j).unwrap())
                .collect();
            let up = neighbors.iter().filter(|p| p.row < pos.row).count();
            let down = neighbors.iter().filter(|p| p.row > pos.row).count();
            assert_eq!(up, 1, "server {id} at {pos:?}");
            assert_eq!(down, 1, "server {id} at {pos:?}");
        }
    }

    #[test]
    fn test_start_and_data_connect_to_whole_neighbor_row() {
        let net = NetworkConfig::new(4, 3).unwrap();
        let data = net.data_node_id();
        let start = net.start_node_id();
        for col in 0..3 {
            let top_server = net.get_node_id(Position::new(1, col)).unwrap().unwrap();
            let bottom_server = net.get_node_id(Position::new(2, col)).unwrap().unwrap();
            assert!(net.adjacency()[data][top_server]);
            assert!(net.adjacency()[start][bottom_server]);
            assert!(!net.adjacency()[start][top_server]);
        }
        assert!(!net.adjacency()[start][data]);
    }

    #[test]
    fn test_is_adjacent_with_empty_cell() {
        let net = NetworkConfig::new(3, 2).unwrap();
        assert!(!net
            .is_adjacent(Position::new(0, 0), Position::new(1, 0))
            .unwrap());
        assert!(net
            .is_adjacent(Position::new(0, 1), Position::new(1, 0))
            .unwrap());
    }

    #[test]
    fn test_degenerate_grids_are_rejected() {
        assert!(matches!(
            NetworkConfig::new(1, 3),
            Err(GameError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            NetworkConfig::new(3, 0),
            Err(GameError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_layout_without_data_is_rejected() {
        let layout = vec![
            vec![NodeType::Server, NodeType::Server],
            vec![NodeType::Empty, NodeType::Start],
        ];
        let err = NetworkConfig::from_layout(layout).unwrap_err();
        assert!(err.to_string().contains("Data"));
    }

    #[test]
    fn test_layout_with_two_start_nodes_is_rejected() {
        let layout = vec![
            vec![NodeType::Data, NodeType::Empty],
            vec![NodeType::Server, NodeType::Server],
            vec![NodeType::Start, NodeType::Start],
        ];
        assert!(NetworkConfig::from_layout(layout).is_err());
    }
}
