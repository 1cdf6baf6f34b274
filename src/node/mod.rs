pub mod chord_node;
pub mod finger_table;

pub use chord_node::ChordNode;
