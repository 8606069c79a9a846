// DocBook synthesis: the shared element tree, the block-stream state
// machine, and the back-of-book index parser.

pub mod builder;
pub mod index;
pub mod xml;

pub use builder::build_docbook_tree;
pub use xml::{NodeId, XmlNode, XmlTree};
